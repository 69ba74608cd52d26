//! filer-acl - role management for NFSv4 ACLs on project storage
//!
//! Entry point for the CLI application.

use anyhow::{Context, Result};
use clap::Parser;
use filer_acl::acl::principal::SystemResolver;
use filer_acl::acl::role::RolePathMap;
use filer_acl::config::{Action, CliArgs, OutputFormat, RunConfig};
use filer_acl::orchestrator::{Invoker, LogRoleStore, Orchestrator, RunOutcome, RunReport};
use filer_acl::progress::{print_header, print_summary, ProgressReporter};
use filer_acl::roler::{Nfs4Tool, RolerRegistry};
use std::io::Write;
use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook::iterator::Signals;
use std::process::ExitCode;
use std::sync::Arc;
use std::thread;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    match run() {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<u8> {
    // Parse CLI arguments
    let args = CliArgs::parse();

    // Setup logging
    setup_logging(args.verbose)?;

    // Validate and create config
    let config = RunConfig::from_args(args).context("Invalid configuration")?;

    let tool = Arc::new(Nfs4Tool::with_binaries(&config.getfacl, &config.setfacl));
    let registry = RolerRegistry::from_table(
        &config.mounts,
        tool,
        Arc::new(SystemResolver),
        &config.domain,
    );
    let orchestrator = Orchestrator::new(registry, Invoker::current(), config.worker_count)
        .with_role_store(Arc::new(LogRoleStore));

    // Setup signal handling for prompt abort
    let abort = orchestrator.abort_handle();
    let mut signals = Signals::new([SIGINT, SIGTERM]).context("Failed to set signal handler")?;
    thread::Builder::new()
        .name("signals".into())
        .spawn(move || {
            for signal in signals.forever() {
                eprintln!("\nSignal {} received, aborting...", signal);
                abort.abort(signal);
            }
        })
        .context("Failed to start signal thread")?;

    let path = config.path.display().to_string();
    let report = match &config.action {
        Action::Get { scope, format } => {
            let format = *format;
            let stdout = std::io::stdout();
            let mut out = stdout.lock();
            orchestrator
                .get_roles(&config.path, *scope, |result| print_roles(&mut out, &result, format))
                .with_context(|| format!("Failed to read roles of '{}'", path))?
        }
        Action::Set { roles, options } => {
            run_with_progress(&config, &orchestrator, "Set roles", || {
                orchestrator.set_roles(&config.path, roles, *options)
            })
            .with_context(|| format!("Failed to set roles on '{}'", path))?
        }
        Action::Remove { roles, options } => {
            run_with_progress(&config, &orchestrator, "Remove roles", || {
                orchestrator.remove_roles(&config.path, roles, *options)
            })
            .with_context(|| format!("Failed to remove roles from '{}'", path))?
        }
    };

    match report.outcome {
        RunOutcome::Aborted(signal) => {
            info!(signal = signal, "Run was interrupted before completion")
        }
        RunOutcome::NothingToDo => info!("Nothing to do"),
        RunOutcome::Done if report.summary.failed > 0 => {
            info!(failed = report.summary.failed, "Run completed with errors")
        }
        RunOutcome::Done => {}
    }

    Ok(report.exit_code())
}

fn run_with_progress<F>(
    config: &RunConfig,
    orchestrator: &Orchestrator,
    action: &str,
    body: F,
) -> filer_acl::error::Result<RunReport>
where
    F: FnOnce() -> filer_acl::error::Result<RunReport>,
{
    if !config.show_progress {
        return body();
    }

    print_header(action, &config.path.display().to_string(), config.worker_count);
    let progress = ProgressReporter::watch(orchestrator.stats());
    let result = body();

    match &result {
        Ok(report) => {
            if matches!(report.outcome, RunOutcome::Aborted(_)) {
                progress.finish("Run interrupted");
            } else {
                progress.finish_and_clear();
            }
            print_summary(action, report);
        }
        Err(_) => progress.finish_and_clear(),
    }
    result
}

fn print_roles(out: &mut impl Write, result: &RolePathMap, format: OutputFormat) {
    let written = match format {
        OutputFormat::Json => match serde_json::to_string(result) {
            Ok(line) => writeln!(out, "{}", line),
            Err(e) => {
                error!(path = %result.path, error = %e, "Cannot encode roles");
                return;
            }
        },
        OutputFormat::Text => {
            let mut line = result.path.clone();
            for (role, principal) in result.roles.iter() {
                line.push_str(&format!(" {}:{}", role, principal));
            }
            writeln!(out, "{}", line)
        }
    };
    if let Err(e) = written {
        error!(error = %e, "Cannot write output");
    }
}

fn setup_logging(verbose: bool) -> Result<()> {
    let filter = if verbose {
        EnvFilter::new("filer_acl=debug,warn")
    } else {
        EnvFilter::new("filer_acl=info,warn")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    Ok(())
}
