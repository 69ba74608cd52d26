//! Configuration types for filer-acl
//!
//! This module defines:
//! - CLI argument parsing using clap derive macros
//! - Runtime configuration with validation
//! - Role list and mount table parsing

use crate::acl::principal::{idmap_domain, DEFAULT_DOMAIN, IDMAPD_CONF};
use crate::acl::role::{Principal, Role, RoleMap};
use crate::error::{AclError, ConfigError, Result};
use crate::orchestrator::{RemoveOptions, SetOptions, WalkScope};
use crate::roler::MountEntry;
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Maximum reasonable worker count
pub const MAX_WORKERS: usize = 64;

/// Cap of the default worker count; each worker runs one ACL tool process
/// at a time and filers throttle long before CPUs run out
const DEFAULT_WORKER_CAP: usize = 16;

/// Role management for NFSv4 ACLs on project storage
#[derive(Parser, Debug, Clone)]
#[command(
    name = "filer-acl",
    version,
    about = "Manage project roles as NFSv4 ACLs on NetApp and FreeNAS filers",
    long_about = "Translates Manager / Contributor / Writer / Viewer roles into NFSv4 ACEs,\n\
                  applies them across a directory tree and grants Traverse on the\n\
                  directories leading to it.",
    after_help = "EXAMPLES:\n    \
        filer-acl get /project/3010000.01 -r\n    \
        filer-acl set /project/3010000.01 -c bob -u carol,g:lab -r\n    \
        filer-acl remove /project/3010000.01 -c bob -r\n    \
        filer-acl --mount /project_scratch=freenas get /project_scratch/p1 --format json"
)]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Command,

    /// Verbose output (debug logging)
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,

    /// NFSv4 idmap domain of principals (default: read from /etc/idmapd.conf)
    #[arg(long, global = true, value_name = "DOMAIN")]
    pub idmap_domain: Option<String>,

    /// Extra or overriding filer mount (can be repeated)
    #[arg(
        long = "mount",
        global = true,
        value_name = "PREFIX=KIND",
        action = clap::ArgAction::Append
    )]
    pub mounts: Vec<String>,

    /// ACL reader binary
    #[arg(long, global = true, default_value = "nfs4_getfacl", value_name = "PATH")]
    pub getfacl: String,

    /// ACL writer binary
    #[arg(long, global = true, default_value = "nfs4_setfacl", value_name = "PATH")]
    pub setfacl: String,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Show the roles on a path
    Get {
        #[command(flatten)]
        walk: WalkArgs,

        /// Output format: text or json (one object per line)
        #[arg(long, default_value = "text", value_name = "FORMAT")]
        format: String,
    },

    /// Assign roles on a path
    Set {
        #[command(flatten)]
        walk: WalkArgs,

        #[command(flatten)]
        roles: RoleArgs,

        /// Apply even if every requested role is already present
        #[arg(long)]
        force: bool,

        /// No progress display or summary
        #[arg(long)]
        silent: bool,

        /// Do not grant Traverse on the parent directories
        #[arg(long)]
        no_traverse: bool,
    },

    /// Remove roles from a path
    Remove {
        #[command(flatten)]
        walk: WalkArgs,

        #[command(flatten)]
        roles: RoleArgs,

        /// Principals to remove from every role (comma-separated)
        #[arg(short = 'a', long, value_name = "LIST", value_delimiter = ',')]
        all: Vec<String>,

        /// Apply even if none of the roles is present
        #[arg(long)]
        force: bool,

        /// No progress display or summary
        #[arg(long)]
        silent: bool,
    },
}

/// Tree selection shared by all subcommands
#[derive(Args, Debug, Clone)]
pub struct WalkArgs {
    /// File or directory to work on
    #[arg(value_name = "PATH")]
    pub path: PathBuf,

    /// Descend into directories
    #[arg(short = 'r', long)]
    pub recursive: bool,

    /// Follow symlinks one level deep
    #[arg(short = 'L', long)]
    pub follow_symlinks: bool,

    /// Directories only
    #[arg(long)]
    pub skip_files: bool,

    /// Number of worker threads
    #[arg(short = 'n', long, default_value_t = default_workers(), value_name = "NUM")]
    pub threads: usize,
}

/// Per-role principal lists; groups are written `g:name`
#[derive(Args, Debug, Clone, Default)]
pub struct RoleArgs {
    /// Managers (comma-separated)
    #[arg(short = 'm', long, value_name = "LIST", value_delimiter = ',')]
    pub manager: Vec<String>,

    /// Contributors (comma-separated)
    #[arg(short = 'c', long, value_name = "LIST", value_delimiter = ',')]
    pub contributor: Vec<String>,

    /// Writers (comma-separated)
    #[arg(short = 'w', long, value_name = "LIST", value_delimiter = ',')]
    pub writer: Vec<String>,

    /// Viewers (comma-separated)
    #[arg(short = 'u', long, value_name = "LIST", value_delimiter = ',')]
    pub viewer: Vec<String>,
}

impl RoleArgs {
    fn lists(&self) -> [(Role, &[String]); 4] {
        [
            (Role::Manager, self.manager.as_slice()),
            (Role::Contributor, self.contributor.as_slice()),
            (Role::Writer, self.writer.as_slice()),
            (Role::Viewer, self.viewer.as_slice()),
        ]
    }
}

fn default_workers() -> usize {
    num_cpus::get().clamp(1, DEFAULT_WORKER_CAP)
}

/// Output of `get`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

impl FromStr for OutputFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> std::result::Result<Self, ConfigError> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            other => Err(ConfigError::InvalidFormat(other.to_string())),
        }
    }
}

/// What to do once configured
#[derive(Debug, Clone)]
pub enum Action {
    Get { scope: WalkScope, format: OutputFormat },
    Set { roles: RoleMap, options: SetOptions },
    Remove { roles: RoleMap, options: RemoveOptions },
}

/// Validated runtime configuration
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Path as given on the command line
    pub path: PathBuf,

    pub action: Action,

    /// Number of worker threads
    pub worker_count: usize,

    /// Registry table: defaults plus `--mount` overrides
    pub mounts: Vec<MountEntry>,

    /// NFSv4 idmap domain
    pub domain: String,

    /// Show progress and summary
    pub show_progress: bool,

    /// Verbose logging
    pub verbose: bool,

    /// ACL tool binaries
    pub getfacl: String,
    pub setfacl: String,
}

impl RunConfig {
    /// Create and validate configuration from CLI arguments
    pub fn from_args(args: CliArgs) -> Result<Self> {
        let (walk, action, silent) = match args.command {
            Command::Get { walk, format } => {
                let format = format.parse::<OutputFormat>()?;
                let scope = scope_of(&walk);
                (walk, Action::Get { scope, format }, true)
            }
            Command::Set {
                walk,
                roles,
                force,
                silent,
                no_traverse,
            } => {
                let roles = assignment(&roles)?;
                let options = SetOptions {
                    scope: scope_of(&walk),
                    force,
                    traverse: !no_traverse,
                };
                (walk, Action::Set { roles, options }, silent)
            }
            Command::Remove {
                walk,
                roles,
                all,
                force,
                silent,
            } => {
                let roles = removal(&roles, &all)?;
                let options = RemoveOptions {
                    scope: scope_of(&walk),
                    force,
                };
                (walk, Action::Remove { roles, options }, silent)
            }
        };

        if walk.threads == 0 || walk.threads > MAX_WORKERS {
            return Err(ConfigError::InvalidWorkerCount {
                count: walk.threads,
                max: MAX_WORKERS,
            }
            .into());
        }

        let mounts = mount_table(&args.mounts)?;
        let domain = args
            .idmap_domain
            .or_else(|| idmap_domain(Path::new(IDMAPD_CONF)))
            .unwrap_or_else(|| DEFAULT_DOMAIN.to_string());

        Ok(Self {
            path: walk.path,
            action,
            worker_count: walk.threads,
            mounts,
            domain,
            show_progress: !silent,
            verbose: args.verbose,
            getfacl: args.getfacl,
            setfacl: args.setfacl,
        })
    }
}

fn scope_of(walk: &WalkArgs) -> WalkScope {
    WalkScope {
        recursive: walk.recursive,
        follow_symlinks: walk.follow_symlinks,
        skip_files: walk.skip_files,
    }
}

/// Parse a comma-split principal list, ignoring empty items
pub fn parse_principals(list: &[String]) -> Result<Vec<Principal>> {
    list.iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(Principal::parse)
        .collect()
}

/// Role map for `set`: each principal under exactly one role
fn assignment(args: &RoleArgs) -> Result<RoleMap> {
    let parsed = args
        .lists()
        .into_iter()
        .map(|(role, list)| Ok((role, parse_principals(list)?)))
        .collect::<Result<Vec<_>>>()?;

    let roles = RoleMap::from_lists(parsed.iter().map(|(role, ps)| (*role, ps.as_slice())))?;
    if roles.is_empty() {
        return Err(ConfigError::NoPrincipals.into());
    }
    Ok(roles)
}

/// Role map for `remove`; `--all` principals are listed under every
/// operator role, so the one-role-per-principal rule does not apply
fn removal(args: &RoleArgs, all: &[String]) -> Result<RoleMap> {
    let mut roles = RoleMap::new();
    for (role, list) in args.lists() {
        for p in parse_principals(list)? {
            roles.insert(role, p);
        }
    }
    for p in parse_principals(all)? {
        for role in Role::OPERATOR_ROLES {
            roles.insert(role, p.clone());
        }
    }
    if roles.is_empty() {
        return Err(ConfigError::NoPrincipals.into());
    }
    Ok(roles)
}

/// Default mounts with `--mount` entries added or replacing same prefixes
fn mount_table(specs: &[String]) -> Result<Vec<MountEntry>> {
    let mut table = MountEntry::default_table();
    for spec in specs {
        let entry: MountEntry = spec.parse()?;
        table.retain(|e| e.prefix != entry.prefix);
        table.push(entry);
    }
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::roler::BackendKind;

    fn config(argv: &[&str]) -> Result<RunConfig> {
        let mut full = vec!["filer-acl", "--idmap-domain", "example.org"];
        full.extend_from_slice(argv);
        RunConfig::from_args(CliArgs::parse_from(full))
    }

    #[test]
    fn test_set_roles_parsed() {
        let cfg = config(&[
            "set", "/project/p1", "-c", "bob", "-u", "carol,g:lab", "-r", "-n", "4",
        ])
        .unwrap();
        assert_eq!(cfg.worker_count, 4);
        assert_eq!(cfg.domain, "example.org");
        assert!(cfg.show_progress);

        let Action::Set { roles, options } = cfg.action else {
            panic!("expected set");
        };
        assert!(roles.contains(Role::Contributor, &Principal::user("bob")));
        assert!(roles.contains(Role::Viewer, &Principal::group("lab")));
        assert!(options.scope.recursive);
        assert!(options.traverse);
        assert!(!options.force);
    }

    #[test]
    fn test_special_principal_rejected() {
        let err = config(&["set", "/project/p1", "-u", "bob,EVERYONE@"]).unwrap_err();
        assert!(matches!(err, AclError::InvalidRoleSpec(_)));
    }

    #[test]
    fn test_duplicate_principal_rejected() {
        let err = config(&["set", "/project/p1", "-m", "bob", "-u", "bob"]).unwrap_err();
        assert!(matches!(err, AclError::InvalidRoleSpec(_)));
    }

    #[test]
    fn test_missing_principals_rejected() {
        let err = config(&["set", "/project/p1"]).unwrap_err();
        assert!(matches!(err, AclError::Config(ConfigError::NoPrincipals)));
    }

    #[test]
    fn test_remove_all_spans_every_role() {
        let cfg = config(&["remove", "/project/p1", "-a", "bob", "--silent"]).unwrap();
        assert!(!cfg.show_progress);
        let Action::Remove { roles, .. } = cfg.action else {
            panic!("expected remove");
        };
        for role in Role::OPERATOR_ROLES {
            assert!(roles.contains(role, &Principal::user("bob")));
        }
    }

    #[test]
    fn test_invalid_worker_count() {
        let err = config(&["get", "/project/p1", "-n", "0"]).unwrap_err();
        assert!(matches!(
            err,
            AclError::Config(ConfigError::InvalidWorkerCount { count: 0, .. })
        ));
    }

    #[test]
    fn test_get_format() {
        let cfg = config(&["get", "/project/p1", "--format", "json"]).unwrap();
        assert!(matches!(cfg.action, Action::Get { format: OutputFormat::Json, .. }));
        assert!(config(&["get", "/project/p1", "--format", "xml"]).is_err());
    }

    #[test]
    fn test_mount_overrides() {
        let cfg = config(&[
            "--mount",
            "/project=freenas",
            "--mount",
            "/scratch=netapp",
            "get",
            "/scratch/a",
        ])
        .unwrap();
        assert_eq!(cfg.mounts.len(), 4);
        assert!(cfg.mounts.contains(&MountEntry::new("/project", BackendKind::FreeNas)));
        assert!(cfg.mounts.contains(&MountEntry::new("/scratch", BackendKind::NetApp)));
        assert!(config(&["--mount", "bogus", "get", "/x"]).is_err());
    }
}
