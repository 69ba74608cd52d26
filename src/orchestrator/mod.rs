//! Run orchestration
//!
//! The orchestrator drives one get, set or remove over a tree:
//! - Resolving the root through symlinks and finding its backend
//! - Validating and diffing the request before anything is touched
//! - Taking the run lock on directories
//! - Streaming the tree through a worker pool calling the backend
//! - Resolving and applying Traverse changes on the ancestors
//! - Aborting promptly when the shutdown flag is raised
//!
//! ```text
//!   walk ──► [acl pool] ──► resolver ──► [traverse pool] ──► done
//!             Set/Del        ancestors      Set/Del Traverse
//! ```
//!
//! Both pools are bounded at `workers × 4` entries. Completion is the
//! closing of the last channel; nothing counts in-flight work.

pub mod lock;
pub mod store;
pub mod traverse;

pub use lock::{Invoker, RunLock, LOCK_FILE_NAME};
pub use store::{LogRoleStore, MemoryRoleStore, ProjectRoleStore};
pub use traverse::{ancestors, TraverseResolver, TraverseTask};

use crate::acl::role::{Principal, RoleMap, RolePathMap};
use crate::error::{AclError, ApplyOutcome, Result};
use crate::roler::{Roler, RolerRegistry};
use crate::walker::{walk, EntryKind, FilePathMode, WalkOptions, WorkerPool};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, trace, warn};

/// Poll interval of the main thread while waiting for a stage to finish
const WAIT_INTERVAL: Duration = Duration::from_millis(100);

/// Which part of the tree a run visits
#[derive(Debug, Clone, Copy, Default)]
pub struct WalkScope {
    pub recursive: bool,
    pub follow_symlinks: bool,
    pub skip_files: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct SetOptions {
    pub scope: WalkScope,
    /// Apply even when every requested pair is already present
    pub force: bool,
    /// Grant Traverse on the ancestors
    pub traverse: bool,
}

impl Default for SetOptions {
    fn default() -> Self {
        Self {
            scope: WalkScope::default(),
            force: false,
            traverse: true,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RemoveOptions {
    pub scope: WalkScope,
    /// Apply even when none of the pairs is present at the root
    pub force: bool,
}

/// Terminal state of a run that did not fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Done,
    NothingToDo,
    /// Stopped by the given signal number
    Aborted(i32),
}

/// Signal reported when the shutdown flag was raised without one
const DEFAULT_ABORT_SIGNAL: i32 = libc::SIGINT;

/// Raises an orchestrator's shutdown flag on behalf of a signal
#[derive(Debug, Clone)]
pub struct AbortHandle {
    flag: Arc<AtomicBool>,
    signal: Arc<AtomicI32>,
}

impl AbortHandle {
    /// Abort the current run; the first signal received is the one reported
    pub fn abort(&self, signal: i32) {
        let _ = self
            .signal
            .compare_exchange(0, signal, Ordering::SeqCst, Ordering::SeqCst);
        self.flag.store(true, Ordering::SeqCst);
    }
}

/// Counters updated by the workers while a run is in progress
#[derive(Debug, Default)]
pub struct RunStats {
    /// Paths taken off the tree walk
    pub visited: AtomicU64,

    /// Paths read or updated
    pub applied: AtomicU64,

    /// Paths whose backend call failed
    pub failed: AtomicU64,

    /// Paths outside every registered mount
    pub skipped: AtomicU64,

    /// Ancestors whose Traverse grant changed
    pub traverse: AtomicU64,
}

impl RunStats {
    fn reset(&self) {
        for counter in [
            &self.visited,
            &self.applied,
            &self.failed,
            &self.skipped,
            &self.traverse,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }

    fn record(&self, worker: usize, outcome: &ApplyOutcome, traverse: bool) {
        match outcome {
            ApplyOutcome::Applied(r) => {
                trace!(worker = worker, path = %r.path, "Applied");
                let counter = if traverse { &self.traverse } else { &self.applied };
                counter.fetch_add(1, Ordering::Relaxed);
            }
            ApplyOutcome::Skipped { path, reason } => {
                warn!(worker = worker, path = %path, reason = %reason, "Path skipped");
                self.skipped.fetch_add(1, Ordering::Relaxed);
            }
            ApplyOutcome::Failed { path, error } if error.is_recoverable() => {
                warn!(worker = worker, path = %path, error = %error, "Path failed");
                self.failed.fetch_add(1, Ordering::Relaxed);
            }
            ApplyOutcome::Failed { path, error } => {
                error!(worker = worker, path = %path, error = %error, "Path failed");
                self.failed.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    fn record_visit(&self) {
        self.visited.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self, elapsed: Duration) -> RunProgress {
        RunProgress {
            visited: self.visited.load(Ordering::Relaxed),
            applied: self.applied.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            traverse: self.traverse.load(Ordering::Relaxed),
            elapsed,
        }
    }
}

/// Point-in-time view of [`RunStats`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunProgress {
    pub visited: u64,
    pub applied: u64,
    pub failed: u64,
    pub skipped: u64,
    pub traverse: u64,
    pub elapsed: Duration,
}

impl RunProgress {
    /// Paths per second over the elapsed time
    pub fn rate(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.visited as f64 / secs
        } else {
            0.0
        }
    }
}

/// Result of a get, set or remove
#[derive(Debug, Clone)]
pub struct RunReport {
    pub outcome: RunOutcome,
    pub summary: RunProgress,
}

impl RunReport {
    /// Process exit code: 0 done or nothing to do, 2 done with per-path
    /// failures, 128 + signal number when aborted
    pub fn exit_code(&self) -> u8 {
        match self.outcome {
            RunOutcome::Aborted(signal) => u8::try_from(128 + signal).unwrap_or(u8::MAX),
            RunOutcome::NothingToDo => 0,
            RunOutcome::Done if self.summary.failed > 0 => 2,
            RunOutcome::Done => 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Get,
    Set,
    Remove,
}

/// The run root before and after symlink resolution
struct RunRoot {
    original: FilePathMode,
    canonical: FilePathMode,
    roler: Arc<dyn Roler>,
}

pub struct Orchestrator {
    registry: Arc<RolerRegistry>,
    invoker: Invoker,
    workers: usize,
    shutdown: Arc<AtomicBool>,
    signal: Arc<AtomicI32>,
    stats: Arc<RunStats>,
    store: Option<Arc<dyn ProjectRoleStore>>,
}

impl Orchestrator {
    pub fn new(registry: RolerRegistry, invoker: Invoker, workers: usize) -> Self {
        Self {
            registry: Arc::new(registry),
            invoker,
            workers: workers.max(1),
            shutdown: Arc::new(AtomicBool::new(false)),
            signal: Arc::new(AtomicI32::new(0)),
            stats: Arc::new(RunStats::default()),
            store: None,
        }
    }

    /// Report project roles to `store` after completed set/remove runs
    pub fn with_role_store(mut self, store: Arc<dyn ProjectRoleStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Get a clone of the shutdown flag
    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    /// Handle for signal handlers: raises the shutdown flag and records
    /// the signal for the exit code
    pub fn abort_handle(&self) -> AbortHandle {
        AbortHandle {
            flag: self.shutdown_flag(),
            signal: Arc::clone(&self.signal),
        }
    }

    /// Live counters of the current run (for progress display)
    pub fn stats(&self) -> Arc<RunStats> {
        Arc::clone(&self.stats)
    }

    /// Stream the roles of `path` (and its tree when recursive) into `sink`
    pub fn get_roles<F>(&self, path: &Path, scope: WalkScope, mut sink: F) -> Result<RunReport>
    where
        F: FnMut(RolePathMap),
    {
        let start = Instant::now();
        self.stats.reset();
        let root = self.resolve_root(path)?;
        info!(path = %root.canonical.path, backend = %root.roler.kind(), "Reading roles");

        let entries = walk(&root.canonical, self.walk_options(scope))?;
        let (tx, rx) = bounded(self.buffer_size());
        let registry = Arc::clone(&self.registry);
        let stats = Arc::clone(&self.stats);
        let empty = RoleMap::new();
        let task = move |id, entry: FilePathMode| {
            stats.record_visit();
            let outcome = apply_one(&registry, &entry, &empty, Mode::Get);
            stats.record(id, &outcome, false);
            match outcome {
                ApplyOutcome::Applied(result) => Some(result),
                _ => None,
            }
        };
        let pool = WorkerPool::spawn("get", self.workers, entries, tx, self.shutdown_flag(), task)?;

        let completed = self.drain(&rx, &mut sink);
        if !completed {
            return Ok(self.report(self.aborted(), start));
        }
        if let Err(e) = pool.join() {
            warn!(error = %e, "Worker failed to join cleanly");
        }
        Ok(self.report(RunOutcome::Done, start))
    }

    /// Give each principal its role in `roles` on `path` and everything below
    pub fn set_roles(&self, path: &Path, roles: &RoleMap, opts: SetOptions) -> Result<RunReport> {
        let start = Instant::now();
        self.stats.reset();
        self.validate(roles)?;
        let root = self.resolve_root(path)?;

        if !opts.force {
            let current = root.roler.get_roles(&root.canonical)?;
            if !roles.has_pairs_missing_from(&current.roles) {
                info!(path = %root.canonical.path, "Requested roles already present");
                return Ok(self.report(RunOutcome::NothingToDo, start));
            }
        }

        let _lock = self.lock(&root)?;
        info!(
            path = %root.canonical.path,
            backend = %root.roler.kind(),
            workers = self.workers,
            "Setting roles"
        );
        let outcome = self.apply(&root, roles, Mode::Set, opts.scope, opts.traverse)?;
        self.finish(&root, outcome, start)
    }

    /// Take each principal out of the role it is listed under in `roles`
    pub fn remove_roles(
        &self,
        path: &Path,
        roles: &RoleMap,
        opts: RemoveOptions,
    ) -> Result<RunReport> {
        let start = Instant::now();
        self.stats.reset();
        self.validate(roles)?;
        let root = self.resolve_root(path)?;

        if !opts.force {
            let current = root.roler.get_roles(&root.canonical)?;
            if !roles.has_pairs_present_in(&current.roles) {
                info!(path = %root.canonical.path, "Roles to remove not present");
                return Ok(self.report(RunOutcome::NothingToDo, start));
            }
        }

        let _lock = self.lock(&root)?;
        info!(
            path = %root.canonical.path,
            backend = %root.roler.kind(),
            workers = self.workers,
            "Removing roles"
        );
        let outcome = self.apply(&root, roles, Mode::Remove, opts.scope, true)?;
        self.finish(&root, outcome, start)
    }

    fn validate(&self, roles: &RoleMap) -> Result<()> {
        if roles.is_empty() {
            return Err(AclError::InvalidRoleSpec("no principals given".into()));
        }
        if let Some(p) = roles.principals().iter().find(|p| p.is_system()) {
            return Err(AclError::InvalidRoleSpec(format!("'{}' cannot be given a role", p)));
        }
        let me = Principal::user(&self.invoker.user);
        if roles.principals().contains(&me) {
            return Err(AclError::InvalidRoleSpec(format!(
                "'{}' cannot change their own access",
                me
            )));
        }
        Ok(())
    }

    fn resolve_root(&self, path: &Path) -> Result<RunRoot> {
        let not_found = |e: std::io::Error| AclError::PathNotFound {
            path: path.display().to_string(),
            reason: e.to_string(),
        };
        let absolute = std::path::absolute(path).map_err(not_found)?;
        let canonical = fs::canonicalize(path).map_err(not_found)?;
        let kind = EntryKind::from_metadata(&fs::metadata(&canonical).map_err(not_found)?);

        let canonical = FilePathMode::from_path(&canonical, kind);
        let original = FilePathMode::from_path(&absolute, kind);
        if original != canonical {
            debug!(
                original = %original.path,
                canonical = %canonical.path,
                "Root resolved through symlink"
            );
        }

        let roler = self
            .registry
            .lookup(&canonical.path)
            .ok_or_else(|| AclError::RolerNotFound {
                path: canonical.path.clone(),
            })?;

        Ok(RunRoot {
            original,
            canonical,
            roler,
        })
    }

    fn lock(&self, root: &RunRoot) -> Result<Option<RunLock>> {
        if !root.canonical.is_dir() {
            return Ok(None);
        }
        RunLock::acquire(&root.canonical, &self.invoker).map(Some)
    }

    fn buffer_size(&self) -> usize {
        self.workers * 4
    }

    fn walk_options(&self, scope: WalkScope) -> WalkOptions {
        WalkOptions {
            recursive: scope.recursive,
            follow_symlinks: scope.follow_symlinks,
            skip_files: scope.skip_files,
            buffer_size: self.buffer_size(),
            exclude_names: vec![LOCK_FILE_NAME.to_string()],
        }
    }

    /// Main pass plus Traverse pass; returns once the last stage closes or
    /// the shutdown flag is raised
    fn apply(
        &self,
        root: &RunRoot,
        roles: &RoleMap,
        mode: Mode,
        scope: WalkScope,
        traverse: bool,
    ) -> Result<RunOutcome> {
        let entries = walk(&root.canonical, self.walk_options(scope))?;

        let (applied_tx, applied_rx) = bounded::<FilePathMode>(self.buffer_size());
        let main_pool = {
            let registry = Arc::clone(&self.registry);
            let stats = Arc::clone(&self.stats);
            let roles = roles.clone();
            let task = move |id, entry: FilePathMode| {
                stats.record_visit();
                let outcome = apply_one(&registry, &entry, &roles, mode);
                stats.record(id, &outcome, false);
                outcome.is_success().then_some(entry)
            };
            WorkerPool::spawn("acl", self.workers, entries, applied_tx, self.shutdown_flag(), task)?
        };

        let (task_tx, task_rx) = bounded::<TraverseTask>(self.buffer_size());
        let resolver = {
            let registry = Arc::clone(&self.registry);
            let shutdown = self.shutdown_flag();
            let principals = roles.principals();
            let canonical = root.canonical.clone();
            let original = root.original.clone();

            thread::Builder::new()
                .name("traverse-resolver".into())
                .spawn(move || {
                    // One start per distinct parent: siblings share every ancestor.
                    let mut parents = HashSet::new();
                    let mut starts = Vec::new();
                    for entry in applied_rx.iter() {
                        if !traverse || entry.is_within(&canonical) {
                            continue;
                        }
                        if let Some(parent) = entry.parent() {
                            if parents.insert(parent.path) {
                                starts.push(entry);
                            }
                        }
                    }
                    if !traverse || shutdown.load(Ordering::Relaxed) {
                        return;
                    }

                    debug!(escaped = starts.len(), "Resolving traverse");
                    let through_link = original != canonical;
                    starts.push(canonical);
                    if through_link {
                        starts.push(original);
                    }

                    let mut resolver = TraverseResolver::new(&registry, principals);
                    for start in &starts {
                        let tasks = match mode {
                            Mode::Remove => resolver.revocations(start),
                            _ => resolver.grants(start),
                        };
                        for task in tasks {
                            if task_tx.send(task).is_err() {
                                return;
                            }
                        }
                    }
                })?
        };

        let (done_tx, done_rx) = bounded::<()>(1);
        let traverse_pool = {
            let registry = Arc::clone(&self.registry);
            let stats = Arc::clone(&self.stats);
            let apply = move |id, task: TraverseTask| -> Option<()> {
                let outcome = apply_one(&registry, &task.path, &task.roles, mode);
                stats.record(id, &outcome, true);
                None
            };
            let shutdown = self.shutdown_flag();
            WorkerPool::spawn("traverse", self.workers, task_rx, done_tx, shutdown, apply)?
        };

        if !self.drain(&done_rx, &mut |()| {}) {
            warn!("Shutdown requested, aborting run");
            return Ok(self.aborted());
        }

        for (name, result) in [("acl", main_pool.join()), ("traverse", traverse_pool.join())] {
            if let Err(e) = result {
                warn!(pool = name, error = %e, "Worker failed to join cleanly");
            }
        }
        if resolver.join().is_err() {
            warn!("Traverse resolver panicked");
        }
        Ok(RunOutcome::Done)
    }

    fn aborted(&self) -> RunOutcome {
        match self.signal.load(Ordering::SeqCst) {
            0 => RunOutcome::Aborted(DEFAULT_ABORT_SIGNAL),
            signal => RunOutcome::Aborted(signal),
        }
    }

    /// Feed `rx` into `sink` until it closes. False if interrupted first.
    fn drain<T>(&self, rx: &Receiver<T>, sink: &mut impl FnMut(T)) -> bool {
        loop {
            if self.shutdown.load(Ordering::Relaxed) {
                return false;
            }
            match rx.recv_timeout(WAIT_INTERVAL) {
                Ok(item) => sink(item),
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => return true,
            }
        }
    }

    fn finish(&self, root: &RunRoot, outcome: RunOutcome, start: Instant) -> Result<RunReport> {
        if outcome == RunOutcome::Done {
            self.record_project(root);
        }
        let report = self.report(outcome, start);
        info!(
            applied = report.summary.applied,
            failed = report.summary.failed,
            skipped = report.summary.skipped,
            traverse = report.summary.traverse,
            duration_secs = report.summary.elapsed.as_secs(),
            "Run finished"
        );
        Ok(report)
    }

    /// Hand the roles now on a project directory to the role store
    fn record_project(&self, root: &RunRoot) {
        let Some(store) = &self.store else {
            return;
        };
        let is_project = root.canonical.is_dir()
            && root
                .canonical
                .parent()
                .is_some_and(|p| self.registry.is_mount_root(&p.path));
        if !is_project {
            return;
        }

        let project_id = root.canonical.file_name();
        match root.roler.get_roles(&root.canonical) {
            Ok(current) => {
                if let Err(e) = store.record(project_id, &current.roles) {
                    warn!(project = project_id, error = %e, "Failed to record project roles");
                }
            }
            Err(e) => warn!(project = project_id, error = %e, "Cannot read project roles"),
        }
    }

    fn report(&self, outcome: RunOutcome, start: Instant) -> RunReport {
        RunReport {
            outcome,
            summary: self.stats.snapshot(start.elapsed()),
        }
    }
}

/// One backend call on one path
fn apply_one(
    registry: &RolerRegistry,
    entry: &FilePathMode,
    roles: &RoleMap,
    mode: Mode,
) -> ApplyOutcome {
    let Some(roler) = registry.lookup(&entry.path) else {
        return ApplyOutcome::Skipped {
            path: entry.path.clone(),
            reason: AclError::RolerNotFound {
                path: entry.path.clone(),
            }
            .to_string(),
        };
    };
    let result = match mode {
        Mode::Get => roler.get_roles(entry),
        Mode::Set => roler.set_roles(entry, roles, false, false),
        Mode::Remove => roler.del_roles(entry, roles, false, false),
    };
    match result {
        Ok(r) => ApplyOutcome::Applied(r),
        Err(error) => ApplyOutcome::Failed {
            path: entry.path.clone(),
            error,
        },
    }
}
