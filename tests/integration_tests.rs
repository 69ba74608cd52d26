//! Integration tests for filer-acl
//!
//! Each test builds a small project tree in a temporary directory and
//! registers that directory as a NetApp mount backed by the in-memory ACL
//! tool, so whole set/get/remove runs execute without a filer.

use filer_acl::acl::{Principal, Role, RoleMap, RolePathMap, StaticResolver};
use filer_acl::error::AclError;
use filer_acl::orchestrator::{
    Invoker, MemoryRoleStore, Orchestrator, RemoveOptions, RunOutcome, SetOptions, WalkScope,
    LOCK_FILE_NAME,
};
use filer_acl::roler::{BackendKind, InMemoryTool, MountEntry, NetAppRoler, Roler, RolerRegistry};
use filer_acl::walker::{EntryKind, FilePathMode};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tempfile::TempDir;

const DOMAIN: &str = "example.org";

struct Fixture {
    _tmp: TempDir,
    mount: PathBuf,
    tool: Arc<InMemoryTool>,
}

impl Fixture {
    fn new() -> Self {
        let tmp = TempDir::new().unwrap();
        let mount = fs::canonicalize(tmp.path()).unwrap();
        Self {
            _tmp: tmp,
            mount,
            tool: Arc::new(InMemoryTool::new()),
        }
    }

    /// `<mount>/3010000.01` with one file and one subdirectory
    fn project(&self) -> PathBuf {
        let project = self.mount.join("3010000.01");
        fs::create_dir_all(project.join("data")).unwrap();
        fs::write(project.join("README"), b"project notes").unwrap();
        project
    }

    fn resolver() -> Arc<StaticResolver> {
        Arc::new(StaticResolver::new(["admin", "bob", "carol"], ["lab"]))
    }

    fn registry(&self) -> RolerRegistry {
        RolerRegistry::from_table(
            &[MountEntry::new(self.mount.to_string_lossy(), BackendKind::NetApp)],
            self.tool.clone(),
            Self::resolver(),
            DOMAIN,
        )
    }

    fn orchestrator(&self) -> Orchestrator {
        Orchestrator::new(self.registry(), Invoker::new("admin", "host", 1), 4)
    }

    fn roles_of(&self, path: &Path) -> RoleMap {
        let roler = NetAppRoler::new(self.tool.clone(), Self::resolver(), DOMAIN);
        let kind = if path.is_dir() {
            EntryKind::Directory
        } else {
            EntryKind::File
        };
        roler
            .get_roles(&FilePathMode::from_path(path, kind))
            .unwrap()
            .roles
    }
}

fn recursive() -> WalkScope {
    WalkScope {
        recursive: true,
        ..Default::default()
    }
}

fn set_options() -> SetOptions {
    SetOptions {
        scope: recursive(),
        ..Default::default()
    }
}

fn remove_options() -> RemoveOptions {
    RemoveOptions {
        scope: recursive(),
        ..Default::default()
    }
}

fn bob() -> Principal {
    Principal::user("bob")
}

fn carol() -> Principal {
    Principal::user("carol")
}

fn bob_contributor_carol_viewer() -> RoleMap {
    let mut roles = RoleMap::single(Role::Contributor, [bob()]);
    roles.insert(Role::Viewer, carol());
    roles
}

#[test]
fn test_set_get_remove_round_trip() {
    let fx = Fixture::new();
    let project = fx.project();
    let orch = fx.orchestrator();

    let report = orch
        .set_roles(&project, &bob_contributor_carol_viewer(), set_options())
        .unwrap();
    assert_eq!(report.outcome, RunOutcome::Done);
    assert_eq!(report.summary.visited, 3);
    assert_eq!(report.summary.applied, 3);
    assert_eq!(report.exit_code(), 0);

    let mut seen: Vec<RolePathMap> = Vec::new();
    orch.get_roles(&project, recursive(), |r| seen.push(r)).unwrap();
    assert_eq!(seen.len(), 3);
    for result in &seen {
        assert_eq!(result.roles.role_of(&bob()), Some(Role::Contributor), "{}", result.path);
        assert_eq!(result.roles.role_of(&carol()), Some(Role::Viewer), "{}", result.path);
    }

    // mount root becomes passable for both
    let above = fx.roles_of(&fx.mount);
    assert!(above.contains(Role::Traverse, &bob()));
    assert!(above.contains(Role::Traverse, &carol()));

    let report = orch
        .remove_roles(&project, &RoleMap::single(Role::Contributor, [bob()]), remove_options())
        .unwrap();
    assert_eq!(report.outcome, RunOutcome::Done);

    let mut seen: Vec<RolePathMap> = Vec::new();
    orch.get_roles(&project, recursive(), |r| seen.push(r)).unwrap();
    for result in &seen {
        assert_eq!(result.roles.role_of(&bob()), None, "{}", result.path);
        assert_eq!(result.roles.role_of(&carol()), Some(Role::Viewer), "{}", result.path);
    }

    let above = fx.roles_of(&fx.mount);
    assert!(!above.contains(Role::Traverse, &bob()));
    assert!(above.contains(Role::Traverse, &carol()));
}

#[test]
fn test_repeated_set_is_nothing_to_do() {
    let fx = Fixture::new();
    let project = fx.project();
    let orch = fx.orchestrator();
    let roles = bob_contributor_carol_viewer();

    orch.set_roles(&project, &roles, set_options()).unwrap();
    let writes = fx.tool.set_calls();

    let report = orch.set_roles(&project, &roles, set_options()).unwrap();
    assert_eq!(report.outcome, RunOutcome::NothingToDo);
    assert_eq!(report.exit_code(), 0);
    assert_eq!(fx.tool.set_calls(), writes);

    // a different role for the same principal is a real change
    let report = orch
        .set_roles(&project, &RoleMap::single(Role::Writer, [bob()]), set_options())
        .unwrap();
    assert_eq!(report.outcome, RunOutcome::Done);
    assert_eq!(fx.roles_of(&project).role_of(&bob()), Some(Role::Writer));
}

#[test]
fn test_remove_of_absent_roles_is_nothing_to_do() {
    let fx = Fixture::new();
    let project = fx.project();
    let orch = fx.orchestrator();

    let report = orch
        .remove_roles(&project, &RoleMap::single(Role::Viewer, [carol()]), remove_options())
        .unwrap();
    assert_eq!(report.outcome, RunOutcome::NothingToDo);
    assert_eq!(fx.tool.set_calls(), 0);
}

#[test]
fn test_locked_directory_is_refused() {
    let fx = Fixture::new();
    let project = fx.project();
    fs::write(project.join(LOCK_FILE_NAME), b"someone otherhost 4242").unwrap();

    let err = fx
        .orchestrator()
        .set_roles(&project, &bob_contributor_carol_viewer(), set_options())
        .unwrap_err();
    match err {
        AclError::AlreadyLocked { holder, .. } => assert!(holder.contains("otherhost")),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(fx.tool.set_calls(), 0);
    assert!(project.join(LOCK_FILE_NAME).exists());
}

#[test]
fn test_lock_released_after_run() {
    let fx = Fixture::new();
    let project = fx.project();

    fx.orchestrator()
        .set_roles(&project, &bob_contributor_carol_viewer(), set_options())
        .unwrap();
    assert!(!project.join(LOCK_FILE_NAME).exists());
}

#[test]
fn test_traverse_granted_through_symlink() {
    let fx = Fixture::new();
    let a = fx.mount.join("A");
    let incoming = fx.mount.join("B/incoming");
    fs::create_dir_all(&a).unwrap();
    fs::create_dir_all(&incoming).unwrap();
    std::os::unix::fs::symlink(&incoming, a.join("shared")).unwrap();

    let scope = WalkScope {
        recursive: true,
        follow_symlinks: true,
        ..Default::default()
    };
    let opts = SetOptions {
        scope,
        ..Default::default()
    };
    let report = fx
        .orchestrator()
        .set_roles(&a, &RoleMap::single(Role::Viewer, [bob()]), opts)
        .unwrap();
    assert_eq!(report.outcome, RunOutcome::Done);

    assert_eq!(fx.roles_of(&incoming).role_of(&bob()), Some(Role::Viewer));
    assert_eq!(fx.roles_of(&fx.mount.join("B")).role_of(&bob()), Some(Role::Traverse));
    assert_eq!(fx.roles_of(&fx.mount).role_of(&bob()), Some(Role::Traverse));

    // nothing above the mount root is touched
    let outside = fx.mount.parent().unwrap();
    assert_eq!(fx.roles_of(outside).role_of(&bob()), None);
}

#[test]
fn test_no_traverse_option() {
    let fx = Fixture::new();
    let project = fx.project();
    let opts = SetOptions {
        traverse: false,
        ..set_options()
    };

    fx.orchestrator()
        .set_roles(&project, &RoleMap::single(Role::Viewer, [carol()]), opts)
        .unwrap();
    assert_eq!(fx.roles_of(&fx.mount).role_of(&carol()), None);
}

#[test]
fn test_cannot_change_own_access() {
    let fx = Fixture::new();
    let project = fx.project();

    let err = fx
        .orchestrator()
        .set_roles(
            &project,
            &RoleMap::single(Role::Manager, [Principal::user("admin")]),
            set_options(),
        )
        .unwrap_err();
    assert!(matches!(err, AclError::InvalidRoleSpec(_)));
}

#[test]
fn test_special_principals_are_refused() {
    let fx = Fixture::new();
    let project = fx.project();
    let everyone = Principal::parse("EVERYONE@").unwrap();

    let err = fx
        .orchestrator()
        .set_roles(&project, &RoleMap::single(Role::Viewer, [everyone]), set_options())
        .unwrap_err();
    assert!(matches!(err, AclError::InvalidRoleSpec(_)));
    assert_eq!(fx.tool.set_calls(), 0);
}

#[test]
fn test_unmanaged_path_has_no_roler() {
    let fx = Fixture::new();
    let outside = TempDir::new().unwrap();

    let err = fx
        .orchestrator()
        .set_roles(outside.path(), &RoleMap::single(Role::Viewer, [bob()]), set_options())
        .unwrap_err();
    assert!(matches!(err, AclError::RolerNotFound { .. }));
}

#[test]
fn test_missing_path() {
    let fx = Fixture::new();
    let err = fx
        .orchestrator()
        .get_roles(&fx.mount.join("nope"), recursive(), |_| {})
        .unwrap_err();
    assert!(matches!(err, AclError::PathNotFound { .. }));
}

#[test]
fn test_abort_releases_lock() {
    let fx = Fixture::new();
    let project = fx.project();
    let orch = fx.orchestrator();
    orch.shutdown_flag().store(true, Ordering::SeqCst);

    let report = orch
        .set_roles(&project, &bob_contributor_carol_viewer(), set_options())
        .unwrap();
    assert_eq!(report.outcome, RunOutcome::Aborted(libc::SIGINT));
    assert_eq!(report.exit_code(), 130);
    assert!(!project.join(LOCK_FILE_NAME).exists());
}

#[test]
fn test_abort_exit_code_follows_signal() {
    for (signal, code) in [(libc::SIGINT, 130), (libc::SIGTERM, 143)] {
        let fx = Fixture::new();
        let project = fx.project();
        let orch = fx.orchestrator();
        orch.abort_handle().abort(signal);

        let report = orch
            .set_roles(&project, &bob_contributor_carol_viewer(), set_options())
            .unwrap();
        assert_eq!(report.outcome, RunOutcome::Aborted(signal));
        assert_eq!(report.exit_code(), code);
    }
}

#[test]
fn test_failed_path_sets_exit_code() {
    let fx = Fixture::new();
    let project = fx.project();
    fx.tool.fail_on(&project.join("README").to_string_lossy());

    let report = fx
        .orchestrator()
        .set_roles(&project, &bob_contributor_carol_viewer(), set_options())
        .unwrap();
    assert_eq!(report.outcome, RunOutcome::Done);
    assert_eq!(report.summary.failed, 1);
    assert_eq!(report.summary.applied, 2);
    assert_eq!(report.exit_code(), 2);
}

#[test]
fn test_project_roles_recorded() {
    let fx = Fixture::new();
    let project = fx.project();
    let store = Arc::new(MemoryRoleStore::new());
    let orch = fx.orchestrator().with_role_store(store.clone());

    orch.set_roles(&project, &bob_contributor_carol_viewer(), set_options())
        .unwrap();

    let recorded = store.get("3010000.01").unwrap();
    assert_eq!(recorded.role_of(&bob()), Some(Role::Contributor));
    assert_eq!(recorded.role_of(&carol()), Some(Role::Viewer));

    // subdirectories are not projects
    orch.set_roles(
        &project.join("data"),
        &RoleMap::single(Role::Manager, [Principal::group("lab")]),
        set_options(),
    )
    .unwrap();
    assert!(store.get("data").is_none());
}

#[test]
fn test_group_principal_round_trip() {
    let fx = Fixture::new();
    let project = fx.project();
    let lab = Principal::group("lab");

    fx.orchestrator()
        .set_roles(&project, &RoleMap::single(Role::Writer, [lab.clone()]), set_options())
        .unwrap();
    assert_eq!(fx.roles_of(&project).role_of(&lab), Some(Role::Writer));
    assert_eq!(fx.roles_of(&project.join("README")).role_of(&lab), Some(Role::Writer));
}
