//! Traverse resolution
//!
//! A principal granted a role deep in a tree can only reach it if every
//! directory on the way down lets it pass. After the main pass, each start
//! point's ancestors are examined up to and including the mount root that
//! contains it; nothing above a mount root is ever touched.
//!
//! Granting: an ancestor where a principal holds no role at all gets
//! Traverse for that principal.
//!
//! Revoking works bottom-up with a pending set. A principal leaves the
//! pending set at the first ancestor where it holds a real role or where
//! some direct child still grants it anything; above that point its
//! Traverse is still needed. Otherwise a Traverse it holds is scheduled for
//! removal and remembered, so siblings examined later in the same run do
//! not count it as a reason to keep the grant.

use crate::acl::role::{Principal, Role, RoleMap};
use crate::orchestrator::lock::LOCK_FILE_NAME;
use crate::roler::RolerRegistry;
use crate::walker::{EntryKind, FilePathMode};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fs;
use tracing::{debug, trace, warn};

/// A Traverse grant or revocation on one directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraverseTask {
    pub path: FilePathMode,
    pub roles: RoleMap,
}

/// Ancestors of `start` up to and including its mount root
pub fn ancestors(registry: &RolerRegistry, start: &FilePathMode) -> Vec<FilePathMode> {
    let mut chain = Vec::new();
    if registry.is_mount_root(&start.path) {
        return chain;
    }
    let mut current = start.parent();
    while let Some(dir) = current {
        if registry.lookup(&dir.path).is_none() {
            break;
        }
        let at_root = registry.is_mount_root(&dir.path);
        current = dir.parent();
        chain.push(dir);
        if at_root {
            break;
        }
    }
    chain
}

/// Per-run ancestor bookkeeping
pub struct TraverseResolver<'a> {
    registry: &'a RolerRegistry,
    principals: BTreeSet<Principal>,
    visited: HashSet<String>,
    cleared: HashMap<String, BTreeSet<Principal>>,
}

impl<'a> TraverseResolver<'a> {
    pub fn new(registry: &'a RolerRegistry, principals: BTreeSet<Principal>) -> Self {
        Self {
            registry,
            principals,
            visited: HashSet::new(),
            cleared: HashMap::new(),
        }
    }

    /// Traverse grants needed above `start`
    pub fn grants(&mut self, start: &FilePathMode) -> Vec<TraverseTask> {
        let mut tasks = Vec::new();
        for dir in ancestors(self.registry, start) {
            if !self.visited.insert(dir.path.clone()) {
                // everything above was handled by an earlier chain
                break;
            }
            let Some(current) = self.roles_at(&dir) else {
                continue;
            };
            let missing: Vec<Principal> = self
                .principals
                .iter()
                .filter(|p| current.role_of(p).is_none())
                .cloned()
                .collect();
            if !missing.is_empty() {
                trace!(path = %dir.path, principals = missing.len(), "Traverse grant scheduled");
                tasks.push(TraverseTask {
                    path: dir,
                    roles: RoleMap::single(Role::Traverse, missing),
                });
            }
        }
        tasks
    }

    /// Traverse revocations made possible above `start`
    pub fn revocations(&mut self, start: &FilePathMode) -> Vec<TraverseTask> {
        let mut tasks = Vec::new();
        let mut pending = self.principals.clone();

        for dir in ancestors(self.registry, start) {
            if pending.is_empty() || !self.visited.insert(dir.path.clone()) {
                break;
            }
            let Some(current) = self.roles_at(&dir) else {
                break;
            };

            // listed lazily, at most once per ancestor
            let mut children: Option<Children> = None;
            let mut revoked = Vec::new();
            let candidates: Vec<Principal> = pending.iter().cloned().collect();
            for p in candidates {
                let keep = current.grants_beyond_traverse(&p) || {
                    let listing = children.get_or_insert_with(|| self.children_of(&dir));
                    self.still_needed(&dir, listing, &p)
                };
                if keep {
                    pending.remove(&p);
                } else if current.contains(Role::Traverse, &p) {
                    revoked.push(p);
                }
            }

            if !revoked.is_empty() {
                trace!(
                    path = %dir.path,
                    principals = revoked.len(),
                    "Traverse revocation scheduled"
                );
                self.cleared
                    .entry(dir.path.clone())
                    .or_default()
                    .extend(revoked.iter().cloned());
                tasks.push(TraverseTask {
                    path: dir,
                    roles: RoleMap::single(Role::Traverse, revoked),
                });
            }
        }
        tasks
    }

    fn roles_at(&self, dir: &FilePathMode) -> Option<RoleMap> {
        let roler = self.registry.lookup(&dir.path)?;
        match roler.get_roles(dir) {
            Ok(r) => Some(r.roles),
            Err(e) => {
                warn!(path = %dir.path, error = %e, "Cannot read roles of ancestor");
                None
            }
        }
    }

    /// Direct children of `dir` with their roles, read once.
    /// Symlinks and the lock file are left out.
    fn children_of(&self, dir: &FilePathMode) -> Children {
        let entries = match fs::read_dir(dir.as_tool_path()) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(path = %dir.path, error = %e, "Cannot list ancestor, keeping traverse");
                return Children::Unlisted;
            }
        };

        let mut listed = Vec::new();
        for entry in entries.flatten() {
            if entry.file_name() == LOCK_FILE_NAME {
                continue;
            }
            let kind = match entry.file_type() {
                Ok(ft) => EntryKind::from_file_type(ft),
                Err(_) => return Children::Unlisted,
            };
            if kind.is_symlink() {
                continue;
            }
            let child = FilePathMode::from_path(&entry.path(), kind);
            let roles = self.roles_at(&child);
            listed.push((child, roles));
        }
        Children::Listed(listed)
    }

    /// True if a direct child of `dir` still grants `principal` any role.
    /// Unreadable children count as granting.
    fn still_needed(&self, dir: &FilePathMode, children: &Children, principal: &Principal) -> bool {
        let Children::Listed(listed) = children else {
            return true;
        };
        for (child, roles) in listed {
            if self
                .cleared
                .get(&child.path)
                .is_some_and(|set| set.contains(principal))
            {
                continue;
            }
            match roles {
                Some(roles) if roles.role_of(principal).is_some() => {
                    debug!(
                        path = %dir.path,
                        child = %child.path,
                        principal = %principal,
                        "Traverse still needed"
                    );
                    return true;
                }
                Some(_) => {}
                None => return true,
            }
        }
        false
    }
}

/// Children of an ancestor as seen by the revocation pass
enum Children {
    Listed(Vec<(FilePathMode, Option<RoleMap>)>),
    Unlisted,
}
