//! Backend-specific role handling
//!
//! A [`Roler`] reads, replaces and removes roles on one filesystem object of
//! one filer type. NetApp and FreeNAS share the ACE rewrite logic in
//! [`AceEngine`] and differ in their [`RoleTranslator`] dialect and in
//! backend quirks; CephFS is not supported.
//!
//! ```text
//!   Orchestrator ──► RolerRegistry::lookup(path) ──► Roler
//!                                                      │
//!                             RoleTranslator ◄─────────┤
//!                                                      ▼
//!                                            AclTool (nfs4_getfacl / nfs4_setfacl)
//! ```

pub mod cephfs;
pub mod freenas;
pub mod netapp;
pub mod registry;
pub mod tool;

pub use cephfs::CephFsRoler;
pub use freenas::FreeNasRoler;
pub use netapp::NetAppRoler;
pub use registry::{MountEntry, RolerRegistry};
pub use tool::{AclTool, InMemoryTool, Nfs4Tool, SetFlags};

use crate::acl::ace::Ace;
use crate::acl::principal::{account_name, is_valid_principal, PrincipalResolver};
use crate::acl::role::{Principal, Role, RoleMap, RolePathMap};
use crate::acl::translate::RoleTranslator;
use crate::error::{Result, RolerError};
use crate::walker::FilePathMode;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::warn;

/// Filer type behind a mount prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    NetApp,
    FreeNas,
    CephFs,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::NetApp => "NetApp",
            BackendKind::FreeNas => "FreeNAS",
            BackendKind::CephFs => "CephFS",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = RolerError;

    fn from_str(s: &str) -> std::result::Result<Self, RolerError> {
        match s.to_ascii_lowercase().as_str() {
            "netapp" => Ok(BackendKind::NetApp),
            "freenas" => Ok(BackendKind::FreeNas),
            "cephfs" => Ok(BackendKind::CephFs),
            other => Err(RolerError::UnknownBackend(other.to_string())),
        }
    }
}

/// Role operations on one filesystem object
pub trait Roler: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// Roles currently granted on `path`
    fn get_roles(&self, path: &FilePathMode) -> Result<RolePathMap>;

    /// Replace the roles of every principal mentioned in `roles`
    fn set_roles(
        &self,
        path: &FilePathMode,
        roles: &RoleMap,
        recursive: bool,
        follow_link: bool,
    ) -> Result<RolePathMap>;

    /// Remove each principal from the role it is listed under in `roles`
    fn del_roles(
        &self,
        path: &FilePathMode,
        roles: &RoleMap,
        recursive: bool,
        follow_link: bool,
    ) -> Result<RolePathMap>;
}

/// Shared ACE machinery of the nfs4-tool based backends
pub struct AceEngine {
    translator: RoleTranslator,
    tool: Arc<dyn AclTool>,
    resolver: Arc<dyn PrincipalResolver>,
    domain: String,
}

impl AceEngine {
    pub fn new(
        translator: RoleTranslator,
        tool: Arc<dyn AclTool>,
        resolver: Arc<dyn PrincipalResolver>,
        domain: impl Into<String>,
    ) -> Self {
        Self {
            translator,
            tool,
            resolver,
            domain: domain.into(),
        }
    }

    pub fn translator(&self) -> &RoleTranslator {
        &self.translator
    }

    /// Role-list principal of an ACE
    pub fn principal_of(&self, ace: &Ace) -> Principal {
        if ace.is_system() {
            return Principal::user(&ace.principal);
        }
        let name = account_name(&ace.principal);
        if ace.is_group() {
            Principal::group(name)
        } else {
            Principal::user(name)
        }
    }

    /// NFSv4 form of a role-list principal
    fn who(&self, principal: &Principal) -> String {
        if principal.is_system() {
            principal.as_str().to_string()
        } else {
            format!("{}@{}", principal.name(), self.domain)
        }
    }

    /// Current ACL of a path
    pub fn read(&self, path: &FilePathMode) -> Result<Vec<Ace>> {
        Ok(self.tool.get_acl(path.as_tool_path())?)
    }

    /// Write `aces` unless they equal `current`
    pub fn write(
        &self,
        path: &FilePathMode,
        current: &[Ace],
        aces: &[Ace],
        recursive: bool,
        follow_link: bool,
    ) -> Result<()> {
        if current == aces && !recursive {
            return Ok(());
        }
        let flags = SetFlags {
            recursive,
            follow_link,
        };
        Ok(self.tool.set_acl(path.as_tool_path(), aces, flags)?)
    }

    /// Classify every Allow ACE into a role map; Deny ACEs are not grants
    pub fn role_map(&self, aces: &[Ace]) -> RoleMap {
        let mut map = RoleMap::new();
        for ace in aces.iter().filter(|a| a.is_allow()) {
            let role = self.translator.classify(ace);
            if role != Role::System {
                map.insert(role, self.principal_of(ace));
            }
        }
        map
    }

    /// Fresh ACEs for every (role, principal) pair, dropping unresolvable principals
    pub fn fresh_aces(&self, roles: &RoleMap, is_directory: bool) -> Vec<Ace> {
        let mut aces = Vec::new();
        for (role, principal) in roles.iter() {
            let generated = self.translator.to_aces(
                role,
                &self.who(principal),
                principal.is_group(),
                is_directory,
            );
            match generated.first() {
                Some(ace) if !is_valid_principal(self.resolver.as_ref(), ace) => {
                    warn!(principal = %principal, role = %role, "Unresolvable principal dropped");
                }
                _ => aces.extend(generated),
            }
        }
        aces
    }

    /// ACL after replacing every mentioned principal with fresh ACEs
    pub fn replaced(&self, current: &[Ace], roles: &RoleMap, is_directory: bool) -> Vec<Ace> {
        let mentioned = roles.principals();
        let mut next = self.fresh_aces(roles, is_directory);
        next.extend(
            current
                .iter()
                .filter(|a| a.is_system() || !mentioned.contains(&self.principal_of(a)))
                .cloned(),
        );
        next
    }

    /// ACL after dropping ACEs whose principal is listed under the ACE's own role
    pub fn removed(&self, current: &[Ace], roles: &RoleMap) -> Vec<Ace> {
        current
            .iter()
            .filter(|a| {
                a.is_system()
                    || !roles.contains(self.translator.classify(a), &self.principal_of(a))
            })
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acl::ace::AceType;
    use crate::acl::principal::StaticResolver;

    fn engine() -> AceEngine {
        AceEngine::new(
            RoleTranslator::netapp(),
            Arc::new(InMemoryTool::new()),
            Arc::new(StaticResolver::new(["alice", "bob"], ["lab"])),
            "example.org",
        )
    }

    #[test]
    fn test_backend_kind_parse() {
        assert_eq!("NetApp".parse::<BackendKind>().unwrap(), BackendKind::NetApp);
        assert_eq!("freenas".parse::<BackendKind>().unwrap(), BackendKind::FreeNas);
        assert!("gpfs".parse::<BackendKind>().is_err());
    }

    #[test]
    fn test_principal_mapping() {
        let e = engine();
        let g = Ace::new(AceType::Allow, "fdg", "lab@example.org", "rxtncy");
        assert_eq!(e.principal_of(&g), Principal::group("lab"));
        assert_eq!(e.who(&Principal::group("lab")), "lab@example.org");
        assert_eq!(e.who(&Principal::user("EVERYONE@")), "EVERYONE@");
    }

    #[test]
    fn test_unresolvable_principal_dropped() {
        let e = engine();
        let roles = RoleMap::single(
            Role::Viewer,
            [Principal::user("alice"), Principal::user("mallory")],
        );
        let aces = e.fresh_aces(&roles, true);
        assert_eq!(aces.len(), 1);
        assert_eq!(aces[0].principal, "alice@example.org");
    }

    #[test]
    fn test_replace_is_per_principal() {
        let e = engine();
        let current = vec![
            Ace::new(AceType::Allow, "fd", "alice@example.org", "rxtncy"),
            Ace::new(AceType::Allow, "fd", "bob@example.org", "rxtncy"),
            Ace::new(AceType::Allow, "", "OWNER@", "rwaDxtTnNcCy"),
        ];
        let roles = RoleMap::single(Role::Manager, [Principal::user("alice")]);
        let next = e.replaced(&current, &roles, true);
        let map = e.role_map(&next);
        assert!(map.contains(Role::Manager, &Principal::user("alice")));
        assert!(!map.contains(Role::Viewer, &Principal::user("alice")));
        assert!(map.contains(Role::Viewer, &Principal::user("bob")));
        assert_eq!(next.last().unwrap().principal, "OWNER@");
    }

    #[test]
    fn test_remove_is_role_scoped() {
        let e = engine();
        let current = vec![Ace::new(AceType::Allow, "fd", "alice@example.org", "rwaDdxtTnNcCoy")];
        let wrong_role = RoleMap::single(Role::Contributor, [Principal::user("alice")]);
        assert_eq!(e.removed(&current, &wrong_role), current);

        let right_role = RoleMap::single(Role::Manager, [Principal::user("alice")]);
        assert!(e.removed(&current, &right_role).is_empty());
    }
}
