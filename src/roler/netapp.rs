//! NetApp ONTAP backend
//!
//! ONTAP wants the owner/group/everyone entries of a directory to carry
//! both inheritance flags, otherwise Windows clients see broken
//! inheritance. Every directory rewrite re-applies `fd` to the surviving
//! system ACEs.

use crate::acl::ace::Ace;
use crate::acl::principal::PrincipalResolver;
use crate::acl::role::{RoleMap, RolePathMap};
use crate::acl::translate::RoleTranslator;
use crate::error::Result;
use crate::roler::{AceEngine, AclTool, BackendKind, Roler};
use crate::walker::FilePathMode;
use std::sync::Arc;
use tracing::debug;

pub struct NetAppRoler {
    engine: AceEngine,
}

impl NetAppRoler {
    pub fn new(
        tool: Arc<dyn AclTool>,
        resolver: Arc<dyn PrincipalResolver>,
        domain: impl Into<String>,
    ) -> Self {
        Self {
            engine: AceEngine::new(RoleTranslator::netapp(), tool, resolver, domain),
        }
    }

    fn fix_system_inheritance(path: &FilePathMode, aces: &mut [Ace]) {
        if !path.is_dir() {
            return;
        }
        for ace in aces.iter_mut().filter(|a| a.is_system()) {
            ace.force_inheritance();
        }
    }
}

impl Roler for NetAppRoler {
    fn kind(&self) -> BackendKind {
        BackendKind::NetApp
    }

    fn get_roles(&self, path: &FilePathMode) -> Result<RolePathMap> {
        let aces = self.engine.read(path)?;
        Ok(RolePathMap::new(path.path.clone(), self.engine.role_map(&aces)))
    }

    fn set_roles(
        &self,
        path: &FilePathMode,
        roles: &RoleMap,
        recursive: bool,
        follow_link: bool,
    ) -> Result<RolePathMap> {
        let current = self.engine.read(path)?;
        let mut next = self.engine.replaced(&current, roles, path.is_dir());
        Self::fix_system_inheritance(path, &mut next);

        debug!(path = %path.path, aces = next.len(), "Setting roles");
        self.engine.write(path, &current, &next, recursive, follow_link)?;

        Ok(RolePathMap::new(path.path.clone(), self.engine.role_map(&next)))
    }

    fn del_roles(
        &self,
        path: &FilePathMode,
        roles: &RoleMap,
        recursive: bool,
        follow_link: bool,
    ) -> Result<RolePathMap> {
        let current = self.engine.read(path)?;
        let mut next = self.engine.removed(&current, roles);
        Self::fix_system_inheritance(path, &mut next);

        debug!(path = %path.path, aces = next.len(), "Removing roles");
        self.engine.write(path, &current, &next, recursive, follow_link)?;

        Ok(RolePathMap::new(path.path.clone(), self.engine.role_map(&next)))
    }
}
