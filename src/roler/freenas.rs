//! FreeNAS (ZFS) backend
//!
//! Directories carry a directory-aspect ACE and an inherit-only file-aspect
//! ACE per principal, plus the Writer delete-denials. Reading roles back
//! only counts Allow ACEs and collapses the two aspects of one principal.

use crate::acl::principal::PrincipalResolver;
use crate::acl::role::{RoleMap, RolePathMap};
use crate::acl::translate::RoleTranslator;
use crate::error::Result;
use crate::roler::{AceEngine, AclTool, BackendKind, Roler};
use crate::walker::FilePathMode;
use std::sync::Arc;
use tracing::debug;

pub struct FreeNasRoler {
    engine: AceEngine,
}

impl FreeNasRoler {
    pub fn new(
        tool: Arc<dyn AclTool>,
        resolver: Arc<dyn PrincipalResolver>,
        domain: impl Into<String>,
    ) -> Self {
        Self {
            engine: AceEngine::new(RoleTranslator::freenas(), tool, resolver, domain),
        }
    }
}

impl Roler for FreeNasRoler {
    fn kind(&self) -> BackendKind {
        BackendKind::FreeNas
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
        let next = self.engine.replaced(&current, roles, path.is_dir());

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
        let next = self.engine.removed(&current, roles);

        debug!(path = %path.path, aces = next.len(), "Removing roles");
        self.engine.write(path, &current, &next, recursive, follow_link)?;

        Ok(RolePathMap::new(path.path.clone(), self.engine.role_map(&next)))
    }
}
