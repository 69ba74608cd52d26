//! CephFS backend
//!
//! CephFS project storage is not managed through NFSv4 ACLs; every
//! operation reports [`RolerError::NotImplemented`].

use crate::acl::role::{RoleMap, RolePathMap};
use crate::error::{Result, RolerError};
use crate::roler::{BackendKind, Roler};
use crate::walker::FilePathMode;

#[derive(Debug, Default, Clone, Copy)]
pub struct CephFsRoler;

impl CephFsRoler {
    fn unsupported(operation: &'static str) -> RolerError {
        RolerError::NotImplemented {
            backend: BackendKind::CephFs.as_str(),
            operation,
        }
    }
}

impl Roler for CephFsRoler {
    fn kind(&self) -> BackendKind {
        BackendKind::CephFs
    }

    fn get_roles(&self, _path: &FilePathMode) -> Result<RolePathMap> {
        Err(Self::unsupported("GetRoles").into())
    }

    fn set_roles(
        &self,
        _path: &FilePathMode,
        _roles: &RoleMap,
        _recursive: bool,
        _follow_link: bool,
    ) -> Result<RolePathMap> {
        Err(Self::unsupported("SetRoles").into())
    }

    fn del_roles(
        &self,
        _path: &FilePathMode,
        _roles: &RoleMap,
        _recursive: bool,
        _follow_link: bool,
    ) -> Result<RolePathMap> {
        Err(Self::unsupported("DelRoles").into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AclError;
    use crate::walker::EntryKind;

    #[test]
    fn test_all_operations_unimplemented() {
        let roler = CephFsRoler;
        let path = FilePathMode::new("/project_cephfs/p3", EntryKind::Directory);
        let roles = RoleMap::new();

        for result in [
            roler.get_roles(&path),
            roler.set_roles(&path, &roles, false, false),
            roler.del_roles(&path, &roles, false, false),
        ] {
            assert!(matches!(
                result,
                Err(AclError::Roler(RolerError::NotImplemented { .. }))
            ));
        }
    }
}
