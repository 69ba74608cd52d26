//! Role vocabulary and role assignments
//!
//! Operators speak in roles, filers speak in ACEs. The types here are the
//! operator side: which [`Principal`] holds which [`Role`] on a path.

use crate::error::{AclError, Result};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

/// Prefix marking a group principal in role lists
pub const GROUP_PREFIX: &str = "g:";

/// The three NFSv4 special principals
pub const SYSTEM_PRINCIPALS: [&str; 3] = ["OWNER@", "GROUP@", "EVERYONE@"];

/// Access level of a principal on a filesystem object.
///
/// Variants are declared in decreasing capability so `Ord` sorts Manager
/// first. Traverse only ever grants execute on directories; System is
/// observed on OS owner/group/everyone entries and never assigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Role {
    Manager,
    Contributor,
    Writer,
    Viewer,
    Traverse,
    System,
}

impl Role {
    /// Roles an operator may assign or remove directly
    pub const OPERATOR_ROLES: [Role; 4] =
        [Role::Manager, Role::Contributor, Role::Writer, Role::Viewer];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Manager => "Manager",
            Role::Contributor => "Contributor",
            Role::Writer => "Writer",
            Role::Viewer => "Viewer",
            Role::Traverse => "Traverse",
            Role::System => "System",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = AclError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "manager" => Ok(Role::Manager),
            "contributor" => Ok(Role::Contributor),
            "writer" => Ok(Role::Writer),
            "viewer" => Ok(Role::Viewer),
            "traverse" => Ok(Role::Traverse),
            "system" => Ok(Role::System),
            other => Err(AclError::InvalidRoleSpec(format!("unknown role '{}'", other))),
        }
    }
}

/// A user name, a `g:`-prefixed group name, or a system principal
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct Principal(String);

impl Principal {
    pub fn user(name: &str) -> Self {
        Self(name.to_string())
    }

    pub fn group(name: &str) -> Self {
        Self(format!("{}{}", GROUP_PREFIX, name))
    }

    /// Parse a principal as written in a role list (`alice`, `g:staff`, `OWNER@`)
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        let name = s.strip_prefix(GROUP_PREFIX).unwrap_or(s);
        if name.is_empty() {
            return Err(AclError::InvalidPrincipal(s.to_string()));
        }
        if name.contains(|c: char| c.is_whitespace() || c == ',' || c == ':') {
            return Err(AclError::InvalidPrincipal(s.to_string()));
        }
        Ok(Self(s.to_string()))
    }

    pub fn is_group(&self) -> bool {
        self.0.starts_with(GROUP_PREFIX)
    }

    pub fn is_system(&self) -> bool {
        SYSTEM_PRINCIPALS.contains(&self.0.as_str())
    }

    /// Bare account name without the group prefix
    pub fn name(&self) -> &str {
        self.0.strip_prefix(GROUP_PREFIX).unwrap_or(&self.0)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Mapping Role -> principals holding it
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct RoleMap(BTreeMap<Role, BTreeSet<Principal>>);

impl RoleMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a role map from per-role principal lists, rejecting a principal
    /// that appears under more than one role and the OWNER@/GROUP@/EVERYONE@
    /// principals, whose entries are left to the filer.
    pub fn from_lists<'a, I>(lists: I) -> Result<Self>
    where
        I: IntoIterator<Item = (Role, &'a [Principal])>,
    {
        let mut map = RoleMap::new();
        let mut seen: BTreeMap<&Principal, Role> = BTreeMap::new();

        for (role, principals) in lists {
            if role == Role::System {
                return Err(AclError::InvalidRoleSpec(
                    "the System role cannot be assigned".into(),
                ));
            }
            for p in principals {
                if p.is_system() {
                    return Err(AclError::InvalidRoleSpec(format!(
                        "'{}' cannot be given a role",
                        p
                    )));
                }
                if let Some(prev) = seen.insert(p, role) {
                    return Err(AclError::InvalidRoleSpec(format!(
                        "principal '{}' given for both {} and {}",
                        p, prev, role
                    )));
                }
                map.insert(role, p.clone());
            }
        }

        Ok(map)
    }

    /// Single-role map, used for Traverse grants and removals
    pub fn single(role: Role, principals: impl IntoIterator<Item = Principal>) -> Self {
        let mut map = RoleMap::new();
        for p in principals {
            map.insert(role, p);
        }
        map
    }

    pub fn insert(&mut self, role: Role, principal: Principal) -> bool {
        self.0.entry(role).or_default().insert(principal)
    }

    pub fn get(&self, role: Role) -> Option<&BTreeSet<Principal>> {
        self.0.get(&role)
    }

    pub fn contains(&self, role: Role, principal: &Principal) -> bool {
        self.0.get(&role).is_some_and(|s| s.contains(principal))
    }

    /// Role held by a principal, if any (the strongest one when several)
    pub fn role_of(&self, principal: &Principal) -> Option<Role> {
        self.0
            .iter()
            .find(|(_, set)| set.contains(principal))
            .map(|(role, _)| *role)
    }

    /// True if the principal holds any role other than Traverse
    pub fn grants_beyond_traverse(&self, principal: &Principal) -> bool {
        self.0
            .iter()
            .any(|(role, set)| *role != Role::Traverse && set.contains(principal))
    }

    /// Every principal mentioned under any role
    pub fn principals(&self) -> BTreeSet<Principal> {
        self.0.values().flatten().cloned().collect()
    }

    /// Iterate (role, principal) pairs
    pub fn iter(&self) -> impl Iterator<Item = (Role, &Principal)> {
        self.0
            .iter()
            .flat_map(|(role, set)| set.iter().map(move |p| (*role, p)))
    }

    /// True if any (role, principal) pair of `self` is missing from `other`
    pub fn has_pairs_missing_from(&self, other: &RoleMap) -> bool {
        self.iter().any(|(role, p)| !other.contains(role, p))
    }

    /// True if any (role, principal) pair of `self` is present in `other`
    pub fn has_pairs_present_in(&self, other: &RoleMap) -> bool {
        self.iter().any(|(role, p)| other.contains(role, p))
    }

    pub fn is_empty(&self) -> bool {
        self.0.values().all(|s| s.is_empty())
    }
}

/// The observed or newly-applied role state of one filesystem object
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RolePathMap {
    pub path: String,
    pub roles: RoleMap,
}

impl RolePathMap {
    pub fn new(path: impl Into<String>, roles: RoleMap) -> Self {
        Self {
            path: path.into(),
            roles,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn users(names: &[&str]) -> Vec<Principal> {
        names.iter().map(|n| Principal::parse(n).unwrap()).collect()
    }

    #[test]
    fn test_principal_kinds() {
        let g = Principal::parse("g:staff").unwrap();
        assert!(g.is_group());
        assert_eq!(g.name(), "staff");

        let u = Principal::parse(" alice ").unwrap();
        assert!(!u.is_group());
        assert_eq!(u.as_str(), "alice");

        assert!(Principal::parse("EVERYONE@").unwrap().is_system());
        assert!(Principal::parse("g:").is_err());
        assert!(matches!(
            Principal::parse("a b"),
            Err(AclError::InvalidPrincipal(_))
        ));
    }

    #[test]
    fn test_from_lists_rejects_duplicates() {
        let managers = users(&["alice"]);
        let viewers = users(&["bob", "alice"]);
        let err = RoleMap::from_lists([
            (Role::Manager, managers.as_slice()),
            (Role::Viewer, viewers.as_slice()),
        ])
        .unwrap_err();
        assert!(matches!(err, AclError::InvalidRoleSpec(_)));
    }

    #[test]
    fn test_from_lists_rejects_system() {
        let p = users(&["alice"]);
        assert!(RoleMap::from_lists([(Role::System, p.as_slice())]).is_err());

        let everyone = users(&["bob", "EVERYONE@"]);
        assert!(matches!(
            RoleMap::from_lists([(Role::Viewer, everyone.as_slice())]),
            Err(AclError::InvalidRoleSpec(_))
        ));
    }

    #[test]
    fn test_diff_helpers() {
        let contributors = users(&["bob"]);
        let viewers = users(&["carol"]);
        let current = RoleMap::from_lists([
            (Role::Contributor, contributors.as_slice()),
            (Role::Viewer, viewers.as_slice()),
        ])
        .unwrap();

        let same = RoleMap::single(Role::Contributor, users(&["bob"]));
        assert!(!same.has_pairs_missing_from(&current));

        let moved = RoleMap::single(Role::Viewer, users(&["bob"]));
        assert!(moved.has_pairs_missing_from(&current));
        assert!(!moved.has_pairs_present_in(&current));

        assert_eq!(current.role_of(&Principal::user("carol")), Some(Role::Viewer));
        assert!(current.grants_beyond_traverse(&Principal::user("bob")));
    }

    #[test]
    fn test_role_parse_and_order() {
        assert_eq!("writer".parse::<Role>().unwrap(), Role::Writer);
        assert!("owner".parse::<Role>().is_err());
        assert!(Role::Manager < Role::Viewer);
    }

    #[test]
    fn test_role_map_json() {
        let map = RoleMap::single(Role::Viewer, users(&["carol", "g:lab"]));
        let json = serde_json::to_string(&RolePathMap::new("/project/a/", map)).unwrap();
        assert_eq!(
            json,
            r#"{"path":"/project/a/","roles":{"Viewer":["carol","g:lab"]}}"#
        );
    }
}
