//! Roles, ACEs and the translation between them

pub mod ace;
pub mod principal;
pub mod role;
pub mod translate;

pub use ace::{format_acl, parse_acl, Ace, AceType};
pub use principal::{PrincipalResolver, StaticResolver, SystemResolver};
pub use role::{Principal, Role, RoleMap, RolePathMap};
pub use translate::{Dialect, RoleTranslator};
