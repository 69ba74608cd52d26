//! Translation between roles and ACEs
//!
//! Each role has a canonical directory mask. Files get the same mask with
//! the execute bit stripped. Writer is an Allow mask without delete rights,
//! preceded by a Deny ACE carrying only the delete bits.
//!
//! NetApp takes one ACE per principal on a directory (`fd` inheritance).
//! FreeNAS takes one directory-aspect ACE (`d`) and one inherit-only
//! file-aspect ACE (`fi`), so a principal shows up twice per directory.
//!
//! Classification runs the other way: an Allow ACE gets the role whose
//! canonical mask has the smallest XOR distance to the ACE's mask. The
//! Writer mask is a strict subset of the Contributor mask, so Writer's
//! canonical mask carries [`WRITER_SENTINEL`] before comparison. An Allow
//! mask holding only part of the delete rights is then never reported as
//! Writer: Writer is exactly "no delete".

use crate::acl::ace::{
    Ace, AceType, FLAG_DIR_INHERIT, FLAG_FILE_INHERIT, FLAG_GROUP, FLAG_INHERIT_ONLY,
};
use crate::acl::role::Role;

/// Character appended to Writer's canonical mask before classification
pub const WRITER_SENTINEL: char = '+';

/// Execute / traverse bit
pub const EXECUTE: char = 'x';

/// Delete bits denied for Writer on directories (delete self, delete child)
pub const DELETE_MASK_DIR: &str = "dD";

/// Delete bit denied for Writer on files
pub const DELETE_MASK_FILE: &str = "d";

/// Canonical directory masks per role
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaskTable {
    pub manager: &'static str,
    pub contributor: &'static str,
    pub writer: &'static str,
    pub viewer: &'static str,
    pub traverse: &'static str,
}

impl MaskTable {
    pub fn mask(&self, role: Role) -> Option<&'static str> {
        match role {
            Role::Manager => Some(self.manager),
            Role::Contributor => Some(self.contributor),
            Role::Writer => Some(self.writer),
            Role::Viewer => Some(self.viewer),
            Role::Traverse => Some(self.traverse),
            Role::System => None,
        }
    }
}

/// Masks used on NetApp ONTAP volumes
pub const NETAPP_MASKS: MaskTable = MaskTable {
    manager: "rwaDdxtTnNcCoy",
    contributor: "rwaDdxtTnNcy",
    writer: "rwaxtTnNcy",
    viewer: "rxtncy",
    traverse: "x",
};

/// Masks used on FreeNAS (ZFS) datasets
pub const FREENAS_MASKS: MaskTable = MaskTable {
    manager: "rwaDdxtTnNcCoy",
    contributor: "rwaDdxtTnNcy",
    writer: "rwaxtTnNcy",
    viewer: "rxtncy",
    traverse: "x",
};

/// How a backend lays out ACEs on a directory
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    /// One ACE per principal with `fd` inheritance
    NetApp,
    /// Separate directory-aspect and inherit-only file-aspect ACEs
    FreeNas,
}

/// Bidirectional role <-> ACE mapping for one backend dialect
#[derive(Debug, Clone)]
pub struct RoleTranslator {
    dialect: Dialect,
    masks: MaskTable,
    /// Candidates in tie-break order, with their comparison masks
    candidates: Vec<(Role, String)>,
}

impl RoleTranslator {
    pub fn new(dialect: Dialect, masks: MaskTable) -> Self {
        let candidates = [
            Role::Manager,
            Role::Contributor,
            Role::Writer,
            Role::Viewer,
            Role::Traverse,
        ]
        .into_iter()
        .filter_map(|role| {
            let mut mask = masks.mask(role)?.to_string();
            if role == Role::Writer {
                mask.push(WRITER_SENTINEL);
            }
            Some((role, mask))
        })
        .collect();

        Self {
            dialect,
            masks,
            candidates,
        }
    }

    pub fn netapp() -> Self {
        Self::new(Dialect::NetApp, NETAPP_MASKS)
    }

    pub fn freenas() -> Self {
        Self::new(Dialect::FreeNas, FREENAS_MASKS)
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Closest-match role of an ACE
    pub fn classify(&self, ace: &Ace) -> Role {
        if ace.is_system() {
            return Role::System;
        }
        if ace.is_deny() && is_delete_only(&ace.mask) {
            return Role::Writer;
        }

        let mut best = Role::System;
        let mut best_distance = usize::MAX;
        for (role, mask) in &self.candidates {
            let d = xor_distance(&ace.mask, mask);
            if d < best_distance {
                best = *role;
                best_distance = d;
            }
        }
        best
    }

    /// ACEs granting `role` to an NFSv4 principal (`who` is already in
    /// `name@domain` form). Deny ACEs come first.
    pub fn to_aces(&self, role: Role, who: &str, is_group: bool, is_directory: bool) -> Vec<Ace> {
        let Some(mask) = self.masks.mask(role) else {
            return Vec::new();
        };
        let g = if is_group { FLAG_GROUP.to_string() } else { String::new() };
        let file_mask = strip_execute(mask);

        if role == Role::Traverse {
            // Execute-only, never inherited, never on files.
            if !is_directory {
                return Vec::new();
            }
            return vec![Ace::new(AceType::Allow, &g, who, mask)];
        }

        if !is_directory {
            let mut aces = Vec::with_capacity(2);
            if role == Role::Writer {
                aces.push(Ace::new(AceType::Deny, &g, who, DELETE_MASK_FILE));
            }
            aces.push(Ace::new(AceType::Allow, &g, who, &file_mask));
            return aces;
        }

        match self.dialect {
            Dialect::NetApp => {
                let flags = format!("{}{}{}", FLAG_FILE_INHERIT, FLAG_DIR_INHERIT, g);
                let mut aces = Vec::with_capacity(2);
                if role == Role::Writer {
                    aces.push(Ace::new(AceType::Deny, &flags, who, DELETE_MASK_DIR));
                }
                aces.push(Ace::new(AceType::Allow, &flags, who, mask));
                aces
            }
            Dialect::FreeNas => {
                let dir_flags = format!("{}{}", FLAG_DIR_INHERIT, g);
                let file_flags = format!("{}{}{}", FLAG_FILE_INHERIT, FLAG_INHERIT_ONLY, g);
                let mut aces = Vec::with_capacity(4);
                if role == Role::Writer {
                    aces.push(Ace::new(AceType::Deny, &dir_flags, who, DELETE_MASK_DIR));
                    aces.push(Ace::new(AceType::Deny, &file_flags, who, DELETE_MASK_FILE));
                }
                aces.push(Ace::new(AceType::Allow, &dir_flags, who, mask));
                aces.push(Ace::new(AceType::Allow, &file_flags, who, &file_mask));
                aces
            }
        }
    }
}

/// Number of characters present in exactly one of the two masks
pub fn xor_distance(a: &str, b: &str) -> usize {
    a.chars().filter(|c| !b.contains(*c)).count() + b.chars().filter(|c| !a.contains(*c)).count()
}

fn strip_execute(mask: &str) -> String {
    mask.chars().filter(|c| *c != EXECUTE).collect()
}

fn is_delete_only(mask: &str) -> bool {
    !mask.is_empty() && mask.chars().all(|c| DELETE_MASK_DIR.contains(c))
}

#[cfg(test)]
mod tests {
    use super::*;

    const ROLES: [Role; 5] = [
        Role::Manager,
        Role::Contributor,
        Role::Writer,
        Role::Viewer,
        Role::Traverse,
    ];

    #[test]
    fn test_round_trip_every_generated_ace() {
        for translator in [RoleTranslator::netapp(), RoleTranslator::freenas()] {
            for role in ROLES {
                for is_dir in [true, false] {
                    for is_group in [true, false] {
                        for ace in translator.to_aces(role, "p@example.org", is_group, is_dir) {
                            assert_eq!(
                                translator.classify(&ace),
                                role,
                                "{:?} {} dir={} ace={}",
                                translator.dialect(),
                                role,
                                is_dir,
                                ace
                            );
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn test_writer_deny_precedes_allow() {
        let t = RoleTranslator::netapp();
        let aces = t.to_aces(Role::Writer, "bob@example.org", false, true);
        assert_eq!(aces.len(), 2);
        assert!(aces[0].is_deny());
        assert_eq!(aces[0].mask, DELETE_MASK_DIR);
        assert!(aces[1].is_allow());
        assert_eq!(aces[0].flags, "fd");

        let file = t.to_aces(Role::Writer, "bob@example.org", false, false);
        assert_eq!(file[0].to_string(), "D::bob@example.org:d");
        assert_eq!(file[1].to_string(), "A::bob@example.org:rwatTnNcy");
    }

    #[test]
    fn test_freenas_directory_aspects() {
        let t = RoleTranslator::freenas();
        let aces = t.to_aces(Role::Viewer, "lab@example.org", true, true);
        let lines: Vec<String> = aces.iter().map(|a| a.to_string()).collect();
        assert_eq!(lines, vec!["A:dg:lab@example.org:rxtncy", "A:fig:lab@example.org:rtncy"]);

        let writer = t.to_aces(Role::Writer, "bob@example.org", false, true);
        assert_eq!(writer.len(), 4);
        assert!(writer[0].is_deny() && writer[1].is_deny());
        assert!(writer[2].is_allow() && writer[3].is_allow());
    }

    #[test]
    fn test_traverse_is_execute_only_on_directories() {
        let t = RoleTranslator::netapp();
        let aces = t.to_aces(Role::Traverse, "bob@example.org", false, true);
        assert_eq!(aces.len(), 1);
        assert_eq!(aces[0].to_string(), "A::bob@example.org:x");
        assert!(t.to_aces(Role::Traverse, "bob@example.org", false, false).is_empty());
    }

    #[test]
    fn test_partial_delete_is_contributor() {
        // one delete bit missing: equally far from Contributor and plain Writer
        let t = RoleTranslator::netapp();
        let ace = Ace::new(AceType::Allow, "fd", "bob@example.org", "rwaDxtTnNcy");
        assert_eq!(t.classify(&ace), Role::Contributor);
    }

    #[test]
    fn test_system_ace() {
        let t = RoleTranslator::netapp();
        let ace = Ace::new(AceType::Allow, "", "OWNER@", "rwaDdxtTnNcCoy");
        assert_eq!(t.classify(&ace), Role::System);
    }

    #[test]
    fn test_xor_distance() {
        assert_eq!(xor_distance("rwx", "rwx"), 0);
        assert_eq!(xor_distance("rwx", "xwr"), 0);
        assert_eq!(xor_distance("rw", "rx"), 2);
        assert_eq!(xor_distance("", "rx"), 2);
    }
}
