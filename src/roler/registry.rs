//! Mount prefix -> backend table
//!
//! The registry is built once at startup and handed to the orchestrator.
//! Prefixes are stored in directory form (trailing separator) and matched
//! longest first, so `/project_freenas` never falls under `/project`.

use crate::acl::principal::PrincipalResolver;
use crate::error::ConfigError;
use crate::roler::{AclTool, BackendKind, CephFsRoler, FreeNasRoler, NetAppRoler, Roler};
use std::path::MAIN_SEPARATOR;
use std::str::FromStr;
use std::sync::Arc;

/// One `{prefix -> backend}` row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountEntry {
    pub prefix: String,
    pub kind: BackendKind,
}

impl MountEntry {
    pub fn new(prefix: impl Into<String>, kind: BackendKind) -> Self {
        Self {
            prefix: dir_form(&prefix.into()),
            kind,
        }
    }

    /// Built-in filer mounts
    pub fn default_table() -> Vec<MountEntry> {
        vec![
            MountEntry::new("/project", BackendKind::NetApp),
            MountEntry::new("/project_freenas", BackendKind::FreeNas),
            MountEntry::new("/project_cephfs", BackendKind::CephFs),
        ]
    }
}

impl FromStr for MountEntry {
    type Err = ConfigError;

    /// Parses `PREFIX=KIND`, e.g. `/project_scratch=netapp`
    fn from_str(s: &str) -> Result<Self, ConfigError> {
        let invalid = |reason: &str| ConfigError::InvalidMount {
            spec: s.to_string(),
            reason: reason.to_string(),
        };

        let (prefix, kind) = s.split_once('=').ok_or_else(|| invalid("expected PREFIX=KIND"))?;
        let prefix = prefix.trim();
        if !prefix.starts_with(MAIN_SEPARATOR) {
            return Err(invalid("prefix must be an absolute path"));
        }
        let kind = kind
            .trim()
            .parse::<BackendKind>()
            .map_err(|e| invalid(&e.to_string()))?;

        Ok(MountEntry::new(prefix, kind))
    }
}

/// Immutable lookup table from mount prefix to backend
#[derive(Default, Clone)]
pub struct RolerRegistry {
    /// Sorted by descending prefix length
    entries: Vec<(String, Arc<dyn Roler>)>,
}

impl RolerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build every backend of `table` on top of one native tool and resolver
    pub fn from_table(
        table: &[MountEntry],
        tool: Arc<dyn AclTool>,
        resolver: Arc<dyn PrincipalResolver>,
        domain: &str,
    ) -> Self {
        table.iter().fold(Self::new(), |registry, entry| {
            let roler: Arc<dyn Roler> = match entry.kind {
                BackendKind::NetApp => {
                    Arc::new(NetAppRoler::new(tool.clone(), resolver.clone(), domain))
                }
                BackendKind::FreeNas => {
                    Arc::new(FreeNasRoler::new(tool.clone(), resolver.clone(), domain))
                }
                BackendKind::CephFs => Arc::new(CephFsRoler),
            };
            registry.with_roler(&entry.prefix, roler)
        })
    }

    /// Register (or replace) the backend of a prefix
    pub fn with_roler(mut self, prefix: &str, roler: Arc<dyn Roler>) -> Self {
        let prefix = dir_form(prefix);
        self.entries.retain(|(p, _)| *p != prefix);
        self.entries.push((prefix, roler));
        self.entries.sort_by(|a, b| b.0.len().cmp(&a.0.len()));
        self
    }

    /// Backend responsible for `path`, by longest matching prefix
    pub fn lookup(&self, path: &str) -> Option<Arc<dyn Roler>> {
        let path = dir_form(path);
        self.entries
            .iter()
            .find(|(prefix, _)| path.starts_with(prefix.as_str()))
            .map(|(_, roler)| roler.clone())
    }

    /// True if `path` is exactly a registered mount prefix
    pub fn is_mount_root(&self, path: &str) -> bool {
        let path = dir_form(path);
        self.entries.iter().any(|(prefix, _)| *prefix == path)
    }

    /// Registered prefixes with their backend kinds, longest first
    pub fn mounts(&self) -> impl Iterator<Item = (&str, BackendKind)> {
        self.entries.iter().map(|(p, r)| (p.as_str(), r.kind()))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn dir_form(path: &str) -> String {
    let mut s = path.to_string();
    if !s.ends_with(MAIN_SEPARATOR) {
        s.push(MAIN_SEPARATOR);
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acl::principal::StaticResolver;
    use crate::roler::InMemoryTool;

    fn default_registry() -> RolerRegistry {
        RolerRegistry::from_table(
            &MountEntry::default_table(),
            Arc::new(InMemoryTool::new()),
            Arc::new(StaticResolver::new(Vec::<String>::new(), Vec::<String>::new())),
            "example.org",
        )
    }

    #[test]
    fn test_longest_prefix_wins() {
        let registry = default_registry();
        let kind = |p: &str| registry.lookup(p).map(|r| r.kind());

        assert_eq!(kind("/project/3010000.01/"), Some(BackendKind::NetApp));
        assert_eq!(kind("/project_freenas/3010000.01/a.txt"), Some(BackendKind::FreeNas));
        assert_eq!(kind("/project_cephfs/x"), Some(BackendKind::CephFs));
        assert_eq!(kind("/project"), Some(BackendKind::NetApp));
        assert_eq!(kind("/home/alice"), None);
        assert_eq!(kind("/projects/x"), None);
    }

    #[test]
    fn test_mount_roots() {
        let registry = default_registry();
        assert!(registry.is_mount_root("/project"));
        assert!(registry.is_mount_root("/project_freenas/"));
        assert!(!registry.is_mount_root("/project/3010000.01/"));
        assert!(!registry.is_mount_root("/"));
    }

    #[test]
    fn test_with_roler_replaces_prefix() {
        let registry = default_registry().with_roler("/project", Arc::new(CephFsRoler));
        assert_eq!(registry.mounts().count(), 3);
        assert_eq!(
            registry.lookup("/project/a").map(|r| r.kind()),
            Some(BackendKind::CephFs)
        );
    }

    #[test]
    fn test_mount_entry_parse() {
        let entry: MountEntry = "/scratch=FreeNAS".parse().unwrap();
        assert_eq!(entry, MountEntry::new("/scratch/", BackendKind::FreeNas));

        assert!("/scratch".parse::<MountEntry>().is_err());
        assert!("scratch=netapp".parse::<MountEntry>().is_err());
        assert!("/scratch=gpfs".parse::<MountEntry>().is_err());
    }
}
