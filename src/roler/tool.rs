//! Native ACL tool invocation
//!
//! Every role mutation ends in a blocking `nfs4_setfacl` process; every
//! read in `nfs4_getfacl`. The [`AclTool`] trait is the seam between the
//! rolers and those processes.

use crate::acl::ace::{format_acl, parse_acl, Ace, AceType};
use crate::error::{ToolError, ToolResult};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::process::Command;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::trace;

/// Options passed through to the setter
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SetFlags {
    pub recursive: bool,
    pub follow_link: bool,
}

/// Reads and replaces the ACL of one filesystem object
pub trait AclTool: Send + Sync {
    fn get_acl(&self, path: &str) -> ToolResult<Vec<Ace>>;
    fn set_acl(&self, path: &str, aces: &[Ace], flags: SetFlags) -> ToolResult<()>;
}

/// The nfs4-acl-tools pair
#[derive(Debug, Clone)]
pub struct Nfs4Tool {
    getter: String,
    setter: String,
}

impl Default for Nfs4Tool {
    fn default() -> Self {
        Self {
            getter: "nfs4_getfacl".into(),
            setter: "nfs4_setfacl".into(),
        }
    }
}

impl Nfs4Tool {
    /// Use alternative binaries (e.g. absolute paths)
    pub fn with_binaries(getter: impl Into<String>, setter: impl Into<String>) -> Self {
        Self {
            getter: getter.into(),
            setter: setter.into(),
        }
    }

    /// Arguments for one setter invocation; the ACL is a single comma-joined argument
    pub fn set_args(path: &str, aces: &[Ace], flags: SetFlags) -> Vec<String> {
        let mut args = Vec::with_capacity(5);
        if flags.recursive {
            args.push("-R".to_string());
        }
        if flags.follow_link {
            args.push("-L".to_string());
        }
        args.push("-s".to_string());
        args.push(format_acl(aces));
        args.push(path.to_string());
        args
    }

    fn run(&self, tool: &str, args: &[String], path: &str) -> ToolResult<Vec<u8>> {
        trace!(tool = tool, args = ?args, "Running ACL tool");

        let output = Command::new(tool)
            .args(args)
            .output()
            .map_err(|e| ToolError::Spawn {
                tool: tool.to_string(),
                reason: e.to_string(),
            })?;

        if !output.status.success() {
            return Err(ToolError::Failed {
                tool: tool.to_string(),
                path: path.to_string(),
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(output.stdout)
    }
}

impl AclTool for Nfs4Tool {
    fn get_acl(&self, path: &str) -> ToolResult<Vec<Ace>> {
        let stdout = self.run(&self.getter, &[path.to_string()], path)?;
        parse_acl(&String::from_utf8_lossy(&stdout))
    }

    fn set_acl(&self, path: &str, aces: &[Ace], flags: SetFlags) -> ToolResult<()> {
        let args = Self::set_args(path, aces, flags);
        self.run(&self.setter, &args, path).map(|_| ())
    }
}

/// ACLs held in memory, keyed by path.
///
/// Stands in for a filer when exercising rolers and the orchestrator:
/// unknown paths report `default_acl`, and every call is counted.
#[derive(Debug)]
pub struct InMemoryTool {
    acls: Mutex<HashMap<String, Vec<Ace>>>,
    failing: Mutex<HashSet<String>>,
    default_acl: Vec<Ace>,
    gets: AtomicU64,
    sets: AtomicU64,
}

impl Default for InMemoryTool {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryTool {
    /// Tool whose unknown paths carry plain owner/group/everyone entries
    pub fn new() -> Self {
        Self::with_default_acl(vec![
            Ace::new(AceType::Allow, "", "OWNER@", "rwaDxtTnNcCy"),
            Ace::new(AceType::Allow, "", "GROUP@", "rxtncy"),
            Ace::new(AceType::Allow, "", "EVERYONE@", "rxtncy"),
        ])
    }

    pub fn with_default_acl(default_acl: Vec<Ace>) -> Self {
        Self {
            acls: Mutex::new(HashMap::new()),
            failing: Mutex::new(HashSet::new()),
            default_acl,
            gets: AtomicU64::new(0),
            sets: AtomicU64::new(0),
        }
    }

    /// Current ACL of a path
    pub fn acl_of(&self, path: &str) -> Vec<Ace> {
        self.acls
            .lock()
            .get(normalize(path))
            .cloned()
            .unwrap_or_else(|| self.default_acl.clone())
    }

    /// Make every subsequent call on `path` fail like a non-zero tool exit
    pub fn fail_on(&self, path: &str) {
        self.failing.lock().insert(normalize(path).to_string());
    }

    pub fn get_calls(&self) -> u64 {
        self.gets.load(Ordering::Relaxed)
    }

    pub fn set_calls(&self) -> u64 {
        self.sets.load(Ordering::Relaxed)
    }

    fn check(&self, tool: &str, path: &str) -> ToolResult<()> {
        if self.failing.lock().contains(normalize(path)) {
            return Err(ToolError::Failed {
                tool: tool.to_string(),
                path: path.to_string(),
                code: Some(1),
                stderr: "Operation not permitted".into(),
            });
        }
        Ok(())
    }
}

impl AclTool for InMemoryTool {
    fn get_acl(&self, path: &str) -> ToolResult<Vec<Ace>> {
        self.gets.fetch_add(1, Ordering::Relaxed);
        self.check("getfacl", path)?;
        Ok(self.acl_of(path))
    }

    fn set_acl(&self, path: &str, aces: &[Ace], _flags: SetFlags) -> ToolResult<()> {
        self.sets.fetch_add(1, Ordering::Relaxed);
        self.check("setfacl", path)?;
        self.acls
            .lock()
            .insert(normalize(path).to_string(), aces.to_vec());
        Ok(())
    }
}

fn normalize(path: &str) -> &str {
    if path.len() > 1 {
        path.trim_end_matches('/')
    } else {
        path
    }
}
