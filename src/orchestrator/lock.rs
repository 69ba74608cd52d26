//! Advisory run lock
//!
//! A set or remove run on a directory creates `<dir>/.setacl.lock` holding
//! `"<user> <host> <pid>"`. Only the presence of the file matters; the
//! content tells an operator who to ask. The lock is local to the host
//! that takes it: two hosts mounting the same filer do not see each
//! other's runs unless the lock file itself is on the shared mount.

use crate::acl::principal::current_username;
use crate::error::{AclError, Result};
use crate::walker::FilePathMode;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Lock file name, also excluded from every tree walk
pub const LOCK_FILE_NAME: &str = ".setacl.lock";

/// Who is running the tool
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invoker {
    pub user: String,
    pub host: String,
    pub pid: u32,
}

impl Invoker {
    pub fn new(user: impl Into<String>, host: impl Into<String>, pid: u32) -> Self {
        Self {
            user: user.into(),
            host: host.into(),
            pid,
        }
    }

    /// The effective user of this process on this host
    pub fn current() -> Self {
        let user = current_username().unwrap_or_else(|| "unknown".to_string());
        let host = hostname::get()
            .map(|h| h.to_string_lossy().into_owned())
            .unwrap_or_else(|_| "localhost".to_string());
        Self::new(user, host, std::process::id())
    }

    fn lock_line(&self) -> String {
        format!("{} {} {}", self.user, self.host, self.pid)
    }
}

/// Held lock; the file is removed when this guard drops
#[derive(Debug)]
pub struct RunLock {
    path: PathBuf,
}

impl RunLock {
    /// Create the lock file inside `dir`, failing if it already exists
    pub fn acquire(dir: &FilePathMode, invoker: &Invoker) -> Result<Self> {
        let path = Path::new(dir.as_tool_path()).join(LOCK_FILE_NAME);

        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                let holder = fs::read_to_string(&path)
                    .map(|s| s.trim().to_string())
                    .unwrap_or_default();
                return Err(AclError::AlreadyLocked {
                    path: dir.path.clone(),
                    holder,
                });
            }
            Err(e) => return Err(e.into()),
        };

        let lock = Self { path };
        writeln!(file, "{}", invoker.lock_line())?;
        debug!(lock = %lock.path.display(), "Run lock acquired");
        Ok(lock)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        match fs::remove_file(&self.path) {
            Ok(()) => debug!(lock = %self.path.display(), "Run lock released"),
            Err(e) => warn!(lock = %self.path.display(), error = %e, "Failed to remove run lock"),
        }
    }
}
