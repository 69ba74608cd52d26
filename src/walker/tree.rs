//! Tree walker
//!
//! A single producer thread enumerates the tree below a root and feeds a
//! bounded channel, so a slow consumer throttles directory reads instead
//! of letting entries pile up in memory. `read_dir` hands entries out of
//! `getdents64` blocks and `DirEntry::file_type` comes from `d_type`, so
//! no per-entry stat is needed outside of symlink resolution.
//!
//! Symlinks are followed one level only: the referent is emitted and, if
//! it is a directory, walked with symlink following turned off. There is
//! no cycle detection beyond that.

use crate::error::{AclError, Result};
use crate::walker::types::{EntryKind, FilePathMode};
use crossbeam_channel::{bounded, Receiver, Sender};
use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use tracing::{debug, trace, warn};

/// Walk behavior
#[derive(Debug, Clone)]
pub struct WalkOptions {
    /// Descend below the root
    pub recursive: bool,

    /// Resolve symlinks (one level) instead of skipping them
    pub follow_symlinks: bool,

    /// Emit directories only
    pub skip_files: bool,

    /// Channel capacity between the walker and its consumer
    pub buffer_size: usize,

    /// Entry names never emitted nor descended into
    pub exclude_names: Vec<String>,
}

impl Default for WalkOptions {
    fn default() -> Self {
        Self {
            recursive: true,
            follow_symlinks: false,
            skip_files: false,
            buffer_size: 64,
            exclude_names: Vec::new(),
        }
    }
}

/// Start walking `root`. Fails only if `root` itself cannot be inspected,
/// or cannot be listed when the walk is recursive; everything below it is
/// best-effort.
pub fn walk(root: &FilePathMode, opts: WalkOptions) -> Result<Receiver<FilePathMode>> {
    let not_found = |e: std::io::Error| AclError::PathNotFound {
        path: root.path.clone(),
        reason: e.to_string(),
    };
    let meta = fs::metadata(root.as_tool_path()).map_err(not_found)?;
    let root = FilePathMode::new(root.path.clone(), EntryKind::from_metadata(&meta));
    if root.is_dir() && opts.recursive {
        fs::read_dir(root.as_tool_path()).map_err(not_found)?;
    }

    let (tx, rx) = bounded(opts.buffer_size.max(1));

    thread::Builder::new()
        .name("tree-walker".into())
        .spawn(move || {
            let mut walker = TreeWalker { opts, tx, emitted: 0 };
            walker.run(root);
            debug!(entries = walker.emitted, "Tree walk finished");
        })?;

    Ok(rx)
}

struct TreeWalker {
    opts: WalkOptions,
    tx: Sender<FilePathMode>,
    emitted: u64,
}

impl TreeWalker {
    fn run(&mut self, root: FilePathMode) {
        let descend = root.is_dir() && self.opts.recursive;
        let root_dir = PathBuf::from(root.as_tool_path());
        if !self.emit(root) || !descend {
            return;
        }
        self.descend(vec![(root_dir, self.opts.follow_symlinks)]);
    }

    /// Depth-first over `stack` of (directory, follow symlinks below it).
    /// A directory that cannot be listed is logged and its subtree skipped.
    fn descend(&mut self, mut stack: Vec<(PathBuf, bool)>) {
        while let Some((dir, follow)) = stack.pop() {
            let entries = match fs::read_dir(&dir) {
                Ok(entries) => entries,
                Err(e) => {
                    warn!(
                        path = %dir.display(),
                        error = %e,
                        "Cannot read directory, skipping subtree"
                    );
                    continue;
                }
            };

            for entry in entries {
                let entry = match entry {
                    Ok(entry) => entry,
                    Err(e) => {
                        warn!(path = %dir.display(), error = %e, "Directory read failed midway");
                        break;
                    }
                };
                let name = entry.file_name();
                if self
                    .opts
                    .exclude_names
                    .iter()
                    .any(|n| name.to_str() == Some(n.as_str()))
                {
                    continue;
                }

                let path = entry.path();
                let kind = match entry.file_type() {
                    Ok(ft) => EntryKind::from_file_type(ft),
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "Cannot determine entry type");
                        continue;
                    }
                };

                let (path, kind, follow_below) = match kind {
                    EntryKind::Symlink if !follow => {
                        warn!(path = %path.display(), "Skipping symlink");
                        continue;
                    }
                    EntryKind::Symlink => match resolve(&path) {
                        Some((target, kind)) => {
                            trace!(
                                link = %path.display(),
                                target = %target.display(),
                                "Following symlink"
                            );
                            (target, kind, false)
                        }
                        None => continue,
                    },
                    kind => (path, kind, follow),
                };

                if kind.is_dir() {
                    if !self.emit(FilePathMode::from_path(&path, kind)) {
                        return;
                    }
                    stack.push((path, follow_below));
                } else if !self.opts.skip_files
                    && !self.emit(FilePathMode::from_path(&path, kind))
                {
                    return;
                }
            }
        }
    }

    /// Returns false once the consumer is gone
    fn emit(&mut self, entry: FilePathMode) -> bool {
        self.emitted += 1;
        self.tx.send(entry).is_ok()
    }
}

fn resolve(link: &Path) -> Option<(PathBuf, EntryKind)> {
    let target = match fs::canonicalize(link) {
        Ok(target) => target,
        Err(e) => {
            warn!(path = %link.display(), error = %e, "Dangling symlink");
            return None;
        }
    };
    match fs::metadata(&target) {
        Ok(meta) => Some((target, EntryKind::from_metadata(&meta))),
        Err(e) => {
            warn!(path = %target.display(), error = %e, "Cannot stat symlink target");
            None
        }
    }
}
