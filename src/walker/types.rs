//! Filesystem entry types
//!
//! Directory paths always carry a trailing separator so that "is this path
//! inside that directory" is a plain string prefix test.

use std::fs::{FileType, Metadata};
use std::path::{Path, MAIN_SEPARATOR};

/// Type of filesystem entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryKind {
    /// Regular file
    File,
    /// Directory
    Directory,
    /// Symbolic link (only seen before resolution)
    Symlink,
    /// Device, fifo, socket or anything else
    Other,
}

impl EntryKind {
    pub fn from_file_type(ft: FileType) -> Self {
        if ft.is_dir() {
            EntryKind::Directory
        } else if ft.is_symlink() {
            EntryKind::Symlink
        } else if ft.is_file() {
            EntryKind::File
        } else {
            EntryKind::Other
        }
    }

    pub fn from_metadata(meta: &Metadata) -> Self {
        Self::from_file_type(meta.file_type())
    }

    pub fn is_dir(&self) -> bool {
        *self == EntryKind::Directory
    }

    pub fn is_symlink(&self) -> bool {
        *self == EntryKind::Symlink
    }
}

/// An absolute path with its entry kind
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FilePathMode {
    pub path: String,
    pub kind: EntryKind,
}

impl FilePathMode {
    /// Canonicalizes the directory form of `path`
    pub fn new(path: impl Into<String>, kind: EntryKind) -> Self {
        let mut path = path.into();
        if kind.is_dir() {
            if !path.ends_with(MAIN_SEPARATOR) {
                path.push(MAIN_SEPARATOR);
            }
        } else if path.len() > 1 {
            while path.ends_with(MAIN_SEPARATOR) {
                path.pop();
            }
        }
        Self { path, kind }
    }

    pub fn from_path(path: &Path, kind: EntryKind) -> Self {
        Self::new(path.to_string_lossy().into_owned(), kind)
    }

    pub fn is_dir(&self) -> bool {
        self.kind.is_dir()
    }

    /// True if `self` is `dir` or lies below it
    pub fn is_within(&self, dir: &FilePathMode) -> bool {
        dir.is_dir() && self.path.starts_with(&dir.path)
    }

    /// Parent directory, `None` at the filesystem root
    pub fn parent(&self) -> Option<FilePathMode> {
        let trimmed = self.path.trim_end_matches(MAIN_SEPARATOR);
        if trimmed.is_empty() {
            return None;
        }
        let idx = trimmed.rfind(MAIN_SEPARATOR)?;
        Some(FilePathMode::new(&trimmed[..=idx], EntryKind::Directory))
    }

    /// Last path component
    pub fn file_name(&self) -> &str {
        let trimmed = self.path.trim_end_matches(MAIN_SEPARATOR);
        trimmed
            .rsplit(MAIN_SEPARATOR)
            .next()
            .unwrap_or(trimmed)
    }

    /// Path without the directory trailing separator, as native tools expect it
    pub fn as_tool_path(&self) -> &str {
        if self.path.len() > 1 {
            self.path.trim_end_matches(MAIN_SEPARATOR)
        } else {
            &self.path
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_directory_canonical_form() {
        let dir = FilePathMode::new("/project/a", EntryKind::Directory);
        assert_eq!(dir.path, "/project/a/");
        let file = FilePathMode::new("/project/a/f.txt/", EntryKind::File);
        assert_eq!(file.path, "/project/a/f.txt");
        assert_eq!(dir.as_tool_path(), "/project/a");
    }

    #[test]
    fn test_is_within_respects_component_boundary() {
        let a = FilePathMode::new("/project/a", EntryKind::Directory);
        let inside = FilePathMode::new("/project/a/x", EntryKind::File);
        let sibling = FilePathMode::new("/project/ab/x", EntryKind::File);
        assert!(inside.is_within(&a));
        assert!(a.is_within(&a));
        assert!(!sibling.is_within(&a));
    }

    #[test]
    fn test_parent_chain() {
        let f = FilePathMode::new("/project/a/x.txt", EntryKind::File);
        let p = f.parent().unwrap();
        assert_eq!(p.path, "/project/a/");
        assert_eq!(p.parent().unwrap().path, "/project/");
        assert_eq!(p.parent().unwrap().parent().unwrap().path, "/");
        assert!(FilePathMode::new("/", EntryKind::Directory).parent().is_none());
        assert_eq!(f.file_name(), "x.txt");
        assert_eq!(p.file_name(), "a");
    }
}
