//! Symlink creation, verification, and removal with ownership checks.
//!
//! Every symlink the engine creates points at a payload path inside
//! some package's main subtree, so the link target doubles as the
//! ownership record: nothing is removed unless the target resolves to
//! the path the caller expected.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::error::EngineError;
use crate::package;

/// What occupies a path, checked without following symlinks.
#[derive(Debug)]
pub enum LinkStatus {
    Missing,
    RegularFile,
    Directory,
    Symlink { target: PathBuf },
    BrokenSymlink { target: PathBuf },
}

impl LinkStatus {
    pub fn detect(path: &Path) -> Self {
        if let Ok(target) = fs::read_link(path) {
            if path.exists() {
                Self::Symlink { target }
            } else {
                Self::BrokenSymlink { target }
            }
        } else if path.exists() {
            if path.is_dir() {
                Self::Directory
            } else {
                Self::RegularFile
            }
        } else {
            Self::Missing
        }
    }
}

#[cfg(unix)]
fn create_symlink(target: &Path, link: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(windows)]
fn create_symlink(target: &Path, link: &Path) -> io::Result<()> {
    if target.is_dir() {
        std::os::windows::fs::symlink_dir(target, link)
    } else {
        std::os::windows::fs::symlink_file(target, link)
    }
}

#[cfg(unix)]
fn remove_symlink(path: &Path) -> io::Result<()> {
    fs::remove_file(path)
}

#[cfg(windows)]
fn remove_symlink(path: &Path) -> io::Result<()> {
    // Directory symlinks need remove_dir on Windows
    if path.is_dir() {
        fs::remove_dir(path)
    } else {
        fs::remove_file(path)
    }
}

/// Ensure a symlink at `path` pointing to `target`.
///
/// Returns `true` if the link was created, `false` if an identical link
/// was already present. Anything else occupying the path is a conflict;
/// the caller decides whether that aborts the walk.
pub fn link(path: &Path, target: &Path) -> Result<bool, EngineError> {
    match LinkStatus::detect(path) {
        LinkStatus::Missing => {
            create_symlink(target, path).map_err(|e| EngineError::io(path, e))?;
            Ok(true)
        }
        LinkStatus::Symlink { target: existing } | LinkStatus::BrokenSymlink { target: existing } => {
            if existing == target {
                Ok(false)
            } else {
                Err(EngineError::Conflict {
                    path: path.to_path_buf(),
                    reason: occupant_description(&existing),
                })
            }
        }
        LinkStatus::RegularFile => Err(EngineError::Conflict {
            path: path.to_path_buf(),
            reason: "a real file is already present".to_string(),
        }),
        LinkStatus::Directory => Err(EngineError::Conflict {
            path: path.to_path_buf(),
            reason: "a real directory is already present".to_string(),
        }),
    }
}

/// Remove the symlink at `path` if and only if it resolves to
/// `expected_target`.
///
/// Returns `true` if a link was removed, `false` if nothing was there.
/// A link pointing elsewhere, or a real file, is left untouched and
/// reported as an ownership mismatch so one mod can never delete
/// another's entries.
pub fn unlink(path: &Path, expected_target: &Path) -> Result<bool, EngineError> {
    match LinkStatus::detect(path) {
        LinkStatus::Missing => Ok(false),
        LinkStatus::Symlink { target } | LinkStatus::BrokenSymlink { target } => {
            if target == expected_target {
                remove_symlink(path).map_err(|e| EngineError::io(path, e))?;
                Ok(true)
            } else {
                Err(EngineError::OwnershipMismatch {
                    path: path.to_path_buf(),
                    expected: expected_target.display().to_string(),
                    found: occupant_description(&target),
                })
            }
        }
        LinkStatus::RegularFile => Err(EngineError::OwnershipMismatch {
            path: path.to_path_buf(),
            expected: expected_target.display().to_string(),
            found: "a real file".to_string(),
        }),
        LinkStatus::Directory => Err(EngineError::OwnershipMismatch {
            path: path.to_path_buf(),
            expected: expected_target.display().to_string(),
            found: "a real directory".to_string(),
        }),
    }
}

/// Describe a foreign symlink target, naming its owning package when
/// one can be derived.
fn occupant_description(target: &Path) -> String {
    match package::resolve_owner(target) {
        Some(owner) => format!("symlink to {} (owned by {})", target.display(), owner),
        None => format!("symlink to {}", target.display()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_detect_variants() {
        let temp = TempDir::new().unwrap();

        assert!(matches!(
            LinkStatus::detect(&temp.path().join("missing")),
            LinkStatus::Missing
        ));

        let file = temp.path().join("file");
        fs::write(&file, "x").unwrap();
        assert!(matches!(LinkStatus::detect(&file), LinkStatus::RegularFile));

        let dir = temp.path().join("dir");
        fs::create_dir(&dir).unwrap();
        assert!(matches!(LinkStatus::detect(&dir), LinkStatus::Directory));

        let link = temp.path().join("link");
        create_symlink(&file, &link).unwrap();
        assert!(matches!(LinkStatus::detect(&link), LinkStatus::Symlink { .. }));

        fs::remove_file(&file).unwrap();
        assert!(matches!(
            LinkStatus::detect(&link),
            LinkStatus::BrokenSymlink { .. }
        ));
    }

    #[test]
    fn test_link_creates_and_is_idempotent() {
        let temp = TempDir::new().unwrap();
        let target = temp.path().join("payload");
        fs::create_dir(&target).unwrap();
        let path = temp.path().join("link");

        assert!(link(&path, &target).unwrap());
        assert_eq!(fs::read_link(&path).unwrap(), target);

        // Second call is a no-op success
        assert!(!link(&path, &target).unwrap());
    }

    #[test]
    fn test_link_conflict_with_other_symlink() {
        let temp = TempDir::new().unwrap();
        let mine = temp.path().join("mine");
        let theirs = temp.path().join("theirs");
        fs::create_dir(&mine).unwrap();
        fs::create_dir(&theirs).unwrap();
        let path = temp.path().join("link");
        link(&path, &theirs).unwrap();

        let err = link(&path, &mine).unwrap_err();
        assert!(matches!(err, EngineError::Conflict { .. }));
        // Untouched
        assert_eq!(fs::read_link(&path).unwrap(), theirs);
    }

    #[test]
    fn test_link_conflict_with_real_entry() {
        let temp = TempDir::new().unwrap();
        let target = temp.path().join("payload");
        fs::create_dir(&target).unwrap();
        let path = temp.path().join("occupied");
        fs::write(&path, "hands off").unwrap();

        let err = link(&path, &target).unwrap_err();
        assert!(matches!(err, EngineError::Conflict { .. }));
        assert_eq!(fs::read_to_string(&path).unwrap(), "hands off");
    }

    #[test]
    fn test_unlink_missing_is_noop() {
        let temp = TempDir::new().unwrap();
        let expected = temp.path().join("payload");
        assert!(!unlink(&temp.path().join("missing"), &expected).unwrap());
    }

    #[test]
    fn test_unlink_removes_owned_link() {
        let temp = TempDir::new().unwrap();
        let target = temp.path().join("payload");
        fs::create_dir(&target).unwrap();
        let path = temp.path().join("link");
        link(&path, &target).unwrap();

        assert!(unlink(&path, &target).unwrap());
        assert!(matches!(LinkStatus::detect(&path), LinkStatus::Missing));
    }

    #[test]
    fn test_unlink_protects_foreign_link() {
        let temp = TempDir::new().unwrap();
        let mine = temp.path().join("mine");
        let theirs = temp.path().join("theirs");
        fs::create_dir(&mine).unwrap();
        fs::create_dir(&theirs).unwrap();
        let path = temp.path().join("link");
        link(&path, &theirs).unwrap();

        let err = unlink(&path, &mine).unwrap_err();
        assert!(matches!(err, EngineError::OwnershipMismatch { .. }));
        // The foreign link survives
        assert_eq!(fs::read_link(&path).unwrap(), theirs);
    }

    #[test]
    fn test_unlink_protects_real_file() {
        let temp = TempDir::new().unwrap();
        let expected = temp.path().join("payload");
        let path = temp.path().join("real");
        fs::write(&path, "precious").unwrap();

        let err = unlink(&path, &expected).unwrap_err();
        assert!(matches!(err, EngineError::OwnershipMismatch { .. }));
        assert_eq!(fs::read_to_string(&path).unwrap(), "precious");
    }
}
