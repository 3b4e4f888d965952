//! Mod package validation and ownership resolution.
//!
//! A package on disk looks like:
//!
//! ```text
//! SuperHornet/
//!   README.txt
//!   VERSION.txt          <- trimmed content is the version string
//!   SuperHornet/         <- "main subtree", same name as the package
//!     Mods/aircraft/...  <- payload
//! ```
//!
//! Validation is a pure read gate run before every enable or disable;
//! it never mutates anything.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{EngineError, StructureError};

pub const README_FILE: &str = "README.txt";
pub const VERSION_FILE: &str = "VERSION.txt";

/// Identity of a package as derived from the filesystem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModIdentity {
    pub name: String,
    pub version: String,
}

impl std::fmt::Display for ModIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.name, self.version)
    }
}

/// A validated mod package.
#[derive(Debug, Clone)]
pub struct ModPackage {
    /// Canonicalized package root.
    pub root: PathBuf,
    pub name: String,
    pub version: String,
    /// The same-named subdirectory holding the payload tree.
    pub main_subtree: PathBuf,
}

impl ModPackage {
    /// Check the required package shape and read its version.
    ///
    /// The root is canonicalized first so that symlinks created from
    /// the payload later carry stable absolute targets.
    pub fn validate(root: &Path) -> Result<Self, EngineError> {
        let root = fs::canonicalize(root).map_err(|e| EngineError::io(root, e))?;
        let name = root
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| StructureError::InvalidRoot(root.clone()))?
            .to_string();

        if !root.join(README_FILE).is_file() {
            return Err(StructureError::MissingReadme(root).into());
        }
        let version_path = root.join(VERSION_FILE);
        if !version_path.is_file() {
            return Err(StructureError::MissingVersionFile(root).into());
        }
        let version = fs::read_to_string(&version_path)
            .map_err(|e| EngineError::io(&version_path, e))?
            .trim()
            .to_string();

        let main_subtree = find_main_subtree(&root, &name)?;

        Ok(Self {
            root,
            name,
            version,
            main_subtree,
        })
    }

    pub fn identity(&self) -> ModIdentity {
        ModIdentity {
            name: self.name.clone(),
            version: self.version.clone(),
        }
    }
}

/// Locate the main subtree, enforcing the case-sensitive name match.
///
/// A directory listing is consulted instead of a bare `join(..).is_dir()`
/// so that a casing mismatch is reported as such even on filesystems
/// that resolve paths case-insensitively.
fn find_main_subtree(root: &Path, name: &str) -> Result<PathBuf, EngineError> {
    let mut case_variant: Option<String> = None;
    for entry in fs::read_dir(root).map_err(|e| EngineError::io(root, e))? {
        let entry = entry.map_err(|e| EngineError::io(root, e))?;
        if !entry.path().is_dir() {
            continue;
        }
        let file_name = entry.file_name();
        let Some(entry_name) = file_name.to_str() else {
            continue;
        };
        if entry_name == name {
            return Ok(entry.path());
        }
        if entry_name.eq_ignore_ascii_case(name) {
            case_variant = Some(entry_name.to_string());
        }
    }

    match case_variant {
        Some(found) => Err(StructureError::NameMismatch {
            expected: name.to_string(),
            found,
        }
        .into()),
        None => Err(StructureError::MissingMainSubtree(root.join(name)).into()),
    }
}

/// Derive the owning package of a payload path, typically a symlink
/// target, by searching its ancestors for a directory that validates
/// as a package root whose main subtree contains the path.
///
/// Ownership is never stored anywhere; it is always re-derived from
/// the filesystem like this, which is what makes recovery after an
/// arbitrary process death possible.
pub fn resolve_owner(target: &Path) -> Option<ModIdentity> {
    for ancestor in target.ancestors().skip(1) {
        if !ancestor.join(VERSION_FILE).is_file() || !ancestor.join(README_FILE).is_file() {
            continue;
        }
        if let Ok(pkg) = ModPackage::validate(ancestor) {
            if target.starts_with(&pkg.main_subtree) {
                return Some(pkg.identity());
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::make_package;
    use tempfile::TempDir;

    #[test]
    fn test_validate_ok() {
        let temp = TempDir::new().unwrap();
        let root = make_package(temp.path(), "SuperHornet", "1.0.0");

        let pkg = ModPackage::validate(&root).unwrap();
        assert_eq!(pkg.name, "SuperHornet");
        assert_eq!(pkg.version, "1.0.0");
        assert!(pkg.main_subtree.ends_with("SuperHornet/SuperHornet"));
    }

    #[test]
    fn test_validate_trims_version() {
        let temp = TempDir::new().unwrap();
        let root = make_package(temp.path(), "Foo", "2.1.0\n");
        let pkg = ModPackage::validate(&root).unwrap();
        assert_eq!(pkg.version, "2.1.0");
    }

    #[test]
    fn test_validate_missing_readme() {
        let temp = TempDir::new().unwrap();
        let root = make_package(temp.path(), "Foo", "1.0.0");
        fs::remove_file(root.join(README_FILE)).unwrap();

        let err = ModPackage::validate(&root).unwrap_err();
        assert!(matches!(
            err,
            EngineError::Structure(StructureError::MissingReadme(_))
        ));
    }

    #[test]
    fn test_validate_missing_version_file() {
        let temp = TempDir::new().unwrap();
        let root = make_package(temp.path(), "Foo", "1.0.0");
        fs::remove_file(root.join(VERSION_FILE)).unwrap();

        let err = ModPackage::validate(&root).unwrap_err();
        assert!(matches!(
            err,
            EngineError::Structure(StructureError::MissingVersionFile(_))
        ));
    }

    #[test]
    fn test_validate_missing_main_subtree() {
        let temp = TempDir::new().unwrap();
        let root = make_package(temp.path(), "Foo", "1.0.0");
        fs::remove_dir_all(root.join("Foo")).unwrap();

        let err = ModPackage::validate(&root).unwrap_err();
        assert!(matches!(
            err,
            EngineError::Structure(StructureError::MissingMainSubtree(_))
        ));
    }

    #[test]
    fn test_validate_name_case_mismatch() {
        let temp = TempDir::new().unwrap();
        let root = make_package(temp.path(), "Foo", "1.0.0");
        fs::rename(root.join("Foo"), root.join("foo")).unwrap();

        let err = ModPackage::validate(&root).unwrap_err();
        match err {
            EngineError::Structure(StructureError::NameMismatch { expected, found }) => {
                assert_eq!(expected, "Foo");
                assert_eq!(found, "foo");
            }
            other => panic!("expected NameMismatch, got {other:?}"),
        }
    }

    #[test]
    fn test_resolve_owner_finds_package() {
        let temp = TempDir::new().unwrap();
        let root = make_package(temp.path(), "Foo", "1.0.0");
        let payload = root.join("Foo/Mods/aircraft/Hornet");
        fs::create_dir_all(&payload).unwrap();

        let target = fs::canonicalize(&payload).unwrap();
        let owner = resolve_owner(&target).unwrap();
        assert_eq!(owner.name, "Foo");
        assert_eq!(owner.version, "1.0.0");
    }

    #[test]
    fn test_resolve_owner_unrelated_path() {
        let temp = TempDir::new().unwrap();
        let stray = temp.path().join("somewhere/else");
        fs::create_dir_all(&stray).unwrap();
        assert!(resolve_owner(&stray).is_none());
    }
}
