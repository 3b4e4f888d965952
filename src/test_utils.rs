//! Shared fixtures for tests.

use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

use crate::paths::Paths;
use crate::profiles::Profile;

/// Create a minimal valid mod package under `dir` and return its root:
/// `README.txt`, `VERSION.txt`, and an empty main subtree.
pub fn make_package(dir: &Path, name: &str, version: &str) -> PathBuf {
    let root = dir.join(name);
    fs::create_dir_all(root.join(name)).unwrap();
    fs::write(root.join("README.txt"), format!("{name} test package\n")).unwrap();
    fs::write(root.join("VERSION.txt"), version).unwrap();
    root
}

/// Create a payload directory chain under the package's main subtree,
/// e.g. `add_payload_dir(&root, "Foo", "Mods/aircraft/Hornet")`.
pub fn add_payload_dir(root: &Path, name: &str, rel: &str) -> PathBuf {
    let path = root.join(name).join(rel);
    fs::create_dir_all(&path).unwrap();
    path
}

/// Create a payload file under the package's main subtree, creating
/// intermediate directories as needed.
pub fn add_payload_file(root: &Path, name: &str, rel: &str, content: &str) -> PathBuf {
    let path = root.join(name).join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(&path, content).unwrap();
    path
}

/// Profile named "Default" pointing at `root`.
pub fn test_profile(root: &Path) -> Profile {
    Profile {
        name: "Default".to_string(),
        root: root.to_path_buf(),
        added_at: chrono::Utc::now(),
    }
}

/// Paths rooted inside a temp directory instead of the real config dir.
pub fn setup_test_paths(temp_dir: &TempDir) -> Paths {
    let config_dir = temp_dir.path().join("config/modlink");
    Paths {
        registry_file: config_dir.join("profiles.json"),
        config_dir,
    }
}
