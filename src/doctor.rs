//! Diagnostics for a modlink setup.
//!
//! Checks the profile registry, each installation root, the symlinks
//! inside the selected profile's root (broken links, links whose owning
//! package no longer validates), and, when a mods directory is given,
//! stale `ENABLING` markers left by interrupted enables.

use std::fs;
use std::path::{Path, PathBuf};

use crate::links::LinkStatus;
use crate::package::{self, ModPackage};
use crate::paths::Paths;
use crate::profiles::Registry;
use crate::state::{self, EnablementState};
use crate::ui::Ui;

pub fn run_doctor(paths: &Paths, profile: Option<&str>, mods_dir: Option<&Path>, ui: &Ui) {
    ui.section("modlink Doctor");
    ui.newline();

    let registry = match Registry::read(&paths.registry_file) {
        Ok(registry) => registry,
        Err(e) => {
            check_step(ui, "Registry", || {
                ui.println(format!("  {} Registry unreadable: {}", ui.icon_err(), e));
                false
            });
            return;
        }
    };

    check_step(ui, "Registry", || {
        ui.println(format!(
            "  {} Registry readable: {}",
            ui.icon_ok(),
            paths.registry_file.display()
        ));
        if registry.profiles.is_empty() {
            ui.println(format!("  {} No profiles registered", ui.icon_warn()));
            return true;
        }
        match &registry.default_profile {
            Some(name) if registry.get(name).is_some() => {
                ui.println(format!("  {} Default profile: {}", ui.icon_info(), name));
                true
            }
            Some(name) => {
                ui.println(format!(
                    "  {} Default profile '{}' is not registered",
                    ui.icon_err(),
                    name
                ));
                false
            }
            None => {
                ui.println(format!("  {} No default profile set", ui.icon_info()));
                true
            }
        }
    });

    check_step(ui, "Installation roots", || {
        let mut ok = true;
        for profile in &registry.profiles {
            if profile.root.is_dir() {
                ui.println(format!(
                    "  {} {}: {}",
                    ui.icon_ok(),
                    profile.name,
                    profile.root.display()
                ));
            } else {
                ui.println(format!(
                    "  {} {}: missing root {}",
                    ui.icon_err(),
                    profile.name,
                    profile.root.display()
                ));
                ok = false;
            }
        }
        if registry.profiles.is_empty() {
            ui.println(format!("  {} Nothing to check", ui.icon_info()));
        }
        ok
    });

    // Symlink scan is restricted to one profile: full roots are big
    let selected = profile
        .or(registry.default_profile.as_deref())
        .and_then(|name| registry.get(name));

    if let Some(profile) = selected {
        check_step(ui, format!("Symlinks in '{}'", profile.name), || {
            if !profile.root.is_dir() {
                ui.println(format!("  {} Root missing, skipping scan", ui.icon_warn()));
                return true;
            }
            let mut found = Vec::new();
            collect_symlinks(&profile.root, &mut found);

            let mut managed = 0;
            let mut foreign = 0;
            let mut broken = Vec::new();
            let mut orphaned = Vec::new();
            for (path, status) in &found {
                match status {
                    LinkStatus::BrokenSymlink { target } => {
                        broken.push((path, target.clone()));
                    }
                    LinkStatus::Symlink { target } => match package::resolve_owner(target) {
                        Some(_) => managed += 1,
                        None => foreign += 1,
                    },
                    _ => {}
                }
            }
            for (path, target) in &broken {
                if package::resolve_owner(target).is_some() || looks_like_package_payload(target) {
                    orphaned.push(path);
                }
                ui.println(format!(
                    "  {} Broken link {} -> {}",
                    ui.icon_err(),
                    path.display(),
                    target.display()
                ));
            }
            ui.println(format!(
                "  {} {} managed, {} unmanaged, {} broken",
                ui.icon_info(),
                managed,
                foreign,
                broken.len()
            ));
            if !orphaned.is_empty() {
                ui.println(format!(
                    "  {} {} broken links point into mod packages; disable the owning mods to clean up",
                    ui.icon_warn(),
                    orphaned.len()
                ));
            }
            broken.is_empty()
        });
    }

    if let Some(mods_dir) = mods_dir {
        check_step(ui, "Enablement markers", || {
            let mut ok = true;
            let entries = match fs::read_dir(mods_dir) {
                Ok(entries) => entries,
                Err(e) => {
                    ui.println(format!(
                        "  {} Cannot read {}: {}",
                        ui.icon_err(),
                        mods_dir.display(),
                        e
                    ));
                    return false;
                }
            };
            let mut stale = 0;
            for entry in entries.filter_map(|e| e.ok()) {
                let Ok(pkg) = ModPackage::validate(&entry.path()) else {
                    continue;
                };
                for profile in &registry.profiles {
                    if state::read_state(&pkg.root, &profile.name) == EnablementState::Enabling {
                        ui.println(format!(
                            "  {} Interrupted enable: {} (profile '{}')",
                            ui.icon_warn(),
                            pkg.name,
                            profile.name
                        ));
                        stale += 1;
                        ok = false;
                    }
                }
            }
            if stale == 0 {
                ui.println(format!("  {} No stale markers", ui.icon_ok()));
            } else {
                ui.println(format!(
                    "  {} Run enable again on each to recover, or disable to clean up",
                    ui.icon_info()
                ));
            }
            ok
        });
    }
}

/// Heuristic for broken links whose package directory is gone: the
/// target can no longer be resolved to an owner, but a payload-style
/// path is still a strong hint it was ours.
fn looks_like_package_payload(target: &Path) -> bool {
    target
        .ancestors()
        .any(|a| a.join(package::VERSION_FILE).exists())
}

fn collect_symlinks(dir: &Path, found: &mut Vec<(PathBuf, LinkStatus)>) {
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };
    for entry in entries.filter_map(|e| e.ok()) {
        let path = entry.path();
        match LinkStatus::detect(&path) {
            status @ (LinkStatus::Symlink { .. } | LinkStatus::BrokenSymlink { .. }) => {
                found.push((path, status));
            }
            LinkStatus::Directory => collect_symlinks(&path, found),
            _ => {}
        }
    }
}

fn check_step<F>(ui: &Ui, name: impl AsRef<str>, check_fn: F)
where
    F: FnOnce() -> bool,
{
    ui.println(ui.bold(format!("Checking {}...", name.as_ref())));
    let success = check_fn();
    if !success {
        ui.println(format!("  {} Issues detected", ui.icon_err()));
    }
    ui.newline();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{self, NullNotifier};
    use crate::profiles::{LockedRegistry, Profile};
    use crate::test_utils::{add_payload_dir, make_package, setup_test_paths, test_profile};
    use crate::ui::ColorMode;
    use tempfile::TempDir;

    #[test]
    fn test_doctor_smoke() {
        let temp = TempDir::new().unwrap();
        let paths = setup_test_paths(&temp);
        let ui = Ui::new(ColorMode::Never, false);

        let install = temp.path().join("install");
        fs::create_dir(&install).unwrap();
        let mods_dir = temp.path().join("downloads");
        fs::create_dir(&mods_dir).unwrap();
        let mod_root = make_package(&mods_dir, "Foo", "1.0.0");
        add_payload_dir(&mod_root, "Foo", "Mods/aircraft/Falcon");

        let mut locked = LockedRegistry::lock(&paths.registry_file).unwrap();
        locked
            .update(|r| {
                r.profiles.push(Profile {
                    name: "Default".to_string(),
                    root: install.clone(),
                    added_at: chrono::Utc::now(),
                });
                r.default_profile = Some("Default".to_string());
            })
            .unwrap();
        drop(locked);

        engine::enable(&mod_root, &test_profile(&install), &NullNotifier).unwrap();

        // Nothing to assert beyond "does not panic" for the happy path
        run_doctor(&paths, None, Some(&mods_dir), &ui);
    }

    #[test]
    fn test_collect_symlinks_finds_broken() {
        let temp = TempDir::new().unwrap();
        let target = temp.path().join("gone");
        fs::create_dir(&target).unwrap();
        let link = temp.path().join("sub/link");
        fs::create_dir(temp.path().join("sub")).unwrap();
        crate::links::link(&link, &target).unwrap();
        fs::remove_dir(&target).unwrap();

        let mut found = Vec::new();
        collect_symlinks(temp.path(), &mut found);
        assert_eq!(found.len(), 1);
        assert!(matches!(found[0].1, LinkStatus::BrokenSymlink { .. }));
    }
}
