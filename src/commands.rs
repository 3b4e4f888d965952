//! Command handlers for the CLI.
//!
//! Each function here corresponds to a subcommand in `main.rs` and
//! coordinates the engine (`crate::engine`), the profile registry
//! (`crate::profiles`), and terminal output (`crate::ui`).

use anstyle::AnsiColor;
use anyhow::{Context, Result, bail};
use indicatif::ProgressBar;
use std::fs;
use std::path::Path;

use crate::doctor::run_doctor;
use crate::engine::{self, LifecycleEvent, Notifier, Outcome};
use crate::package::ModPackage;
use crate::paths::Paths;
use crate::profiles::{LockedRegistry, Profile, Registry, validate_profile_name};
use crate::state::EnablementState;
use crate::ui::Ui;

/// Maps engine lifecycle events onto the active spinner.
struct SpinnerNotifier<'a> {
    ui: &'a Ui,
    bar: &'a ProgressBar,
}

impl Notifier for SpinnerNotifier<'_> {
    fn notify(&self, event: LifecycleEvent) {
        match event {
            LifecycleEvent::CleanupStarted { mod_name, .. } => self
                .bar
                .set_message(format!("Cleaning up interrupted enable of '{mod_name}'...")),
            LifecycleEvent::Enabling { mod_name, profile } => self
                .bar
                .set_message(format!("Merging '{mod_name}' into profile '{profile}'...")),
            LifecycleEvent::Disabling { mod_name, profile } => self
                .bar
                .set_message(format!("Removing '{mod_name}' from profile '{profile}'...")),
            LifecycleEvent::Warning { warning } => {
                let ui = self.ui;
                self.bar.suspend(|| ui.warn(warning.to_string()));
            }
            LifecycleEvent::Enabled { .. }
            | LifecycleEvent::Disabled { .. }
            | LifecycleEvent::Error { .. } => {}
        }
    }
}

fn resolve_profile(paths: &Paths, name: Option<&str>) -> Result<Profile> {
    let registry = Registry::read(&paths.registry_file)?;
    Ok(registry.resolve(name)?.clone())
}

/// Enable a mod package for a profile
pub fn enable(paths: &Paths, mod_dir: &Path, profile: Option<&str>, ui: &Ui) -> Result<()> {
    let profile = resolve_profile(paths, profile)?;
    let spinner = ui.spinner(format!("Enabling '{}'...", mod_dir.display()));
    let notifier = SpinnerNotifier { ui, bar: &spinner };

    match engine::enable(mod_dir, &profile, &notifier) {
        Ok(Outcome::AlreadyEnabled) => {
            ui.spinner_finish_ok(
                &spinner,
                format!("Already enabled for profile '{}'", profile.name),
            );
            Ok(())
        }
        Ok(_) => {
            let pkg = ModPackage::validate(mod_dir)?;
            ui.spinner_finish_ok(
                &spinner,
                format!(
                    "Enabled {} {} for profile '{}'",
                    pkg.name, pkg.version, profile.name
                ),
            );
            Ok(())
        }
        Err(e) => {
            ui.spinner_finish_err(&spinner, format!("Enable failed: {e}"));
            if matches!(e, crate::error::EngineError::Conflict { .. }) {
                ui.info(
                    "The installation root was not modified past the conflict. Resolve it, then run enable again.",
                );
            }
            Err(e.into())
        }
    }
}

/// Disable a mod package for a profile
pub fn disable(paths: &Paths, mod_dir: &Path, profile: Option<&str>, ui: &Ui) -> Result<()> {
    let profile = resolve_profile(paths, profile)?;
    let spinner = ui.spinner(format!("Disabling '{}'...", mod_dir.display()));
    let notifier = SpinnerNotifier { ui, bar: &spinner };

    match engine::disable(mod_dir, &profile, &notifier) {
        Ok(report) => {
            match report.outcome {
                Outcome::AlreadyDisabled => ui.spinner_finish_ok(
                    &spinner,
                    format!("Already disabled for profile '{}'", profile.name),
                ),
                _ if report.warnings.is_empty() => ui.spinner_finish_ok(
                    &spinner,
                    format!("Disabled for profile '{}'", profile.name),
                ),
                _ => {
                    ui.spinner_finish_ok(
                        &spinner,
                        format!(
                            "Disabled for profile '{}' ({} entries could not be cleaned)",
                            profile.name,
                            report.warnings.len()
                        ),
                    );
                    ui.info("Entries listed above were left for their owners; rerun disable after resolving them.");
                }
            }
            Ok(())
        }
        Err(e) => {
            ui.spinner_finish_err(&spinner, format!("Disable failed: {e}"));
            Err(e.into())
        }
    }
}

/// Show the lifecycle state of one mod package
pub fn status(paths: &Paths, mod_dir: &Path, profile: Option<&str>, ui: &Ui) -> Result<()> {
    let profile = resolve_profile(paths, profile)?;
    let report = engine::status(mod_dir, &profile)?;

    ui.section(format!("{} {}", report.name, report.version));
    ui.newline();

    let mut table = ui.kv_table();
    table.add_row(vec![ui.cell("Profile:"), ui.cell(&profile.name)]);
    table.add_row(vec![
        ui.cell("Install root:"),
        ui.cell(profile.root.display().to_string()),
    ]);
    let state_cell = match report.state {
        EnablementState::Enabled => ui.colored_cell(report.state.label(), AnsiColor::Green),
        EnablementState::Enabling => ui.colored_cell(report.state.label(), AnsiColor::Yellow),
        EnablementState::Disabled => ui.cell(report.state.label()),
    };
    table.add_row(vec![ui.cell("State:"), state_cell]);
    if let Some(since) = report.since {
        table.add_row(vec![
            ui.cell("Since:"),
            ui.cell(since.format("%Y-%m-%d %H:%M:%S").to_string()),
        ]);
    }
    ui.println(table.to_string());

    if report.state == EnablementState::Enabling {
        ui.newline();
        ui.warn("A previous enable was interrupted. Run enable again to recover, or disable to clean up.");
    }

    Ok(())
}

/// List every valid mod package under a directory with its state
pub fn list(paths: &Paths, mods_dir: &Path, profile: Option<&str>, ui: &Ui) -> Result<()> {
    let profile = resolve_profile(paths, profile)?;

    let mut entries: Vec<_> = fs::read_dir(mods_dir)
        .with_context(|| format!("Failed to read mods directory: {}", mods_dir.display()))?
        .filter_map(|e| e.ok())
        .filter(|e| e.path().is_dir())
        .collect();
    entries.sort_by_key(|e| e.file_name());

    let mut table = ui.table();
    table.set_header(vec![
        ui.header_cell(""),
        ui.header_cell("Mod"),
        ui.header_cell("Version"),
        ui.header_cell(format!("Status ({})", profile.name)),
    ]);

    let mut found = 0;
    let mut skipped = 0;
    for entry in entries {
        let report = match engine::status(&entry.path(), &profile) {
            Ok(report) => report,
            Err(_) => {
                skipped += 1;
                continue;
            }
        };
        found += 1;

        let (icon, state_cell) = match report.state {
            EnablementState::Enabled => (
                ui.icon_ok(),
                ui.colored_cell("enabled", AnsiColor::Green),
            ),
            EnablementState::Enabling => (
                ui.icon_warn(),
                ui.colored_cell("needs cleanup", AnsiColor::Yellow),
            ),
            EnablementState::Disabled => (" ", ui.cell("-")),
        };
        table.add_row(vec![
            ui.cell(icon),
            ui.cell(report.name),
            ui.cell(report.version),
            state_cell,
        ]);
    }

    if found == 0 {
        ui.warn(format!(
            "No mod packages found in {}",
            mods_dir.display()
        ));
        return Ok(());
    }

    ui.section("Mods");
    ui.println(table.to_string());
    if skipped > 0 {
        ui.info(format!("{} entries skipped (not valid mod packages)", skipped));
    }

    Ok(())
}

/// Validate a package without touching anything
pub fn validate(mod_dir: &Path, ui: &Ui) -> Result<()> {
    let pkg = ModPackage::validate(mod_dir)?;
    ui.ok(format!("Valid package: {} {}", pkg.name, pkg.version));
    Ok(())
}

/// Register a new profile
pub fn profile_add(paths: &Paths, name: &str, root: &Path, ui: &Ui) -> Result<()> {
    paths.ensure_dirs()?;
    validate_profile_name(name)?;

    if !root.is_dir() {
        bail!(
            "Installation root does not exist: {}\nHint: The root must be the simulator directory mods get merged into.",
            root.display()
        );
    }
    let root = std::path::absolute(root)
        .with_context(|| format!("Failed to resolve path: {}", root.display()))?;

    let mut locked = LockedRegistry::lock(&paths.registry_file)?;
    if locked.registry().get(name).is_some() {
        bail!(
            "Profile '{}' already exists.\nHint: Use 'modlink profile remove {}' first to replace it.",
            name,
            name
        );
    }

    let first = locked.registry().profiles.is_empty();
    locked.update(|r| {
        r.profiles.push(Profile {
            name: name.to_string(),
            root: root.clone(),
            added_at: chrono::Utc::now(),
        });
        if first {
            r.default_profile = Some(name.to_string());
        }
    })?;

    ui.ok(format!("Added profile '{}' -> {}", name, root.display()));
    if first {
        ui.info(format!("'{}' is now the default profile", name));
    }
    Ok(())
}

/// Remove a profile from the registry (never touches its install root)
pub fn profile_remove(paths: &Paths, name: &str, force: bool, ui: &Ui) -> Result<()> {
    let mut locked = LockedRegistry::lock(&paths.registry_file)?;
    if locked.registry().get(name).is_none() {
        bail!(
            "Profile '{}' does not exist.\nHint: Use 'modlink profile list' to see available profiles.",
            name
        );
    }

    if !force {
        let confirm = inquire::Confirm::new(&format!("Remove profile '{}'?", name))
            .with_default(false)
            .with_help_message("Mods enabled for this profile stay enabled; only the registry entry is removed")
            .prompt()
            .context("Confirmation cancelled")?;

        if !confirm {
            ui.warn("Removal cancelled.");
            return Ok(());
        }
    }

    locked.update(|r| {
        r.profiles.retain(|p| p.name != name);
        if r.default_profile.as_deref() == Some(name) {
            r.default_profile = None;
        }
    })?;

    ui.ok(format!("Removed profile '{}'", name));
    Ok(())
}

/// List registered profiles
pub fn profile_list(paths: &Paths, ui: &Ui) -> Result<()> {
    let registry = Registry::read(&paths.registry_file)?;

    if registry.profiles.is_empty() {
        ui.warn("No profiles registered.");
        ui.newline();
        ui.println("Register one with:");
        ui.println(format!(
            "  {} profile add <name> <installation-root>",
            ui.bold("modlink")
        ));
        return Ok(());
    }

    let mut table = ui.kv_table();
    table.set_header(vec![
        ui.header_cell(""),
        ui.header_cell("Profile"),
        ui.header_cell("Installation root"),
    ]);

    for profile in &registry.profiles {
        let is_default = registry.default_profile.as_deref() == Some(profile.name.as_str());
        let icon = if is_default { ui.icon_ok() } else { " " };
        table.add_row(vec![
            ui.cell(icon),
            ui.cell(&profile.name),
            ui.cell(profile.root.display().to_string()),
        ]);
    }

    ui.section("Profiles");
    ui.println(table.to_string());
    Ok(())
}

/// Make a profile the default
pub fn profile_use(paths: &Paths, name: &str, ui: &Ui) -> Result<()> {
    let mut locked = LockedRegistry::lock(&paths.registry_file)?;
    if locked.registry().get(name).is_none() {
        bail!(
            "Profile '{}' does not exist.\nHint: Use 'modlink profile list' to see available profiles.",
            name
        );
    }

    locked.update(|r| {
        r.default_profile = Some(name.to_string());
    })?;

    ui.ok(format!("Default profile: {}", name));
    Ok(())
}

/// Run diagnostics
pub fn doctor(
    paths: &Paths,
    profile: Option<&str>,
    mods_dir: Option<&Path>,
    ui: &Ui,
) -> Result<()> {
    run_doctor(paths, profile, mods_dir, ui);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{add_payload_dir, make_package, setup_test_paths};
    use crate::ui::ColorMode;
    use tempfile::TempDir;

    fn test_ui() -> Ui {
        Ui::new(ColorMode::Never, false)
    }

    fn register_default(paths: &Paths, root: &Path) {
        let mut locked = LockedRegistry::lock(&paths.registry_file).unwrap();
        locked
            .update(|r| {
                r.profiles.push(Profile {
                    name: "Default".to_string(),
                    root: root.to_path_buf(),
                    added_at: chrono::Utc::now(),
                });
                r.default_profile = Some("Default".to_string());
            })
            .unwrap();
    }

    #[test]
    fn test_profile_add_and_list() {
        let temp = TempDir::new().unwrap();
        let paths = setup_test_paths(&temp);
        let ui = test_ui();
        let root = temp.path().join("install");
        fs::create_dir(&root).unwrap();

        profile_add(&paths, "Default", &root, &ui).unwrap();
        let registry = Registry::read(&paths.registry_file).unwrap();
        assert_eq!(registry.profiles.len(), 1);
        assert_eq!(registry.default_profile, Some("Default".to_string()));

        assert!(profile_list(&paths, &ui).is_ok());
    }

    #[test]
    fn test_profile_add_duplicate() {
        let temp = TempDir::new().unwrap();
        let paths = setup_test_paths(&temp);
        let ui = test_ui();
        let root = temp.path().join("install");
        fs::create_dir(&root).unwrap();

        profile_add(&paths, "Default", &root, &ui).unwrap();
        assert!(profile_add(&paths, "Default", &root, &ui).is_err());
    }

    #[test]
    fn test_profile_add_missing_root() {
        let temp = TempDir::new().unwrap();
        let paths = setup_test_paths(&temp);
        let ui = test_ui();

        assert!(profile_add(&paths, "Default", &temp.path().join("nope"), &ui).is_err());
    }

    #[test]
    fn test_profile_remove_clears_default() {
        let temp = TempDir::new().unwrap();
        let paths = setup_test_paths(&temp);
        let ui = test_ui();
        let root = temp.path().join("install");
        fs::create_dir(&root).unwrap();

        profile_add(&paths, "Default", &root, &ui).unwrap();
        profile_remove(&paths, "Default", true, &ui).unwrap();

        let registry = Registry::read(&paths.registry_file).unwrap();
        assert!(registry.profiles.is_empty());
        assert!(registry.default_profile.is_none());
    }

    #[test]
    fn test_enable_disable_through_commands() {
        let temp = TempDir::new().unwrap();
        let paths = setup_test_paths(&temp);
        let ui = test_ui();
        let install = temp.path().join("install");
        fs::create_dir(&install).unwrap();
        register_default(&paths, &install);

        let mod_root = make_package(temp.path(), "SuperHornet", "1.0.0");
        add_payload_dir(&mod_root, "SuperHornet", "Mods/aircraft/Hornet");

        enable(&paths, &mod_root, None, &ui).unwrap();
        assert!(install.join("Mods/aircraft/Hornet").is_symlink());

        disable(&paths, &mod_root, None, &ui).unwrap();
        assert!(!install.join("Mods").exists());
    }

    #[test]
    fn test_enable_without_profiles_fails() {
        let temp = TempDir::new().unwrap();
        let paths = setup_test_paths(&temp);
        let ui = test_ui();
        let mod_root = make_package(temp.path(), "Foo", "1.0.0");

        assert!(enable(&paths, &mod_root, None, &ui).is_err());
    }

    #[test]
    fn test_list_mixed_directory() {
        let temp = TempDir::new().unwrap();
        let paths = setup_test_paths(&temp);
        let ui = test_ui();
        let install = temp.path().join("install");
        fs::create_dir(&install).unwrap();
        register_default(&paths, &install);

        let mods_dir = temp.path().join("downloads");
        fs::create_dir(&mods_dir).unwrap();
        make_package(&mods_dir, "Foo", "1.0.0");
        fs::create_dir(mods_dir.join("not-a-package")).unwrap();

        assert!(list(&paths, &mods_dir, None, &ui).is_ok());
    }

    #[test]
    fn test_validate_command() {
        let temp = TempDir::new().unwrap();
        let ui = test_ui();
        let mod_root = make_package(temp.path(), "Foo", "1.0.0");

        assert!(validate(&mod_root, &ui).is_ok());
        assert!(validate(&temp.path().join("nope"), &ui).is_err());
    }
}
