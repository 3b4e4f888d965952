//! On-disk lifecycle markers for a (package, profile) pair.
//!
//! The engine has no resident process, so lifecycle state lives as
//! zero-byte marker files in the mod's own root directory (never in
//! the installation root): `ENABLING-<profile>` while a merge is in
//! flight, `ENABLED-<profile>` once it finished. Reading state is
//! always a ground-truth filesystem read; nothing is cached.

use chrono::{DateTime, Utc};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::error::EngineError;

/// Lifecycle of a (package, profile) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnablementState {
    Disabled,
    /// An enable started and never finished; cleanup is required before
    /// the pair can be trusted again.
    Enabling,
    Enabled,
}

impl EnablementState {
    pub fn label(self) -> &'static str {
        match self {
            Self::Disabled => "disabled",
            Self::Enabling => "enabling (needs cleanup)",
            Self::Enabled => "enabled",
        }
    }
}

pub fn enabled_marker(mod_root: &Path, profile: &str) -> PathBuf {
    mod_root.join(format!("ENABLED-{profile}"))
}

pub fn enabling_marker(mod_root: &Path, profile: &str) -> PathBuf {
    mod_root.join(format!("ENABLING-{profile}"))
}

/// Read the current state from marker presence.
///
/// When both markers exist (possible only after a crash inside the
/// final transition or external tampering) the pair is reported as
/// `Enabling`: the merge may be incomplete, and cleanup-then-enable
/// converges either way.
pub fn read_state(mod_root: &Path, profile: &str) -> EnablementState {
    if enabling_marker(mod_root, profile).exists() {
        EnablementState::Enabling
    } else if enabled_marker(mod_root, profile).exists() {
        EnablementState::Enabled
    } else {
        EnablementState::Disabled
    }
}

/// Modification time of the marker backing the current state, used for
/// "since" display.
pub fn state_since(mod_root: &Path, profile: &str) -> Option<DateTime<Utc>> {
    let marker = match read_state(mod_root, profile) {
        EnablementState::Enabling => enabling_marker(mod_root, profile),
        EnablementState::Enabled => enabled_marker(mod_root, profile),
        EnablementState::Disabled => return None,
    };
    let modified = fs::metadata(marker).ok()?.modified().ok()?;
    Some(modified.into())
}

fn touch(path: &Path) -> Result<(), EngineError> {
    fs::write(path, []).map_err(|e| EngineError::io(path, e))
}

fn remove_if_present(path: &Path) -> Result<(), EngineError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(EngineError::io(path, e)),
    }
}

/// Start an enable: requires `Disabled`, writes the `ENABLING` marker.
pub fn begin_enable(mod_root: &Path, profile: &str) -> Result<(), EngineError> {
    match read_state(mod_root, profile) {
        EnablementState::Disabled => touch(&enabling_marker(mod_root, profile)),
        EnablementState::Enabling => Err(EngineError::State(format!(
            "enable requested but {} already exists",
            enabling_marker(mod_root, profile).display()
        ))),
        EnablementState::Enabled => Err(EngineError::State(format!(
            "enable requested but {} already exists",
            enabled_marker(mod_root, profile).display()
        ))),
    }
}

/// Terminal step of a successful enable: swap `ENABLING` for `ENABLED`.
pub fn finish_enable(mod_root: &Path, profile: &str) -> Result<(), EngineError> {
    remove_if_present(&enabling_marker(mod_root, profile))?;
    touch(&enabled_marker(mod_root, profile))
}

/// Start a disable. `Enabled` is the normal precondition; `Enabling`
/// is accepted too, as a forced cleanup of an interrupted enable.
pub fn begin_disable(mod_root: &Path, profile: &str) -> Result<(), EngineError> {
    match read_state(mod_root, profile) {
        EnablementState::Enabled | EnablementState::Enabling => Ok(()),
        EnablementState::Disabled => Err(EngineError::State(format!(
            "disable requested but no marker exists in {}",
            mod_root.display()
        ))),
    }
}

/// Terminal step of a disable (or cleanup): drop whichever markers are
/// present.
pub fn finish_disable(mod_root: &Path, profile: &str) -> Result<(), EngineError> {
    remove_if_present(&enabling_marker(mod_root, profile))?;
    remove_if_present(&enabled_marker(mod_root, profile))
}
