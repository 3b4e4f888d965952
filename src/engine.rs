//! Orchestration of enable / disable / status for a (package, profile)
//! pair.
//!
//! Sequencing per operation:
//!
//! - enable: validate -> begin_enable -> merge -> finish_enable. On a
//!   merge abort the `ENABLING` marker stays behind on purpose; the
//!   next enable sees it and runs a cleanup pass before starting over.
//! - disable: validate -> begin_disable -> merge (best-effort, warnings
//!   collected) -> finish_disable regardless of warnings.
//! - status: a ground-truth marker read, no mutation.
//!
//! All mutation for one (package, profile) pair happens sequentially in
//! here; pairs targeting different installation roots share no state
//! and may run concurrently. The `ENABLING` marker is a cooperative
//! advisory lock, not a cross-process one.

use chrono::{DateTime, Utc};
use std::io;
use std::path::Path;

use crate::error::{EngineError, Warning};
use crate::merge::{self, Mode};
use crate::package::ModPackage;
use crate::profiles::Profile;
use crate::state::{self, EnablementState};

/// Lifecycle notifications consumable by a presentation layer.
#[derive(Debug, Clone)]
pub enum LifecycleEvent {
    Enabling { mod_name: String, profile: String },
    Enabled { mod_name: String, profile: String },
    Disabling { mod_name: String, profile: String },
    Disabled { mod_name: String, profile: String },
    /// A stale `ENABLING` marker was found; an automatic cleanup pass
    /// runs before anything else.
    CleanupStarted { mod_name: String, profile: String },
    /// A non-fatal problem during a best-effort pass.
    Warning { warning: Warning },
    Error { mod_name: String, detail: String },
}

pub trait Notifier {
    fn notify(&self, event: LifecycleEvent);
}

/// Notifier for library callers that don't care.
pub struct NullNotifier;

impl Notifier for NullNotifier {
    fn notify(&self, _event: LifecycleEvent) {}
}

/// What an operation actually did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Changed,
    AlreadyEnabled,
    AlreadyDisabled,
}

#[derive(Debug)]
pub struct DisableReport {
    pub outcome: Outcome,
    pub warnings: Vec<Warning>,
}

#[derive(Debug)]
pub struct StatusReport {
    pub name: String,
    pub version: String,
    pub state: EnablementState,
    pub since: Option<DateTime<Utc>>,
}

fn require_install_root(profile: &Profile) -> Result<(), EngineError> {
    if profile.root.is_dir() {
        Ok(())
    } else {
        Err(EngineError::io(
            &profile.root,
            io::Error::new(
                io::ErrorKind::NotFound,
                "installation root does not exist",
            ),
        ))
    }
}

/// Enable a mod package for a profile.
///
/// Already-enabled pairs succeed without touching the disk. A stale
/// `ENABLING` marker triggers a best-effort cleanup pass first, then a
/// fresh enable; a cancelled or crashed enable is therefore completed
/// by simply calling enable again.
pub fn enable(
    mod_root: &Path,
    profile: &Profile,
    notifier: &dyn Notifier,
) -> Result<Outcome, EngineError> {
    let pkg = ModPackage::validate(mod_root)?;
    require_install_root(profile)?;

    match state::read_state(&pkg.root, &profile.name) {
        EnablementState::Enabled => {
            // Already enabled: re-run the idempotent merge without any
            // marker churn. With no drift this writes nothing; after a
            // version bump it refreshes patch blocks in place while
            // the symlinks stay as they are.
            let outcome = merge::merge(&pkg, &profile.root, Mode::Enable)?;
            return Ok(if outcome.changed {
                Outcome::Changed
            } else {
                Outcome::AlreadyEnabled
            });
        }
        EnablementState::Enabling => {
            notifier.notify(LifecycleEvent::CleanupStarted {
                mod_name: pkg.name.clone(),
                profile: profile.name.clone(),
            });
            cleanup(&pkg, profile, notifier)?;
        }
        EnablementState::Disabled => {}
    }

    state::begin_enable(&pkg.root, &profile.name)?;
    notifier.notify(LifecycleEvent::Enabling {
        mod_name: pkg.name.clone(),
        profile: profile.name.clone(),
    });

    match merge::merge(&pkg, &profile.root, Mode::Enable) {
        Ok(_) => {
            state::finish_enable(&pkg.root, &profile.name)?;
            notifier.notify(LifecycleEvent::Enabled {
                mod_name: pkg.name.clone(),
                profile: profile.name.clone(),
            });
            Ok(Outcome::Changed)
        }
        Err(e) => {
            // The ENABLING marker stays: the partial merge is exactly
            // what the next enable's cleanup pass knows how to undo.
            notifier.notify(LifecycleEvent::Error {
                mod_name: pkg.name.clone(),
                detail: e.to_string(),
            });
            Err(e)
        }
    }
}

/// Disable a mod package for a profile.
///
/// Best-effort: per-entry failures are collected as warnings and the
/// marker transition completes regardless, so repeated disables keep
/// converging toward a clean installation root.
pub fn disable(
    mod_root: &Path,
    profile: &Profile,
    notifier: &dyn Notifier,
) -> Result<DisableReport, EngineError> {
    let pkg = ModPackage::validate(mod_root)?;
    require_install_root(profile)?;

    match state::read_state(&pkg.root, &profile.name) {
        EnablementState::Disabled => {
            return Ok(DisableReport {
                outcome: Outcome::AlreadyDisabled,
                warnings: Vec::new(),
            });
        }
        EnablementState::Enabling => notifier.notify(LifecycleEvent::CleanupStarted {
            mod_name: pkg.name.clone(),
            profile: profile.name.clone(),
        }),
        EnablementState::Enabled => notifier.notify(LifecycleEvent::Disabling {
            mod_name: pkg.name.clone(),
            profile: profile.name.clone(),
        }),
    }

    state::begin_disable(&pkg.root, &profile.name)?;
    let outcome = merge::merge(&pkg, &profile.root, Mode::Disable)?;
    for warning in &outcome.warnings {
        notifier.notify(LifecycleEvent::Warning {
            warning: warning.clone(),
        });
    }
    state::finish_disable(&pkg.root, &profile.name)?;
    notifier.notify(LifecycleEvent::Disabled {
        mod_name: pkg.name.clone(),
        profile: profile.name.clone(),
    });

    Ok(DisableReport {
        outcome: Outcome::Changed,
        warnings: outcome.warnings,
    })
}

/// Report the (package, profile) lifecycle state from marker presence.
pub fn status(mod_root: &Path, profile: &Profile) -> Result<StatusReport, EngineError> {
    let pkg = ModPackage::validate(mod_root)?;
    let state = state::read_state(&pkg.root, &profile.name);
    let since = state::state_since(&pkg.root, &profile.name);

    Ok(StatusReport {
        name: pkg.name,
        version: pkg.version,
        state,
        since,
    })
}

/// Undo whatever a dead enable left behind: best-effort unmerge, then
/// drop the stale marker.
fn cleanup(
    pkg: &ModPackage,
    profile: &Profile,
    notifier: &dyn Notifier,
) -> Result<(), EngineError> {
    let outcome = merge::merge(pkg, &profile.root, Mode::Disable)?;
    for warning in &outcome.warnings {
        notifier.notify(LifecycleEvent::Warning {
            warning: warning.clone(),
        });
    }
    state::finish_disable(&pkg.root, &profile.name)
}
