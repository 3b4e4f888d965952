//! Profile registry.
//!
//! A profile is a named installation root. The registry is a small JSON
//! file under the modlink config directory; reads are plain, mutations
//! go through [`LockedRegistry`] which holds an exclusive advisory lock
//! for the duration of the change.
//!
//! Independent profiles share no mutable filesystem state: everything
//! the engine writes per profile lands either inside that profile's
//! installation root or in per-profile marker files inside the mod
//! package itself.

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// A named installation root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub name: String,
    pub root: PathBuf,
    pub added_at: DateTime<Utc>,
}

/// Contents of profiles.json
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Registry {
    /// Profile used when a command is not given an explicit `--profile`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_profile: Option<String>,

    #[serde(default)]
    pub profiles: Vec<Profile>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Registry {
    /// Read the registry, returning an empty one if the file doesn't exist
    pub fn read(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read registry: {:?}", path))?;

        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse registry: {:?}", path))
    }

    /// Write the registry atomically (write to temp file, then rename),
    /// so a crash mid-write never leaves a corrupt registry behind.
    pub fn write(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create registry directory: {:?}", parent))?;
        }

        let content = serde_json::to_string_pretty(self).context("Failed to serialize registry")?;

        let temp_path = path.with_extension("json.tmp");
        std::fs::write(&temp_path, &content)
            .with_context(|| format!("Failed to write temp registry: {:?}", temp_path))?;

        std::fs::rename(&temp_path, path)
            .with_context(|| format!("Failed to rename registry: {:?} -> {:?}", temp_path, path))
    }

    pub fn get(&self, name: &str) -> Option<&Profile> {
        self.profiles.iter().find(|p| p.name == name)
    }

    /// Resolve an explicit `--profile` argument or fall back to the
    /// default profile.
    pub fn resolve(&self, name: Option<&str>) -> Result<&Profile> {
        match name {
            Some(n) => self.get(n).with_context(|| {
                format!(
                    "Profile '{}' does not exist.\nHint: Use 'modlink profile list' to see available profiles.",
                    n
                )
            }),
            None => {
                let default = self.default_profile.as_deref().context(
                    "No profile selected and no default set.\nHint: Add one with 'modlink profile add <name> <root>'.",
                )?;
                self.get(default).with_context(|| {
                    format!(
                        "Default profile '{}' no longer exists.\nHint: Use 'modlink profile use <name>' to pick another.",
                        default
                    )
                })
            }
        }
    }
}

/// Validate a profile name.
///
/// The name is embedded into marker filenames (`ENABLED-<profile>`), so
/// only alphanumeric characters, underscores, and hyphens are allowed.
pub fn validate_profile_name(name: &str) -> Result<()> {
    if name.is_empty() {
        bail!("Profile name cannot be empty");
    }

    if name.chars().count() > 64 {
        bail!("Profile name cannot be longer than 64 characters");
    }

    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        bail!(
            "Invalid profile name '{}'.\n\n Only alphanumeric characters, hyphens (-), and underscores (_) are allowed.",
            name
        );
    }

    Ok(())
}

/// A locked registry handle for safe concurrent mutation
pub struct LockedRegistry {
    file: File,
    registry: Registry,
    path: PathBuf,
}

impl LockedRegistry {
    /// Open and lock the registry file for exclusive access
    pub fn lock(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create registry directory: {:?}", parent))?;
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .with_context(|| format!("Failed to open registry: {:?}", path))?;

        file.lock_exclusive()
            .with_context(|| format!("Failed to lock registry: {:?}", path))?;

        let registry = Self::read_from_file(&file, path)?;

        Ok(Self {
            file,
            registry,
            path: path.to_path_buf(),
        })
    }

    fn read_from_file(mut file: &File, path: &Path) -> Result<Registry> {
        let mut content = String::new();
        file.read_to_string(&mut content)
            .with_context(|| format!("Failed to read registry: {:?}", path))?;

        if content.trim().is_empty() {
            return Ok(Registry::default());
        }

        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse registry: {:?}", path))
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Apply a change and persist it
    pub fn update<F>(&mut self, f: F) -> Result<()>
    where
        F: FnOnce(&mut Registry),
    {
        f(&mut self.registry);
        self.registry.updated_at = Some(Utc::now());
        self.save()
    }

    fn save(&mut self) -> Result<()> {
        let content =
            serde_json::to_string_pretty(&self.registry).context("Failed to serialize registry")?;

        self.file
            .set_len(0)
            .with_context(|| format!("Failed to truncate registry: {:?}", self.path))?;
        self.file
            .seek(SeekFrom::Start(0))
            .with_context(|| format!("Failed to seek registry: {:?}", self.path))?;
        self.file
            .write_all(content.as_bytes())
            .with_context(|| format!("Failed to write registry: {:?}", self.path))?;
        self.file
            .sync_all()
            .with_context(|| format!("Failed to sync registry: {:?}", self.path))?;

        Ok(())
    }
}

impl Drop for LockedRegistry {
    fn drop(&mut self) {
        // Release the lock (ignore errors during drop)
        let _ = FileExt::unlock(&self.file);
    }
}
