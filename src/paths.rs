use anyhow::{Context, Result};
use directories::BaseDirs;
use std::path::PathBuf;

/// Locations used by modlink itself. Nothing here ever points inside a
/// profile's installation root.
#[derive(Debug, Clone)]
pub struct Paths {
    /// e.g. ~/.config/modlink
    pub config_dir: PathBuf,
    /// e.g. ~/.config/modlink/profiles.json
    pub registry_file: PathBuf,
}

impl Paths {
    pub fn new() -> Result<Self> {
        let base_dirs = BaseDirs::new().context("Failed to determine home directory")?;
        let config_dir = base_dirs.config_dir().join("modlink");
        let registry_file = config_dir.join("profiles.json");

        Ok(Self {
            config_dir,
            registry_file,
        })
    }

    /// Ensure the config directory exists
    pub fn ensure_dirs(&self) -> Result<()> {
        std::fs::create_dir_all(&self.config_dir)
            .with_context(|| format!("Failed to create config directory: {:?}", self.config_dir))?;
        Ok(())
    }
}
