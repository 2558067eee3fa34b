//! Settings file discovery.

use anyhow::{Context as _, Result};
use credstore::Settings;
use directories::ProjectDirs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Environment variable naming the settings file.
pub const CONFIG_ENV: &str = "CREDSTORE_CONFIG";

/// Platform config file, e.g. `~/.config/credstore/config.toml` on Linux.
pub fn default_path() -> Result<PathBuf> {
    let dirs = ProjectDirs::from("dev", "api-forge", "credstore")
        .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;

    Ok(dirs.config_dir().join("config.toml"))
}

/// `explicit` (from `--config` or `CREDSTORE_CONFIG`) or the platform default.
pub fn resolve_path(explicit: Option<&Path>) -> Result<PathBuf> {
    explicit.map_or_else(default_path, |path| Ok(path.to_path_buf()))
}

/// Load settings, applying a `--root` override.
pub fn load_settings(explicit: Option<&Path>, root: Option<&Path>) -> Result<Settings> {
    let path = resolve_path(explicit)?;
    let mut settings =
        Settings::load(&path).with_context(|| format!("loading settings from {}", path.display()))?;

    if let Some(root) = root {
        debug!(root = %root.display(), "store root overridden on the command line");
        settings.store_root = root.to_path_buf();
    }

    Ok(settings)
}
