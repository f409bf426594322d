//! Locations under the data directory.

use std::path::{Path, PathBuf};

use super::Config;

/// Default data directory (`~/.gfxreplay`).
pub fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .map(|h| h.join(".gfxreplay"))
        .unwrap_or_else(|| PathBuf::from(".gfxreplay"))
}

impl Config {
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// `<data_dir>/config.toml`
    pub fn config_path(&self) -> PathBuf {
        self.data_dir.join("config.toml")
    }

    /// `<data_dir>/stash`
    pub fn stash_dir(&self) -> PathBuf {
        self.data_dir.join("stash")
    }

    /// `<data_dir>/actions.ledger`
    pub fn ledger_path(&self) -> PathBuf {
        self.data_dir.join("actions.ledger")
    }

    /// `<data_dir>/logs`
    pub fn logs_dir(&self) -> PathBuf {
        self.data_dir.join("logs")
    }

    /// `<data_dir>/logs/gfxreplay.log`
    pub fn log_file_path(&self) -> PathBuf {
        self.logs_dir().join("gfxreplay.log")
    }
}
