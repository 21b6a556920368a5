//! TOML configuration for an application data directory.

use std::fs;
use std::path::{Path, PathBuf};

use pok_delta::{max_payload_for, DEFAULT_CAPACITY, ENTRY_OVERHEAD, HEADER_LEN};
use pok_ledger::{LedgerConfig, DEFAULT_MAX_PAYLOAD};
use pok_store::{LogConfig, SyncMode};
use serde::{Deserialize, Serialize};

use crate::error::{SdkError, SdkResult};

/// Configuration file name inside the data directory.
pub const CONFIG_FILE: &str = "pok.toml";
/// Entry log file name inside the data directory.
pub const LEDGER_FILE: &str = "ledger.log";
/// Peer cursor file name inside the data directory.
pub const CURSORS_FILE: &str = "cursors.json";
/// Recorded block, present only while appends are refused.
pub const BLOCK_FILE: &str = "blocked.json";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Directory holding the entry log and peer cursors.
    pub data_dir: PathBuf,
    /// Largest encoded delta, in bytes.
    pub delta_capacity: usize,
    /// Largest payload accepted by `record`.
    pub max_payload_bytes: usize,
    pub sync_mode: SyncMode,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(".pok"),
            delta_capacity: DEFAULT_CAPACITY,
            max_payload_bytes: DEFAULT_MAX_PAYLOAD,
            sync_mode: SyncMode::EveryWrite,
        }
    }
}

impl AppConfig {
    /// Defaults with the data directory set to `dir`.
    pub fn rooted_at(dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: dir.into(),
            ..Self::default()
        }
    }

    /// Parse a TOML config file. Missing keys take their defaults.
    pub fn load(path: &Path) -> SdkResult<Self> {
        let text = fs::read_to_string(path)?;
        toml::from_str(&text).map_err(|e| SdkError::Config(format!("{}: {e}", path.display())))
    }

    pub fn save(&self, path: &Path) -> SdkResult<()> {
        let text = toml::to_string_pretty(self).map_err(|e| SdkError::Config(e.to_string()))?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, text)?;
        Ok(())
    }

    /// Reject settings under which an accepted entry could never be sent.
    pub fn validate(&self) -> SdkResult<()> {
        let min = HEADER_LEN + ENTRY_OVERHEAD;
        if self.delta_capacity < min {
            return Err(SdkError::Config(format!(
                "delta_capacity {} is below the minimum of {min}",
                self.delta_capacity
            )));
        }
        let fits = max_payload_for(self.delta_capacity);
        if self.max_payload_bytes > fits {
            return Err(SdkError::Config(format!(
                "max_payload_bytes {} does not fit a {}-byte delta (at most {fits})",
                self.max_payload_bytes, self.delta_capacity
            )));
        }
        Ok(())
    }

    pub fn config_path(&self) -> PathBuf {
        self.data_dir.join(CONFIG_FILE)
    }

    pub fn ledger_path(&self) -> PathBuf {
        self.data_dir.join(LEDGER_FILE)
    }

    pub fn cursors_path(&self) -> PathBuf {
        self.data_dir.join(CURSORS_FILE)
    }

    pub fn block_path(&self) -> PathBuf {
        self.data_dir.join(BLOCK_FILE)
    }

    pub fn ledger_config(&self) -> LedgerConfig {
        LedgerConfig {
            max_payload_bytes: self.max_payload_bytes,
        }
    }

    pub fn log_config(&self) -> LogConfig {
        LogConfig {
            sync_mode: self.sync_mode,
        }
    }
}
