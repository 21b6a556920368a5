use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use std::sync::Arc;

use pok_delta::DeltaCodec;
use pok_ledger::{BlockReason, LedgerStore, ResetConfirmation, Snapshot};
use pok_store::FileLog;
use pok_sync::{CursorBook, MergeResult, OutgoingDelta, SyncCoordinator};
use pok_types::Entry;
use tracing::{debug, info, warn};

use crate::config::{AppConfig, CONFIG_FILE};
use crate::error::{SdkError, SdkResult};
use crate::status::{AppState, AppStatus, Feature, PeerStatus};

/// One device's ledger, opened from a data directory.
pub struct PokApp {
    config: AppConfig,
    sync: SyncCoordinator,
}

impl PokApp {
    /// Open (creating if needed) the ledger described by `config`.
    pub fn init(config: AppConfig) -> SdkResult<Self> {
        config.validate()?;
        fs::create_dir_all(&config.data_dir)?;

        let log = Arc::new(FileLog::open(&config.ledger_path(), config.log_config())?);
        let ledger = Arc::new(LedgerStore::open(log, config.ledger_config())?);
        if let Some(reason) = load_block(&config.block_path())? {
            warn!(%reason, "restoring recorded block");
            ledger.block(reason)?;
        }
        let codec = DeltaCodec::new(config.delta_capacity)?;
        let cursors = load_cursors(&config.cursors_path())?;
        let sync = SyncCoordinator::with_codec(ledger, codec).with_cursors(cursors);

        info!(
            data_dir = %config.data_dir.display(),
            entries = sync.ledger().len(),
            peers = sync.cursors().len(),
            "app initialized"
        );
        Ok(Self { config, sync })
    }

    /// Open the data directory `dir`, using its `pok.toml` if present.
    ///
    /// The directory itself always wins over any `data_dir` in the file.
    pub fn open_dir(dir: impl AsRef<Path>) -> SdkResult<Self> {
        let dir = dir.as_ref();
        let path = dir.join(CONFIG_FILE);
        let mut config = if path.exists() {
            AppConfig::load(&path)?
        } else {
            AppConfig::default()
        };
        config.data_dir = dir.to_path_buf();
        Self::init(config)
    }

    /// Persist peer cursors and close the handle.
    pub fn teardown(self) -> SdkResult<AppStatus> {
        self.save_cursors()?;
        let mut status = self.status();
        status.state = AppState::Closed;
        info!(entries = status.entries, "app closed");
        Ok(status)
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn ledger(&self) -> &LedgerStore {
        self.sync.ledger()
    }

    /// Append a learning-cycle record; durable when this returns.
    pub fn record(&self, payload: impl Into<Vec<u8>>) -> SdkResult<Entry> {
        Ok(self.ledger().append(payload)?)
    }

    pub fn entries(&self, from_index: u64) -> Snapshot {
        self.ledger().snapshot(from_index)
    }

    pub fn verify(&self) -> SdkResult<()> {
        Ok(self.ledger().verify_integrity()?)
    }

    /// Next delta for `peer`, starting after its acknowledged index.
    ///
    /// The cursor does not move until the peer acknowledges.
    pub fn export_for(&self, peer: &str) -> SdkResult<OutgoingDelta> {
        Ok(self.sync.prepare_for_peer(peer)?)
    }

    /// Merge a delta received from `peer`.
    ///
    /// A merge that blocks the ledger records the block on disk before the
    /// error is returned, so it outlives this handle.
    pub fn import_from(&self, peer: &str, bytes: &[u8]) -> SdkResult<MergeResult> {
        let result = match self.sync.merge_from_peer(peer, bytes) {
            Ok(result) => result,
            Err(err) => {
                if err.blocks_ledger() {
                    self.save_block()?;
                }
                return Err(err.into());
            }
        };
        self.save_cursors()?;
        Ok(result)
    }

    /// Record that `peer` holds everything through `through_index`.
    pub fn acknowledge(&self, peer: &str, through_index: u64) -> SdkResult<bool> {
        let moved = self.sync.acknowledge(peer, through_index);
        if moved {
            self.save_cursors()?;
        }
        Ok(moved)
    }

    /// Erase the ledger and forget every peer cursor.
    pub fn reset(&self, confirm: ResetConfirmation) -> SdkResult<()> {
        self.ledger().reset(confirm)?;
        remove_if_present(&self.config.block_path())?;
        self.sync.clear_cursors();
        self.save_cursors()
    }

    /// Lift a merge-conflict block once local history re-verifies.
    pub fn clear_block(&self) -> SdkResult<()> {
        self.ledger().clear_block()?;
        remove_if_present(&self.config.block_path())
    }

    pub fn status(&self) -> AppStatus {
        let ledger = self.ledger();
        let entries = ledger.len();
        let intact = ledger.is_intact();
        let blocked = ledger.blocked();
        let peers = self
            .sync
            .cursors()
            .iter()
            .map(|(peer, cursor)| PeerStatus {
                peer: peer.to_string(),
                last_known_index: cursor.last_known_index,
                pending: entries.saturating_sub(cursor.next_index()),
            })
            .collect();

        AppStatus {
            version: env!("CARGO_PKG_VERSION").to_string(),
            state: if blocked.is_some() {
                AppState::Blocked
            } else {
                AppState::Ready
            },
            entries,
            head_hash: ledger.head().map(|e| e.hash.to_hex()),
            intact,
            blocked: blocked.as_ref().map(BlockReason::to_string),
            peers,
            features: Self::features().to_vec(),
        }
    }

    pub fn features() -> &'static [Feature] {
        &Feature::ALL
    }

    fn save_cursors(&self) -> SdkResult<()> {
        let path = self.config.cursors_path();
        let json = serde_json::to_vec_pretty(&self.sync.cursors())
            .map_err(|e| SdkError::CursorFile(e.to_string()))?;
        replace_file(&path, &json)?;
        debug!(path = %path.display(), "cursors saved");
        Ok(())
    }

    fn save_block(&self) -> SdkResult<()> {
        let Some(reason) = self.ledger().blocked() else {
            return Ok(());
        };
        let path = self.config.block_path();
        let json =
            serde_json::to_vec_pretty(&reason).map_err(|e| SdkError::BlockFile(e.to_string()))?;
        replace_file(&path, &json)?;
        info!(path = %path.display(), %reason, "block recorded");
        Ok(())
    }
}

fn replace_file(path: &Path, bytes: &[u8]) -> SdkResult<()> {
    // Atomic replace.
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

fn remove_if_present(path: &Path) -> SdkResult<()> {
    match fs::remove_file(path) {
        Ok(()) => {
            debug!(path = %path.display(), "block record removed");
            Ok(())
        }
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

fn load_block(path: &Path) -> SdkResult<Option<BlockReason>> {
    match fs::read(path) {
        Ok(bytes) => serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| SdkError::BlockFile(format!("{}: {e}", path.display()))),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn load_cursors(path: &Path) -> SdkResult<CursorBook> {
    match fs::read(path) {
        Ok(bytes) => serde_json::from_slice(&bytes)
            .map_err(|e| SdkError::CursorFile(format!("{}: {e}", path.display()))),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(CursorBook::new()),
        Err(e) => Err(e.into()),
    }
}
