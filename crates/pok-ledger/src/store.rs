use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use pok_crypto::{ContentHasher, HashChain};
use pok_store::EntryLog;
use pok_types::{Entry, EntryHash, Timestamp};
use tracing::{debug, info, warn};

use crate::config::LedgerConfig;
use crate::error::{BlockReason, LedgerError, LedgerResult};
use crate::snapshot::Snapshot;

/// Proof that a caller explicitly asked for a destructive reset.
///
/// Only obtainable by parsing the exact phrase [`ResetConfirmation::PHRASE`].
#[derive(Debug)]
pub struct ResetConfirmation(());

impl ResetConfirmation {
    pub const PHRASE: &'static str = "reset";

    pub fn parse(input: &str) -> LedgerResult<Self> {
        if input == Self::PHRASE {
            Ok(Self(()))
        } else {
            Err(LedgerError::ResetNotConfirmed)
        }
    }
}

#[derive(Default)]
struct LedgerState {
    entries: Arc<Vec<Entry>>,
    blocked: Option<BlockReason>,
}

impl LedgerState {
    fn next_index(&self) -> u64 {
        self.entries.len() as u64
    }

    fn last_hash(&self) -> EntryHash {
        self.entries
            .last()
            .map(|e| e.hash)
            .unwrap_or(EntryHash::GENESIS)
    }

    fn ensure_writable(&self) -> LedgerResult<()> {
        match &self.blocked {
            Some(reason) => Err(LedgerError::Blocked(reason.clone())),
            None => Ok(()),
        }
    }
}

/// The append-only ledger.
///
/// All mutation goes through a single `RwLock` write guard, so appends,
/// merges and resets never interleave. Entries sit behind an `Arc` that
/// writers update copy-on-write; readers clone the `Arc` and iterate without
/// holding the lock.
pub struct LedgerStore {
    log: Arc<dyn EntryLog>,
    config: LedgerConfig,
    inner: RwLock<LedgerState>,
}

impl LedgerStore {
    /// Open a ledger over the given log, recovering and verifying what it
    /// holds.
    ///
    /// Corrupt storage does not fail the open. The ledger comes up blocked,
    /// the readable prefix stays visible, and [`LedgerStore::verify_integrity`]
    /// reports the offending index.
    pub fn open(log: Arc<dyn EntryLog>, config: LedgerConfig) -> LedgerResult<Self> {
        let recovery = log.recover()?;
        let mut blocked = None;

        if let Err(err) = HashChain::verify(&recovery.entries) {
            blocked = Some(BlockReason::Corrupted {
                index: err.index(),
                reason: err.to_string(),
            });
        } else if let Some(record) = recovery.corrupt_at {
            blocked = Some(BlockReason::Corrupted {
                index: record,
                reason: "stored record is damaged or unreadable".into(),
            });
        }

        if let Some(reason) = &blocked {
            warn!(%reason, recovered = recovery.entries.len(), "ledger opened blocked");
        } else {
            info!(entries = recovery.entries.len(), "ledger opened");
        }

        Ok(Self {
            log,
            config,
            inner: RwLock::new(LedgerState {
                entries: Arc::new(recovery.entries),
                blocked,
            }),
        })
    }

    /// Open an empty, non-durable ledger. Intended for tests and previews.
    pub fn in_memory() -> Self {
        Self {
            log: Arc::new(pok_store::MemoryLog::new()),
            config: LedgerConfig::default(),
            inner: RwLock::new(LedgerState::default()),
        }
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    /// Append a new entry carrying `payload`.
    ///
    /// The entry is durably persisted before this returns. On a persistence
    /// failure nothing is appended.
    pub fn append(&self, payload: impl Into<Vec<u8>>) -> LedgerResult<Entry> {
        let payload = payload.into();
        if payload.len() > self.config.max_payload_bytes {
            return Err(LedgerError::PayloadTooLarge {
                size: payload.len(),
                max: self.config.max_payload_bytes,
            });
        }

        let mut state = self.write_state()?;
        state.ensure_writable()?;

        let floor = state
            .entries
            .last()
            .map(|e| e.timestamp)
            .unwrap_or_else(Timestamp::zero);
        let entry = HashChain::seal(
            state.last_hash(),
            state.next_index(),
            Timestamp::now_not_before(floor),
            payload,
        );

        self.log.append(&entry)?;
        Arc::make_mut(&mut state.entries).push(entry.clone());

        debug!(
            index = entry.index,
            hash = %entry.hash.short_hex(),
            payload = %ContentHasher::PAYLOAD.hash(&entry.payload).short_hex(),
            "entry appended"
        );
        Ok(entry)
    }

    /// Entries from `from_index` onwards, as of now.
    pub fn snapshot(&self, from_index: u64) -> Snapshot {
        Snapshot::new(self.read_state().entries.clone(), from_index)
    }

    pub fn snapshot_all(&self) -> Snapshot {
        self.snapshot(0)
    }

    /// Re-verify the full chain.
    ///
    /// A failure blocks further appends until [`LedgerStore::reset`].
    pub fn verify_integrity(&self) -> LedgerResult<()> {
        let (entries, blocked) = {
            let state = self.read_state();
            (state.entries.clone(), state.blocked.clone())
        };

        if let Some(BlockReason::Corrupted { index, reason }) = blocked {
            return Err(LedgerError::ChainBroken { index, reason });
        }

        if let Err(err) = HashChain::verify(&entries) {
            let reason = BlockReason::Corrupted {
                index: err.index(),
                reason: err.to_string(),
            };
            warn!(%reason, "integrity check failed; blocking ledger");
            self.write_state()?.blocked = Some(reason);
            return Err(err.into());
        }
        Ok(())
    }

    pub fn is_intact(&self) -> bool {
        self.verify_integrity().is_ok()
    }

    /// Clear every entry, in memory and on disk, and lift any block.
    pub fn reset(&self, _confirm: ResetConfirmation) -> LedgerResult<()> {
        let mut state = self.write_state()?;
        let dropped = state.entries.len();
        self.log.truncate()?;
        state.entries = Arc::new(Vec::new());
        state.blocked = None;
        info!(dropped, "ledger reset");
        Ok(())
    }

    /// The reason appends are currently refused, if any.
    pub fn blocked(&self) -> Option<BlockReason> {
        self.read_state().blocked.clone()
    }

    /// Refuse appends for `reason`, typically one recorded before a restart.
    ///
    /// A ledger that is already blocked keeps its current reason.
    pub fn block(&self, reason: BlockReason) -> LedgerResult<()> {
        let mut guard = self.write()?;
        if guard.blocked().is_none() {
            guard.block(reason);
        }
        Ok(())
    }

    /// Lift a conflict block after the caller has dealt with the conflict.
    ///
    /// Integrity blocks cannot be cleared this way; they need a reset.
    pub fn clear_block(&self) -> LedgerResult<()> {
        let mut state = self.write_state()?;
        match state.blocked.take() {
            Some(corrupted @ BlockReason::Corrupted { .. }) => {
                state.blocked = Some(corrupted.clone());
                Err(LedgerError::Blocked(corrupted))
            }
            Some(BlockReason::Conflict { index, detail }) => {
                if let Err(err) = HashChain::verify(&state.entries) {
                    state.blocked = Some(BlockReason::Conflict { index, detail });
                    return Err(err.into());
                }
                info!(index, "conflict block cleared");
                Ok(())
            }
            None => Ok(()),
        }
    }

    pub fn len(&self) -> u64 {
        self.read_state().next_index()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Index the next appended entry will receive.
    pub fn next_index(&self) -> u64 {
        self.len()
    }

    /// Hash the next appended entry will link to.
    pub fn last_hash(&self) -> EntryHash {
        self.read_state().last_hash()
    }

    pub fn head(&self) -> Option<Entry> {
        self.read_state().entries.last().cloned()
    }

    pub fn get(&self, index: u64) -> Option<Entry> {
        let idx = usize::try_from(index).ok()?;
        self.read_state().entries.get(idx).cloned()
    }

    /// Take the exclusive writer handle.
    pub fn write(&self) -> LedgerResult<LedgerWriteGuard<'_>> {
        Ok(LedgerWriteGuard {
            state: self.write_state()?,
            log: self.log.as_ref(),
        })
    }

    fn read_state(&self) -> RwLockReadGuard<'_, LedgerState> {
        // Mutations complete in a single step after persistence, so the
        // state behind a poisoned lock is still consistent for readers.
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_state(&self) -> LedgerResult<RwLockWriteGuard<'_, LedgerState>> {
        self.inner.write().map_err(|_| LedgerError::Poisoned)
    }
}

/// Exclusive writer handle over a [`LedgerStore`].
///
/// While held, no append, merge or reset can run and readers see the state
/// as of the last completed write.
pub struct LedgerWriteGuard<'a> {
    state: RwLockWriteGuard<'a, LedgerState>,
    log: &'a dyn EntryLog,
}

impl LedgerWriteGuard<'_> {
    pub fn entries(&self) -> &[Entry] {
        &self.state.entries
    }

    pub fn get(&self, index: u64) -> Option<&Entry> {
        usize::try_from(index)
            .ok()
            .and_then(|idx| self.state.entries.get(idx))
    }

    pub fn next_index(&self) -> u64 {
        self.state.next_index()
    }

    pub fn last_hash(&self) -> EntryHash {
        self.state.last_hash()
    }

    pub fn blocked(&self) -> Option<&BlockReason> {
        self.state.blocked.as_ref()
    }

    /// Fail with [`LedgerError::Blocked`] if appends are refused.
    pub fn ensure_writable(&self) -> LedgerResult<()> {
        self.state.ensure_writable()
    }

    /// Append entries produced elsewhere (e.g. by a peer).
    ///
    /// The batch must continue the local chain exactly. It is persisted as
    /// one unit; on any failure the ledger is unchanged.
    pub fn append_verified(&mut self, entries: &[Entry]) -> LedgerResult<()> {
        self.state.ensure_writable()?;
        if entries.is_empty() {
            return Ok(());
        }
        HashChain::verify_from(&self.state.last_hash(), self.state.next_index(), entries)?;

        self.log.append_batch(entries)?;
        Arc::make_mut(&mut self.state.entries).extend_from_slice(entries);

        debug!(
            first = entries[0].index,
            count = entries.len(),
            "verified entries appended"
        );
        Ok(())
    }

    /// Refuse further appends until the block is cleared or the ledger reset.
    pub fn block(&mut self, reason: BlockReason) {
        warn!(%reason, "ledger blocked");
        self.state.blocked = Some(reason);
    }
}
