use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use pok_crypto::HashChain;
use pok_delta::{Delta, DeltaCodec};
use pok_ledger::{BlockReason, LedgerError, LedgerStore, LedgerWriteGuard};
use pok_types::Entry;
use tracing::{debug, info, warn};

use crate::error::{SyncError, SyncResult};
use crate::types::{CursorBook, MergePhase, MergeResult, OutgoingDelta, SyncCursor};

/// Drives delta exchange between the local ledger and its peers.
///
/// Merges run entirely under the ledger's write guard: the delta is
/// validated against the local chain, then persisted as one batch. A
/// rejected delta leaves the ledger exactly as it was.
pub struct SyncCoordinator {
    ledger: Arc<LedgerStore>,
    codec: DeltaCodec,
    cursors: Mutex<CursorBook>,
    last_phase: Mutex<MergePhase>,
}

impl SyncCoordinator {
    /// Coordinator with the default 400-byte delta budget.
    pub fn new(ledger: Arc<LedgerStore>) -> Self {
        Self::with_codec(ledger, DeltaCodec::default())
    }

    pub fn with_codec(ledger: Arc<LedgerStore>, codec: DeltaCodec) -> Self {
        Self {
            ledger,
            codec,
            cursors: Mutex::new(CursorBook::new()),
            last_phase: Mutex::new(MergePhase::Idle),
        }
    }

    /// Seed the peer cursors, typically from persisted state.
    pub fn with_cursors(self, cursors: CursorBook) -> Self {
        *lock(&self.cursors) = cursors;
        self
    }

    pub fn ledger(&self) -> &Arc<LedgerStore> {
        &self.ledger
    }

    pub fn codec(&self) -> DeltaCodec {
        self.codec
    }

    pub fn cursor(&self, peer: &str) -> SyncCursor {
        lock(&self.cursors).get(peer)
    }

    /// Copy of every peer cursor.
    pub fn cursors(&self) -> CursorBook {
        lock(&self.cursors).clone()
    }

    /// Drop all peer cursors, e.g. after the ledger was reset.
    pub fn clear_cursors(&self) {
        lock(&self.cursors).clear();
    }

    /// Terminal phase of the most recent merge.
    pub fn last_phase(&self) -> MergePhase {
        *lock(&self.last_phase)
    }

    /// Encode the oldest entries the peer behind `cursor` has not seen.
    ///
    /// Carries as many as fit in the codec's capacity; the rest are counted
    /// in [`OutgoingDelta::remaining`]. A peer that is up to date gets an
    /// empty delta.
    pub fn prepare_outgoing(&self, cursor: &SyncCursor) -> SyncResult<OutgoingDelta> {
        if let Some(reason @ BlockReason::Corrupted { .. }) = self.ledger.blocked() {
            return Err(LedgerError::Blocked(reason).into());
        }

        let from = cursor.next_index();
        let unseen = self.ledger.snapshot(from);
        let (bytes, entry_count) = self.codec.encode_counted(unseen.as_slice())?;
        let remaining = unseen.len() - entry_count;

        debug!(
            from,
            count = entry_count,
            remaining,
            len = bytes.len(),
            "outgoing delta prepared"
        );
        Ok(OutgoingDelta {
            bytes,
            start_index: from,
            entry_count,
            remaining,
        })
    }

    pub fn prepare_outgoing_bytes(&self, cursor: &SyncCursor) -> SyncResult<Vec<u8>> {
        self.prepare_outgoing(cursor).map(|delta| delta.bytes)
    }

    /// [`SyncCoordinator::prepare_outgoing`] for a known peer's cursor.
    pub fn prepare_for_peer(&self, peer: &str) -> SyncResult<OutgoingDelta> {
        self.prepare_outgoing(&self.cursor(peer))
    }

    /// Merge a delta received from a peer.
    ///
    /// Entries the ledger already holds must match hash for hash; a
    /// mismatch is a conflict and blocks the ledger. The remainder must
    /// continue the local chain. A delta that starts past the local next
    /// index is rejected as a gap without blocking.
    pub fn merge_incoming(&self, bytes: &[u8]) -> SyncResult<MergeResult> {
        self.transition(MergePhase::Validating);

        let delta = match DeltaCodec::decode(bytes) {
            Ok(delta) => delta,
            Err(err) => return self.reject(err.into()),
        };
        let mut guard = match self.ledger.write() {
            Ok(guard) => guard,
            Err(err) => return self.reject(err.into()),
        };

        let (known, fresh) = match validate(&guard, &delta) {
            Ok(split) => split,
            Err(err) => {
                if let Some(reason) = block_reason(&err) {
                    guard.block(reason);
                }
                return self.reject(err);
            }
        };

        self.transition(MergePhase::Applying);
        if let Err(err) = guard.append_verified(fresh) {
            return self.reject(err.into());
        }
        drop(guard);

        self.transition(MergePhase::Idle);
        let result = MergeResult {
            phase: MergePhase::Idle,
            appended: fresh.len(),
            already_known: known,
            last_index: delta.last_index(),
        };
        info!(
            start = delta.start_index,
            appended = result.appended,
            already_known = known,
            "delta merged"
        );
        Ok(result)
    }

    /// Merge a delta from `peer` and record that the peer holds everything
    /// it carried.
    pub fn merge_from_peer(&self, peer: &str, bytes: &[u8]) -> SyncResult<MergeResult> {
        let result = self.merge_incoming(bytes)?;
        if let Some(last) = result.last_index {
            self.acknowledge(peer, last);
        }
        Ok(result)
    }

    /// Record that `peer` confirmed receipt through `through_index`.
    ///
    /// Returns `false` if the cursor was already at or past that index.
    pub fn acknowledge(&self, peer: &str, through_index: u64) -> bool {
        let moved = lock(&self.cursors).advance(peer, through_index);
        if moved {
            debug!(peer, through_index, "peer cursor advanced");
        }
        moved
    }

    fn transition(&self, phase: MergePhase) {
        debug!(%phase, "merge phase");
        if matches!(phase, MergePhase::Idle | MergePhase::Rejected) {
            *lock(&self.last_phase) = phase;
        }
    }

    fn reject<T>(&self, err: SyncError) -> SyncResult<T> {
        self.transition(MergePhase::Rejected);
        warn!(error = %err, "delta rejected");
        Err(err)
    }
}

/// Check `delta` against the local chain and split it into the number of
/// entries already held and the slice still to append.
fn validate<'d>(
    guard: &LedgerWriteGuard<'_>,
    delta: &'d Delta,
) -> SyncResult<(usize, &'d [Entry])> {
    guard.ensure_writable()?;
    if delta.is_empty() {
        return Ok((0, &[]));
    }

    let next = guard.next_index();
    if delta.start_index > next {
        return Err(SyncError::SyncGapError {
            expected: next,
            received: delta.start_index,
        });
    }

    HashChain::verify_from(&delta.anchor, delta.start_index, &delta.entries).map_err(|err| {
        SyncError::ChainBroken {
            index: err.index(),
            reason: err.to_string(),
        }
    })?;

    let known = usize::try_from(next - delta.start_index)
        .unwrap_or(usize::MAX)
        .min(delta.entries.len());
    for remote in &delta.entries[..known] {
        if let Some(local) = guard.get(remote.index) {
            if local.hash != remote.hash {
                return Err(SyncError::ConflictDetected {
                    index: remote.index,
                    local: local.hash,
                    remote: remote.hash,
                });
            }
        }
    }

    let fresh = &delta.entries[known..];
    HashChain::verify_from(&guard.last_hash(), next, fresh).map_err(|err| {
        SyncError::ChainBroken {
            index: err.index(),
            reason: err.to_string(),
        }
    })?;

    Ok((known, fresh))
}

fn block_reason(err: &SyncError) -> Option<BlockReason> {
    match err {
        SyncError::ConflictDetected {
            index,
            local,
            remote,
        } => Some(BlockReason::Conflict {
            index: *index,
            detail: format!(
                "local {} differs from remote {}",
                local.short_hex(),
                remote.short_hex()
            ),
        }),
        SyncError::ChainBroken { index, reason } => Some(BlockReason::Conflict {
            index: *index,
            detail: format!("incoming delta does not link: {reason}"),
        }),
        _ => None,
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pok_delta::{DeltaError, HEADER_LEN};
    use pok_ledger::LedgerConfig;
    use pok_store::MemoryLog;

    fn ledger_with(count: u8) -> Arc<LedgerStore> {
        let ledger = Arc::new(LedgerStore::in_memory());
        for i in 0..count {
            ledger.append(vec![i; 8]).unwrap();
        }
        ledger
    }

    fn ledger_from(entries: Vec<Entry>) -> Arc<LedgerStore> {
        let log = Arc::new(MemoryLog::with_entries(entries));
        Arc::new(LedgerStore::open(log, LedgerConfig::default()).unwrap())
    }

    #[test]
    fn outgoing_from_empty_cursor_starts_at_zero() {
        let sync = SyncCoordinator::new(ledger_with(3));
        let out = sync.prepare_outgoing(&SyncCursor::empty()).unwrap();
        assert_eq!(out.start_index, 0);
        assert_eq!(out.entry_count, 3);
        assert_eq!(out.remaining, 0);
    }

    #[test]
    fn up_to_date_peer_gets_empty_delta() {
        let sync = SyncCoordinator::new(ledger_with(3));
        let out = sync.prepare_outgoing(&SyncCursor::at(2)).unwrap();
        assert!(out.is_empty());
        assert_eq!(out.bytes.len(), HEADER_LEN);
    }

    #[test]
    fn merge_into_empty_ledger() {
        let source = SyncCoordinator::new(ledger_with(4));
        let bytes = source.prepare_outgoing_bytes(&SyncCursor::empty()).unwrap();

        let target = SyncCoordinator::new(Arc::new(LedgerStore::in_memory()));
        let result = target.merge_incoming(&bytes).unwrap();
        assert_eq!(result.appended, 4);
        assert_eq!(result.last_index, Some(3));
        assert_eq!(target.last_phase(), MergePhase::Idle);
        assert_eq!(target.ledger().snapshot_all(), source.ledger().snapshot_all());
        target.ledger().verify_integrity().unwrap();
    }

    #[test]
    fn overlapping_delta_appends_only_new_entries() {
        let source = ledger_with(6);
        let target = ledger_from(source.snapshot(0).as_slice()[..4].to_vec());
        let bytes = SyncCoordinator::new(source.clone())
            .prepare_outgoing_bytes(&SyncCursor::at(1))
            .unwrap();

        let result = SyncCoordinator::new(target.clone()).merge_incoming(&bytes).unwrap();
        assert_eq!(result.already_known, 2);
        assert_eq!(result.appended, 2);
        assert_eq!(target.snapshot_all(), source.snapshot_all());
    }

    #[test]
    fn fully_known_delta_is_noop() {
        let ledger = ledger_with(3);
        let sync = SyncCoordinator::new(ledger.clone());
        let bytes = sync.prepare_outgoing_bytes(&SyncCursor::empty()).unwrap();
        let result = sync.merge_incoming(&bytes).unwrap();
        assert!(result.is_noop());
        assert_eq!(result.already_known, 3);
        assert_eq!(ledger.len(), 3);
    }

    #[test]
    fn empty_delta_is_noop() {
        let sync = SyncCoordinator::new(ledger_with(2));
        let bytes = DeltaCodec::default().encode(&[]).unwrap();
        let result = sync.merge_incoming(&bytes).unwrap();
        assert!(result.is_noop());
        assert_eq!(result.last_index, None);
    }

    #[test]
    fn gap_is_rejected_without_blocking() {
        let source = SyncCoordinator::new(ledger_with(8));
        let bytes = source.prepare_outgoing_bytes(&SyncCursor::at(4)).unwrap();

        let prefix = source.ledger().snapshot(0).as_slice()[..2].to_vec();
        let target = SyncCoordinator::new(ledger_from(prefix));
        let before = target.ledger().snapshot_all();
        let err = target.merge_incoming(&bytes).unwrap_err();
        assert!(matches!(err, SyncError::SyncGapError { expected: 2, received: 5 }));
        assert_eq!(target.last_phase(), MergePhase::Rejected);
        assert_eq!(target.ledger().snapshot_all(), before);
        assert!(target.ledger().blocked().is_none());
    }

    #[test]
    fn divergent_history_blocks_ledger() {
        let ours = SyncCoordinator::new(ledger_with(3));
        let theirs = Arc::new(LedgerStore::in_memory());
        theirs.append(vec![0u8; 8]).unwrap();
        theirs.append(b"different".to_vec()).unwrap();
        let bytes = SyncCoordinator::new(theirs)
            .prepare_outgoing_bytes(&SyncCursor::empty())
            .unwrap();

        let err = ours.merge_incoming(&bytes).unwrap_err();
        assert!(err.blocks_ledger());
        let index = match err {
            SyncError::ConflictDetected { index, .. } => index,
            other => panic!("expected conflict, got {other}"),
        };
        // Entry 0 has a different timestamp, so the chains diverge there.
        assert!(index <= 1);
        assert!(matches!(
            ours.ledger().blocked(),
            Some(BlockReason::Conflict { .. })
        ));
        assert!(matches!(
            ours.ledger().append(vec![1u8]).unwrap_err(),
            LedgerError::Blocked(_)
        ));
    }

    #[test]
    fn unlinked_delta_breaks_chain() {
        // Same index, unrelated history: no overlap to compare, so the link
        // check catches it.
        let ours = SyncCoordinator::new(ledger_with(2));
        let other = Arc::new(LedgerStore::in_memory());
        for i in 0..4u8 {
            other.append(vec![0xF0 | i; 5]).unwrap();
        }
        let bytes = SyncCoordinator::new(other)
            .prepare_outgoing_bytes(&SyncCursor::at(1))
            .unwrap();

        let err = ours.merge_incoming(&bytes).unwrap_err();
        assert!(matches!(err, SyncError::ChainBroken { index: 2, .. }));
        assert!(ours.ledger().blocked().is_some());
        assert_eq!(ours.ledger().len(), 2);
    }

    #[test]
    fn tampered_delta_hash_breaks_chain() {
        let source = SyncCoordinator::new(ledger_with(2));
        let mut bytes = source.prepare_outgoing_bytes(&SyncCursor::empty()).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;

        let target = SyncCoordinator::new(Arc::new(LedgerStore::in_memory()));
        let err = target.merge_incoming(&bytes).unwrap_err();
        assert!(matches!(err, SyncError::ChainBroken { index: 1, .. }));
        assert!(target.ledger().is_empty());
    }

    #[test]
    fn malformed_delta_does_not_block() {
        let sync = SyncCoordinator::new(ledger_with(1));
        let err = sync.merge_incoming(&[1, 2, 3]).unwrap_err();
        assert!(matches!(err, SyncError::Delta(DeltaError::MalformedDelta(_))));
        assert!(sync.ledger().blocked().is_none());
        assert_eq!(sync.last_phase(), MergePhase::Rejected);
    }

    #[test]
    fn persistence_failure_leaves_ledger_unchanged() {
        let source = SyncCoordinator::new(ledger_with(3));
        let bytes = source.prepare_outgoing_bytes(&SyncCursor::empty()).unwrap();

        let log = Arc::new(MemoryLog::new());
        let ledger = Arc::new(LedgerStore::open(log.clone(), LedgerConfig::default()).unwrap());
        let target = SyncCoordinator::new(ledger);
        log.set_fail_writes(true);

        let err = target.merge_incoming(&bytes).unwrap_err();
        assert!(matches!(err, SyncError::Ledger(LedgerError::Persistence(_))));
        assert!(target.ledger().is_empty());
        assert!(target.ledger().blocked().is_none());
    }

    #[test]
    fn merge_from_peer_advances_cursor() {
        let source = SyncCoordinator::new(ledger_with(3));
        let bytes = source.prepare_outgoing_bytes(&SyncCursor::empty()).unwrap();
        let target = SyncCoordinator::new(Arc::new(LedgerStore::in_memory()));

        target.merge_from_peer("tablet", &bytes).unwrap();
        assert_eq!(target.cursor("tablet"), SyncCursor::at(2));
    }

    #[test]
    fn acknowledge_is_monotonic() {
        let sync = SyncCoordinator::new(ledger_with(5));
        assert!(sync.acknowledge("phone", 3));
        assert!(!sync.acknowledge("phone", 1));
        assert_eq!(sync.prepare_for_peer("phone").unwrap().start_index, 4);
    }

    #[test]
    fn corrupted_ledger_refuses_export() {
        let mut entries = ledger_with(3).snapshot_all().to_vec();
        entries[1].payload[0] ^= 1;
        let sync = SyncCoordinator::new(ledger_from(entries));
        assert!(matches!(
            sync.prepare_outgoing(&SyncCursor::empty()).unwrap_err(),
            SyncError::Ledger(LedgerError::Blocked(BlockReason::Corrupted { index: 1, .. }))
        ));
    }
}
