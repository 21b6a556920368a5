use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// The last ledger index a peer is known to hold.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncCursor {
    pub last_known_index: Option<u64>,
}

impl SyncCursor {
    /// A peer that holds nothing yet.
    pub fn empty() -> Self {
        Self::default()
    }

    /// A peer that holds every entry up to and including `index`.
    pub fn at(index: u64) -> Self {
        Self {
            last_known_index: Some(index),
        }
    }

    /// First index the peer has not seen.
    pub fn next_index(&self) -> u64 {
        self.last_known_index
            .map(|i| i.saturating_add(1))
            .unwrap_or(0)
    }

    /// Move forward to `index`. Returns `false` (and stays put) if that
    /// would move the cursor backwards or nowhere.
    pub fn advance(&mut self, index: u64) -> bool {
        match self.last_known_index {
            Some(current) if current >= index => false,
            _ => {
                self.last_known_index = Some(index);
                true
            }
        }
    }
}

/// Cursors for every known peer, keyed by peer id.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CursorBook {
    peers: BTreeMap<String, SyncCursor>,
}

impl CursorBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cursor for `peer`; unknown peers have seen nothing.
    pub fn get(&self, peer: &str) -> SyncCursor {
        self.peers.get(peer).copied().unwrap_or_default()
    }

    /// Advance `peer` to `index`, creating the cursor if needed.
    pub fn advance(&mut self, peer: &str, index: u64) -> bool {
        self.peers.entry(peer.to_string()).or_default().advance(index)
    }

    pub fn forget(&mut self, peer: &str) -> Option<SyncCursor> {
        self.peers.remove(peer)
    }

    pub fn clear(&mut self) {
        self.peers.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, SyncCursor)> {
        self.peers.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}

/// Where a merge is in its lifecycle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MergePhase {
    #[default]
    Idle,
    Validating,
    Applying,
    Rejected,
}

impl fmt::Display for MergePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Validating => "validating",
            Self::Applying => "applying",
            Self::Rejected => "rejected",
        };
        f.write_str(name)
    }
}

/// Outcome of a successful merge.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MergeResult {
    /// Terminal phase, always [`MergePhase::Idle`] for a returned result.
    pub phase: MergePhase,
    /// Entries newly added to the local ledger.
    pub appended: usize,
    /// Entries the local ledger already held with identical hashes.
    pub already_known: usize,
    /// Last index carried by the delta, if it carried any.
    pub last_index: Option<u64>,
}

impl MergeResult {
    pub fn is_noop(&self) -> bool {
        self.appended == 0
    }
}

/// An encoded delta ready to hand to a peer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutgoingDelta {
    pub bytes: Vec<u8>,
    /// First index carried; meaningless when `entry_count` is zero.
    pub start_index: u64,
    pub entry_count: usize,
    /// Unseen entries that did not fit and need another delta.
    pub remaining: usize,
}

impl OutgoingDelta {
    pub fn is_empty(&self) -> bool {
        self.entry_count == 0
    }

    /// Last index carried, if any.
    pub fn last_index(&self) -> Option<u64> {
        (self.entry_count > 0).then(|| self.start_index + self.entry_count as u64 - 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_cursor_starts_at_zero() {
        assert_eq!(SyncCursor::empty().next_index(), 0);
        assert_eq!(SyncCursor::at(10).next_index(), 11);
    }

    #[test]
    fn cursor_never_moves_backwards() {
        let mut cursor = SyncCursor::at(5);
        assert!(!cursor.advance(3));
        assert!(!cursor.advance(5));
        assert_eq!(cursor, SyncCursor::at(5));
        assert!(cursor.advance(8));
        assert_eq!(cursor.last_known_index, Some(8));
    }

    #[test]
    fn book_tracks_peers_independently() {
        let mut book = CursorBook::new();
        assert_eq!(book.get("tablet"), SyncCursor::empty());
        assert!(book.advance("tablet", 4));
        assert!(book.advance("phone", 1));
        assert_eq!(book.get("tablet").next_index(), 5);
        assert_eq!(book.len(), 2);

        let peers: Vec<&str> = book.iter().map(|(p, _)| p).collect();
        assert_eq!(peers, vec!["phone", "tablet"]);

        assert_eq!(book.forget("phone"), Some(SyncCursor::at(1)));
        assert_eq!(book.len(), 1);
    }

    #[test]
    fn book_serializes_as_json() {
        let mut book = CursorBook::new();
        book.advance("tablet", 7);
        let json = serde_json::to_string(&book).unwrap();
        let back: CursorBook = serde_json::from_str(&json).unwrap();
        assert_eq!(back, book);
    }

    #[test]
    fn outgoing_last_index() {
        let delta = OutgoingDelta {
            bytes: vec![],
            start_index: 11,
            entry_count: 3,
            remaining: 0,
        };
        assert_eq!(delta.last_index(), Some(13));

        let empty = OutgoingDelta { entry_count: 0, ..delta };
        assert!(empty.is_empty());
        assert_eq!(empty.last_index(), None);
    }

    #[test]
    fn merge_phase_display() {
        assert_eq!(MergePhase::default(), MergePhase::Idle);
        assert_eq!(MergePhase::Rejected.to_string(), "rejected");
    }
}
