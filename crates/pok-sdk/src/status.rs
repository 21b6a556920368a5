use std::fmt;

use serde::{Deserialize, Serialize};

/// A capability this build provides.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Feature {
    /// Entries are durable on the device without any network.
    OfflinePersistence,
    /// Every entry commits to its predecessor's hash.
    HashChainedEntries,
    /// History ships in deltas small enough for one optical code.
    BoundedDeltaSync,
    /// Merges refuse to rewrite history already held.
    ConflictDetectingMerge,
}

impl Feature {
    pub const ALL: [Feature; 4] = [
        Feature::OfflinePersistence,
        Feature::HashChainedEntries,
        Feature::BoundedDeltaSync,
        Feature::ConflictDetectingMerge,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::OfflinePersistence => "offline-persistence",
            Self::HashChainedEntries => "hash-chained-entries",
            Self::BoundedDeltaSync => "bounded-delta-sync",
            Self::ConflictDetectingMerge => "conflict-detecting-merge",
        }
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Lifecycle state of an application handle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AppState {
    Ready,
    /// Appends and merges are refused until the block is lifted.
    Blocked,
    /// Returned by teardown; the handle is gone.
    Closed,
}

impl fmt::Display for AppState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Ready => "ready",
            Self::Blocked => "blocked",
            Self::Closed => "closed",
        };
        f.write_str(s)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerStatus {
    pub peer: String,
    pub last_known_index: Option<u64>,
    /// Local entries the peer has not acknowledged.
    pub pending: u64,
}

/// Snapshot of an application handle, suitable for display or JSON.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppStatus {
    pub version: String,
    pub state: AppState,
    pub entries: u64,
    /// Hex hash of the latest entry.
    pub head_hash: Option<String>,
    pub intact: bool,
    pub blocked: Option<String>,
    pub peers: Vec<PeerStatus>,
    pub features: Vec<Feature>,
}
