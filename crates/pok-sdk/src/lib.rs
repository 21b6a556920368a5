//! Application-facing API for the proof-of-knowledge ledger.
//!
//! [`PokApp`] owns one device's ledger: the durable entry log, the peer
//! cursors, any recorded block and the sync coordinator, all rooted in a
//! single data directory.
//! It is created with [`PokApp::init`] and closed with [`PokApp::teardown`];
//! there is no process-wide state.

pub mod app;
pub mod config;
pub mod error;
pub mod status;

pub use app::PokApp;
pub use config::{AppConfig, BLOCK_FILE, CONFIG_FILE, CURSORS_FILE, LEDGER_FILE};
pub use error::{SdkError, SdkResult};
pub use status::{AppState, AppStatus, Feature, PeerStatus};

// Re-export key types
pub use pok_crypto::ContentHasher;
pub use pok_ledger::{BlockReason, ResetConfirmation, Snapshot};
pub use pok_store::SyncMode;
pub use pok_sync::{MergeResult, OutgoingDelta, SyncCursor};
pub use pok_types::{Entry, EntryHash, Timestamp};
