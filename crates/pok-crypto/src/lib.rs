//! Cryptographic primitives for the proof-of-knowledge ledger.
//!
//! Provides domain-separated BLAKE3 hashing and the hash chain that links
//! every ledger entry to its predecessor. All hashing wraps `blake3`; there
//! is no custom cryptography here.

pub mod chain;
pub mod hasher;

pub use chain::{ChainError, ChainFault, HashChain};
pub use hasher::ContentHasher;
