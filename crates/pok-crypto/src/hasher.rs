use pok_types::EntryHash;

/// Domain-separated BLAKE3 content hasher.
///
/// Each hasher carries a domain tag (e.g. `"pok-entry-v1"`) that is
/// prepended to every hash computation, so an entry link and a payload
/// fingerprint over identical bytes never collide.
pub struct ContentHasher {
    domain: &'static str,
}

impl ContentHasher {
    /// Hasher for chain links between entries.
    pub const ENTRY: Self = Self {
        domain: "pok-entry-v1",
    };
    /// Hasher for payload fingerprints shown to users and in logs.
    pub const PAYLOAD: Self = Self {
        domain: "pok-payload-v1",
    };

    /// A streaming BLAKE3 hasher already seeded with the domain tag.
    pub fn begin(&self) -> blake3::Hasher {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.domain.as_bytes());
        hasher.update(b":");
        hasher
    }

    /// Hash raw bytes with domain separation.
    pub fn hash(&self, data: &[u8]) -> EntryHash {
        let mut hasher = self.begin();
        hasher.update(data);
        EntryHash::from_bytes(*hasher.finalize().as_bytes())
    }
}
