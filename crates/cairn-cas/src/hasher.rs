use cairn_types::Key;

/// Domain-separated BLAKE3 hasher for chunks.
///
/// The digest covers the domain tag, the chunk type, the indirection level
/// and the payload, each length-prefixed. Identical bytes stored under a
/// different type or level therefore get a different key, and re-hashing a
/// fetched chunk detects any change to its recorded type or level as well as
/// to its bytes.
pub struct ChunkHasher {
    domain: &'static str,
}

impl ChunkHasher {
    /// Hasher used by every cairn chunk store.
    pub const CHUNK: Self = Self {
        domain: "cairn-chunk-v1",
    };

    /// Create a hasher with a custom domain tag.
    pub const fn new(domain: &'static str) -> Self {
        Self { domain }
    }

    /// Compute the key for a chunk with the given parts.
    pub fn hash(&self, chunk_type: &str, level: u8, buf: &[u8]) -> Key {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.domain.as_bytes());
        hasher.update(b":");
        hasher.update(&(chunk_type.len() as u64).to_le_bytes());
        hasher.update(chunk_type.as_bytes());
        hasher.update(&[level]);
        hasher.update(&(buf.len() as u64).to_le_bytes());
        hasher.update(buf);
        Key::from_hash(*hasher.finalize().as_bytes())
    }

    /// Verify that the parts produce the expected key.
    pub fn verify(&self, chunk_type: &str, level: u8, buf: &[u8], expected: &Key) -> bool {
        self.hash(chunk_type, level, buf) == *expected
    }

    /// The domain tag used by this hasher.
    pub fn domain(&self) -> &str {
        self.domain
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_deterministic() {
        let a = ChunkHasher::CHUNK.hash("file", 0, b"hello world");
        let b = ChunkHasher::CHUNK.hash("file", 0, b"hello world");
        assert_eq!(a, b);
    }

    #[test]
    fn type_and_level_are_part_of_the_key() {
        let file = ChunkHasher::CHUNK.hash("file", 0, b"same");
        let dir = ChunkHasher::CHUNK.hash("dir", 0, b"same");
        let index = ChunkHasher::CHUNK.hash("file", 1, b"same");
        assert_ne!(file, dir);
        assert_ne!(file, index);
    }

    #[test]
    fn length_prefix_prevents_boundary_shift() {
        let a = ChunkHasher::CHUNK.hash("ab", 0, b"c");
        let b = ChunkHasher::CHUNK.hash("a", 0, b"bc");
        assert_ne!(a, b);
    }

    #[test]
    fn verify_detects_tampering() {
        let key = ChunkHasher::CHUNK.hash("file", 0, b"original");
        assert!(ChunkHasher::CHUNK.verify("file", 0, b"original", &key));
        assert!(!ChunkHasher::CHUNK.verify("file", 0, b"tampered", &key));
    }

    #[test]
    fn custom_domain_differs() {
        let custom = ChunkHasher::new("other-v1").hash("file", 0, b"data");
        assert_ne!(custom, ChunkHasher::CHUNK.hash("file", 0, b"data"));
        assert_eq!(ChunkHasher::new("other-v1").domain(), "other-v1");
    }
}
