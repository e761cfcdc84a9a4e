use kiln_types::ObjectId;

/// BLAKE3 hasher bound to a domain tag.
///
/// The tag and a `:` separator are fed ahead of the data, so a chunk id can
/// never equal the plain hash of the same bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ContentHasher {
    domain: &'static str,
}

impl ContentHasher {
    /// Hasher for canonical chunk payloads.
    pub const OBJECT: Self = Self::new("kiln-object-v1");

    pub const fn new(domain: &'static str) -> Self {
        Self { domain }
    }

    pub fn hash(&self, data: &[u8]) -> ObjectId {
        let digest = blake3::Hasher::new()
            .update(self.domain.as_bytes())
            .update(b":")
            .update(data)
            .finalize();
        ObjectId::from_hash(digest.into())
    }
}
