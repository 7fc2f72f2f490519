//! Content fingerprints for change detection and priming dedup.

use std::fmt;

/// Chunk size used when streaming file contents through the hasher.
pub const CHUNK_SIZE: usize = 8 * 1024;

/// Fixed-width digest of a file's full content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint(blake3::Hash);

impl Fingerprint {
    /// Fingerprint a complete byte slice.
    #[must_use]
    pub fn of(bytes: &[u8]) -> Self {
        let mut hasher = Fingerprinter::new();
        for chunk in bytes.chunks(CHUNK_SIZE) {
            hasher.update(chunk);
        }
        hasher.finish()
    }

    /// Abbreviated hex form for log lines.
    #[must_use]
    pub fn short(&self) -> String {
        let hex = self.0.to_hex();
        hex.as_str()[..12].to_string()
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.to_hex())
    }
}

/// Streaming fingerprint builder.
///
/// Memory use is independent of input size: callers feed bounded chunks
/// and call [`Fingerprinter::finish`] once the input is exhausted.
#[derive(Debug, Default, Clone)]
pub struct Fingerprinter {
    hasher: blake3::Hasher,
}

impl Fingerprinter {
    /// Create an empty fingerprinter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed the next chunk of content.
    pub fn update(&mut self, chunk: &[u8]) {
        self.hasher.update(chunk);
    }

    /// Produce the fingerprint of everything fed so far.
    #[must_use]
    pub fn finish(&self) -> Fingerprint {
        Fingerprint(self.hasher.finalize())
    }
}
