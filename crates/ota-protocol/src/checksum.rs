//! CRC-32/MPEG-2: polynomial `0x04C11DB7`, seeded with all-ones, MSB first, no final XOR.
//!
//! Must stay bit-for-bit identical to what the host tool computes.

use crc::{CRC_32_MPEG_2, Crc, Digest};

static CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_MPEG_2);

/// One-shot checksum of `bytes`.
pub fn checksum(bytes: &[u8]) -> u32 {
    CRC32.checksum(bytes)
}

/// Incremental form of [`checksum`] for data that doesn't fit in one buffer.
pub struct Checksum(Digest<'static, u32>);

impl Checksum {
    pub fn new() -> Self {
        Self(CRC32.digest())
    }

    pub fn update(&mut self, bytes: &[u8]) {
        self.0.update(bytes);
    }

    pub fn finalize(self) -> u32 {
        self.0.finalize()
    }
}

impl Default for Checksum {
    fn default() -> Self {
        Self::new()
    }
}
