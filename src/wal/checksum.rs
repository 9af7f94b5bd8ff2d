//! CRC32 (IEEE) checksums for record frames and file headers

use crc32fast::Hasher;

/// CRC32 of `data`.
pub fn compute_checksum(data: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(data);
    hasher.finalize()
}

/// Whether `data` hashes to `expected`.
pub fn verify_checksum(data: &[u8], expected: u32) -> bool {
    compute_checksum(data) == expected
}

/// Reads the little-endian checksum stored in the last four bytes of
/// `framed` and verifies it against everything before it.
///
/// Returns `(computed, stored)` on mismatch.
pub fn verify_trailing_checksum(framed: &[u8]) -> Result<(), (u32, u32)> {
    if framed.len() < 4 {
        return Err((compute_checksum(framed), 0));
    }
    let split = framed.len() - 4;
    let stored = u32::from_le_bytes([
        framed[split],
        framed[split + 1],
        framed[split + 2],
        framed[split + 3],
    ]);
    let computed = compute_checksum(&framed[..split]);
    if computed == stored {
        Ok(())
    } else {
        Err((computed, stored))
    }
}
