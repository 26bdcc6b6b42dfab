// md4.rs — block checksum used to identify a loaded map
// Delegates the digest to the `md4` crate (RustCrypto).

use ::md4::{Digest, Md4};

/// XOR of the four little-endian words of the MD4 digest of `data`.
pub fn com_block_checksum(data: &[u8]) -> u32 {
    Md4::digest(data)
        .chunks_exact(4)
        .map(|w| u32::from_le_bytes([w[0], w[1], w[2], w[3]]))
        .fold(0, |acc, w| acc ^ w)
}
