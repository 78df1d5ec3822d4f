//! Reversible XOR obfuscation of archive payloads.
//!
//! Not cryptography. The cipher deters casual inspection of shipped
//! archives while staying cheap enough to run on every payload read. The
//! same call both obfuscates and deobfuscates.

const KEY_SEED: u32 = 0x5400_7B47;

/// Derive the per-payload XOR key from a string, normally the file's
/// lowercase relative path.
pub fn generate_key(s: &str) -> u32 {
    let mut key = KEY_SEED;
    for b in s.bytes() {
        key = key
            .wrapping_mul(33)
            .wrapping_add(u32::from(b.to_ascii_lowercase()));
    }
    key
}

/// XOR `data` in place with a stream derived from `key`. Self-inverse.
pub fn obfuscate(key: u32, data: &mut [u8]) {
    for (i, byte) in data.iter_mut().enumerate() {
        let rotated = (key >> ((i % 4) * 8)) as u8;
        *byte ^= rotated.wrapping_add(((i / 4).wrapping_mul(101)) as u8);
    }
}
