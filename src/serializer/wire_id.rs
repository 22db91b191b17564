//! Wire identifier derivation.
//!
//! A type's on-wire identity is `murmur3_32(UTF8(logical_name), SEED)`. The
//! identifier is deliberately decoupled from the type's structure: renaming the
//! backing Rust type keeps wire compatibility as long as the logical name
//! stays, while reordering or adding fields breaks it (the format carries no
//! field tags).
//!
//! Collisions between distinct logical names are possible in principle; the
//! codec registry rejects them at registration time rather than probing for a
//! replacement, so the failure is loud and happens at startup.

/// Fixed murmur3 seed. Changing it invalidates every identifier ever issued.
pub const WIRE_ID_SEED: u32 = 19_850_922;

/// Derive the 32-bit wire identifier for a logical name.
#[inline]
pub fn wire_id(logical_name: &str) -> u32 {
    murmur3_32(logical_name.as_bytes(), WIRE_ID_SEED)
}

/// MurmurHash3, 32-bit x86 variant.
///
/// Implemented inline: the only requirement is bit-for-bit stability across
/// runs and builds, which rules out the randomly seeded std hasher.
pub fn murmur3_32(data: &[u8], seed: u32) -> u32 {
    const C1: u32 = 0xcc9e_2d51;
    const C2: u32 = 0x1b87_3593;

    let mut h = seed;
    let mut chunks = data.chunks_exact(4);

    for chunk in chunks.by_ref() {
        let mut k = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        k = k.wrapping_mul(C1);
        k = k.rotate_left(15);
        k = k.wrapping_mul(C2);
        h ^= k;
        h = h.rotate_left(13);
        h = h.wrapping_mul(5).wrapping_add(0xe654_6b64);
    }

    let tail = chunks.remainder();
    if !tail.is_empty() {
        let mut k = 0u32;
        for (i, &b) in tail.iter().enumerate() {
            k ^= (b as u32) << (8 * i);
        }
        k = k.wrapping_mul(C1);
        k = k.rotate_left(15);
        k = k.wrapping_mul(C2);
        h ^= k;
    }

    h ^= data.len() as u32;
    h ^= h >> 16;
    h = h.wrapping_mul(0x85eb_ca6b);
    h ^= h >> 13;
    h = h.wrapping_mul(0xc2b2_ae35);
    h ^= h >> 16;
    h
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_murmur3_reference_vectors() {
        // Published test vectors for the x86 32-bit variant.
        assert_eq!(murmur3_32(b"", 0), 0);
        assert_eq!(murmur3_32(b"", 1), 0x514e_28b7);
        assert_eq!(murmur3_32(b"test", 0), 0xba6b_d213);
        assert_eq!(murmur3_32(b"Hello, world!", 0), 0xc036_3e43);
        assert_eq!(murmur3_32(b"The quick brown fox jumps over the lazy dog", 0x9747b28c), 0x2fa826cd);
    }

    #[test]
    fn test_wire_id_is_deterministic() {
        assert_eq!(wire_id("Ping"), wire_id("Ping"));
    }

    #[test]
    fn test_distinct_names_distinct_ids() {
        let names = ["Ping", "Pong", "ChatLine", "PlayerState", "Heartbeat"];
        for a in &names {
            for b in &names {
                if a != b {
                    assert_ne!(wire_id(a), wire_id(b), "{a} vs {b}");
                }
            }
        }
    }

    #[test]
    fn test_tail_lengths() {
        // Exercise all four tail sizes.
        let ids: Vec<u32> = ["a", "ab", "abc", "abcd", "abcde"]
            .iter()
            .map(|s| wire_id(s))
            .collect();
        for (i, a) in ids.iter().enumerate() {
            for b in &ids[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }
}
