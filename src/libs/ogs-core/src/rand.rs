//! Random number generation

use rand::{Rng, RngCore};

/// Fill buffer with random bytes
pub fn ogs_random(buf: &mut [u8]) {
    rand::rng().fill_bytes(buf);
}

/// Generate random 32-bit value
pub fn ogs_random32() -> u32 {
    rand::random()
}

/// Generate a uniformly distributed value of `bits` width (1..=32)
pub fn ogs_random_bits(bits: u32) -> u32 {
    debug_assert!((1..=32).contains(&bits));
    if bits >= 32 {
        return ogs_random32();
    }
    rand::rng().random_range(0..(1u32 << bits))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ogs_random() {
        let mut buf1 = [0u8; 16];
        let mut buf2 = [0u8; 16];

        ogs_random(&mut buf1);
        ogs_random(&mut buf2);

        // Very unlikely to be equal
        assert_ne!(buf1, buf2);
    }

    #[test]
    fn test_ogs_random_bits_in_range() {
        for _ in 0..1000 {
            assert!(ogs_random_bits(22) < (1 << 22));
            assert!(ogs_random_bits(1) < 2);
        }
    }
}
