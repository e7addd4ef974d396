//! Constant-time bit-scan primitives for 64-bit block masks.
//!
//! Every mask iteration in the engine — the query compiler's block
//! extraction, the runner's sparse path, free-slot selection in the entity
//! store — runs on the same three operations defined here:
//!
//! * **lowest set bit index** via a de Bruijn multiply-shift perfect hash,
//! * **clear lowest set bit** (`word & (word - 1)`),
//! * **population count** and **one-past-highest-bit** for the runner's
//!   density heuristic.
//!
//! The de Bruijn pair (`DEBRUIJN_MAGIC`, `DEBRUIJN_TABLE`) was derived
//! offline: isolating the lowest set bit (`word & word.wrapping_neg()`)
//! leaves a power of two, and multiplying a power of two by a de Bruijn
//! sequence places a unique 6-bit pattern in the top bits, which the table
//! maps back to the bit index.
//!
//! All functions are pure and total except [`lowest_set_bit`], whose
//! precondition `word != 0` is debug-asserted; callers guard.

/// 64-bit de Bruijn sequence used as the multiply constant of the
/// lowest-set-bit perfect hash.
pub const DEBRUIJN_MAGIC: u64 = 0x03F7_9D71_B4CB_0A89;

/// Lookup table completing the de Bruijn perfect hash: indexed by the top
/// six bits of `isolated_bit * DEBRUIJN_MAGIC`.
pub const DEBRUIJN_TABLE: [u32; 64] = [
     0,  1, 48,  2, 57, 49, 28,  3,
    61, 58, 50, 42, 38, 29, 17,  4,
    62, 55, 59, 36, 53, 51, 43, 22,
    45, 39, 33, 30, 24, 18, 12,  5,
    63, 47, 56, 27, 60, 41, 37, 16,
    54, 35, 52, 21, 44, 32, 23, 11,
    46, 26, 40, 15, 34, 20, 31, 10,
    25, 14, 19,  9, 13,  8,  7,  6,
];

/// Returns the 0-based index of the lowest set bit of `word`.
///
/// ## Precondition
/// `word != 0`. Debug builds assert; release builds return an arbitrary
/// in-range index for a zero word.

#[inline]
pub fn lowest_set_bit(word: u64) -> u32 {
    debug_assert!(word != 0, "lowest_set_bit requires a non-zero word");
    let isolated = word & word.wrapping_neg();
    DEBRUIJN_TABLE[(isolated.wrapping_mul(DEBRUIJN_MAGIC) >> 58) as usize]
}

/// Clears the lowest set bit of `word`. Zero stays zero.
#[inline]
pub fn clear_lowest_set_bit(word: u64) -> u64 {
    word & word.wrapping_sub(1)
}

/// Returns the number of set bits in `word`.
#[inline]
pub fn bit_count(word: u64) -> u32 {
    word.count_ones()
}

/// Returns the index one past the highest set bit of `word`, or 0 for an
/// empty word.
#[inline]
pub fn bit_span_end(word: u64) -> u32 {
    64 - word.leading_zeros()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testutil::tl_rand_u64;

    #[test]
    fn debruijn_matches_trailing_zeros_for_single_bits() {
        for bit in 0..64 {
            let word = 1u64 << bit;
            assert_eq!(lowest_set_bit(word), bit, "bit {bit}");
        }
    }

    #[test]
    fn debruijn_matches_trailing_zeros_for_sampled_words() {
        for _ in 0..10_000 {
            let word = tl_rand_u64();
            if word == 0 {
                continue;
            }
            assert_eq!(lowest_set_bit(word), word.trailing_zeros());
        }
        assert_eq!(lowest_set_bit(u64::MAX), 0);
        assert_eq!(lowest_set_bit(1 << 63), 63);
    }

    #[test]
    fn extract_and_clear_visits_all_bits_ascending() {
        let mut word = 0b1010_0110_0001u64 | (1 << 63);
        let mut seen = Vec::new();
        while word != 0 {
            let bit = lowest_set_bit(word);
            word = clear_lowest_set_bit(word);
            seen.push(bit);
        }
        assert_eq!(seen, vec![0, 5, 6, 9, 11, 63]);
    }

    #[test]
    fn span_and_count() {
        assert_eq!(bit_count(0), 0);
        assert_eq!(bit_span_end(0), 0);
        assert_eq!(bit_count(u64::MAX), 64);
        assert_eq!(bit_span_end(u64::MAX), 64);
        assert_eq!(bit_span_end(0b0100_0000), 7);
        assert_eq!(bit_count(0b0100_0001), 2);
    }
}
