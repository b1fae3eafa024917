//! Low-level assembly of multi-word fields from 16-bit limbs.
//!
//! Every multi-word field in a DT5780 record is stored least-significant limb
//! first: limb 0 occupies bits [0:16), limb 1 bits [16:32), and so on.

use crate::types::FormatFlags;

// ============================================================================
// Field widths in 16-bit words, in stream order
// ============================================================================

pub const BOARD_WORDS: usize = 1;
pub const CHANNEL_WORDS: usize = 1;
pub const TIMESTAMP_WORDS: usize = 4;
pub const CHARGE_WORDS: usize = 1;
/// Present only in calibrated mode.
pub const ENERGY_WORDS: usize = 4;
pub const FLAGS_WORDS: usize = 2;
pub const SAMPLE_COUNT_WORDS: usize = 2;

/// Words in a record header that are present in every file.
pub const BASE_FIXED_WORDS: usize = BOARD_WORDS
    + CHANNEL_WORDS
    + TIMESTAMP_WORDS
    + CHARGE_WORDS
    + FLAGS_WORDS
    + SAMPLE_COUNT_WORDS;

/// Number of fixed-width words preceding the waveform for the given flags.
#[inline]
pub fn fixed_words(flags: FormatFlags) -> usize {
    if flags.calibrated {
        BASE_FIXED_WORDS + ENERGY_WORDS
    } else {
        BASE_FIXED_WORDS
    }
}

// ============================================================================
// Limb assembly
// ============================================================================

/// Assembles a 32-bit value from two limbs.
#[inline]
pub fn assemble_u32(limbs: [u16; 2]) -> u32 {
    (limbs[0] as u32) | ((limbs[1] as u32) << 16)
}

/// Assembles a 64-bit value from four limbs.
///
/// Used for both the 48-bit timestamp and the raw energy bit pattern. The
/// fourth limb is taken verbatim; the timestamp's top 16 bits are expected to
/// be zero but are not masked.
#[inline]
pub fn assemble_u64(limbs: [u16; 4]) -> u64 {
    (limbs[0] as u64)
        | ((limbs[1] as u64) << 16)
        | ((limbs[2] as u64) << 32)
        | ((limbs[3] as u64) << 48)
}

/// Reinterprets four limbs as an IEEE-754 double.
///
/// This is a bit-pattern reinterpretation of the assembled 64-bit word, not a
/// numeric conversion.
#[inline]
pub fn f64_from_limbs(limbs: [u16; 4]) -> f64 {
    f64::from_bits(assemble_u64(limbs))
}

// ============================================================================
// Limb splitting (inverse of the above)
// ============================================================================

/// Splits a 32-bit value into two limbs.
#[inline]
pub fn split_u32(value: u32) -> [u16; 2] {
    [value as u16, (value >> 16) as u16]
}

/// Splits a 64-bit value into four limbs.
#[inline]
pub fn split_u64(value: u64) -> [u16; 4] {
    [
        value as u16,
        (value >> 16) as u16,
        (value >> 32) as u16,
        (value >> 48) as u16,
    ]
}

/// Splits the bit pattern of an IEEE-754 double into four limbs.
#[inline]
pub fn f64_to_limbs(value: f64) -> [u16; 4] {
    split_u64(value.to_bits())
}
