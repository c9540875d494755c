//! 16-bit word primitives.
//!
//! All machine arithmetic is plain `u16` with wraparound. This module holds
//! the two helpers that give those bits meaning:
//! - [`sign_extend`] widens an n-bit two's-complement field to 16 bits
//! - [`Condition`] is the three-way flag derived from a result value

use serde::{Deserialize, Serialize};

/// Widen the low `bit_count` bits of `x` to a full word, copying bit
/// `bit_count - 1` into every higher bit.
///
/// `bit_count` must be in `1..=16`.
#[inline]
pub fn sign_extend(x: u16, bit_count: u32) -> u16 {
    debug_assert!((1..=16).contains(&bit_count));
    if bit_count >= 16 {
        return x;
    }
    let mask = (1u16 << bit_count) - 1;
    let x = x & mask;
    if (x >> (bit_count - 1)) & 1 == 1 {
        x | !mask
    } else {
        x
    }
}

/// The condition register.
///
/// Exactly one flag is ever set. The discriminants line up with the
/// `n z p` mask carried in bits [11:9] of a BR instruction, so a branch
/// is taken when `mask & cond as u16 != 0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[repr(u16)]
pub enum Condition {
    /// Result was positive (bit 15 clear, nonzero).
    Pos = 0b001,
    /// Result was zero.
    #[default]
    Zero = 0b010,
    /// Result had bit 15 set.
    Neg = 0b100,
}

impl Condition {
    /// Derive the flag for a freshly written register value.
    #[inline]
    pub fn from_word(value: u16) -> Self {
        if value >> 15 == 1 {
            Condition::Neg
        } else if value == 0 {
            Condition::Zero
        } else {
            Condition::Pos
        }
    }

    /// The flag's bit in the `n z p` mask layout.
    #[inline]
    pub fn bits(self) -> u16 {
        self as u16
    }

    /// Whether a BR mask selects this flag.
    #[inline]
    pub fn matches(self, mask: u16) -> bool {
        mask & self.bits() != 0
    }
}

impl std::fmt::Display for Condition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let c = match self {
            Condition::Pos => 'P',
            Condition::Zero => 'Z',
            Condition::Neg => 'N',
        };
        write!(f, "{}", c)
    }
}
