//! LC-3 register file.
//!
//! The machine has:
//! - R0-R7: eight general-purpose 16-bit registers
//! - PC: the program counter
//! - COND: the N/Z/P condition flag

use crate::word::Condition;
use serde::{Deserialize, Serialize};

/// Number of general-purpose registers.
pub const GPR_COUNT: usize = 8;

/// Conventional load and start address for user programs.
pub const PC_START: u16 = 0x3000;

/// The register file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registers {
    /// R0-R7.
    pub r: [u16; GPR_COUNT],

    /// Address of the next instruction to fetch.
    pub pc: u16,

    /// Condition flag, set by every instruction that writes a result
    /// register.
    pub cond: Condition,
}

impl Registers {
    /// Create a register file with all registers zeroed and PC at
    /// [`PC_START`].
    pub fn new() -> Self {
        Self {
            r: [0; GPR_COUNT],
            pc: PC_START,
            cond: Condition::Zero,
        }
    }

    /// Zero every register and point PC at `start`.
    pub fn reset(&mut self, start: u16) {
        self.r = [0; GPR_COUNT];
        self.pc = start;
        self.cond = Condition::Zero;
    }

    /// Read a general-purpose register. Only the low 3 bits of `index`
    /// are used.
    #[inline]
    pub fn get(&self, index: u8) -> u16 {
        self.r[usize::from(index & 0x7)]
    }

    /// Write a general-purpose register. Does not touch COND.
    #[inline]
    pub fn set(&mut self, index: u8, value: u16) {
        self.r[usize::from(index & 0x7)] = value;
    }

    /// Set COND from a freshly produced result.
    #[inline]
    pub fn update_flags(&mut self, value: u16) {
        self.cond = Condition::from_word(value);
    }

    /// Write a result register and derive COND from it.
    #[inline]
    pub fn set_with_flags(&mut self, index: u8, value: u16) {
        self.set(index, value);
        self.update_flags(value);
    }

    /// Increment PC (wrapping). Returns the old value.
    #[inline]
    pub fn advance_pc(&mut self) -> u16 {
        let old = self.pc;
        self.pc = self.pc.wrapping_add(1);
        old
    }

    /// PC plus a sign-extended offset.
    #[inline]
    pub fn pc_relative(&self, offset: u16) -> u16 {
        self.pc.wrapping_add(offset)
    }
}

impl Default for Registers {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for Registers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, v) in self.r.iter().enumerate() {
            write!(f, "R{}={:04X} ", i, v)?;
        }
        write!(f, "PC={:04X} COND={}", self.pc, self.cond)
    }
}
