//! Instruction decoder for the LC-3.
//!
//! Every instruction is one 16-bit word. Bits [15:12] select the opcode and
//! the remaining twelve bits are opcode-specific fields: register numbers,
//! mode bits, and signed offsets. Offsets are sign-extended at decode time,
//! so the executor only ever adds them with wrapping arithmetic.

use crate::word::sign_extend;
use thiserror::Error;

/// Second source operand of ADD and AND.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand {
    /// Bit 5 clear: SR2 in bits [2:0].
    Reg(u8),
    /// Bit 5 set: imm5, already sign-extended.
    Imm(u16),
}

/// Where JSR/JSRR transfers control.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JsrTarget {
    /// JSR: PC-relative, off11 sign-extended.
    Offset(u16),
    /// JSRR: the address in a base register.
    Base(u8),
}

/// Decoded LC-3 instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instruction {
    // ==================== Operate ====================

    /// DR := SR1 + operand
    Add { dr: u8, sr1: u8, operand: Operand },

    /// DR := SR1 & operand
    And { dr: u8, sr1: u8, operand: Operand },

    /// DR := !SR
    Not { dr: u8, sr: u8 },

    // ==================== Data Movement ====================

    /// DR := mem[PC + offset]
    Ld { dr: u8, offset: u16 },

    /// DR := mem[mem[PC + offset]]
    Ldi { dr: u8, offset: u16 },

    /// DR := mem[base + offset]
    Ldr { dr: u8, base: u8, offset: u16 },

    /// DR := PC + offset
    Lea { dr: u8, offset: u16 },

    /// mem[PC + offset] := SR
    St { sr: u8, offset: u16 },

    /// mem[mem[PC + offset]] := SR
    Sti { sr: u8, offset: u16 },

    /// mem[base + offset] := SR
    Str { sr: u8, base: u8, offset: u16 },

    // ==================== Control ====================

    /// if COND matches the n/z/p mask: PC := PC + offset
    Br { mask: u16, offset: u16 },

    /// PC := base (RET when base is R7)
    Jmp { base: u8 },

    /// R7 := PC, then jump
    Jsr { target: JsrTarget },

    /// R7 := PC, then run the service routine for `vector`
    Trap { vector: u8 },
}

/// Opcode values, bits [15:12].
struct Opcode;

impl Opcode {
    const BR: u16 = 0b0000;
    const ADD: u16 = 0b0001;
    const LD: u16 = 0b0010;
    const ST: u16 = 0b0011;
    const JSR: u16 = 0b0100;
    const AND: u16 = 0b0101;
    const LDR: u16 = 0b0110;
    const STR: u16 = 0b0111;
    const RTI: u16 = 0b1000;
    const NOT: u16 = 0b1001;
    const LDI: u16 = 0b1010;
    const STI: u16 = 0b1011;
    const JMP: u16 = 0b1100;
    const RES: u16 = 0b1101;
    const LEA: u16 = 0b1110;
    const TRAP: u16 = 0b1111;
}

#[inline]
fn bits(word: u16, hi: u32, lo: u32) -> u16 {
    (word >> lo) & ((1 << (hi - lo + 1)) - 1)
}

/// Register field at [hi:hi-2].
#[inline]
fn reg(word: u16, hi: u32) -> u8 {
    bits(word, hi, hi - 2) as u8
}

/// Decode one instruction word.
///
/// Field layout:
/// - [11:9] DR / SR / n-z-p mask
/// - [8:6] SR1 / base register
/// - [5] ADD/AND immediate flag, [4:0] imm5, [2:0] SR2
/// - [8:0] off9, [5:0] off6, [10:0] off11, [7:0] trap vector
pub fn decode(word: u16) -> Result<Instruction, DecodeError> {
    let opcode = word >> 12;
    let off9 = sign_extend(word, 9);
    let off6 = sign_extend(word, 6);

    let operand = || {
        if bits(word, 5, 5) == 1 {
            Operand::Imm(sign_extend(word, 5))
        } else {
            Operand::Reg(reg(word, 2))
        }
    };

    let instruction = match opcode {
        Opcode::BR => Instruction::Br { mask: bits(word, 11, 9), offset: off9 },
        Opcode::ADD => Instruction::Add { dr: reg(word, 11), sr1: reg(word, 8), operand: operand() },
        Opcode::AND => Instruction::And { dr: reg(word, 11), sr1: reg(word, 8), operand: operand() },
        Opcode::NOT => Instruction::Not { dr: reg(word, 11), sr: reg(word, 8) },
        Opcode::LD => Instruction::Ld { dr: reg(word, 11), offset: off9 },
        Opcode::LDI => Instruction::Ldi { dr: reg(word, 11), offset: off9 },
        Opcode::LDR => Instruction::Ldr { dr: reg(word, 11), base: reg(word, 8), offset: off6 },
        Opcode::LEA => Instruction::Lea { dr: reg(word, 11), offset: off9 },
        Opcode::ST => Instruction::St { sr: reg(word, 11), offset: off9 },
        Opcode::STI => Instruction::Sti { sr: reg(word, 11), offset: off9 },
        Opcode::STR => Instruction::Str { sr: reg(word, 11), base: reg(word, 8), offset: off6 },
        Opcode::JMP => Instruction::Jmp { base: reg(word, 8) },
        Opcode::JSR => {
            let target = if bits(word, 11, 11) == 1 {
                JsrTarget::Offset(sign_extend(word, 11))
            } else {
                JsrTarget::Base(reg(word, 8))
            };
            Instruction::Jsr { target }
        }
        Opcode::TRAP => Instruction::Trap { vector: bits(word, 7, 0) as u8 },
        Opcode::RTI | Opcode::RES => {
            return Err(DecodeError::IllegalOpcode { opcode: opcode as u8, word })
        }
        _ => unreachable!("opcode is four bits"),
    };

    Ok(instruction)
}

/// Encode an instruction back to its 16-bit word.
///
/// Offsets are truncated to their field width.
pub fn encode(instr: &Instruction) -> u16 {
    let r = |index: u8, shift: u32| (u16::from(index) & 0x7) << shift;
    let operand = |op: &Operand| match *op {
        Operand::Reg(sr2) => r(sr2, 0),
        Operand::Imm(imm) => (1 << 5) | (imm & 0x1F),
    };

    match instr {
        Instruction::Add { dr, sr1, operand: op } => (Opcode::ADD << 12) | r(*dr, 9) | r(*sr1, 6) | operand(op),
        Instruction::And { dr, sr1, operand: op } => (Opcode::AND << 12) | r(*dr, 9) | r(*sr1, 6) | operand(op),
        Instruction::Not { dr, sr } => (Opcode::NOT << 12) | r(*dr, 9) | r(*sr, 6) | 0x3F,
        Instruction::Ld { dr, offset } => (Opcode::LD << 12) | r(*dr, 9) | (offset & 0x1FF),
        Instruction::Ldi { dr, offset } => (Opcode::LDI << 12) | r(*dr, 9) | (offset & 0x1FF),
        Instruction::Ldr { dr, base, offset } => (Opcode::LDR << 12) | r(*dr, 9) | r(*base, 6) | (offset & 0x3F),
        Instruction::Lea { dr, offset } => (Opcode::LEA << 12) | r(*dr, 9) | (offset & 0x1FF),
        Instruction::St { sr, offset } => (Opcode::ST << 12) | r(*sr, 9) | (offset & 0x1FF),
        Instruction::Sti { sr, offset } => (Opcode::STI << 12) | r(*sr, 9) | (offset & 0x1FF),
        Instruction::Str { sr, base, offset } => (Opcode::STR << 12) | r(*sr, 9) | r(*base, 6) | (offset & 0x3F),
        Instruction::Br { mask, offset } => (Opcode::BR << 12) | ((mask & 0x7) << 9) | (offset & 0x1FF),
        Instruction::Jmp { base } => (Opcode::JMP << 12) | r(*base, 6),
        Instruction::Jsr { target: JsrTarget::Offset(offset) } => (Opcode::JSR << 12) | (1 << 11) | (offset & 0x7FF),
        Instruction::Jsr { target: JsrTarget::Base(base) } => (Opcode::JSR << 12) | r(*base, 6),
        Instruction::Trap { vector } => (Opcode::TRAP << 12) | u16::from(*vector),
    }
}

/// Errors that can occur during instruction decoding.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// RTI and the reserved opcode have no behavior on this machine.
    #[error("illegal opcode {opcode:#06b} in instruction {word:#06x}")]
    IllegalOpcode { opcode: u8, word: u16 },
}
