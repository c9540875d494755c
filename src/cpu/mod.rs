//! CPU emulation for the LC-3.
//!
//! This module implements the complete LC-3 architecture:
//! - 65536 sixteen-bit memory cells with a memory-mapped keyboard
//! - 8 general-purpose registers, PC and the N/Z/P condition flag
//! - 16-opcode instruction set (14 implemented, RTI and RES are illegal)
//! - native trap routines for character I/O and HALT

pub mod memory;
pub mod registers;
pub mod decode;
pub mod execute;
pub mod trap;

pub use memory::MemoryBus;
pub use registers::Registers;
pub use decode::{Instruction, Operand, JsrTarget, DecodeError};
pub use execute::{Machine, MachineError, MachineState, Snapshot};
pub use trap::TrapVector;
