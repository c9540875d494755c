//! # LC-3 Virtual Machine
//!
//! An emulator of the LC-3, the 16-bit computer used to teach assembly
//! programming: 65536 words of memory, eight registers, a condition flag,
//! a memory-mapped keyboard and six trap routines for console I/O.

pub mod word;
pub mod cpu;
pub mod image;
pub mod io;

// Re-export commonly used types
pub use word::{sign_extend, Condition};
pub use cpu::{Machine, MachineError, MachineState, MemoryBus, Registers, Instruction};
pub use image::{Image, ImageError};
pub use io::{Console, ConsoleError, Interrupt, StreamConsole, TerminalConsole};
