//! CPU execution engine for the LC-3.
//!
//! Implements the fetch-decode-execute cycle and all instruction behaviors.

use crate::cpu::decode::{self, DecodeError, Instruction, JsrTarget, Operand};
use crate::cpu::registers::PC_START;
use crate::cpu::{MemoryBus, Registers};
use crate::image::Image;
use crate::io::{Console, ConsoleError};
use log::{error, info};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Machine execution state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MachineState {
    /// Fetching and executing instructions.
    Running,
    /// HALT trap executed.
    Halted,
    /// A fatal error stopped the cycle.
    Faulted,
}

/// The LC-3 machine: registers, memory and the attached console.
pub struct Machine<C> {
    /// CPU registers.
    pub regs: Registers,
    /// Memory with the keyboard mapped in.
    pub bus: MemoryBus<C>,
    /// Current execution state.
    pub state: MachineState,
    /// Instructions completed so far.
    pub cycles: u64,
}

impl<C: Console> Machine<C> {
    /// Create a machine with zeroed memory and PC at 0x3000.
    pub fn new(console: C) -> Self {
        Self {
            regs: Registers::new(),
            bus: MemoryBus::new(console),
            state: MachineState::Running,
            cycles: 0,
        }
    }

    /// Copy an image into memory at its origin. Returns the number of
    /// words stored.
    pub fn load_image(&mut self, image: &Image) -> usize {
        self.bus.load(image.origin, &image.words)
    }

    /// Set the address of the next fetch.
    pub fn set_pc(&mut self, addr: u16) {
        self.regs.pc = addr;
    }

    /// Zero registers and memory and make the machine runnable again.
    pub fn reset(&mut self) {
        self.regs.reset(PC_START);
        self.bus.clear();
        self.state = MachineState::Running;
        self.cycles = 0;
    }

    /// Execute a single instruction.
    ///
    /// Returns the instruction that was executed. Any error leaves the
    /// machine [`Faulted`](MachineState::Faulted).
    pub fn step(&mut self) -> Result<Instruction, MachineError> {
        if self.state != MachineState::Running {
            return Err(MachineError::NotRunning(self.state));
        }

        let pc = self.regs.pc;
        match self.cycle() {
            Ok(instr) => {
                self.cycles += 1;
                Ok(instr)
            }
            Err(e) => {
                error!("fault at {:#06x}: {}", pc, e);
                self.state = MachineState::Faulted;
                Err(e)
            }
        }
    }

    /// Run until halt or error.
    ///
    /// Returns the number of instructions executed.
    pub fn run(&mut self) -> Result<u64, MachineError> {
        let start_cycles = self.cycles;

        while self.state == MachineState::Running {
            self.step()?;
        }

        info!("halted after {} instructions", self.cycles - start_cycles);
        Ok(self.cycles - start_cycles)
    }

    /// Run for at most `max_cycles` instructions.
    pub fn run_limited(&mut self, max_cycles: u64) -> Result<u64, MachineError> {
        let start_cycles = self.cycles;
        let limit = self.cycles + max_cycles;

        while self.state == MachineState::Running && self.cycles < limit {
            self.step()?;
        }

        Ok(self.cycles - start_cycles)
    }

    fn cycle(&mut self) -> Result<Instruction, MachineError> {
        if self.bus.console().interrupted() {
            return Err(ConsoleError::Interrupted.into());
        }

        // Fetch, then advance PC before the body runs: every PC-relative
        // offset below is relative to the incremented PC.
        let pc = self.regs.advance_pc();
        let raw = self.bus.read(pc)?;

        let instr = decode::decode(raw)?;
        self.execute(instr)?;

        Ok(instr)
    }

    /// Execute a decoded instruction.
    fn execute(&mut self, instr: Instruction) -> Result<(), MachineError> {
        match instr {
            // ==================== Operate ====================

            Instruction::Add { dr, sr1, operand } => {
                let result = self.regs.get(sr1).wrapping_add(self.operand(operand));
                self.regs.set_with_flags(dr, result);
            }

            Instruction::And { dr, sr1, operand } => {
                let result = self.regs.get(sr1) & self.operand(operand);
                self.regs.set_with_flags(dr, result);
            }

            Instruction::Not { dr, sr } => {
                let result = !self.regs.get(sr);
                self.regs.set_with_flags(dr, result);
            }

            // ==================== Data Movement ====================

            Instruction::Ld { dr, offset } => {
                let value = self.bus.read(self.regs.pc_relative(offset))?;
                self.regs.set_with_flags(dr, value);
            }

            Instruction::Ldi { dr, offset } => {
                let addr = self.bus.read(self.regs.pc_relative(offset))?;
                let value = self.bus.read(addr)?;
                self.regs.set_with_flags(dr, value);
            }

            Instruction::Ldr { dr, base, offset } => {
                let addr = self.regs.get(base).wrapping_add(offset);
                let value = self.bus.read(addr)?;
                self.regs.set_with_flags(dr, value);
            }

            Instruction::Lea { dr, offset } => {
                let addr = self.regs.pc_relative(offset);
                self.regs.set_with_flags(dr, addr);
            }

            Instruction::St { sr, offset } => {
                self.bus.write(self.regs.pc_relative(offset), self.regs.get(sr));
            }

            Instruction::Sti { sr, offset } => {
                let addr = self.bus.read(self.regs.pc_relative(offset))?;
                self.bus.write(addr, self.regs.get(sr));
            }

            Instruction::Str { sr, base, offset } => {
                let addr = self.regs.get(base).wrapping_add(offset);
                self.bus.write(addr, self.regs.get(sr));
            }

            // ==================== Control ====================

            Instruction::Br { mask, offset } => {
                if self.regs.cond.matches(mask) {
                    self.regs.pc = self.regs.pc_relative(offset);
                }
            }

            Instruction::Jmp { base } => {
                self.regs.pc = self.regs.get(base);
            }

            Instruction::Jsr { target } => {
                // Read the base before R7 is overwritten: JSRR R7 jumps to
                // the old R7.
                let return_addr = self.regs.pc;
                let dest = match target {
                    JsrTarget::Offset(offset) => self.regs.pc_relative(offset),
                    JsrTarget::Base(base) => self.regs.get(base),
                };
                self.regs.set(7, return_addr);
                self.regs.pc = dest;
            }

            Instruction::Trap { vector } => {
                self.trap(vector)?;
            }
        }

        Ok(())
    }

    #[inline]
    fn operand(&self, operand: Operand) -> u16 {
        match operand {
            Operand::Reg(sr2) => self.regs.get(sr2),
            Operand::Imm(imm) => imm,
        }
    }

    /// Check if the machine is halted.
    pub fn is_halted(&self) -> bool {
        self.state == MachineState::Halted
    }

    /// Check if the machine is running.
    pub fn is_running(&self) -> bool {
        self.state == MachineState::Running
    }

    /// Serializable view of the machine after (or during) a run.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            state: self.state,
            cycles: self.cycles,
            regs: self.regs.clone(),
        }
    }
}

impl<C> std::fmt::Debug for Machine<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Machine")
            .field("state", &self.state)
            .field("cycles", &self.cycles)
            .field("regs", &self.regs)
            .finish()
    }
}

/// Registers and run status, for dumping as JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub state: MachineState,
    pub cycles: u64,
    pub regs: Registers,
}

/// Errors that stop the machine.
#[derive(Debug, Error)]
pub enum MachineError {
    #[error("machine not running: {0:?}")]
    NotRunning(MachineState),

    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("unrecognized trap vector {0:#04x}")]
    UnrecognizedTrap(u8),

    /// GETC or IN found the input source exhausted.
    #[error("end of input during trap {0:#04x}")]
    EndOfInput(u8),

    #[error(transparent)]
    Console(#[from] ConsoleError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::decode::encode;
    use crate::io::{Interrupt, StreamConsole};
    use crate::word::Condition;
    use proptest::prelude::*;
    use std::io::empty;

    type TestMachine = Machine<StreamConsole<Vec<u8>>>;

    fn machine_with(instructions: &[Instruction]) -> TestMachine {
        let mut m = Machine::new(StreamConsole::new(empty(), Vec::new()));
        let words: Vec<u16> = instructions.iter().map(encode).collect();
        m.bus.load(PC_START, &words);
        m
    }

    const HALT: Instruction = Instruction::Trap { vector: 0x25 };

    #[test]
    fn test_halt() {
        let mut m = machine_with(&[HALT]);
        let executed = m.run().unwrap();

        assert_eq!(executed, 1);
        assert!(m.is_halted());
        assert_eq!(m.regs.r[7], 0x3001);
    }

    #[test]
    fn test_add_wraps_to_negative() {
        let mut m = machine_with(&[Instruction::Add { dr: 1, sr1: 0, operand: Operand::Imm(1) }]);
        m.regs.r[0] = 0x7FFF;
        m.step().unwrap();

        assert_eq!(m.regs.r[1], 0x8000);
        assert_eq!(m.regs.cond, Condition::Neg);
    }

    #[test]
    fn test_add_register_mode_to_zero() {
        let mut m = machine_with(&[Instruction::Add { dr: 2, sr1: 0, operand: Operand::Reg(1) }]);
        m.regs.r[0] = 0xFFFF;
        m.regs.r[1] = 1;
        m.step().unwrap();

        assert_eq!(m.regs.r[2], 0);
        assert_eq!(m.regs.cond, Condition::Zero);
    }

    #[test]
    fn test_and_and_not() {
        let mut m = machine_with(&[
            Instruction::And { dr: 2, sr1: 0, operand: Operand::Reg(1) },
            Instruction::Not { dr: 3, sr: 2 },
        ]);
        m.regs.r[0] = 0b1100;
        m.regs.r[1] = 0b1010;

        m.step().unwrap();
        assert_eq!(m.regs.r[2], 0b1000);
        assert_eq!(m.regs.cond, Condition::Pos);

        m.step().unwrap();
        assert_eq!(m.regs.r[3], 0xFFF7);
        assert_eq!(m.regs.cond, Condition::Neg);
    }

    #[test]
    fn test_ld_is_relative_to_incremented_pc() {
        let mut m = machine_with(&[Instruction::Ld { dr: 4, offset: 2 }]);
        m.bus.write(0x3003, 42);
        m.step().unwrap();

        assert_eq!(m.regs.r[4], 42);
        assert_eq!(m.regs.cond, Condition::Pos);
    }

    #[test]
    fn test_ldi_double_indirection() {
        let mut m = machine_with(&[Instruction::Ldi { dr: 0, offset: 1 }]);
        m.bus.write(0x3002, 0x4000);
        m.bus.write(0x4000, 0xABCD);
        m.step().unwrap();

        assert_eq!(m.regs.r[0], 0xABCD);
        assert_eq!(m.regs.cond, Condition::Neg);
    }

    #[test]
    fn test_ldr_and_str_negative_offset() {
        let mut m = machine_with(&[
            Instruction::Str { sr: 1, base: 6, offset: 0xFFFF },
            Instruction::Ldr { dr: 2, base: 6, offset: 0xFFFF },
        ]);
        m.regs.r[1] = 99;
        m.regs.r[6] = 0x5000;
        m.run_limited(2).unwrap();

        assert_eq!(m.bus.peek(0x4FFF), 99);
        assert_eq!(m.regs.r[2], 99);
    }

    #[test]
    fn test_lea_sets_flags_without_memory_access() {
        let mut m = machine_with(&[Instruction::Lea { dr: 0, offset: 0xFFFF }]);
        m.step().unwrap();

        assert_eq!(m.regs.r[0], 0x3000);
        assert_eq!(m.regs.cond, Condition::Pos);
    }

    #[test]
    fn test_stores_leave_flags_alone() {
        let mut m = machine_with(&[
            Instruction::St { sr: 0, offset: 5 },
            Instruction::Sti { sr: 0, offset: 5 },
        ]);
        m.regs.r[0] = 0x8000;
        m.bus.write(0x3007, 0x6000);
        m.run_limited(2).unwrap();

        assert_eq!(m.bus.peek(0x3006), 0x8000);
        assert_eq!(m.bus.peek(0x6000), 0x8000);
        assert_eq!(m.regs.cond, Condition::Zero);
    }

    #[test]
    fn test_branch_taken_and_not_taken() {
        let mut m = machine_with(&[
            Instruction::Br { mask: 0b001, offset: 10 },
            Instruction::Br { mask: 0b010, offset: 10 },
        ]);
        // COND starts at Z: first branch (p) falls through, second (z) is taken.
        m.step().unwrap();
        assert_eq!(m.regs.pc, 0x3001);
        m.step().unwrap();
        assert_eq!(m.regs.pc, 0x3002 + 10);
    }

    #[test]
    fn test_jmp_and_ret() {
        let mut m = machine_with(&[Instruction::Jmp { base: 7 }]);
        m.regs.r[7] = 0x1234;
        m.step().unwrap();
        assert_eq!(m.regs.pc, 0x1234);
    }

    #[test]
    fn test_jsr_saves_incremented_pc() {
        let mut m = machine_with(&[Instruction::Jsr { target: JsrTarget::Offset(5) }]);
        m.step().unwrap();

        assert_eq!(m.regs.r[7], 0x3001);
        assert_eq!(m.regs.pc, 0x3001 + 5);
        assert_eq!(m.regs.cond, Condition::Zero);
    }

    #[test]
    fn test_jsrr_through_r7_uses_old_value() {
        let mut m = machine_with(&[Instruction::Jsr { target: JsrTarget::Base(7) }]);
        m.regs.r[7] = 0x4000;
        m.step().unwrap();

        assert_eq!(m.regs.pc, 0x4000);
        assert_eq!(m.regs.r[7], 0x3001);
    }

    #[test]
    fn test_illegal_opcode_only_advances_pc() {
        for word in [0x8000u16, 0xD000] {
            let mut m = machine_with(&[]);
            m.bus.write(0x3000, word);
            m.regs.r = [1, 2, 3, 4, 5, 6, 7, 8];
            let before = m.regs.clone();

            let err = m.step().unwrap_err();
            assert!(matches!(err, MachineError::Decode(DecodeError::IllegalOpcode { .. })));
            assert_eq!(m.regs.r, before.r);
            assert_eq!(m.regs.cond, before.cond);
            assert_eq!(m.regs.pc, 0x3001);
            assert_eq!(m.bus.peek(0x3000), word);
            assert_eq!(m.state, MachineState::Faulted);
        }
    }

    #[test]
    fn test_step_after_halt_fails() {
        let mut m = machine_with(&[HALT]);
        m.run().unwrap();
        assert!(matches!(m.step(), Err(MachineError::NotRunning(MachineState::Halted))));
    }

    #[test]
    fn test_run_limited_stops_infinite_loop() {
        // BRnzp #-1
        let mut m = machine_with(&[Instruction::Br { mask: 0b111, offset: 0xFFFF }]);
        let executed = m.run_limited(100).unwrap();

        assert_eq!(executed, 100);
        assert!(m.is_running());
        assert_eq!(m.regs.pc, 0x3000);
    }

    #[test]
    fn test_raised_interrupt_stops_run() {
        let interrupt = Interrupt::new();
        let console = StreamConsole::new(empty(), Vec::new()).with_interrupt(interrupt.clone());
        let mut m = Machine::new(console);
        m.bus.load(PC_START, &[encode(&Instruction::Br { mask: 0b111, offset: 0xFFFF })]);

        let raiser = std::thread::spawn(move || {
            std::thread::sleep(std::time::Duration::from_millis(20));
            interrupt.raise();
        });
        let err = m.run().unwrap_err();
        raiser.join().unwrap();

        assert!(matches!(err, MachineError::Console(ConsoleError::Interrupted)));
        assert_eq!(m.state, MachineState::Faulted);
        assert_eq!(m.regs.pc, 0x3000);
    }

    #[test]
    fn test_pc_wraps_at_top_of_memory() {
        let mut m = machine_with(&[]);
        m.bus.write(0xFFFF, encode(&Instruction::Lea { dr: 0, offset: 0 }));
        m.set_pc(0xFFFF);
        m.step().unwrap();

        assert_eq!(m.regs.pc, 0);
        assert_eq!(m.regs.r[0], 0);
        assert_eq!(m.regs.cond, Condition::Zero);
    }

    #[test]
    fn test_reset() {
        let mut m = machine_with(&[HALT]);
        m.run().unwrap();
        m.reset();

        assert!(m.is_running());
        assert_eq!(m.cycles, 0);
        assert_eq!(m.regs.pc, PC_START);
        assert_eq!(m.bus.peek(PC_START), 0);
    }

    #[test]
    fn test_snapshot_serializes() {
        let mut m = machine_with(&[HALT]);
        m.run().unwrap();

        let json = serde_json::to_string(&m.snapshot()).unwrap();
        let back: Snapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(back.state, MachineState::Halted);
        assert_eq!(back.cycles, 1);
        assert_eq!(back.regs.pc, 0x3001);
    }

    proptest! {
        #[test]
        fn prop_add_and_modes_agree(a in any::<u16>(), imm in 0u16..32, use_and in any::<bool>()) {
            let imm = crate::word::sign_extend(imm, 5);
            let (imm_instr, reg_instr) = if use_and {
                (
                    Instruction::And { dr: 2, sr1: 0, operand: Operand::Imm(imm) },
                    Instruction::And { dr: 3, sr1: 0, operand: Operand::Reg(1) },
                )
            } else {
                (
                    Instruction::Add { dr: 2, sr1: 0, operand: Operand::Imm(imm) },
                    Instruction::Add { dr: 3, sr1: 0, operand: Operand::Reg(1) },
                )
            };

            let mut m = machine_with(&[imm_instr, reg_instr]);
            m.regs.r[0] = a;
            m.regs.r[1] = imm;

            m.step().unwrap();
            let imm_flags = m.regs.cond;
            m.step().unwrap();

            prop_assert_eq!(m.regs.r[2], m.regs.r[3]);
            prop_assert_eq!(imm_flags, m.regs.cond);
        }
    }
}
