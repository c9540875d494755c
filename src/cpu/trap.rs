//! Trap service routines.
//!
//! TRAP x20-x25 are handled natively instead of by OS code in memory. The
//! routines move characters between R0 / memory and the console.

use crate::cpu::execute::{Machine, MachineError, MachineState};
use crate::io::Console;
use log::{debug, info};

/// Prompt printed by the IN routine.
pub const IN_PROMPT: &[u8] = b"Enter a character: ";

/// Notice printed by the HALT routine.
pub const HALT_NOTICE: &[u8] = b"HALT\n";

/// The built-in trap vectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TrapVector {
    /// Read one key into R0, no echo.
    Getc = 0x20,
    /// Print the character in R0.
    Out = 0x21,
    /// Print the one-char-per-word string at R0.
    Puts = 0x22,
    /// Prompt, read one key into R0, echo it.
    In = 0x23,
    /// Print the two-chars-per-word string at R0.
    Putsp = 0x24,
    /// Stop the machine.
    Halt = 0x25,
}

impl TryFrom<u8> for TrapVector {
    type Error = MachineError;

    fn try_from(vector: u8) -> Result<Self, Self::Error> {
        Ok(match vector {
            0x20 => TrapVector::Getc,
            0x21 => TrapVector::Out,
            0x22 => TrapVector::Puts,
            0x23 => TrapVector::In,
            0x24 => TrapVector::Putsp,
            0x25 => TrapVector::Halt,
            other => return Err(MachineError::UnrecognizedTrap(other)),
        })
    }
}

impl<C: Console> Machine<C> {
    /// Run the service routine for `vector`.
    ///
    /// An unknown vector is rejected before R7 is written.
    pub(crate) fn trap(&mut self, vector: u8) -> Result<(), MachineError> {
        let routine = TrapVector::try_from(vector)?;
        self.regs.set(7, self.regs.pc);

        match routine {
            TrapVector::Getc => {
                let byte = self.read_key(routine)?;
                self.regs.set(0, u16::from(byte));
            }

            TrapVector::Out => {
                let console = self.bus.console_mut();
                console.write_bytes(&[self.regs.get(0) as u8])?;
                console.flush()?;
            }

            TrapVector::Puts => {
                let text = self.collect_string(self.regs.get(0), |word, out| {
                    out.push(word as u8);
                });
                let console = self.bus.console_mut();
                console.write_bytes(&text)?;
                console.flush()?;
            }

            TrapVector::In => {
                {
                    let console = self.bus.console_mut();
                    console.write_bytes(IN_PROMPT)?;
                    console.flush()?;
                }
                let byte = self.read_key(routine)?;
                let console = self.bus.console_mut();
                console.write_bytes(&[byte])?;
                console.flush()?;
                self.regs.set(0, u16::from(byte));
            }

            TrapVector::Putsp => {
                let text = self.collect_string(self.regs.get(0), |word, out| {
                    out.push(word as u8);
                    let high = (word >> 8) as u8;
                    if high != 0 {
                        out.push(high);
                    }
                });
                let console = self.bus.console_mut();
                console.write_bytes(&text)?;
                console.flush()?;
            }

            TrapVector::Halt => {
                let console = self.bus.console_mut();
                console.write_bytes(HALT_NOTICE)?;
                console.flush()?;
                info!("HALT at {:#06x}", self.regs.pc.wrapping_sub(1));
                self.state = MachineState::Halted;
            }
        }

        Ok(())
    }

    fn read_key(&mut self, routine: TrapVector) -> Result<u8, MachineError> {
        match self.bus.console_mut().read_byte()? {
            Some(byte) => Ok(byte),
            None => {
                debug!("{:?}: input exhausted", routine);
                Err(MachineError::EndOfInput(routine as u8))
            }
        }
    }

    /// Walk the zero-terminated word string at `addr`, expanding each word
    /// with `emit`. Addresses wrap at the top of memory; a string with no
    /// terminator stops after one full lap.
    fn collect_string<F>(&self, addr: u16, mut emit: F) -> Vec<u8>
    where
        F: FnMut(u16, &mut Vec<u8>),
    {
        let mut out = Vec::new();
        let mut addr = addr;
        for _ in 0..crate::cpu::memory::MEMORY_SIZE {
            let word = self.bus.peek(addr);
            if word == 0 {
                break;
            }
            emit(word, &mut out);
            addr = addr.wrapping_add(1);
        }
        out
    }
}
