//! LC-3 memory bus.
//!
//! 65536 sixteen-bit cells, every address valid. One device is mapped in:
//! the keyboard, whose status register is polled whenever a program reads
//! it. Writes never have device semantics.

use crate::io::{Console, ConsoleError};
use log::warn;

/// The number of addressable words.
pub const MEMORY_SIZE: usize = 1 << 16;

/// Keyboard status register. Bit 15 set means a key is waiting in KBDR.
pub const KBSR: u16 = 0xFE00;

/// Keyboard data register.
pub const KBDR: u16 = 0xFE02;

/// KBSR value when a key is ready.
const KBSR_READY: u16 = 1 << 15;

/// Memory plus the console device mapped into it.
pub struct MemoryBus<C> {
    cells: Vec<u16>,
    console: C,
}

impl<C: Console> MemoryBus<C> {
    /// Create zeroed memory attached to `console`.
    pub fn new(console: C) -> Self {
        Self {
            cells: vec![0; MEMORY_SIZE],
            console,
        }
    }

    /// Read a word as the CPU sees it.
    ///
    /// Reading KBSR first polls the console without blocking: if a byte is
    /// pending, KBSR becomes `0x8000` and the byte lands in KBDR, otherwise
    /// KBSR becomes 0. Every other address is a plain load.
    pub fn read(&mut self, addr: u16) -> Result<u16, ConsoleError> {
        if addr == KBSR {
            match self.console.poll_byte()? {
                Some(byte) => {
                    self.cells[usize::from(KBSR)] = KBSR_READY;
                    self.cells[usize::from(KBDR)] = u16::from(byte);
                }
                None => self.cells[usize::from(KBSR)] = 0,
            }
        }
        Ok(self.cells[usize::from(addr)])
    }

    /// Store a word. No address is read-only.
    #[inline]
    pub fn write(&mut self, addr: u16, value: u16) {
        self.cells[usize::from(addr)] = value;
    }

    /// Read a cell's stored value without any device side effect.
    #[inline]
    pub fn peek(&self, addr: u16) -> u16 {
        self.cells[usize::from(addr)]
    }

    /// Copy `words` into memory starting at `origin`.
    ///
    /// Anything that would land past 0xFFFF is dropped. Returns the number
    /// of words actually stored.
    pub fn load(&mut self, origin: u16, words: &[u16]) -> usize {
        let start = usize::from(origin);
        let room = MEMORY_SIZE - start;
        if words.len() > room {
            warn!(
                "image at {:#06x} has {} words, truncating to {}",
                origin,
                words.len(),
                room
            );
        }
        let n = words.len().min(room);
        self.cells[start..start + n].copy_from_slice(&words[..n]);
        n
    }

    /// Zero every cell.
    pub fn clear(&mut self) {
        self.cells.fill(0);
    }

    pub fn console(&self) -> &C {
        &self.console
    }

    pub fn console_mut(&mut self) -> &mut C {
        &mut self.console
    }

    /// Stored contents of `len` cells from `start`, stopping at the top of
    /// memory.
    pub fn dump(&self, start: u16, len: usize) -> &[u16] {
        let start = usize::from(start);
        let end = (start + len).min(MEMORY_SIZE);
        &self.cells[start..end]
    }
}

impl<C> std::fmt::Debug for MemoryBus<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let non_zero = self.cells.iter().filter(|&&c| c != 0).count();

        f.debug_struct("MemoryBus")
            .field("non_zero_cells", &non_zero)
            .field("total_cells", &MEMORY_SIZE)
            .finish()
    }
}
