//! Console collaborators.
//!
//! The machine talks to the outside world through a [`Console`]: one input
//! source (keyboard) and one output sink (teletype). Two implementations
//! are provided:
//! - [`TerminalConsole`] drives an interactive terminal in raw mode
//! - [`StreamConsole`] wraps any reader/writer pair (pipes, files, tests)

mod stream;
mod terminal;

pub use stream::StreamConsole;
pub use terminal::{RawMode, TerminalConsole};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

/// How long a blocking read waits before rechecking for an interrupt.
const WAIT_SLICE: Duration = Duration::from_millis(50);

/// A stop request raised from outside the machine, typically by a signal
/// handler. Clones share the same flag.
#[derive(Debug, Clone, Default)]
pub struct Interrupt(Arc<AtomicBool>);

impl Interrupt {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// A character device pair the machine reads keys from and prints to.
pub trait Console {
    /// Return the next input byte if one is already pending.
    ///
    /// Must never block.
    fn poll_byte(&mut self) -> Result<Option<u8>, ConsoleError>;

    /// Block until an input byte is available.
    ///
    /// Returns `Ok(None)` once the input source is exhausted.
    fn read_byte(&mut self) -> Result<Option<u8>, ConsoleError>;

    /// Write raw bytes to the output sink.
    fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), ConsoleError>;

    /// Make everything written so far visible.
    fn flush(&mut self) -> Result<(), ConsoleError>;

    /// Whether the user has asked the run to stop.
    fn interrupted(&self) -> bool {
        false
    }
}

impl<C: Console + ?Sized> Console for Box<C> {
    fn poll_byte(&mut self) -> Result<Option<u8>, ConsoleError> {
        (**self).poll_byte()
    }

    fn read_byte(&mut self) -> Result<Option<u8>, ConsoleError> {
        (**self).read_byte()
    }

    fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), ConsoleError> {
        (**self).write_bytes(bytes)
    }

    fn flush(&mut self) -> Result<(), ConsoleError> {
        (**self).flush()
    }

    fn interrupted(&self) -> bool {
        (**self).interrupted()
    }
}

/// Errors raised by a console.
#[derive(Debug, Error)]
pub enum ConsoleError {
    #[error("console I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The user asked to stop: Ctrl-C on an interactive terminal, or an
    /// [`Interrupt`] raised by a signal.
    #[error("interrupted")]
    Interrupted,
}
