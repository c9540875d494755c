//! Interactive terminal console.
//!
//! The terminal is switched to raw mode (no line buffering, no echo) for as
//! long as a [`RawMode`] guard lives. Dropping the guard restores the prior
//! mode, so normal halt, fatal errors, Ctrl-C, termination signals and
//! panics all leave the user's shell usable.

use std::io::{stdout, IsTerminal, Stdout, Write};
use std::time::Duration;

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use log::{debug, warn};

use super::{Console, ConsoleError, Interrupt, WAIT_SLICE};

/// Scoped raw mode on the controlling terminal.
#[derive(Debug)]
pub struct RawMode {
    _private: (),
}

impl RawMode {
    /// Disable line buffering and echo until the guard is dropped.
    pub fn enable() -> std::io::Result<Self> {
        enable_raw_mode()?;
        debug!("terminal raw mode enabled");
        Ok(Self { _private: () })
    }
}

impl Drop for RawMode {
    fn drop(&mut self) {
        match disable_raw_mode() {
            Ok(()) => debug!("terminal mode restored"),
            Err(e) => warn!("failed to restore terminal mode: {}", e),
        }
    }
}

/// What a key press means to the machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Key {
    Byte(u8),
    EndOfInput,
    Interrupt,
    Ignored,
}

fn translate(key: KeyEvent) -> Key {
    if key.kind == KeyEventKind::Release {
        return Key::Ignored;
    }
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
    match key.code {
        KeyCode::Char('c') if ctrl => Key::Interrupt,
        KeyCode::Char('d') if ctrl => Key::EndOfInput,
        KeyCode::Char(c) if ctrl && c.is_ascii_alphabetic() => {
            Key::Byte(c.to_ascii_lowercase() as u8 & 0x1F)
        }
        KeyCode::Char(c) if c.is_ascii() => Key::Byte(c as u8),
        KeyCode::Enter => Key::Byte(b'\n'),
        KeyCode::Tab => Key::Byte(b'\t'),
        KeyCode::Backspace => Key::Byte(0x08),
        KeyCode::Esc => Key::Byte(0x1B),
        _ => Key::Ignored,
    }
}

/// A [`Console`] on the process's own terminal.
///
/// Holds raw mode for its whole lifetime. Ctrl-C is reported as
/// [`ConsoleError::Interrupted`] and Ctrl-D as end of input.
pub struct TerminalConsole {
    out: Stdout,
    /// Raw mode drops the tty's own LF to CRLF mapping; redo it, but only
    /// when the output really is that tty.
    crlf: bool,
    eof: bool,
    interrupt: Interrupt,
    _raw: RawMode,
}

impl TerminalConsole {
    pub fn new() -> std::io::Result<Self> {
        let raw = RawMode::enable()?;
        let out = stdout();
        Ok(Self {
            crlf: out.is_terminal(),
            out,
            eof: false,
            interrupt: Interrupt::new(),
            _raw: raw,
        })
    }

    /// Give up blocking reads once `interrupt` is raised.
    pub fn with_interrupt(mut self, interrupt: Interrupt) -> Self {
        self.interrupt = interrupt;
        self
    }

    fn next_key(&mut self, block: bool) -> Result<Option<u8>, ConsoleError> {
        loop {
            if self.eof {
                return Ok(None);
            }
            if self.interrupt.is_raised() {
                return Err(ConsoleError::Interrupted);
            }
            let wait = if block { WAIT_SLICE } else { Duration::ZERO };
            if !event::poll(wait)? {
                if block {
                    continue;
                }
                return Ok(None);
            }
            let key = match event::read()? {
                Event::Key(k) => translate(k),
                _ => Key::Ignored,
            };
            match key {
                Key::Byte(b) => return Ok(Some(b)),
                Key::EndOfInput => self.eof = true,
                Key::Interrupt => return Err(ConsoleError::Interrupted),
                Key::Ignored => {}
            }
        }
    }
}

/// Write `bytes`, turning each `\n` into `\r\n` when `crlf` is set.
fn write_text<W: Write>(out: &mut W, bytes: &[u8], crlf: bool) -> std::io::Result<()> {
    if !crlf {
        return out.write_all(bytes);
    }
    for chunk in bytes.split_inclusive(|&b| b == b'\n') {
        match chunk.split_last() {
            Some((b'\n', body)) => {
                out.write_all(body)?;
                out.write_all(b"\r\n")?;
            }
            _ => out.write_all(chunk)?,
        }
    }
    Ok(())
}

impl Console for TerminalConsole {
    fn poll_byte(&mut self) -> Result<Option<u8>, ConsoleError> {
        self.next_key(false)
    }

    fn read_byte(&mut self) -> Result<Option<u8>, ConsoleError> {
        self.next_key(true)
    }

    fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), ConsoleError> {
        write_text(&mut self.out.lock(), bytes, self.crlf)?;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), ConsoleError> {
        self.out.flush()?;
        Ok(())
    }

    fn interrupted(&self) -> bool {
        self.interrupt.is_raised()
    }
}
