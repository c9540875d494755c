//! Console over plain byte streams.

use std::collections::VecDeque;
use std::io::{ErrorKind, Read, Write};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread;

use log::debug;

use super::{Console, ConsoleError, Interrupt, WAIT_SLICE};

/// Bytes delivered by the reader thread and not yet taken by the machine.
#[derive(Default)]
struct Feed {
    queue: VecDeque<u8>,
    eof: bool,
    error: Option<std::io::Error>,
}

#[derive(Default)]
struct Shared {
    feed: Mutex<Feed>,
    arrived: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Feed> {
        self.feed.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A [`Console`] reading from any byte source and writing to `W`.
///
/// The source is drained by a background thread into a queue, so
/// [`poll_byte`](Console::poll_byte) only looks at what has already
/// arrived and never waits on a slow pipe.
pub struct StreamConsole<W> {
    shared: Arc<Shared>,
    output: W,
    interrupt: Interrupt,
}

impl<W: Write> StreamConsole<W> {
    pub fn new<R>(input: R, output: W) -> Self
    where
        R: Read + Send + 'static,
    {
        let shared = Arc::new(Shared::default());
        let feed = Arc::clone(&shared);
        // Detached: a reader blocked on stdin cannot be woken, and it holds
        // nothing but its own end of the queue.
        thread::spawn(move || pump(input, &feed));

        Self {
            shared,
            output,
            interrupt: Interrupt::new(),
        }
    }

    /// Give up blocking reads once `interrupt` is raised.
    pub fn with_interrupt(mut self, interrupt: Interrupt) -> Self {
        self.interrupt = interrupt;
        self
    }

    /// Everything written to the sink so far.
    pub fn output(&self) -> &W {
        &self.output
    }

    /// Take the sink back, dropping the input side.
    pub fn into_output(self) -> W {
        self.output
    }

    /// Block until a byte is queued or the source has ended.
    pub fn wait_readable(&self) {
        let mut feed = self.shared.lock();
        while feed.queue.is_empty() && !feed.eof {
            feed = self
                .shared
                .arrived
                .wait(feed)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    fn take(feed: &mut Feed) -> Result<Option<u8>, ConsoleError> {
        match feed.queue.pop_front() {
            Some(b) => Ok(Some(b)),
            None => match feed.error.take() {
                Some(e) => Err(e.into()),
                None => Ok(None),
            },
        }
    }
}

fn pump<R: Read>(mut input: R, shared: &Shared) {
    let mut buf = [0u8; 256];
    loop {
        let result = input.read(&mut buf);
        let mut feed = shared.lock();
        match result {
            Ok(0) => {
                debug!("input stream ended");
                feed.eof = true;
            }
            Ok(n) => feed.queue.extend(&buf[..n]),
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => {
                debug!("input stream failed: {}", e);
                feed.error = Some(e);
                feed.eof = true;
            }
        }
        let done = feed.eof;
        drop(feed);
        shared.arrived.notify_all();
        if done {
            return;
        }
    }
}

impl<W: Write> Console for StreamConsole<W> {
    fn poll_byte(&mut self) -> Result<Option<u8>, ConsoleError> {
        Self::take(&mut self.shared.lock())
    }

    fn read_byte(&mut self) -> Result<Option<u8>, ConsoleError> {
        let mut feed = self.shared.lock();
        while feed.queue.is_empty() && !feed.eof {
            if self.interrupt.is_raised() {
                return Err(ConsoleError::Interrupted);
            }
            feed = self
                .shared
                .arrived
                .wait_timeout(feed, WAIT_SLICE)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        Self::take(&mut feed)
    }

    fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), ConsoleError> {
        self.output.write_all(bytes)?;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), ConsoleError> {
        self.output.flush()?;
        Ok(())
    }

    fn interrupted(&self) -> bool {
        self.interrupt.is_raised()
    }
}
