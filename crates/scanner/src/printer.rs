//! Process-wide line printer.
//!
//! Recognized codes may be reported from several threads at once. Every line
//! goes through one queue drained by a single thread, so output never
//! interleaves and callers never block on the terminal.

use std::{
    io::{self, Write},
    sync::atomic::{AtomicBool, Ordering},
    thread,
};

use crossbeam_channel::{Sender, unbounded};
use thiserror::Error;
use tracing::warn;

use crate::telemetry;

static CONSTRUCTED: AtomicBool = AtomicBool::new(false);

#[derive(Debug, Error)]
pub enum PrinterError {
    #[error("a parallel printer has already been installed in this process")]
    AlreadyConstructed,
    #[error("failed to spawn printer thread")]
    Spawn(#[source] io::Error),
}

/// Handle to the printer thread. Cheap to clone; the thread exits once every
/// handle is dropped and the queue is drained.
#[derive(Clone)]
pub struct ParallelPrinter {
    lines: Sender<String>,
}

impl ParallelPrinter {
    /// Install the printer writing to stdout.
    pub fn install() -> Result<(Self, thread::JoinHandle<()>), PrinterError> {
        Self::install_with(io::stdout())
    }

    /// Install the printer writing to `writer`. Only one printer may exist per process.
    pub fn install_with<W>(mut writer: W) -> Result<(Self, thread::JoinHandle<()>), PrinterError>
    where
        W: Write + Send + 'static,
    {
        if CONSTRUCTED.swap(true, Ordering::SeqCst) {
            return Err(PrinterError::AlreadyConstructed);
        }

        let (tx, rx) = unbounded::<String>();
        let handle = telemetry::spawn_thread("parallel-printer", move || {
            for line in rx {
                if let Err(err) = writeln!(writer, "{line}").and_then(|()| writer.flush()) {
                    warn!("printer failed to write line: {err}");
                }
            }
        })
        .map_err(|err| {
            CONSTRUCTED.store(false, Ordering::SeqCst);
            PrinterError::Spawn(err)
        })?;

        Ok((Self { lines: tx }, handle))
    }

    /// Queue a line for printing.
    pub fn print(&self, line: impl Into<String>) {
        if self.lines.send(line.into()).is_err() {
            warn!("printer thread is gone; dropping line");
        }
    }
}
