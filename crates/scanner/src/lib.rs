//! Scanner runtime: on-demand video worker, recognition debouncer, inactivity
//! timeout and the session loop that drives them.

pub mod annotation;
pub mod config;
pub mod debounce;
mod error;
pub mod printer;
pub mod session;
pub mod settings;
pub mod telemetry;
pub mod timeout;
pub mod worker;

pub use config::{ScanCliArgs, ScanConfig, StoredSettings};
pub use debounce::{DebounceConfig, DebounceError, Debouncer};
pub use error::ScanError;
pub use printer::{ParallelPrinter, PrinterError};
pub use session::{ScanSession, SessionOutcome};
pub use settings::{DisplaySettings, LiveSettings};
pub use telemetry::{TelemetryGuard, TelemetryOptions};
pub use timeout::{InactivityTimeout, TimeoutPhase};
pub use worker::{FrameResponse, VideoWorker, WorkerOptions, WorkerPhase};
