use std::io;

use thiserror::Error;
use video_ingest::CaptureError;

use crate::debounce::DebounceError;

#[derive(Debug, Error)]
pub enum ScanError {
    #[error(transparent)]
    Capture(#[from] CaptureError),
    #[error(transparent)]
    Debounce(#[from] DebounceError),
    #[error("video worker is not running")]
    WorkerStopped,
    #[error("video worker thread panicked")]
    WorkerPanicked,
    #[error("failed to spawn {name} thread")]
    Spawn {
        name: String,
        #[source]
        source: io::Error,
    },
}
