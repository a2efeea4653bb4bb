//! Display settings shared between the UI side and the video worker.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};

/// Presentation applied to annotated frames before they are published.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplaySettings {
    pub mirror: bool,
    /// Final `(width, height)` of published frames; `None` keeps the camera size.
    pub target_resolution: Option<(u32, u32)>,
}

/// Live-updatable [`DisplaySettings`] behind a single mutex.
///
/// Writers never wait on the worker's queues; the worker snapshots the
/// settings once per request, so changes apply from the next request on.
#[derive(Clone, Debug, Default)]
pub struct LiveSettings {
    inner: Arc<Mutex<DisplaySettings>>,
}

impl LiveSettings {
    pub fn new(initial: DisplaySettings) -> Self {
        Self {
            inner: Arc::new(Mutex::new(initial)),
        }
    }

    pub fn snapshot(&self) -> DisplaySettings {
        *self.lock()
    }

    pub fn mirror(&self) -> bool {
        self.lock().mirror
    }

    pub fn set_mirror(&self, mirror: bool) {
        self.lock().mirror = mirror;
    }

    pub fn target_resolution(&self) -> Option<(u32, u32)> {
        self.lock().target_resolution
    }

    pub fn set_target_resolution(&self, resolution: Option<(u32, u32)>) {
        self.lock().target_resolution = resolution;
    }

    /// Replace both fields atomically.
    pub fn replace(&self, settings: DisplaySettings) {
        *self.lock() = settings;
    }

    // The guarded value is plain data, a panicked writer cannot leave it torn.
    fn lock(&self) -> MutexGuard<'_, DisplaySettings> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
