//! Consumer loop tying the worker, debouncer and inactivity timeout together.

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread,
};

use barcode_core::SymbolDecoder;
use tracing::{debug, info, info_span, warn};
use video_ingest::{Camera, CaptureDevice, CaptureError};

use crate::{
    config::ScanConfig,
    debounce::Debouncer,
    error::ScanError,
    settings::LiveSettings,
    timeout::InactivityTimeout,
    worker::{FrameResponse, VideoWorker},
};

type RecognizedCallback = Box<dyn Fn(String) + Send + Sync>;
type FrameCallback = Box<dyn FnMut(&FrameResponse) + Send>;

/// Why a session ended without an error.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionOutcome {
    /// The shutdown flag was raised.
    Shutdown,
    /// Nothing was recognized for the whole inactivity window.
    LoggedOut,
}

pub struct ScanSession {
    config: ScanConfig,
    settings: LiveSettings,
    shutdown: Arc<AtomicBool>,
    on_recognized: Option<RecognizedCallback>,
    on_frame: Option<FrameCallback>,
}

impl ScanSession {
    pub fn new(config: ScanConfig) -> Self {
        let settings = LiveSettings::new(config.display);
        Self {
            config,
            settings,
            shutdown: Arc::new(AtomicBool::new(false)),
            on_recognized: None,
            on_frame: None,
        }
    }

    /// Share an externally owned shutdown flag, e.g. one set from a signal handler.
    pub fn with_shutdown(mut self, shutdown: Arc<AtomicBool>) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// Called with every recognized payload, on the session thread.
    pub fn on_recognized<F>(mut self, callback: F) -> Self
    where
        F: Fn(String) + Send + Sync + 'static,
    {
        self.on_recognized = Some(Box::new(callback));
        self
    }

    /// Called with every frame the worker publishes.
    pub fn on_frame<F>(mut self, callback: F) -> Self
    where
        F: FnMut(&FrameResponse) + Send + 'static,
    {
        self.on_frame = Some(Box::new(callback));
        self
    }

    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        self.shutdown.clone()
    }

    /// Display settings the worker reads; changes apply from the next frame.
    pub fn settings(&self) -> LiveSettings {
        self.settings.clone()
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// Run until shutdown, logout or a worker failure.
    ///
    /// Every recognized code counts as activity and resets the inactivity
    /// timeout. The worker and the timeout are torn down before returning.
    pub fn run<D, O, S>(self, open_camera: O, decoder: S) -> Result<SessionOutcome, ScanError>
    where
        D: CaptureDevice + 'static,
        O: FnOnce() -> Result<Camera<D>, CaptureError> + Send + 'static,
        S: SymbolDecoder + 'static,
    {
        let Self {
            config,
            settings,
            shutdown,
            on_recognized,
            mut on_frame,
        } = self;

        let span = info_span!("scanner.session");
        let _entered = span.enter();

        let mut worker = VideoWorker::spawn(open_camera, decoder, settings, config.worker.clone())?;

        let logged_out = Arc::new(AtomicBool::new(false));
        let timeout = {
            let logged_out = logged_out.clone();
            InactivityTimeout::start(config.inactivity_timeout, move || {
                logged_out.store(true, Ordering::SeqCst);
            })?
        };

        let debouncer = {
            let timeout = timeout.clone();
            Debouncer::new(config.debounce).with_sink(move |payload| {
                timeout.reset();
                if let Some(callback) = on_recognized.as_ref() {
                    callback(payload);
                }
            })
        };

        info!(
            device_id = worker.device_id(),
            timeout = ?config.inactivity_timeout,
            "scan session started"
        );

        let result = loop {
            if shutdown.load(Ordering::SeqCst) {
                break Ok(SessionOutcome::Shutdown);
            }
            if logged_out.load(Ordering::SeqCst) {
                break Ok(SessionOutcome::LoggedOut);
            }

            let response = match worker.request_frame() {
                Ok(response) => response,
                Err(err) => break Err(err),
            };
            if response.stale {
                debug!(sequence = response.sequence, "stale frame");
            }
            if let Some(callback) = on_frame.as_mut() {
                callback(&response);
            }
            debouncer.observe(&response.detections);

            if !config.poll_interval.is_zero() {
                thread::sleep(config.poll_interval);
            }
        };

        timeout.cancel();
        if let Err(err) = worker.stop() {
            warn!("video worker did not stop cleanly: {err}");
        }
        match &result {
            Ok(outcome) => info!(?outcome, "scan session finished"),
            Err(err) => warn!("scan session failed: {err}"),
        }
        result
    }
}
