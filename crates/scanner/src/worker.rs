//! On-demand video worker.
//!
//! One background thread owns the camera for the worker's whole life. It sits
//! idle on a request queue; every request captures one frame, decodes it,
//! annotates a copy and publishes `(frame, detections)` on the response
//! queue. Requests are serviced strictly in submission order.

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU8, AtomicU64, Ordering},
    },
    thread,
    time::{Duration, Instant},
};

use anyhow::anyhow;
use barcode_core::{Detection, SymbolDecoder, decode};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, bounded, unbounded};
use tracing::{debug, debug_span, error, info, warn};
use video_ingest::{Camera, CaptureDevice, CaptureError, Frame};

use crate::{
    annotation::{annotate, present},
    error::ScanError,
    settings::LiveSettings,
    telemetry,
};

/// Consecutive failed reads tolerated before the worker gives up on the camera.
pub const DEFAULT_FAILURE_BUDGET: u32 = 30;

/// Fallback frame size when the camera never reported a resolution.
const BLANK_FRAME_SIZE: (u32, u32) = (640, 480);

#[derive(Clone, Debug)]
pub struct WorkerOptions {
    /// Give up after this many consecutive failed reads; `None` skips forever.
    pub max_consecutive_failures: Option<u32>,
    /// Draw outlines and labels onto published frames.
    pub annotate: bool,
}

impl Default for WorkerOptions {
    fn default() -> Self {
        Self {
            max_consecutive_failures: Some(DEFAULT_FAILURE_BUDGET),
            annotate: true,
        }
    }
}

/// What the worker publishes for each request.
#[derive(Clone, Debug)]
pub struct FrameResponse {
    /// Sequence number handed out by [`VideoWorker::request`].
    pub sequence: u64,
    pub frame: Frame,
    pub detections: Vec<Detection>,
    /// The read failed and `frame` repeats the previous good frame (or is blank).
    pub stale: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum WorkerPhase {
    Idle = 0,
    Capturing = 1,
    Decoding = 2,
    Publishing = 3,
    Stopped = 4,
}

impl WorkerPhase {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => WorkerPhase::Idle,
            1 => WorkerPhase::Capturing,
            2 => WorkerPhase::Decoding,
            3 => WorkerPhase::Publishing,
            _ => WorkerPhase::Stopped,
        }
    }
}

enum WorkerCommand {
    Capture { sequence: u64 },
    Stop,
}

type Response = Result<FrameResponse, CaptureError>;

/// Handle to the background capture thread.
pub struct VideoWorker {
    device_id: i32,
    commands: Sender<WorkerCommand>,
    responses: Receiver<Response>,
    settings: LiveSettings,
    stop_requested: Arc<AtomicBool>,
    phase: Arc<AtomicU8>,
    next_sequence: AtomicU64,
    handle: Option<thread::JoinHandle<()>>,
}

impl VideoWorker {
    /// Start the worker thread and wait until it owns a working camera.
    ///
    /// `open_camera` runs on the worker thread. If it fails the loop never
    /// starts and its error is returned here.
    pub fn spawn<D, O, S>(
        open_camera: O,
        decoder: S,
        settings: LiveSettings,
        options: WorkerOptions,
    ) -> Result<Self, ScanError>
    where
        D: CaptureDevice + 'static,
        O: FnOnce() -> Result<Camera<D>, CaptureError> + Send + 'static,
        S: SymbolDecoder + 'static,
    {
        let (command_tx, command_rx) = unbounded();
        let (response_tx, response_rx) = unbounded();
        let (init_tx, init_rx) = bounded::<Result<i32, CaptureError>>(1);
        let stop_requested = Arc::new(AtomicBool::new(false));
        let phase = Arc::new(AtomicU8::new(WorkerPhase::Idle as u8));

        let ctx = LoopContext {
            commands: command_rx,
            responses: response_tx,
            settings: settings.clone(),
            stop_requested: stop_requested.clone(),
            phase: phase.clone(),
            options,
        };

        let handle = telemetry::spawn_thread("video-worker", move || {
            let camera = match open_camera() {
                Ok(camera) => camera,
                Err(err) => {
                    ctx.set_phase(WorkerPhase::Stopped);
                    let _ = init_tx.send(Err(err));
                    return;
                }
            };
            if init_tx.send(Ok(camera.device_id())).is_err() {
                return;
            }
            drop(init_tx);
            run_loop(camera, decoder, ctx);
        })
        .map_err(|source| ScanError::Spawn {
            name: "video-worker".to_string(),
            source,
        })?;

        let started = match init_rx.recv() {
            Ok(started) => started,
            Err(_) => Err(CaptureError::Other(anyhow!(
                "video worker exited before opening the camera"
            ))),
        };

        match started {
            Ok(device_id) => {
                info!(device_id, "video worker started");
                Ok(Self {
                    device_id,
                    commands: command_tx,
                    responses: response_rx,
                    settings,
                    stop_requested,
                    phase,
                    next_sequence: AtomicU64::new(0),
                    handle: Some(handle),
                })
            }
            Err(err) => {
                let _ = handle.join();
                Err(err.into())
            }
        }
    }

    pub fn device_id(&self) -> i32 {
        self.device_id
    }

    /// Display settings read by the worker at the start of every request.
    pub fn settings(&self) -> &LiveSettings {
        &self.settings
    }

    pub fn phase(&self) -> WorkerPhase {
        WorkerPhase::from_u8(self.phase.load(Ordering::Acquire))
    }

    /// Queue a frame request. Returns the sequence number the response will carry.
    pub fn request(&self) -> Result<u64, ScanError> {
        if self.stop_requested.load(Ordering::SeqCst) {
            return Err(ScanError::WorkerStopped);
        }
        let sequence = self.next_sequence.fetch_add(1, Ordering::SeqCst);
        self.commands
            .send(WorkerCommand::Capture { sequence })
            .map_err(|_| ScanError::WorkerStopped)?;
        Ok(sequence)
    }

    /// Block until the oldest outstanding request has been answered.
    pub fn recv(&self) -> Result<FrameResponse, ScanError> {
        match self.responses.recv() {
            Ok(response) => response.map_err(ScanError::from),
            Err(_) => Err(ScanError::WorkerStopped),
        }
    }

    /// Like [`recv`](Self::recv) with an upper bound; `Ok(None)` on timeout.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<Option<FrameResponse>, ScanError> {
        match self.responses.recv_timeout(timeout) {
            Ok(response) => response.map(Some).map_err(ScanError::from),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(ScanError::WorkerStopped),
        }
    }

    /// One request/response round trip.
    pub fn request_frame(&self) -> Result<FrameResponse, ScanError> {
        self.request()?;
        self.recv()
    }

    /// Finish the in-flight request, drop queued ones, release the camera and
    /// join the thread. Calling it again is a no-op.
    pub fn stop(&mut self) -> Result<(), ScanError> {
        let Some(handle) = self.handle.take() else {
            return Ok(());
        };
        self.stop_requested.store(true, Ordering::SeqCst);
        let _ = self.commands.send(WorkerCommand::Stop);
        handle.join().map_err(|_| ScanError::WorkerPanicked)?;
        info!(device_id = self.device_id, "video worker stopped");
        Ok(())
    }
}

impl Drop for VideoWorker {
    fn drop(&mut self) {
        if let Err(err) = self.stop() {
            error!("failed to stop video worker: {err}");
        }
    }
}

struct LoopContext {
    commands: Receiver<WorkerCommand>,
    responses: Sender<Response>,
    settings: LiveSettings,
    stop_requested: Arc<AtomicBool>,
    phase: Arc<AtomicU8>,
    options: WorkerOptions,
}

impl LoopContext {
    fn set_phase(&self, phase: WorkerPhase) {
        self.phase.store(phase as u8, Ordering::Release);
    }

    fn stopping(&self) -> bool {
        self.stop_requested.load(Ordering::SeqCst)
    }
}

/// Consecutive read failures against an optional limit.
#[derive(Debug)]
struct FailureBudget {
    limit: Option<u32>,
    consecutive: u32,
}

impl FailureBudget {
    fn new(limit: Option<u32>) -> Self {
        Self {
            limit,
            consecutive: 0,
        }
    }

    /// Count one failed read; `true` once the limit is reached.
    fn record_failure(&mut self) -> bool {
        self.consecutive = self.consecutive.saturating_add(1);
        self.limit.is_some_and(|limit| self.consecutive >= limit)
    }

    fn record_success(&mut self) {
        self.consecutive = 0;
    }

    fn consecutive(&self) -> u32 {
        self.consecutive
    }
}

fn run_loop<D, S>(mut camera: Camera<D>, decoder: S, ctx: LoopContext)
where
    D: CaptureDevice,
    S: SymbolDecoder,
{
    let device_id = camera.device_id();
    let mut last_good: Option<Frame> = None;
    let mut failures = FailureBudget::new(ctx.options.max_consecutive_failures);

    loop {
        ctx.set_phase(WorkerPhase::Idle);
        let sequence = match ctx.commands.recv() {
            Ok(WorkerCommand::Capture { sequence }) => sequence,
            Ok(WorkerCommand::Stop) | Err(_) => break,
        };
        if ctx.stopping() {
            break;
        }

        let span = debug_span!("scanner.request", sequence, device_id);
        let _entered = span.enter();
        let started = Instant::now();
        let display = ctx.settings.snapshot();

        ctx.set_phase(WorkerPhase::Capturing);
        let read = match camera.read() {
            Ok(Some(frame)) => Some(frame),
            Ok(None) => None,
            Err(err) => {
                debug!("frame read error: {err}");
                None
            }
        };

        let (annotated, detections, stale) = match read {
            Some(frame) => {
                failures.record_success();
                ctx.set_phase(WorkerPhase::Decoding);
                let detections = match decode(&decoder, &frame) {
                    Ok(detections) => detections,
                    Err(err) => {
                        warn!(decoder = decoder.name(), "decode failed: {err}");
                        Vec::new()
                    }
                };
                if !detections.is_empty() {
                    debug!(count = detections.len(), "symbols decoded");
                    metrics::counter!(telemetry::DETECTIONS_TOTAL).increment(detections.len() as u64);
                }
                let annotated = if ctx.options.annotate {
                    annotate(&frame, &detections).unwrap_or_else(|err| {
                        warn!("annotation failed: {err:#}");
                        frame
                    })
                } else {
                    frame
                };
                last_good = Some(annotated.clone());
                metrics::counter!(telemetry::FRAMES_TOTAL).increment(1);
                (annotated, detections, false)
            }
            None => {
                let exhausted = failures.record_failure();
                let consecutive_failures = failures.consecutive();
                metrics::counter!(telemetry::READ_FAILURES_TOTAL).increment(1);
                if exhausted {
                    error!(consecutive_failures, "camera stopped delivering frames");
                    let _ = ctx.responses.send(Err(CaptureError::ReadFailures {
                        device_id,
                        count: consecutive_failures,
                    }));
                    break;
                }
                warn!(consecutive_failures, "frame read failed; serving previous frame");
                let fallback = last_good.clone().unwrap_or_else(|| {
                    let (width, height) = camera.resolution().unwrap_or(BLANK_FRAME_SIZE);
                    Frame::blank(width, height)
                });
                (fallback, Vec::new(), true)
            }
        };

        let frame = present(annotated, &display).unwrap_or_else(|err| {
            warn!("could not apply display settings: {err:#}");
            Frame::blank(BLANK_FRAME_SIZE.0, BLANK_FRAME_SIZE.1)
        });

        ctx.set_phase(WorkerPhase::Publishing);
        let response = FrameResponse {
            sequence,
            frame,
            detections,
            stale,
        };
        if ctx.responses.send(Ok(response)).is_err() {
            debug!("response receiver dropped");
            break;
        }
        metrics::histogram!(telemetry::REQUEST_SECONDS).record(started.elapsed().as_secs_f64());

        if ctx.stopping() {
            break;
        }
    }

    ctx.set_phase(WorkerPhase::Stopped);
    camera.release();
}
