#![allow(dead_code)]

use std::{
    collections::VecDeque,
    sync::{
        Arc, Barrier, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
};

use barcode_core::{DecodeError, RawSymbol, SymbolDecoder};
use video_ingest::{Camera, CaptureDevice, CaptureError, Frame};

pub const WIDTH: u32 = 8;
pub const HEIGHT: u32 = 4;

#[derive(Clone, Debug)]
pub enum Step {
    Frame(Frame),
    Miss,
    Fail,
}

/// Frame whose first blue byte carries `marker`; 0 means "no code in view".
pub fn marked_frame(marker: u8) -> Frame {
    let mut frame = Frame::blank(WIDTH, HEIGHT);
    frame.data[0] = marker;
    frame
}

pub fn marker_payload(marker: u8) -> String {
    format!("code-{marker}")
}

/// Capture device replaying a script, then repeating `tail` forever.
pub struct ScriptedDevice {
    script: Arc<Mutex<VecDeque<Step>>>,
    tail: Step,
    reads: Arc<AtomicUsize>,
    releases: Arc<AtomicUsize>,
}

#[derive(Clone)]
pub struct DeviceMonitor {
    pub script: Arc<Mutex<VecDeque<Step>>>,
    pub reads: Arc<AtomicUsize>,
    pub releases: Arc<AtomicUsize>,
}

impl DeviceMonitor {
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn releases(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }

    pub fn push(&self, step: Step) {
        self.script.lock().expect("script lock").push_back(step);
    }
}

impl ScriptedDevice {
    pub fn new(script: impl IntoIterator<Item = Step>, tail: Step) -> (Self, DeviceMonitor) {
        let monitor = DeviceMonitor {
            script: Arc::new(Mutex::new(script.into_iter().collect())),
            reads: Arc::new(AtomicUsize::new(0)),
            releases: Arc::new(AtomicUsize::new(0)),
        };
        let device = Self {
            script: monitor.script.clone(),
            tail,
            reads: monitor.reads.clone(),
            releases: monitor.releases.clone(),
        };
        (device, monitor)
    }

    /// Device whose warm-up read succeeds, then follows `script`.
    pub fn warmed(script: impl IntoIterator<Item = Step>, tail: Step) -> (Self, DeviceMonitor) {
        Self::new(
            std::iter::once(Step::Frame(marked_frame(0))).chain(script),
            tail,
        )
    }
}

impl CaptureDevice for ScriptedDevice {
    fn read_frame(&mut self) -> Result<Option<Frame>, CaptureError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let step = self
            .script
            .lock()
            .expect("script lock")
            .pop_front()
            .unwrap_or_else(|| self.tail.clone());
        match step {
            Step::Frame(frame) => Ok(Some(frame)),
            Step::Miss => Ok(None),
            Step::Fail => Err(CaptureError::Other(anyhow::anyhow!("scripted read failure"))),
        }
    }

    fn release(&mut self) {
        self.releases.fetch_add(1, Ordering::SeqCst);
    }
}

/// Barriers a [`GatedDevice`] meets on its gated read: `entered` once the
/// read has started, `release` before it returns.
#[derive(Clone)]
pub struct Gate {
    pub entered: Arc<Barrier>,
    pub release: Arc<Barrier>,
}

/// Wraps a scripted device and holds read number `gated_read` (1-based,
/// warm-up included) until the test releases it.
pub struct GatedDevice {
    inner: ScriptedDevice,
    gated_read: usize,
    reads: usize,
    gate: Gate,
}

impl GatedDevice {
    pub fn new(inner: ScriptedDevice, gated_read: usize) -> (Self, Gate) {
        let gate = Gate {
            entered: Arc::new(Barrier::new(2)),
            release: Arc::new(Barrier::new(2)),
        };
        let device = Self {
            inner,
            gated_read,
            reads: 0,
            gate: gate.clone(),
        };
        (device, gate)
    }
}

impl CaptureDevice for GatedDevice {
    fn read_frame(&mut self) -> Result<Option<Frame>, CaptureError> {
        self.reads += 1;
        if self.reads == self.gated_read {
            self.gate.entered.wait();
            self.gate.release.wait();
        }
        self.inner.read_frame()
    }

    fn release(&mut self) {
        self.inner.release();
    }
}

pub fn opener(
    device: ScriptedDevice,
) -> impl FnOnce() -> Result<Camera<ScriptedDevice>, CaptureError> + Send + 'static {
    move || Camera::acquire(0, device, 3)
}

/// Reports every marked frame's code twice, like backends that see one
/// symbol through several finder patterns.
pub struct MarkerDecoder;

impl SymbolDecoder for MarkerDecoder {
    fn name(&self) -> &'static str {
        "marker"
    }

    fn scan(&self, frame: &Frame) -> Result<Vec<RawSymbol>, DecodeError> {
        let marker = frame.data.first().copied().unwrap_or(0);
        if marker == 0 {
            return Ok(Vec::new());
        }
        let symbol = RawSymbol {
            symbol_type: "QRCODE".to_string(),
            data: marker_payload(marker).into_bytes(),
            polygon: Vec::new(),
        };
        Ok(vec![symbol.clone(), symbol])
    }
}
