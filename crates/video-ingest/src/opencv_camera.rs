//! OpenCV-backed camera devices.

use opencv::{
    core::{Mat, MatTraitConstManual},
    prelude::*,
    videoio::{self, VideoCapture},
};
use tracing::{debug, warn};

use crate::{
    camera::{Camera, CaptureDevice},
    types::{CaptureError, Frame},
};

/// Capture backends tried in order. Windows needs DirectShow to open most
/// webcams quickly; elsewhere V4L is preferred with a generic fallback.
#[cfg(windows)]
const CAPTURE_BACKENDS: [i32; 2] = [videoio::CAP_DSHOW, videoio::CAP_ANY];
#[cfg(not(windows))]
const CAPTURE_BACKENDS: [i32; 2] = [videoio::CAP_V4L, videoio::CAP_ANY];

/// A `VideoCapture` handle reading BGR frames.
pub struct OpenCvDevice {
    cap: VideoCapture,
    frame: Mat,
}

impl CaptureDevice for OpenCvDevice {
    fn read_frame(&mut self) -> Result<Option<Frame>, CaptureError> {
        let grabbed = self
            .cap
            .read(&mut self.frame)
            .map_err(|e| CaptureError::Other(e.into()))?;
        if !grabbed {
            return Ok(None);
        }

        let width = self.frame.cols();
        let height = self.frame.rows();
        if width <= 0 || height <= 0 {
            return Ok(None);
        }

        let data = self
            .frame
            .data_bytes()
            .map_err(|e| CaptureError::Other(e.into()))?
            .to_vec();

        Ok(Some(Frame::from_bgr(data, width as u32, height as u32)))
    }

    fn release(&mut self) {
        if let Err(err) = self.cap.release() {
            warn!("video-ingest: failed to release capture handle: {err}");
        }
    }
}

/// Open camera `device_id` with the first capture backend that accepts it.
pub fn open_device(device_id: i32) -> Result<OpenCvDevice, CaptureError> {
    for backend in CAPTURE_BACKENDS {
        match VideoCapture::new(device_id, backend) {
            Ok(cap) => {
                if cap.is_opened().map_err(|e| CaptureError::Other(e.into()))? {
                    let mut device = OpenCvDevice {
                        cap,
                        frame: Mat::default(),
                    };
                    configure_capture(&mut device.cap);
                    return Ok(device);
                }
                debug!("video-ingest: backend {backend} did not open device #{device_id}");
            }
            Err(err) => {
                warn!("video-ingest: failed to open device #{device_id} with backend {backend}: {err}");
            }
        }
    }

    Err(CaptureError::CameraUnavailable {
        device_id,
        reason: "no capture backend could open the device".to_string(),
    })
}

/// Open and warm up camera `device_id`.
pub fn acquire(device_id: i32, warmup_attempts: u32) -> Result<Camera<OpenCvDevice>, CaptureError> {
    let device = open_device(device_id)?;
    Camera::acquire(device_id, device, warmup_attempts)
}

/// Prefer MJPG, fall back to YUYV. Both are best-effort.
fn configure_capture(cap: &mut VideoCapture) {
    let mut fourcc_set = false;
    if let Ok(mjpg) = videoio::VideoWriter::fourcc('M', 'J', 'P', 'G') {
        if matches!(cap.set(videoio::CAP_PROP_FOURCC, mjpg as f64), Ok(true)) {
            fourcc_set = true;
        }
    }
    if !fourcc_set {
        if let Ok(yuyv) = videoio::VideoWriter::fourcc('Y', 'U', 'Y', 'V') {
            let _ = cap.set(videoio::CAP_PROP_FOURCC, yuyv as f64);
        }
    }
}
