//! Camera ingest for the inventory scanner.
//!
//! Owns the raw [`Frame`] type, the capture error taxonomy and the scoped
//! [`Camera`] resource. The OpenCV backend is only compiled with the
//! `with-opencv` feature so the rest of the workspace builds without native
//! OpenCV libraries.

mod camera;
#[cfg(feature = "with-opencv")]
pub mod opencv_camera;
mod types;

pub use camera::{Camera, CaptureDevice, DEFAULT_WARMUP_ATTEMPTS};
pub use types::{CaptureError, Frame, FrameFormat};
