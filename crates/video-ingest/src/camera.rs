//! Scoped camera resource.
//!
//! A [`Camera`] pairs every successful acquisition with exactly one release of
//! the underlying device, whether the owner releases it explicitly, returns
//! early, or unwinds from a panic.

use tracing::{debug, info, warn};

use crate::types::{CaptureError, Frame};

/// Default number of reads attempted while waiting for a freshly opened device
/// to deliver its first frame.
pub const DEFAULT_WARMUP_ATTEMPTS: u32 = 100;

/// Minimal capture API the scanner needs from a camera backend.
pub trait CaptureDevice {
    /// Read the next frame. `Ok(None)` means the device answered but had no
    /// frame ready (the backend's "success = false").
    fn read_frame(&mut self) -> Result<Option<Frame>, CaptureError>;

    /// Give the hardware handle back to the OS.
    fn release(&mut self);
}

impl<D: CaptureDevice + ?Sized> CaptureDevice for Box<D> {
    fn read_frame(&mut self) -> Result<Option<Frame>, CaptureError> {
        (**self).read_frame()
    }

    fn release(&mut self) {
        (**self).release()
    }
}

/// An opened, warmed-up capture device.
pub struct Camera<D: CaptureDevice> {
    device: Option<D>,
    device_id: i32,
    resolution: Option<(u32, u32)>,
}

impl<D: CaptureDevice> Camera<D> {
    /// Take ownership of an opened device and wait until it produces a frame.
    ///
    /// Devices that never deliver a readable frame within `warmup_attempts`
    /// reads are released and reported as [`CaptureError::CameraUnavailable`].
    pub fn acquire(device_id: i32, mut device: D, warmup_attempts: u32) -> Result<Self, CaptureError> {
        let attempts = warmup_attempts.max(1);
        for attempt in 1..=attempts {
            match device.read_frame() {
                Ok(Some(frame)) => {
                    info!(
                        device_id,
                        width = frame.width,
                        height = frame.height,
                        attempt,
                        "camera acquired"
                    );
                    return Ok(Self {
                        device: Some(device),
                        device_id,
                        resolution: Some(frame.resolution()),
                    });
                }
                Ok(None) => debug!(device_id, attempt, "camera warming up"),
                Err(err) => debug!(device_id, attempt, "camera warm-up read failed: {err}"),
            }
        }

        warn!(device_id, attempts, "camera never delivered a frame");
        device.release();
        Err(CaptureError::CameraUnavailable {
            device_id,
            reason: format!("no readable frame after {attempts} attempt(s)"),
        })
    }

    pub fn device_id(&self) -> i32 {
        self.device_id
    }

    /// Resolution of the most recent successfully read frame.
    pub fn resolution(&self) -> Option<(u32, u32)> {
        self.resolution
    }

    /// Read one frame from the device.
    pub fn read(&mut self) -> Result<Option<Frame>, CaptureError> {
        let device = self.device.as_mut().ok_or_else(|| CaptureError::CameraUnavailable {
            device_id: self.device_id,
            reason: "camera already released".to_string(),
        })?;
        let frame = device.read_frame()?;
        if let Some(frame) = frame.as_ref() {
            self.resolution = Some(frame.resolution());
        }
        Ok(frame)
    }

    /// Release the device now instead of at drop.
    pub fn release(mut self) {
        self.release_device();
    }

    fn release_device(&mut self) {
        if let Some(mut device) = self.device.take() {
            device.release();
            info!(device_id = self.device_id, "camera released");
        }
    }
}

impl<D: CaptureDevice> Drop for Camera<D> {
    fn drop(&mut self) {
        self.release_device();
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::VecDeque,
        panic::{self, AssertUnwindSafe},
        sync::{
            Arc,
            atomic::{AtomicUsize, Ordering},
        },
    };

    use super::*;

    struct FakeDevice {
        reads: VecDeque<Option<Frame>>,
        releases: Arc<AtomicUsize>,
    }

    impl FakeDevice {
        fn new(reads: Vec<Option<Frame>>) -> (Self, Arc<AtomicUsize>) {
            let releases = Arc::new(AtomicUsize::new(0));
            (
                Self {
                    reads: reads.into(),
                    releases: releases.clone(),
                },
                releases,
            )
        }
    }

    impl CaptureDevice for FakeDevice {
        fn read_frame(&mut self) -> Result<Option<Frame>, CaptureError> {
            Ok(self.reads.pop_front().flatten())
        }

        fn release(&mut self) {
            self.releases.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn warmup_waits_for_first_frame() {
        let (device, _) = FakeDevice::new(vec![None, None, Some(Frame::blank(4, 2))]);
        let camera = Camera::acquire(0, device, 5).expect("camera should warm up");
        assert_eq!(camera.resolution(), Some((4, 2)));
    }

    #[test]
    fn unreadable_device_is_unavailable_and_released() {
        let (device, releases) = FakeDevice::new(vec![None, None, None]);
        let err = Camera::acquire(3, device, 3).err().expect("acquire should fail");
        assert!(matches!(err, CaptureError::CameraUnavailable { device_id: 3, .. }));
        assert_eq!(releases.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn drop_releases_exactly_once() {
        let (device, releases) = FakeDevice::new(vec![Some(Frame::blank(1, 1))]);
        {
            let _camera = Camera::acquire(0, device, 1).expect("acquire");
        }
        assert_eq!(releases.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn explicit_release_is_not_repeated_by_drop() {
        let (device, releases) = FakeDevice::new(vec![Some(Frame::blank(1, 1))]);
        let camera = Camera::acquire(0, device, 1).expect("acquire");
        camera.release();
        assert_eq!(releases.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn panic_while_holding_camera_still_releases() {
        let (device, releases) = FakeDevice::new(vec![Some(Frame::blank(1, 1))]);
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            let _camera = Camera::acquire(0, device, 1).expect("acquire");
            panic!("decoder blew up");
        }));
        assert!(result.is_err());
        assert_eq!(releases.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn failed_reads_do_not_forget_last_resolution() {
        let (device, _) = FakeDevice::new(vec![Some(Frame::blank(8, 6)), None]);
        let mut camera = Camera::acquire(0, device, 1).expect("acquire");
        assert!(camera.read().expect("read").is_none());
        assert_eq!(camera.resolution(), Some((8, 6)));
    }
}
