use anyhow::Error;
use chrono::Utc;
use thiserror::Error;

/// Raw frame captured from a video source.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub timestamp_ms: i64,
    pub format: FrameFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameFormat {
    Bgr8,
}

impl FrameFormat {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            FrameFormat::Bgr8 => 3,
        }
    }
}

impl Frame {
    /// Wrap an already captured BGR buffer, stamping it with the current wall clock.
    pub fn from_bgr(data: Vec<u8>, width: u32, height: u32) -> Self {
        Self {
            data,
            width,
            height,
            timestamp_ms: Utc::now().timestamp_millis(),
            format: FrameFormat::Bgr8,
        }
    }

    /// All-black frame served when no good frame has been read yet.
    pub fn blank(width: u32, height: u32) -> Self {
        let len = width as usize * height as usize * FrameFormat::Bgr8.bytes_per_pixel();
        Self::from_bgr(vec![0; len], width, height)
    }

    /// Number of bytes a well-formed buffer of this size and format holds.
    pub fn expected_len(&self) -> usize {
        self.width as usize * self.height as usize * self.format.bytes_per_pixel()
    }

    pub fn is_well_formed(&self) -> bool {
        self.data.len() == self.expected_len()
    }

    pub fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("camera {device_id} is unavailable: {reason}")]
    CameraUnavailable { device_id: i32, reason: String },
    #[error("camera {device_id} failed {count} consecutive frame reads")]
    ReadFailures { device_id: i32, count: u32 },
    #[error(transparent)]
    Other(#[from] Error),
}
