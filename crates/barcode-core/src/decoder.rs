//! Symbol decoder seam and per-frame deduplication.

use std::collections::HashSet;

use thiserror::Error;
use video_ingest::{Frame, FrameFormat};

use crate::detection::{Detection, Point};

/// Symbol as reported by a decoding backend, before deduplication.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawSymbol {
    pub symbol_type: String,
    pub data: Vec<u8>,
    pub polygon: Vec<Point>,
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("unexpected frame buffer size: got {got} bytes, expected {expected}")]
    BufferSize { got: usize, expected: usize },
    #[error("{backend} decoder failed: {message}")]
    Backend { backend: &'static str, message: String },
}

/// Barcode/QR decoding library wrapped behind one call per image.
///
/// Backends may report the same symbol several times for one frame; callers
/// should go through [`decode`] which removes those duplicates.
pub trait SymbolDecoder: Send {
    fn name(&self) -> &'static str;

    fn scan(&self, frame: &Frame) -> Result<Vec<RawSymbol>, DecodeError>;
}

impl<T: SymbolDecoder + ?Sized> SymbolDecoder for Box<T> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn scan(&self, frame: &Frame) -> Result<Vec<RawSymbol>, DecodeError> {
        (**self).scan(frame)
    }
}

/// Decode `frame`, keeping the first occurrence of every `(type, payload)` pair.
pub fn decode<D: SymbolDecoder + ?Sized>(decoder: &D, frame: &Frame) -> Result<Vec<Detection>, DecodeError> {
    let raw = decoder.scan(frame)?;
    let mut seen = HashSet::with_capacity(raw.len());
    let mut detections = Vec::with_capacity(raw.len());
    for symbol in raw {
        let payload = String::from_utf8_lossy(&symbol.data).into_owned();
        if seen.insert((symbol.symbol_type.clone(), payload.clone())) {
            detections.push(Detection::new(symbol.symbol_type, payload, symbol.polygon));
        }
    }
    Ok(detections)
}

/// 8-bit luma plane of a BGR frame.
pub fn luma_plane(frame: &Frame) -> Result<Vec<u8>, DecodeError> {
    if !frame.is_well_formed() {
        return Err(DecodeError::BufferSize {
            got: frame.data.len(),
            expected: frame.expected_len(),
        });
    }
    let luma = match frame.format {
        FrameFormat::Bgr8 => frame
            .data
            .chunks_exact(3)
            .map(|px| ((29 * px[0] as u32 + 150 * px[1] as u32 + 77 * px[2] as u32) >> 8) as u8)
            .collect(),
    };
    Ok(luma)
}
