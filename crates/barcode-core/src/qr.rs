//! QR code backend built on `rqrr`.

use rqrr::PreparedImage;
use tracing::debug;
use video_ingest::Frame;

use crate::{
    decoder::{DecodeError, RawSymbol, SymbolDecoder, luma_plane},
    detection::Point,
};

/// Symbol type label reported for QR codes.
pub const QR_SYMBOL_TYPE: &str = "QRCODE";

/// Pure-Rust QR decoder operating on the frame's luma plane.
#[derive(Debug, Default, Clone, Copy)]
pub struct QrDecoder;

impl SymbolDecoder for QrDecoder {
    fn name(&self) -> &'static str {
        "rqrr"
    }

    fn scan(&self, frame: &Frame) -> Result<Vec<RawSymbol>, DecodeError> {
        let luma = luma_plane(frame)?;
        let width = frame.width as usize;
        let height = frame.height as usize;
        if width == 0 || height == 0 {
            return Ok(Vec::new());
        }

        let mut prepared =
            PreparedImage::prepare_from_greyscale(width, height, |x, y| luma[y * width + x]);

        let mut symbols = Vec::new();
        for grid in prepared.detect_grids() {
            let polygon = grid.bounds.iter().map(|p| Point::new(p.x, p.y)).collect();
            match grid.decode() {
                Ok((_meta, content)) => symbols.push(RawSymbol {
                    symbol_type: QR_SYMBOL_TYPE.to_string(),
                    data: content.into_bytes(),
                    polygon,
                }),
                Err(err) => debug!("qr grid located but not decodable: {err}"),
            }
        }
        Ok(symbols)
    }
}
