//! Multi-symbology backend built on `rxing`: 1D retail and logistics codes
//! (EAN, UPC, Code 128/39/93, ITF, Codabar) as well as 2D codes.

use rxing::{BarcodeFormat, Exceptions, RXingResult};
use tracing::debug;
use video_ingest::Frame;

use crate::{
    decoder::{DecodeError, RawSymbol, SymbolDecoder, luma_plane},
    detection::Point,
};

/// Decoder for every symbology `rxing` can read.
#[derive(Debug, Default, Clone, Copy)]
pub struct MultiFormatDecoder;

/// Symbol type label for a format, in the scanner's usual upper-case spelling
/// (`EAN13`, `CODE128`, `QRCODE`, ...).
pub fn symbol_type_label(format: &BarcodeFormat) -> String {
    let label = match format {
        BarcodeFormat::QR_CODE => "QRCODE",
        BarcodeFormat::EAN_13 => "EAN13",
        BarcodeFormat::EAN_8 => "EAN8",
        BarcodeFormat::UPC_A => "UPCA",
        BarcodeFormat::UPC_E => "UPCE",
        BarcodeFormat::CODE_128 => "CODE128",
        BarcodeFormat::CODE_39 => "CODE39",
        BarcodeFormat::CODE_93 => "CODE93",
        BarcodeFormat::ITF => "I25",
        BarcodeFormat::CODABAR => "CODABAR",
        BarcodeFormat::RSS_14 => "DATABAR",
        BarcodeFormat::RSS_EXPANDED => "DATABAR_EXP",
        BarcodeFormat::PDF_417 => "PDF417",
        BarcodeFormat::DATA_MATRIX => "DATAMATRIX",
        BarcodeFormat::AZTEC => "AZTEC",
        other => return format!("{other:?}").replace('_', "").to_uppercase(),
    };
    label.to_string()
}

fn to_symbol(result: &RXingResult) -> RawSymbol {
    RawSymbol {
        symbol_type: symbol_type_label(result.getBarcodeFormat()),
        data: result.getText().as_bytes().to_vec(),
        polygon: result
            .getPoints()
            .iter()
            .map(|p| Point::new(p.x.round() as i32, p.y.round() as i32))
            .collect(),
    }
}

impl SymbolDecoder for MultiFormatDecoder {
    fn name(&self) -> &'static str {
        "rxing"
    }

    fn scan(&self, frame: &Frame) -> Result<Vec<RawSymbol>, DecodeError> {
        let luma = luma_plane(frame)?;
        if frame.width == 0 || frame.height == 0 {
            return Ok(Vec::new());
        }

        match rxing::helpers::detect_multiple_in_luma(luma, frame.width, frame.height) {
            Ok(results) => Ok(results.iter().map(to_symbol).collect()),
            Err(Exceptions::NotFoundException(_)) => Ok(Vec::new()),
            Err(err) => {
                debug!("rxing could not decode frame: {err}");
                Err(DecodeError::Backend {
                    backend: "rxing",
                    message: err.to_string(),
                })
            }
        }
    }
}
