//! Barcode and QR decoding for captured frames.
//!
//! Backends implement [`SymbolDecoder`] (`rqrr` for QR codes only, `rxing`
//! for 1D and 2D symbologies); [`decode`] turns their raw reports into
//! deduplicated [`Detection`]s.

mod decoder;
mod detection;
#[cfg(feature = "rxing")]
mod multi;
#[cfg(feature = "rqrr")]
mod qr;

pub use decoder::{DecodeError, RawSymbol, SymbolDecoder, decode, luma_plane};
pub use detection::{Detection, Point};
#[cfg(feature = "rxing")]
pub use multi::{MultiFormatDecoder, symbol_type_label};
#[cfg(feature = "rqrr")]
pub use qr::{QR_SYMBOL_TYPE, QrDecoder};
