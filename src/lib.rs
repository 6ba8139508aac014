#![forbid(unsafe_code)]

//! A crate for reading and writing BMP, ICO, and CUR images.
//!
//! All three formats share the same inner structure, the Device-Independent
//! Bitmap: an info header, an optional color table, and rows of pixel data
//! padded out to 4-byte boundaries. BMP files wrap one DIB in a small file
//! header, while icon and cursor files hold a directory of entries that each
//! point at a DIB (or, for large frames, a PNG blob).
//!
//! The decoders produce an [`Image`]: a dense 8-bit RGB plane with an
//! optional alpha plane and a small set of typed options (palette,
//! resolution, cursor hotspot). The encoders go the other way, from an
//! `Image` to one of the [`BmpFormat`] layouts.
//!
//! * BMP: [`bmp_read`], [`bmp_write`], [`bmp_signature_is_correct`]
//! * ICO/CUR (feature `ico`, on by default): [`ico_read`], [`ico_write`],
//!   [`ico_entry_count`], [`ico_signature_is_correct`]
//!
//! Everything works over plain [`Read`](std::io::Read) and
//! [`Write`](std::io::Write) streams. No seeking is ever required: skips are
//! always forward and are performed by reading, so sockets and pipes decode
//! the same as files.
//!
//! Color quantization (for the paletted output formats) and PNG coding (for
//! oversized icon frames) are *not* part of this crate. They plug in through
//! the [`Quantizer`] and [`PngCodec`] traits.
//!
//! Diagnostics for rejected files are emitted through the [`log`] facade;
//! enable a logger at `error` level or lower to see why a file was refused.

mod error;
pub use error::*;

mod image;
pub use image::*;

mod palette;
pub use palette::*;

mod bitfields;
pub use bitfields::*;

mod dib;
pub use dib::*;

mod bmp;
pub use bmp::*;

#[cfg(feature = "ico")]
mod ico;
#[cfg(feature = "ico")]
pub use ico::*;

mod util;
