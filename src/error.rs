use core::fmt;

/// An error from the `dibkit` crate.
///
/// One tag per failure. The codecs unwind cleanly on error: no partially
/// decoded image is ever returned, and the borrowed stream is simply left
/// wherever the failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DibError {
  /// The underlying stream failed for a reason other than end-of-file.
  IoFailed,

  /// End of input in the middle of a header, palette, or pixel run.
  Truncated,

  /// The leading bytes are not the signature of the expected format.
  BadMagic,

  /// Dimensions out of range, an unknown bit depth, an unknown header size,
  /// or a compression code inconsistent with the bit depth.
  BadHeader,

  /// An RLE delta moved outside the image.
  BadRle,

  /// A payload this crate doesn't decode: JPEG-in-BMP or PNG-in-BMP
  /// (compression codes 4 and 5), or a PNG icon frame with no [`PngCodec`]
  /// supplied.
  ///
  /// [`PngCodec`]: crate::PngCodec
  UnsupportedCompression,

  /// An operation needed a palette (or a [`Quantizer`] to make one) and none
  /// was available.
  ///
  /// [`Quantizer`]: crate::Quantizer
  MissingPalette,

  /// The allocator couldn't give us enough space for the pixel planes.
  AllocFailed,
}

/// Shorthand alias for results from this crate.
pub type DibResult<T> = Result<T, DibError>;

impl fmt::Display for DibError {
  #[inline]
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let msg = match self {
      Self::IoFailed => "stream read or write failed",
      Self::Truncated => "unexpected end of input",
      Self::BadMagic => "signature bytes did not match",
      Self::BadHeader => "invalid or inconsistent header",
      Self::BadRle => "run-length data moved outside the image",
      Self::UnsupportedCompression => "unsupported compression scheme",
      Self::MissingPalette => "no palette available",
      Self::AllocFailed => "pixel buffer allocation failed",
    };
    f.write_str(msg)
  }
}

impl std::error::Error for DibError {}

impl From<std::io::Error> for DibError {
  #[inline]
  fn from(e: std::io::Error) -> Self {
    if e.kind() == std::io::ErrorKind::UnexpectedEof {
      Self::Truncated
    } else {
      Self::IoFailed
    }
  }
}

impl From<std::collections::TryReserveError> for DibError {
  #[inline]
  fn from(_: std::collections::TryReserveError) -> Self {
    Self::AllocFailed
  }
}
