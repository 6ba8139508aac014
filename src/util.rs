#![allow(dead_code)]

//! Small stream helpers shared by the codecs.

use std::io::{self, Read};

use crate::{DibError, DibResult};

/// Discards exactly `count` bytes from the reader.
///
/// This is how the codecs move forward through parts of a file they don't
/// care about (gap before the pixel data, trailing V4/V5 header fields,
/// skipped icon payloads). Reading instead of seeking keeps non-seekable
/// streams working.
#[inline]
pub(crate) fn skip_forward(r: &mut impl Read, count: u64) -> DibResult<()> {
  let copied = io::copy(&mut r.by_ref().take(count), &mut io::sink()).map_err(DibError::from)?;
  if copied == count {
    Ok(())
  } else {
    Err(DibError::Truncated)
  }
}

/// Discards up to `count` bytes, stopping quietly at end-of-file.
///
/// Row padding at the very end of a pixel array is allowed to be missing, so
/// the row decoders use this for the pad bytes and [`skip_forward`] for
/// everything that must be present.
#[inline]
pub(crate) fn skip_available(r: &mut impl Read, count: u64) -> DibResult<()> {
  io::copy(&mut r.by_ref().take(count), &mut io::sink()).map_err(DibError::from)?;
  Ok(())
}

/// Allocates a zero-filled byte buffer, reporting failure instead of
/// aborting.
#[inline]
pub(crate) fn try_alloc_zeroed(len: usize) -> DibResult<Vec<u8>> {
  let mut v = Vec::new();
  v.try_reserve_exact(len)?;
  v.resize(len, 0);
  Ok(v)
}
