//! Parsing and emitting the DIB info-header family.

use std::io::{Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::{
  util::{skip_forward, try_alloc_zeroed},
  DibError, DibResult, Palette, Resolution, ResolutionUnit,
};

pub(crate) const BI_RGB: u32 = 0;
pub(crate) const BI_RLE8: u32 = 1;
pub(crate) const BI_RLE4: u32 = 2;
pub(crate) const BI_BITFIELDS: u32 = 3;
pub(crate) const BI_JPEG: u32 = 4;
pub(crate) const BI_PNG: u32 = 5;

/// The pixel data encodings this crate decodes.
///
/// Explicit channel masks ride along in the `Bitfields` variant, since they
/// only exist when that compression code is used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
  /// Uncompressed rows.
  Rgb,
  /// Run-length encoding, one byte per index (8 bpp only).
  Rle8,
  /// Run-length encoding, one nibble per index (4 bpp only).
  Rle4,
  /// Uncompressed 16-bit or 32-bit pixels with explicit channel masks.
  #[allow(missing_docs)]
  Bitfields { r_mask: u32, g_mask: u32, b_mask: u32, a_mask: u32 },
}

impl Compression {
  /// If this is one of the run-length encodings.
  #[inline]
  #[must_use]
  pub const fn is_rle(self) -> bool {
    matches!(self, Self::Rle8 | Self::Rle4)
  }
}

/// A fully parsed DIB header: the facts the pixel decoder needs, with all
/// the version-dependent layout differences already smoothed over.
///
/// There are six header layouts in the wild (12, 40, 52, 56, 108, and 124
/// bytes, told apart by the leading size field). The fields the later
/// versions add beyond the alpha mask — color spaces, gamma, ICC profiles —
/// are skipped, not interpreted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DibHeader {
  /// Image width in pixels, `1..=32767`.
  pub width: u32,
  /// Image height in pixels, `1..=32767`.
  pub height: u32,
  /// If the rows are stored top-down (stored height was negative).
  pub top_down: bool,
  /// Bits per pixel: 1, 4, 8, 16, 24, or 32.
  pub bpp: u16,
  /// The pixel data encoding.
  pub compression: Compression,
  /// Number of color table entries, `0..=256`.
  pub ncolors: usize,
  /// Resolution in pixels per centimeter, when the header version carries
  /// one.
  pub resolution_ppcm: Option<(i32, i32)>,
  /// The color table, loaded for the paletted bit depths.
  pub palette: Option<Palette>,
}

impl DibHeader {
  /// Parses a DIB header chain from a stream positioned at the leading
  /// size field, i.e. right after the 14-byte file header of a BMP file or
  /// at the start of an icon entry's payload.
  ///
  /// On success the stream sits at the first pixel byte and the returned
  /// count says how many bytes were consumed (header, masks, color table).
  ///
  /// Icon payloads (`is_icon`) store the color plane and the mask as one
  /// bitmap, so their header height is twice the image height; it is halved
  /// here.
  pub fn parse(r: &mut impl Read, is_icon: bool) -> DibResult<(Self, u64)> {
    let hdr_size = r.read_u32::<LittleEndian>()?;
    let uses_core = hdr_size == 12;
    if !uses_core && hdr_size < 40 {
      log::error!("DIB header: unrecognized header size {hdr_size}");
      return Err(DibError::BadHeader);
    }
    let mut consumed: u64 = 4;

    let raw_width: i32;
    let mut raw_height: i32;
    let bpp: u16;
    if uses_core {
      raw_width = i32::from(r.read_i16::<LittleEndian>()?);
      raw_height = i32::from(r.read_i16::<LittleEndian>()?);
      let _planes = r.read_u16::<LittleEndian>()?;
      bpp = r.read_u16::<LittleEndian>()?;
      consumed += 8;
    } else {
      raw_width = r.read_i32::<LittleEndian>()?;
      raw_height = r.read_i32::<LittleEndian>()?;
      let _planes = r.read_u16::<LittleEndian>()?;
      bpp = r.read_u16::<LittleEndian>()?;
      consumed += 12;
    }
    if is_icon {
      raw_height /= 2;
    }

    if raw_width <= 0 || raw_width > 32767 {
      log::error!("DIB header: image width {raw_width} out of range");
      return Err(DibError::BadHeader);
    }
    if raw_height == 0 || raw_height.unsigned_abs() > 32767 {
      log::error!("DIB header: image height {raw_height} out of range");
      return Err(DibError::BadHeader);
    }
    if !matches!(bpp, 1 | 4 | 8 | 16 | 24 | 32) {
      log::error!("DIB header: unknown bit depth {bpp}");
      return Err(DibError::BadHeader);
    }
    let width = raw_width as u32;
    let height = raw_height.unsigned_abs();
    let top_down = raw_height < 0;

    let mut compression = Compression::Rgb;
    let mut ncolors: usize = 0;
    let mut resolution_ppcm = None;
    if !uses_core {
      let comp_code = r.read_u32::<LittleEndian>()?;
      let _size_image = r.read_u32::<LittleEndian>()?;
      let x_ppm = r.read_i32::<LittleEndian>()?;
      let y_ppm = r.read_i32::<LittleEndian>()?;
      let ncolors_raw = r.read_u32::<LittleEndian>()?;
      let _important = r.read_u32::<LittleEndian>()?;
      consumed += 24;

      compression = match comp_code {
        BI_RGB => Compression::Rgb,
        BI_RLE8 if bpp == 8 => Compression::Rle8,
        BI_RLE4 if bpp == 4 => Compression::Rle4,
        BI_BITFIELDS if bpp == 16 || bpp == 32 => {
          let r_mask = r.read_u32::<LittleEndian>()?;
          let g_mask = r.read_u32::<LittleEndian>()?;
          let b_mask = r.read_u32::<LittleEndian>()?;
          consumed += 12;
          // Headers of 56 bytes and up grew a fourth mask for alpha.
          let a_mask = if hdr_size >= 56 {
            consumed += 4;
            r.read_u32::<LittleEndian>()?
          } else {
            0
          };
          Compression::Bitfields { r_mask, g_mask, b_mask, a_mask }
        }
        BI_RLE8 | BI_RLE4 | BI_BITFIELDS => {
          log::error!("DIB header: compression {comp_code} doesn't match bit depth {bpp}");
          return Err(DibError::BadHeader);
        }
        BI_JPEG | BI_PNG => {
          log::error!("DIB header: embedded JPEG/PNG payloads are not supported");
          return Err(DibError::UnsupportedCompression);
        }
        other => {
          log::error!("DIB header: unknown compression {other}");
          return Err(DibError::BadHeader);
        }
      };

      // Stored as pixels per meter.
      resolution_ppcm = Some((x_ppm / 100, y_ppm / 100));

      if ncolors_raw > 256 {
        log::error!("DIB header: invalid color count {ncolors_raw}");
        return Err(DibError::BadHeader);
      }
      ncolors = ncolors_raw as usize;

      // Jump over whatever V4/V5 fields follow.
      if u64::from(hdr_size) > consumed {
        skip_forward(r, u64::from(hdr_size) - consumed)?;
        consumed = u64::from(hdr_size);
      }
    }

    // A color count of zero at a paletted depth means a full table.
    if ncolors == 0 && bpp < 16 {
      ncolors = 1 << bpp;
    }

    let palette = if ncolors > 0 {
      let entry_size = if uses_core { 3 } else { 4 };
      let mut block = try_alloc_zeroed(ncolors * entry_size)?;
      r.read_exact(&mut block)?;
      consumed += (ncolors * entry_size) as u64;
      Some(if uses_core {
        Palette::from_bgr_triples(&block)
      } else {
        Palette::from_bgr_quads(&block)
      })
    } else {
      None
    };

    let header = Self {
      width,
      height,
      top_down,
      bpp,
      compression,
      ncolors,
      resolution_ppcm,
      palette,
    };
    Ok((header, consumed))
  }
}

/// Writes a 40-byte BITMAPINFOHEADER.
///
/// Output is always bottom-up uncompressed with one plane; `double_height`
/// is set for icon payloads, where the stored height spans the color plane
/// plus the mask.
pub(crate) fn write_info_header(
  w: &mut impl Write, width: u32, height: u32, double_height: bool, bpp: u16, ncolors: u32,
  size_image: u32, resolution: Option<Resolution>,
) -> DibResult<()> {
  let (x_ppm, y_ppm) = resolution_ppm(resolution);
  let rows = if double_height { height * 2 } else { height };
  w.write_u32::<LittleEndian>(40)?;
  w.write_i32::<LittleEndian>(width as i32)?;
  w.write_i32::<LittleEndian>(rows as i32)?;
  w.write_u16::<LittleEndian>(1)?; // planes
  w.write_u16::<LittleEndian>(bpp)?;
  w.write_u32::<LittleEndian>(BI_RGB)?;
  w.write_u32::<LittleEndian>(size_image)?;
  w.write_i32::<LittleEndian>(x_ppm)?;
  w.write_i32::<LittleEndian>(y_ppm)?;
  w.write_u32::<LittleEndian>(ncolors)?;
  w.write_u32::<LittleEndian>(0)?; // all colors are significant
  Ok(())
}

/// Converts the resolution option to the header's pixels-per-meter fields,
/// falling back to the format's customary 72 ppi.
fn resolution_ppm(resolution: Option<Resolution>) -> (i32, i32) {
  let Resolution { unit, x, y } =
    resolution.unwrap_or(Resolution { unit: ResolutionUnit::Inches, x: 72, y: 72 });
  match unit {
    ResolutionUnit::Inches => {
      ((f64::from(x) * 100.0 / 2.54) as i32, (f64::from(y) * 100.0 / 2.54) as i32)
    }
    ResolutionUnit::Centimeters => (x.saturating_mul(100), y.saturating_mul(100)),
  }
}
