//! Turning an [`Image`] into DIB bytes in one of the output layouts.

use std::io::Write;

use byteorder::{LittleEndian, WriteBytesExt};

use super::{padded_bytes_per_line, write_info_header};
use crate::{util::try_alloc_zeroed, DibError, DibResult, Image, Palette};

/// The pixel layouts the encoder can produce.
///
/// The three `Pal1`/`Pal4`/`Pal8` formats build their palette with the
/// caller's [`Quantizer`]; `Pal8Given` uses the palette already attached to
/// the image; the remaining paletted formats synthesize a fixed ramp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BmpFormat {
  /// 24-bit `[b,g,r]` rows. The usual choice for true-color images.
  Rgb24,
  /// 32-bit `[b,g,r,a]` rows, keeping the alpha plane. An image without an
  /// alpha plane writes opaque alpha bytes.
  Rgba32,
  /// 1-bit, two quantized colors.
  Pal1,
  /// 1-bit black and white: the red channel thresholded at 128.
  Pal1Bw,
  /// 4-bit, sixteen quantized colors.
  Pal4,
  /// 8-bit, quantized palette.
  Pal8,
  /// 8-bit using the palette the image carries; fails with
  /// [`MissingPalette`](DibError::MissingPalette) if there isn't one.
  Pal8Given,
  /// 8-bit greyscale ramp, pixels mapped through the usual luma weights.
  Pal8Grey,
  /// 8-bit greyscale ramp indexed by the red channel alone.
  Pal8Red,
}

impl BmpFormat {
  /// The bit depth this format stores pixels at.
  #[inline]
  #[must_use]
  pub const fn bits_per_pixel(self) -> u16 {
    match self {
      Self::Rgb24 => 24,
      Self::Rgba32 => 32,
      Self::Pal1 | Self::Pal1Bw => 1,
      Self::Pal4 => 4,
      _ => 8,
    }
  }

  /// How many color table entries the format writes.
  #[inline]
  #[must_use]
  const fn palette_len(self) -> usize {
    match self {
      Self::Rgb24 | Self::Rgba32 => 0,
      Self::Pal1 | Self::Pal1Bw => 2,
      Self::Pal4 => 16,
      _ => 256,
    }
  }
}

/// Reduces a true-color image to a paletted one.
///
/// This is the seam where a color quantization library plugs in; the crate
/// itself doesn't ship one. `rgb` is `3 * width * height` bytes top-down;
/// the result is one palette index per pixel in the same order, plus the
/// palette, which must not exceed `max_colors` entries. The encoder never
/// asks for more than 236 colors.
pub trait Quantizer {
  /// Quantizes `rgb` down to at most `max_colors` colors.
  fn quantize(
    &self, rgb: &[u8], width: u32, height: u32, max_colors: usize,
  ) -> DibResult<(Vec<u8>, Palette)>;
}

const QUANTIZE_COLOR_CAP: usize = 236;

/// Where each pixel's palette index comes from while emitting rows.
enum IndexSource {
  None,
  Table { indexes: Vec<u8>, palette: Palette },
  Grey,
  Red,
  BwRed,
}

impl IndexSource {
  #[inline]
  fn index(&self, rgb: &[u8], width: usize, x: usize, y: usize) -> u8 {
    let p = 3 * (y * width + x);
    match self {
      Self::Table { indexes, .. } => indexes[y * width + x],
      Self::Grey => {
        let luma = 0.299 * f64::from(rgb[p])
          + 0.587 * f64::from(rgb[p + 1])
          + 0.114 * f64::from(rgb[p + 2]);
        luma.round() as u8
      }
      Self::Red => rgb[p],
      Self::BwRed => u8::from(rgb[p] >= 128),
      Self::None => 0,
    }
  }
}

/// Writes `image` as a DIB.
///
/// `is_bmp` prepends the 14-byte BMP file header; without it the output is
/// the bare payload an icon entry stores. `is_mask` writes pixel rows only —
/// the AND plane of an icon shares the info header of the color plane that
/// precedes it.
pub(crate) fn encode_dib(
  image: &Image, w: &mut impl Write, format: BmpFormat, quantizer: Option<&dyn Quantizer>,
  is_bmp: bool, is_mask: bool,
) -> DibResult<()> {
  let width = image.width() as usize;
  let height = image.height() as usize;

  // Icon frames with alpha always store 32-bit ARGB, whatever was asked.
  let save_alpha = !is_bmp && image.has_alpha();
  let format = if save_alpha { BmpFormat::Rgba32 } else { format };
  let bpp = format.bits_per_pixel();
  let palette_len = format.palette_len();
  let stride = padded_bytes_per_line(width, bpp);
  let image_bytes = stride * height;

  if is_bmp {
    let data_offset = 14 + 40 + 4 * palette_len;
    w.write_all(b"BM")?;
    w.write_u32::<LittleEndian>((data_offset + image_bytes) as u32)?;
    w.write_u32::<LittleEndian>(0)?;
    w.write_u32::<LittleEndian>(data_offset as u32)?;
  }
  if !is_mask {
    write_info_header(
      w,
      image.width(),
      image.height(),
      !is_bmp,
      bpp,
      palette_len as u32,
      image_bytes as u32,
      image.resolution(),
    )?;
  }

  let source = match format {
    BmpFormat::Rgb24 | BmpFormat::Rgba32 => IndexSource::None,
    BmpFormat::Pal1 | BmpFormat::Pal4 | BmpFormat::Pal8 => {
      let quantizer = quantizer.ok_or_else(|| {
        log::error!("format {format:?} needs a quantizer and none was supplied");
        DibError::MissingPalette
      })?;
      let target = palette_len.min(QUANTIZE_COLOR_CAP);
      let (indexes, palette) =
        quantizer.quantize(image.data(), image.width(), image.height(), target)?;
      if indexes.len() != width * height || palette.len() > palette_len {
        log::error!("quantizer returned a malformed result");
        return Err(DibError::MissingPalette);
      }
      IndexSource::Table { indexes, palette }
    }
    BmpFormat::Pal8Given => {
      let palette = image.palette().cloned().ok_or_else(|| {
        log::error!("Pal8Given needs a palette attached to the image");
        DibError::MissingPalette
      })?;
      let indexes = image
        .data()
        .chunks_exact(3)
        .map(|px| palette.index_of([px[0], px[1], px[2]]).unwrap_or(0))
        .collect();
      IndexSource::Table { indexes, palette }
    }
    BmpFormat::Pal1Bw => IndexSource::BwRed,
    BmpFormat::Pal8Grey => IndexSource::Grey,
    BmpFormat::Pal8Red => IndexSource::Red,
  };

  if palette_len > 0 && !is_mask {
    for i in 0..palette_len {
      let [red, green, blue] = match &source {
        IndexSource::Table { palette, .. } => palette.get(i).unwrap_or([0, 0, 0]),
        IndexSource::BwRed => {
          if i > 0 {
            [255, 255, 255]
          } else {
            [0, 0, 0]
          }
        }
        // The grey ramps: entry i is (i, i, i).
        _ => [i as u8; 3],
      };
      w.write_all(&[blue, green, red, 0])?;
    }
  }

  let data = image.data();
  let alpha = image.alpha();
  let mut row_buf = try_alloc_zeroed(stride)?;
  for y in (0..height).rev() {
    row_buf.fill(0);
    match format {
      BmpFormat::Rgb24 | BmpFormat::Rgba32 => {
        let px_len = if bpp == 32 { 4 } else { 3 };
        for x in 0..width {
          let p = 3 * (y * width + x);
          row_buf[px_len * x] = data[p + 2];
          row_buf[px_len * x + 1] = data[p + 1];
          row_buf[px_len * x + 2] = data[p];
          if px_len == 4 {
            row_buf[px_len * x + 3] = alpha.map_or(0xFF, |a| a[y * width + x]);
          }
        }
      }
      BmpFormat::Pal4 => {
        for x in 0..width {
          let index = source.index(data, width, x, y) & 0b1111;
          row_buf[x / 2] |= index << (4 * (1 - x % 2));
        }
      }
      BmpFormat::Pal1 | BmpFormat::Pal1Bw => {
        for x in 0..width {
          let index = source.index(data, width, x, y) & 1;
          row_buf[x / 8] |= index << (7 - x % 8);
        }
      }
      _ => {
        for x in 0..width {
          row_buf[x] = source.index(data, width, x, y);
        }
      }
    }
    w.write_all(&row_buf)?;
  }
  Ok(())
}
