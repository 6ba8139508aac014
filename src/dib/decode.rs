//! Turning a parsed [`DibHeader`] plus pixel bytes into an [`Image`].

use std::io::Read;

use bitfrob::U8BitIterHigh;
use byteorder::ReadBytesExt;

use super::{data_bytes_per_line, padded_bytes_per_line, Compression, DibHeader};
use crate::{
  util::{skip_available, try_alloc_zeroed},
  BitFields, DibError, DibResult, Image,
};

/// Decodes the pixel data described by `header` into a fresh image.
///
/// The stream must be positioned at the first pixel byte. `is_icon` switches
/// the implicit 32-bit layout to the one with alpha in the top byte, which
/// icon payloads use and plain BMP files don't.
pub(crate) fn decode_dib(
  header: &DibHeader, r: &mut impl Read, is_icon: bool,
) -> DibResult<Image> {
  let width = header.width as usize;
  let height = header.height as usize;
  let rgb_len = width
    .checked_mul(height)
    .and_then(|n| n.checked_mul(3))
    .ok_or(DibError::AllocFailed)?;
  let mut rgb = try_alloc_zeroed(rgb_len)?;

  // A full-size color table makes every index lookup safe: entries past the
  // real palette come out black. Icon mask planes carry no palette at all
  // and get the implicit black/white pair.
  let mut cmap = [[0_u8; 3]; 256];
  if header.bpp < 16 {
    match &header.palette {
      Some(palette) => {
        for (dst, src) in cmap.iter_mut().zip(palette.entries()) {
          *dst = *src;
        }
      }
      None => cmap[1] = [255, 255, 255],
    }
  }

  let fields = match header.compression {
    Compression::Bitfields { r_mask, g_mask, b_mask, a_mask } => {
      BitFields::from_masks(r_mask, g_mask, b_mask, a_mask)
    }
    _ if header.bpp == 32 => BitFields::xrgb8888(is_icon),
    _ => BitFields::xrgb1555(),
  };
  let mut alpha = if header.bpp == 32 && fields.a.is_some() {
    Some(try_alloc_zeroed(width.checked_mul(height).ok_or(DibError::AllocFailed)?)?)
  } else {
    None
  };

  // RLE data doesn't have to mention every pixel: anything left untouched
  // shows the color of the first table entry.
  if header.compression.is_rle() {
    for px in rgb.chunks_exact_mut(3) {
      px.copy_from_slice(&cmap[0]);
    }
  }

  let mut any_alpha = false;
  match header.compression {
    Compression::Rle8 => decode_rle(header, r, &mut rgb, &cmap, false)?,
    Compression::Rle4 => decode_rle(header, r, &mut rgb, &cmap, true)?,
    _ => any_alpha = decode_rows(header, r, &mut rgb, alpha.as_deref_mut(), &cmap, fields)?,
  }

  let mut image = Image::from_planes(header.width, header.height, rgb)?;
  if let Some(plane) = alpha {
    // An alpha plane with every sample zero would make the whole image
    // invisible; such files are really opaque images with a dead channel.
    if any_alpha {
      image.set_alpha_plane(plane)?;
    }
  }
  if header.bpp < 16 {
    if let Some(palette) = &header.palette {
      image.set_palette(palette.clone());
    }
  }
  Ok(image)
}

/// Uncompressed rows, all depths. Returns whether any non-zero alpha sample
/// was seen.
fn decode_rows(
  header: &DibHeader, r: &mut impl Read, rgb: &mut [u8], mut alpha: Option<&mut [u8]>,
  cmap: &[[u8; 3]; 256], fields: BitFields,
) -> DibResult<bool> {
  let width = header.width as usize;
  let height = header.height as usize;
  let data_len = data_bytes_per_line(width, header.bpp);
  let pad_len = (padded_bytes_per_line(width, header.bpp) - data_len) as u64;
  let mut row_buf = try_alloc_zeroed(data_len)?;
  let mut any_alpha = false;

  for row in 0..height {
    r.read_exact(&mut row_buf)?;
    let line = if header.top_down { row } else { height - 1 - row };
    let out = &mut rgb[3 * line * width..3 * (line + 1) * width];
    match header.bpp {
      1 | 4 => {
        let count = u32::from(header.bpp);
        let indexes = row_buf
          .iter()
          .copied()
          .flat_map(move |bits| U8BitIterHigh::from_count_and_bits(count, bits))
          .take(width);
        for (dst, index) in out.chunks_exact_mut(3).zip(indexes) {
          dst.copy_from_slice(&cmap[usize::from(index)]);
        }
      }
      8 => {
        for (dst, &index) in out.chunks_exact_mut(3).zip(row_buf.iter()) {
          dst.copy_from_slice(&cmap[usize::from(index)]);
        }
      }
      16 => {
        for (dst, chunk) in out.chunks_exact_mut(3).zip(row_buf.chunks_exact(2)) {
          let raw = u32::from(u16::from_le_bytes(chunk.try_into().unwrap_or_default()));
          dst[0] = fields.r.sample(raw);
          dst[1] = fields.g.sample(raw);
          dst[2] = fields.b.sample(raw);
        }
      }
      24 => {
        for (dst, chunk) in out.chunks_exact_mut(3).zip(row_buf.chunks_exact(3)) {
          dst[0] = chunk[2];
          dst[1] = chunk[1];
          dst[2] = chunk[0];
        }
      }
      _ => {
        for (x, (dst, chunk)) in out.chunks_exact_mut(3).zip(row_buf.chunks_exact(4)).enumerate() {
          let raw = u32::from_le_bytes(chunk.try_into().unwrap_or_default());
          dst[0] = fields.r.sample(raw);
          dst[1] = fields.g.sample(raw);
          dst[2] = fields.b.sample(raw);
          if let (Some(plane), Some(af)) = (alpha.as_deref_mut(), fields.a) {
            let a = af.sample(raw);
            plane[line * width + x] = a;
            any_alpha |= a != 0;
          }
        }
      }
    }
    // Padding may legitimately be missing at the very end of the file.
    skip_available(r, pad_len)?;
  }
  Ok(any_alpha)
}

/// The RLE4/RLE8 state machine.
///
/// Both encodings read `(count, value)` byte pairs. A non-zero count is a
/// run of `value` (4 bpp: its two nibbles, alternating). A zero count makes
/// the second byte an escape: end-of-line, end-of-bitmap, a positional
/// delta, or an absolute sequence of `value` raw indexes padded to an even
/// byte count.
///
/// RLE never touches every pixel, so the caller pre-fills the image with
/// color table entry 0 before decoding begins.
fn decode_rle(
  header: &DibHeader, r: &mut impl Read, rgb: &mut [u8], cmap: &[[u8; 3]; 256], is_rle4: bool,
) -> DibResult<()> {
  let width = header.width as usize;
  let height = header.height as usize;
  let line_of = |row: usize| if header.top_down { row } else { height - 1 - row };

  let mut row = 0_usize;
  'bitmap: while row < height {
    let mut line = line_of(row);
    let mut column = 0_usize;
    while column < width {
      let first = r.read_u8()?;
      let second = r.read_u8()?;
      if first == 0 {
        match second {
          0 => {
            // End of line. When the previous op already filled the row the
            // advance has happened implicitly and the marker does nothing.
            if column != 0 {
              column = width;
            }
          }
          1 => break 'bitmap,
          2 => {
            let right = usize::from(r.read_u8()?);
            let down = usize::from(r.read_u8()?);
            column += right;
            row += down;
            if row >= height {
              log::error!("RLE delta moved past the bottom of the image");
              return Err(DibError::BadRle);
            }
            line = line_of(row);
          }
          count => {
            // Absolute mode: `count` raw indexes, padded to an even number
            // of bytes read.
            let count = usize::from(count);
            if is_rle4 {
              let mut pair = [0_u8; 2];
              let mut bytes_read = 0_usize;
              for k in 0..count {
                if k % 2 == 0 {
                  let byte = r.read_u8()?;
                  bytes_read += 1;
                  pair = [byte >> 4, byte & 0b1111];
                }
                put_indexed(rgb, cmap, width, line, &mut column, pair[k % 2]);
              }
              if bytes_read % 2 == 1 {
                let _pad = r.read_u8()?;
              }
            } else {
              for _ in 0..count {
                let index = r.read_u8()?;
                put_indexed(rgb, cmap, width, line, &mut column, index);
              }
              if count % 2 == 1 {
                let _pad = r.read_u8()?;
              }
            }
          }
        }
      } else {
        // A run, clipped at the right edge.
        let count = usize::from(first);
        if is_rle4 {
          let pair = [second >> 4, second & 0b1111];
          for k in 0..count {
            if column >= width {
              break;
            }
            put_indexed(rgb, cmap, width, line, &mut column, pair[k % 2]);
          }
        } else {
          for _ in 0..count {
            if column >= width {
              break;
            }
            put_indexed(rgb, cmap, width, line, &mut column, second);
          }
        }
      }
    }
    row += 1;
  }
  Ok(())
}

#[inline]
fn put_indexed(
  rgb: &mut [u8], cmap: &[[u8; 3]; 256], width: usize, line: usize, column: &mut usize, index: u8,
) {
  if *column < width {
    let o = 3 * (line * width + *column);
    rgb[o..o + 3].copy_from_slice(&cmap[usize::from(index)]);
  }
  *column += 1;
}
