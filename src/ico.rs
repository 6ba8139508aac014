//! The ICO and CUR containers: a directory of entries, each pointing at a
//! DIB payload (or a PNG blob for large frames).

use std::io::{Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::{
  decode_dib, encode_dib, util::skip_forward, BmpFormat, Compression, DibError, DibHeader,
  DibResult, Image, Quantizer, Resolution, ResolutionUnit,
};

/// The PNG file signature. An icon entry whose payload starts with these
/// bytes holds a PNG frame instead of a DIB.
pub const PNG_SIGNATURE: [u8; 8] = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];

/// Icon or cursor.
///
/// The two formats are byte-for-byte identical except for the directory
/// type code and two entry fields that hold planes/bit count for icons but
/// the hotspot position for cursors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IconKind {
  /// An icon file (directory type 1).
  Ico,
  /// A cursor file (directory type 2).
  Cur,
}

impl IconKind {
  #[inline]
  #[must_use]
  const fn type_code(self) -> u16 {
    match self {
      Self::Ico => 1,
      Self::Cur => 2,
    }
  }
}

/// The seam where an external PNG library plugs in.
///
/// Only icon frames over 128 pixels use PNG, so plenty of icon work never
/// needs one of these at all.
pub trait PngCodec {
  /// Decodes one PNG image from the stream.
  fn read_png(&self, reader: &mut dyn Read) -> DibResult<Image>;
  /// Encodes `image` to the stream as PNG.
  fn write_png(&self, image: &Image, writer: &mut dyn Write) -> DibResult<()>;
}

/// One parsed directory entry.
#[allow(dead_code)]
struct DirEntry {
  width: u8,
  height: u8,
  color_count: u8,
  planes: u16,
  bit_count: u16,
  bytes_in_res: u32,
  image_offset: u32,
}

fn read_entry(r: &mut impl Read) -> DibResult<DirEntry> {
  let width = r.read_u8()?;
  let height = r.read_u8()?;
  let color_count = r.read_u8()?;
  let _reserved = r.read_u8()?;
  Ok(DirEntry {
    width,
    height,
    color_count,
    planes: r.read_u16::<LittleEndian>()?,
    bit_count: r.read_u16::<LittleEndian>()?,
    bytes_in_res: r.read_u32::<LittleEndian>()?,
    image_offset: r.read_u32::<LittleEndian>()?,
  })
}

/// Checks if the bytes start like an icon/cursor directory of the given
/// kind: zero reserved field, matching type code, at least one entry.
#[inline]
#[must_use]
pub fn ico_signature_is_correct(bytes: &[u8], kind: IconKind) -> bool {
  match bytes {
    [0, 0, t0, t1, c0, c1, ..] => {
      u16::from_le_bytes([*t0, *t1]) == kind.type_code()
        && u16::from_le_bytes([*c0, *c1]) > 0
    }
    _ => false,
  }
}

/// Reads the entry count out of an icon/cursor directory.
pub fn ico_entry_count(reader: &mut impl Read) -> DibResult<u16> {
  let _reserved = reader.read_u16::<LittleEndian>()?;
  let _type_code = reader.read_u16::<LittleEndian>()?;
  Ok(reader.read_u16::<LittleEndian>()?)
}

/// Reads one image out of an icon or cursor file.
///
/// With `index` of `None` the best entry is chosen: widest first, then the
/// one with the most colors (an entry color count of 0 means "more than
/// 255"). An explicit index is bounds-checked. Cursor files record the
/// selected entry's hotspot on the returned image.
///
/// PNG frames are handed to `png`; without a codec they fail with
/// [`UnsupportedCompression`](DibError::UnsupportedCompression).
pub fn ico_read(
  reader: &mut impl Read, kind: IconKind, index: Option<usize>, png: Option<&dyn PngCodec>,
) -> DibResult<Image> {
  let _reserved = reader.read_u16::<LittleEndian>()?;
  let file_type = reader.read_u16::<LittleEndian>()?;
  let count = reader.read_u16::<LittleEndian>()?;

  let mut entries = Vec::new();
  entries.try_reserve_exact(usize::from(count))?;
  for _ in 0..count {
    entries.push(read_entry(reader)?);
  }
  let consumed = 6 + 16 * u64::from(count);

  // Pick the best entry: largest width, ties broken by color count.
  let mut best = None;
  let mut max_width = 0_u16;
  let mut max_colors = 0_u8;
  for (i, entry) in entries.iter().enumerate() {
    // A single-byte width of 0 means 256 pixels.
    let real_width = if entry.width == 0 { 256 } else { u16::from(entry.width) };
    if real_width >= max_width {
      let colors = if entry.color_count == 0 { 255 } else { entry.color_count };
      if colors >= max_colors {
        best = Some(i);
        max_width = real_width;
        max_colors = colors;
      }
    }
  }

  let selected = match index {
    Some(i) => i,
    None => best.unwrap_or(0),
  };
  let entry = entries.get(selected).ok_or_else(|| {
    log::error!("icon index {selected} out of range (file has {count} entries)");
    DibError::BadHeader
  })?;

  let offset = u64::from(entry.image_offset);
  if offset < consumed {
    log::error!("icon entry offset {offset} points back into the directory");
    return Err(DibError::BadHeader);
  }
  skip_forward(reader, offset - consumed)?;

  // Sniff the payload. The peeked bytes are chained back in front of the
  // stream so this works without seeking.
  let mut signature = [0_u8; 8];
  reader.read_exact(&mut signature)?;
  let mut payload = (&signature[..]).chain(reader);

  let mut image = if signature == PNG_SIGNATURE {
    let codec = png.ok_or_else(|| {
      log::error!("entry holds a PNG frame and no PNG codec was supplied");
      DibError::UnsupportedCompression
    })?;
    codec.read_png(&mut payload)?
  } else {
    let (header, _consumed) = DibHeader::parse(&mut payload, true)?;
    let mut image = decode_dib(&header, &mut payload, true)?;

    // The color plane is followed by the 1-bit AND mask, stored as a second
    // bitmap with an implicit black/white palette. White marks transparent.
    let mask_header = DibHeader {
      width: header.width,
      height: header.height,
      top_down: header.top_down,
      bpp: 1,
      compression: Compression::Rgb,
      ncolors: 2,
      resolution_ppcm: None,
      palette: None,
    };
    let mask = decode_dib(&mask_header, &mut payload, true).map_err(|e| {
      log::error!("icon mask plane failed to decode");
      e
    })?;
    image.set_mask_from_image(&mask, 255, 255, 255)?;

    if let Some((x, y)) = header.resolution_ppcm {
      image.set_resolution(Resolution { unit: ResolutionUnit::Centimeters, x, y });
    }
    image
  };

  if kind == IconKind::Cur && file_type == 2 {
    image.set_hotspot(entry.planes, entry.bit_count);
  }
  Ok(image)
}

/// Writes `image` as a single-entry icon or cursor file.
///
/// The bit depth is picked from the image's color count (alpha forces
/// 32-bit). Frames over 128 pixels in either direction are stored as PNG
/// via `png`; everything else is a DIB followed by its 1-bit mask plane,
/// built from the image's mask color (or all-opaque when there is none).
/// Cursors store their hotspot, defaulting to the image center.
pub fn ico_write(
  image: &Image, writer: &mut impl Write, kind: IconKind, quantizer: Option<&dyn Quantizer>,
  png: Option<&dyn PngCodec>,
) -> DibResult<()> {
  if image.width() > 256 || image.height() > 256 {
    log::error!("{}x{} is too large for an icon entry", image.width(), image.height());
    return Err(DibError::BadHeader);
  }

  // The payload stores masked-out pixels as black, so work on a copy with
  // the sentinel color painted over, plus a mono image of the mask itself.
  let mut work = image.clone();
  let mask = match image.mask_color() {
    Some([mr, mg, mb]) => {
      let mask = image.convert_to_mono(mr, mg, mb)?;
      if [mr, mg, mb] != [0, 0, 0] {
        for px in work.data_mut().chunks_exact_mut(3) {
          if px[..] == [mr, mg, mb] {
            px.copy_from_slice(&[0, 0, 0]);
          }
        }
      }
      mask
    }
    // No mask: an all-black mono plane, i.e. fully opaque.
    None => Image::new(image.width(), image.height())?,
  };

  let colors = work.count_colors(257);
  let format = if work.has_alpha() {
    BmpFormat::Rgba32
  } else if colors > 256 {
    BmpFormat::Rgb24
  } else if colors > 16 {
    BmpFormat::Pal8
  } else if colors > 2 {
    BmpFormat::Pal4
  } else {
    BmpFormat::Pal1
  };
  let bpp = format.bits_per_pixel();

  let mut payload: Vec<u8> = Vec::new();
  if work.width() > 128 || work.height() > 128 {
    let codec = png.ok_or_else(|| {
      log::error!("frames over 128 pixels are stored as PNG and no PNG codec was supplied");
      DibError::UnsupportedCompression
    })?;
    codec.write_png(&work, &mut payload)?;
  } else {
    encode_dib(&work, &mut payload, format, quantizer, false, false)?;
    encode_dib(&mask, &mut payload, BmpFormat::Pal1Bw, None, false, true)?;
  }

  writer.write_u16::<LittleEndian>(0)?;
  writer.write_u16::<LittleEndian>(kind.type_code())?;
  writer.write_u16::<LittleEndian>(1)?;

  // 256 comes out as 0 in the single-byte size fields, which is exactly
  // what the format wants.
  writer.write_u8(image.width() as u8)?;
  writer.write_u8(image.height() as u8)?;
  writer.write_u8(0)?; // color count: not filled in
  writer.write_u8(0)?; // reserved
  let (planes_or_x, bits_or_y) = match kind {
    IconKind::Ico => (1, bpp),
    IconKind::Cur => image
      .hotspot()
      .unwrap_or(((image.width() / 2) as u16, (image.height() / 2) as u16)),
  };
  writer.write_u16::<LittleEndian>(planes_or_x)?;
  writer.write_u16::<LittleEndian>(bits_or_y)?;
  writer.write_u32::<LittleEndian>(payload.len() as u32)?;
  writer.write_u32::<LittleEndian>(6 + 16)?;
  writer.write_all(&payload)?;
  Ok(())
}
