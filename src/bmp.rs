//! Reading and writing whole BMP files.

use std::io::{Read, Write};

use byteorder::{LittleEndian, ReadBytesExt};

use crate::{
  decode_dib, encode_dib, util::skip_forward, BmpFormat, DibError, DibHeader, DibResult, Image,
  Quantizer, Resolution, ResolutionUnit,
};

/// Checks if the bytes start with the BMP file signature.
#[inline]
#[must_use]
pub fn bmp_signature_is_correct(bytes: &[u8]) -> bool {
  matches!(bytes, [b'B', b'M', ..])
}

/// Reads one BMP file from the stream into a freshly allocated [`Image`].
///
/// On success the read cursor has advanced exactly past the pixel data.
/// Paletted files carry their palette on the returned image, and headers
/// with resolution fields set the image's resolution option (in
/// centimeters — the header stores pixels per meter).
pub fn bmp_read(reader: &mut impl Read) -> DibResult<Image> {
  let mut magic = [0_u8; 2];
  reader.read_exact(&mut magic)?;
  if &magic != b"BM" {
    log::error!("BMP: signature mismatch");
    return Err(DibError::BadMagic);
  }
  let _file_size = reader.read_u32::<LittleEndian>()?;
  let _reserved = reader.read_u32::<LittleEndian>()?;
  let pixel_offset = u64::from(reader.read_u32::<LittleEndian>()?);

  let (header, consumed) = DibHeader::parse(reader, false)?;

  // Some writers leave a gap between the color table and the pixel data.
  let position = 14 + consumed;
  if position < pixel_offset {
    skip_forward(reader, pixel_offset - position)?;
  }

  let mut image = decode_dib(&header, reader, false)?;
  if let Some((x, y)) = header.resolution_ppcm {
    image.set_resolution(Resolution { unit: ResolutionUnit::Centimeters, x, y });
  }
  Ok(image)
}

/// Writes `image` to the stream as a BMP file in the given format.
///
/// The quantized formats (`Pal1`, `Pal4`, `Pal8`) need a [`Quantizer`];
/// every other format ignores that argument.
pub fn bmp_write(
  image: &Image, writer: &mut impl Write, format: BmpFormat, quantizer: Option<&dyn Quantizer>,
) -> DibResult<()> {
  encode_dib(image, writer, format, quantizer, true, false)
}
