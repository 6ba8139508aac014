use dibkit::*;

use crate::{rand_image, ExactQuantizer};

fn encode(image: &Image, format: BmpFormat) -> Vec<u8> {
  let mut out = Vec::new();
  bmp_write(image, &mut out, format, Some(&ExactQuantizer)).unwrap();
  out
}

fn decode(bytes: &[u8]) -> Image {
  bmp_read(&mut &bytes[..]).unwrap()
}

/// Hand-assembles a BMP file around a 40-byte info header.
fn bmp(
  width: i32, height: i32, bpp: u16, comp: u32, ncolors: u32, palette: &[u8], pixels: &[u8],
) -> Vec<u8> {
  let data_offset = 14 + 40 + palette.len();
  let mut f = Vec::new();
  f.extend_from_slice(b"BM");
  f.extend_from_slice(&((data_offset + pixels.len()) as u32).to_le_bytes());
  f.extend_from_slice(&0_u32.to_le_bytes());
  f.extend_from_slice(&(data_offset as u32).to_le_bytes());
  f.extend_from_slice(&40_u32.to_le_bytes());
  f.extend_from_slice(&width.to_le_bytes());
  f.extend_from_slice(&height.to_le_bytes());
  f.extend_from_slice(&1_u16.to_le_bytes());
  f.extend_from_slice(&bpp.to_le_bytes());
  f.extend_from_slice(&comp.to_le_bytes());
  f.extend_from_slice(&(pixels.len() as u32).to_le_bytes());
  f.extend_from_slice(&0_i32.to_le_bytes());
  f.extend_from_slice(&0_i32.to_le_bytes());
  f.extend_from_slice(&ncolors.to_le_bytes());
  f.extend_from_slice(&0_u32.to_le_bytes());
  f.extend_from_slice(palette);
  f.extend_from_slice(pixels);
  f
}

#[test]
fn signature_probe() {
  assert!(bmp_signature_is_correct(b"BM\x3a\x00\x00\x00"));
  assert!(!bmp_signature_is_correct(b"MB"));
  assert!(!bmp_signature_is_correct(b"B"));
}

#[test]
fn decodes_a_minimal_single_pixel_file() {
  let file = bmp(1, 1, 24, 0, 0, &[], &[0xFF, 0, 0, 0]);
  assert_eq!(file.len(), 0x3A);
  let image = decode(&file);
  assert_eq!((image.width(), image.height()), (1, 1));
  assert_eq!(image.get(0, 0).unwrap(), [0, 0, 0xFF]);
}

#[test]
fn decodes_24bpp_rows_with_padding() {
  let pixels = [
    90, 80, 70, 120, 110, 100, 0, 0, // bottom row
    30, 20, 10, 60, 50, 40, 0, 0, // top row
  ];
  let image = decode(&bmp(2, 2, 24, 0, 0, &[], &pixels));
  assert_eq!(image.get(0, 0).unwrap(), [10, 20, 30]);
  assert_eq!(image.get(1, 0).unwrap(), [40, 50, 60]);
  assert_eq!(image.get(0, 1).unwrap(), [70, 80, 90]);
  assert_eq!(image.get(1, 1).unwrap(), [100, 110, 120]);
}

#[test]
fn decodes_4bpp_high_nibble_first() {
  let palette = [
    0, 0, 0, 0, //
    255, 255, 255, 0, //
    0, 0, 255, 0, //
    0, 255, 0, 0,
  ];
  let image = decode(&bmp(4, 1, 4, 0, 4, &palette, &[0x12, 0x30, 0, 0]));
  assert_eq!(image.get(0, 0).unwrap(), [255, 255, 255]);
  assert_eq!(image.get(1, 0).unwrap(), [255, 0, 0]);
  assert_eq!(image.get(2, 0).unwrap(), [0, 255, 0]);
  assert_eq!(image.get(3, 0).unwrap(), [0, 0, 0]);
  assert_eq!(image.palette().unwrap().len(), 4);
}

#[test]
fn decodes_rle8_runs() {
  let palette = [0, 0, 0, 0, 0, 0, 255, 0, 0, 255, 0, 0];
  let pixels = [0x02, 0x01, 0x02, 0x02, 0x00, 0x00, 0x00, 0x01];
  let image = decode(&bmp(4, 1, 8, 1, 3, &palette, &pixels));
  assert_eq!(image.get(0, 0).unwrap(), [255, 0, 0]);
  assert_eq!(image.get(1, 0).unwrap(), [255, 0, 0]);
  assert_eq!(image.get(2, 0).unwrap(), [0, 255, 0]);
  assert_eq!(image.get(3, 0).unwrap(), [0, 255, 0]);
}

#[test]
fn decodes_rle4_run_nibbles_alternating() {
  let palette = [0, 0, 0, 0, 0, 0, 255, 0, 0, 255, 0, 0];
  let pixels = [0x04, 0x12, 0x00, 0x01];
  let image = decode(&bmp(4, 1, 4, 2, 3, &palette, &pixels));
  assert_eq!(image.get(0, 0).unwrap(), [255, 0, 0]);
  assert_eq!(image.get(1, 0).unwrap(), [0, 255, 0]);
  assert_eq!(image.get(2, 0).unwrap(), [255, 0, 0]);
  assert_eq!(image.get(3, 0).unwrap(), [0, 255, 0]);
}

#[test]
fn decodes_rle4_absolute_mode() {
  let palette = [
    0, 0, 0, 0, //
    0, 0, 255, 0, //
    0, 255, 0, 0, //
    255, 0, 0, 0,
  ];
  // Absolute run of 3 nibbles, then end-of-line and end-of-bitmap.
  let pixels = [0x00, 0x03, 0x12, 0x30, 0x00, 0x00, 0x00, 0x01];
  let image = decode(&bmp(4, 1, 4, 2, 4, &palette, &pixels));
  assert_eq!(image.get(0, 0).unwrap(), [255, 0, 0]);
  assert_eq!(image.get(1, 0).unwrap(), [0, 255, 0]);
  assert_eq!(image.get(2, 0).unwrap(), [0, 0, 255]);
  // Never written: keeps the background, which is palette entry 0.
  assert_eq!(image.get(3, 0).unwrap(), [0, 0, 0]);
}

#[test]
fn rle_background_is_first_palette_entry() {
  let palette = [7, 8, 9, 0, 0, 0, 255, 0];
  // One single-pixel run at the start of the bottom row, then stop.
  let pixels = [0x01, 0x01, 0x00, 0x01];
  let image = decode(&bmp(4, 2, 8, 1, 2, &palette, &pixels));
  for y in 0..2 {
    for x in 0..4 {
      let expected = if (x, y) == (0, 1) { [255, 0, 0] } else { [9, 8, 7] };
      assert_eq!(image.get(x, y).unwrap(), expected, "pixel ({x},{y})");
    }
  }
}

#[test]
fn rle_delta_past_the_bottom_fails() {
  let palette = [0, 0, 0, 0, 255, 255, 255, 0];
  let pixels = [0x00, 0x02, 0x00, 0x05];
  let err = bmp_read(&mut &bmp(4, 2, 8, 1, 2, &palette, &pixels)[..]).unwrap_err();
  assert_eq!(err, DibError::BadRle);
}

#[test]
fn sixteen_bit_samples_replicate_to_eight() {
  // XRGB1555 red values 31, 0, 16.
  let pixels = [0x00, 0x7C, 0x00, 0x00, 0x00, 0x40, 0, 0];
  let image = decode(&bmp(3, 1, 16, 0, 0, &[], &pixels));
  assert_eq!(image.get(0, 0).unwrap(), [255, 0, 0]);
  assert_eq!(image.get(1, 0).unwrap(), [0, 0, 0]);
  assert_eq!(image.get(2, 0).unwrap(), [132, 0, 0]);
}

#[test]
fn thirty_two_bit_bitfields_in_a_bmp_have_no_alpha() {
  let mut f = Vec::new();
  f.extend_from_slice(b"BM");
  f.extend_from_slice(&70_u32.to_le_bytes());
  f.extend_from_slice(&0_u32.to_le_bytes());
  f.extend_from_slice(&66_u32.to_le_bytes());
  f.extend_from_slice(&40_u32.to_le_bytes());
  f.extend_from_slice(&1_i32.to_le_bytes());
  f.extend_from_slice(&1_i32.to_le_bytes());
  f.extend_from_slice(&1_u16.to_le_bytes());
  f.extend_from_slice(&32_u16.to_le_bytes());
  f.extend_from_slice(&3_u32.to_le_bytes());
  f.extend_from_slice(&4_u32.to_le_bytes());
  f.extend_from_slice(&[0; 16]);
  f.extend_from_slice(&0x00FF_0000_u32.to_le_bytes());
  f.extend_from_slice(&0x0000_FF00_u32.to_le_bytes());
  f.extend_from_slice(&0x0000_00FF_u32.to_le_bytes());
  f.extend_from_slice(&0x8051_4263_u32.to_le_bytes());
  let image = decode(&f);
  assert_eq!(image.get(0, 0).unwrap(), [0x51, 0x42, 0x63]);
  assert!(!image.has_alpha());
}

#[test]
fn top_down_and_bottom_up_decode_the_same() {
  let top_row = [30, 20, 10, 60, 50, 40, 0, 0];
  let bottom_row = [90, 80, 70, 120, 110, 100, 0, 0];
  let mut bottom_up = Vec::new();
  bottom_up.extend_from_slice(&bottom_row);
  bottom_up.extend_from_slice(&top_row);
  let mut top_down = Vec::new();
  top_down.extend_from_slice(&top_row);
  top_down.extend_from_slice(&bottom_row);
  let a = decode(&bmp(2, 2, 24, 0, 0, &[], &bottom_up));
  let b = decode(&bmp(2, -2, 24, 0, 0, &[], &top_down));
  assert_eq!(a.data(), b.data());
}

#[test]
fn gap_before_the_pixel_data_is_skipped() {
  let mut f = Vec::new();
  f.extend_from_slice(b"BM");
  f.extend_from_slice(&62_u32.to_le_bytes());
  f.extend_from_slice(&0_u32.to_le_bytes());
  f.extend_from_slice(&58_u32.to_le_bytes()); // 4 junk bytes before the pixels
  f.extend_from_slice(&40_u32.to_le_bytes());
  f.extend_from_slice(&1_i32.to_le_bytes());
  f.extend_from_slice(&1_i32.to_le_bytes());
  f.extend_from_slice(&1_u16.to_le_bytes());
  f.extend_from_slice(&24_u16.to_le_bytes());
  f.extend_from_slice(&[0; 24]);
  f.extend_from_slice(&[0xEE; 4]); // the junk
  f.extend_from_slice(&[1, 2, 3, 0]);
  let image = decode(&f);
  assert_eq!(image.get(0, 0).unwrap(), [3, 2, 1]);
}

#[test]
fn round_trip_24bpp() {
  for (w, h) in [(1, 1), (2, 2), (3, 3), (5, 4), (16, 16), (31, 7), (256, 3)] {
    let image = rand_image(w, h);
    let decoded = decode(&encode(&image, BmpFormat::Rgb24));
    assert_eq!(image.data(), decoded.data(), "{w}x{h}");
  }
}

#[test]
fn round_trip_given_palette() {
  let palette =
    Palette::from_entries(&[[0, 0, 0], [255, 255, 255], [10, 20, 30], [200, 0, 100]]);
  let mut rgb = Vec::new();
  for i in 0..5 * 3 {
    rgb.extend_from_slice(&palette.get(i % 4).unwrap());
  }
  let mut image = Image::from_planes(5, 3, rgb).unwrap();
  image.set_palette(palette);
  let decoded = decode(&encode(&image, BmpFormat::Pal8Given));
  assert_eq!(image.data(), decoded.data());
  assert_eq!(decoded.palette().unwrap().len(), 256);
}

#[test]
fn round_trip_quantized() {
  // Two colors for 1-bit, five for 4-bit, a hundred for 8-bit.
  let colors_2: Vec<[u8; 3]> = vec![[0, 0, 0], [200, 100, 50]];
  let colors_5: Vec<[u8; 3]> =
    vec![[1, 2, 3], [4, 5, 6], [7, 8, 9], [10, 11, 12], [13, 14, 15]];
  let colors_100: Vec<[u8; 3]> = (0..100_u8).map(|j| [j, j + 50, 255 - j]).collect();
  for (colors, format) in
    [(colors_2, BmpFormat::Pal1), (colors_5, BmpFormat::Pal4), (colors_100, BmpFormat::Pal8)]
  {
    let mut rgb = Vec::new();
    for i in 0..9 * 4 {
      rgb.extend_from_slice(&colors[i % colors.len()]);
    }
    let image = Image::from_planes(9, 4, rgb).unwrap();
    let decoded = decode(&encode(&image, format));
    assert_eq!(image.data(), decoded.data(), "{format:?}");
  }
}

#[test]
fn grey_output_is_luma_weighted() {
  let image = rand_image(13, 5);
  let decoded = decode(&encode(&image, BmpFormat::Pal8Grey));
  for (src, dst) in image.data().chunks_exact(3).zip(decoded.data().chunks_exact(3)) {
    let luma = (0.299 * f64::from(src[0]) + 0.587 * f64::from(src[1]) + 0.114 * f64::from(src[2]))
      .round() as u8;
    assert_eq!(dst, [luma, luma, luma]);
  }
}

#[test]
fn red_output_indexes_the_grey_ramp() {
  let image = rand_image(7, 3);
  let decoded = decode(&encode(&image, BmpFormat::Pal8Red));
  for (src, dst) in image.data().chunks_exact(3).zip(decoded.data().chunks_exact(3)) {
    assert_eq!(dst, [src[0], src[0], src[0]]);
  }
}

#[test]
fn black_and_white_thresholds_the_red_channel() {
  let mut image = Image::new(9, 2).unwrap();
  for (i, px) in image.data_mut().chunks_exact_mut(3).enumerate() {
    px[0] = if i % 3 == 0 { 200 } else { 17 };
    px[1] = 128;
    px[2] = 128;
  }
  let expected: Vec<[u8; 3]> = image
    .data()
    .chunks_exact(3)
    .map(|px| if px[0] >= 128 { [255, 255, 255] } else { [0, 0, 0] })
    .collect();
  let decoded = decode(&encode(&image, BmpFormat::Pal1Bw));
  for (dst, want) in decoded.data().chunks_exact(3).zip(expected) {
    assert_eq!(dst, want);
  }
}

#[test]
fn every_format_pads_rows_to_four_bytes() {
  for width in 1..=9_u32 {
    for (format, palette_len) in [
      (BmpFormat::Pal1Bw, 2_usize),
      (BmpFormat::Pal8Grey, 256),
      (BmpFormat::Rgb24, 0),
      (BmpFormat::Rgba32, 0),
    ] {
      let image = rand_image(width, 3);
      let file = encode(&image, format);
      let bpp = format.bits_per_pixel() as usize;
      let stride = ((width as usize * bpp + 31) / 32) * 4;
      assert_eq!(file.len(), 14 + 40 + 4 * palette_len + stride * 3, "{format:?} width {width}");
    }
  }
}

#[test]
fn resolution_survives_a_round_trip() {
  let mut image = rand_image(4, 4);
  image.set_resolution(Resolution { unit: ResolutionUnit::Inches, x: 72, y: 72 });
  let decoded = decode(&encode(&image, BmpFormat::Rgb24));
  // 72 ppi is written as 2834 pixels/meter and read back in centimeters.
  assert_eq!(
    decoded.resolution(),
    Some(Resolution { unit: ResolutionUnit::Centimeters, x: 28, y: 28 })
  );
}

#[test]
fn bad_magic_is_rejected() {
  let mut file = encode(&rand_image(2, 2), BmpFormat::Rgb24);
  file[0] = b'X';
  assert_eq!(bmp_read(&mut &file[..]).unwrap_err(), DibError::BadMagic);
}

#[test]
fn truncated_pixel_data_is_detected() {
  let file = encode(&rand_image(4, 4), BmpFormat::Rgb24);
  let short = &file[..file.len() - 5];
  assert_eq!(bmp_read(&mut &short[..]).unwrap_err(), DibError::Truncated);
  // Cutting into the header is also a truncation, not a parse error.
  let very_short = &file[..20];
  assert_eq!(bmp_read(&mut &very_short[..]).unwrap_err(), DibError::Truncated);
}

#[test]
fn invalid_headers_are_rejected() {
  let cases = [
    bmp(1, 1, 3, 0, 0, &[], &[0; 4]),  // bogus bit depth
    bmp(4, 1, 4, 1, 0, &[0; 64], &[]), // RLE8 code on a 4-bit image
    bmp(0, 1, 24, 0, 0, &[], &[]),     // zero width
    bmp(-3, 1, 24, 0, 0, &[], &[]),    // negative width
    bmp(1, 0, 24, 0, 0, &[], &[]),     // zero height
    bmp(40000, 1, 24, 0, 0, &[], &[]), // width over 32767
    bmp(1, 1, 8, 0, 300, &[], &[]),    // color count over 256
  ];
  for file in &cases {
    assert_eq!(bmp_read(&mut &file[..]).unwrap_err(), DibError::BadHeader);
  }
}

#[test]
fn embedded_jpeg_and_png_are_unsupported() {
  for comp in [4, 5] {
    let file = bmp(1, 1, 24, comp, 0, &[], &[0; 4]);
    assert_eq!(bmp_read(&mut &file[..]).unwrap_err(), DibError::UnsupportedCompression);
  }
}

#[test]
fn paletted_formats_need_their_palette_source() {
  let image = rand_image(4, 4);
  let mut out = Vec::new();
  let err = bmp_write(&image, &mut out, BmpFormat::Pal8Given, None).unwrap_err();
  assert_eq!(err, DibError::MissingPalette);
  let err = bmp_write(&image, &mut out, BmpFormat::Pal4, None).unwrap_err();
  assert_eq!(err, DibError::MissingPalette);
}
