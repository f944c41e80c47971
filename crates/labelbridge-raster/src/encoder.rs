// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Raster encoder: label image in, printer-native bit image out.
//
// The pipeline is: decode, stretch to the label's exact dot grid, threshold
// each pixel on luminance, then pack 24-row bands into column bytes for
// `ESC * 33`.  Everything here is pure and safe to call from any thread.

use image::imageops::FilterType;
use image::{DynamicImage, GrayImage, ImageFormat, Luma, Rgba};
use labelbridge_core::error::{LabelBridgeError, Result};
use tracing::{debug, instrument};

use crate::commands;

/// Device resolution: 203 DPI / 25.4 mm per inch, rounded.
pub const DOTS_PER_MM: u32 = 8;

/// Luminance (0..=255) below which a pixel becomes ink.
pub const INK_THRESHOLD: u32 = 128;

/// Rows per `ESC * 33` band (three stacked bytes per column).
pub const BAND_HEIGHT: u32 = 24;

/// Largest label side accepted, in dots (500 mm).  Keeps the resize buffer
/// for a single label in the tens of megabytes.
pub const MAX_LABEL_DOTS: u16 = 4000;

/// Bytes emitted per column in one band.
const BYTES_PER_COLUMN: u32 = BAND_HEIGHT / 8;

/// Luma value of an ink pixel in a monochrome render.
const INK: Luma<u8> = Luma([0]);
const BACKGROUND: Luma<u8> = Luma([255]);

/// Label dimensions in device dots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DotSize {
    pub width: u16,
    pub height: u16,
}

impl DotSize {
    pub fn new(width: u16, height: u16) -> Self {
        Self { width, height }
    }

    /// Convert a millimetre label size into dots.
    pub fn from_mm(width_mm: f64, height_mm: f64) -> Result<Self> {
        Ok(Self::new(mm_to_dots(width_mm)?, mm_to_dots(height_mm)?))
    }
}

/// `round(mm * 8)`, rejecting sizes that round to zero or exceed
/// [`MAX_LABEL_DOTS`].
pub fn mm_to_dots(mm: f64) -> Result<u16> {
    if !mm.is_finite() || mm <= 0.0 {
        return Err(LabelBridgeError::InvalidLabelSize(format!(
            "{mm} mm is not a positive length"
        )));
    }
    let dots = (mm * f64::from(DOTS_PER_MM)).round();
    if dots < 1.0 || dots > f64::from(MAX_LABEL_DOTS) {
        return Err(LabelBridgeError::InvalidLabelSize(format!(
            "{mm} mm is {dots} dots, outside 1..={MAX_LABEL_DOTS}"
        )));
    }
    Ok(dots as u16)
}

/// Printer-native bit image for one label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedRaster {
    pub size: DotSize,
    /// `GS W` + `GS H` for the same dot size, or empty when not requested.
    pub size_commands: Vec<u8>,
    /// `ESC * 33` header followed by the packed column bytes.
    pub raster: Vec<u8>,
    /// The thresholded label the raster was packed from.
    pub render: GrayImage,
}

impl EncodedRaster {
    /// Packed column bytes without the 7-byte raster header.
    pub fn column_data(&self) -> &[u8] {
        &self.raster[7..]
    }

    /// Size commands followed by the raster, ready to send.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.size_commands.len() + self.raster.len());
        out.extend_from_slice(&self.size_commands);
        out.extend_from_slice(&self.raster);
        out
    }
}

/// Stateless encoder.  The only option is whether label-size commands are
/// emitted ahead of the raster.
#[derive(Debug, Clone, Copy, Default)]
pub struct RasterEncoder {
    size_commands: bool,
}

impl RasterEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Also emit `GS W` / `GS H` for the label's dot size.
    pub fn with_size_commands(mut self, enabled: bool) -> Self {
        self.size_commands = enabled;
        self
    }

    /// Decode `image` and encode it for a `width_mm` x `height_mm` label.
    #[instrument(skip(self, image), fields(image_len = image.len()))]
    pub fn encode(&self, image: &[u8], width_mm: f64, height_mm: f64) -> Result<EncodedRaster> {
        let size = DotSize::from_mm(width_mm, height_mm)?;
        let decoded = decode_image(image)?;
        Ok(self.encode_image(&decoded, size))
    }

    /// Encode an already-decoded image at `size`.
    pub fn encode_image(&self, image: &DynamicImage, size: DotSize) -> EncodedRaster {
        let mono = render_monochrome(image, size);
        let packed = pack_columns(&mono);

        let mut raster = Vec::with_capacity(7 + packed.len());
        raster.extend_from_slice(&commands::raster_header(size));
        raster.extend_from_slice(&packed);

        let size_commands = if self.size_commands {
            commands::set_label_size(size)
        } else {
            Vec::new()
        };

        debug!(
            width_dots = size.width,
            height_dots = size.height,
            raster_bytes = raster.len(),
            "label encoded"
        );
        EncodedRaster {
            size,
            size_commands,
            raster,
            render: mono,
        }
    }
}

/// Decode PNG/JPEG/BMP/GIF bytes, sniffing the format from the content.
pub fn decode_image(data: &[u8]) -> Result<DynamicImage> {
    image::load_from_memory(data)
        .map_err(|err| LabelBridgeError::ImageDecode(format!("failed to decode image: {err}")))
}

/// Stretch `image` to exactly `size` and threshold it to pure black/white.
///
/// Aspect ratio is not preserved: the label is always filled edge to edge.
pub fn render_monochrome(image: &DynamicImage, size: DotSize) -> GrayImage {
    let (width, height) = (u32::from(size.width), u32::from(size.height));
    let rgba = if image.width() == width && image.height() == height {
        image.to_rgba8()
    } else {
        image
            .resize_exact(width, height, FilterType::Lanczos3)
            .to_rgba8()
    };

    GrayImage::from_fn(width, height, |x, y| {
        if is_ink(*rgba.get_pixel(x, y)) {
            INK
        } else {
            BACKGROUND
        }
    })
}

/// Whether a pixel prints, after compositing it onto white label stock.
pub fn is_ink(pixel: Rgba<u8>) -> bool {
    let Rgba([r, g, b, a]) = pixel;
    let over_white = |c: u8| -> u32 {
        let (c, a) = (u32::from(c), u32::from(a));
        (c * a + 255 * (255 - a)) / 255
    };
    luminance_millis(over_white(r), over_white(g), over_white(b)) < INK_THRESHOLD * 1000
}

/// `1000 * (0.299 R + 0.587 G + 0.114 B)`, in integers so the threshold
/// comparison is exact.
pub fn luminance_millis(r: u32, g: u32, b: u32) -> u32 {
    299 * r + 587 * g + 114 * b
}

/// Pack a monochrome image into `ESC * 33` column bytes.
///
/// Rows are taken in 24-row bands; for every column of a band three bytes
/// are emitted, top slice first, with bit 7 as the topmost pixel of its
/// slice.  Rows past the bottom edge pad with background.
pub fn pack_columns(mono: &GrayImage) -> Vec<u8> {
    let (width, height) = mono.dimensions();
    let bands = height.div_ceil(BAND_HEIGHT);
    let mut out = Vec::with_capacity((bands * width * BYTES_PER_COLUMN) as usize);

    for band in 0..bands {
        let top = band * BAND_HEIGHT;
        for x in 0..width {
            for slice in 0..BYTES_PER_COLUMN {
                let mut column = 0u8;
                for bit in 0..8 {
                    let y = top + slice * 8 + bit;
                    if y < height && mono.get_pixel(x, y)[0] < 128 {
                        column |= 0x80 >> bit;
                    }
                }
                out.push(column);
            }
        }
    }
    out
}

/// PNG bytes of a monochrome render, for previews.
pub fn encode_png(mono: &GrayImage) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    DynamicImage::ImageLuma8(mono.clone())
        .write_to(&mut std::io::Cursor::new(&mut buffer), ImageFormat::Png)
        .map_err(|err| LabelBridgeError::ImageEncode(format!("PNG encoding failed: {err}")))?;
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbaImage;

    fn png_bytes(image: &DynamicImage) -> Vec<u8> {
        let mut buffer = Vec::new();
        image
            .write_to(&mut std::io::Cursor::new(&mut buffer), ImageFormat::Png)
            .expect("encode test PNG");
        buffer
    }

    fn solid(width: u32, height: u32, luma: u8) -> GrayImage {
        GrayImage::from_pixel(width, height, Luma([luma]))
    }

    /// Inverse of `pack_columns`, bit by bit.
    fn unpack_columns(packed: &[u8], width: u32, height: u32) -> GrayImage {
        let mut image = solid(width, height, 255);
        let bands = height.div_ceil(BAND_HEIGHT);
        let mut bytes = packed.iter();
        for band in 0..bands {
            for x in 0..width {
                for slice in 0..BYTES_PER_COLUMN {
                    let column = *bytes.next().expect("enough packed bytes");
                    for bit in 0..8 {
                        let y = band * BAND_HEIGHT + slice * 8 + bit;
                        if y < height && column & (0x80 >> bit) != 0 {
                            image.put_pixel(x, y, INK);
                        }
                    }
                }
            }
        }
        assert!(bytes.next().is_none(), "no trailing packed bytes");
        image
    }

    #[test]
    fn dots_are_mm_times_eight_rounded() {
        assert_eq!(mm_to_dots(56.0).unwrap(), 448);
        assert_eq!(mm_to_dots(31.0).unwrap(), 248);
        assert_eq!(mm_to_dots(0.1).unwrap(), 1);
        assert_eq!(mm_to_dots(12.56).unwrap(), 100);
        assert_eq!(mm_to_dots(12.57).unwrap(), 101);
        assert_eq!(mm_to_dots(500.0).unwrap(), MAX_LABEL_DOTS);
    }

    #[test]
    fn oversized_label_fails_before_decoding() {
        // Garbage image bytes: the size check must come first.
        let err = RasterEncoder::new().encode(b"not an image", 8000.0, 8000.0).unwrap_err();
        assert!(matches!(err, LabelBridgeError::InvalidLabelSize(_)));
        assert!(matches!(
            DotSize::from_mm(56.0, 600.0),
            Err(LabelBridgeError::InvalidLabelSize(_))
        ));
    }

    #[test]
    fn non_positive_or_huge_sizes_are_rejected() {
        // 600 mm is 4800 dots: fits the 16-bit header but not the cap.
        for mm in [0.0, -5.0, f64::NAN, f64::INFINITY, 0.01, 600.0, 8000.0, 9000.0] {
            assert!(
                matches!(mm_to_dots(mm), Err(LabelBridgeError::InvalidLabelSize(_))),
                "{mm} mm should be rejected"
            );
        }
    }

    #[test]
    fn threshold_boundary_is_background() {
        // Mid grey 128 has luminance exactly 128.
        assert!(!is_ink(Rgba([128, 128, 128, 255])));
        assert!(is_ink(Rgba([127, 127, 127, 255])));
        assert!(is_ink(Rgba([0, 0, 0, 255])));
        assert!(!is_ink(Rgba([255, 255, 255, 255])));
    }

    #[test]
    fn luminance_weights_follow_bt601() {
        // Pure green at 218: 0.587 * 218 = 127.966 -> ink.
        assert!(is_ink(Rgba([0, 218, 0, 255])));
        // Pure green at 219: 128.553 -> background.
        assert!(!is_ink(Rgba([0, 219, 0, 255])));
        // Pure blue never reaches the threshold.
        assert!(is_ink(Rgba([0, 0, 255, 255])));
    }

    #[test]
    fn transparent_pixels_are_background() {
        assert!(!is_ink(Rgba([0, 0, 0, 0])));
        assert!(is_ink(Rgba([0, 0, 0, 255])));
    }

    #[test]
    fn black_8x8_packs_to_full_top_slices() {
        let packed = pack_columns(&solid(8, 8, 0));
        assert_eq!(packed.len(), 8 * 3);
        for column in packed.chunks(3) {
            assert_eq!(column, [0xFF, 0x00, 0x00]);
        }
    }

    #[test]
    fn white_8x8_packs_to_zero() {
        let packed = pack_columns(&solid(8, 8, 255));
        assert_eq!(packed.len(), 8 * 3);
        assert!(packed.iter().all(|&b| b == 0x00));
    }

    #[test]
    fn bit_seven_is_top_pixel() {
        let mut mono = solid(1, 24, 255);
        mono.put_pixel(0, 0, INK);
        mono.put_pixel(0, 15, INK);
        mono.put_pixel(0, 23, INK);
        assert_eq!(pack_columns(&mono), vec![0x80, 0x01, 0x01]);
    }

    #[test]
    fn second_band_follows_first() {
        let mut mono = solid(2, 25, 255);
        mono.put_pixel(1, 24, INK);
        let packed = pack_columns(&mono);
        assert_eq!(packed.len(), 2 * 2 * 3);
        assert_eq!(&packed[..6], &[0; 6]);
        assert_eq!(&packed[6..], &[0x00, 0x00, 0x00, 0x80, 0x00, 0x00]);
    }

    #[test]
    fn pack_unpack_reproduces_pattern() {
        let mono = GrayImage::from_fn(13, 30, |x, y| if (x * 7 + y * 3) % 5 == 0 { INK } else { BACKGROUND });
        let packed = pack_columns(&mono);
        assert_eq!(unpack_columns(&packed, 13, 30), mono);
    }

    #[test]
    fn encode_emits_header_and_size_commands() {
        let black = DynamicImage::ImageRgba8(RgbaImage::from_pixel(10, 10, Rgba([0, 0, 0, 255])));
        let raster = RasterEncoder::new()
            .with_size_commands(true)
            .encode(&png_bytes(&black), 56.0, 31.0)
            .expect("encode");

        assert_eq!(raster.size, DotSize::new(448, 248));
        assert_eq!(raster.size_commands, vec![0x1D, 0x57, 0xC0, 0x01, 0x1D, 0x48, 0xF8, 0x00]);
        assert_eq!(&raster.raster[..7], &[0x1B, 0x2A, 0x21, 0xC0, 0x01, 0xF8, 0x00]);
        // 248 rows -> 11 bands of 24.
        assert_eq!(raster.column_data().len(), 11 * 448 * 3);
        // Every full band of an all-black label is solid ink.
        assert!(raster.column_data()[..448 * 3].iter().all(|&b| b == 0xFF));
        assert_eq!(raster.render.dimensions(), (448, 248));
        assert_eq!(pack_columns(&raster.render), raster.column_data());
    }

    #[test]
    fn encode_without_size_commands() {
        let white = DynamicImage::ImageRgba8(RgbaImage::from_pixel(4, 4, Rgba([255, 255, 255, 255])));
        let raster = RasterEncoder::new().encode(&png_bytes(&white), 1.0, 1.0).expect("encode");
        assert!(raster.size_commands.is_empty());
        assert_eq!(raster.to_bytes(), raster.raster);
        assert!(raster.column_data().iter().all(|&b| b == 0));
    }

    #[test]
    fn stretch_fills_target_ignoring_aspect() {
        // Left half black, right half white, 2:1 source onto a 1:1 label.
        let source = RgbaImage::from_fn(20, 10, |x, _| {
            if x < 10 { Rgba([0, 0, 0, 255]) } else { Rgba([255, 255, 255, 255]) }
        });
        let mono = render_monochrome(&DynamicImage::ImageRgba8(source), DotSize::new(16, 16));
        assert_eq!(mono.dimensions(), (16, 16));
        assert_eq!(mono.get_pixel(2, 15)[0], 0);
        assert_eq!(mono.get_pixel(13, 0)[0], 255);
    }

    #[test]
    fn garbage_bytes_fail_to_decode() {
        let err = RasterEncoder::new().encode(b"definitely not an image", 10.0, 10.0).unwrap_err();
        assert!(matches!(err, LabelBridgeError::ImageDecode(_)));
    }

    #[test]
    fn preview_is_a_png_at_dot_size() {
        let black = DynamicImage::ImageRgba8(RgbaImage::from_pixel(3, 3, Rgba([0, 0, 0, 255])));
        let raster = RasterEncoder::new().encode(&png_bytes(&black), 2.0, 1.0).expect("encode");
        let png = encode_png(&raster.render).expect("preview");
        let decoded = image::load_from_memory(&png).expect("decode preview");
        assert_eq!((decoded.width(), decoded.height()), (16, 8));
    }
}
