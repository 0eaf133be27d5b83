//! Raster normalisation: decode → flatten onto white → re-encode.
//!
//! Every raster that reaches a page or a converted output passes through
//! [`normalize`]. Transparency is always flattened onto an opaque white
//! backdrop so JPEG output and PDF embedding never show black where alpha was.

use crate::config::OutputFormat;
use crate::document::{Page, RasterEncoding};
use crate::error::ItemError;
use crate::pipeline::heif::{self, AuxiliaryDecoder};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use std::io::Cursor;
use tracing::debug;

/// Edge length of icon outputs.
pub const ICON_SIZE: u32 = 256;

/// A re-encoded raster.
#[derive(Debug, Clone)]
pub struct RasterResult {
    pub bytes: Vec<u8>,
    pub pixel_width: u32,
    pub pixel_height: u32,
    pub encoding: OutputFormat,
}

/// Decode, flatten and re-encode `bytes` as `target`.
///
/// `quality` (0–100) applies to JPEG only; it is clamped to the encoder's
/// 1–100 range. WebP output is lossless and ignores it.
pub fn normalize(
    name: &str,
    bytes: &[u8],
    source_format: &str,
    target: &OutputFormat,
    quality: u8,
    aux: Option<&dyn AuxiliaryDecoder>,
) -> Result<RasterResult, ItemError> {
    let decoded = decode(name, bytes, source_format, aux)?;
    let flat = flatten_onto_white(&decoded);
    let prepared = if *target == OutputFormat::Ico {
        flat.resize_exact(ICON_SIZE, ICON_SIZE, FilterType::Lanczos3)
    } else {
        flat
    };
    let out = encode_raster(&prepared, target, quality).map_err(|detail| ItemError::Encode {
        name: name.to_string(),
        format: target.to_string(),
        detail,
    })?;
    debug!(
        "Normalised '{}' ({}) → {} {}x{} ({} bytes)",
        name,
        source_format,
        target,
        prepared.width(),
        prepared.height(),
        out.len()
    );
    Ok(RasterResult {
        bytes: out,
        pixel_width: prepared.width(),
        pixel_height: prepared.height(),
        encoding: target.clone(),
    })
}

/// Decode any supported raster, routing HEIC/HEIF through `aux`.
pub fn decode(
    name: &str,
    bytes: &[u8],
    source_format: &str,
    aux: Option<&dyn AuxiliaryDecoder>,
) -> Result<DynamicImage, ItemError> {
    let decode_err = |detail: String| ItemError::Decode {
        name: name.to_string(),
        format: source_format.to_string(),
        detail,
    };

    let img = if heif::needs_auxiliary(source_format) {
        let decoder = aux.ok_or_else(|| {
            decode_err(format!("no {source_format} decoder is configured"))
        })?;
        decoder
            .decode(bytes, source_format)
            .map_err(|e| decode_err(format!("{}: {e}", decoder.name())))?
    } else {
        image::load_from_memory(bytes).map_err(|e| decode_err(e.to_string()))?
    };

    if img.width() == 0 || img.height() == 0 {
        return Err(ItemError::InvalidDimensions {
            name: name.to_string(),
            width: img.width(),
            height: img.height(),
        });
    }
    Ok(img)
}

/// Composite `img` over an opaque white canvas of the same size.
pub fn flatten_onto_white(img: &DynamicImage) -> DynamicImage {
    let mut canvas = RgbaImage::from_pixel(img.width(), img.height(), Rgba([255, 255, 255, 255]));
    imageops::overlay(&mut canvas, &img.to_rgba8(), 0, 0);
    DynamicImage::ImageRgb8(DynamicImage::ImageRgba8(canvas).to_rgb8())
}

/// Encode an already-flattened image.
pub fn encode_raster(
    img: &DynamicImage,
    target: &OutputFormat,
    quality: u8,
) -> Result<Vec<u8>, String> {
    let mut buf = Vec::new();
    match target {
        OutputFormat::Jpeg => {
            let rgb = img.to_rgb8();
            JpegEncoder::new_with_quality(&mut buf, quality.clamp(1, 100))
                .encode_image(&rgb)
                .map_err(|e| e.to_string())?;
        }
        OutputFormat::Png | OutputFormat::Bmp | OutputFormat::Tiff | OutputFormat::Webp => {
            let format = match target {
                OutputFormat::Png => ImageFormat::Png,
                OutputFormat::Bmp => ImageFormat::Bmp,
                OutputFormat::Tiff => ImageFormat::Tiff,
                _ => ImageFormat::WebP,
            };
            DynamicImage::ImageRgb8(img.to_rgb8())
                .write_to(&mut Cursor::new(&mut buf), format)
                .map_err(|e| e.to_string())?;
        }
        OutputFormat::Gif | OutputFormat::Ico => {
            let format = if *target == OutputFormat::Gif {
                ImageFormat::Gif
            } else {
                ImageFormat::Ico
            };
            DynamicImage::ImageRgba8(img.to_rgba8())
                .write_to(&mut Cursor::new(&mut buf), format)
                .map_err(|e| e.to_string())?;
        }
        other => return Err(format!("{other} is not a raster format")),
    }
    Ok(buf)
}

/// Scale `(width, height)` uniformly so neither edge exceeds `max`.
///
/// Dimensions already within bounds are returned unchanged. Each edge is
/// rounded independently, so the aspect ratio holds to within one unit.
pub fn fit_within(width: u32, height: u32, max: u32) -> (u32, u32) {
    if width <= max && height <= max {
        return (width, height);
    }
    let ratio = (max as f64 / width as f64).min(max as f64 / height as f64);
    let w = ((width as f64 * ratio).round() as u32).clamp(1, max);
    let h = ((height as f64 * ratio).round() as u32).clamp(1, max);
    (w, h)
}

/// Turn an image item into one embedded-raster page.
///
/// Pixels are kept at full resolution; only the page box is capped at
/// `max_page_dimension`. Quality 100 embeds losslessly (PNG); anything lower
/// embeds a JPEG at that quality.
pub fn image_page(
    name: &str,
    bytes: &[u8],
    source_format: &str,
    quality: u8,
    max_page_dimension: u32,
    aux: Option<&dyn AuxiliaryDecoder>,
) -> Result<Page, ItemError> {
    let (target, encoding) = if quality >= 100 {
        (OutputFormat::Png, RasterEncoding::Png)
    } else {
        (OutputFormat::Jpeg, RasterEncoding::Jpeg)
    };
    let raster = normalize(name, bytes, source_format, &target, quality, aux)?;
    let (w, h) = fit_within(raster.pixel_width, raster.pixel_height, max_page_dimension);
    Ok(Page::raster(
        w as f32,
        h as f32,
        raster.bytes,
        encoding,
        raster.pixel_width,
        raster.pixel_height,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn png_bytes(img: DynamicImage) -> Vec<u8> {
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .unwrap();
        buf
    }

    #[test]
    fn fit_within_caps_both_edges() {
        assert_eq!(fit_within(100, 50, 3000), (100, 50));
        assert_eq!(fit_within(6000, 4000, 3000), (3000, 2000));
        assert_eq!(fit_within(1000, 9000, 3000), (333, 3000));
        let (w, h) = fit_within(4001, 2999, 3000);
        assert!(w <= 3000 && h <= 3000);
        let expected_h = 2999.0 * 3000.0 / 4001.0;
        assert!((h as f64 - expected_h).abs() <= 1.0);
    }

    #[test]
    fn transparency_becomes_white() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(2, 2, Rgba([0, 0, 0, 0])));
        let flat = flatten_onto_white(&img).to_rgb8();
        assert_eq!(flat.get_pixel(0, 0), &Rgb([255, 255, 255]));
    }

    #[test]
    fn icon_is_always_256() {
        let src = png_bytes(DynamicImage::ImageRgb8(RgbImage::new(40, 10)));
        let out = normalize("a.png", &src, "png", &OutputFormat::Ico, 90, None).unwrap();
        assert_eq!((out.pixel_width, out.pixel_height), (ICON_SIZE, ICON_SIZE));
        let decoded = image::load_from_memory(&out.bytes).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (256, 256));
    }

    #[test]
    fn jpeg_keeps_dimensions() {
        let src = png_bytes(DynamicImage::ImageRgb8(RgbImage::new(100, 50)));
        let out = normalize("a.png", &src, "png", &OutputFormat::Jpeg, 0, None).unwrap();
        assert_eq!((out.pixel_width, out.pixel_height), (100, 50));
        assert_eq!(&out.bytes[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn garbage_is_a_decode_error() {
        let err = normalize("bad.jpg", b"nope", "jpg", &OutputFormat::Png, 90, None).unwrap_err();
        assert!(matches!(err, ItemError::Decode { .. }));
    }

    #[test]
    fn heic_without_decoder_names_capability() {
        let err = decode("p.heic", b"....", "heic", None).unwrap_err();
        assert!(err.to_string().contains("no heic decoder"), "got: {err}");
    }

    #[test]
    fn text_target_is_an_encode_error() {
        let src = png_bytes(DynamicImage::ImageRgb8(RgbImage::new(4, 4)));
        let err = normalize("a.png", &src, "png", &OutputFormat::Txt, 90, None).unwrap_err();
        assert!(matches!(err, ItemError::Encode { .. }));
    }

    #[test]
    fn image_page_caps_geometry_not_pixels() {
        let src = png_bytes(DynamicImage::ImageRgb8(RgbImage::new(400, 100)));
        let page = image_page("wide.png", &src, "png", 90, 200, None).unwrap();
        assert_eq!((page.width, page.height), (200.0, 50.0));
        match page.content {
            crate::document::PageContent::EmbeddedRaster {
                pixel_width,
                pixel_height,
                encoding,
                ..
            } => {
                assert_eq!((pixel_width, pixel_height), (400, 100));
                assert_eq!(encoding, RasterEncoding::Jpeg);
            }
            other => panic!("unexpected content {other:?}"),
        }
    }
}
