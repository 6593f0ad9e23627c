//! Pure, stateless image transforms for OCR-quality transmission and
//! thumbnail storage.
//!
//! Every public transform is idempotent given identical input and fails
//! soft: when decoding throws (corrupt data, unsupported format) the
//! original input comes back unchanged with a `warn!` — preprocessing is a
//! best-effort optimization, never a hard requirement for a scan to
//! proceed.

use std::io::Cursor;

use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, RgbaImage};
use tracing::{debug, warn};

use crate::models::{ImageAsset, PreparedImage};

use super::PreprocessError;

// ──────────────────────────────────────────────
// Constants
// ──────────────────────────────────────────────

/// Default contrast stretch applied by [`enhance`]: +25% around mid-gray.
pub const DEFAULT_CONTRAST_FACTOR: f32 = 0.25;

/// JPEG quality for the enhancement re-encode.
const ENHANCE_JPEG_QUALITY: u8 = 90;

/// JPEG quality when re-encoding after EXIF rotation. High — this runs on
/// capture-resolution frames before any downscale.
const ORIENTATION_JPEG_QUALITY: u8 = 95;

/// Named (max-dimension, JPEG quality) pair used for image preparation.
///
/// The orchestrator downgrades High → Low after a `PayloadTooLarge`
/// rejection; the next user-initiated attempt then prepares smaller
/// payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QualityTier {
    High,
    Low,
}

impl QualityTier {
    pub fn max_dimension(&self) -> u32 {
        match self {
            Self::High => 1280,
            Self::Low => 800,
        }
    }

    pub fn jpeg_quality(&self) -> u8 {
        match self {
            Self::High => 90,
            Self::Low => 70,
        }
    }
}

// ──────────────────────────────────────────────
// downscale
// ──────────────────────────────────────────────

/// Bound an image to `max_w` x `max_h`, preserving aspect ratio.
///
/// If both dimensions already fit, the input comes back byte-identical —
/// no decode, no re-encode. Otherwise the image is resized so the larger
/// dimension meets its bound (CatmullRom — sharp text without ringing)
/// and re-encoded as JPEG at `jpeg_quality`.
pub fn downscale(asset: &ImageAsset, max_w: u32, max_h: u32, jpeg_quality: u8) -> PreparedImage {
    if asset.fits_within(max_w, max_h) {
        return PreparedImage::passthrough(asset);
    }
    match try_downscale(asset, max_w, max_h, jpeg_quality) {
        Ok(prepared) => prepared,
        Err(e) => {
            warn!(error = %e, "Downscale failed — transmitting original image");
            PreparedImage::passthrough(asset)
        }
    }
}

/// Downscale at a quality tier's bound and compression level.
pub fn downscale_for_tier(asset: &ImageAsset, tier: QualityTier) -> PreparedImage {
    let dim = tier.max_dimension();
    downscale(asset, dim, dim, tier.jpeg_quality())
}

/// Produce the small history thumbnail for an asset.
pub fn thumbnail(asset: &ImageAsset) -> PreparedImage {
    downscale(
        asset,
        crate::config::THUMBNAIL_MAX_DIM,
        crate::config::THUMBNAIL_MAX_DIM,
        crate::config::THUMBNAIL_JPEG_QUALITY,
    )
}

fn try_downscale(
    asset: &ImageAsset,
    max_w: u32,
    max_h: u32,
    jpeg_quality: u8,
) -> Result<PreparedImage, PreprocessError> {
    let img = decode(asset)?;
    let (w, h) = img.dimensions();

    let scale = f64::min(max_w as f64 / w as f64, max_h as f64 / h as f64);
    let new_w = ((w as f64 * scale).round() as u32).max(1);
    let new_h = ((h as f64 * scale).round() as u32).max(1);

    let resized = img.resize_exact(new_w, new_h, FilterType::CatmullRom);
    let bytes = encode_jpeg(&resized.to_rgb8(), jpeg_quality)?;

    debug!(
        original = format!("{w}x{h}"),
        output = format!("{new_w}x{new_h}"),
        jpeg_quality,
        payload = bytes.len(),
        "Image downscaled for transmission"
    );

    Ok(PreparedImage {
        bytes,
        mime: "image/jpeg".to_string(),
        width: new_w,
        height: new_h,
    })
}

// ──────────────────────────────────────────────
// enhance
// ──────────────────────────────────────────────

/// OCR-readability pass: linear contrast stretch around mid-gray, then a
/// 3x3 cross Laplacian sharpen, re-encoded as JPEG.
///
/// Dimensions never change. Fail-soft like every transform here.
pub fn enhance(asset: &ImageAsset) -> PreparedImage {
    enhance_with_factor(asset, DEFAULT_CONTRAST_FACTOR)
}

/// [`enhance`] with a configurable contrast factor (0.25 = +25%).
pub fn enhance_with_factor(asset: &ImageAsset, contrast_factor: f32) -> PreparedImage {
    match try_enhance(asset, contrast_factor) {
        Ok(prepared) => prepared,
        Err(e) => {
            warn!(error = %e, "Enhancement failed — transmitting original image");
            PreparedImage::passthrough(asset)
        }
    }
}

fn try_enhance(asset: &ImageAsset, contrast_factor: f32) -> Result<PreparedImage, PreprocessError> {
    let img = decode(asset)?;
    let (w, h) = img.dimensions();
    let mut rgba = img.to_rgba8();

    // Pass 1: contrast stretch per RGB channel, alpha untouched.
    for pixel in rgba.pixels_mut() {
        for c in 0..3 {
            pixel.0[c] = stretch_channel(pixel.0[c], contrast_factor);
        }
    }

    // Pass 2: cross-shaped Laplacian sharpen.
    let sharpened = sharpen_cross(&rgba);
    debug_assert_eq!(sharpened.dimensions(), (w, h));

    let bytes = encode_jpeg(
        &DynamicImage::ImageRgba8(sharpened).to_rgb8(),
        ENHANCE_JPEG_QUALITY,
    )?;

    Ok(PreparedImage {
        bytes,
        mime: "image/jpeg".to_string(),
        width: w,
        height: h,
    })
}

/// Linear contrast stretch around the mid-gray point (128).
///
/// Exactly mid-gray is a fixed point; values diverge linearly away from
/// it and clamp to [0, 255].
pub fn stretch_channel(value: u8, factor: f32) -> u8 {
    let stretched = (value as f32 - 128.0) * (1.0 + factor) + 128.0;
    stretched.round().clamp(0.0, 255.0) as u8
}

/// 3x3 sharpening convolution: kernel center 5, four-neighbor -1,
/// corners 0, applied per RGB channel with alpha untouched and each
/// channel clamped to [0, 255]. Edge pixels sample with coordinate
/// replication so output dimensions equal input dimensions.
pub fn sharpen_cross(src: &RgbaImage) -> RgbaImage {
    let (w, h) = src.dimensions();
    let mut out = RgbaImage::new(w, h);

    let sample = |x: i64, y: i64| {
        let cx = x.clamp(0, w as i64 - 1) as u32;
        let cy = y.clamp(0, h as i64 - 1) as u32;
        src.get_pixel(cx, cy)
    };

    for y in 0..h as i64 {
        for x in 0..w as i64 {
            let center = sample(x, y);
            let up = sample(x, y - 1);
            let down = sample(x, y + 1);
            let left = sample(x - 1, y);
            let right = sample(x + 1, y);

            let mut pixel = *center;
            for c in 0..3 {
                let v = 5 * center.0[c] as i32
                    - up.0[c] as i32
                    - down.0[c] as i32
                    - left.0[c] as i32
                    - right.0[c] as i32;
                pixel.0[c] = v.clamp(0, 255) as u8;
            }
            out.put_pixel(x as u32, y as u32, pixel);
        }
    }
    out
}

// ──────────────────────────────────────────────
// Orientation (EXIF)
// ──────────────────────────────────────────────

/// Apply the EXIF orientation tag (0x0112) so phone photos reach the
/// backend upright. No EXIF, orientation 1, or any decode failure —
/// the asset comes back unchanged.
pub fn normalize_orientation(asset: &ImageAsset) -> ImageAsset {
    let orientation = read_exif_orientation(&asset.bytes);
    if orientation == 1 {
        return asset.clone();
    }
    match try_reorient(asset, orientation) {
        Ok(rotated) => rotated,
        Err(e) => {
            warn!(orientation, error = %e, "Orientation fix failed — keeping original");
            asset.clone()
        }
    }
}

/// Read the EXIF orientation tag from raw image bytes.
/// Returns 1 (normal) if no EXIF data or the tag is absent.
pub fn read_exif_orientation(bytes: &[u8]) -> u32 {
    let mut cursor = Cursor::new(bytes);
    let reader = match exif::Reader::new().read_from_container(&mut cursor) {
        Ok(r) => r,
        Err(_) => return 1,
    };
    reader
        .get_field(exif::Tag::Orientation, exif::In::PRIMARY)
        .and_then(|f| f.value.get_uint(0))
        .unwrap_or(1)
}

/// Apply an EXIF orientation value to a decoded image.
pub fn apply_orientation(img: DynamicImage, orientation: u32) -> DynamicImage {
    match orientation {
        1 => img,
        2 => img.fliph(),
        3 => img.rotate180(),
        4 => img.flipv(),
        5 => img.rotate90().fliph(),
        6 => img.rotate90(),
        7 => img.rotate270().fliph(),
        8 => img.rotate270(),
        _ => img,
    }
}

fn try_reorient(asset: &ImageAsset, orientation: u32) -> Result<ImageAsset, PreprocessError> {
    let img = apply_orientation(decode(asset)?, orientation);
    let (w, h) = img.dimensions();
    let bytes = encode_jpeg(&img.to_rgb8(), ORIENTATION_JPEG_QUALITY)?;
    Ok(ImageAsset {
        bytes,
        mime: "image/jpeg".to_string(),
        width: w,
        height: h,
    })
}

// ──────────────────────────────────────────────
// to_transferable
// ──────────────────────────────────────────────

/// Strip any data-URI/base64 header and return the raw encoded payload
/// plus its mime type, ready for the transport layer.
pub fn to_transferable(payload: &str) -> Result<(Vec<u8>, String), PreprocessError> {
    let asset = if payload.starts_with("data:") {
        ImageAsset::from_data_uri(payload)
    } else {
        use base64::Engine as _;
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(payload.trim())
            .map_err(|e| PreprocessError::Transfer(e.to_string()))?;
        ImageAsset::from_bytes(bytes)
    }
    .map_err(|e| PreprocessError::Transfer(e.to_string()))?;
    Ok((asset.bytes, asset.mime))
}

// ──────────────────────────────────────────────
// Codec helpers
// ──────────────────────────────────────────────

fn decode(asset: &ImageAsset) -> Result<DynamicImage, PreprocessError> {
    image::load_from_memory(&asset.bytes).map_err(|e| PreprocessError::Decode(e.to_string()))
}

fn encode_jpeg(img: &image::RgbImage, quality: u8) -> Result<Vec<u8>, PreprocessError> {
    let mut out = Cursor::new(Vec::new());
    let mut encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut out, quality);
    encoder
        .encode_image(img)
        .map_err(|e| PreprocessError::Encode(e.to_string()))?;
    Ok(out.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::Engine as _;
    use image::Rgba;

    fn png_asset(w: u32, h: u32) -> ImageAsset {
        let img = image::RgbImage::from_fn(w, h, |x, y| {
            image::Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
        });
        let mut out = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(img)
            .write_to(&mut out, image::ImageFormat::Png)
            .unwrap();
        ImageAsset::from_bytes(out.into_inner()).unwrap()
    }

    fn corrupt_asset(w: u32, h: u32) -> ImageAsset {
        ImageAsset {
            bytes: vec![0xba, 0xad, 0xf0, 0x0d],
            mime: "image/jpeg".into(),
            width: w,
            height: h,
        }
    }

    // ── downscale ──

    #[test]
    fn downscale_is_identity_when_both_dimensions_fit() {
        let asset = png_asset(80, 60);
        let prepared = downscale(&asset, 100, 100, 90);
        assert_eq!(prepared.bytes, asset.bytes, "must be byte-identical");
        assert_eq!(prepared.mime, asset.mime);
        assert_eq!((prepared.width, prepared.height), (80, 60));
    }

    #[test]
    fn downscale_bounds_larger_dimension_and_preserves_aspect() {
        let asset = png_asset(400, 200);
        let prepared = downscale(&asset, 100, 100, 90);
        assert_eq!((prepared.width, prepared.height), (100, 50));
        assert_eq!(prepared.mime, "image/jpeg");

        let decoded = image::load_from_memory(&prepared.bytes).unwrap();
        assert_eq!(decoded.dimensions(), (100, 50));
    }

    #[test]
    fn downscale_portrait_respects_height_bound() {
        let asset = png_asset(120, 480);
        let prepared = downscale(&asset, 200, 200, 90);
        assert_eq!((prepared.width, prepared.height), (50, 200));
    }

    #[test]
    fn downscale_fails_soft_on_corrupt_bytes() {
        let asset = corrupt_asset(5000, 5000);
        let prepared = downscale(&asset, 100, 100, 90);
        assert_eq!(prepared.bytes, asset.bytes);
    }

    #[test]
    fn tier_constants_differ() {
        assert!(QualityTier::High.max_dimension() > QualityTier::Low.max_dimension());
        assert!(QualityTier::High.jpeg_quality() > QualityTier::Low.jpeg_quality());
    }

    #[test]
    fn thumbnail_fits_the_thumbnail_bound() {
        let prepared = thumbnail(&png_asset(800, 600));
        assert!(prepared.width.max(prepared.height) <= crate::config::THUMBNAIL_MAX_DIM);
    }

    // ── contrast stretch ──

    #[test]
    fn mid_gray_is_a_fixed_point() {
        assert_eq!(stretch_channel(128, 0.25), 128);
        assert_eq!(stretch_channel(128, 0.5), 128);
    }

    #[test]
    fn stretch_diverges_linearly_from_mid_gray() {
        // (100 - 128) * 1.25 + 128 = 93
        assert_eq!(stretch_channel(100, 0.25), 93);
        // (156 - 128) * 1.25 + 128 = 163
        assert_eq!(stretch_channel(156, 0.25), 163);
    }

    #[test]
    fn stretch_clamps_to_channel_range() {
        assert_eq!(stretch_channel(0, 0.25), 0);
        assert_eq!(stretch_channel(255, 0.25), 255);
        assert_eq!(stretch_channel(10, 2.0), 0);
        assert_eq!(stretch_channel(250, 2.0), 255);
    }

    // ── sharpen ──

    #[test]
    fn sharpen_leaves_uniform_image_unchanged() {
        let img = RgbaImage::from_pixel(8, 8, Rgba([100, 100, 100, 255]));
        let out = sharpen_cross(&img);
        assert_eq!(out, img);
    }

    #[test]
    fn sharpen_applies_exact_cross_kernel() {
        // 3x3 image, center 100, cross neighbors 90, corners 50.
        let mut img = RgbaImage::from_pixel(3, 3, Rgba([50, 50, 50, 255]));
        for (x, y) in [(1, 0), (0, 1), (2, 1), (1, 2)] {
            img.put_pixel(x, y, Rgba([90, 90, 90, 255]));
        }
        img.put_pixel(1, 1, Rgba([100, 100, 100, 255]));

        let out = sharpen_cross(&img);
        // 5*100 - 4*90 = 140
        assert_eq!(out.get_pixel(1, 1).0, [140, 140, 140, 255]);
    }

    #[test]
    fn sharpen_clamps_and_keeps_alpha() {
        let mut img = RgbaImage::from_pixel(3, 3, Rgba([255, 0, 128, 77]));
        img.put_pixel(1, 1, Rgba([255, 0, 128, 77]));
        let out = sharpen_cross(&img);
        for p in out.pixels() {
            assert_eq!(p.0[3], 77, "alpha must be untouched");
        }
        // Channel 0: 5*255 - 4*255 = 255 (stays clamped in range).
        assert_eq!(out.get_pixel(1, 1).0[0], 255);
        assert_eq!(out.get_pixel(1, 1).0[1], 0);
    }

    #[test]
    fn sharpen_never_changes_dimensions() {
        for (w, h) in [(1, 1), (2, 5), (17, 3)] {
            let img = RgbaImage::from_pixel(w, h, Rgba([60, 70, 80, 255]));
            assert_eq!(sharpen_cross(&img).dimensions(), (w, h));
        }
    }

    // ── enhance ──

    #[test]
    fn enhance_preserves_dimensions() {
        let asset = png_asset(64, 48);
        let prepared = enhance(&asset);
        assert_eq!((prepared.width, prepared.height), (64, 48));
        let decoded = image::load_from_memory(&prepared.bytes).unwrap();
        assert_eq!(decoded.dimensions(), (64, 48));
    }

    #[test]
    fn enhance_fails_soft_on_corrupt_bytes() {
        let asset = corrupt_asset(10, 10);
        let prepared = enhance(&asset);
        assert_eq!(prepared.bytes, asset.bytes);
        assert_eq!(prepared.mime, asset.mime);
    }

    // ── orientation ──

    #[test]
    fn orientation_defaults_to_normal_without_exif() {
        assert_eq!(read_exif_orientation(&png_asset(4, 4).bytes), 1);
        assert_eq!(read_exif_orientation(b"garbage"), 1);
    }

    #[test]
    fn normalize_orientation_is_identity_without_exif() {
        let asset = png_asset(16, 8);
        assert_eq!(normalize_orientation(&asset), asset);
    }

    #[test]
    fn apply_orientation_six_rotates_quarter_turn() {
        let img = DynamicImage::ImageRgb8(image::RgbImage::new(10, 20));
        let rotated = apply_orientation(img, 6);
        assert_eq!(rotated.dimensions(), (20, 10));
    }

    // ── to_transferable ──

    #[test]
    fn to_transferable_strips_data_uri_header() {
        let asset = png_asset(6, 6);
        let uri = format!(
            "data:image/png;base64,{}",
            base64::engine::general_purpose::STANDARD.encode(&asset.bytes)
        );
        let (bytes, mime) = to_transferable(&uri).unwrap();
        assert_eq!(bytes, asset.bytes);
        assert_eq!(mime, "image/png");
    }

    #[test]
    fn to_transferable_accepts_bare_base64() {
        let asset = png_asset(6, 6);
        let bare = base64::engine::general_purpose::STANDARD.encode(&asset.bytes);
        let (bytes, mime) = to_transferable(&bare).unwrap();
        assert_eq!(bytes, asset.bytes);
        assert_eq!(mime, "image/png");
    }

    #[test]
    fn to_transferable_rejects_non_image_payload() {
        assert!(to_transferable("definitely not base64 %%%").is_err());
    }
}
