use base64::Engine as _;
use image::GenericImageView;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ImageAssetError {
    #[error("Image data could not be decoded: {0}")]
    Decode(String),

    #[error("Malformed data URI — expected 'data:<mime>;base64,<payload>'")]
    InvalidDataUri,
}

/// Raw encoded image bytes with their mime type and pixel dimensions.
///
/// Created by capture or file read; immutable once produced. Owned
/// exclusively by the call that produced it until handed to the
/// preprocessor or discarded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageAsset {
    pub bytes: Vec<u8>,
    pub mime: String,
    pub width: u32,
    pub height: u32,
}

impl ImageAsset {
    /// Build an asset from already-encoded bytes, probing format and
    /// dimensions without a full pixel decode.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, ImageAssetError> {
        let format = image::guess_format(&bytes)
            .map_err(|e| ImageAssetError::Decode(e.to_string()))?;
        let img = image::load_from_memory_with_format(&bytes, format)
            .map_err(|e| ImageAssetError::Decode(e.to_string()))?;
        let (width, height) = img.dimensions();
        Ok(Self {
            bytes,
            mime: format.to_mime_type().to_string(),
            width,
            height,
        })
    }

    /// Build an asset from a `data:<mime>;base64,<payload>` URI.
    ///
    /// Host capture surfaces deliver frames in this shape; the transport
    /// layer only ever sees the raw decoded payload.
    pub fn from_data_uri(uri: &str) -> Result<Self, ImageAssetError> {
        let rest = uri.strip_prefix("data:").ok_or(ImageAssetError::InvalidDataUri)?;
        let (header, payload) = rest.split_once(',').ok_or(ImageAssetError::InvalidDataUri)?;
        if !header.ends_with(";base64") {
            return Err(ImageAssetError::InvalidDataUri);
        }
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(payload.trim())
            .map_err(|_| ImageAssetError::InvalidDataUri)?;
        Self::from_bytes(bytes)
    }

    /// Whether both dimensions already fit within the given bounds.
    pub fn fits_within(&self, max_w: u32, max_h: u32) -> bool {
        self.width <= max_w && self.height <= max_h
    }
}

/// An [`ImageAsset`] transformed for transmission: bounded max dimension,
/// recompressed, optionally contrast/sharpness enhanced.
///
/// Derived, never mutated; one-to-one with a source asset within a scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreparedImage {
    /// Stored as base64 — a JSON integer array would quadruple every
    /// persisted thumbnail.
    #[serde(with = "base64_bytes")]
    pub bytes: Vec<u8>,
    pub mime: String,
    pub width: u32,
    pub height: u32,
}

impl PreparedImage {
    /// Carry an asset over unchanged — the fail-soft path when a transform
    /// cannot improve on its input.
    pub fn passthrough(asset: &ImageAsset) -> Self {
        Self {
            bytes: asset.bytes.clone(),
            mime: asset.mime.clone(),
            width: asset.width,
            height: asset.height,
        }
    }

    /// View this prepared image as an asset for chained transforms.
    pub fn as_asset(&self) -> ImageAsset {
        ImageAsset {
            bytes: self.bytes.clone(),
            mime: self.mime.clone(),
            width: self.width,
            height: self.height,
        }
    }
}

mod base64_bytes {
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&base64::engine::general_purpose::STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::Engine as _;

    fn png_bytes(w: u32, h: u32) -> Vec<u8> {
        let img = image::RgbImage::from_pixel(w, h, image::Rgb([10, 120, 200]));
        let mut out = std::io::Cursor::new(Vec::new());
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut out, image::ImageFormat::Png)
            .unwrap();
        out.into_inner()
    }

    #[test]
    fn from_bytes_probes_dimensions_and_mime() {
        let asset = ImageAsset::from_bytes(png_bytes(32, 18)).unwrap();
        assert_eq!(asset.width, 32);
        assert_eq!(asset.height, 18);
        assert_eq!(asset.mime, "image/png");
    }

    #[test]
    fn from_bytes_rejects_garbage() {
        assert!(ImageAsset::from_bytes(vec![0xde, 0xad, 0xbe, 0xef]).is_err());
    }

    #[test]
    fn from_data_uri_strips_header() {
        let raw = png_bytes(8, 8);
        let uri = format!(
            "data:image/png;base64,{}",
            base64::engine::general_purpose::STANDARD.encode(&raw)
        );
        let asset = ImageAsset::from_data_uri(&uri).unwrap();
        assert_eq!(asset.bytes, raw);
        assert_eq!(asset.mime, "image/png");
    }

    #[test]
    fn from_data_uri_rejects_missing_base64_marker() {
        assert!(ImageAsset::from_data_uri("data:image/png,abcd").is_err());
        assert!(ImageAsset::from_data_uri("image/png;base64,abcd").is_err());
    }

    #[test]
    fn fits_within_checks_both_dimensions() {
        let asset = ImageAsset::from_bytes(png_bytes(30, 10)).unwrap();
        assert!(asset.fits_within(30, 10));
        assert!(!asset.fits_within(29, 10));
        assert!(!asset.fits_within(30, 9));
    }

    #[test]
    fn prepared_image_bytes_persist_as_base64() {
        let asset = ImageAsset::from_bytes(png_bytes(8, 8)).unwrap();
        let prepared = PreparedImage::passthrough(&asset);
        let json = serde_json::to_value(&prepared).unwrap();
        let encoded = json["bytes"].as_str().expect("bytes must be a string");
        assert_eq!(
            base64::engine::general_purpose::STANDARD
                .decode(encoded)
                .unwrap(),
            prepared.bytes
        );
        let back: PreparedImage = serde_json::from_value(json).unwrap();
        assert_eq!(back, prepared);
    }

    #[test]
    fn passthrough_preserves_bytes() {
        let asset = ImageAsset::from_bytes(png_bytes(8, 8)).unwrap();
        let prepared = PreparedImage::passthrough(&asset);
        assert_eq!(prepared.bytes, asset.bytes);
        assert_eq!(prepared.as_asset(), asset);
    }
}
