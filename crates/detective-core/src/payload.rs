//! Image payload shared by both acquisition paths

use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::ImageFormat;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MediaType {
    Jpeg,
    Png,
    WebP,
}

impl MediaType {
    /// Parse a MIME string; parameters after `;` are ignored
    pub fn parse(raw: &str) -> Option<Self> {
        let essence = raw.split(';').next().unwrap_or("").trim().to_ascii_lowercase();
        match essence.as_str() {
            "image/jpeg" | "image/jpg" | "image/pjpeg" => Some(MediaType::Jpeg),
            "image/png" => Some(MediaType::Png),
            "image/webp" => Some(MediaType::WebP),
            _ => None,
        }
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" => Some(MediaType::Jpeg),
            "png" => Some(MediaType::Png),
            "webp" => Some(MediaType::WebP),
            _ => None,
        }
    }

    pub(crate) fn from_format(format: ImageFormat) -> Option<Self> {
        match format {
            ImageFormat::Jpeg => Some(MediaType::Jpeg),
            ImageFormat::Png => Some(MediaType::Png),
            ImageFormat::WebP => Some(MediaType::WebP),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MediaType::Jpeg => "image/jpeg",
            MediaType::Png => "image/png",
            MediaType::WebP => "image/webp",
        }
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Encoded image ready for submission
///
/// Bytes are shared, so cloning the payload into a screen or an effect is cheap.
#[derive(Clone, PartialEq, Eq)]
pub struct ImagePayload {
    bytes: Arc<[u8]>,
    media_type: MediaType,
    width: u32,
    height: u32,
}

impl ImagePayload {
    pub fn new(bytes: Vec<u8>, media_type: MediaType, width: u32, height: u32) -> Self {
        Self {
            bytes: Arc::from(bytes),
            media_type,
            width,
            height,
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn media_type(&self) -> MediaType {
        self.media_type
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// `data:<mime>;base64,<payload>`
    pub fn to_data_url(&self) -> String {
        format!("data:{};base64,{}", self.media_type, STANDARD.encode(&self.bytes))
    }
}

impl fmt::Debug for ImagePayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImagePayload")
            .field("media_type", &self.media_type)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// Result of [`parse_data_url`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedDataUrl {
    pub media_type: Option<String>,
    pub bytes: Vec<u8>,
}

/// Accepts both `data:image/png;base64,....` and bare base64
pub fn parse_data_url(input: &str) -> Result<DecodedDataUrl, base64::DecodeError> {
    let input = input.trim();
    let (media_type, encoded) = match input.split_once(',') {
        Some((header, rest)) => {
            let mime = header
                .strip_prefix("data:")
                .map(|h| h.trim_end_matches(";base64").to_string())
                .filter(|m| !m.is_empty());
            (mime, rest)
        }
        None => (None, input),
    };
    let bytes = STANDARD.decode(encoded.trim())?;
    Ok(DecodedDataUrl { media_type, bytes })
}
