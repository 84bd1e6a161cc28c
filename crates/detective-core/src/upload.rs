//! Upload validation
//!
//! Checks size and declared type first, then decodes the bytes off the event
//! loop. Either the caller gets a complete payload or an error, never a
//! half-decoded image.

use anyhow::{Context, Result};
use std::fmt;
use std::path::Path;

use crate::config::EngineConfig;
use crate::error::ValidationError;
use crate::payload::{parse_data_url, ImagePayload, MediaType};

/// File handed over by the picker / drag-drop surface
#[derive(Clone)]
pub struct UploadCandidate {
    pub bytes: Vec<u8>,
    pub declared_size: u64,
    pub declared_media_type: String,
    pub file_name: Option<String>,
}

impl UploadCandidate {
    pub fn new(bytes: Vec<u8>, declared_media_type: impl Into<String>) -> Self {
        Self {
            declared_size: bytes.len() as u64,
            bytes,
            declared_media_type: declared_media_type.into(),
            file_name: None,
        }
    }

    /// Read a file from disk, declaring its type from the extension the way a
    /// browser file picker does
    pub async fn from_file(path: &Path) -> Result<Self> {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("failed to read {}", path.display()))?;
        let declared_media_type = path
            .extension()
            .and_then(|ext| ext.to_str())
            .and_then(MediaType::from_extension)
            .map(|m| m.as_str().to_string())
            .unwrap_or_else(|| "application/octet-stream".to_string());

        Ok(Self {
            declared_size: bytes.len() as u64,
            bytes,
            declared_media_type,
            file_name: path.file_name().map(|n| n.to_string_lossy().into_owned()),
        })
    }

    /// Pasted `data:` URL or bare base64. Without a header the type is
    /// sniffed from the bytes.
    pub fn from_data_url(input: &str) -> Result<Self> {
        let decoded = parse_data_url(input).context("not a valid base64 data URL")?;
        let declared_media_type = decoded.media_type.unwrap_or_else(|| {
            image::guess_format(&decoded.bytes)
                .ok()
                .and_then(MediaType::from_format)
                .map(|m| m.as_str().to_string())
                .unwrap_or_else(|| "application/octet-stream".to_string())
        });
        Ok(Self::new(decoded.bytes, declared_media_type))
    }
}

impl fmt::Debug for UploadCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadCandidate")
            .field("file_name", &self.file_name)
            .field("declared_size", &self.declared_size)
            .field("declared_media_type", &self.declared_media_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct UploadValidator {
    max_bytes: u64,
    allowed: Vec<MediaType>,
}

impl UploadValidator {
    pub fn new(max_bytes: u64, allowed: Vec<MediaType>) -> Self {
        Self { max_bytes, allowed }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.max_upload_bytes, config.allowed_types())
    }

    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    fn allowed_names(&self) -> Vec<String> {
        self.allowed.iter().map(|m| m.as_str().to_string()).collect()
    }

    /// Size and declared type, before any decoding
    pub fn check_declared(&self, candidate: &UploadCandidate) -> Result<MediaType, ValidationError> {
        let size = candidate.declared_size.max(candidate.bytes.len() as u64);
        if size > self.max_bytes {
            return Err(ValidationError::TooLarge {
                max_bytes: self.max_bytes,
            });
        }

        match MediaType::parse(&candidate.declared_media_type) {
            Some(media_type) if self.allowed.contains(&media_type) => Ok(media_type),
            _ => Err(ValidationError::UnsupportedType {
                found: candidate.declared_media_type.clone(),
                allowed: self.allowed_names(),
            }),
        }
    }

    pub async fn validate(&self, candidate: UploadCandidate) -> Result<ImagePayload, ValidationError> {
        self.check_declared(&candidate)?;

        let allowed = self.allowed.clone();
        let allowed_names = self.allowed_names();
        let bytes = candidate.bytes;

        let decoded = tokio::task::spawn_blocking(move || {
            let format = image::guess_format(&bytes)
                .map_err(|e| ValidationError::Unreadable(e.to_string()))?;
            let media_type = match MediaType::from_format(format) {
                Some(m) if allowed.contains(&m) => m,
                _ => {
                    return Err(ValidationError::UnsupportedType {
                        found: format!("{:?}", format),
                        allowed: allowed_names,
                    })
                }
            };
            let img = image::load_from_memory_with_format(&bytes, format)
                .map_err(|e| ValidationError::Unreadable(e.to_string()))?;
            Ok(ImagePayload::new(bytes, media_type, img.width(), img.height()))
        })
        .await
        .map_err(|e| ValidationError::Unreadable(format!("decoder task failed: {}", e)))?;

        match &decoded {
            Ok(payload) => tracing::info!(
                "Upload accepted: {:?} ({} bytes, {:?})",
                candidate.file_name,
                payload.len(),
                payload.dimensions()
            ),
            Err(e) => tracing::warn!("Upload rejected: {:?}: {}", candidate.file_name, e),
        }
        decoded
    }
}
