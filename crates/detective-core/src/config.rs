//! Engine configuration
//!
//! Loaded from a JSON file; every field has a default so a partial file is fine.
//! A missing or broken file falls back to defaults instead of failing startup.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::capture::{CaptureConstraints, Facing};
use crate::payload::MediaType;

/// Overrides `base_url` when set
pub const BASE_URL_ENV: &str = "OBJECT_DETECTIVE_URL";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EngineConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default)]
    pub bearer_token: Option<String>,
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: u64,
    #[serde(default = "default_allowed_media_types")]
    pub allowed_media_types: Vec<String>,
    #[serde(default)]
    pub capture: CaptureConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CaptureConfig {
    #[serde(default = "default_facing")]
    pub facing: Facing,
    #[serde(default = "default_ideal_width")]
    pub ideal_width: u32,
    #[serde(default = "default_ideal_height")]
    pub ideal_height: u32,
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,
}

fn default_base_url() -> String { "http://localhost:5000".to_string() }
fn default_request_timeout_secs() -> u64 { 120 }
fn default_max_upload_bytes() -> u64 { 10 * 1024 * 1024 }
fn default_allowed_media_types() -> Vec<String> {
    vec![
        "image/jpeg".to_string(),
        "image/png".to_string(),
        "image/webp".to_string(),
    ]
}
fn default_facing() -> Facing { Facing::Rear }
fn default_ideal_width() -> u32 { 1280 }
fn default_ideal_height() -> u32 { 720 }
fn default_jpeg_quality() -> u8 { 85 }

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            facing: default_facing(),
            ideal_width: default_ideal_width(),
            ideal_height: default_ideal_height(),
            jpeg_quality: default_jpeg_quality(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            request_timeout_secs: default_request_timeout_secs(),
            bearer_token: None,
            max_upload_bytes: default_max_upload_bytes(),
            allowed_media_types: default_allowed_media_types(),
            capture: CaptureConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Load from `path`, falling back to defaults, then apply env overrides
    pub fn load(path: Option<&Path>) -> Self {
        let mut config = match path {
            Some(path) if path.exists() => match std::fs::read_to_string(path) {
                Ok(content) => match serde_json::from_str::<EngineConfig>(&content) {
                    Ok(config) => {
                        tracing::info!("Loaded config from {:?}", path);
                        config
                    }
                    Err(e) => {
                        tracing::warn!("Failed to parse {:?}: {}, using defaults", path, e);
                        EngineConfig::default()
                    }
                },
                Err(e) => {
                    tracing::warn!("Failed to read {:?}: {}, using defaults", path, e);
                    EngineConfig::default()
                }
            },
            Some(path) => {
                tracing::info!("{:?} does not exist, using defaults", path);
                EngineConfig::default()
            }
            None => {
                tracing::info!("No config path given, using defaults");
                EngineConfig::default()
            }
        };

        if let Ok(url) = std::env::var(BASE_URL_ENV) {
            if !url.trim().is_empty() {
                tracing::info!("{} overrides base_url: {}", BASE_URL_ENV, url);
                config.base_url = url;
            }
        }
        config
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Allowed types that parse; unknown entries are logged and skipped
    pub fn allowed_types(&self) -> Vec<MediaType> {
        self.allowed_media_types
            .iter()
            .filter_map(|raw| {
                let parsed = MediaType::parse(raw);
                if parsed.is_none() {
                    tracing::warn!("Ignoring unsupported media type in config: {}", raw);
                }
                parsed
            })
            .collect()
    }

    pub fn capture_constraints(&self) -> CaptureConstraints {
        CaptureConstraints {
            facing: Some(self.capture.facing),
            ideal_width: Some(self.capture.ideal_width),
            ideal_height: Some(self.capture.ideal_height),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_defaults_for_missing_fields() {
        let parsed: EngineConfig =
            serde_json::from_str(r#"{"base_url":"http://detective.local:8080"}"#).unwrap();
        assert_eq!(parsed.base_url, "http://detective.local:8080");
        assert_eq!(parsed.request_timeout_secs, 120);
        assert_eq!(parsed.max_upload_bytes, 10 * 1024 * 1024);
        assert_eq!(parsed.capture.ideal_width, 1280);
        assert_eq!(parsed.capture.facing, Facing::Rear);
    }

    #[test]
    fn default_allowed_types_are_jpeg_png_webp() {
        let types = EngineConfig::default().allowed_types();
        assert_eq!(types, vec![MediaType::Jpeg, MediaType::Png, MediaType::WebP]);
    }

    #[test]
    fn unknown_configured_types_are_skipped() {
        let config = EngineConfig {
            allowed_media_types: vec!["image/png".into(), "image/heic".into()],
            ..EngineConfig::default()
        };
        assert_eq!(config.allowed_types(), vec![MediaType::Png]);
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let path = std::env::temp_dir().join("detective-core-no-such-config.json");
        let config = EngineConfig::load(Some(&path));
        assert_eq!(config.request_timeout_secs, 120);
    }

    #[test]
    fn broken_file_falls_back_to_defaults() {
        let path = std::env::temp_dir().join(format!(
            "detective-core-broken-{}.json",
            std::process::id()
        ));
        std::fs::write(&path, "{ not json").unwrap();
        let config = EngineConfig::load(Some(&path));
        let _ = std::fs::remove_file(&path);
        assert_eq!(config.max_upload_bytes, 10 * 1024 * 1024);
    }
}
