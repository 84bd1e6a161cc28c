//! Still-image camera
//!
//! Stands in for a live viewfinder: every grabbed frame is the same image
//! file, re-read when the stream opens.

use async_trait::async_trait;
use detective_core::capture::{CaptureConstraints, CaptureDevice, Facing, LiveStream};
use detective_core::error::DeviceError;
use image::RgbImage;
use std::path::PathBuf;

pub struct FileCamera {
    path: Option<PathBuf>,
    facing: Facing,
}

impl FileCamera {
    /// `None` behaves like a machine without a camera
    pub fn new(path: Option<PathBuf>) -> Self {
        Self {
            path,
            facing: Facing::Rear,
        }
    }
}

#[async_trait]
impl CaptureDevice for FileCamera {
    async fn open(
        &self,
        constraints: &CaptureConstraints,
    ) -> Result<Box<dyn LiveStream>, DeviceError> {
        let path = match &self.path {
            Some(path) if path.exists() => path.clone(),
            _ => return Err(DeviceError::NotFound),
        };
        if constraints.facing.map_or(false, |f| f != self.facing) {
            return Err(DeviceError::Overconstrained);
        }

        let frame = tokio::task::spawn_blocking({
            let path = path.clone();
            move || image::open(&path).map(|img| img.to_rgb8())
        })
        .await
        .map_err(|e| DeviceError::Other(e.to_string()))?
        .map_err(|e| DeviceError::Other(format!("{}: {}", path.display(), e)))?;

        tracing::debug!("File camera opened {} ({}x{})", path.display(), frame.width(), frame.height());
        Ok(Box::new(FileStream {
            path,
            frame: Some(frame),
        }))
    }
}

struct FileStream {
    path: PathBuf,
    frame: Option<RgbImage>,
}

#[async_trait]
impl LiveStream for FileStream {
    fn label(&self) -> String {
        match &self.frame {
            Some(frame) => format!("{} {}x{}", self.path.display(), frame.width(), frame.height()),
            None => format!("{} (stopped)", self.path.display()),
        }
    }

    async fn grab_frame(&mut self) -> Result<RgbImage, DeviceError> {
        self.frame
            .clone()
            .ok_or_else(|| DeviceError::Other("stream stopped".to_string()))
    }

    fn stop(&mut self) {
        self.frame = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_png(dir: &tempfile::TempDir) -> PathBuf {
        let path = dir.path().join("desk.png");
        RgbImage::from_pixel(5, 4, image::Rgb([10, 20, 30]))
            .save(&path)
            .unwrap();
        path
    }

    #[tokio::test]
    async fn missing_file_is_not_found() {
        let err = FileCamera::new(Some("/nope/missing.png".into()))
            .open(&CaptureConstraints::unconstrained())
            .await
            .err()
            .unwrap();
        assert_eq!(err, DeviceError::NotFound);

        let err = FileCamera::new(None)
            .open(&CaptureConstraints::unconstrained())
            .await
            .err()
            .unwrap();
        assert_eq!(err, DeviceError::NotFound);
    }

    #[tokio::test]
    async fn front_facing_request_is_overconstrained() {
        let dir = tempfile::tempdir().unwrap();
        let camera = FileCamera::new(Some(write_png(&dir)));
        let constraints = CaptureConstraints {
            facing: Some(Facing::Front),
            ..CaptureConstraints::default()
        };
        assert_eq!(
            camera.open(&constraints).await.err().unwrap(),
            DeviceError::Overconstrained
        );
    }

    #[tokio::test]
    async fn frames_stop_after_stop() {
        let dir = tempfile::tempdir().unwrap();
        let camera = FileCamera::new(Some(write_png(&dir)));
        let mut stream = camera.open(&CaptureConstraints::unconstrained()).await.unwrap();

        let frame = stream.grab_frame().await.unwrap();
        assert_eq!(frame.dimensions(), (5, 4));
        assert!(stream.label().ends_with("5x4"));

        stream.stop();
        assert!(stream.grab_frame().await.is_err());
    }
}
