//! Capture source management
//!
//! Owns the single live camera stream. Backends implement [`CaptureDevice`];
//! the manager adds classification, the constraint fallback and the release
//! guarantee:
//! - at most one stream is held at a time
//! - `release` is idempotent
//! - dropping the manager stops whatever is still held

use async_trait::async_trait;
use image::{DynamicImage, ImageOutputFormat, RgbImage};
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use std::sync::Arc;

use crate::error::{AcquisitionError, DeviceError};
use crate::payload::{ImagePayload, MediaType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Facing {
    Rear,
    Front,
}

/// Preferences passed to the device; all of them are hints
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CaptureConstraints {
    pub facing: Option<Facing>,
    pub ideal_width: Option<u32>,
    pub ideal_height: Option<u32>,
}

impl CaptureConstraints {
    pub fn unconstrained() -> Self {
        Self::default()
    }
}

/// Camera backend
///
/// Desktop: a V4L2 / platform camera binding
/// CLI: a still image standing in for the viewfinder
#[async_trait]
pub trait CaptureDevice: Send + Sync {
    /// Open and bind a stream. Return `DeviceError::Overconstrained` when the
    /// constraints cannot be met so the manager can retry without them.
    async fn open(&self, constraints: &CaptureConstraints)
        -> Result<Box<dyn LiveStream>, DeviceError>;
}

/// A bound, running stream
#[async_trait]
pub trait LiveStream: Send {
    /// Human readable description, e.g. "rear camera 1280x720"
    fn label(&self) -> String;

    async fn grab_frame(&mut self) -> Result<RgbImage, DeviceError>;

    /// Stop all tracks and free the hardware
    fn stop(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StreamHandle(pub(crate) u64);

impl StreamHandle {
    pub fn id(&self) -> u64 {
        self.0
    }
}

pub struct CaptureManager {
    device: Arc<dyn CaptureDevice>,
    constraints: CaptureConstraints,
    jpeg_quality: u8,
    active: Option<(StreamHandle, Box<dyn LiveStream>)>,
    next_id: u64,
}

impl CaptureManager {
    pub fn new(device: Arc<dyn CaptureDevice>, constraints: CaptureConstraints, jpeg_quality: u8) -> Self {
        Self {
            device,
            constraints,
            jpeg_quality,
            active: None,
            next_id: 0,
        }
    }

    pub async fn acquire(&mut self) -> Result<StreamHandle, AcquisitionError> {
        if let Some(handle) = self.active_handle() {
            tracing::warn!("acquire called while stream {} is held, releasing it first", handle.id());
            self.release(handle);
        }

        let stream = match self.device.open(&self.constraints).await {
            Ok(stream) => stream,
            Err(DeviceError::Overconstrained) => {
                tracing::info!("Camera rejected {:?}, retrying unconstrained", self.constraints);
                self.device
                    .open(&CaptureConstraints::unconstrained())
                    .await
                    .map_err(AcquisitionError::from)?
            }
            Err(e) => {
                tracing::warn!("Camera acquisition failed: {}", e);
                return Err(e.into());
            }
        };

        self.next_id += 1;
        let handle = StreamHandle(self.next_id);
        tracing::info!("Camera stream {} acquired: {}", handle.id(), stream.label());
        self.active = Some((handle, stream));
        Ok(handle)
    }

    /// Freeze the current frame into a JPEG payload. The stream stays held;
    /// the caller decides when to release.
    pub async fn capture_frame(&mut self, handle: StreamHandle) -> Result<ImagePayload, AcquisitionError> {
        let stream = match self.active.as_mut() {
            Some((held, stream)) if *held == handle => stream,
            _ => {
                return Err(AcquisitionError::Unknown(format!(
                    "stream {} is not active",
                    handle.id()
                )))
            }
        };
        let frame = stream.grab_frame().await?;
        encode_frame(frame, self.jpeg_quality)
    }

    /// Returns whether a stream was actually stopped
    pub fn release(&mut self, handle: StreamHandle) -> bool {
        match self.active.take() {
            Some((held, mut stream)) if held == handle => {
                stream.stop();
                tracing::info!("Camera stream {} released", held.id());
                true
            }
            other => {
                self.active = other;
                false
            }
        }
    }

    pub fn release_all(&mut self) -> bool {
        match self.active_handle() {
            Some(handle) => self.release(handle),
            None => false,
        }
    }

    pub fn is_held(&self) -> bool {
        self.active.is_some()
    }

    pub fn active_handle(&self) -> Option<StreamHandle> {
        self.active.as_ref().map(|(handle, _)| *handle)
    }
}

impl Drop for CaptureManager {
    fn drop(&mut self) {
        if let Some((handle, mut stream)) = self.active.take() {
            stream.stop();
            tracing::debug!("Camera stream {} released on drop", handle.id());
        }
    }
}

pub fn encode_frame(frame: RgbImage, quality: u8) -> Result<ImagePayload, AcquisitionError> {
    let (width, height) = frame.dimensions();
    let mut buf = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(frame)
        .write_to(&mut buf, ImageOutputFormat::Jpeg(quality))
        .map_err(|e| AcquisitionError::Unknown(format!("frame encode failed: {}", e)))?;
    Ok(ImagePayload::new(buf.into_inner(), MediaType::Jpeg, width, height))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Scripted device shared with the workflow tests
    #[derive(Default)]
    pub(crate) struct FakeDevice {
        pub opened: AtomicUsize,
        pub stopped: Arc<AtomicUsize>,
        pub failures: Mutex<Vec<DeviceError>>,
        pub seen: Mutex<Vec<CaptureConstraints>>,
    }

    impl FakeDevice {
        pub fn failing_with(errors: Vec<DeviceError>) -> Self {
            Self {
                failures: Mutex::new(errors),
                ..Self::default()
            }
        }

        pub fn stops(&self) -> usize {
            self.stopped.load(Ordering::SeqCst)
        }
    }

    struct FakeStream {
        stopped: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl LiveStream for FakeStream {
        fn label(&self) -> String {
            "fake rear camera".to_string()
        }

        async fn grab_frame(&mut self) -> Result<RgbImage, DeviceError> {
            Ok(RgbImage::from_pixel(8, 6, image::Rgb([200, 120, 40])))
        }

        fn stop(&mut self) {
            self.stopped.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl CaptureDevice for FakeDevice {
        async fn open(
            &self,
            constraints: &CaptureConstraints,
        ) -> Result<Box<dyn LiveStream>, DeviceError> {
            self.seen.lock().unwrap().push(constraints.clone());
            let next_failure = {
                let mut failures = self.failures.lock().unwrap();
                if failures.is_empty() { None } else { Some(failures.remove(0)) }
            };
            if let Some(err) = next_failure {
                return Err(err);
            }
            self.opened.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(FakeStream {
                stopped: self.stopped.clone(),
            }))
        }
    }

    fn rear_hd() -> CaptureConstraints {
        CaptureConstraints {
            facing: Some(Facing::Rear),
            ideal_width: Some(1280),
            ideal_height: Some(720),
        }
    }

    #[tokio::test]
    async fn captures_jpeg_frame_from_active_stream() {
        let device = Arc::new(FakeDevice::default());
        let mut manager = CaptureManager::new(device.clone(), rear_hd(), 85);

        let handle = manager.acquire().await.unwrap();
        let payload = manager.capture_frame(handle).await.unwrap();

        assert_eq!(payload.media_type(), MediaType::Jpeg);
        assert_eq!(payload.dimensions(), (8, 6));
        assert_eq!(image::guess_format(payload.bytes()).unwrap(), image::ImageFormat::Jpeg);
        assert_eq!(device.seen.lock().unwrap()[0], rear_hd());
    }

    #[tokio::test]
    async fn release_is_idempotent() {
        let device = Arc::new(FakeDevice::default());
        let mut manager = CaptureManager::new(device.clone(), rear_hd(), 85);

        let handle = manager.acquire().await.unwrap();
        assert!(manager.release(handle));
        assert!(!manager.release(handle));
        assert!(!manager.release_all());
        assert_eq!(device.stops(), 1);
        assert!(!manager.is_held());
    }

    #[tokio::test]
    async fn overconstrained_device_retries_without_hints() {
        let device = Arc::new(FakeDevice::failing_with(vec![DeviceError::Overconstrained]));
        let mut manager = CaptureManager::new(device.clone(), rear_hd(), 85);

        assert!(manager.acquire().await.is_ok());
        let seen = device.seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[1], CaptureConstraints::unconstrained());
    }

    #[tokio::test]
    async fn denied_permission_is_classified() {
        let device = Arc::new(FakeDevice::failing_with(vec![DeviceError::PermissionDenied]));
        let mut manager = CaptureManager::new(device, rear_hd(), 85);

        assert_eq!(manager.acquire().await, Err(AcquisitionError::PermissionDenied));
        assert!(!manager.is_held());
    }

    #[tokio::test]
    async fn stale_handle_cannot_capture() {
        let device = Arc::new(FakeDevice::default());
        let mut manager = CaptureManager::new(device, rear_hd(), 85);

        let first = manager.acquire().await.unwrap();
        manager.release(first);
        assert!(manager.capture_frame(first).await.is_err());
    }

    #[tokio::test]
    async fn second_acquire_releases_the_first_stream() {
        let device = Arc::new(FakeDevice::default());
        let mut manager = CaptureManager::new(device.clone(), rear_hd(), 85);

        let first = manager.acquire().await.unwrap();
        let second = manager.acquire().await.unwrap();
        assert_ne!(first, second);
        assert_eq!(device.stops(), 1);
        assert_eq!(manager.active_handle(), Some(second));
    }

    #[tokio::test]
    async fn dropping_manager_stops_held_stream() {
        let device = Arc::new(FakeDevice::default());
        {
            let mut manager = CaptureManager::new(device.clone(), rear_hd(), 85);
            manager.acquire().await.unwrap();
        }
        assert_eq!(device.stops(), 1);
    }
}
