//! Error taxonomy for the workflow engine
//!
//! Every error maps to exactly one friendly message. Technical detail is kept
//! for logs only; the only text shown verbatim is a message the server sent.

use thiserror::Error;

/// Raw failure reported by a capture device backend
///
/// Backends report what went wrong in their own terms; the capture manager
/// classifies it into an [`AcquisitionError`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DeviceError {
    #[error("permission to use the camera was denied")]
    PermissionDenied,
    #[error("no capture device found")]
    NotFound,
    #[error("capture device is in use")]
    Busy,
    #[error("capture device cannot satisfy the requested constraints")]
    Overconstrained,
    #[error("capture device failure: {0}")]
    Other(String),
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AcquisitionError {
    #[error("camera permission denied")]
    PermissionDenied,
    #[error("camera not found")]
    DeviceNotFound,
    #[error("camera busy")]
    DeviceBusy,
    #[error("camera error: {0}")]
    Unknown(String),
}

impl From<DeviceError> for AcquisitionError {
    fn from(err: DeviceError) -> Self {
        match err {
            DeviceError::PermissionDenied => AcquisitionError::PermissionDenied,
            DeviceError::NotFound => AcquisitionError::DeviceNotFound,
            DeviceError::Busy => AcquisitionError::DeviceBusy,
            DeviceError::Overconstrained => {
                AcquisitionError::Unknown("constraints could not be satisfied".to_string())
            }
            DeviceError::Other(detail) => AcquisitionError::Unknown(detail),
        }
    }
}

impl AcquisitionError {
    pub fn friendly_message(&self) -> String {
        match self {
            AcquisitionError::PermissionDenied => {
                "I need permission to use the camera! You can also upload a photo instead."
            }
            AcquisitionError::DeviceNotFound => {
                "I couldn't find a camera! Try uploading a photo instead."
            }
            AcquisitionError::DeviceBusy => {
                "The camera is busy with another app. Close it and try again!"
            }
            AcquisitionError::Unknown(_) => {
                "The camera didn't start. Try again, or upload a photo instead."
            }
        }
        .to_string()
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("file exceeds {max_bytes} bytes")]
    TooLarge { max_bytes: u64 },
    #[error("unsupported media type {found:?}, allowed: {allowed:?}")]
    UnsupportedType { found: String, allowed: Vec<String> },
    #[error("file could not be decoded: {0}")]
    Unreadable(String),
}

impl ValidationError {
    pub fn friendly_message(&self) -> String {
        match self {
            ValidationError::TooLarge { .. } => "Photo too big! Try a smaller one.".to_string(),
            ValidationError::UnsupportedType { .. } => {
                "This isn't a photo! Please choose a .jpg, .png or .webp file.".to_string()
            }
            ValidationError::Unreadable(_) => {
                "Can't open this file! Make sure it's a photo.".to_string()
            }
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RecognitionError {
    /// Connection failure, timeout or an unreadable body stream
    #[error("transport error: {0}")]
    Transport(String),
    /// Carries the server's own message, or a generic one when it sent none
    #[error("server error: {0}")]
    Server(String),
    /// Success response that matches no known outcome shape
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl RecognitionError {
    pub fn friendly_message(&self) -> String {
        match self {
            RecognitionError::Transport(_) => {
                "I couldn't reach the detective! Check your connection and try again.".to_string()
            }
            RecognitionError::Server(message) => message.clone(),
            RecognitionError::Protocol(_) => "Something went wrong! Let's try again.".to_string(),
        }
    }
}

/// Error stored on the session while the workflow sits in the Error state
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum WorkflowError {
    #[error(transparent)]
    Acquisition(#[from] AcquisitionError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Recognition(#[from] RecognitionError),
}

impl WorkflowError {
    pub fn friendly_message(&self) -> String {
        match self {
            WorkflowError::Acquisition(e) => e.friendly_message(),
            WorkflowError::Validation(e) => e.friendly_message(),
            WorkflowError::Recognition(e) => e.friendly_message(),
        }
    }
}
