//! Object Detective Core - UI-independent workflow engine
//!
//! This crate contains the photo identification cycle (capture or upload,
//! submit, show a result) so it can be driven by any frontend (terminal
//! host, desktop shell, tests).

pub mod capture;
pub mod config;
pub mod error;
pub mod payload;
pub mod recognition;
pub mod redact;
pub mod render;
pub mod upload;
pub mod workflow;

pub use config::EngineConfig;
pub use error::WorkflowError;
pub use workflow::{Workflow, WorkflowState};
