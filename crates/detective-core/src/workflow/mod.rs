//! Workflow module - the identification cycle
//!
//! - Machine: pure `transition(Session, Event) -> (Session, Vec<Effect>)`
//! - Driver: performs effects against the camera, validator and recognizer

pub mod driver;
pub mod machine;

pub use driver::Workflow;
pub use machine::{transition, Effect, Event, Session, SubmissionId, WorkflowState};
