//! Recognition module - backend calls and outcome normalization
//!
//! - Outcome: tagged result types and wire decoding
//! - Client: the `Recognizer` seam and its HTTP implementation

pub mod client;
pub mod outcome;

pub use client::{HealthStatus, HttpRecognizer, Recognizer};
pub use outcome::{
    Ambiguous, BoundingBox, Candidate, Confident, DiagnosticIssue, LowConfidence,
    RecognitionOutcome,
};
