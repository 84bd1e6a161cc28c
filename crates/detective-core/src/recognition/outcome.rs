//! Normalized recognition outcomes and the wire decoding that produces them
//!
//! The backend answers with an envelope carrying at most one of `result`,
//! `multi_object` or `diagnostic`. Decoding happens here, once, so nothing
//! downstream ever probes raw JSON.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::RecognitionError;

/// Shown when the server fails without saying why
pub const GENERIC_SERVER_MESSAGE: &str = "Something went wrong! Let's try again.";

const DEFAULT_AMBIGUOUS_MESSAGE: &str = "I see a few things! Which one do you want to know about?";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Confident {
    pub object_name: String,
    pub description: String,
    #[serde(default)]
    pub confidence: Option<f64>,
}

impl Confident {
    /// Stand-in used when `describe` fails for a picked guess
    pub fn fallback(object_name: &str, confidence: Option<f64>) -> Self {
        Self {
            object_name: object_name.to_string(),
            description: format!(
                "This looks like {}! Take a closer look and see what you can discover about it.",
                object_name
            ),
            confidence,
        }
    }
}

/// `[ymin, xmin, ymax, xmax]` on a 0-1000 scale
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub ymin: u16,
    pub xmin: u16,
    pub ymax: u16,
    pub xmax: u16,
}

impl BoundingBox {
    fn from_wire(raw: &[i64]) -> Option<Self> {
        let clamp = |v: i64| v.clamp(0, 1000) as u16;
        match raw {
            [ymin, xmin, ymax, xmax] => Some(Self {
                ymin: clamp(*ymin),
                xmin: clamp(*xmin),
                ymax: clamp(*ymax),
                xmax: clamp(*xmax),
            }),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub object_name: String,
    pub confidence: f64,
    pub description: String,
    pub bounds: Option<BoundingBox>,
}

impl From<&Candidate> for Confident {
    fn from(candidate: &Candidate) -> Self {
        Self {
            object_name: candidate.object_name.clone(),
            description: candidate.description.clone(),
            confidence: Some(candidate.confidence),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ambiguous {
    pub message: String,
    pub candidates: Vec<Candidate>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiagnosticIssue {
    Blur,
    TooClose,
    TooFar,
    Lighting,
    Obstruction,
    Unclear,
}

impl DiagnosticIssue {
    /// Lenient: the server upper-cases whatever quality issue it found first
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_uppercase().as_str() {
            "BLUR" | "BLURRY" | "MOTION_BLUR" => DiagnosticIssue::Blur,
            "TOO_CLOSE" | "CROPPED" => DiagnosticIssue::TooClose,
            "TOO_FAR" => DiagnosticIssue::TooFar,
            "LIGHTING" | "DARK" | "BRIGHT" => DiagnosticIssue::Lighting,
            "OBSTRUCTION" => DiagnosticIssue::Obstruction,
            _ => DiagnosticIssue::Unclear,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LowConfidence {
    pub friendly_message: String,
    pub guesses: Vec<String>,
    pub guess_confidences: Option<Vec<f64>>,
    pub issue: Option<DiagnosticIssue>,
    pub explanation: Option<String>,
}

impl LowConfidence {
    /// Confidence at the same position as the guess, when the server sent one
    pub fn guess_confidence(&self, index: usize) -> Option<f64> {
        self.guess_confidences
            .as_ref()
            .and_then(|c| c.get(index).copied())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RecognitionOutcome {
    Confident(Confident),
    Ambiguous(Ambiguous),
    LowConfidence(LowConfidence),
}

impl RecognitionOutcome {
    pub fn kind(&self) -> &'static str {
        match self {
            RecognitionOutcome::Confident(_) => "confident",
            RecognitionOutcome::Ambiguous(_) => "ambiguous",
            RecognitionOutcome::LowConfidence(_) => "low_confidence",
        }
    }
}

#[derive(Deserialize)]
struct WireEnvelope {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    multi_object: Option<Value>,
    #[serde(default)]
    diagnostic: Option<Value>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Deserialize)]
struct WireResult {
    object_name: String,
    description: String,
    #[serde(default)]
    confidence: Option<f64>,
}

#[derive(Deserialize)]
struct WireMultiObject {
    #[serde(default)]
    message: Option<String>,
    objects: Vec<WireDetectedObject>,
}

#[derive(Deserialize)]
struct WireDetectedObject {
    object_name: String,
    #[serde(default)]
    confidence: f64,
    description: String,
    #[serde(default)]
    box_2d: Option<Vec<i64>>,
}

#[derive(Deserialize)]
struct WireDiagnostic {
    friendly_message: String,
    #[serde(default)]
    guesses: Vec<String>,
    #[serde(default)]
    confidence_of_guesses: Option<Vec<f64>>,
    #[serde(default)]
    issue: Option<String>,
    #[serde(default)]
    comprehensive_explanation: Option<String>,
}

impl From<WireResult> for Confident {
    fn from(w: WireResult) -> Self {
        Self {
            object_name: w.object_name,
            description: w.description,
            confidence: w.confidence,
        }
    }
}

fn server_error(message: Option<String>) -> RecognitionError {
    let message = message
        .map(|m| m.trim().to_string())
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| GENERIC_SERVER_MESSAGE.to_string());
    RecognitionError::Server(message)
}

/// Pull `error` out of a failure body if it happens to be JSON
fn error_message_from_body(body: &str) -> Option<String> {
    serde_json::from_str::<Value>(body)
        .ok()?
        .get("error")?
        .as_str()
        .map(str::to_string)
}

fn is_success_status(status: u16) -> bool {
    (200..300).contains(&status)
}

fn present(value: &Option<Value>) -> bool {
    matches!(value, Some(v) if !v.is_null())
}

fn decode_part<T: for<'de> Deserialize<'de>>(value: Value, what: &str) -> Result<T, RecognitionError> {
    serde_json::from_value(value)
        .map_err(|e| RecognitionError::Protocol(format!("malformed {}: {}", what, e)))
}

/// Decode a `recognize` response into exactly one outcome
pub fn decode_recognize(status: u16, body: &str) -> Result<RecognitionOutcome, RecognitionError> {
    if !is_success_status(status) {
        return Err(server_error(error_message_from_body(body)));
    }

    let envelope: WireEnvelope = serde_json::from_str(body)
        .map_err(|e| RecognitionError::Protocol(format!("unparseable response: {}", e)))?;

    if !envelope.success {
        return Err(server_error(envelope.error));
    }

    let populated = [&envelope.result, &envelope.multi_object, &envelope.diagnostic]
        .iter()
        .filter(|v| present(v))
        .count();
    if populated != 1 {
        return Err(RecognitionError::Protocol(format!(
            "success response carried {} outcomes, expected exactly one",
            populated
        )));
    }

    if let Some(result) = envelope.result.filter(|v| !v.is_null()) {
        let wire: WireResult = decode_part(result, "result")?;
        return Ok(RecognitionOutcome::Confident(wire.into()));
    }

    if let Some(multi) = envelope.multi_object.filter(|v| !v.is_null()) {
        let wire: WireMultiObject = decode_part(multi, "multi_object")?;
        if wire.objects.is_empty() {
            return Err(RecognitionError::Protocol(
                "multi_object response without candidates".to_string(),
            ));
        }
        let candidates = wire
            .objects
            .into_iter()
            .map(|o| Candidate {
                bounds: o.box_2d.as_deref().and_then(BoundingBox::from_wire),
                object_name: o.object_name,
                confidence: o.confidence,
                description: o.description,
            })
            .collect();
        return Ok(RecognitionOutcome::Ambiguous(Ambiguous {
            message: wire
                .message
                .filter(|m| !m.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_AMBIGUOUS_MESSAGE.to_string()),
            candidates,
        }));
    }

    let diagnostic = envelope.diagnostic.unwrap_or(Value::Null);
    let wire: WireDiagnostic = decode_part(diagnostic, "diagnostic")?;
    Ok(RecognitionOutcome::LowConfidence(LowConfidence {
        friendly_message: wire.friendly_message,
        guesses: wire.guesses,
        guess_confidences: wire.confidence_of_guesses,
        issue: wire.issue.as_deref().map(DiagnosticIssue::parse),
        explanation: wire.comprehensive_explanation,
    }))
}

/// Decode a `describe` response
///
/// Accepts the full envelope (`{"success":true,"result":{...}}`) or a bare
/// result object. Anything unusable is a server error; callers absorb it.
pub fn decode_describe(status: u16, body: &str) -> Result<Confident, RecognitionError> {
    if !is_success_status(status) {
        return Err(server_error(error_message_from_body(body)));
    }

    let value: Value = serde_json::from_str(body)
        .map_err(|e| RecognitionError::Server(format!("unparseable describe response: {}", e)))?;

    let result = if value.get("success").is_some() {
        let envelope: WireEnvelope = serde_json::from_value(value)
            .map_err(|e| RecognitionError::Server(format!("malformed describe envelope: {}", e)))?;
        if !envelope.success {
            return Err(server_error(envelope.error));
        }
        envelope
            .result
            .filter(|v| !v.is_null())
            .ok_or_else(|| RecognitionError::Server("describe response without result".to_string()))?
    } else {
        value
    };

    let wire: WireResult = serde_json::from_value(result)
        .map_err(|e| RecognitionError::Server(format!("malformed describe result: {}", e)))?;
    Ok(wire.into())
}
