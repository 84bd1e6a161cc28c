//! Outcome rendering - pure mapping from outcomes to screen models
//!
//! Screens are plain data. Choice buttons carry an index instead of a
//! callback; the host binds every one of them to `select_candidate(index)`.

use serde::Serialize;

use crate::payload::ImagePayload;
use crate::recognition::{Ambiguous, BoundingBox, Confident, DiagnosticIssue, LowConfidence, RecognitionOutcome};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Choice {
    pub label: String,
    pub index: usize,
    pub bounds: Option<BoundingBox>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Screen {
    Welcome,
    Capturing { stream_id: u64 },
    Previewing { image: ImagePayload },
    Submitting,
    Confident {
        headline: String,
        description: String,
        confidence_label: Option<String>,
        image: Option<ImagePayload>,
    },
    Ambiguous {
        message: String,
        choices: Vec<Choice>,
        image: Option<ImagePayload>,
    },
    LowConfidence {
        message: String,
        tip: Option<String>,
        explanation: Option<String>,
        choices: Vec<Choice>,
    },
    Error { message: String },
}

impl Screen {
    /// Slot name the host uses to pick its view
    pub fn name(&self) -> &'static str {
        match self {
            Screen::Welcome => "welcome",
            Screen::Capturing { .. } => "capturing",
            Screen::Previewing { .. } => "previewing",
            Screen::Submitting => "submitting",
            Screen::Confident { .. } => "result-confident",
            Screen::Ambiguous { .. } => "result-ambiguous",
            Screen::LowConfidence { .. } => "result-low-confidence",
            Screen::Error { .. } => "error",
        }
    }

    pub fn choices(&self) -> &[Choice] {
        match self {
            Screen::Ambiguous { choices, .. } | Screen::LowConfidence { choices, .. } => choices,
            _ => &[],
        }
    }
}

/// Display surface driven by the workflow
///
/// Desktop: swaps the visible view and binds choice buttons
/// CLI: prints the screen to stdout
pub trait RenderTarget: Send {
    fn render(&mut self, screen: &Screen);
}

/// Rounded whole percent, clamped to 0..=100
pub fn percent(confidence: f64) -> u32 {
    (confidence * 100.0).round().clamp(0.0, 100.0) as u32
}

pub fn render_outcome(outcome: &RecognitionOutcome, image: Option<&ImagePayload>) -> Screen {
    match outcome {
        RecognitionOutcome::Confident(c) => render_confident(c, image),
        RecognitionOutcome::Ambiguous(a) => render_ambiguous(a, image),
        RecognitionOutcome::LowConfidence(l) => render_low_confidence(l),
    }
}

pub fn render_confident(outcome: &Confident, image: Option<&ImagePayload>) -> Screen {
    Screen::Confident {
        headline: outcome.object_name.trim().to_uppercase(),
        description: outcome.description.clone(),
        confidence_label: outcome.confidence.map(|c| format!("{}% sure", percent(c))),
        image: image.cloned(),
    }
}

pub fn render_ambiguous(outcome: &Ambiguous, image: Option<&ImagePayload>) -> Screen {
    let choices = outcome
        .candidates
        .iter()
        .enumerate()
        .map(|(index, candidate)| Choice {
            label: candidate.object_name.clone(),
            index,
            bounds: candidate.bounds,
        })
        .collect();

    Screen::Ambiguous {
        message: outcome.message.clone(),
        choices,
        image: image.cloned(),
    }
}

pub fn render_low_confidence(outcome: &LowConfidence) -> Screen {
    let choices = outcome
        .guesses
        .iter()
        .enumerate()
        .map(|(index, guess)| Choice {
            label: match outcome.guess_confidence(index) {
                Some(c) => format!("{} ({}%)", guess, percent(c)),
                None => guess.clone(),
            },
            index,
            bounds: None,
        })
        .collect();

    Screen::LowConfidence {
        message: outcome.friendly_message.clone(),
        tip: outcome.issue.map(|issue| photo_tip(issue).to_string()),
        explanation: outcome.explanation.clone(),
        choices,
    }
}

fn photo_tip(issue: DiagnosticIssue) -> &'static str {
    match issue {
        DiagnosticIssue::Blur => "Try holding the camera very still.",
        DiagnosticIssue::TooClose => "Try stepping back so the whole thing fits.",
        DiagnosticIssue::TooFar => "Try getting a little closer.",
        DiagnosticIssue::Lighting => "Try moving somewhere with softer, brighter light.",
        DiagnosticIssue::Obstruction => "Try moving whatever is blocking the view.",
        DiagnosticIssue::Unclear => "Try pointing the camera at just one thing.",
    }
}
