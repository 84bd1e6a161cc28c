//! Pure workflow transitions
//!
//! `transition` takes the session by value and hands it back together with
//! the effects the driver must perform. Async results come back in as
//! settle events; recognize/describe results are tagged with the submission
//! they belong to and dropped when they no longer match.

use crate::capture::StreamHandle;
use crate::error::{AcquisitionError, RecognitionError, ValidationError, WorkflowError};
use crate::payload::ImagePayload;
use crate::recognition::outcome::GENERIC_SERVER_MESSAGE;
use crate::recognition::{Confident, RecognitionOutcome};
use crate::render::{render_outcome, Screen};
use crate::upload::UploadCandidate;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowState {
    Welcome,
    Capturing,
    Previewing,
    Submitting,
    ResultConfident,
    ResultAmbiguous,
    ResultLowConfidence,
    Error,
}

impl WorkflowState {
    pub fn is_result(&self) -> bool {
        matches!(
            self,
            WorkflowState::ResultConfident
                | WorkflowState::ResultAmbiguous
                | WorkflowState::ResultLowConfidence
        )
    }
}

pub type SubmissionId = u64;

/// Acquisition started from Welcome whose result has not come back yet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Awaiting {
    Camera,
    Frame,
    Upload,
}

#[derive(Debug)]
pub enum Event {
    StartCamera,
    CaptureFrame,
    ChooseFile(UploadCandidate),
    /// The host could not even produce a candidate (unreadable path, bad paste)
    FileRejected(ValidationError),
    Submit,
    SelectCandidate(usize),
    /// Retake / try again / back
    Restart,
    CancelCapture,
    /// Host is going away; release everything
    Teardown,

    CameraAcquired(Result<StreamHandle, AcquisitionError>),
    FrameCaptured(Result<ImagePayload, AcquisitionError>),
    UploadValidated(Result<ImagePayload, ValidationError>),
    Recognized {
        submission: SubmissionId,
        result: Result<RecognitionOutcome, RecognitionError>,
    },
    Described {
        submission: SubmissionId,
        object_name: String,
        confidence: Option<f64>,
        result: Result<Confident, RecognitionError>,
    },
}

impl Event {
    fn label(&self) -> &'static str {
        match self {
            Event::StartCamera => "start_camera",
            Event::CaptureFrame => "capture_frame",
            Event::ChooseFile(_) => "choose_file",
            Event::FileRejected(_) => "file_rejected",
            Event::Submit => "submit",
            Event::SelectCandidate(_) => "select_candidate",
            Event::Restart => "restart",
            Event::CancelCapture => "cancel_capture",
            Event::Teardown => "teardown",
            Event::CameraAcquired(_) => "camera_acquired",
            Event::FrameCaptured(_) => "frame_captured",
            Event::UploadValidated(_) => "upload_validated",
            Event::Recognized { .. } => "recognized",
            Event::Described { .. } => "described",
        }
    }
}

#[derive(Debug)]
pub enum Effect {
    AcquireCamera,
    CaptureFrame(StreamHandle),
    ReleaseCamera(StreamHandle),
    ValidateUpload(UploadCandidate),
    Recognize {
        submission: SubmissionId,
        image: ImagePayload,
    },
    Describe {
        submission: SubmissionId,
        object_name: String,
        confidence: Option<f64>,
    },
}

/// Everything the workflow knows about the current cycle
#[derive(Debug, Clone)]
pub struct Session {
    state: WorkflowState,
    image: Option<ImagePayload>,
    active_stream: Option<StreamHandle>,
    outcome: Option<RecognitionOutcome>,
    error: Option<WorkflowError>,
    awaiting: Option<Awaiting>,
    submission: SubmissionId,
    revision: u64,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        Self {
            state: WorkflowState::Welcome,
            image: None,
            active_stream: None,
            outcome: None,
            error: None,
            awaiting: None,
            submission: 0,
            revision: 0,
        }
    }

    pub fn state(&self) -> WorkflowState {
        self.state
    }

    pub fn image(&self) -> Option<&ImagePayload> {
        self.image.as_ref()
    }

    pub fn active_stream(&self) -> Option<StreamHandle> {
        self.active_stream
    }

    pub fn outcome(&self) -> Option<&RecognitionOutcome> {
        self.outcome.as_ref()
    }

    pub fn error(&self) -> Option<&WorkflowError> {
        self.error.as_ref()
    }

    pub fn submission(&self) -> SubmissionId {
        self.submission
    }

    /// Bumped on every applied transition; ignored events leave it alone
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn screen(&self) -> Screen {
        match self.state {
            WorkflowState::Welcome => Screen::Welcome,
            WorkflowState::Capturing => Screen::Capturing {
                stream_id: self.active_stream.map(|h| h.id()).unwrap_or_default(),
            },
            WorkflowState::Previewing => match &self.image {
                Some(image) => Screen::Previewing {
                    image: image.clone(),
                },
                None => Screen::Welcome,
            },
            WorkflowState::Submitting => Screen::Submitting,
            WorkflowState::ResultConfident
            | WorkflowState::ResultAmbiguous
            | WorkflowState::ResultLowConfidence => match &self.outcome {
                Some(outcome) => render_outcome(outcome, self.image.as_ref()),
                None => Screen::Welcome,
            },
            WorkflowState::Error => Screen::Error {
                message: self
                    .error
                    .as_ref()
                    .map(|e| e.friendly_message())
                    .unwrap_or_else(|| GENERIC_SERVER_MESSAGE.to_string()),
            },
        }
    }

    fn enter(&mut self, state: WorkflowState) {
        tracing::debug!("workflow: {:?} -> {:?}", self.state, state);
        self.state = state;
    }

    fn fail(&mut self, error: WorkflowError) {
        tracing::warn!("workflow error: {}", error);
        self.error = Some(error);
        self.outcome = None;
        self.awaiting = None;
        self.enter(WorkflowState::Error);
    }

    fn settle(&mut self, outcome: RecognitionOutcome) {
        let state = match &outcome {
            RecognitionOutcome::Confident(_) => WorkflowState::ResultConfident,
            RecognitionOutcome::Ambiguous(_) => WorkflowState::ResultAmbiguous,
            RecognitionOutcome::LowConfidence(_) => WorkflowState::ResultLowConfidence,
        };
        self.outcome = Some(outcome);
        self.enter(state);
    }

    /// Back to Welcome, dropping the image and any held stream
    fn reset(&mut self) -> Vec<Effect> {
        let effects = self
            .active_stream
            .take()
            .map(Effect::ReleaseCamera)
            .into_iter()
            .collect();
        self.image = None;
        self.outcome = None;
        self.error = None;
        self.awaiting = None;
        self.enter(WorkflowState::Welcome);
        effects
    }

    /// Leave Capturing for `next`, releasing the stream
    fn leave_capture(&mut self) -> Vec<Effect> {
        self.awaiting = None;
        self.active_stream
            .take()
            .map(Effect::ReleaseCamera)
            .into_iter()
            .collect()
    }
}

/// Apply one event. Events that make no sense in the current state are
/// ignored and produce no effects.
pub fn transition(mut session: Session, event: Event) -> (Session, Vec<Effect>) {
    use WorkflowState as S;

    let label = event.label();
    let from = session.state;

    let applied: Option<Vec<Effect>> = match (session.state, event) {
        (_, Event::Restart) | (_, Event::Teardown) => Some(session.reset()),

        (S::Welcome, Event::StartCamera) if session.awaiting.is_none() => {
            session.awaiting = Some(Awaiting::Camera);
            Some(vec![Effect::AcquireCamera])
        }
        (S::Welcome, Event::CameraAcquired(result)) if session.awaiting == Some(Awaiting::Camera) => {
            session.awaiting = None;
            match result {
                Ok(handle) => {
                    session.active_stream = Some(handle);
                    session.enter(S::Capturing);
                }
                Err(e) => session.fail(e.into()),
            }
            Some(Vec::new())
        }
        // Nobody is waiting for this stream any more
        (_, Event::CameraAcquired(Ok(handle))) => {
            tracing::warn!("Releasing camera stream {} acquired after the request was abandoned", handle.id());
            Some(vec![Effect::ReleaseCamera(handle)])
        }

        (S::Capturing, Event::CaptureFrame) if session.awaiting.is_none() => {
            session.active_stream.map(|handle| {
                session.awaiting = Some(Awaiting::Frame);
                vec![Effect::CaptureFrame(handle)]
            })
        }
        (S::Capturing, Event::FrameCaptured(result)) if session.awaiting == Some(Awaiting::Frame) => {
            let effects = session.leave_capture();
            match result {
                Ok(image) => {
                    session.image = Some(image);
                    session.enter(S::Previewing);
                }
                Err(e) => session.fail(e.into()),
            }
            Some(effects)
        }
        (S::Capturing, Event::CancelCapture) => {
            let effects = session.leave_capture();
            session.enter(S::Welcome);
            Some(effects)
        }

        (S::Welcome, Event::ChooseFile(candidate)) if session.awaiting.is_none() => {
            session.awaiting = Some(Awaiting::Upload);
            Some(vec![Effect::ValidateUpload(candidate)])
        }
        (S::Welcome, Event::FileRejected(error)) if session.awaiting.is_none() => {
            session.fail(error.into());
            Some(Vec::new())
        }
        (S::Welcome, Event::UploadValidated(result)) if session.awaiting == Some(Awaiting::Upload) => {
            session.awaiting = None;
            match result {
                Ok(image) => {
                    session.image = Some(image);
                    session.enter(S::Previewing);
                }
                Err(e) => session.fail(e.into()),
            }
            Some(Vec::new())
        }

        (S::Previewing, Event::Submit) => session.image.clone().map(|image| {
            session.submission += 1;
            session.enter(S::Submitting);
            vec![Effect::Recognize {
                submission: session.submission,
                image,
            }]
        }),
        (S::Submitting, Event::Recognized { submission, result }) if submission == session.submission => {
            match result {
                Ok(outcome) => session.settle(outcome),
                Err(e) => session.fail(e.into()),
            }
            Some(Vec::new())
        }

        (S::ResultAmbiguous, Event::SelectCandidate(index)) => {
            let picked = match &session.outcome {
                Some(RecognitionOutcome::Ambiguous(a)) => a.candidates.get(index).map(Confident::from),
                _ => None,
            };
            picked.map(|confident| {
                tracing::info!("Candidate {} picked: {}", index, confident.object_name);
                session.settle(RecognitionOutcome::Confident(confident));
                Vec::new()
            })
        }
        (S::ResultLowConfidence, Event::SelectCandidate(index)) => {
            let picked = match &session.outcome {
                Some(RecognitionOutcome::LowConfidence(l)) => l
                    .guesses
                    .get(index)
                    .map(|name| (name.clone(), l.guess_confidence(index))),
                _ => None,
            };
            picked.map(|(object_name, confidence)| {
                tracing::info!("Guess {} picked: {}", index, object_name);
                session.submission += 1;
                session.enter(S::Submitting);
                vec![Effect::Describe {
                    submission: session.submission,
                    object_name,
                    confidence,
                }]
            })
        }
        (
            S::Submitting,
            Event::Described {
                submission,
                object_name,
                confidence,
                result,
            },
        ) if submission == session.submission => {
            let confident = match result {
                Ok(confident) => confident,
                Err(e) => {
                    tracing::warn!("describe failed for {:?}, using fallback: {}", object_name, e);
                    Confident::fallback(&object_name, confidence)
                }
            };
            session.settle(RecognitionOutcome::Confident(confident));
            Some(Vec::new())
        }

        (_, Event::Recognized { submission, .. }) | (_, Event::Described { submission, .. }) => {
            tracing::debug!(
                "Dropping stale result for submission {} (current {}, state {:?})",
                submission,
                session.submission,
                session.state
            );
            None
        }

        _ => None,
    };

    match applied {
        Some(effects) => {
            session.revision += 1;
            tracing::debug!("{} applied in {:?}, {} effect(s)", label, from, effects.len());
            (session, effects)
        }
        None => {
            tracing::debug!("{} ignored in {:?}", label, from);
            (session, Vec::new())
        }
    }
}
