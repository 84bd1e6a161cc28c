//! Effect driver
//!
//! Owns the session plus every side-effecting collaborator. Each call runs
//! to completion: the event is applied, the screen re-rendered if anything
//! changed, and the resulting effects performed, feeding their results back
//! in until the queue drains.

use std::collections::VecDeque;
use std::sync::Arc;

use super::machine::{transition, Effect, Event, Session, WorkflowState};
use crate::capture::{CaptureDevice, CaptureManager};
use crate::config::EngineConfig;
use crate::error::ValidationError;
use crate::recognition::Recognizer;
use crate::render::{RenderTarget, Screen};
use crate::upload::{UploadCandidate, UploadValidator};

pub struct Workflow {
    session: Session,
    camera: CaptureManager,
    validator: UploadValidator,
    recognizer: Arc<dyn Recognizer>,
    target: Box<dyn RenderTarget>,
    rendered: Option<u64>,
    last_screen: Option<Screen>,
}

impl Workflow {
    /// Builds the workflow and renders the welcome screen
    pub fn new(
        config: &EngineConfig,
        device: Arc<dyn CaptureDevice>,
        recognizer: Arc<dyn Recognizer>,
        target: Box<dyn RenderTarget>,
    ) -> Self {
        let mut workflow = Self {
            session: Session::new(),
            camera: CaptureManager::new(
                device,
                config.capture_constraints(),
                config.capture.jpeg_quality,
            ),
            validator: UploadValidator::from_config(config),
            recognizer,
            target,
            rendered: None,
            last_screen: None,
        };
        workflow.render_if_changed();
        workflow
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn state(&self) -> WorkflowState {
        self.session.state()
    }

    pub fn screen(&self) -> Screen {
        self.session.screen()
    }

    pub fn camera_held(&self) -> bool {
        self.camera.is_held()
    }

    pub async fn dispatch(&mut self, event: Event) {
        let mut queue = VecDeque::from([event]);
        while let Some(event) = queue.pop_front() {
            let session = std::mem::take(&mut self.session);
            let (session, effects) = transition(session, event);
            self.session = session;
            self.render_if_changed();

            for effect in effects {
                if let Some(next) = self.perform(effect).await {
                    queue.push_back(next);
                }
            }
        }
    }

    async fn perform(&mut self, effect: Effect) -> Option<Event> {
        match effect {
            Effect::AcquireCamera => Some(Event::CameraAcquired(self.camera.acquire().await)),
            Effect::CaptureFrame(handle) => {
                Some(Event::FrameCaptured(self.camera.capture_frame(handle).await))
            }
            Effect::ReleaseCamera(handle) => {
                if !self.camera.release(handle) {
                    tracing::debug!("Stream {} was already released", handle.id());
                }
                None
            }
            Effect::ValidateUpload(candidate) => {
                Some(Event::UploadValidated(self.validator.validate(candidate).await))
            }
            Effect::Recognize { submission, image } => {
                let result = self.recognizer.recognize(&image).await;
                Some(Event::Recognized { submission, result })
            }
            Effect::Describe {
                submission,
                object_name,
                confidence,
            } => {
                let result = self.recognizer.describe(&object_name).await;
                Some(Event::Described {
                    submission,
                    object_name,
                    confidence,
                    result,
                })
            }
        }
    }

    /// Renders after an applied event unless the screen is unchanged
    fn render_if_changed(&mut self) {
        let revision = self.session.revision();
        if self.rendered == Some(revision) {
            return;
        }
        self.rendered = Some(revision);

        let screen = self.session.screen();
        if self.last_screen.as_ref() == Some(&screen) {
            return;
        }
        tracing::debug!("render {} (revision {})", screen.name(), revision);
        self.target.render(&screen);
        self.last_screen = Some(screen);
    }

    pub async fn start_camera(&mut self) {
        self.dispatch(Event::StartCamera).await
    }

    pub async fn capture_frame(&mut self) {
        self.dispatch(Event::CaptureFrame).await
    }

    pub async fn cancel_capture(&mut self) {
        self.dispatch(Event::CancelCapture).await
    }

    pub async fn choose_file(&mut self, candidate: UploadCandidate) {
        self.dispatch(Event::ChooseFile(candidate)).await
    }

    /// Report a file the host failed to read before it became a candidate
    pub async fn reject_file(&mut self, error: ValidationError) {
        self.dispatch(Event::FileRejected(error)).await
    }

    pub async fn submit(&mut self) {
        self.dispatch(Event::Submit).await
    }

    pub async fn select_candidate(&mut self, index: usize) {
        self.dispatch(Event::SelectCandidate(index)).await
    }

    pub async fn restart(&mut self) {
        self.dispatch(Event::Restart).await
    }

    /// Releases every held resource; safe to call more than once
    pub async fn teardown(&mut self) {
        self.dispatch(Event::Teardown).await;
        if self.camera.release_all() {
            tracing::warn!("Camera was still held at teardown");
        }
    }
}
