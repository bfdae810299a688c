//! UI controller: a rendering-independent state machine around a matting session
//!
//! State changes go through the pure [`reduce`] function; [`Controller`]
//! performs the session calls and dispatches their outcomes as events.
//! [`AppState::view`] derives what a UI surface shows.

use crate::session::MattingSession;
use crate::types::{EncodedImage, ImageRecord, ProcessedImages, SourceImage};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Outcome of model initialization
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ModelStatus {
    #[default]
    Pending,
    Loaded,
    Failed(String),
}

/// Coarse phase of the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Loading,
    Ready,
    Processing,
}

/// User-visible stage, combining the phase with the current record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiStage {
    Loading,
    ReadyNoImage,
    ReadyImageSelected,
    Processing,
    ReadyImageProcessed,
}

/// Events driving the state machine
#[derive(Debug, Clone)]
pub enum UiEvent {
    ModelLoaded,
    ModelFailed(String),
    FileSelected(ImageRecord),
    ProcessRequested,
    ProcessSucceeded { id: Uuid, images: ProcessedImages },
    ProcessFailed { id: Uuid, reason: String },
}

/// Complete controller state
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AppState {
    pub phase: Phase,
    pub model: ModelStatus,
    pub record: Option<ImageRecord>,
}

impl AppState {
    #[must_use]
    pub fn stage(&self) -> UiStage {
        match (self.phase, &self.record) {
            (Phase::Loading, _) => UiStage::Loading,
            (Phase::Processing, _) => UiStage::Processing,
            (Phase::Ready, None) => UiStage::ReadyNoImage,
            (Phase::Ready, Some(record)) if record.is_processed() => UiStage::ReadyImageProcessed,
            (Phase::Ready, Some(_)) => UiStage::ReadyImageSelected,
        }
    }

    /// Whether a process request would be accepted
    #[must_use]
    pub fn can_process(&self) -> bool {
        self.phase == Phase::Ready && self.record.is_some() && self.model == ModelStatus::Loaded
    }

    /// What the UI surface shows for this state
    #[must_use]
    pub fn view(&self) -> View<'_> {
        let stage = self.stage();
        let status = match (stage, &self.model) {
            (UiStage::Loading, _) => "Loading model...".to_string(),
            (UiStage::Processing, _) => "Processing...".to_string(),
            (_, ModelStatus::Failed(reason)) => format!("Model unavailable: {reason}"),
            (UiStage::ReadyNoImage, _) => "Select an image".to_string(),
            (UiStage::ReadyImageSelected, _) => "Ready to process".to_string(),
            (UiStage::ReadyImageProcessed, _) => "Done".to_string(),
        };

        View {
            stage,
            loading_overlay: stage == UiStage::Loading,
            trigger_visible: self.can_process(),
            source: self.record.as_ref().map(|r| &r.source),
            mask: self.record.as_ref().and_then(ImageRecord::mask),
            composite: self.record.as_ref().and_then(ImageRecord::composite),
            status,
        }
    }
}

/// Rendering-independent description of the UI surface
#[derive(Debug, Clone, PartialEq)]
pub struct View<'a> {
    pub stage: UiStage,
    /// Full-screen indicator while the model initializes
    pub loading_overlay: bool,
    /// The process trigger
    pub trigger_visible: bool,
    pub source: Option<&'a SourceImage>,
    pub mask: Option<&'a EncodedImage>,
    pub composite: Option<&'a EncodedImage>,
    pub status: String,
}

/// Apply one event. Events that do not fit the current phase leave the state unchanged.
#[must_use]
pub fn reduce(state: AppState, event: UiEvent) -> AppState {
    match (state.phase, event) {
        (Phase::Loading, UiEvent::ModelLoaded) => AppState {
            phase: Phase::Ready,
            model: ModelStatus::Loaded,
            ..state
        },
        (Phase::Loading, UiEvent::ModelFailed(reason)) => AppState {
            phase: Phase::Ready,
            model: ModelStatus::Failed(reason),
            ..state
        },
        (Phase::Ready, UiEvent::FileSelected(record)) => AppState {
            record: Some(record),
            ..state
        },
        (Phase::Ready, UiEvent::ProcessRequested) if state.can_process() => AppState {
            phase: Phase::Processing,
            ..state
        },
        (Phase::Processing, UiEvent::ProcessSucceeded { id, images }) => match state.record {
            Some(record) if record.id == id => AppState {
                phase: Phase::Ready,
                record: Some(record.with_results(images)),
                model: state.model,
            },
            record => {
                debug!(%id, "Dropping result for a replaced image");
                AppState {
                    phase: Phase::Ready,
                    record,
                    ..state
                }
            },
        },
        (Phase::Processing, UiEvent::ProcessFailed { id, .. }) => {
            if !state.record.as_ref().is_some_and(|r| r.id == id) {
                debug!(%id, "Dropping failure for a replaced image");
            }
            AppState {
                phase: Phase::Ready,
                ..state
            }
        },
        (phase, event) => {
            debug!(?phase, event = event_name(&event), "Event ignored");
            state
        },
    }
}

fn event_name(event: &UiEvent) -> &'static str {
    match event {
        UiEvent::ModelLoaded => "model_loaded",
        UiEvent::ModelFailed(_) => "model_failed",
        UiEvent::FileSelected(_) => "file_selected",
        UiEvent::ProcessRequested => "process_requested",
        UiEvent::ProcessSucceeded { .. } => "process_succeeded",
        UiEvent::ProcessFailed { .. } => "process_failed",
    }
}

/// Drives a matting session through the state machine
#[derive(Debug)]
pub struct Controller<S: MattingSession> {
    session: S,
    state: AppState,
}

impl<S: MattingSession> Controller<S> {
    /// New controller in the `Loading` stage
    pub fn new(session: S) -> Self {
        Self {
            session,
            state: AppState::default(),
        }
    }

    #[must_use]
    pub fn state(&self) -> &AppState {
        &self.state
    }

    #[must_use]
    pub fn view(&self) -> View<'_> {
        self.state.view()
    }

    #[must_use]
    pub fn session(&self) -> &S {
        &self.session
    }

    /// Apply an event to the current state
    pub fn dispatch(&mut self, event: UiEvent) {
        let state = std::mem::take(&mut self.state);
        self.state = reduce(state, event);
    }

    /// Initialize the session and leave `Loading` whatever the outcome.
    /// A failure is logged and disables processing.
    pub async fn mount(&mut self) {
        match self.session.initialize().await {
            Ok(true) => {
                info!(model = self.session.model_id(), "Model ready");
                self.dispatch(UiEvent::ModelLoaded);
            },
            Ok(false) => {
                warn!(model = self.session.model_id(), "Model did not load");
                self.dispatch(UiEvent::ModelFailed("model did not load".to_string()));
            },
            Err(e) => {
                error!(model = self.session.model_id(), error = %e, "Model initialization failed");
                self.dispatch(UiEvent::ModelFailed(e.to_string()));
            },
        }
    }

    /// Replace the current image with a freshly selected one.
    /// Returns `false` when the selection was ignored (model loading or processing).
    pub fn select_file(&mut self, source: SourceImage) -> bool {
        let record = ImageRecord::new(source);
        let id = record.id;
        self.dispatch(UiEvent::FileSelected(record));
        self.state.record.as_ref().is_some_and(|r| r.id == id)
    }

    /// Process the current image. Returns `true` when both artifacts were produced.
    /// Failures are logged and the image stays selected.
    pub async fn process(&mut self) -> bool {
        self.dispatch(UiEvent::ProcessRequested);
        if self.state.phase != Phase::Processing {
            debug!(stage = ?self.state.stage(), "Process trigger not available");
            return false;
        }

        let Some(record) = self.state.record.as_ref() else {
            return false;
        };
        let id = record.id;
        let source = record.source.clone();

        match self.session.run(&source).await {
            Ok(images) => {
                info!(
                    file = %source.name,
                    foreground = images.statistics.foreground_ratio,
                    total_ms = images.timings.total_ms,
                    "Background removed"
                );
                self.dispatch(UiEvent::ProcessSucceeded { id, images });
                true
            },
            Err(e) => {
                error!(file = %source.name, error = %e, "Processing failed");
                self.dispatch(UiEvent::ProcessFailed {
                    id,
                    reason: e.to_string(),
                });
                false
            },
        }
    }
}
