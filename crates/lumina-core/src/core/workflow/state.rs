//! Workflow State
//!
//! The states of the visual search workflow and the views derived from them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::{
    search::{DetectedRegion, SearchResult},
    upload::{Preview, UploadedImage},
    CoreError,
};

// =============================================================================
// Detection Snapshot
// =============================================================================

/// An image together with the regions detected in it
#[derive(Clone, Debug, PartialEq)]
pub struct DetectionSnapshot {
    /// The validated image the regions belong to
    pub image: UploadedImage,
    /// Displayable preview, when one could be built
    pub preview: Option<Preview>,
    /// Detected regions in service order; may be empty
    pub regions: Vec<DetectedRegion>,
    /// Region used for the latest similarity search
    pub selected: Option<usize>,
}

impl DetectionSnapshot {
    pub fn new(image: UploadedImage, preview: Option<Preview>, regions: Vec<DetectedRegion>) -> Self {
        Self {
            image,
            preview,
            regions,
            selected: None,
        }
    }

    /// Returns the region at `index`, if any
    pub fn region(&self, index: usize) -> Option<&DetectedRegion> {
        self.regions.get(index)
    }

    /// Returns a copy with `index` marked as selected
    pub fn with_selected(&self, index: usize) -> Self {
        Self {
            selected: Some(index),
            ..self.clone()
        }
    }
}

// =============================================================================
// Workflow State
// =============================================================================

/// Coarse phase of the workflow, for logs and status lines
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowPhase {
    Idle,
    Detecting,
    DetectionReady,
    Searching,
    SearchReady,
    Error,
}

impl std::fmt::Display for WorkflowPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            WorkflowPhase::Idle => "idle",
            WorkflowPhase::Detecting => "detecting",
            WorkflowPhase::DetectionReady => "detection_ready",
            WorkflowPhase::Searching => "searching",
            WorkflowPhase::SearchReady => "search_ready",
            WorkflowPhase::Error => "error",
        };
        write!(f, "{}", name)
    }
}

/// State of the visual search workflow.
///
/// `Idle` is initial and there is no terminal state. `Error` keeps the last
/// stable state so its detections or results stay visible underneath.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum WorkflowState {
    #[default]
    Idle,
    /// Waiting for detection on a freshly selected image
    Detecting { image: UploadedImage },
    /// Detection finished; regions can be selected
    DetectionReady(DetectionSnapshot),
    /// Waiting for a text or region search
    Searching {
        query: Option<String>,
        detection: Option<DetectionSnapshot>,
    },
    /// Ranked results, layered over the detection for region searches
    SearchReady {
        results: Vec<SearchResult>,
        query: Option<String>,
        detection: Option<DetectionSnapshot>,
    },
    /// A failed operation over the last stable state
    Error {
        message: String,
        previous: Box<WorkflowState>,
    },
}

impl WorkflowState {
    /// Builds an error state carrying the user-facing message for `error`
    pub fn error(error: &CoreError, previous: WorkflowState) -> Self {
        WorkflowState::Error {
            message: error.user_message(),
            previous: Box::new(previous.stable().clone()),
        }
    }

    pub fn phase(&self) -> WorkflowPhase {
        match self {
            WorkflowState::Idle => WorkflowPhase::Idle,
            WorkflowState::Detecting { .. } => WorkflowPhase::Detecting,
            WorkflowState::DetectionReady(_) => WorkflowPhase::DetectionReady,
            WorkflowState::Searching { .. } => WorkflowPhase::Searching,
            WorkflowState::SearchReady { .. } => WorkflowPhase::SearchReady,
            WorkflowState::Error { .. } => WorkflowPhase::Error,
        }
    }

    /// Returns true while a request is in flight
    pub fn is_busy(&self) -> bool {
        matches!(
            self,
            WorkflowState::Detecting { .. } | WorkflowState::Searching { .. }
        )
    }

    /// Returns true for states that can sit underneath an error
    pub fn is_stable(&self) -> bool {
        matches!(
            self,
            WorkflowState::Idle
                | WorkflowState::DetectionReady(_)
                | WorkflowState::SearchReady { .. }
        )
    }

    /// The stable state shown to the user: itself, or the state under an error
    pub fn stable(&self) -> &WorkflowState {
        match self {
            WorkflowState::Error { previous, .. } => previous.stable(),
            other => other,
        }
    }

    /// Detection currently visible, including one under an error
    pub fn detection(&self) -> Option<&DetectionSnapshot> {
        match self {
            WorkflowState::DetectionReady(detection) => Some(detection),
            WorkflowState::Searching { detection, .. }
            | WorkflowState::SearchReady { detection, .. } => detection.as_ref(),
            WorkflowState::Error { previous, .. } => previous.detection(),
            _ => None,
        }
    }

    /// Results currently visible, including ones under an error
    pub fn results(&self) -> Option<&[SearchResult]> {
        match self {
            WorkflowState::SearchReady { results, .. } => Some(results),
            WorkflowState::Error { previous, .. } => previous.results(),
            _ => None,
        }
    }

    /// Image the workflow is working on, if any
    pub fn image(&self) -> Option<&UploadedImage> {
        match self {
            WorkflowState::Detecting { image } => Some(image),
            other => other.detection().map(|d| &d.image),
        }
    }

    /// User-facing error message, when in `Error`
    pub fn error_message(&self) -> Option<&str> {
        match self {
            WorkflowState::Error { message, .. } => Some(message),
            _ => None,
        }
    }
}

// =============================================================================
// Transition Outcome
// =============================================================================

/// What an entry point did to the workflow
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transition {
    /// The state changed as a result of this call
    Applied,
    /// A newer request of the same kind was issued; the response was dropped
    Superseded,
    /// A precondition was not met; nothing was sent and nothing changed
    Ignored,
}

// =============================================================================
// Workflow View
// =============================================================================

/// Everything a display surface needs to draw the workflow
#[derive(Clone, Debug, PartialEq)]
pub struct WorkflowView {
    pub state: WorkflowState,
    pub phase: WorkflowPhase,
    pub query: Option<String>,
    pub detection: Option<DetectionSnapshot>,
    pub results: Option<Vec<SearchResult>>,
    pub preview: Option<Preview>,
    pub error: Option<String>,
    /// When the state last changed; `None` before the first transition
    pub updated_at: Option<DateTime<Utc>>,
}

impl WorkflowView {
    pub(crate) fn new(
        state: WorkflowState,
        query: Option<String>,
        updated_at: Option<DateTime<Utc>>,
    ) -> Self {
        let detection = state.detection().cloned();
        let preview = detection.as_ref().and_then(|d| d.preview.clone());
        Self {
            phase: state.phase(),
            results: state.results().map(<[SearchResult]>::to_vec),
            error: state.error_message().map(str::to_string),
            detection,
            preview,
            query,
            state,
            updated_at,
        }
    }

    /// Returns true when a completed search found nothing
    pub fn has_no_results(&self) -> bool {
        matches!(&self.results, Some(results) if results.is_empty())
    }
}
