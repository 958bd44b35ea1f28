//! Search Orchestrator
//!
//! Sequences the visual search workflow: upload, detect, select a region,
//! search, show results. Every state change goes through one of the entry
//! points below and is published to subscribers.
//!
//! Requests cannot be cancelled once sent. Each one carries a ticket from the
//! [`RequestSequencer`]; when it completes, its result is applied only if no
//! newer request of the same kind was issued in the meantime.

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::core::{
    search::SearchBackend,
    settings::Settings,
    upload::{SelectedFile, UploadValidator, UploadedImage},
    CoreError, RequestKind, DEFAULT_LABEL_HINTS, DEFAULT_SIMILAR_LIMIT, DEFAULT_TOP_K,
};

use super::{DetectionSnapshot, RequestSequencer, RequestTicket, Transition, WorkflowState, WorkflowView};

/// Mutable workflow data, never held across an await
#[derive(Debug, Default)]
struct WorkflowInner {
    state: WorkflowState,
    sequencer: RequestSequencer,
    query: Option<String>,
    /// Stable state a local validation error falls back onto
    last_stable: WorkflowState,
    updated_at: Option<DateTime<Utc>>,
}

// =============================================================================
// Orchestrator
// =============================================================================

/// Drives the visual search workflow against a [`SearchBackend`]
///
/// Responsibilities:
/// - Upload validation before anything touches the network
/// - Detection on the selected image
/// - Text and region similarity searches
/// - Discarding responses superseded by newer requests
pub struct SearchOrchestrator {
    backend: Arc<dyn SearchBackend>,
    validator: UploadValidator,
    label_hints: Vec<String>,
    top_k: u32,
    similar_limit: u32,
    inner: Mutex<WorkflowInner>,
    events: watch::Sender<WorkflowState>,
}

impl SearchOrchestrator {
    /// Creates an orchestrator with default limits and label hints
    pub fn new(backend: Arc<dyn SearchBackend>) -> Self {
        let (events, _) = watch::channel(WorkflowState::Idle);
        Self {
            backend,
            validator: UploadValidator::default(),
            label_hints: DEFAULT_LABEL_HINTS.iter().map(|s| s.to_string()).collect(),
            top_k: DEFAULT_TOP_K,
            similar_limit: DEFAULT_SIMILAR_LIMIT,
            inner: Mutex::new(WorkflowInner::default()),
            events,
        }
    }

    /// Creates an orchestrator configured from settings
    pub fn from_settings(backend: Arc<dyn SearchBackend>, settings: &Settings) -> Self {
        Self::new(backend)
            .with_validator(UploadValidator::from_settings(settings))
            .with_label_hints(settings.label_hints.clone())
            .with_top_k(settings.top_k)
            .with_similar_limit(settings.similar_limit)
    }

    pub fn with_validator(mut self, validator: UploadValidator) -> Self {
        self.validator = validator;
        self
    }

    pub fn with_label_hints(mut self, label_hints: Vec<String>) -> Self {
        self.label_hints = label_hints;
        self
    }

    pub fn with_top_k(mut self, top_k: u32) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn with_similar_limit(mut self, limit: u32) -> Self {
        self.similar_limit = limit;
        self
    }

    /// Name of the backend in use
    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// Current state
    pub fn state(&self) -> WorkflowState {
        self.lock().state.clone()
    }

    /// Current state plus everything visible alongside it
    pub fn snapshot(&self) -> WorkflowView {
        let inner = self.lock();
        WorkflowView::new(inner.state.clone(), inner.query.clone(), inner.updated_at)
    }

    /// Receives every state change
    pub fn subscribe(&self) -> watch::Receiver<WorkflowState> {
        self.events.subscribe()
    }

    // -------------------------------------------------------------------------
    // Entry Points
    // -------------------------------------------------------------------------

    /// Validates a file and runs detection on it.
    ///
    /// A rejected file goes straight to `Error` without a network call. An
    /// accepted one clears prior detections, results, and the query, then
    /// enters `Detecting` before anything else happens.
    pub async fn select_image(&self, file: SelectedFile) -> Transition {
        let image = match self.validator.validate(file) {
            Ok(image) => image,
            Err(e) => {
                self.reject_upload(&e);
                return Transition::Applied;
            }
        };

        let ticket = self.begin_detection(&image);
        debug!("Issued {}", ticket);
        info!("Detecting objects in '{}' ({} bytes)", image.name(), image.size());

        let (preview, detected) = tokio::join!(
            self.validator.preview(&image),
            self.backend.detect(&image, &self.label_hints)
        );

        let mut inner = self.lock();
        if let Err(stale) = inner.sequencer.check(ticket) {
            debug!("Dropping {} response: {}", ticket, stale);
            return Transition::Superseded;
        }

        let next = match detected {
            Ok(regions) => {
                info!("Detected {} regions in '{}'", regions.len(), image.name());
                let preview = preview
                    .inspect_err(|e| warn!("Preview unavailable: {}", e))
                    .ok();
                WorkflowState::DetectionReady(DetectionSnapshot::new(image, preview, regions))
            }
            Err(e) => {
                warn!("Detection failed for '{}': {}", image.name(), e);
                WorkflowState::error(&e, WorkflowState::Idle)
            }
        };
        self.apply(&mut inner, next);
        Transition::Applied
    }

    /// Runs a text search.
    ///
    /// Blank queries are ignored without a network call. Any image and
    /// detections in view are cleared.
    pub async fn submit_text(&self, query: &str) -> Transition {
        let query = query.trim();
        if query.is_empty() {
            debug!("Ignoring blank query");
            return Transition::Ignored;
        }

        let ticket = {
            let mut inner = self.lock();
            let ticket = inner.sequencer.issue(RequestKind::Search);
            inner.sequencer.invalidate(RequestKind::Detect);
            inner.query = Some(query.to_string());
            inner.last_stable = WorkflowState::Idle;
            self.apply(
                &mut inner,
                WorkflowState::Searching {
                    query: Some(query.to_string()),
                    detection: None,
                },
            );
            ticket
        };
        debug!("Issued {}", ticket);
        info!("Searching for '{}'", query);

        let result = self.backend.search_by_text(query, self.top_k).await;

        let mut inner = self.lock();
        if let Err(stale) = inner.sequencer.check(ticket) {
            debug!("Dropping {} response: {}", ticket, stale);
            return Transition::Superseded;
        }

        let next = match result {
            Ok(results) => {
                info!("Text search returned {} results", results.len());
                WorkflowState::SearchReady {
                    results,
                    query: Some(query.to_string()),
                    detection: None,
                }
            }
            Err(e) => {
                warn!("Text search failed: {}", e);
                WorkflowState::error(&e, WorkflowState::Idle)
            }
        };
        self.apply(&mut inner, next);
        Transition::Applied
    }

    /// Runs a similarity search on one of the visible detected regions.
    ///
    /// Ignored when no detection is visible or the index is out of range.
    /// Results are layered over the detection, which stays visible.
    pub async fn select_region(&self, index: usize) -> Transition {
        let Some((ticket, detection)) = self.begin_region_search(index) else {
            return Transition::Ignored;
        };

        debug!("Issued {}", ticket);
        let region = &detection.regions[index];
        info!("Searching similar to region {} ({})", index, region.display_label());

        let result = self
            .backend
            .search_similar(&detection.image, &region.bbox, self.similar_limit)
            .await;

        let mut inner = self.lock();
        if let Err(stale) = inner.sequencer.check(ticket) {
            debug!("Dropping {} response: {}", ticket, stale);
            return Transition::Superseded;
        }

        let next = match result {
            Ok(results) => {
                info!("Similarity search returned {} results", results.len());
                WorkflowState::SearchReady {
                    results,
                    query: None,
                    detection: Some(detection),
                }
            }
            Err(e) => {
                warn!("Similarity search failed: {}", e);
                let e = match e {
                    CoreError::SearchFailed(detail) => CoreError::SimilarSearchFailed(detail),
                    other => other,
                };
                WorkflowState::error(&e, WorkflowState::DetectionReady(detection))
            }
        };
        self.apply(&mut inner, next);
        Transition::Applied
    }

    /// Discards the active image, detections, and results.
    ///
    /// Responses to requests already in flight will be dropped.
    pub fn clear(&self) {
        let mut inner = self.lock();
        if inner.state.is_busy() {
            debug!("Dropping in-flight {} request", inner.state.phase());
        }
        inner.sequencer.invalidate_all();
        inner.query = None;
        self.apply(&mut inner, WorkflowState::Idle);
        debug!("Workflow cleared");
    }

    // -------------------------------------------------------------------------
    // Internals
    // -------------------------------------------------------------------------

    fn lock(&self) -> MutexGuard<'_, WorkflowInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn apply(&self, inner: &mut WorkflowInner, next: WorkflowState) {
        debug!("Workflow {} -> {}", inner.state.phase(), next.phase());
        if next.is_stable() {
            inner.last_stable = next.clone();
        }
        inner.state = next.clone();
        inner.updated_at = Some(Utc::now());
        self.events.send_replace(next);
    }

    fn reject_upload(&self, error: &CoreError) {
        warn!("Upload rejected: {}", error);
        let mut inner = self.lock();
        inner.sequencer.invalidate_all();
        let previous = inner.last_stable.clone();
        self.apply(&mut inner, WorkflowState::error(error, previous));
    }

    fn begin_detection(&self, image: &UploadedImage) -> RequestTicket {
        let mut inner = self.lock();
        let ticket = inner.sequencer.issue(RequestKind::Detect);
        inner.sequencer.invalidate(RequestKind::Search);
        inner.query = None;
        inner.last_stable = WorkflowState::Idle;
        self.apply(
            &mut inner,
            WorkflowState::Detecting {
                image: image.clone(),
            },
        );
        ticket
    }

    fn begin_region_search(&self, index: usize) -> Option<(RequestTicket, DetectionSnapshot)> {
        let mut inner = self.lock();
        let Some(visible) = inner.state.detection() else {
            debug!("Ignoring region {}: no detection in view", index);
            return None;
        };
        if visible.region(index).is_none() {
            debug!(
                "Ignoring region {}: only {} regions detected",
                index,
                visible.regions.len()
            );
            return None;
        }

        let detection = visible.with_selected(index);
        let ticket = inner.sequencer.issue(RequestKind::Search);
        inner.query = None;
        inner.last_stable = WorkflowState::DetectionReady(detection.clone());
        self.apply(
            &mut inner,
            WorkflowState::Searching {
                query: None,
                detection: Some(detection.clone()),
            },
        );
        Some((ticket, detection))
    }
}

impl std::fmt::Debug for SearchOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchOrchestrator")
            .field("backend", &self.backend.name())
            .field("top_k", &self.top_k)
            .field("similar_limit", &self.similar_limit)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Tests
// =============================================================================
