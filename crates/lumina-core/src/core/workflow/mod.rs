//! Visual Search Workflow
//!
//! State machine that sequences upload, detection, region selection and
//! search, with per-kind request sequencing to drop superseded responses.

mod orchestrator;
mod sequencer;
mod state;

pub use orchestrator::SearchOrchestrator;
pub use sequencer::{RequestSequencer, RequestTicket};
pub use state::{DetectionSnapshot, Transition, WorkflowPhase, WorkflowState, WorkflowView};
