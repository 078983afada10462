//! Prototype generation
//!
//! Calls the generation endpoint for a PRD, persists the in-flight request
//! per idea, and polls the status store until the prototype is ready, fails,
//! or the attempt budget runs out.

pub mod state;
pub mod workflow;

pub use state::{GenerationState, StateStore};
pub use tokio_util::sync::CancellationToken;
pub use workflow::{
    GenerationBackend, GenerationHooks, GenerationPhase, GenerationRequest, GenerationTicket,
    GenerationWorkflow, NoHooks, ReadyPrototype, StatusReport,
};
