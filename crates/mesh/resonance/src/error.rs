//! Consensus failure modes.

use mesh_types::{CaseId, ResourceId};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ResonanceError {
    /// Malformed proposal, rejected synchronously.
    #[error("invalid proposal: {0}")]
    InvalidProposal(String),

    /// The resource froze after a blown deadline and has not been
    /// released. The case id points at the frozen audit record.
    #[error("resource {resource_id} is frozen by case {case_id}")]
    ResourceFrozen {
        resource_id: ResourceId,
        case_id: CaseId,
    },

    /// The engine is shutting down and no longer accepts proposals.
    #[error("resonance engine is shut down")]
    Shutdown,
}
