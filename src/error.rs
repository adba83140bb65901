use thiserror::Error;

/// Errors surfaced by the allocation engine.
///
/// Price inversions (current price above the ceiling) are not errors: the
/// engine clamps them and logs a warning, since they can arise from external
/// edits of the buyer snapshot.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("allocation model is infeasible")]
    ModelInfeasible,
    #[error("invalid product '{id}': {reason}")]
    InvalidProduct { id: String, reason: String },
    #[error("solver failure: {0}")]
    Solver(String),
}
