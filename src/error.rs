use thiserror::Error;

/// Construction-time failures.
///
/// All of these are fatal: the caller reports the message and aborts. The
/// simulation loop itself has no recoverable errors, it either advances or
/// terminates because the work queue drained.
#[derive(Debug, Error)]
pub enum BuildError {
    /// Input file missing, unreadable, or not well-formed XML.
    #[error("input error: {0}")]
    Input(String),

    /// The document parsed but violates the floor-plan schema.
    #[error("schema error: {0}")]
    Schema(String),

    /// A polygon or segment fails a geometric sanity check.
    #[error("geometry error: {0}")]
    Geometry(String),

    /// Cross-cell wiring is inconsistent or some cell cannot reach an exit.
    #[error("validation error: {0}")]
    Validation(String),

    /// Writing a result file failed.
    #[error("output error: {0}")]
    Output(String),

    /// An internal invariant broke; indicates a bug, not bad input.
    #[error("internal error: {0}")]
    Internal(String),
}
