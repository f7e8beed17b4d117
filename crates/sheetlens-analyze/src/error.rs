use thiserror::Error;

/// Engine-level failures. Per-formula parse trouble is *not* an error: it is
/// recovered locally and surfaced as a `broken_reference` anomaly.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The underlying workbook source failed; surfaced unchanged.
    #[error("workbook reader failed: {0}")]
    Reader(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// The run was cancelled via its token; no partial result exists.
    #[error("analysis cancelled")]
    Cancelled,

    /// A post-condition check failed; indicates a bug, not bad input.
    #[error("internal invariant violated: {message}")]
    Invariant {
        message: String,
        /// Offending cell in canonical A1 form, where one applies.
        cell: Option<String>,
    },
}

impl EngineError {
    pub fn reader<E: std::error::Error + Send + Sync + 'static>(err: E) -> Self {
        EngineError::Reader(Box::new(err))
    }

    pub fn invariant(message: impl Into<String>) -> Self {
        EngineError::Invariant { message: message.into(), cell: None }
    }

    pub fn invariant_at(message: impl Into<String>, cell: impl Into<String>) -> Self {
        let cell = cell.into();
        EngineError::Invariant {
            message: format!("{} (at {cell})", message.into()),
            cell: Some(cell),
        }
    }
}
