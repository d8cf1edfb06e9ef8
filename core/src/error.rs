use thiserror::Error;

use chatmem_context::MemoryError;

/// Failure of a single request item.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Unknown operation: {0}")]
    UnknownOperation(String),
    #[error("Missing required field `{0}`")]
    MissingField(&'static str),
    #[error("Invalid field `{field}`: {reason}")]
    InvalidField {
        field: &'static str,
        reason: String,
    },
    #[error("No {0} message found in payload")]
    NothingToStore(&'static str),
    #[error("Failed to serialize result: {0}")]
    EncodeResult(#[source] serde_json::Error),
    #[error(transparent)]
    Memory(#[from] MemoryError),
}

impl DispatchError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidField {
            field,
            reason: reason.into(),
        }
    }

    /// Whether the request itself was bad, as opposed to the store failing.
    #[must_use]
    pub fn is_invalid_input(&self) -> bool {
        !matches!(self, Self::Memory(_) | Self::EncodeResult(_))
    }
}
