//! Engine-level error type.

use crate::annotation::AnnotationError;
use crate::storage::StorageError;
use thiserror::Error;

/// Errors surfaced by editing-session operations.
///
/// Every variant is recoverable at the call site.
#[derive(Debug, Clone, Error)]
pub enum EngineError {
    /// User input failed validation (e.g. an empty session name).
    #[error("Validation error: {0}")]
    Validation(String),
    /// Persisted state could not be parsed or is structurally invalid.
    #[error("Corrupt session state: {0}")]
    CorruptState(String),
    /// The geometric transformer could not produce an output image.
    #[error("Transform failed: {0}")]
    TransformFailure(String),
    /// The preview snapshot could not be captured or encoded.
    #[error("Render failed: {0}")]
    RenderFailure(String),
    /// A primary durable read/write/delete failed.
    #[error(transparent)]
    Storage(StorageError),
    /// Durable storage or image access is unavailable on this platform.
    #[error("Unsupported environment: {0}")]
    UnsupportedEnvironment(String),
    /// Another operation is still in flight for the same session.
    #[error("Another operation is in flight for this session")]
    Busy,
    #[error(transparent)]
    Annotation(#[from] AnnotationError),
}

/// Storage errors that mean "no durable store here" become
/// [`EngineError::UnsupportedEnvironment`].
impl From<StorageError> for EngineError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Unavailable(msg) => EngineError::UnsupportedEnvironment(msg),
            other => EngineError::Storage(other),
        }
    }
}

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;
