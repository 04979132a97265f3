// flow/src/error.rs
use anyhow::Error as AnyhowError;
use thiserror::Error;

/// Failures raised by the engine itself, as opposed to failures of the
/// business handlers it runs. Pipelines require their handler error type to be
/// `From<FlowError>` so these can be surfaced through the same channel.
#[derive(Debug, Error)]
pub enum FlowError {
  #[error("Non-optional step '{step_name}' has no handlers")]
  HandlerMissing { step_name: String },

  #[error("Sub-context extraction failed in step '{step_name}': {source}")]
  ExtractorFailure {
    step_name: String,
    #[source]
    source: AnyhowError,
  },

  #[error("Context type mismatch in '{step_name}' (expected {expected_type})")]
  TypeMismatch { step_name: String, expected_type: String },

  #[error("Handler failed: {source}")]
  HandlerError {
    #[source]
    source: AnyhowError,
  },

  #[error("Configuration error in '{step_name}': {message}")]
  ConfigurationError { step_name: String, message: String },

  #[error("No branch arm matched in step '{step_name}'")]
  NoBranchMatched { step_name: String },

  #[error("Internal flow error: {0}")]
  Internal(String),
}

impl From<AnyhowError> for FlowError {
  fn from(err: AnyhowError) -> Self {
    FlowError::HandlerError { source: err }
  }
}

pub type FlowResult<T, E = FlowError> = std::result::Result<T, E>;
