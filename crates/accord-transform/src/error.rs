//! Transformation pipeline error types.

use thiserror::Error;

use accord_connector::ids::StepId;

/// Error raised while assembling or validating a pipeline.
#[derive(Debug, Error)]
pub enum TransformError {
    /// A pipeline must contain at least one step.
    #[error("pipeline '{name}' has no steps")]
    EmptyPipeline { name: String },

    /// Step ids must be unique within a pipeline.
    #[error("duplicate step id: {step_id}")]
    DuplicateStepId { step_id: StepId },

    /// Step orders must be unique within a pipeline.
    #[error("duplicate step order {order} (steps '{first}' and '{second}')")]
    DuplicateOrder {
        order: u32,
        first: String,
        second: String,
    },

    /// Referenced step does not exist in the pipeline.
    #[error("unknown step: {step_id}")]
    UnknownStep { step_id: StepId },

    /// A custom step's script failed to compile.
    #[error("invalid script in step '{step}': {message}")]
    InvalidScript { step: String, message: String },
}

/// Result type for pipeline assembly.
pub type TransformResult<T> = Result<T, TransformError>;
