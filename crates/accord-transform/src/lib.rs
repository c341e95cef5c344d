//! # Transformation Pipeline
//!
//! Typed, ordered record transformations applied between fetch and write.
//! A pipeline is a list of steps, each carrying a tagged configuration
//! union; the executor runs them strictly ascending by `order` and reports
//! per-step outcomes.
//!
//! ## Example
//!
//! ```
//! use accord_transform::prelude::*;
//! use accord_connector::value::field_map_from_json;
//!
//! let pipeline = PipelineBuilder::create("inbound users")
//!     .add_field_mapping(
//!         "rename",
//!         vec![FieldMapping {
//!             source: "mail".into(),
//!             target: "email".into(),
//!         }],
//!         true,
//!     )
//!     .add_value_transformation(
//!         "lowercase email",
//!         vec![ValueOperation {
//!             field: "email".into(),
//!             op: ValueOp::Lowercase,
//!         }],
//!     )
//!     .build()
//!     .unwrap();
//!
//! let fields = field_map_from_json(serde_json::json!({"mail": "ADA@EXAMPLE.COM"}));
//! let outcome = TransformExecutor::new().execute(&pipeline, &fields);
//! let output = outcome.output.unwrap();
//! assert_eq!(output.get("email").unwrap().as_str(), Some("ada@example.com"));
//! ```
//!
//! ## Crate Organization
//!
//! - [`types`] - Step kinds, steps, and the pipeline container
//! - [`config`] - Tagged per-step configuration union
//! - [`builder`] - Fluent assembly and validation
//! - [`executor`] - Execution with per-step reports
//! - [`error`] - Pipeline assembly errors

pub mod builder;
pub mod config;
pub mod error;
pub mod executor;
pub mod types;

/// Commonly used types, re-exported for convenience.
pub mod prelude {
    pub use crate::builder::PipelineBuilder;
    pub use crate::config::{
        AggregateOp, CaseForm, Derivation, DerivationSource, FieldMapping, FilterAction,
        FormatKind, FormatRule, RuleKind, Severity, StepConfig, TargetType, TypeConversion,
        ValidationRule, ValueOp, ValueOperation,
    };
    pub use crate::error::{TransformError, TransformResult};
    pub use crate::executor::{
        ScriptLimits, StepReport, StepStatus, TransformExecutor, TransformOutcome,
    };
    pub use crate::types::{StepKind, TransformationPipeline, TransformationStep};
}
