//! Pipeline and step types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use accord_connector::ids::{PipelineId, StepId};

use crate::config::StepConfig;

/// The kind of work a transformation step performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    /// Rename fields from source names to target names.
    FieldMapping,
    /// Coerce field values to declared types.
    DataTypeConversion,
    /// Apply named string operations to field values.
    ValueTransformation,
    /// Check rules and fail or warn per severity.
    Validation,
    /// Derive new fields from existing ones.
    Enrichment,
    /// Drop or mask records matching a condition.
    Filtering,
    /// Fold several numeric fields into one.
    Aggregation,
    /// Canonicalize string fields.
    Normalization,
    /// Remove duplicate elements from array fields.
    Deduplication,
    /// Convert between timestamp and number formats.
    FormatConversion,
    /// Run a sandboxed script over the record.
    Custom,
}

impl StepKind {
    /// Stable string form.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            StepKind::FieldMapping => "field_mapping",
            StepKind::DataTypeConversion => "data_type_conversion",
            StepKind::ValueTransformation => "value_transformation",
            StepKind::Validation => "validation",
            StepKind::Enrichment => "enrichment",
            StepKind::Filtering => "filtering",
            StepKind::Aggregation => "aggregation",
            StepKind::Normalization => "normalization",
            StepKind::Deduplication => "deduplication",
            StepKind::FormatConversion => "format_conversion",
            StepKind::Custom => "custom",
        }
    }
}

impl std::fmt::Display for StepKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for StepKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "field_mapping" => Ok(StepKind::FieldMapping),
            "data_type_conversion" => Ok(StepKind::DataTypeConversion),
            "value_transformation" => Ok(StepKind::ValueTransformation),
            "validation" => Ok(StepKind::Validation),
            "enrichment" => Ok(StepKind::Enrichment),
            "filtering" => Ok(StepKind::Filtering),
            "aggregation" => Ok(StepKind::Aggregation),
            "normalization" => Ok(StepKind::Normalization),
            "deduplication" => Ok(StepKind::Deduplication),
            "format_conversion" => Ok(StepKind::FormatConversion),
            "custom" => Ok(StepKind::Custom),
            other => Err(format!("unknown step kind: {other}")),
        }
    }
}

/// One step of a pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransformationStep {
    /// Step identifier, unique within the pipeline.
    pub id: StepId,
    /// Human-readable name, used in reports.
    pub name: String,
    /// Typed configuration. The serde tag doubles as the step type.
    pub config: StepConfig,
    /// Execution position. Unique within the pipeline, ascending.
    pub order: u32,
    /// Inactive steps are kept but not executed.
    pub active: bool,
}

impl TransformationStep {
    /// Create an active step.
    #[must_use]
    pub fn new(name: impl Into<String>, config: StepConfig, order: u32) -> Self {
        Self {
            id: StepId::new(),
            name: name.into(),
            config,
            order,
            active: true,
        }
    }

    /// The kind of this step, derived from its configuration.
    #[must_use]
    pub fn kind(&self) -> StepKind {
        self.config.kind()
    }
}

/// An ordered sequence of transformation steps.
///
/// Built through [`PipelineBuilder`](crate::builder::PipelineBuilder),
/// which enforces unique ids and orders; treat a built pipeline as
/// immutable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransformationPipeline {
    /// Pipeline identifier.
    pub id: PipelineId,
    /// Human-readable name.
    pub name: String,
    /// Optional description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Steps, not necessarily stored in execution order.
    pub steps: Vec<TransformationStep>,
    /// Free-form hint describing the expected input shape.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_schema: Option<String>,
    /// Free-form hint describing the produced output shape.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<String>,
    /// Inactive pipelines are skipped by the engine.
    pub active: bool,
    /// When the pipeline was created.
    pub created_at: DateTime<Utc>,
    /// When the pipeline was last modified.
    pub updated_at: DateTime<Utc>,
}

impl TransformationPipeline {
    /// Create an empty active pipeline.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: PipelineId::new(),
            name: name.into(),
            description: None,
            steps: Vec::new(),
            input_schema: None,
            output_schema: None,
            active: true,
            created_at: now,
            updated_at: now,
        }
    }

    /// All steps sorted by execution order, inactive ones included.
    #[must_use]
    pub fn ordered_steps(&self) -> Vec<&TransformationStep> {
        let mut steps: Vec<&TransformationStep> = self.steps.iter().collect();
        steps.sort_by_key(|s| s.order);
        steps
    }

    /// Active steps sorted by execution order.
    #[must_use]
    pub fn active_steps(&self) -> Vec<&TransformationStep> {
        self.ordered_steps()
            .into_iter()
            .filter(|s| s.active)
            .collect()
    }

    /// Look up a step by id.
    #[must_use]
    pub fn step(&self, id: StepId) -> Option<&TransformationStep> {
        self.steps.iter().find(|s| s.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FieldMapping, StepConfig};

    fn mapping_config() -> StepConfig {
        StepConfig::FieldMapping {
            mappings: vec![FieldMapping {
                source: "a".into(),
                target: "b".into(),
            }],
            copy_unmapped: true,
        }
    }

    #[test]
    fn test_step_kind_roundtrip() {
        for kind in [
            StepKind::FieldMapping,
            StepKind::DataTypeConversion,
            StepKind::ValueTransformation,
            StepKind::Validation,
            StepKind::Enrichment,
            StepKind::Filtering,
            StepKind::Aggregation,
            StepKind::Normalization,
            StepKind::Deduplication,
            StepKind::FormatConversion,
            StepKind::Custom,
        ] {
            assert_eq!(kind.as_str().parse::<StepKind>().unwrap(), kind);
        }
        assert!("bogus".parse::<StepKind>().is_err());
    }

    #[test]
    fn test_step_kind_from_config() {
        let step = TransformationStep::new("rename", mapping_config(), 1);
        assert_eq!(step.kind(), StepKind::FieldMapping);
        assert!(step.active);
    }

    #[test]
    fn test_ordered_steps_sorts_by_order() {
        let mut pipeline = TransformationPipeline::new("p");
        let mut s3 = TransformationStep::new("third", mapping_config(), 3);
        s3.active = false;
        pipeline.steps.push(s3);
        pipeline
            .steps
            .push(TransformationStep::new("first", mapping_config(), 1));
        pipeline
            .steps
            .push(TransformationStep::new("second", mapping_config(), 2));

        let names: Vec<&str> = pipeline
            .ordered_steps()
            .iter()
            .map(|s| s.name.as_str())
            .collect();
        assert_eq!(names, vec!["first", "second", "third"]);

        let active: Vec<&str> = pipeline
            .active_steps()
            .iter()
            .map(|s| s.name.as_str())
            .collect();
        assert_eq!(active, vec!["first", "second"]);
    }
}
