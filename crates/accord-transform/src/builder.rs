//! Fluent pipeline assembly.
//!
//! The builder owns ordering: every appended step gets the next free
//! `order` value, so a pipeline built purely through `add_*` calls always
//! validates. `reorder` exists for callers that load step layouts from
//! configuration and need to renumber.

use accord_connector::filter::DataFilter;
use accord_connector::ids::StepId;

use crate::config::{
    AggregateOp, CaseForm, Derivation, FieldMapping, FilterAction, FormatRule, StepConfig,
    TypeConversion, ValidationRule, ValueOperation,
};
use crate::error::{TransformError, TransformResult};
use crate::executor::TransformExecutor;
use crate::types::{TransformationPipeline, TransformationStep};

/// Builds and validates transformation pipelines.
#[derive(Debug, Clone)]
pub struct PipelineBuilder {
    name: String,
    description: Option<String>,
    input_schema: Option<String>,
    output_schema: Option<String>,
    steps: Vec<TransformationStep>,
    next_order: u32,
}

impl PipelineBuilder {
    /// Start a new pipeline with the given name.
    #[must_use]
    pub fn create(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            input_schema: None,
            output_schema: None,
            steps: Vec::new(),
            next_order: 1,
        }
    }

    /// Set the pipeline description.
    #[must_use]
    pub fn description(mut self, text: impl Into<String>) -> Self {
        self.description = Some(text.into());
        self
    }

    /// Set the expected input schema name.
    #[must_use]
    pub fn input_schema(mut self, schema: impl Into<String>) -> Self {
        self.input_schema = Some(schema.into());
        self
    }

    /// Set the produced output schema name.
    #[must_use]
    pub fn output_schema(mut self, schema: impl Into<String>) -> Self {
        self.output_schema = Some(schema.into());
        self
    }

    /// Append a step with the next free order.
    #[must_use]
    pub fn add_step(mut self, name: impl Into<String>, config: StepConfig) -> Self {
        let order = self.next_order;
        self.next_order += 1;
        self.steps.push(TransformationStep::new(name, config, order));
        self
    }

    /// Append a field mapping step.
    #[must_use]
    pub fn add_field_mapping(
        self,
        name: impl Into<String>,
        mappings: Vec<FieldMapping>,
        copy_unmapped: bool,
    ) -> Self {
        self.add_step(
            name,
            StepConfig::FieldMapping {
                mappings,
                copy_unmapped,
            },
        )
    }

    /// Append a data type conversion step.
    #[must_use]
    pub fn add_data_type_conversion(
        self,
        name: impl Into<String>,
        conversions: Vec<TypeConversion>,
        strict: bool,
    ) -> Self {
        self.add_step(
            name,
            StepConfig::DataTypeConversion {
                conversions,
                strict,
            },
        )
    }

    /// Append a value transformation step.
    #[must_use]
    pub fn add_value_transformation(
        self,
        name: impl Into<String>,
        operations: Vec<ValueOperation>,
    ) -> Self {
        self.add_step(name, StepConfig::ValueTransformation { operations })
    }

    /// Append a validation step.
    #[must_use]
    pub fn add_validation(self, name: impl Into<String>, rules: Vec<ValidationRule>) -> Self {
        self.add_step(name, StepConfig::Validation { rules })
    }

    /// Append an enrichment step.
    #[must_use]
    pub fn add_enrichment(self, name: impl Into<String>, derivations: Vec<Derivation>) -> Self {
        self.add_step(name, StepConfig::Enrichment { derivations })
    }

    /// Append a filtering step.
    #[must_use]
    pub fn add_filtering(
        self,
        name: impl Into<String>,
        condition: DataFilter,
        action: FilterAction,
    ) -> Self {
        self.add_step(name, StepConfig::Filtering { condition, action })
    }

    /// Append an aggregation step.
    #[must_use]
    pub fn add_aggregation(
        self,
        name: impl Into<String>,
        target: impl Into<String>,
        fields: Vec<String>,
        op: AggregateOp,
    ) -> Self {
        self.add_step(
            name,
            StepConfig::Aggregation {
                target: target.into(),
                fields,
                op,
            },
        )
    }

    /// Append a normalization step. An empty field list targets every
    /// string field.
    #[must_use]
    pub fn add_normalization(
        self,
        name: impl Into<String>,
        fields: Vec<String>,
        trim: bool,
        case: CaseForm,
        collapse_whitespace: bool,
    ) -> Self {
        self.add_step(
            name,
            StepConfig::Normalization {
                fields,
                trim,
                case,
                collapse_whitespace,
            },
        )
    }

    /// Append a deduplication step. An empty field list targets every
    /// array field.
    #[must_use]
    pub fn add_deduplication(self, name: impl Into<String>, fields: Vec<String>) -> Self {
        self.add_step(name, StepConfig::Deduplication { fields })
    }

    /// Append a format conversion step.
    #[must_use]
    pub fn add_format_conversion(
        self,
        name: impl Into<String>,
        conversions: Vec<FormatRule>,
    ) -> Self {
        self.add_step(name, StepConfig::FormatConversion { conversions })
    }

    /// Append a custom script step.
    #[must_use]
    pub fn add_custom(self, name: impl Into<String>, script: impl Into<String>) -> Self {
        self.add_step(
            name,
            StepConfig::Custom {
                script: script.into(),
            },
        )
    }

    /// Ids of the steps added so far, in insertion order.
    #[must_use]
    pub fn step_ids(&self) -> Vec<StepId> {
        self.steps.iter().map(|s| s.id).collect()
    }

    /// Assign new order values to existing steps.
    ///
    /// Steps not named keep their current order. Uniqueness is checked at
    /// `build` time, not here.
    pub fn reorder(mut self, orders: &[(StepId, u32)]) -> TransformResult<Self> {
        for (step_id, order) in orders {
            let step = self
                .steps
                .iter_mut()
                .find(|s| s.id == *step_id)
                .ok_or(TransformError::UnknownStep { step_id: *step_id })?;
            step.order = *order;
        }
        Ok(self)
    }

    /// Activate or deactivate a step.
    pub fn set_step_active(mut self, step_id: StepId, active: bool) -> TransformResult<Self> {
        let step = self
            .steps
            .iter_mut()
            .find(|s| s.id == step_id)
            .ok_or(TransformError::UnknownStep { step_id })?;
        step.active = active;
        Ok(self)
    }

    /// Remove a step. Remaining steps keep their order values.
    pub fn remove_step(mut self, step_id: StepId) -> TransformResult<Self> {
        let position = self
            .steps
            .iter()
            .position(|s| s.id == step_id)
            .ok_or(TransformError::UnknownStep { step_id })?;
        self.steps.remove(position);
        Ok(self)
    }

    /// Check the pipeline without building it.
    ///
    /// Requires at least one step, unique step ids, unique orders, and
    /// custom scripts that compile.
    pub fn validate(&self) -> TransformResult<()> {
        if self.steps.is_empty() {
            return Err(TransformError::EmptyPipeline {
                name: self.name.clone(),
            });
        }

        for (index, step) in self.steps.iter().enumerate() {
            if self.steps[..index].iter().any(|other| other.id == step.id) {
                return Err(TransformError::DuplicateStepId { step_id: step.id });
            }
            if let Some(other) = self.steps[..index]
                .iter()
                .find(|other| other.order == step.order)
            {
                return Err(TransformError::DuplicateOrder {
                    order: step.order,
                    first: other.name.clone(),
                    second: step.name.clone(),
                });
            }
        }

        let executor = TransformExecutor::new();
        for step in &self.steps {
            if let StepConfig::Custom { script } = &step.config {
                executor
                    .compile_script(script)
                    .map_err(|message| TransformError::InvalidScript {
                        step: step.name.clone(),
                        message,
                    })?;
            }
        }

        Ok(())
    }

    /// Validate and produce the pipeline.
    pub fn build(self) -> TransformResult<TransformationPipeline> {
        self.validate()?;
        let mut pipeline = TransformationPipeline::new(self.name);
        pipeline.description = self.description;
        pipeline.input_schema = self.input_schema;
        pipeline.output_schema = self.output_schema;
        pipeline.steps = self.steps;
        Ok(pipeline)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Severity, ValueOp};

    #[test]
    fn test_build_assigns_ascending_orders() {
        let pipeline = PipelineBuilder::create("users")
            .description("inbound user cleanup")
            .add_value_transformation(
                "trim names",
                vec![ValueOperation {
                    field: "name".into(),
                    op: ValueOp::Trim,
                }],
            )
            .add_deduplication("dedupe tags", vec!["tags".into()])
            .add_custom("stamp", "record.stamped = true; record")
            .build()
            .unwrap();

        assert_eq!(pipeline.name, "users");
        assert_eq!(pipeline.steps.len(), 3);
        let orders: Vec<u32> = pipeline.ordered_steps().iter().map(|s| s.order).collect();
        assert_eq!(orders, vec![1, 2, 3]);
    }

    #[test]
    fn test_empty_pipeline_rejected() {
        let err = PipelineBuilder::create("empty").build().unwrap_err();
        assert!(matches!(err, TransformError::EmptyPipeline { .. }));
    }

    #[test]
    fn test_reorder_changes_execution_order() {
        let builder = PipelineBuilder::create("reorder")
            .add_deduplication("first", vec![])
            .add_deduplication("second", vec![]);
        let ids = builder.step_ids();

        let pipeline = builder
            .reorder(&[(ids[0], 20), (ids[1], 10)])
            .unwrap()
            .build()
            .unwrap();
        let names: Vec<&str> = pipeline
            .ordered_steps()
            .iter()
            .map(|s| s.name.as_str())
            .collect();
        assert_eq!(names, vec!["second", "first"]);
    }

    #[test]
    fn test_duplicate_order_rejected() {
        let builder = PipelineBuilder::create("dup")
            .add_deduplication("first", vec![])
            .add_deduplication("second", vec![]);
        let ids = builder.step_ids();

        let err = builder
            .reorder(&[(ids[1], 1)])
            .unwrap()
            .build()
            .unwrap_err();
        assert!(matches!(err, TransformError::DuplicateOrder { order: 1, .. }));
    }

    #[test]
    fn test_unknown_step_rejected() {
        let builder = PipelineBuilder::create("unknown").add_deduplication("only", vec![]);
        let err = builder.set_step_active(StepId::new(), false).unwrap_err();
        assert!(matches!(err, TransformError::UnknownStep { .. }));
    }

    #[test]
    fn test_remove_step() {
        let builder = PipelineBuilder::create("remove")
            .add_deduplication("first", vec![])
            .add_deduplication("second", vec![]);
        let ids = builder.step_ids();

        let pipeline = builder.remove_step(ids[0]).unwrap().build().unwrap();
        assert_eq!(pipeline.steps.len(), 1);
        assert_eq!(pipeline.steps[0].name, "second");
    }

    #[test]
    fn test_invalid_script_rejected() {
        let err = PipelineBuilder::create("bad script")
            .add_custom("broken", "record.x = ")
            .build()
            .unwrap_err();
        match err {
            TransformError::InvalidScript { step, .. } => assert_eq!(step, "broken"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_set_step_active() {
        let builder = PipelineBuilder::create("toggle")
            .add_validation(
                "check",
                vec![ValidationRule {
                    field: "name".into(),
                    rule: crate::config::RuleKind::Required,
                    severity: Severity::Error,
                    message: None,
                }],
            );
        let ids = builder.step_ids();

        let pipeline = builder
            .set_step_active(ids[0], false)
            .unwrap()
            .build()
            .unwrap();
        assert!(!pipeline.steps[0].active);
        assert!(pipeline.active_steps().is_empty());
    }
}
