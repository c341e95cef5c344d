//! Typed per-step configuration.
//!
//! `StepConfig` serializes with a `type` tag, so stored pipeline
//! definitions read naturally:
//!
//! ```json
//! { "type": "field_mapping",
//!   "mappings": [{ "source": "email", "target": "contactEmail" }],
//!   "copy_unmapped": false }
//! ```

use serde::{Deserialize, Serialize};

use accord_connector::filter::DataFilter;
use accord_connector::value::FieldValue;

use crate::types::StepKind;

fn default_true() -> bool {
    true
}

fn default_mask() -> String {
    "***".to_string()
}

/// One source-to-target field rename.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldMapping {
    /// Field to read from.
    pub source: String,
    /// Field to write to.
    pub target: String,
}

/// Target type for a data type conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetType {
    /// Coerce to a string.
    String,
    /// Coerce to an integer.
    Integer,
    /// Coerce to a float.
    Float,
    /// Coerce to a boolean.
    Boolean,
}

/// One field's declared target type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypeConversion {
    /// Field to coerce.
    pub field: String,
    /// Type to coerce to.
    pub target: TargetType,
}

/// A named string operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ValueOp {
    /// Strip leading and trailing whitespace.
    Trim,
    /// Uppercase the value.
    Uppercase,
    /// Lowercase the value.
    Lowercase,
    /// Replace all occurrences of `from` with `to`.
    Replace { from: String, to: String },
    /// Rebuild the value from a template with `{field}` placeholders.
    Template { template: String },
}

/// One field plus the operation applied to it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValueOperation {
    /// Field to transform.
    pub field: String,
    /// Operation to apply.
    #[serde(flatten)]
    pub op: ValueOp,
}

/// Validation rule kinds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum RuleKind {
    /// Field must be present, non-null, and non-empty for strings.
    Required,
    /// String length must be at least `min`.
    MinLength { min: usize },
    /// String length must be at most `max`.
    MaxLength { max: usize },
    /// String must match the regular expression.
    Pattern { pattern: String },
    /// Numeric value must fall within the given bounds.
    NumericRange { min: Option<f64>, max: Option<f64> },
}

/// How a failed rule affects the record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Failing the rule fails the record.
    #[default]
    Error,
    /// Failing the rule records a warning only.
    Warning,
}

/// One validation rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationRule {
    /// Field to validate.
    pub field: String,
    /// The check to run.
    #[serde(flatten)]
    pub rule: RuleKind,
    /// Whether failure blocks the record.
    #[serde(default)]
    pub severity: Severity,
    /// Custom message, replaces the generated one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Where a derived field's value comes from.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DerivationSource {
    /// Join the named fields with a separator.
    Concat {
        fields: Vec<String>,
        #[serde(default)]
        separator: String,
    },
    /// A fixed value.
    Constant { value: FieldValue },
    /// The current time, RFC 3339.
    Timestamp,
    /// A fresh UUID.
    Uuid,
}

/// One derived field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Derivation {
    /// Field to add.
    pub target: String,
    /// How to compute it.
    pub source: DerivationSource,
}

/// What to do with a record matching the filtering condition.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FilterAction {
    /// Drop the record from the run.
    Remove,
    /// Keep the record, overwrite the condition field.
    Mask {
        #[serde(default = "default_mask")]
        replacement: String,
    },
}

/// Numeric fold applied by an aggregation step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregateOp {
    /// Sum of the fields.
    Sum,
    /// Arithmetic mean.
    Avg,
    /// Smallest value.
    Min,
    /// Largest value.
    Max,
    /// Number of fields present.
    Count,
}

/// Case folding applied by a normalization step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseForm {
    /// Leave case untouched.
    #[default]
    None,
    /// Lowercase.
    Lower,
    /// Uppercase.
    Upper,
}

/// How a format conversion rewrites a field.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FormatKind {
    /// Unix seconds to an RFC 3339 string.
    UnixToRfc3339,
    /// RFC 3339 string to Unix seconds.
    Rfc3339ToUnix,
    /// Number to a string with fixed decimals.
    NumberToString {
        #[serde(default)]
        decimals: u8,
    },
}

/// One field's format conversion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormatRule {
    /// Field to rewrite.
    pub field: String,
    /// The conversion to apply.
    pub format: FormatKind,
}

/// Configuration for one transformation step, tagged by step type.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StepConfig {
    /// Rename fields.
    ///
    /// With `copy_unmapped = false` only mapped targets survive, so
    /// renaming `email` to `contactEmail` also removes `email`.
    FieldMapping {
        mappings: Vec<FieldMapping>,
        #[serde(default = "default_true")]
        copy_unmapped: bool,
    },

    /// Coerce field values to declared types.
    ///
    /// In strict mode a failed coercion fails the record; otherwise the
    /// original value is kept and a warning recorded.
    DataTypeConversion {
        conversions: Vec<TypeConversion>,
        #[serde(default)]
        strict: bool,
    },

    /// Apply string operations to fields.
    ValueTransformation { operations: Vec<ValueOperation> },

    /// Check rules; `error` severity fails the record, `warning` does not.
    Validation { rules: Vec<ValidationRule> },

    /// Derive new fields. Inputs are never removed.
    Enrichment { derivations: Vec<Derivation> },

    /// Drop or mask records matching a condition.
    Filtering {
        condition: DataFilter,
        action: FilterAction,
    },

    /// Fold the named numeric fields into `target`.
    Aggregation {
        target: String,
        fields: Vec<String>,
        op: AggregateOp,
    },

    /// Canonicalize string fields. Empty `fields` means all strings.
    Normalization {
        #[serde(default)]
        fields: Vec<String>,
        #[serde(default = "default_true")]
        trim: bool,
        #[serde(default)]
        case: CaseForm,
        #[serde(default)]
        collapse_whitespace: bool,
    },

    /// Remove duplicate elements from array fields, first occurrence wins.
    /// Empty `fields` means all arrays.
    Deduplication {
        #[serde(default)]
        fields: Vec<String>,
    },

    /// Rewrite timestamp and number formats.
    FormatConversion { conversions: Vec<FormatRule> },

    /// Run a sandboxed script.
    ///
    /// The script sees the record as the map variable `record` and returns
    /// the new map, or unit to drop the record.
    Custom { script: String },
}

impl StepConfig {
    /// The step kind this configuration belongs to.
    #[must_use]
    pub fn kind(&self) -> StepKind {
        match self {
            StepConfig::FieldMapping { .. } => StepKind::FieldMapping,
            StepConfig::DataTypeConversion { .. } => StepKind::DataTypeConversion,
            StepConfig::ValueTransformation { .. } => StepKind::ValueTransformation,
            StepConfig::Validation { .. } => StepKind::Validation,
            StepConfig::Enrichment { .. } => StepKind::Enrichment,
            StepConfig::Filtering { .. } => StepKind::Filtering,
            StepConfig::Aggregation { .. } => StepKind::Aggregation,
            StepConfig::Normalization { .. } => StepKind::Normalization,
            StepConfig::Deduplication { .. } => StepKind::Deduplication,
            StepConfig::FormatConversion { .. } => StepKind::FormatConversion,
            StepConfig::Custom { .. } => StepKind::Custom,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tagged_serialization() {
        let config = StepConfig::FieldMapping {
            mappings: vec![FieldMapping {
                source: "email".into(),
                target: "contactEmail".into(),
            }],
            copy_unmapped: false,
        };
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["type"], "field_mapping");
        assert_eq!(json["mappings"][0]["source"], "email");
        assert_eq!(json["copy_unmapped"], false);
    }

    #[test]
    fn test_copy_unmapped_defaults_true() {
        let config: StepConfig = serde_json::from_value(serde_json::json!({
            "type": "field_mapping",
            "mappings": [{"source": "a", "target": "b"}]
        }))
        .unwrap();
        match config {
            StepConfig::FieldMapping { copy_unmapped, .. } => assert!(copy_unmapped),
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn test_flattened_rule_tag() {
        let rule: ValidationRule = serde_json::from_value(serde_json::json!({
            "field": "email",
            "rule": "pattern",
            "pattern": "^[^@]+@[^@]+$",
            "severity": "warning"
        }))
        .unwrap();
        assert_eq!(rule.field, "email");
        assert_eq!(rule.severity, Severity::Warning);
        assert!(matches!(rule.rule, RuleKind::Pattern { .. }));
    }

    #[test]
    fn test_value_operation_flatten() {
        let op: ValueOperation = serde_json::from_value(serde_json::json!({
            "field": "name",
            "op": "replace",
            "from": "Mr. ",
            "to": ""
        }))
        .unwrap();
        assert!(matches!(op.op, ValueOp::Replace { .. }));
    }

    #[test]
    fn test_mask_default_replacement() {
        let action: FilterAction =
            serde_json::from_value(serde_json::json!({"kind": "mask"})).unwrap();
        match action {
            FilterAction::Mask { replacement } => assert_eq!(replacement, "***"),
            FilterAction::Remove => panic!("wrong variant"),
        }
    }

    #[test]
    fn test_kind_matches_config() {
        let configs = vec![
            StepConfig::Custom {
                script: "record".into(),
            },
            StepConfig::Deduplication { fields: vec![] },
            StepConfig::Aggregation {
                target: "total".into(),
                fields: vec!["a".into()],
                op: AggregateOp::Sum,
            },
        ];
        let kinds: Vec<StepKind> = configs.iter().map(StepConfig::kind).collect();
        assert_eq!(
            kinds,
            vec![StepKind::Custom, StepKind::Deduplication, StepKind::Aggregation]
        );
    }
}
