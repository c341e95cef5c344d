//! Pipeline execution.
//!
//! The executor is pure and synchronous: one field map in, one field map
//! out (or none, when a filtering step or a script drops the record). Steps
//! run strictly ascending by `order`; inactive steps are reported as
//! skipped without renumbering the rest.

use std::time::Instant;

use chrono::Utc;
use regex::Regex;
use rhai::Engine;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use accord_connector::filter::DataFilter;
use accord_connector::ids::StepId;
use accord_connector::value::{get_path, FieldMap, FieldValue};

use crate::config::{
    AggregateOp, CaseForm, Derivation, DerivationSource, FieldMapping, FilterAction, FormatKind,
    FormatRule, RuleKind, Severity, StepConfig, TargetType, TypeConversion, ValidationRule,
    ValueOp, ValueOperation,
};
use crate::types::{StepKind, TransformationPipeline, TransformationStep};

/// Default maximum number of operations in the script engine.
const DEFAULT_MAX_OPERATIONS: u64 = 100_000;

/// Default maximum call stack depth.
const DEFAULT_MAX_CALL_STACK_DEPTH: usize = 64;

/// Default maximum string size in bytes.
const DEFAULT_MAX_STRING_SIZE: usize = 65536;

/// Default maximum array size.
const DEFAULT_MAX_ARRAY_SIZE: usize = 10_000;

/// Default maximum map size.
const DEFAULT_MAX_MAP_SIZE: usize = 10_000;

/// Resource limits for custom script steps.
///
/// A fresh, sandboxed engine is created per execution: no shared state
/// between records, no file system or network access, and hard bounds on
/// operations and data sizes.
#[derive(Debug, Clone)]
pub struct ScriptLimits {
    /// Maximum number of operations before termination.
    pub max_operations: u64,
    /// Maximum call stack depth.
    pub max_call_stack_depth: usize,
    /// Maximum string size in bytes.
    pub max_string_size: usize,
    /// Maximum array size.
    pub max_array_size: usize,
    /// Maximum map size.
    pub max_map_size: usize,
}

impl Default for ScriptLimits {
    fn default() -> Self {
        Self {
            max_operations: DEFAULT_MAX_OPERATIONS,
            max_call_stack_depth: DEFAULT_MAX_CALL_STACK_DEPTH,
            max_string_size: DEFAULT_MAX_STRING_SIZE,
            max_array_size: DEFAULT_MAX_ARRAY_SIZE,
            max_map_size: DEFAULT_MAX_MAP_SIZE,
        }
    }
}

/// How a step ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    /// Step ran and (possibly) changed the record.
    Applied,
    /// Step was inactive and did not run.
    Skipped,
    /// Step dropped the record from the run.
    Dropped,
    /// Step failed; the record is excluded from writes.
    Failed,
}

/// Per-step execution report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepReport {
    /// Step identifier.
    pub step_id: StepId,
    /// Step name at execution time.
    pub step_name: String,
    /// Step kind.
    pub kind: StepKind,
    /// How the step ended.
    pub status: StepStatus,
    /// Non-fatal issues encountered.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    /// Error message when `status` is `failed`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Execution time in microseconds.
    pub duration_us: u64,
}

impl StepReport {
    fn new(step: &TransformationStep, status: StepStatus) -> Self {
        Self {
            step_id: step.id,
            step_name: step.name.clone(),
            kind: step.kind(),
            status,
            warnings: Vec::new(),
            error: None,
            duration_us: 0,
        }
    }
}

/// Result of running a pipeline over one record's fields.
#[derive(Debug, Clone)]
pub struct TransformOutcome {
    /// The transformed fields, or `None` when the record was dropped or a
    /// step failed.
    pub output: Option<FieldMap>,
    /// One report per step, in execution order.
    pub reports: Vec<StepReport>,
}

impl TransformOutcome {
    /// The failed step's report, if any step failed.
    #[must_use]
    pub fn failure(&self) -> Option<&StepReport> {
        self.reports.iter().find(|r| r.status == StepStatus::Failed)
    }

    /// True when a filtering step or a script dropped the record.
    #[must_use]
    pub fn is_dropped(&self) -> bool {
        self.output.is_none()
            && self
                .reports
                .iter()
                .any(|r| r.status == StepStatus::Dropped)
    }

    /// All warnings across steps.
    #[must_use]
    pub fn warnings(&self) -> Vec<&str> {
        self.reports
            .iter()
            .flat_map(|r| r.warnings.iter().map(String::as_str))
            .collect()
    }
}

/// What one step did to the record.
enum StepEffect {
    Applied {
        fields: FieldMap,
        warnings: Vec<String>,
    },
    Dropped,
}

/// Executes transformation pipelines.
#[derive(Debug, Clone, Default)]
pub struct TransformExecutor {
    limits: ScriptLimits,
}

impl TransformExecutor {
    /// Create an executor with default script limits.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an executor with custom script limits.
    #[must_use]
    pub fn with_limits(limits: ScriptLimits) -> Self {
        Self { limits }
    }

    /// Run the pipeline over one record's fields.
    ///
    /// The input is never mutated. A failed step stops execution: later
    /// steps do not run and `output` is `None`.
    #[must_use]
    pub fn execute(&self, pipeline: &TransformationPipeline, fields: &FieldMap) -> TransformOutcome {
        let mut current = fields.clone();
        let mut reports = Vec::with_capacity(pipeline.steps.len());

        for step in pipeline.ordered_steps() {
            if !step.active {
                reports.push(StepReport::new(step, StepStatus::Skipped));
                continue;
            }

            let start = Instant::now();
            let effect = self.apply_step(step, &current);
            let duration_us = start.elapsed().as_micros() as u64;

            match effect {
                Ok(StepEffect::Applied { fields, warnings }) => {
                    let mut report = StepReport::new(step, StepStatus::Applied);
                    report.warnings = warnings;
                    report.duration_us = duration_us;
                    reports.push(report);
                    current = fields;
                }
                Ok(StepEffect::Dropped) => {
                    debug!(step = %step.name, "Record dropped by pipeline step");
                    let mut report = StepReport::new(step, StepStatus::Dropped);
                    report.duration_us = duration_us;
                    reports.push(report);
                    return TransformOutcome {
                        output: None,
                        reports,
                    };
                }
                Err(message) => {
                    warn!(step = %step.name, error = %message, "Pipeline step failed");
                    let mut report = StepReport::new(step, StepStatus::Failed);
                    report.error = Some(message);
                    report.duration_us = duration_us;
                    reports.push(report);
                    return TransformOutcome {
                        output: None,
                        reports,
                    };
                }
            }
        }

        TransformOutcome {
            output: Some(current),
            reports,
        }
    }

    fn apply_step(
        &self,
        step: &TransformationStep,
        fields: &FieldMap,
    ) -> Result<StepEffect, String> {
        match &step.config {
            StepConfig::FieldMapping {
                mappings,
                copy_unmapped,
            } => Ok(apply_field_mapping(mappings, *copy_unmapped, fields)),
            StepConfig::DataTypeConversion {
                conversions,
                strict,
            } => apply_type_conversion(conversions, *strict, fields),
            StepConfig::ValueTransformation { operations } => {
                Ok(apply_value_transformation(operations, fields))
            }
            StepConfig::Validation { rules } => apply_validation(rules, fields),
            StepConfig::Enrichment { derivations } => Ok(apply_enrichment(derivations, fields)),
            StepConfig::Filtering { condition, action } => {
                Ok(apply_filtering(condition, action, fields))
            }
            StepConfig::Aggregation { target, fields: inputs, op } => {
                Ok(apply_aggregation(target, inputs, *op, fields))
            }
            StepConfig::Normalization {
                fields: targets,
                trim,
                case,
                collapse_whitespace,
            } => Ok(apply_normalization(
                targets,
                *trim,
                *case,
                *collapse_whitespace,
                fields,
            )),
            StepConfig::Deduplication { fields: targets } => {
                Ok(apply_deduplication(targets, fields))
            }
            StepConfig::FormatConversion { conversions } => {
                Ok(apply_format_conversion(conversions, fields))
            }
            StepConfig::Custom { script } => self.apply_custom(script, fields),
        }
    }

    /// Create a sandboxed script engine with resource limits.
    fn create_engine(&self) -> Engine {
        let mut engine = Engine::new();

        engine.set_max_operations(self.limits.max_operations);
        engine.set_max_call_levels(self.limits.max_call_stack_depth);
        engine.set_max_string_size(self.limits.max_string_size);
        engine.set_max_array_size(self.limits.max_array_size);
        engine.set_max_map_size(self.limits.max_map_size);
        engine.set_strict_variables(true);

        engine.register_fn("log_info", |msg: &str| {
            info!(script_log = %msg, "Pipeline script log");
        });
        engine.register_fn("log_warn", |msg: &str| {
            warn!(script_log = %msg, "Pipeline script warning");
        });

        engine
    }

    /// Compile a script without running it. Used by builder validation.
    pub(crate) fn compile_script(&self, script: &str) -> Result<(), String> {
        let engine = self.create_engine();
        let mut scope = rhai::Scope::new();
        scope.push("record", rhai::Map::new());
        engine
            .compile_with_scope(&scope, script)
            .map(|_| ())
            .map_err(|e| format!("compilation error: {e}"))
    }

    fn apply_custom(&self, script: &str, fields: &FieldMap) -> Result<StepEffect, String> {
        let engine = self.create_engine();

        let mut scope = rhai::Scope::new();
        let record = rhai::serde::to_dynamic(fields)
            .map_err(|e| format!("cannot expose record to script: {e}"))?;
        scope.push("record", record);

        let ast = engine
            .compile_with_scope(&scope, script)
            .map_err(|e| format!("compilation error: {e}"))?;

        let result = engine
            .eval_ast_with_scope::<rhai::Dynamic>(&mut scope, &ast)
            .map_err(|e| format!("runtime error: {e}"))?;

        // Unit return means the script chose to drop the record.
        if result.is_unit() {
            return Ok(StepEffect::Dropped);
        }

        let value: serde_json::Value = rhai::serde::from_dynamic(&result)
            .map_err(|e| format!("script must return a map: {e}"))?;
        match FieldValue::from_json(value) {
            FieldValue::Map(map) => Ok(StepEffect::Applied {
                fields: map,
                warnings: Vec::new(),
            }),
            other => Err(format!(
                "script must return a map, got {}",
                json_type_name(&other)
            )),
        }
    }
}

fn json_type_name(value: &FieldValue) -> &'static str {
    match value {
        FieldValue::Null => "null",
        FieldValue::Bool(_) => "bool",
        FieldValue::Integer(_) => "integer",
        FieldValue::Float(_) => "float",
        FieldValue::String(_) => "string",
        FieldValue::Array(_) => "array",
        FieldValue::Map(_) => "map",
    }
}

fn apply_field_mapping(
    mappings: &[FieldMapping],
    copy_unmapped: bool,
    fields: &FieldMap,
) -> StepEffect {
    let mut warnings = Vec::new();
    let mut out = if copy_unmapped {
        let sources: Vec<&str> = mappings.iter().map(|m| m.source.as_str()).collect();
        fields
            .iter()
            .filter(|(key, _)| !sources.contains(&key.as_str()))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    } else {
        FieldMap::new()
    };

    for mapping in mappings {
        match fields.get(&mapping.source) {
            Some(value) => {
                out.insert(mapping.target.clone(), value.clone());
            }
            None => warnings.push(format!("source field '{}' is missing", mapping.source)),
        }
    }

    StepEffect::Applied {
        fields: out,
        warnings,
    }
}

fn apply_type_conversion(
    conversions: &[TypeConversion],
    strict: bool,
    fields: &FieldMap,
) -> Result<StepEffect, String> {
    let mut out = fields.clone();
    let mut warnings = Vec::new();

    for conversion in conversions {
        let Some(value) = fields.get(&conversion.field) else {
            continue;
        };
        if value.is_null() {
            continue;
        }
        match coerce(value, conversion.target) {
            Some(coerced) => {
                out.insert(conversion.field.clone(), coerced);
            }
            None => {
                let message = format!(
                    "cannot convert field '{}' ({}) to {:?}",
                    conversion.field,
                    json_type_name(value),
                    conversion.target
                );
                if strict {
                    return Err(message);
                }
                warnings.push(message);
            }
        }
    }

    Ok(StepEffect::Applied {
        fields: out,
        warnings,
    })
}

#[allow(clippy::cast_possible_truncation)]
fn coerce(value: &FieldValue, target: TargetType) -> Option<FieldValue> {
    match target {
        TargetType::String => value.display_text().map(FieldValue::String),
        TargetType::Integer => match value {
            FieldValue::Integer(i) => Some(FieldValue::Integer(*i)),
            FieldValue::Float(f) if f.fract() == 0.0 => Some(FieldValue::Integer(*f as i64)),
            FieldValue::Bool(b) => Some(FieldValue::Integer(i64::from(*b))),
            FieldValue::String(s) => s.trim().parse::<i64>().ok().map(FieldValue::Integer),
            _ => None,
        },
        TargetType::Float => match value {
            FieldValue::Float(_) | FieldValue::Integer(_) => {
                value.as_f64().map(FieldValue::Float)
            }
            FieldValue::String(s) => s.trim().parse::<f64>().ok().map(FieldValue::Float),
            _ => None,
        },
        TargetType::Boolean => match value {
            FieldValue::Bool(b) => Some(FieldValue::Bool(*b)),
            FieldValue::Integer(i) => Some(FieldValue::Bool(*i != 0)),
            FieldValue::String(s) => match s.trim().to_lowercase().as_str() {
                "true" | "yes" | "1" => Some(FieldValue::Bool(true)),
                "false" | "no" | "0" => Some(FieldValue::Bool(false)),
                _ => None,
            },
            _ => None,
        },
    }
}

fn apply_value_transformation(operations: &[ValueOperation], fields: &FieldMap) -> StepEffect {
    let mut out = fields.clone();
    let mut warnings = Vec::new();

    for operation in operations {
        // Templates write the target field whether or not it existed before.
        if let ValueOp::Template { template } = &operation.op {
            let rendered = render_template(template, fields, &mut warnings);
            out.insert(operation.field.clone(), FieldValue::String(rendered));
            continue;
        }
        let Some(FieldValue::String(s)) = fields.get(&operation.field) else {
            warnings.push(format!(
                "field '{}' is missing or not a string",
                operation.field
            ));
            continue;
        };
        let transformed = match &operation.op {
            ValueOp::Trim => s.trim().to_string(),
            ValueOp::Uppercase => s.to_uppercase(),
            ValueOp::Lowercase => s.to_lowercase(),
            ValueOp::Replace { from, to } => s.replace(from.as_str(), to),
            ValueOp::Template { .. } => continue,
        };
        out.insert(operation.field.clone(), FieldValue::String(transformed));
    }

    StepEffect::Applied {
        fields: out,
        warnings,
    }
}

/// Substitute `{field}` placeholders from the map. Dot paths reach into
/// nested maps. Unknown fields render empty and produce a warning.
fn render_template(template: &str, fields: &FieldMap, warnings: &mut Vec<String>) -> String {
    let Ok(re) = Regex::new(r"\{([A-Za-z0-9_.]+)\}") else {
        return template.to_string();
    };
    re.replace_all(template, |caps: &regex::Captures<'_>| {
        let name = &caps[1];
        match get_path(fields, name).and_then(FieldValue::display_text) {
            Some(text) => text,
            None => {
                warnings.push(format!("template field '{name}' is missing"));
                String::new()
            }
        }
    })
    .into_owned()
}

fn apply_validation(rules: &[ValidationRule], fields: &FieldMap) -> Result<StepEffect, String> {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    for rule in rules {
        if let Some(violation) = check_rule(rule, fields) {
            let message = rule.message.clone().unwrap_or(violation);
            match rule.severity {
                Severity::Error => errors.push(message),
                Severity::Warning => warnings.push(message),
            }
        }
    }

    if errors.is_empty() {
        Ok(StepEffect::Applied {
            fields: fields.clone(),
            warnings,
        })
    } else {
        Err(errors.join("; "))
    }
}

/// Returns the violation message when the rule fails, `None` when it holds.
fn check_rule(rule: &ValidationRule, fields: &FieldMap) -> Option<String> {
    let value = get_path(fields, &rule.field);
    match &rule.rule {
        RuleKind::Required => {
            let present = match value {
                None => false,
                Some(FieldValue::Null) => false,
                Some(FieldValue::String(s)) => !s.is_empty(),
                Some(_) => true,
            };
            (!present).then(|| format!("field '{}' is required", rule.field))
        }
        RuleKind::MinLength { min } => match value {
            Some(FieldValue::String(s)) if s.chars().count() < *min => Some(format!(
                "field '{}' is shorter than {} characters",
                rule.field, min
            )),
            _ => None,
        },
        RuleKind::MaxLength { max } => match value {
            Some(FieldValue::String(s)) if s.chars().count() > *max => Some(format!(
                "field '{}' is longer than {} characters",
                rule.field, max
            )),
            _ => None,
        },
        RuleKind::Pattern { pattern } => {
            let Ok(re) = Regex::new(pattern) else {
                return Some(format!("invalid pattern for field '{}'", rule.field));
            };
            match value {
                Some(FieldValue::String(s)) if !re.is_match(s) => Some(format!(
                    "field '{}' does not match pattern '{}'",
                    rule.field, pattern
                )),
                _ => None,
            }
        }
        RuleKind::NumericRange { min, max } => {
            let Some(value) = value else { return None };
            if value.is_null() {
                return None;
            }
            let Some(number) = value.as_f64() else {
                return Some(format!("field '{}' is not numeric", rule.field));
            };
            if min.is_some_and(|m| number < m) || max.is_some_and(|m| number > m) {
                Some(format!("field '{}' is out of range", rule.field))
            } else {
                None
            }
        }
    }
}

fn apply_enrichment(derivations: &[Derivation], fields: &FieldMap) -> StepEffect {
    let mut out = fields.clone();
    let mut warnings = Vec::new();

    for derivation in derivations {
        let value = match &derivation.source {
            DerivationSource::Concat { fields: parts, separator } => {
                let mut rendered = Vec::with_capacity(parts.len());
                for part in parts {
                    match get_path(fields, part).and_then(FieldValue::display_text) {
                        Some(text) => rendered.push(text),
                        None => {
                            warnings.push(format!("concat input '{part}' is missing"));
                            rendered.push(String::new());
                        }
                    }
                }
                FieldValue::String(rendered.join(separator))
            }
            DerivationSource::Constant { value } => value.clone(),
            DerivationSource::Timestamp => FieldValue::String(Utc::now().to_rfc3339()),
            DerivationSource::Uuid => FieldValue::String(uuid::Uuid::new_v4().to_string()),
        };
        out.insert(derivation.target.clone(), value);
    }

    StepEffect::Applied {
        fields: out,
        warnings,
    }
}

fn apply_filtering(condition: &DataFilter, action: &FilterAction, fields: &FieldMap) -> StepEffect {
    if !condition.matches(fields) {
        return StepEffect::Applied {
            fields: fields.clone(),
            warnings: Vec::new(),
        };
    }

    match action {
        FilterAction::Remove => StepEffect::Dropped,
        FilterAction::Mask { replacement } => {
            let mut out = fields.clone();
            if out.contains_key(&condition.field) {
                out.insert(
                    condition.field.clone(),
                    FieldValue::String(replacement.clone()),
                );
            }
            StepEffect::Applied {
                fields: out,
                warnings: Vec::new(),
            }
        }
    }
}

#[allow(clippy::cast_precision_loss)]
fn apply_aggregation(
    target: &str,
    inputs: &[String],
    op: AggregateOp,
    fields: &FieldMap,
) -> StepEffect {
    let mut out = fields.clone();
    let mut warnings = Vec::new();

    if op == AggregateOp::Count {
        let count = inputs
            .iter()
            .filter(|f| fields.get(f.as_str()).is_some_and(|v| !v.is_null()))
            .count();
        out.insert(target.to_string(), FieldValue::Integer(count as i64));
        return StepEffect::Applied {
            fields: out,
            warnings,
        };
    }

    let mut numbers = Vec::with_capacity(inputs.len());
    for input in inputs {
        match fields.get(input.as_str()).and_then(FieldValue::as_f64) {
            Some(n) => numbers.push(n),
            None => warnings.push(format!("aggregation input '{input}' is not numeric")),
        }
    }

    let value = match op {
        AggregateOp::Sum => Some(numbers.iter().sum::<f64>()),
        AggregateOp::Avg if numbers.is_empty() => None,
        AggregateOp::Avg => Some(numbers.iter().sum::<f64>() / numbers.len() as f64),
        AggregateOp::Min => numbers.iter().copied().reduce(f64::min),
        AggregateOp::Max => numbers.iter().copied().reduce(f64::max),
        AggregateOp::Count => None,
    };

    match value {
        Some(n) => {
            out.insert(target.to_string(), FieldValue::Float(n));
        }
        None => warnings.push(format!("aggregation '{target}' had no numeric inputs")),
    }

    StepEffect::Applied {
        fields: out,
        warnings,
    }
}

fn apply_normalization(
    targets: &[String],
    trim: bool,
    case: CaseForm,
    collapse_whitespace: bool,
    fields: &FieldMap,
) -> StepEffect {
    let mut out = fields.clone();

    let names: Vec<String> = if targets.is_empty() {
        fields
            .iter()
            .filter(|(_, v)| matches!(v, FieldValue::String(_)))
            .map(|(k, _)| k.clone())
            .collect()
    } else {
        targets.to_vec()
    };

    for name in names {
        let Some(FieldValue::String(s)) = fields.get(&name) else {
            continue;
        };
        let mut value = s.clone();
        if trim {
            value = value.trim().to_string();
        }
        if collapse_whitespace {
            value = value.split_whitespace().collect::<Vec<_>>().join(" ");
        }
        value = match case {
            CaseForm::None => value,
            CaseForm::Lower => value.to_lowercase(),
            CaseForm::Upper => value.to_uppercase(),
        };
        out.insert(name, FieldValue::String(value));
    }

    StepEffect::Applied {
        fields: out,
        warnings: Vec::new(),
    }
}

fn apply_deduplication(targets: &[String], fields: &FieldMap) -> StepEffect {
    let mut out = fields.clone();

    let names: Vec<String> = if targets.is_empty() {
        fields
            .iter()
            .filter(|(_, v)| matches!(v, FieldValue::Array(_)))
            .map(|(k, _)| k.clone())
            .collect()
    } else {
        targets.to_vec()
    };

    for name in names {
        let Some(FieldValue::Array(items)) = fields.get(&name) else {
            continue;
        };
        let mut seen: Vec<FieldValue> = Vec::with_capacity(items.len());
        for item in items {
            if !seen.contains(item) {
                seen.push(item.clone());
            }
        }
        out.insert(name, FieldValue::Array(seen));
    }

    StepEffect::Applied {
        fields: out,
        warnings: Vec::new(),
    }
}

fn apply_format_conversion(conversions: &[FormatRule], fields: &FieldMap) -> StepEffect {
    let mut out = fields.clone();
    let mut warnings = Vec::new();

    for conversion in conversions {
        let Some(value) = fields.get(&conversion.field) else {
            continue;
        };
        match convert_format(value, &conversion.format) {
            Some(converted) => {
                out.insert(conversion.field.clone(), converted);
            }
            None => warnings.push(format!(
                "cannot apply format conversion to field '{}'",
                conversion.field
            )),
        }
    }

    StepEffect::Applied {
        fields: out,
        warnings,
    }
}

fn convert_format(value: &FieldValue, format: &FormatKind) -> Option<FieldValue> {
    match format {
        FormatKind::UnixToRfc3339 => {
            let secs = value.as_i64()?;
            let dt = chrono::DateTime::from_timestamp(secs, 0)?;
            Some(FieldValue::String(dt.to_rfc3339()))
        }
        FormatKind::Rfc3339ToUnix => {
            let s = value.as_str()?;
            let dt = chrono::DateTime::parse_from_rfc3339(s).ok()?;
            Some(FieldValue::Integer(dt.timestamp()))
        }
        FormatKind::NumberToString { decimals } => {
            let n = value.as_f64()?;
            Some(FieldValue::String(format!(
                "{n:.prec$}",
                prec = *decimals as usize
            )))
        }
    }
}
