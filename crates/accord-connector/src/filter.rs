//! Filters and pagination for fetch queries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::record::DataRecord;
use crate::value::{get_path, FieldMap, FieldValue};

/// Comparison operator for a [`DataFilter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOp {
    /// Exact equality.
    Equals,
    /// Negated equality.
    NotEquals,
    /// Strictly greater.
    GreaterThan,
    /// Greater or equal.
    GreaterOrEqual,
    /// Strictly smaller.
    LessThan,
    /// Smaller or equal.
    LessOrEqual,
    /// Substring match for strings, membership for arrays.
    Contains,
    /// Value is one of the candidates in an array.
    In,
    /// Field is absent or null.
    IsNull,
    /// Field is present and non-null.
    NotNull,
}

impl FilterOp {
    /// Stable string form.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Equals => "equals",
            Self::NotEquals => "not_equals",
            Self::GreaterThan => "greater_than",
            Self::GreaterOrEqual => "greater_or_equal",
            Self::LessThan => "less_than",
            Self::LessOrEqual => "less_or_equal",
            Self::Contains => "contains",
            Self::In => "in",
            Self::IsNull => "is_null",
            Self::NotNull => "not_null",
        }
    }
}

impl std::fmt::Display for FilterOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for FilterOp {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "equals" => Ok(Self::Equals),
            "not_equals" => Ok(Self::NotEquals),
            "greater_than" => Ok(Self::GreaterThan),
            "greater_or_equal" => Ok(Self::GreaterOrEqual),
            "less_than" => Ok(Self::LessThan),
            "less_or_equal" => Ok(Self::LessOrEqual),
            "contains" => Ok(Self::Contains),
            "in" => Ok(Self::In),
            "is_null" => Ok(Self::IsNull),
            "not_null" => Ok(Self::NotNull),
            other => Err(format!("unknown filter op: {other}")),
        }
    }
}

/// A single predicate applied to record fields.
///
/// Inactive filters are kept but not evaluated, so a stored filter set can
/// be toggled without editing it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataFilter {
    /// Field name, dot paths reach into nested maps.
    pub field: String,
    /// Comparison operator.
    pub op: FilterOp,
    /// Right-hand side. Ignored for `is_null` / `not_null`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<FieldValue>,
    /// Restrict the filter to one record type, `None` applies everywhere.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_type: Option<String>,
    /// Whether the filter participates in evaluation.
    #[serde(default = "default_true")]
    pub active: bool,
}

fn default_true() -> bool {
    true
}

impl DataFilter {
    /// Build a filter with an explicit operator and operand.
    #[must_use]
    pub fn new(field: impl Into<String>, op: FilterOp, value: Option<FieldValue>) -> Self {
        Self {
            field: field.into(),
            op,
            value,
            data_type: None,
            active: true,
        }
    }

    /// `field == value`.
    #[must_use]
    pub fn equals(field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        Self::new(field, FilterOp::Equals, Some(value.into()))
    }

    /// `field != value`.
    #[must_use]
    pub fn not_equals(field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        Self::new(field, FilterOp::NotEquals, Some(value.into()))
    }

    /// `field > value`.
    #[must_use]
    pub fn greater_than(field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        Self::new(field, FilterOp::GreaterThan, Some(value.into()))
    }

    /// `field < value`.
    #[must_use]
    pub fn less_than(field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        Self::new(field, FilterOp::LessThan, Some(value.into()))
    }

    /// Substring or array membership.
    #[must_use]
    pub fn contains(field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        Self::new(field, FilterOp::Contains, Some(value.into()))
    }

    /// `field` is one of `candidates`.
    #[must_use]
    pub fn one_of(field: impl Into<String>, candidates: Vec<FieldValue>) -> Self {
        Self::new(field, FilterOp::In, Some(FieldValue::Array(candidates)))
    }

    /// `field` is missing or null.
    #[must_use]
    pub fn is_null(field: impl Into<String>) -> Self {
        Self::new(field, FilterOp::IsNull, None)
    }

    /// `field` is present and non-null.
    #[must_use]
    pub fn not_null(field: impl Into<String>) -> Self {
        Self::new(field, FilterOp::NotNull, None)
    }

    /// Scope the filter to one record type. Chainable.
    #[must_use]
    pub fn for_data_type(mut self, data_type: impl Into<String>) -> Self {
        self.data_type = Some(data_type.into());
        self
    }

    /// Return a disabled copy.
    #[must_use]
    pub fn inactive(mut self) -> Self {
        self.active = false;
        self
    }

    /// Evaluate the filter against a field map.
    ///
    /// Inactive filters always pass.
    #[must_use]
    pub fn matches(&self, fields: &FieldMap) -> bool {
        if !self.active {
            return true;
        }
        let actual = get_path(fields, &self.field);
        self.evaluate(actual)
    }

    /// Evaluate against a whole record.
    ///
    /// Envelope fields (`external_id`, `data_type`, `updated_at`,
    /// `created_at`, `synced_at`) resolve from the record itself, everything
    /// else from the payload. A `data_type` scope that does not match the
    /// record makes the filter pass.
    #[must_use]
    pub fn matches_record(&self, record: &DataRecord) -> bool {
        if !self.active {
            return true;
        }
        if let Some(scope) = &self.data_type {
            if *scope != record.data_type {
                return true;
            }
        }
        let envelope: Option<FieldValue> = match self.field.as_str() {
            "external_id" => Some(FieldValue::String(record.external_id.clone())),
            "data_type" => Some(FieldValue::String(record.data_type.clone())),
            "updated_at" => Some(FieldValue::String(record.updated_at.to_rfc3339())),
            "created_at" => Some(FieldValue::String(record.created_at.to_rfc3339())),
            "synced_at" => record
                .synced_at
                .map(|at| FieldValue::String(at.to_rfc3339())),
            _ => None,
        };
        match (&envelope, self.field.as_str()) {
            (Some(value), _) => self.evaluate(Some(value)),
            // synced_at is None before the first sync, which is "null".
            (None, "synced_at") => self.evaluate(None),
            (None, _) => self.evaluate(get_path(&record.fields, &self.field)),
        }
    }

    fn evaluate(&self, actual: Option<&FieldValue>) -> bool {
        match self.op {
            FilterOp::IsNull => actual.is_none_or(FieldValue::is_null),
            FilterOp::NotNull => actual.is_some_and(|v| !v.is_null()),
            FilterOp::Equals => match (actual, &self.value) {
                (Some(a), Some(e)) => compare_values(a, e) == Some(std::cmp::Ordering::Equal),
                _ => false,
            },
            FilterOp::NotEquals => match (actual, &self.value) {
                (Some(a), Some(e)) => compare_values(a, e) != Some(std::cmp::Ordering::Equal),
                _ => true,
            },
            FilterOp::GreaterThan => self.ordered(actual, |o| o == std::cmp::Ordering::Greater),
            FilterOp::GreaterOrEqual => self.ordered(actual, |o| o != std::cmp::Ordering::Less),
            FilterOp::LessThan => self.ordered(actual, |o| o == std::cmp::Ordering::Less),
            FilterOp::LessOrEqual => self.ordered(actual, |o| o != std::cmp::Ordering::Greater),
            FilterOp::Contains => match (actual, &self.value) {
                (Some(FieldValue::String(haystack)), Some(FieldValue::String(needle))) => {
                    haystack.contains(needle.as_str())
                }
                (Some(FieldValue::Array(items)), Some(needle)) => items.contains(needle),
                _ => false,
            },
            FilterOp::In => match (actual, &self.value) {
                (Some(a), Some(FieldValue::Array(candidates))) => candidates.contains(a),
                _ => false,
            },
        }
    }

    fn ordered(
        &self,
        actual: Option<&FieldValue>,
        accept: impl Fn(std::cmp::Ordering) -> bool,
    ) -> bool {
        match (actual, &self.value) {
            (Some(a), Some(e)) => compare_values(a, e).is_some_and(accept),
            _ => false,
        }
    }
}

/// Compare two values for filtering.
///
/// Numbers compare numerically across `Integer` and `Float`. Strings that
/// both parse as RFC 3339 timestamps compare as instants, so timestamp
/// filters survive formatting differences. Everything else compares only
/// for equality.
fn compare_values(a: &FieldValue, b: &FieldValue) -> Option<std::cmp::Ordering> {
    if let (Some(x), Some(y)) = (a.as_f64(), b.as_f64()) {
        return x.partial_cmp(&y);
    }
    if let (FieldValue::String(x), FieldValue::String(y)) = (a, b) {
        if let (Ok(dx), Ok(dy)) = (
            DateTime::parse_from_rfc3339(x),
            DateTime::parse_from_rfc3339(y),
        ) {
            let (dx, dy): (DateTime<Utc>, DateTime<Utc>) = (dx.into(), dy.into());
            return Some(dx.cmp(&dy));
        }
        return Some(x.cmp(y));
    }
    if a == b {
        Some(std::cmp::Ordering::Equal)
    } else {
        None
    }
}

/// One page of a paginated fetch. Page numbers start at 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    /// 1-based page number.
    pub number: u32,
    /// Maximum records per page.
    pub size: u32,
}

impl PageRequest {
    /// First page with the given size.
    #[must_use]
    pub fn first(size: u32) -> Self {
        Self { number: 1, size }
    }

    /// Build a page request.
    #[must_use]
    pub fn new(number: u32, size: u32) -> Self {
        Self {
            number: number.max(1),
            size,
        }
    }

    /// The page after this one.
    #[must_use]
    pub fn next(&self) -> Self {
        Self {
            number: self.number + 1,
            size: self.size,
        }
    }

    /// Records to skip before this page starts.
    #[must_use]
    pub fn offset(&self) -> usize {
        (self.number as usize - 1) * self.size as usize
    }
}

/// A fetch request sent to a connector: filters plus one page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchQuery {
    /// Logical record type to fetch.
    pub data_type: String,
    /// Predicates the remote side should apply.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub filters: Vec<DataFilter>,
    /// Page to return.
    pub page: PageRequest,
}

impl FetchQuery {
    /// Query one page of `data_type` with no filters.
    #[must_use]
    pub fn new(data_type: impl Into<String>, page: PageRequest) -> Self {
        Self {
            data_type: data_type.into(),
            filters: Vec::new(),
            page,
        }
    }

    /// Add a filter. Chainable.
    #[must_use]
    pub fn with_filter(mut self, filter: DataFilter) -> Self {
        self.filters.push(filter);
        self
    }

    /// Add many filters. Chainable.
    #[must_use]
    pub fn with_filters(mut self, filters: Vec<DataFilter>) -> Self {
        self.filters.extend(filters);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::DataSourceId;
    use crate::value::field_map_from_json;

    fn fields() -> FieldMap {
        field_map_from_json(serde_json::json!({
            "name": "Ada",
            "age": 36,
            "email": null,
            "tags": ["a", "b"],
            "address": {"city": "London"}
        }))
    }

    #[test]
    fn test_op_roundtrip() {
        for op in [
            FilterOp::Equals,
            FilterOp::NotEquals,
            FilterOp::GreaterThan,
            FilterOp::GreaterOrEqual,
            FilterOp::LessThan,
            FilterOp::LessOrEqual,
            FilterOp::Contains,
            FilterOp::In,
            FilterOp::IsNull,
            FilterOp::NotNull,
        ] {
            assert_eq!(op.as_str().parse::<FilterOp>().unwrap(), op);
        }
        assert!("bogus".parse::<FilterOp>().is_err());
    }

    #[test]
    fn test_equals_and_ordering() {
        let map = fields();
        assert!(DataFilter::equals("name", "Ada").matches(&map));
        assert!(!DataFilter::equals("name", "Bob").matches(&map));
        assert!(DataFilter::greater_than("age", 30i64).matches(&map));
        assert!(!DataFilter::greater_than("age", 36i64).matches(&map));
        assert!(DataFilter::less_than("age", 40.5).matches(&map));
    }

    #[test]
    fn test_contains_and_in() {
        let map = fields();
        assert!(DataFilter::contains("name", "da").matches(&map));
        assert!(DataFilter::contains("tags", "a").matches(&map));
        assert!(!DataFilter::contains("tags", "z").matches(&map));
        assert!(DataFilter::one_of("name", vec!["Ada".into(), "Bob".into()]).matches(&map));
        assert!(!DataFilter::one_of("name", vec!["Bob".into()]).matches(&map));
    }

    #[test]
    fn test_null_checks_and_paths() {
        let map = fields();
        assert!(DataFilter::is_null("email").matches(&map));
        assert!(DataFilter::is_null("missing").matches(&map));
        assert!(DataFilter::not_null("name").matches(&map));
        assert!(!DataFilter::not_null("email").matches(&map));
        assert!(DataFilter::equals("address.city", "London").matches(&map));
    }

    #[test]
    fn test_inactive_always_passes() {
        let map = fields();
        assert!(DataFilter::equals("name", "Bob").inactive().matches(&map));
    }

    #[test]
    fn test_timestamp_strings_compare_as_instants() {
        let map = field_map_from_json(serde_json::json!({
            "at": "2026-03-01T12:00:00+02:00"
        }));
        // Same instant, different offset.
        assert!(DataFilter::equals("at", "2026-03-01T10:00:00Z").matches(&map));
        assert!(DataFilter::greater_than("at", "2026-03-01T09:59:59Z").matches(&map));
    }

    #[test]
    fn test_matches_record_envelope_fields() {
        let record = DataRecord::new(DataSourceId::new(), "user", "u-1", fields());
        assert!(DataFilter::equals("external_id", "u-1").matches_record(&record));
        assert!(DataFilter::equals("data_type", "user").matches_record(&record));
        assert!(DataFilter::is_null("synced_at").matches_record(&record));
        assert!(DataFilter::equals("name", "Ada").matches_record(&record));

        let cutoff = (record.updated_at - chrono::Duration::seconds(5)).to_rfc3339();
        assert!(DataFilter::greater_than("updated_at", cutoff).matches_record(&record));
    }

    #[test]
    fn test_data_type_scope() {
        let record = DataRecord::new(DataSourceId::new(), "user", "u-1", fields());
        let filter = DataFilter::equals("name", "Bob").for_data_type("order");
        // Scoped to another type, so it does not constrain this record.
        assert!(filter.matches_record(&record));
        let filter = DataFilter::equals("name", "Bob").for_data_type("user");
        assert!(!filter.matches_record(&record));
    }

    #[test]
    fn test_page_request_offsets() {
        let first = PageRequest::first(10);
        assert_eq!(first.number, 1);
        assert_eq!(first.offset(), 0);
        let third = first.next().next();
        assert_eq!(third.number, 3);
        assert_eq!(third.offset(), 20);
        assert_eq!(PageRequest::new(0, 10).number, 1);
    }
}
