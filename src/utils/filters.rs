//! Lookup filters
//!
//! Parses `field__operator` lookups such as `{"age__gt": 30}` into
//! [`Filter`]s and evaluates them against JSON records.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};
use serde_json::{Map, Value};

/// Separator between field name and operator
pub const LOOKUP_SEPARATOR: &str = "__";

static UNIQUE_VIOLATION: Lazy<Regex> = Lazy::new(|| Regex::new(r"Key \((.*?)\)=\(").unwrap());

/// Lookup operator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Eq,
    Ne,
    Lt,
    Lte,
    Gt,
    Gte,
    Like,
    ILike,
    In,
    NotIn,
    IsNull,
}

impl FromStr for Operator {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "eq" => Ok(Self::Eq),
            "ne" => Ok(Self::Ne),
            "lt" => Ok(Self::Lt),
            "lte" => Ok(Self::Lte),
            "gt" => Ok(Self::Gt),
            "gte" => Ok(Self::Gte),
            "like" => Ok(Self::Like),
            "ilike" => Ok(Self::ILike),
            "in" => Ok(Self::In),
            "notin" => Ok(Self::NotIn),
            "isnull" => Ok(Self::IsNull),
            other => Err(other.to_string()),
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Eq => "eq",
            Self::Ne => "ne",
            Self::Lt => "lt",
            Self::Lte => "lte",
            Self::Gt => "gt",
            Self::Gte => "gte",
            Self::Like => "like",
            Self::ILike => "ilike",
            Self::In => "in",
            Self::NotIn => "notin",
            Self::IsNull => "isnull",
        };
        f.write_str(name)
    }
}

/// A single parsed lookup
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub field: String,
    pub operator: Operator,
    pub value: Value,
}

impl Filter {
    pub fn new(field: impl Into<String>, operator: Operator, value: Value) -> Self {
        Self {
            field: field.into(),
            operator,
            value,
        }
    }

    /// Parse a single lookup key. Returns `None` for unknown operators.
    pub fn parse(key: &str, value: Value) -> Option<Self> {
        let (field, operator) = match key.rsplit_once(LOOKUP_SEPARATOR) {
            Some((field, op)) => (field, op.parse().ok()?),
            None => (key, Operator::Eq),
        };

        Some(Self::new(field, operator, value))
    }

    /// Evaluate the filter against a record. Missing fields count as null,
    /// and null never compares equal or ordered to anything.
    pub fn matches(&self, record: &Map<String, Value>) -> bool {
        let actual = record.get(&self.field).unwrap_or(&Value::Null);

        match self.operator {
            Operator::Eq => compare_values(actual, &self.value) == Some(Ordering::Equal),
            Operator::Ne => matches!(
                compare_values(actual, &self.value),
                Some(Ordering::Less | Ordering::Greater)
            ),
            Operator::Lt => compare_values(actual, &self.value) == Some(Ordering::Less),
            Operator::Lte => matches!(
                compare_values(actual, &self.value),
                Some(Ordering::Less | Ordering::Equal)
            ),
            Operator::Gt => compare_values(actual, &self.value) == Some(Ordering::Greater),
            Operator::Gte => matches!(
                compare_values(actual, &self.value),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            Operator::Like => like(actual, &self.value, false),
            Operator::ILike => like(actual, &self.value, true),
            Operator::In => !actual.is_null() && self.contains(actual),
            Operator::NotIn => !actual.is_null() && !self.contains(actual),
            Operator::IsNull => actual.is_null() == is_truthy(&self.value),
        }
    }

    fn contains(&self, actual: &Value) -> bool {
        let equal = |candidate: &Value| compare_values(actual, candidate) == Some(Ordering::Equal);
        match &self.value {
            Value::Array(items) => items.iter().any(equal),
            other => equal(other),
        }
    }
}

/// Parse lookups into filters.
///
/// Lookups on fields outside `known_fields` and lookups with unknown
/// operators are dropped. An empty `known_fields` accepts every field.
pub fn parse_filters(filters: &Map<String, Value>, known_fields: &[&str]) -> Vec<Filter> {
    filters
        .iter()
        .filter_map(|(key, value)| Filter::parse(key, value.clone()))
        .filter(|f| known_fields.is_empty() || known_fields.contains(&f.field.as_str()))
        .collect()
}

/// Check whether a record satisfies every filter
pub fn matches_all(filters: &[Filter], record: &Map<String, Value>) -> bool {
    filters.iter().all(|f| f.matches(record))
}

/// Compare two JSON values. Numbers compare numerically, strings
/// lexicographically (RFC 3339 timestamps therefore sort in time order),
/// booleans false < true. Mixed or null values are incomparable.
pub fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map_or(false, |n| n != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

fn like(actual: &Value, pattern: &Value, case_insensitive: bool) -> bool {
    let (Value::String(text), Value::String(pattern)) = (actual, pattern) else {
        return false;
    };

    let mut expr = String::from("^");
    for c in pattern.chars() {
        match c {
            '%' => expr.push_str(".*"),
            '_' => expr.push('.'),
            other => expr.push_str(&regex::escape(&other.to_string())),
        }
    }
    expr.push('$');

    RegexBuilder::new(&expr)
        .case_insensitive(case_insensitive)
        .dot_matches_new_line(true)
        .build()
        .map(|re| re.is_match(text))
        .unwrap_or(false)
}

/// Extract the column name from a unique-violation message such as
/// `Key (slug)=(hello) already exists.`
pub fn integrity_field_from_message(message: &str) -> Option<String> {
    UNIQUE_VIOLATION
        .captures(message)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record() -> Map<String, Value> {
        json!({"name": "Azat Bek", "age": 31, "tags": null, "status": "draft"})
            .as_object()
            .unwrap()
            .clone()
    }

    fn lookups(value: Value) -> Map<String, Value> {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn test_parse_keys() {
        let f = Filter::parse("age__gt", json!(30)).unwrap();
        assert_eq!(f.field, "age");
        assert_eq!(f.operator, Operator::Gt);

        let f = Filter::parse("name", json!("x")).unwrap();
        assert_eq!(f.operator, Operator::Eq);

        let f = Filter::parse("created__at__gte", json!("2024")).unwrap();
        assert_eq!(f.field, "created__at");

        assert!(Filter::parse("age__between", json!([1, 2])).is_none());
    }

    #[test]
    fn test_parse_filters_drops_unknown() {
        let parsed = parse_filters(
            &lookups(json!({"age__gt": 30, "height__lt": 2, "name__regex": "x"})),
            &["age", "name"],
        );
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].field, "age");
    }

    #[test]
    fn test_comparisons() {
        let r = record();
        assert!(Filter::parse("age__gt", json!(30)).unwrap().matches(&r));
        assert!(Filter::parse("age__gte", json!(31)).unwrap().matches(&r));
        assert!(!Filter::parse("age__lt", json!(31)).unwrap().matches(&r));
        assert!(Filter::parse("age__lte", json!(31.0)).unwrap().matches(&r));
        assert!(Filter::parse("status__ne", json!("published")).unwrap().matches(&r));
        assert!(Filter::parse("status", json!("draft")).unwrap().matches(&r));
        assert!(!Filter::parse("tags__ne", json!("x")).unwrap().matches(&r));
    }

    #[test]
    fn test_like() {
        let r = record();
        assert!(Filter::parse("name__ilike", json!("%azat%")).unwrap().matches(&r));
        assert!(!Filter::parse("name__like", json!("%azat%")).unwrap().matches(&r));
        assert!(Filter::parse("name__like", json!("Azat _ek")).unwrap().matches(&r));
        assert!(!Filter::parse("name__like", json!("Azat.Bek")).unwrap().matches(&r));
    }

    #[test]
    fn test_membership_and_null() {
        let r = record();
        assert!(Filter::parse("status__in", json!(["draft", "review"])).unwrap().matches(&r));
        assert!(Filter::parse("status__in", json!("draft")).unwrap().matches(&r));
        assert!(Filter::parse("status__notin", json!(["published"])).unwrap().matches(&r));
        assert!(Filter::parse("tags__isnull", json!(true)).unwrap().matches(&r));
        assert!(Filter::parse("name__isnull", json!(false)).unwrap().matches(&r));
        assert!(Filter::parse("missing__isnull", json!(true)).unwrap().matches(&r));
    }

    #[test]
    fn test_integrity_field() {
        let msg = "duplicate key value violates unique constraint \"post_slug_key\"\nDETAIL:  Key (slug)=(hello) already exists.";
        assert_eq!(integrity_field_from_message(msg).as_deref(), Some("slug"));
        assert_eq!(integrity_field_from_message("other failure"), None);
    }
}
