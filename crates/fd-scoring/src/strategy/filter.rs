//! Declarative filter language.
//!
//! A filter spec is a JSON object. Each key names a [`Field`] with an
//! optional suffix:
//!
//! ```text
//! <field>_max   value <= operand       numbers, ratings
//! <field>_min   value >= operand       numbers, ratings
//! <field>       value == operand       booleans, ratings, text, numbers
//! ```
//!
//! Ratings compare by tier, so `"rating_min": "B"` admits A and B. A field
//! that is null for a security fails its predicate.

use std::collections::BTreeMap;

use derive_more::Display;
use serde_json::{Map, Value};

use crate::{
    Result, ScoringError,
    composite::Rating,
    strategy::field::{Field, FieldContext, FieldKind, FieldValue},
};

/// How a predicate compares.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    /// `value <= operand`
    #[display("<=")]
    Max,
    /// `value >= operand`
    #[display(">=")]
    Min,
    /// `value == operand`
    #[display("==")]
    Equal,
}

/// One parsed filter entry.
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    /// Key as written in the spec
    pub key: String,
    /// Field compared
    pub field: Field,
    /// Comparison applied
    pub comparison: Comparison,
    /// Right-hand side
    pub operand: FieldValue,
}

impl Predicate {
    /// Whether a resolved value satisfies the predicate.
    pub fn accepts(&self, value: &FieldValue) -> bool {
        match (value, &self.operand) {
            (FieldValue::Number(v), FieldValue::Number(op)) => match self.comparison {
                Comparison::Max => v <= op,
                Comparison::Min => v >= op,
                Comparison::Equal => v == op,
            },
            (FieldValue::Rating(v), FieldValue::Rating(op)) => match self.comparison {
                Comparison::Max => v.tier() <= op.tier(),
                Comparison::Min => v.tier() >= op.tier(),
                Comparison::Equal => v == op,
            },
            (FieldValue::Bool(v), FieldValue::Bool(op)) => v == op,
            (FieldValue::Text(v), FieldValue::Text(op)) => v == op,
            _ => false,
        }
    }

    /// Resolve the field and test it; a null field fails.
    pub fn evaluate(&self, ctx: &FieldContext<'_>) -> bool {
        self.field
            .resolve(ctx)
            .is_some_and(|value| self.accepts(&value))
    }
}

/// A parsed filter spec: the conjunction of its predicates.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterSpec {
    predicates: Vec<Predicate>,
}

impl FilterSpec {
    /// Parse a JSON filter spec. `null` and `{}` mean no filters.
    ///
    /// Unknown keys and operands of the wrong type are configuration errors
    /// reported against `scope`.
    pub fn parse(scope: &str, spec: &Value) -> Result<Self> {
        let entries = match spec {
            Value::Null => return Ok(Self::default()),
            Value::Object(entries) => entries,
            other => {
                return Err(ScoringError::config(
                    scope,
                    format!("filters must be a JSON object, got {other}"),
                ));
            }
        };
        Self::from_entries(scope, entries)
    }

    fn from_entries(scope: &str, entries: &Map<String, Value>) -> Result<Self> {
        let mut predicates = Vec::with_capacity(entries.len());
        for (key, operand) in entries {
            let (field, comparison) = parse_key(key)
                .ok_or_else(|| ScoringError::config(scope, format!("unknown filter field `{key}`")))?;
            let operand = parse_operand(field, comparison, operand).ok_or_else(|| {
                ScoringError::config(
                    scope,
                    format!(
                        "filter `{key}` expects a {} operand for `{comparison}`, got {operand}",
                        field.kind()
                    ),
                )
            })?;
            predicates.push(Predicate {
                key: key.clone(),
                field,
                comparison,
                operand,
            });
        }
        Ok(Self { predicates })
    }

    /// Parsed predicates, in key order.
    pub fn predicates(&self) -> &[Predicate] {
        &self.predicates
    }

    /// Whether the spec has no predicates.
    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }

    /// Whether a security passes every predicate.
    pub fn matches(&self, ctx: &FieldContext<'_>) -> bool {
        self.predicates.iter().all(|p| p.evaluate(ctx))
    }

    /// The values of every filtered field for a security, keyed by field
    /// key, for the selection record.
    pub fn inputs(&self, ctx: &FieldContext<'_>) -> BTreeMap<String, Value> {
        self.predicates
            .iter()
            .map(|p| {
                let value = p.field.resolve(ctx).map_or(Value::Null, to_json);
                (p.key.clone(), value)
            })
            .collect()
    }
}

fn parse_key(key: &str) -> Option<(Field, Comparison)> {
    if let Some(field) = key.strip_suffix("_max").and_then(Field::from_name) {
        return Some((field, Comparison::Max));
    }
    if let Some(field) = key.strip_suffix("_min").and_then(Field::from_name) {
        return Some((field, Comparison::Min));
    }
    Field::from_name(key).map(|field| (field, Comparison::Equal))
}

fn parse_operand(field: Field, comparison: Comparison, operand: &Value) -> Option<FieldValue> {
    match (field.kind(), comparison, operand) {
        (FieldKind::Number, _, Value::Number(n)) => n.as_f64().map(FieldValue::Number),
        (FieldKind::Rating, _, Value::String(s)) => Rating::from_name(s).map(FieldValue::Rating),
        (FieldKind::Bool, Comparison::Equal, Value::Bool(b)) => Some(FieldValue::Bool(*b)),
        (FieldKind::Text, Comparison::Equal, Value::String(s)) => Some(FieldValue::Text(s.clone())),
        _ => None,
    }
}

fn to_json(value: FieldValue) -> Value {
    match value {
        FieldValue::Number(n) => Value::from(n),
        FieldValue::Bool(b) => Value::Bool(b),
        FieldValue::Rating(r) => Value::String(r.as_str().to_string()),
        FieldValue::Text(t) => Value::String(t),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        composite::CompositeScore,
        dimensions::fixtures,
        registry::{DimensionScores, ScoredSecurity},
    };
    use serde_json::json;

    fn composite(total: Option<f64>, rating: Option<Rating>) -> CompositeScore {
        CompositeScore {
            weights: Default::default(),
            total_score: total,
            rating,
            neutral_inputs: DimensionScores::default(),
            neutral_total_score: None,
            neutral_rating: None,
            total_rank: None,
        }
    }

    fn security(pb: Option<f64>) -> ScoredSecurity {
        let mut snapshot = fixtures::blank("sh.600000", "bank");
        snapshot.pb_mrq = pb;
        snapshot.market_cap = Some(2e10);
        snapshot.technical.ma_long = Some(12.0);
        ScoredSecurity {
            snapshot,
            scores: DimensionScores::default(),
        }
    }

    #[test]
    fn test_value_strategy_filters() {
        let spec = FilterSpec::parse(
            "value",
            &json!({"pb_mrq_max": 1.0, "market_cap_min": 1e10, "below_ma250": true}),
        )
        .unwrap();
        assert_eq!(spec.predicates().len(), 3);

        let comp = composite(Some(40.0), Some(Rating::D));
        let cheap = security(Some(0.9));
        let dear = security(Some(1.3));
        assert!(spec.matches(&FieldContext { security: &cheap, composite: &comp }));
        assert!(!spec.matches(&FieldContext { security: &dear, composite: &comp }));
    }

    #[test]
    fn test_null_field_fails_predicate() {
        let spec = FilterSpec::parse("s", &json!({"pb_mrq_max": 1.0})).unwrap();
        let comp = composite(None, None);
        let unknown = security(None);
        assert!(!spec.matches(&FieldContext { security: &unknown, composite: &comp }));
    }

    #[test]
    fn test_non_positive_multiples_fail_caps() {
        let spec = FilterSpec::parse("s", &json!({"pe_max": 10.0, "pb_mrq_max": 1.0})).unwrap();
        let comp = composite(None, None);

        let mut loss = security(Some(0.8));
        loss.snapshot.pe_ttm = Some(-5.0);
        assert!(!spec.matches(&FieldContext { security: &loss, composite: &comp }));

        let mut negative_book = security(Some(-0.4));
        negative_book.snapshot.pe_ttm = Some(8.0);
        assert!(!spec.matches(&FieldContext { security: &negative_book, composite: &comp }));

        let mut cheap = security(Some(0.8));
        cheap.snapshot.pe_ttm = Some(8.0);
        assert!(spec.matches(&FieldContext { security: &cheap, composite: &comp }));
    }

    #[test]
    fn test_rating_compares_by_tier() {
        let spec = FilterSpec::parse("s", &json!({"rating_min": "B"})).unwrap();
        let sec = security(Some(1.0));
        for (rating, expected) in [(Rating::A, true), (Rating::B, true), (Rating::C, false)] {
            let comp = composite(Some(80.0), Some(rating));
            assert_eq!(
                spec.matches(&FieldContext { security: &sec, composite: &comp }),
                expected
            );
        }
    }

    #[test]
    fn test_unknown_key_is_configuration_error() {
        let err = FilterSpec::parse("s", &json!({"momentum_max": 3})).unwrap_err();
        assert!(matches!(err, ScoringError::Configuration { .. }));
    }

    #[test]
    fn test_type_mismatch_is_configuration_error() {
        for spec in [
            json!({"pb_mrq_max": "cheap"}),
            json!({"is_st_max": true}),
            json!({"rating_min": "E"}),
            json!({"below_ma250": 1}),
            json!({"industry_min": "bank"}),
        ] {
            assert!(FilterSpec::parse("s", &spec).is_err(), "{spec}");
        }
    }

    #[test]
    fn test_empty_specs() {
        assert!(FilterSpec::parse("s", &Value::Null).unwrap().is_empty());
        assert!(FilterSpec::parse("s", &json!({})).unwrap().is_empty());
        assert!(FilterSpec::parse("s", &json!([1, 2])).is_err());
    }

    #[test]
    fn test_inputs_record_filtered_values() {
        let spec = FilterSpec::parse("s", &json!({"pb_mrq_max": 1.0, "rating_min": "C"})).unwrap();
        let sec = security(Some(0.8));
        let comp = composite(Some(60.0), Some(Rating::C));
        let inputs = spec.inputs(&FieldContext { security: &sec, composite: &comp });
        assert_eq!(inputs["pb_mrq_max"], json!(0.8));
        assert_eq!(inputs["rating_min"], json!("C"));
    }
}
