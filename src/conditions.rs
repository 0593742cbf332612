//! Declarative boolean conditions over a single field value.
//!
//! A condition is written as a mapping of `operator: operand`, for example
//! `{equals: "x"}` or `{field_does_exist: null}`. The caller resolves the field
//! first and hands the value (or "not found") to [`Condition::evaluate`];
//! conditions never see the rest of the record.

use std::cmp::Ordering;
use regex::Regex;
use serde_json::Value;

use crate::error::RuleError;
use crate::record::number_from;

/// One `operator: operand` test.
#[derive(Debug, Clone)]
pub enum Predicate {
    Equals(Value),
    DoesNotEqual(Value),
    /// True when the field is present and not `null`
    FieldDoesExist,
    FieldDoesNotExist,
    IsGreaterThan(Value),
    IsGreaterOrEqual(Value),
    IsLessThan(Value),
    IsLessOrEqual(Value),
    /// Substring, sequence membership or mapping key presence
    Contains(Value),
    DoesNotContain(Value),
    IsOneOf(Vec<Value>),
    IsNotOneOf(Vec<Value>),
    Matches(Regex),
}

/// A parsed condition: the conjunction of its predicates.
///
/// An empty condition always holds.
#[derive(Debug, Clone, Default)]
pub struct Condition {
    predicates: Vec<Predicate>,
}

impl Condition {
    /// A condition that always evaluates to true.
    pub fn always() -> Self {
        Self::default()
    }

    /// Parse a condition mapping.
    ///
    /// `None`, `null` and `{}` give a condition that always holds. Unknown
    /// operators fail with [`RuleError::UnsupportedCondition`].
    pub fn from_value(value: Option<&Value>) -> Result<Self, RuleError> {
        let map = match value {
            None | Some(Value::Null) => return Ok(Self::always()),
            Some(Value::Object(map)) => map,
            Some(other) => {
                return Err(RuleError::InvalidRule {
                    key: "condition".to_string(),
                    reason: format!("expected a mapping, found {}", crate::error::kind_of(other)),
                })
            }
        };

        let predicates = map
            .iter()
            .map(|(operator, operand)| Predicate::parse(operator, operand))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { predicates })
    }

    /// Whether this condition has no predicates.
    pub fn is_always(&self) -> bool {
        self.predicates.is_empty()
    }

    /// Evaluate against a resolved field value (`None` = field not found).
    pub fn evaluate(&self, value: Option<&Value>) -> bool {
        self.predicates.iter().all(|p| p.evaluate(value))
    }
}

impl Predicate {
    fn parse(operator: &str, operand: &Value) -> Result<Self, RuleError> {
        let predicate = match operator {
            "equals" => Predicate::Equals(operand.clone()),
            "does_not_equal" => Predicate::DoesNotEqual(operand.clone()),
            "field_does_exist" => Predicate::FieldDoesExist,
            "field_does_not_exist" => Predicate::FieldDoesNotExist,
            "is_greater_than" => Predicate::IsGreaterThan(operand.clone()),
            "is_greater_or_equal" => Predicate::IsGreaterOrEqual(operand.clone()),
            "is_less_than" => Predicate::IsLessThan(operand.clone()),
            "is_less_or_equal" => Predicate::IsLessOrEqual(operand.clone()),
            "contains" => Predicate::Contains(operand.clone()),
            "does_not_contain" => Predicate::DoesNotContain(operand.clone()),
            "is_one_of" => Predicate::IsOneOf(sequence_operand(operator, operand)?),
            "is_not_one_of" => Predicate::IsNotOneOf(sequence_operand(operator, operand)?),
            "matches" => {
                let pattern = operand.as_str().ok_or_else(|| RuleError::InvalidRule {
                    key: operator.to_string(),
                    reason: "pattern must be a string".to_string(),
                })?;
                let regex = Regex::new(pattern).map_err(|e| RuleError::InvalidPattern {
                    pattern: pattern.to_string(),
                    reason: e.to_string(),
                })?;
                Predicate::Matches(regex)
            }
            other => return Err(RuleError::UnsupportedCondition(other.to_string())),
        };

        Ok(predicate)
    }

    fn evaluate(&self, value: Option<&Value>) -> bool {
        let current = value.unwrap_or(&Value::Null);

        match self {
            Predicate::Equals(operand) => values_equal(current, operand),
            Predicate::DoesNotEqual(operand) => !values_equal(current, operand),
            Predicate::FieldDoesExist => !current.is_null(),
            Predicate::FieldDoesNotExist => current.is_null(),
            Predicate::IsGreaterThan(operand) => {
                compare(current, operand) == Some(Ordering::Greater)
            }
            Predicate::IsGreaterOrEqual(operand) => matches!(
                compare(current, operand),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            Predicate::IsLessThan(operand) => compare(current, operand) == Some(Ordering::Less),
            Predicate::IsLessOrEqual(operand) => matches!(
                compare(current, operand),
                Some(Ordering::Less | Ordering::Equal)
            ),
            Predicate::Contains(operand) => contains(current, operand),
            Predicate::DoesNotContain(operand) => !contains(current, operand),
            Predicate::IsOneOf(options) => options.iter().any(|o| values_equal(current, o)),
            Predicate::IsNotOneOf(options) => !options.iter().any(|o| values_equal(current, o)),
            Predicate::Matches(regex) => current.as_str().is_some_and(|s| regex.is_match(s)),
        }
    }
}

fn sequence_operand(operator: &str, operand: &Value) -> Result<Vec<Value>, RuleError> {
    operand
        .as_array()
        .cloned()
        .ok_or_else(|| RuleError::InvalidRule {
            key: operator.to_string(),
            reason: "operand must be a sequence".to_string(),
        })
}

/// Equality where numbers compare by value (`1 == 1.0`).
fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

/// Numeric ordering when both sides read as numbers, lexicographic when both
/// are strings, otherwise unordered.
fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    if let (Some(x), Some(y)) = (number_from(a), number_from(b)) {
        return x.partial_cmp(&y);
    }

    match (a, b) {
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

fn contains(haystack: &Value, needle: &Value) -> bool {
    match (haystack, needle) {
        (Value::String(s), Value::String(sub)) => s.contains(sub.as_str()),
        (Value::Array(items), _) => items.iter().any(|item| values_equal(item, needle)),
        (Value::Object(map), Value::String(key)) => map.contains_key(key),
        _ => false,
    }
}
