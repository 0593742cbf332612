//! Typed rule sets.
//!
//! A rule document is an ordered mapping of rule keys to rule bodies. The
//! key decides the kind of rule:
//!
//! | key                          | kind                           |
//! |------------------------------|--------------------------------|
//! | `$skip` (any case)           | [`SkipRule`]                   |
//! | contains `$convert`          | [`FieldActionRule`]            |
//! | contains `$format_date`      | [`DateRule`]                   |
//! | contains `$object`           | [`ObjectRule`]                 |
//! | contains `$select`           | [`SelectRule`]                 |
//! | anything else                | inert, ignored                 |
//!
//! Classification and body parsing happen once, when the [`RuleSet`] is
//! built, so every authoring mistake in the document is reported before a
//! single record is converted.

pub mod loader;

use indexmap::IndexMap;
use serde_json::{Map, Value};

use crate::actions::FieldActionRule;
use crate::conditions::Condition;
use crate::dates::DateRule;
use crate::error::{kind_of, LoadError, RuleError};
use crate::extraction::FieldPath;
use crate::materializer::ObjectRule;
use crate::record::Record;

pub use loader::RuleSource;

const SKIP_KEY: &str = "$skip";
const CONVERT_MARKER: &str = "$convert";
const FORMAT_DATE_MARKER: &str = "$format_date";
const OBJECT_MARKER: &str = "$object";
const SELECT_MARKER: &str = "$select";

/// A classified rule.
#[derive(Debug, Clone)]
pub enum Rule {
    Skip(SkipRule),
    FieldAction(FieldActionRule),
    Date(DateRule),
    Object(ObjectRule),
    Select(SelectRule),
    /// Key matched no known kind
    Inert,
}

impl Rule {
    /// Classify `key` and parse its body.
    pub fn classify(key: &str, body: &Value) -> Result<Self, RuleError> {
        let rule = if key.eq_ignore_ascii_case(SKIP_KEY) {
            Rule::Skip(SkipRule::from_value(key, body)?)
        } else if key.contains(CONVERT_MARKER) {
            Rule::FieldAction(FieldActionRule::from_value(key, body)?)
        } else if key.contains(FORMAT_DATE_MARKER) {
            Rule::Date(DateRule::from_value(key, body)?)
        } else if key.contains(OBJECT_MARKER) {
            Rule::Object(ObjectRule::from_value(key, body)?)
        } else if key.contains(SELECT_MARKER) {
            Rule::Select(SelectRule::from_value(key, body)?)
        } else {
            if key.starts_with('$') {
                tracing::warn!("Rule key '{}' matches no known rule kind and will be ignored", key);
            }
            Rule::Inert
        };

        Ok(rule)
    }

    /// Short name of the rule kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Rule::Skip(_) => "skip",
            Rule::FieldAction(_) => "field_action",
            Rule::Date(_) => "date",
            Rule::Object(_) => "object",
            Rule::Select(_) => "select",
            Rule::Inert => "inert",
        }
    }
}

/// Drop the whole record when `condition` holds for `fieldname`.
#[derive(Debug, Clone)]
pub struct SkipRule {
    pub fieldname: FieldPath,
    pub condition: Condition,
}

impl SkipRule {
    pub fn from_value(key: &str, value: &Value) -> Result<Self, RuleError> {
        let body = body_map(key, value)?;
        Ok(Self {
            fieldname: required_path(key, body, "fieldname")?,
            condition: Condition::from_value(body.get("condition"))?,
        })
    }

    /// Whether the record should be dropped.
    pub fn applies_to(&self, record: &Record) -> bool {
        self.condition.evaluate(self.fieldname.resolve(record))
    }
}

/// Continue the pass on the value found at `fieldname`.
#[derive(Debug, Clone)]
pub struct SelectRule {
    pub fieldname: FieldPath,
}

impl SelectRule {
    pub fn from_value(key: &str, value: &Value) -> Result<Self, RuleError> {
        let body = body_map(key, value)?;
        Ok(Self {
            fieldname: required_path(key, body, "fieldname")?,
        })
    }
}

/// An ordered, immutable set of classified rules.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: IndexMap<String, Rule>,
}

impl RuleSet {
    /// Build a rule set from a parsed document.
    ///
    /// `null` gives an empty rule set; any other non-mapping is an error.
    pub fn from_value(value: &Value) -> Result<Self, RuleError> {
        match value {
            Value::Null => Ok(Self::default()),
            Value::Object(map) => Self::from_map(map),
            other => Err(RuleError::NotAMapping {
                context: "rule set".to_string(),
                found: kind_of(other).to_string(),
            }),
        }
    }

    fn from_map(map: &Map<String, Value>) -> Result<Self, RuleError> {
        let mut rules = IndexMap::with_capacity(map.len());
        for (key, body) in map {
            rules.insert(key.clone(), Rule::classify(key, body)?);
        }
        Ok(Self { rules })
    }

    /// Parse a YAML (or JSON) rule document.
    pub fn from_yaml_str(source: &str) -> Result<Self, LoadError> {
        if source.trim().is_empty() {
            return Ok(Self::default());
        }
        let document: Value =
            serde_yaml::from_str(source).map_err(|source| LoadError::Parse { source })?;
        Ok(Self::from_value(&document)?)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Rules in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Rule)> {
        self.rules.iter().map(|(key, rule)| (key.as_str(), rule))
    }

    pub fn get(&self, key: &str) -> Option<&Rule> {
        self.rules.get(key)
    }
}

/// The body of rule `key` as a mapping.
pub(crate) fn body_map<'a>(
    key: &str,
    value: &'a Value,
) -> Result<&'a Map<String, Value>, RuleError> {
    value.as_object().ok_or_else(|| RuleError::InvalidRule {
        key: key.to_string(),
        reason: format!("expected a mapping, found {}", kind_of(value)),
    })
}

/// A required dotted-path field of a rule body.
pub(crate) fn required_path(
    key: &str,
    body: &Map<String, Value>,
    field: &str,
) -> Result<FieldPath, RuleError> {
    optional_path(key, body, field)?.ok_or_else(|| RuleError::MissingField {
        key: key.to_string(),
        field: field.to_string(),
    })
}

/// An optional dotted-path field of a rule body; `null` counts as absent.
pub(crate) fn optional_path(
    key: &str,
    body: &Map<String, Value>,
    field: &str,
) -> Result<Option<FieldPath>, RuleError> {
    match body.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(path)) => Ok(Some(FieldPath::from_dotted(path))),
        Some(other) => Err(RuleError::InvalidRule {
            key: key.to_string(),
            reason: format!("'{}' must be a string, found {}", field, kind_of(other)),
        }),
    }
}
