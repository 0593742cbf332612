//! Rule engine: runs a rule set over one record at a time.
//!
//! A pass walks the rules in declaration order, mutating a working copy of
//! the record. A skip rule whose condition holds ends the pass with
//! [`Outcome::Dropped`]; otherwise the pass ends with the working record.

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::catalogue::TypeCatalogue;
use crate::error::{kind_of, ConvertError, LoadError};
use crate::record::{keys_in_lower_case, without_null_values, Record};
use crate::rules::loader::read_document;
use crate::rules::{Rule, RuleSet};

/// Engine settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Lower-case every key of the input before any rule runs
    pub keys_in_lower_case: bool,
    /// Remove top-level `null` entries from converted records
    pub drop_null_values: bool,
    /// Value returned by [`RuleEngine::convert`] for dropped records
    pub dropped_record: Record,
}

impl EngineConfig {
    /// Load engine settings from a YAML file.
    ///
    /// Missing keys take their defaults.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, LoadError> {
        let contents = read_document(path.as_ref())?;
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }

        serde_yaml::from_str(&contents).map_err(|source| LoadError::Parse { source })
    }
}

/// Result of converting one record.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Converted(Record),
    /// A skip rule fired
    Dropped,
}

/// How a pass over a (possibly nested) rule set ended.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum PassOutcome {
    /// All rules ran; the working record
    Record(Record),
    /// A select rule ended the pass on a non-mapping value
    Value(Value),
    Dropped,
}

/// Converts records according to a rule set.
///
/// The rule set and type catalogue are read-only, so one engine can convert
/// any number of records, from any number of threads.
///
/// # Example
///
/// ```
/// use recast::{RuleEngine, RuleSet};
/// use serde_json::json;
///
/// let rules = RuleSet::from_value(&json!({
///     "$convert_price": {"fieldname": "price", "actions": [{"divide_by": 100}]}
/// }))?;
/// let engine = RuleEngine::new(rules);
///
/// let record = json!({"price": 1250}).as_object().cloned().unwrap_or_default();
/// let converted = engine.convert(record)?;
/// assert_eq!(converted["price"], json!(12.5));
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug, Clone)]
pub struct RuleEngine {
    rules: Arc<RuleSet>,
    catalogue: Arc<TypeCatalogue>,
    config: EngineConfig,
}

impl RuleEngine {
    /// Create an engine with an empty catalogue and default settings.
    pub fn new(rules: RuleSet) -> Self {
        Self {
            rules: Arc::new(rules),
            catalogue: Arc::new(TypeCatalogue::new()),
            config: EngineConfig::default(),
        }
    }

    pub fn with_catalogue(mut self, catalogue: Arc<TypeCatalogue>) -> Self {
        self.catalogue = catalogue;
        self
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Convert one record.
    ///
    /// A dropped record comes back as the configured `dropped_record`
    /// (an empty mapping by default). Use [`RuleEngine::process`] to tell
    /// the two apart.
    pub fn convert(&self, record: Record) -> Result<Record, ConvertError> {
        match self.process(record)? {
            Outcome::Converted(record) => Ok(record),
            Outcome::Dropped => Ok(self.config.dropped_record.clone()),
        }
    }

    /// Convert one record, reporting whether it was dropped.
    ///
    /// # Errors
    /// Only authoring errors that depend on the catalogue (unknown type,
    /// failing constructor or method) or a top-level select that ends on a
    /// non-mapping value. Data problems never fail a conversion.
    pub fn process(&self, record: Record) -> Result<Outcome, ConvertError> {
        let record = if self.config.keys_in_lower_case {
            keys_in_lower_case(record)
        } else {
            record
        };

        let converted = match run_pass(&self.rules, record, &self.catalogue)? {
            PassOutcome::Dropped => return Ok(Outcome::Dropped),
            PassOutcome::Record(record) => record,
            PassOutcome::Value(Value::Object(record)) => record,
            PassOutcome::Value(Value::Null) => Record::new(),
            PassOutcome::Value(other) => {
                return Err(ConvertError::UnexpectedOutput {
                    found: kind_of(&other).to_string(),
                })
            }
        };

        if self.config.drop_null_values {
            Ok(Outcome::Converted(without_null_values(converted)))
        } else {
            Ok(Outcome::Converted(converted))
        }
    }
}

/// Run `rules` in order over `record`.
///
/// Nested rule sets (object constructor and method arguments) go through
/// here too, without the top-level pre- and post-passes.
pub(crate) fn run_pass(
    rules: &RuleSet,
    mut record: Record,
    catalogue: &TypeCatalogue,
) -> Result<PassOutcome, ConvertError> {
    for (key, rule) in rules.iter() {
        tracing::debug!("Applying {} rule '{}'", rule.kind(), key);

        match rule {
            Rule::Skip(skip) => {
                if skip.applies_to(&record) {
                    tracing::debug!(
                        "Skip rule '{}' matched on '{}', dropping record",
                        key,
                        skip.fieldname
                    );
                    return Ok(PassOutcome::Dropped);
                }
            }
            Rule::FieldAction(action) => record = action.apply(record),
            Rule::Date(date) => record = date.normalize(record),
            Rule::Object(object) => {
                let materialized = object.materialize(&record, catalogue)?;
                match &object.fieldname {
                    Some(path) => {
                        if !path.set(&mut record, Value::Object(materialized)) {
                            tracing::debug!(
                                "No parent for '{}', object from '{}' dropped",
                                path,
                                key
                            );
                        }
                    }
                    None => record = materialized,
                }
            }
            Rule::Select(select) => {
                let selected = select.fieldname.resolve(&record).cloned().unwrap_or(Value::Null);
                match selected {
                    Value::Object(map) => record = map,
                    value => {
                        tracing::debug!(
                            "Select rule '{}' ended the pass on {}",
                            key,
                            kind_of(&value)
                        );
                        return Ok(PassOutcome::Value(value));
                    }
                }
            }
            Rule::Inert => {}
        }
    }

    Ok(PassOutcome::Record(record))
}
