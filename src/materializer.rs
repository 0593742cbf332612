//! Structured object materialization.
//!
//! An object rule builds an instance of a registered type from the working
//! record, calls mutators on it and flattens it back into a mapping:
//!
//! ```yaml
//! $object_product:
//!   type_name: product
//!   fieldname: product          # optional, replaces the record when absent
//!   params:                     # rules producing the constructor arguments
//!     $convert_price:
//!       fieldname: price
//!       actions: [{divide_by: 100}]
//!   methods:
//!     - add_tag:                # rules producing the call arguments
//!         $select_tags:
//!           fieldname: tags     # a sequence: one call per item
//! ```
//!
//! Every nested rule set runs as its own pass over a copy of the current
//! working record.

use serde_json::Value;

use crate::catalogue::TypeCatalogue;
use crate::engine::{run_pass, PassOutcome};
use crate::error::{kind_of, ConvertError, RuleError};
use crate::extraction::FieldPath;
use crate::record::Record;
use crate::rules::{body_map, optional_path, RuleSet};

/// One post-construction call: `name` invoked with each argument mapping
/// its rules produce.
#[derive(Debug, Clone)]
pub struct MethodCall {
    pub name: String,
    pub arguments: RuleSet,
}

/// Parsed body of an `$object` rule.
#[derive(Debug, Clone)]
pub struct ObjectRule {
    pub type_name: String,
    pub params: RuleSet,
    pub methods: Vec<MethodCall>,
    /// Where the flattened instance is written; `None` replaces the record
    pub fieldname: Option<FieldPath>,
}

impl ObjectRule {
    pub fn from_value(key: &str, value: &Value) -> Result<Self, RuleError> {
        let body = body_map(key, value)?;

        let type_name = match body.get("type_name") {
            Some(Value::String(name)) => name.clone(),
            Some(other) => {
                return Err(RuleError::InvalidRule {
                    key: key.to_string(),
                    reason: format!("'type_name' must be a string, found {}", kind_of(other)),
                })
            }
            None => {
                return Err(RuleError::MissingField {
                    key: key.to_string(),
                    field: "type_name".to_string(),
                })
            }
        };

        let params = body
            .get("params")
            .or_else(|| body.get("constructor_params"))
            .map(RuleSet::from_value)
            .transpose()?
            .unwrap_or_default();

        let methods = match body.get("methods") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(entries)) => entries
                .iter()
                .map(|entry| MethodCall::from_entry(key, entry))
                .collect::<Result<Vec<_>, _>>()?,
            Some(other) => {
                return Err(RuleError::InvalidRule {
                    key: key.to_string(),
                    reason: format!("'methods' must be a sequence, found {}", kind_of(other)),
                })
            }
        };

        Ok(Self {
            type_name,
            params,
            methods,
            fieldname: optional_path(key, body, "fieldname")?,
        })
    }

    /// Build, mutate and flatten an instance from `record`.
    ///
    /// # Errors
    /// * [`ConvertError::UnknownType`] - `type_name` is not in the catalogue
    /// * [`ConvertError::Construction`] - the constructor arguments do not fit the type
    /// * [`ConvertError::UnknownMethod`] / [`ConvertError::Invocation`] - a call failed
    ///
    /// Nothing is partially materialized: any error aborts the whole rule.
    pub fn materialize(
        &self,
        record: &Record,
        catalogue: &TypeCatalogue,
    ) -> Result<Record, ConvertError> {
        let descriptor = catalogue
            .get(&self.type_name)
            .ok_or_else(|| ConvertError::UnknownType(self.type_name.clone()))?;

        let arguments = match run_pass(&self.params, record.clone(), catalogue)? {
            PassOutcome::Record(arguments) => arguments,
            PassOutcome::Value(Value::Object(arguments)) => arguments,
            PassOutcome::Value(Value::Null) => Record::new(),
            PassOutcome::Value(other) => {
                return Err(ConvertError::InvalidArguments {
                    type_name: self.type_name.clone(),
                    reason: format!("constructor rules produced {}", kind_of(&other)),
                })
            }
            PassOutcome::Dropped => {
                return Err(ConvertError::InvalidArguments {
                    type_name: self.type_name.clone(),
                    reason: "constructor rules dropped the record".to_string(),
                })
            }
        };

        let mut instance = descriptor.construct(arguments)?;
        tracing::debug!("Constructed '{}'", self.type_name);

        for method in &self.methods {
            let invocations = self.invocations(method, record, catalogue)?;
            tracing::debug!(
                "Calling '{}.{}' {} time(s)",
                self.type_name,
                method.name,
                invocations.len()
            );
            for arguments in invocations {
                instance.invoke(&method.name, arguments)?;
            }
        }

        instance.flatten()
    }

    /// Argument mappings for each call of `method`, in order.
    fn invocations(
        &self,
        method: &MethodCall,
        record: &Record,
        catalogue: &TypeCatalogue,
    ) -> Result<Vec<Record>, ConvertError> {
        match run_pass(&method.arguments, record.clone(), catalogue)? {
            PassOutcome::Record(arguments) => Ok(vec![arguments]),
            PassOutcome::Dropped | PassOutcome::Value(Value::Null) => Ok(Vec::new()),
            PassOutcome::Value(Value::Object(arguments)) => Ok(vec![arguments]),
            PassOutcome::Value(Value::Array(items)) => items
                .into_iter()
                .map(|item| match item {
                    Value::Object(arguments) => Ok(arguments),
                    other => Err(self.bad_arguments(method, &other)),
                })
                .collect(),
            PassOutcome::Value(other) => Err(self.bad_arguments(method, &other)),
        }
    }

    fn bad_arguments(&self, method: &MethodCall, found: &Value) -> ConvertError {
        ConvertError::InvalidArguments {
            type_name: self.type_name.clone(),
            reason: format!(
                "arguments for '{}' must be mappings, found {}",
                method.name,
                kind_of(found)
            ),
        }
    }
}

impl MethodCall {
    fn from_entry(key: &str, entry: &Value) -> Result<Self, RuleError> {
        let invalid = |reason: String| RuleError::InvalidRule {
            key: key.to_string(),
            reason,
        };

        match entry {
            Value::String(name) => Ok(Self {
                name: name.clone(),
                arguments: RuleSet::default(),
            }),
            Value::Object(map) if map.len() == 1 => {
                let (name, arguments) = map
                    .iter()
                    .next()
                    .ok_or_else(|| invalid("empty method entry".to_string()))?;
                Ok(Self {
                    name: name.clone(),
                    arguments: RuleSet::from_value(arguments)?,
                })
            }
            other => Err(invalid(format!(
                "each method must be a single-entry mapping, found {}",
                kind_of(other)
            ))),
        }
    }
}
