//! Error types for rule loading, type registration and record conversion.
//!
//! Only authoring problems are errors. Data that does not fit a rule degrades
//! to `null`/empty values inside the conversion and never shows up here.

use std::path::PathBuf;
use thiserror::Error;

/// Authoring error found while classifying a rule document.
#[derive(Debug, Error)]
pub enum RuleError {
    /// A rule set (or nested rule set) is not a mapping
    #[error("Rules must be a mapping, found {found} in {context}")]
    NotAMapping { context: String, found: String },

    /// A rule body has the wrong shape
    #[error("Invalid rule '{key}': {reason}")]
    InvalidRule { key: String, reason: String },

    /// A rule body lacks a required field
    #[error("Rule '{key}' is missing required field '{field}'")]
    MissingField { key: String, field: String },

    #[error("Unsupported condition operator: '{0}'")]
    UnsupportedCondition(String),

    #[error("Unsupported field action: '{0}'")]
    UnsupportedAction(String),

    /// An action argument mapping lacks a required key
    #[error("Action '{action}' requires argument '{argument}'")]
    MissingActionArgument { action: String, argument: String },

    #[error("Invalid argument for action '{action}': {reason}")]
    InvalidActionArgument { action: String, reason: String },

    /// The declared date format is not in the catalogue
    #[error("Date format '{0}' is not implemented")]
    FormatNotImplemented(String),

    #[error("Unknown operator '{0}', expected 'divide_<N>'")]
    UnknownScaleOperator(String),

    #[error("Invalid pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },
}

/// Failure to obtain a rule set or config document from its source.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("File not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("Failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse YAML: {source}")]
    Parse {
        #[source]
        source: serde_yaml::Error,
    },

    #[error(transparent)]
    Rules(#[from] RuleError),
}

/// Failure to register a type in the catalogue.
#[derive(Debug, Error)]
pub enum CatalogueError {
    #[error("'{type_name}' does not name a structured type")]
    InvalidTypeName { type_name: String },

    /// The type does not flatten to a mapping of named fields
    #[error("Type '{type_name}' is not a structured type")]
    NotStructured { type_name: String },
}

/// Authoring error that only shows up while a record is being converted.
#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("Unknown type '{0}' referenced in rules")]
    UnknownType(String),

    #[error("Type '{type_name}' has no method '{method}'")]
    UnknownMethod { type_name: String, method: String },

    #[error("Failed to construct '{type_name}': {reason}")]
    Construction { type_name: String, reason: String },

    #[error("Method '{method}' on '{type_name}' failed: {reason}")]
    Invocation {
        type_name: String,
        method: String,
        reason: String,
    },

    /// The instance did not serialize back into a mapping
    #[error("Type '{type_name}' is not a structured type")]
    NotStructured { type_name: String },

    #[error("Invalid arguments for '{type_name}': {reason}")]
    InvalidArguments { type_name: String, reason: String },

    /// The conversion pass ended on something other than a record
    #[error("Conversion produced {found}, expected a record")]
    UnexpectedOutput { found: String },
}

/// Short name of a JSON value's kind, used in error messages.
pub(crate) fn kind_of(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "a sequence",
        serde_json::Value::Object(_) => "a mapping",
    }
}
