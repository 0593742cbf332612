//! # Recast: Declarative Record Transformation
//!
//! Recast converts loosely structured records (nested JSON-like mappings)
//! with an ordered, declarative rule document.
//!
//! ## Features
//!
//! - **Ordered rules**: rules run in declaration order, each seeing the
//!   changes made by the ones before it
//! - **Skip rules**: drop a record when a condition on one field holds
//! - **Field actions**: composable value transformations (numbers, strings,
//!   URLs, HTML fragments, GeoJSON points, merging of mappings)
//! - **Date normalization**: rewrite dates from a fixed catalogue of source
//!   formats to `YYYY-MM-DD`
//! - **Object materialization**: build registered Rust types from the
//!   record and drive their mutators from further rules
//!
//! Bad data never fails a conversion: values that do not fit a rule become
//! `null` or empty. Only mistakes in the rule document are errors, and most
//! of those are reported when the rules are loaded.
//!
//! ## Example
//!
//! ```yaml
//! $skip:
//!   fieldname: status
//!   condition:
//!     equals: deleted
//!
//! $convert_price:
//!   fieldname: price
//!   actions:
//!     - divide_by: 100
//!     - round: 2
//!
//! $format_date_created:
//!   date_field: meta.created
//!   format: DD-MM-YYYY
//! ```
//!
//! ```
//! use recast::{RuleEngine, RuleSet};
//! use serde_json::json;
//!
//! let rules = RuleSet::from_yaml_str(r#"
//! $convert_price:
//!   fieldname: price
//!   actions:
//!     - divide_by: 100
//! $format_date_created:
//!   date_field: meta.created
//!   format: DD-MM-YYYY
//! "#)?;
//!
//! let engine = RuleEngine::new(rules);
//! let record = json!({"price": 1999, "meta": {"created": "21-02-2021"}});
//! let converted = engine.convert(record.as_object().cloned().unwrap_or_default())?;
//!
//! assert_eq!(converted["price"], json!(19.99));
//! assert_eq!(converted["meta"]["created"], json!("2021-02-21"));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

// Core modules
pub mod error;
pub mod record;
pub mod extraction;
pub mod conditions;
pub mod actions;
pub mod dates;

// Rule documents and the engine that runs them
pub mod rules;
pub mod engine;

// Structured types
pub mod catalogue;
pub mod materializer;

pub mod serialization;

// Re-export key types
pub use error::{CatalogueError, ConvertError, LoadError, RuleError};
pub use record::{keys_in_lower_case, without_null_values, Record};
pub use extraction::{FieldPath, PathSegment};
pub use conditions::Condition;
pub use actions::{FieldAction, FieldActionRule};
pub use dates::{DateFormat, DateRule};
pub use rules::{Rule, RuleSet, RuleSource, SelectRule, SkipRule};
pub use engine::{EngineConfig, Outcome, RuleEngine};
pub use catalogue::{Instance, MethodTable, Mutator, Structured, TypeCatalogue, TypeDescriptor};
pub use materializer::{MethodCall, ObjectRule};
pub use serialization::{OutputFormat, RecordWriter, SerializationError};
