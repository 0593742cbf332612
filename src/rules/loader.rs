//! Rule source loader.
//!
//! Reads a rule document from a YAML (or JSON) file, or takes an already
//! parsed document, and classifies it into a [`RuleSet`].

use std::fs;
use std::path::{Path, PathBuf};
use serde_json::Value;

use super::RuleSet;
use crate::error::LoadError;

/// Where a rule document comes from.
#[derive(Debug, Clone)]
pub enum RuleSource {
    /// Path to a YAML/JSON rule document
    File(PathBuf),
    /// An in-memory document
    Inline(Value),
}

impl RuleSource {
    /// Create a file-backed source.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Self {
        RuleSource::File(path.as_ref().to_path_buf())
    }

    /// Load and classify the rules.
    ///
    /// # Errors
    /// * [`LoadError::FileNotFound`] - the file does not exist
    /// * [`LoadError::Parse`] - the file is not valid YAML
    /// * [`LoadError::Rules`] - the document is not a valid rule set
    ///
    /// # Example
    /// ```no_run
    /// use recast::RuleSource;
    ///
    /// let rules = RuleSource::from_file("rules/orders.yaml").rules()?;
    /// println!("Loaded {} rules", rules.len());
    /// # Ok::<(), recast::LoadError>(())
    /// ```
    pub fn rules(&self) -> Result<RuleSet, LoadError> {
        match self {
            RuleSource::File(path) => {
                let contents = read_document(path)?;
                let rules = RuleSet::from_yaml_str(&contents)?;
                tracing::debug!("Loaded {} rules from {}", rules.len(), path.display());
                Ok(rules)
            }
            RuleSource::Inline(document) => Ok(RuleSet::from_value(document)?),
        }
    }
}

impl From<Value> for RuleSource {
    fn from(document: Value) -> Self {
        RuleSource::Inline(document)
    }
}

/// Read a document, keeping "missing" distinct from other I/O failures.
pub(crate) fn read_document(path: &Path) -> Result<String, LoadError> {
    if !path.exists() {
        return Err(LoadError::FileNotFound(path.to_path_buf()));
    }

    fs::read_to_string(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })
}
