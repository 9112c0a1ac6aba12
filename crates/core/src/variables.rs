//! Ordered, case-insensitive variable store.
//!
//! Names compare case-insensitively (the PowerShell side builds its
//! parameter table with an ordinal-ignore-case comparer), while insertion
//! order is preserved so generated scripts are deterministic. Updating an
//! existing name keeps its original position.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use serde_json::{Map, Value};

/// Errors raised while loading or saving variables files.
#[derive(Debug, thiserror::Error)]
pub enum VariableError {
    #[error("Failed to read variables file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write variables file {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Variables file is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Variables file must contain a JSON object of name/value pairs")]
    NotAnObject,

    #[error("Variable '{0}' has a non-scalar value")]
    NonScalarValue(String),
}

/// A single named value handed to the script.
#[derive(Clone, PartialEq, Eq)]
pub struct Variable {
    pub name: String,
    pub value: Option<String>,
    /// Sensitive values never appear in plaintext in generated scripts,
    /// arguments or logs.
    pub sensitive: bool,
}

impl Variable {
    pub fn new(name: impl Into<String>, value: Option<String>, sensitive: bool) -> Self {
        Self {
            name: name.into(),
            value,
            sensitive,
        }
    }
}

impl fmt::Debug for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value: &dyn fmt::Debug = if self.sensitive {
            &"<redacted>"
        } else {
            &self.value
        };
        f.debug_struct("Variable")
            .field("name", &self.name)
            .field("value", value)
            .field("sensitive", &self.sensitive)
            .finish()
    }
}

/// Insertion-ordered map of variables keyed by case-insensitive name.
#[derive(Debug, Clone, Default)]
pub struct VariableStore {
    entries: Vec<Variable>,
    index: HashMap<String, usize>,
}

fn fold_name(name: &str) -> String {
    name.to_lowercase()
}

impl VariableStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a variable. A replaced entry keeps its position
    /// and original spelling; value and sensitivity are overwritten.
    pub fn insert(&mut self, variable: Variable) {
        match self.index.get(&fold_name(&variable.name)) {
            Some(&idx) => {
                let existing = &mut self.entries[idx];
                existing.value = variable.value;
                existing.sensitive = variable.sensitive;
            }
            None => {
                self.index
                    .insert(fold_name(&variable.name), self.entries.len());
                self.entries.push(variable);
            }
        }
    }

    /// Upsert a non-sensitive value.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.insert(Variable::new(name, Some(value.into()), false));
    }

    /// Upsert a sensitive value.
    pub fn set_sensitive(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.insert(Variable::new(name, Some(value.into()), true));
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.get_variable(name).and_then(|v| v.value.as_deref())
    }

    pub fn get_variable(&self, name: &str) -> Option<&Variable> {
        self.index
            .get(&fold_name(name))
            .map(|&idx| &self.entries[idx])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(&fold_name(name))
    }

    pub fn is_sensitive(&self, name: &str) -> bool {
        self.get_variable(name).is_some_and(|v| v.sensitive)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Variables in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Variable> {
        self.entries.iter()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|v| v.name.as_str())
    }

    // -----------------------------------------------------------------------
    // JSON files
    // -----------------------------------------------------------------------

    /// Merge variables from a JSON object (`{"Name": "value", ...}`).
    ///
    /// `null` becomes a missing value; numbers and booleans are stored in
    /// their JSON text form. Arrays and objects are rejected.
    pub fn merge_json_str(&mut self, json: &str, sensitive: bool) -> Result<(), VariableError> {
        let value: Value = serde_json::from_str(json)?;
        let Value::Object(map) = value else {
            return Err(VariableError::NotAnObject);
        };

        for (name, value) in map {
            let value = match value {
                Value::Null => None,
                Value::String(s) => Some(s),
                Value::Bool(b) => Some(b.to_string()),
                Value::Number(n) => Some(n.to_string()),
                Value::Array(_) | Value::Object(_) => {
                    return Err(VariableError::NonScalarValue(name));
                }
            };
            self.insert(Variable::new(name, value, sensitive));
        }
        Ok(())
    }

    /// Merge variables from a JSON file on disk.
    pub fn merge_json_file(&mut self, path: &Path, sensitive: bool) -> Result<(), VariableError> {
        let json = std::fs::read_to_string(path).map_err(|source| VariableError::Read {
            path: path.display().to_string(),
            source,
        })?;
        self.merge_json_str(&json, sensitive)
    }

    /// Render the store as a JSON object in insertion order.
    pub fn to_json(&self) -> Value {
        let map: Map<String, Value> = self
            .entries
            .iter()
            .map(|v| {
                let value = v.value.clone().map(Value::String).unwrap_or(Value::Null);
                (v.name.clone(), value)
            })
            .collect();
        Value::Object(map)
    }

    /// Write the store to `path` as pretty-printed JSON.
    pub fn save_json_file(&self, path: &Path) -> Result<(), VariableError> {
        let json = serde_json::to_string_pretty(&self.to_json())?;
        std::fs::write(path, json).map_err(|source| VariableError::Write {
            path: path.display().to_string(),
            source,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
