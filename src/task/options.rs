//! Per-task option sets.
//!
//! Values are a small tagged union over the primitive types the engine
//! understands. Writes are never rejected: a value whose type disagrees with
//! the schema is stored anyway and reported with a warning.

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};
use tracing::warn;

use super::schema::{OptionSchema, OptionType};

/// Option forced on for every task: the engine never prompts.
pub const BATCH: &str = "batch";
/// Option forced on for every task: no ANSI colors in captured output.
pub const DISABLE_COLORING: &str = "disableColoring";

/// A single option value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum OptionValue {
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
    Null,
}

impl OptionValue {
    fn type_name(&self) -> &'static str {
        match self {
            Self::Bool(_) => "boolean",
            Self::Integer(_) => "integer",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::Null => "null",
        }
    }
}

impl From<serde_json::Value> for OptionValue {
    fn from(value: serde_json::Value) -> Self {
        use serde_json::Value;

        match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Bool(b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Self::Integer(i),
                None => Self::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            Value::String(s) => Self::String(s),
            // Compound values have no engine-side representation; keep their JSON text.
            other @ (Value::Array(_) | Value::Object(_)) => Self::String(other.to_string()),
        }
    }
}

impl<'de> Deserialize<'de> for OptionValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        serde_json::Value::deserialize(deserializer).map(Self::from)
    }
}

impl From<bool> for OptionValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for OptionValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<f64> for OptionValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for OptionValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for OptionValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

/// Ordered mapping from option name to value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OptionSet {
    values: IndexMap<String, OptionValue>,
}

impl OptionSet {
    /// Seed an option set from schema defaults, then force the safety options.
    pub fn from_schema(schema: &OptionSchema) -> Self {
        let mut set = Self {
            values: schema
                .entries()
                .map(|entry| (entry.name.clone(), entry.default.clone()))
                .collect(),
        };
        set.apply_forced();
        set
    }

    pub fn get(&self, name: &str) -> Option<&OptionValue> {
        self.values.get(name)
    }

    /// Merge client-supplied values key by key (last write wins).
    ///
    /// Unknown keys are stored verbatim. The forced options are re-applied
    /// after the merge, so a client can never turn them off.
    pub fn merge<I>(&mut self, updates: I, schema: &OptionSchema)
    where
        I: IntoIterator<Item = (String, OptionValue)>,
    {
        for (name, value) in updates {
            if let Some(expected) = schema.type_of(&name) {
                if !expected.accepts(&value) {
                    warn!(
                        option = %name,
                        expected = %expected,
                        actual = value.type_name(),
                        "Option value does not match its declared type"
                    );
                }
            }
            self.values.insert(name, value);
        }
        self.apply_forced();
    }

    /// Non-interactive execution: batch mode on, coloring off.
    pub fn apply_forced(&mut self) {
        self.values.insert(BATCH.to_string(), OptionValue::Bool(true));
        self.values
            .insert(DISABLE_COLORING.to_string(), OptionValue::Bool(true));
    }
}

impl OptionType {
    /// Whether a value is compatible with this declared type. Null is always accepted.
    pub fn accepts(&self, value: &OptionValue) -> bool {
        match (self, value) {
            (_, OptionValue::Null) => true,
            (Self::Boolean, OptionValue::Bool(_)) => true,
            (Self::String, OptionValue::String(_)) => true,
            (Self::Integer, OptionValue::Integer(_)) => true,
            (Self::Float, OptionValue::Float(_) | OptionValue::Integer(_)) => true,
            _ => false,
        }
    }
}
