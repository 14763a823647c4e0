//! Option schema: the recognized option names, their declared types and defaults.
//!
//! A built-in table covers the engine's common switches. A JSON file can
//! replace it:
//!
//! ```json
//! {
//!   "Target": { "url": "string", "googleDork": "string" },
//!   "Request": { "timeout": "float", "retries": "integer" },
//!   "_defaults": { "timeout": 30, "retries": 3 }
//! }
//! ```

use std::fmt;
use std::path::Path;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::options::OptionValue;
use crate::error::ConfigError;

/// Key in a schema file that holds default overrides instead of a group.
const DEFAULTS_KEY: &str = "_defaults";

/// Declared primitive type of an option.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptionType {
    Boolean,
    String,
    Integer,
    Float,
}

impl OptionType {
    /// Value an option of this type starts with when the schema gives no default.
    pub fn implicit_default(&self) -> OptionValue {
        match self {
            Self::Boolean => OptionValue::Bool(false),
            Self::String | Self::Integer | Self::Float => OptionValue::Null,
        }
    }

    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "boolean" => Some(Self::Boolean),
            "string" => Some(Self::String),
            "integer" => Some(Self::Integer),
            "float" => Some(Self::Float),
            _ => None,
        }
    }
}

impl fmt::Display for OptionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Boolean => "boolean",
            Self::String => "string",
            Self::Integer => "integer",
            Self::Float => "float",
        };
        write!(f, "{s}")
    }
}

/// One recognized option.
#[derive(Debug, Clone, PartialEq)]
pub struct OptionEntry {
    pub name: String,
    pub group: String,
    pub kind: OptionType,
    pub default: OptionValue,
}

/// Ordered table of recognized options.
#[derive(Debug, Clone, Default)]
pub struct OptionSchema {
    entries: IndexMap<String, OptionEntry>,
}

impl OptionSchema {
    /// The built-in option table.
    pub fn builtin() -> Self {
        let mut schema = Self::default();
        for (group, options) in BUILTIN {
            for (name, kind) in *options {
                schema.insert(group, name, *kind);
            }
        }
        for (name, default) in builtin_defaults() {
            schema.set_default(name, default);
        }
        schema
    }

    /// Load a schema from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Parse a schema document (see module docs for the shape).
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let doc: serde_json::Map<String, serde_json::Value> =
            serde_json::from_str(text).map_err(|e| ConfigError::Schema(e.to_string()))?;

        let mut schema = Self::default();
        let mut defaults = None;

        for (group, body) in doc {
            if group == DEFAULTS_KEY {
                defaults = Some(body);
                continue;
            }
            let serde_json::Value::Object(options) = body else {
                return Err(ConfigError::Schema(format!("group {group} is not an object")));
            };
            for (name, raw) in options {
                let kind = parse_type(&raw).ok_or_else(|| {
                    ConfigError::Schema(format!("option {name} has unsupported type {raw}"))
                })?;
                schema.insert(&group, &name, kind);
            }
        }

        match defaults {
            Some(serde_json::Value::Object(map)) => {
                for (name, value) in map {
                    schema.set_default(&name, OptionValue::from(value));
                }
            }
            Some(_) => {
                return Err(ConfigError::Schema(format!("{DEFAULTS_KEY} is not an object")));
            }
            None => {}
        }

        Ok(schema)
    }

    pub fn entries(&self) -> impl Iterator<Item = &OptionEntry> {
        self.entries.values()
    }

    pub fn type_of(&self, name: &str) -> Option<OptionType> {
        self.entries.get(name).map(|e| e.kind)
    }


    fn insert(&mut self, group: &str, name: &str, kind: OptionType) {
        self.entries.insert(
            name.to_string(),
            OptionEntry {
                name: name.to_string(),
                group: group.to_string(),
                kind,
                default: kind.implicit_default(),
            },
        );
    }

    // Defaults for names the schema does not declare are ignored.
    fn set_default(&mut self, name: &str, value: OptionValue) {
        if let Some(entry) = self.entries.get_mut(name) {
            entry.default = value;
        }
    }
}

/// Types may be given as `"string"` or wrapped in a one-element array `["string"]`.
fn parse_type(raw: &serde_json::Value) -> Option<OptionType> {
    match raw {
        serde_json::Value::String(s) => OptionType::parse(s),
        serde_json::Value::Array(items) => items.first().and_then(parse_type),
        _ => None,
    }
}

use OptionType::{Boolean, Float, Integer, String as Str};

const BUILTIN: &[(&str, &[(&str, OptionType)])] = &[
    (
        "Target",
        &[
            ("direct", Str),
            ("url", Str),
            ("logFile", Str),
            ("bulkFile", Str),
            ("requestFile", Str),
            ("googleDork", Str),
            ("configFile", Str),
        ],
    ),
    (
        "Request",
        &[
            ("method", Str),
            ("data", Str),
            ("pDel", Str),
            ("cookie", Str),
            ("cookieDel", Str),
            ("loadCookies", Str),
            ("dropSetCookie", Boolean),
            ("agent", Str),
            ("randomAgent", Boolean),
            ("host", Str),
            ("referer", Str),
            ("headers", Str),
            ("authType", Str),
            ("authCred", Str),
            ("proxy", Str),
            ("proxyCred", Str),
            ("ignoreProxy", Boolean),
            ("tor", Boolean),
            ("delay", Float),
            ("timeout", Float),
            ("retries", Integer),
            ("rParam", Str),
            ("safUrl", Str),
            ("saFreq", Integer),
            ("skipUrlEncode", Boolean),
            ("forceSSL", Boolean),
            ("evalCode", Str),
        ],
    ),
    (
        "Optimization",
        &[
            ("optimize", Boolean),
            ("predictOutput", Boolean),
            ("keepAlive", Boolean),
            ("nullConnection", Boolean),
            ("threads", Integer),
        ],
    ),
    (
        "Injection",
        &[
            ("testParameter", Str),
            ("skip", Str),
            ("dbms", Str),
            ("os", Str),
            ("invalidBignum", Boolean),
            ("invalidLogical", Boolean),
            ("noCast", Boolean),
            ("noEscape", Boolean),
            ("prefix", Str),
            ("suffix", Str),
            ("tamper", Str),
        ],
    ),
    (
        "Detection",
        &[
            ("level", Integer),
            ("risk", Integer),
            ("string", Str),
            ("notString", Str),
            ("regexp", Str),
            ("code", Integer),
            ("textOnly", Boolean),
            ("titles", Boolean),
        ],
    ),
    (
        "Techniques",
        &[
            ("tech", Str),
            ("timeSec", Integer),
            ("uCols", Str),
            ("uChar", Str),
            ("uFrom", Str),
            ("dnsName", Str),
            ("secondOrder", Str),
        ],
    ),
    (
        "Enumeration",
        &[
            ("getAll", Boolean),
            ("getBanner", Boolean),
            ("getCurrentUser", Boolean),
            ("getCurrentDb", Boolean),
            ("getHostname", Boolean),
            ("isDba", Boolean),
            ("getUsers", Boolean),
            ("getPasswordHashes", Boolean),
            ("getPrivileges", Boolean),
            ("getRoles", Boolean),
            ("getDbs", Boolean),
            ("getTables", Boolean),
            ("getColumns", Boolean),
            ("getSchema", Boolean),
            ("getCount", Boolean),
            ("dumpTable", Boolean),
            ("dumpAll", Boolean),
            ("search", Boolean),
            ("db", Str),
            ("tbl", Str),
            ("col", Str),
            ("user", Str),
            ("excludeSysDbs", Boolean),
            ("limitStart", Integer),
            ("limitStop", Integer),
            ("firstChar", Integer),
            ("lastChar", Integer),
            ("query", Str),
            ("sqlShell", Boolean),
            ("sqlFile", Str),
        ],
    ),
    (
        "General",
        &[
            ("trafficFile", Str),
            ("batch", Boolean),
            ("charset", Str),
            ("crawlDepth", Integer),
            ("csvDel", Str),
            ("dumpFormat", Str),
            ("eta", Boolean),
            ("flushSession", Boolean),
            ("forms", Boolean),
            ("freshQueries", Boolean),
            ("hexConvert", Boolean),
            ("oDir", Str),
            ("parseErrors", Boolean),
            ("saveCmdline", Boolean),
            ("updateAll", Boolean),
        ],
    ),
    (
        "Miscellaneous",
        &[
            ("mnemonics", Str),
            ("alert", Str),
            ("answers", Str),
            ("beep", Boolean),
            ("checkWaf", Boolean),
            ("cleanup", Boolean),
            ("dependencies", Boolean),
            ("disableColoring", Boolean),
            ("googlePage", Integer),
            ("mobile", Boolean),
            ("pageRank", Boolean),
            ("purgeOutput", Boolean),
            ("smart", Boolean),
            ("wizard", Boolean),
            ("verbose", Integer),
        ],
    ),
];

fn builtin_defaults() -> Vec<(&'static str, OptionValue)> {
    vec![
        ("timeout", OptionValue::Float(30.0)),
        ("retries", OptionValue::Integer(3)),
        ("delay", OptionValue::Float(0.0)),
        ("threads", OptionValue::Integer(1)),
        ("level", OptionValue::Integer(1)),
        ("risk", OptionValue::Integer(1)),
        ("tech", OptionValue::from("BEUSTQ")),
        ("timeSec", OptionValue::Integer(5)),
        ("uCols", OptionValue::from("1-10")),
        ("csvDel", OptionValue::from(",")),
        ("dumpFormat", OptionValue::from("CSV")),
        ("crawlDepth", OptionValue::Integer(0)),
        ("googlePage", OptionValue::Integer(1)),
        ("saFreq", OptionValue::Integer(0)),
        ("verbose", OptionValue::Integer(1)),
    ]
}
