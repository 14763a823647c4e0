//! Configuration types.

use std::path::PathBuf;

use tracing::warn;

use crate::error::ConfigError;
use crate::scan::capture::DEFAULT_CAPTURE_LIMIT;
use crate::scan::launcher::EngineCommand;
use crate::task::OptionSchema;

/// Default listen port of the REST-JSON API.
pub const DEFAULT_PORT: u16 = 8775;

/// API server configuration, built from environment variables.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Address to bind.
    pub host: String,
    /// Port to bind.
    pub port: u16,
    /// Engine executable run once per scan.
    pub engine_program: String,
    /// Extra arguments passed to the engine before anything else.
    pub engine_args: Vec<String>,
    /// Parent directory for per-scan working directories (OS temp dir if unset).
    pub scratch_root: Option<PathBuf>,
    /// Whether a scan start waits for the worker to exit.
    pub blocking_start: bool,
    /// Byte limit of each per-task capture buffer.
    pub capture_limit: usize,
    /// Option schema file replacing the built-in table.
    pub schema_path: Option<PathBuf>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            engine_program: "sqlmap".to_string(),
            engine_args: Vec::new(),
            scratch_root: None,
            blocking_start: false,
            capture_limit: DEFAULT_CAPTURE_LIMIT,
            schema_path: None,
        }
    }
}

impl ApiConfig {
    /// Build config from `SCANCTL_*` environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let host = lookup("SCANCTL_HOST").unwrap_or(defaults.host);
        let port = parse_or("SCANCTL_PORT", lookup("SCANCTL_PORT"), defaults.port);
        let engine_program = lookup("SCANCTL_ENGINE")
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(defaults.engine_program);
        let engine_args = lookup("SCANCTL_ENGINE_ARGS")
            .map(|s| s.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default();
        let scratch_root = lookup("SCANCTL_SCRATCH_DIR")
            .filter(|s| !s.is_empty())
            .map(PathBuf::from);
        let blocking_start = lookup("SCANCTL_BLOCKING_START")
            .map(|s| parse_bool("SCANCTL_BLOCKING_START", &s, defaults.blocking_start))
            .unwrap_or(defaults.blocking_start);
        let capture_limit = parse_or(
            "SCANCTL_CAPTURE_LIMIT",
            lookup("SCANCTL_CAPTURE_LIMIT"),
            defaults.capture_limit,
        );
        let schema_path = lookup("SCANCTL_OPTION_SCHEMA")
            .filter(|s| !s.is_empty())
            .map(PathBuf::from);

        Self {
            host,
            port,
            engine_program,
            engine_args,
            scratch_root,
            blocking_start,
            capture_limit,
            schema_path,
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn engine(&self) -> EngineCommand {
        EngineCommand::new(self.engine_program.clone()).with_args(self.engine_args.clone())
    }

    /// Load the configured option schema, or the built-in one.
    pub fn load_schema(&self) -> Result<OptionSchema, ConfigError> {
        match &self.schema_path {
            Some(path) => OptionSchema::from_file(path),
            None => Ok(OptionSchema::builtin()),
        }
    }

    /// Reject values that parse but cannot work.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.capture_limit == 0 {
            return Err(ConfigError::InvalidValue {
                key: "SCANCTL_CAPTURE_LIMIT".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }
        if let Some(root) = &self.scratch_root {
            if !root.is_dir() {
                return Err(ConfigError::InvalidValue {
                    key: "SCANCTL_SCRATCH_DIR".to_string(),
                    message: format!("{} is not a directory", root.display()),
                });
            }
        }
        Ok(())
    }
}

fn parse_or<T: std::str::FromStr>(key: &str, raw: Option<String>, default: T) -> T {
    match raw {
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!(key, value = %raw, "Unparseable configuration value, using default");
            default
        }),
        None => default,
    }
}

fn parse_bool(key: &str, raw: &str, default: bool) -> bool {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        "0" | "false" | "no" | "off" | "" => false,
        _ => {
            warn!(key, value = %raw, "Unparseable boolean, using default");
            default
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn from_pairs(pairs: &[(&str, &str)]) -> ApiConfig {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ApiConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_when_nothing_is_set() {
        let config = from_pairs(&[]);
        assert_eq!(config.bind_addr(), "0.0.0.0:8775");
        assert_eq!(config.engine_program, "sqlmap");
        assert!(!config.blocking_start);
        assert_eq!(config.capture_limit, DEFAULT_CAPTURE_LIMIT);
        assert!(config.scratch_root.is_none());
    }

    #[test]
    fn reads_every_variable() {
        let config = from_pairs(&[
            ("SCANCTL_HOST", "127.0.0.1"),
            ("SCANCTL_PORT", "9000"),
            ("SCANCTL_ENGINE", "python3"),
            ("SCANCTL_ENGINE_ARGS", "sqlmap.py  --api-worker"),
            ("SCANCTL_BLOCKING_START", "yes"),
            ("SCANCTL_CAPTURE_LIMIT", "4096"),
            ("SCANCTL_OPTION_SCHEMA", "/etc/scanctl/schema.json"),
        ]);
        assert_eq!(config.bind_addr(), "127.0.0.1:9000");
        assert_eq!(
            config.engine(),
            EngineCommand::new("python3").with_args(["sqlmap.py", "--api-worker"])
        );
        assert!(config.blocking_start);
        assert_eq!(config.capture_limit, 4096);
        assert_eq!(
            config.schema_path,
            Some(PathBuf::from("/etc/scanctl/schema.json"))
        );
    }

    #[test]
    fn bad_values_fall_back_to_defaults() {
        let config = from_pairs(&[
            ("SCANCTL_PORT", "not-a-port"),
            ("SCANCTL_BLOCKING_START", "maybe"),
            ("SCANCTL_ENGINE", "  "),
        ]);
        assert_eq!(config.port, DEFAULT_PORT);
        assert!(!config.blocking_start);
        assert_eq!(config.engine_program, "sqlmap");
    }

    #[test]
    fn validate_rejects_zero_capture_limit_and_missing_scratch_dir() {
        let config = ApiConfig {
            capture_limit: 0,
            ..ApiConfig::default()
        };
        assert!(config.validate().is_err());

        let config = ApiConfig {
            scratch_root: Some(PathBuf::from("/definitely/not/here")),
            ..ApiConfig::default()
        };
        assert!(config.validate().is_err());
        assert!(ApiConfig::default().validate().is_ok());
    }

    #[test]
    fn builtin_schema_is_used_without_a_path() {
        let schema = ApiConfig::default().load_schema().unwrap();
        assert!(schema.type_of("url").is_some());
    }
}
