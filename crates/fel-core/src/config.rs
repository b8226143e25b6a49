//! Engine configuration
//!
//! An [`EngineConfig`] selects the numeric operator set, the representation of
//! the engine's long-lived default context, the security policy and the compiled
//! artifact cache. It can be built in code, read from TOML, and adjusted from
//! `FEL_*` environment variables.

use crate::error::{FelError, FelResult};
use serde::Deserialize;
use std::path::Path;

/// Default number of fractional digits kept by big-number division
pub const DEFAULT_DECIMAL_PRECISION: u32 = 100;

/// Default parser nesting limit
pub const DEFAULT_MAX_DEPTH: usize = 256;

/// Default number of cached compiled artifacts
pub const DEFAULT_CACHE_CAPACITY: usize = 1024;

/// Numeric operator set installed in the function registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NumericMode {
    /// Double precision arithmetic and comparison
    #[default]
    Double,
    /// Arbitrary precision integers and decimals
    Big,
}

/// Representation of the engine's default context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextLayout {
    /// Slot-indexed variables
    #[default]
    Array,
    /// Name-indexed variables
    Map,
}

/// Allow/deny pattern lists for reflective calls
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SecurityConfig {
    /// When non-empty, only matching targets are callable
    pub allow: Vec<String>,
    /// Targets that are never callable; `None` installs the default deny-set
    pub deny: Option<Vec<String>>,
}

/// Compiled artifact cache settings
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheConfig {
    pub enabled: bool,
    pub capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { enabled: true, capacity: DEFAULT_CACHE_CAPACITY }
    }
}

/// Complete engine configuration
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    pub numeric: NumericMode,
    /// Fractional digits kept by big-number division
    pub decimal_precision: u32,
    pub context_layout: ContextLayout,
    /// Maximum expression nesting accepted by the parser and the compiler
    pub max_depth: usize,
    pub security: SecurityConfig,
    pub cache: CacheConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            numeric: NumericMode::Double,
            decimal_precision: DEFAULT_DECIMAL_PRECISION,
            context_layout: ContextLayout::Array,
            max_depth: DEFAULT_MAX_DEPTH,
            security: SecurityConfig::default(),
            cache: CacheConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Configuration for the big-number engine
    pub fn big_number(decimal_precision: u32) -> Self {
        Self { numeric: NumericMode::Big, decimal_precision, ..Self::default() }
    }

    /// Parse a TOML document
    pub fn from_toml_str(source: &str) -> FelResult<Self> {
        let config: Self =
            toml::from_str(source).map_err(|e| FelError::config("toml", e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        use anyhow::Context as _;

        let path = path.as_ref();
        let source = std::fs::read_to_string(path)
            .with_context(|| format!("reading engine config {}", path.display()))?;
        Ok(Self::from_toml_str(&source)?)
    }

    /// Apply `FEL_NUMERIC`, `FEL_DECIMAL_PRECISION` and `FEL_CACHE_CAPACITY`
    /// from the process environment
    pub fn apply_env_overrides(&mut self) -> FelResult<()> {
        self.apply_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary key lookup
    pub fn apply_overrides_from<F>(&mut self, lookup: F) -> FelResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(numeric) = lookup("FEL_NUMERIC") {
            self.numeric = match numeric.to_lowercase().as_str() {
                "double" => NumericMode::Double,
                "big" => NumericMode::Big,
                other => {
                    return Err(FelError::config(
                        "FEL_NUMERIC",
                        format!("expected `double` or `big`, got `{other}`"),
                    ));
                }
            };
        }
        if let Some(precision) = lookup("FEL_DECIMAL_PRECISION") {
            self.decimal_precision = parse_override("FEL_DECIMAL_PRECISION", &precision)?;
        }
        if let Some(capacity) = lookup("FEL_CACHE_CAPACITY") {
            self.cache.capacity = parse_override("FEL_CACHE_CAPACITY", &capacity)?;
        }
        self.validate()
    }

    /// Reject settings the engine cannot run with
    pub fn validate(&self) -> FelResult<()> {
        if self.max_depth == 0 {
            return Err(FelError::config("max_depth", "must be at least 1"));
        }
        if self.cache.enabled && self.cache.capacity == 0 {
            return Err(FelError::config("cache.capacity", "must be at least 1 when enabled"));
        }
        Ok(())
    }
}

fn parse_override<T>(key: &str, raw: &str) -> FelResult<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e| FelError::config(key, format!("invalid value `{raw}`: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.numeric, NumericMode::Double);
        assert_eq!(config.decimal_precision, 100);
        assert_eq!(config.context_layout, ContextLayout::Array);
        assert!(config.cache.enabled);
        assert!(config.security.deny.is_none());
    }

    #[test]
    fn test_from_toml() {
        let config = EngineConfig::from_toml_str(
            r#"
            numeric = "big"
            decimal_precision = 10
            context_layout = "map"

            [security]
            allow = ["Math.*"]

            [cache]
            capacity = 8
            "#,
        )
        .unwrap();

        assert_eq!(config.numeric, NumericMode::Big);
        assert_eq!(config.decimal_precision, 10);
        assert_eq!(config.context_layout, ContextLayout::Map);
        assert_eq!(config.security.allow, vec!["Math.*".to_string()]);
        assert_eq!(config.cache.capacity, 8);
        assert!(config.cache.enabled);
    }

    #[test]
    fn test_unknown_field_rejected() {
        let err = EngineConfig::from_toml_str("numerc = \"big\"").unwrap_err();
        assert_eq!(err.category(), "config");
    }

    #[test]
    fn test_zero_depth_rejected() {
        assert!(EngineConfig::from_toml_str("max_depth = 0").is_err());
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> =
            [("FEL_NUMERIC", "BIG"), ("FEL_DECIMAL_PRECISION", "12"), ("FEL_CACHE_CAPACITY", "64")]
                .into_iter()
                .collect();

        let mut config = EngineConfig::default();
        config.apply_overrides_from(|key| env.get(key).map(|v| v.to_string())).unwrap();

        assert_eq!(config.numeric, NumericMode::Big);
        assert_eq!(config.decimal_precision, 12);
        assert_eq!(config.cache.capacity, 64);
    }

    #[test]
    fn test_env_rejects_unparsable_numbers() {
        for key in ["FEL_DECIMAL_PRECISION", "FEL_CACHE_CAPACITY"] {
            let mut config = EngineConfig::default();
            let err = config
                .apply_overrides_from(|k| (k == key).then(|| "x".to_string()))
                .unwrap_err();
            assert!(matches!(&err, FelError::Config { setting, .. } if setting == key));
            assert_eq!(config.cache.capacity, DEFAULT_CACHE_CAPACITY);
        }
    }

    #[test]
    fn test_env_rejects_unknown_mode() {
        let mut config = EngineConfig::default();
        let result = config.apply_overrides_from(|key| {
            (key == "FEL_NUMERIC").then(|| "quad".to_string())
        });
        assert!(result.is_err());
    }
}
