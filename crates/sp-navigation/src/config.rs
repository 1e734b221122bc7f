//! Gate configuration loaded from TOML.

use serde::Deserialize;
use sp_core::SpidyError;
use sp_core::SpidyResult;
use sp_security::SecurityConfig;
use std::fs;
use std::path::Path;
use std::path::PathBuf;

/// Environment variable naming a TOML config file.
pub const CONFIG_ENV_VAR: &str = "SPIDY_GATE_CONFIG";

const DEFAULT_AUDIT_CAPACITY: usize = 100;
const MAX_AUDIT_CAPACITY: usize = 10_000;
const DEFAULT_MAX_REDIRECT_HOPS: usize = 1;
const MAX_REDIRECT_HOPS_LIMIT: usize = 8;

/// Per-gate configuration. Every field has a default, so an empty file is
/// a valid config.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GateConfig {
    pub audit_capacity: usize,
    /// Pseudo-scheme redirects followed per navigation before refusing.
    pub max_redirect_hops: usize,
    pub markdown_extensions: Vec<String>,
    pub security: SecurityConfig,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            audit_capacity: DEFAULT_AUDIT_CAPACITY,
            max_redirect_hops: DEFAULT_MAX_REDIRECT_HOPS,
            markdown_extensions: sp_markdown::default_extensions(),
            security: SecurityConfig::default(),
        }
    }
}

impl GateConfig {
    pub fn from_toml_str(source: &str) -> SpidyResult<Self> {
        let config: Self = toml::from_str(source).map_err(|error| {
            SpidyError::new(
                "config.parse_failed",
                format!("invalid gate config: {error}"),
            )
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> SpidyResult<Self> {
        let source = fs::read_to_string(path).map_err(|error| {
            SpidyError::io(
                "config.read_failed",
                format!("failed to read `{}`", path.display()),
                error,
            )
        })?;
        Self::from_toml_str(&source)
    }

    pub fn validate(&self) -> SpidyResult<()> {
        if self.audit_capacity == 0 {
            return Err(SpidyError::new(
                "config.audit_capacity_invalid",
                "audit_capacity must be greater than zero",
            ));
        }

        if self.audit_capacity > MAX_AUDIT_CAPACITY {
            return Err(SpidyError::new(
                "config.audit_capacity_too_large",
                format!("audit_capacity exceeds hard limit ({MAX_AUDIT_CAPACITY})"),
            ));
        }

        if self.max_redirect_hops > MAX_REDIRECT_HOPS_LIMIT {
            return Err(SpidyError::new(
                "config.max_redirect_hops_too_large",
                format!("max_redirect_hops exceeds hard limit ({MAX_REDIRECT_HOPS_LIMIT})"),
            ));
        }

        if self.markdown_extensions.is_empty() {
            return Err(SpidyError::new(
                "config.markdown_extensions_empty",
                "markdown_extensions must name at least one extension",
            ));
        }

        self.security.validate()
    }
}

/// Config file named by `SPIDY_GATE_CONFIG`, if set.
pub fn config_path_from_env() -> Option<PathBuf> {
    std::env::var_os(CONFIG_ENV_VAR)
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
}
