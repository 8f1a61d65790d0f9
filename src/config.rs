use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use log::info;
use serde::Deserialize;

use crate::data::schema::NEIGHBORHOOD_COLUMN;
use crate::guard::ExecutionContext;

/// Loader settings, fixed at process start.
///
/// JSON file, every field optional:
///
/// ```json
/// {
///   "execution_context": "relaxed",
///   "cache_ttl_secs": 3600,
///   "cache_capacity": 6,
///   "retry_backoff_ms": 250,
///   "neighborhood_column": "BAIRRO"
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoaderConfig {
    pub execution_context: ExecutionContext,
    pub cache_ttl_secs: u64,
    pub cache_capacity: usize,
    pub retry_backoff_ms: u64,
    pub neighborhood_column: String,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            execution_context: ExecutionContext::Constrained,
            cache_ttl_secs: 3600,
            cache_capacity: 6,
            retry_backoff_ms: 250,
            neighborhood_column: NEIGHBORHOOD_COLUMN.to_string(),
        }
    }
}

impl LoaderConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let config: LoaderConfig = serde_json::from_str(text).context("parsing config JSON")?;
        config.check()?;
        Ok(config)
    }

    /// Overlay process environment variables.
    pub fn apply_env(self) -> Result<Self> {
        self.apply_vars(|name| std::env::var(name).ok())
    }

    /// Overlay variables from any lookup.
    ///
    /// * `MEGASET_EXECUTION_CONTEXT` = `relaxed` | `constrained`
    /// * `MEGASET_CACHE_TTL_SECS`    = seconds
    /// * `DEPLOYMENT_MODE=production` or `ENVIRONMENT=production` force
    ///   `constrained`, whatever else was configured.
    pub fn apply_vars<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(ctx) = lookup("MEGASET_EXECUTION_CONTEXT") {
            self.execution_context = match ctx.trim().to_ascii_lowercase().as_str() {
                "relaxed" => ExecutionContext::Relaxed,
                "constrained" => ExecutionContext::Constrained,
                other => bail!("MEGASET_EXECUTION_CONTEXT: unknown value '{other}'"),
            };
        }
        if let Some(ttl) = lookup("MEGASET_CACHE_TTL_SECS") {
            self.cache_ttl_secs = ttl
                .trim()
                .parse()
                .with_context(|| format!("MEGASET_CACHE_TTL_SECS: '{ttl}' is not a number"))?;
        }

        let production = ["DEPLOYMENT_MODE", "ENVIRONMENT"]
            .iter()
            .any(|var| lookup(var).is_some_and(|v| v.trim() == "production"));
        if production && self.execution_context != ExecutionContext::Constrained {
            info!("production deployment detected; forcing constrained execution context");
            self.execution_context = ExecutionContext::Constrained;
        }

        self.check()?;
        Ok(self)
    }

    fn check(&self) -> Result<()> {
        if self.cache_capacity == 0 {
            bail!("cache_capacity must be at least 1");
        }
        if self.neighborhood_column.trim().is_empty() {
            bail!("neighborhood_column must not be empty");
        }
        Ok(())
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}
