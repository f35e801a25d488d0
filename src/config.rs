//! Engine configuration
//!
//! Configuration is fixed at construction time. It can be built in code,
//! parsed from TOML, or layered from defaults, an optional file and
//! `BUCKET_ALLOC_*` environment variables.
//!
//! ```toml
//! capacities = [64, 64, 32, 32, 16]
//! zero_on_free = true
//! shrink_reallocates = false
//! record_stats = true
//! allow_overflow = true
//! ```

use crate::error::{Error, Result};
use crate::slab::size_class::SizeClassTable;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

/// Prefix for environment overrides, e.g. `BUCKET_ALLOC_ALLOW_OVERFLOW=true`
pub const ENV_PREFIX: &str = "BUCKET_ALLOC";

/// Construction-time options for a `BucketEngine`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Slots per class, class 0 (16 bytes) first; `0` disables a class
    pub capacities: Vec<usize>,
    /// Overwrite freed slots with `0xCC`
    pub zero_on_free: bool,
    /// Move to a smaller class when a reallocation shrinks past a class
    /// boundary; when false such shrinks keep the current slot
    pub shrink_reallocates: bool,
    /// Track per-class usage statistics
    pub record_stats: bool,
    /// Serve exhausted classes from the next larger non-exhausted class
    pub allow_overflow: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            capacities: vec![64; 8],
            zero_on_free: false,
            shrink_reallocates: true,
            record_stats: true,
            allow_overflow: false,
        }
    }
}

impl EngineConfig {
    /// Default options with the given per-class capacities
    pub fn with_capacities(capacities: impl Into<Vec<usize>>) -> Self {
        Self {
            capacities: capacities.into(),
            ..Self::default()
        }
    }

    pub fn zero_on_free(mut self, enabled: bool) -> Self {
        self.zero_on_free = enabled;
        self
    }

    pub fn shrink_reallocates(mut self, enabled: bool) -> Self {
        self.shrink_reallocates = enabled;
        self
    }

    pub fn record_stats(mut self, enabled: bool) -> Self {
        self.record_stats = enabled;
        self
    }

    pub fn allow_overflow(mut self, enabled: bool) -> Self {
        self.allow_overflow = enabled;
        self
    }

    /// Parse a TOML document; missing keys keep their defaults
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let config: Self = toml::from_str(source)
            .map_err(|e| Error::Config(format!("invalid TOML configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Render as TOML
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("failed to serialize configuration: {}", e)))
    }

    /// Layer defaults, an optional TOML file, then environment overrides
    ///
    /// Environment keys are `BUCKET_ALLOC_<FIELD>`; `BUCKET_ALLOC_CAPACITIES`
    /// takes a comma-separated list.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        // keys absent from every source fall back to `Default` via serde
        let mut builder = ::config::Config::builder();
        if let Some(path) = path {
            debug!(path = ?path, "Loading configuration file");
            builder = builder.add_source(
                ::config::File::from(path)
                    .format(::config::FileFormat::Toml)
                    .required(true),
            );
        }
        builder = builder.add_source(
            ::config::Environment::with_prefix(ENV_PREFIX)
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("capacities"),
        );

        let config: Self = builder
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check that the class layout can be reserved
    pub fn validate(&self) -> Result<()> {
        self.size_classes().map(|_| ())
    }

    /// Size class table described by `capacities`
    pub fn size_classes(&self) -> Result<SizeClassTable> {
        SizeClassTable::new(self.capacities.clone())
    }
}
