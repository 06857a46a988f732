//! Cache configuration.
//!
//! | Environment Variable | Description |
//! |---------------------|-------------|
//! | `MODSTORE_CACHE_DIR` | Cache root (default: `<user cache dir>/modstore`) |
//! | `MODSTORE_REGISTRY` | Registry assumed for `owner/name` references |

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{RegistryError, RegistryResult};
use crate::reference::{validate_registry, FullName};

/// Environment variable overriding the cache root.
pub const CACHE_DIR_ENV: &str = "MODSTORE_CACHE_DIR";

/// Environment variable setting the default registry.
pub const REGISTRY_ENV: &str = "MODSTORE_REGISTRY";

/// Where the cache lives and how short names resolve.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Cache root directory.
    pub cache_dir: PathBuf,

    /// Registry for `owner/name` references, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_registry: Option<String>,
}

/// Platform cache directory for modstore.
pub fn default_cache_dir() -> RegistryResult<PathBuf> {
    let base = dirs::cache_dir()
        .or_else(dirs::home_dir)
        .ok_or_else(|| RegistryError::Config {
            message: "could not determine cache directory".to_string(),
        })?;

    Ok(base.join("modstore"))
}

impl CacheConfig {
    /// Config rooted at `cache_dir`, without a default registry.
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            default_registry: None,
        }
    }

    /// Create config from environment variables.
    ///
    /// Unset or empty variables fall back to the defaults.
    pub fn from_env() -> RegistryResult<Self> {
        let cache_dir = match std::env::var(CACHE_DIR_ENV) {
            Ok(dir) if !dir.trim().is_empty() => PathBuf::from(dir),
            _ => default_cache_dir()?,
        };
        let config = Self::new(cache_dir);

        match std::env::var(REGISTRY_ENV) {
            Ok(registry) if !registry.trim().is_empty() => {
                config.with_default_registry(registry.trim())
            }
            _ => Ok(config),
        }
    }

    /// Set the cache root.
    pub fn with_cache_dir(mut self, cache_dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = cache_dir.into();
        self
    }

    /// Set the default registry, checking that it is a host name.
    pub fn with_default_registry(mut self, registry: impl Into<String>) -> RegistryResult<Self> {
        let registry = registry.into();
        validate_registry(&registry, &registry).map_err(|e| RegistryError::Config {
            message: format!("{}: {}", REGISTRY_ENV, e),
        })?;
        self.default_registry = Some(registry);
        Ok(self)
    }

    /// Parse a module name, applying the default registry to `owner/name`.
    pub fn parse_name(&self, reference: &str) -> RegistryResult<FullName> {
        FullName::parse(reference, self.default_registry.as_deref())
    }
}
