//! # Memory Configuration
//!
//! Loaded once at startup from TOML. Never touched on the allocation path.
//!
//! ```toml
//! total_size = 67108864
//! fallback_to_platform = true
//! zero_on_allocate = true
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{AllocError, AllocResult};

/// Default arena size: 64 MiB.
pub const DEFAULT_TOTAL_SIZE: usize = 64 * 1024 * 1024;

/// Settings for a [`MemorySystem`](crate::MemorySystem).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Arena size in bytes.
    pub total_size: usize,
    /// Serve requests from the platform heap when the arena is exhausted.
    #[serde(default = "default_true")]
    pub fallback_to_platform: bool,
    /// Zero every block before handing it out.
    #[serde(default = "default_true")]
    pub zero_on_allocate: bool,
}

const fn default_true() -> bool {
    true
}

impl MemoryConfig {
    /// Config with the given arena size and default flags.
    #[must_use]
    pub const fn new(total_size: usize) -> Self {
        Self {
            total_size,
            fallback_to_platform: true,
            zero_on_allocate: true,
        }
    }

    /// Parses a config from TOML text.
    ///
    /// # Errors
    ///
    /// [`AllocError::InvalidConfig`] on a parse error or a zero arena size.
    pub fn from_toml_str(text: &str) -> AllocResult<Self> {
        let config: Self =
            toml::from_str(text).map_err(|err| AllocError::InvalidConfig(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and parses a TOML config file.
    ///
    /// # Errors
    ///
    /// [`AllocError::InvalidConfig`] if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> AllocResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|err| {
            AllocError::InvalidConfig(format!("cannot read {}: {err}", path.display()))
        })?;
        Self::from_toml_str(&text)
    }

    /// Checks value ranges.
    ///
    /// # Errors
    ///
    /// [`AllocError::InvalidConfig`] if `total_size` is zero.
    pub fn validate(&self) -> AllocResult<()> {
        if self.total_size == 0 {
            return Err(AllocError::InvalidConfig(
                "total_size must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self::new(DEFAULT_TOTAL_SIZE)
    }
}
