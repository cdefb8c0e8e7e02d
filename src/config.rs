//! Tuning knobs. `GENERATIONS` and `HASH_TABLE_SIZE` are fixed array shapes
//! compiled into [`crate::record`] and [`crate::registry`]; `max_alloced_bytes`
//! is the one knob actually meant to be tuned at runtime.

use thiserror::Error;

/// Default per-generation promotion threshold, in bytes.
pub const DEFAULT_MAX_ALLOCED_BYTES: usize = 1_000_000_000;

/// Runtime-tunable collector configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GcConfig {
    /// A generation triggers a collection once its tracked byte total
    /// crosses this threshold.
    pub max_alloced_bytes: usize,
}

impl Default for GcConfig {
    fn default() -> Self {
        Self {
            max_alloced_bytes: DEFAULT_MAX_ALLOCED_BYTES,
        }
    }
}

impl GcConfig {
    /// Return a copy of this configuration with `max_alloced_bytes` overridden.
    pub fn with_max_alloced_bytes(mut self, bytes: usize) -> Self {
        self.max_alloced_bytes = bytes;
        self
    }

    /// Load overrides from `CAIRN_GC_MAX_ALLOCED_BYTES`, falling back to
    /// [`Default`] for anything unset. The only fallible entry point in this
    /// crate — the allocation façade itself never returns `Result`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(raw) = std::env::var("CAIRN_GC_MAX_ALLOCED_BYTES") {
            let parsed: usize = raw.parse().map_err(|_| ConfigError::InvalidMaxAllocedBytes(raw))?;
            if parsed == 0 {
                return Err(ConfigError::ZeroMaxAllocedBytes);
            }
            config.max_alloced_bytes = parsed;
        }

        Ok(config)
    }
}

/// Error loading [`GcConfig`] from the environment.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// `CAIRN_GC_MAX_ALLOCED_BYTES` was set but did not parse as a `usize`.
    #[error("CAIRN_GC_MAX_ALLOCED_BYTES={0:?} is not a valid byte count")]
    InvalidMaxAllocedBytes(String),
    /// `CAIRN_GC_MAX_ALLOCED_BYTES` was set to `0`, which would collect on
    /// every allocation and is almost certainly a misconfiguration.
    #[error("CAIRN_GC_MAX_ALLOCED_BYTES must be nonzero")]
    ZeroMaxAllocedBytes,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_matches_spec_constant() {
        assert_eq!(GcConfig::default().max_alloced_bytes, 1_000_000_000);
    }

    #[test]
    fn builder_overrides_the_threshold() {
        let config = GcConfig::default().with_max_alloced_bytes(4096);
        assert_eq!(config.max_alloced_bytes, 4096);
    }
}
