//! Filepath: src/config.rs
//!
//! Tree construction parameters.
//!
//! The only runtime parameter is the key width. Fanout and word count are
//! compile-time constants of the tree type; the configured width must fit
//! in them, and that is checked once at construction rather than per call.

use std::env;
use std::fmt as StdFmt;

/// Environment variable read by [`TreeConfig::from_env`].
pub const KEY_WIDTH_ENV: &str = "FOURTREE_KEY_WIDTH";

// ============================================================================
//  ConfigError
// ============================================================================

/// Errors detected while building a tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A key width of zero bytes.
    ZeroKeyWidth,

    /// The key width does not fit in the tree's key words.
    KeyWidthTooLarge {
        /// Requested width in bytes.
        width: usize,
        /// Largest width the key type holds.
        max: usize,
    },

    /// An environment variable held an unusable value.
    InvalidEnv {
        /// Variable name.
        var: &'static str,
        /// Offending value.
        value: String,
    },
}

impl StdFmt::Display for ConfigError {
    fn fmt(&self, f: &mut StdFmt::Formatter<'_>) -> StdFmt::Result {
        match self {
            Self::ZeroKeyWidth => write!(f, "key width must be at least one byte"),

            Self::KeyWidthTooLarge { width, max } => {
                write!(f, "key width {width} exceeds maximum {max}")
            }

            Self::InvalidEnv { var, value } => {
                write!(f, "invalid value {value:?} for {var}")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

// ============================================================================
//  TreeConfig
// ============================================================================

/// Construction parameters for a [`FourTree`](crate::FourTree).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TreeConfig {
    /// Key width in bytes. `None` means the full width of the key type.
    pub key_width: Option<usize>,
}

impl TreeConfig {
    /// Config with an explicit key width.
    #[must_use]
    pub const fn with_key_width(key_width: usize) -> Self {
        Self {
            key_width: Some(key_width),
        }
    }

    /// Read overrides from the environment (`FOURTREE_KEY_WIDTH`).
    ///
    /// # Errors
    /// [`ConfigError::InvalidEnv`] if the variable is set but not a number.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(raw) = env::var(KEY_WIDTH_ENV) {
            let width: usize = raw.trim().parse().map_err(|_| ConfigError::InvalidEnv {
                var: KEY_WIDTH_ENV,
                value: raw.clone(),
            })?;
            config.key_width = Some(width);
        }

        Ok(config)
    }

    /// Resolve the key width against a key type of `capacity` bytes.
    ///
    /// # Errors
    /// [`ConfigError::ZeroKeyWidth`] or [`ConfigError::KeyWidthTooLarge`].
    pub fn resolve_key_width(&self, capacity: usize) -> Result<usize, ConfigError> {
        match self.key_width {
            None => Ok(capacity),
            Some(0) => Err(ConfigError::ZeroKeyWidth),
            Some(width) if width > capacity => Err(ConfigError::KeyWidthTooLarge {
                width,
                max: capacity,
            }),
            Some(width) => Ok(width),
        }
    }
}
