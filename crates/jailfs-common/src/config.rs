//! Runtime configuration for the filtered calls.

use serde::{Deserialize, Serialize};

use crate::constants::MAX_PATH_LEN;
use crate::error::{JailFsError, Result};

/// Root configuration for the jailfs interceptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JailFsConfig {
    /// Buffer size handed to the confinement-root resolver, terminator
    /// included. Clamped to [`MAX_PATH_LEN`].
    pub max_path_len: usize,
    /// Whether activation logs the version banner.
    pub announce: bool,
}

impl JailFsConfig {
    /// Checks that the configuration can be used.
    ///
    /// # Errors
    ///
    /// Returns an error if `max_path_len` cannot hold even `"/"`.
    pub fn validate(&self) -> Result<()> {
        if self.max_path_len < 2 {
            return Err(JailFsError::Config {
                message: format!("max_path_len {} cannot hold \"/\"", self.max_path_len),
            });
        }
        Ok(())
    }

    /// Resolver buffer size after clamping to the system maximum.
    #[must_use]
    pub fn effective_path_len(&self) -> usize {
        self.max_path_len.min(MAX_PATH_LEN)
    }
}

impl Default for JailFsConfig {
    fn default() -> Self {
        Self {
            max_path_len: MAX_PATH_LEN,
            announce: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_uses_system_maximum() {
        let config = JailFsConfig::default();
        assert_eq!(config.effective_path_len(), MAX_PATH_LEN);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn oversized_path_len_is_clamped() {
        let config = JailFsConfig {
            max_path_len: 1 << 20,
            announce: false,
        };
        assert_eq!(config.effective_path_len(), MAX_PATH_LEN);
    }

    #[test]
    fn tiny_path_len_is_rejected() {
        let config = JailFsConfig {
            max_path_len: 1,
            announce: true,
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_fields_take_defaults() {
        let config: JailFsConfig =
            serde_json::from_str(r#"{"announce": false}"#).expect("should parse");
        assert_eq!(config.max_path_len, MAX_PATH_LEN);
        assert!(!config.announce);
    }
}
