//! In-process typed configuration (ambient stack, spec §9).
//!
//! Reading this struct from a file or environment is an external
//! collaborator's concern (spec §1's "configuration loading" Non-goal);
//! the core only defines the typed shape, its defaults, and a `validate`
//! the loading collaborator calls before handing a `MintConfig` to a
//! `KeyStore`, so a bad config fails fast at load time rather than
//! silently misbehaving at the first key synthesis. `KeyStore`
//! constructors deliberately don't call `validate` themselves: this
//! crate's own tests build `MintConfig`s with sub-production modulus
//! sizes to keep RSA keygen fast, and a self-validating constructor would
//! reject exactly those.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::keystore::MIN_MODULUS_BITS;

/// Tunables for key lifecycle and RSA keypair synthesis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MintConfig {
    /// How long a freshly synthesized [`crate::keystore::SigningKey`] stays
    /// active before rotation supersedes it.
    pub rotation_interval: Duration,

    /// How long an expired key is still retained for verification after
    /// its expiry (spec §4.3 default: one year).
    pub retention_window: Duration,

    /// Modulus size used for newly synthesized keys. Must be at least
    /// [`MIN_MODULUS_BITS`] and even.
    pub modulus_bits: usize,
}

/// Errors validating a [`MintConfig`].
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("modulus_bits must be at least {MIN_MODULUS_BITS}")]
    ModulusTooSmall,
    #[error("modulus_bits must be even")]
    ModulusNotEven,
    #[error("rotation_interval must be positive")]
    ZeroRotationInterval,
}

impl MintConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.modulus_bits < MIN_MODULUS_BITS {
            return Err(ConfigError::ModulusTooSmall);
        }
        if self.modulus_bits % 2 != 0 {
            return Err(ConfigError::ModulusNotEven);
        }
        if self.rotation_interval.is_zero() {
            return Err(ConfigError::ZeroRotationInterval);
        }
        Ok(())
    }
}

impl Default for MintConfig {
    fn default() -> Self {
        Self {
            rotation_interval: Duration::from_secs(60 * 60 * 24 * 90), // 90 days
            retention_window: Duration::from_secs(60 * 60 * 24 * 365), // one year
            modulus_bits: 3072,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(MintConfig::default().validate().is_ok());
    }

    #[test]
    fn modulus_below_minimum_is_rejected() {
        let mut cfg = MintConfig::default();
        cfg.modulus_bits = 2048;
        assert_eq!(cfg.validate(), Err(ConfigError::ModulusTooSmall));
    }

    #[test]
    fn odd_modulus_is_rejected() {
        let mut cfg = MintConfig::default();
        cfg.modulus_bits = 3073;
        assert_eq!(cfg.validate(), Err(ConfigError::ModulusNotEven));
    }

    #[test]
    fn zero_rotation_interval_is_rejected() {
        let mut cfg = MintConfig::default();
        cfg.rotation_interval = Duration::ZERO;
        assert_eq!(cfg.validate(), Err(ConfigError::ZeroRotationInterval));
    }
}
