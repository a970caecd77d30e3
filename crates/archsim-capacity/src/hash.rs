//! Config fingerprints used as profile cache keys

use crate::error::CapacityError;
use archsim_model::ComponentConfig;
use std::fmt::{self, Display, Formatter};

/// Blake3 digest of a component config's canonical JSON encoding
///
/// Two components with equal configs share a fingerprint regardless of id
/// or label, so their capacity profile is resolved once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConfigHash([u8; 32]);

impl ConfigHash {
    /// Fingerprint a config
    ///
    /// # Errors
    /// Returns error if the config cannot be encoded
    #[inline]
    pub fn of(config: &ComponentConfig) -> Result<Self, CapacityError> {
        let json = serde_json::to_vec(config)?;
        Ok(Self(*blake3::hash(&json).as_bytes()))
    }

    /// Raw digest bytes
    #[inline]
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// First 16 hex chars, for log lines
    #[must_use]
    pub fn short(&self) -> String {
        hex::encode(&self.0[..8])
    }
}

impl Display for ConfigHash {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_configs_share_a_fingerprint() {
        let a = ConfigHash::of(&ComponentConfig::app_server(3)).unwrap();
        let b = ConfigHash::of(&ComponentConfig::app_server(3)).unwrap();
        let c = ConfigHash::of(&ComponentConfig::app_server(4)).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn display_is_full_hex() {
        let hash = ConfigHash::of(&ComponentConfig::Client).unwrap();
        assert_eq!(hash.to_string().len(), 64);
        assert!(hash.to_string().starts_with(&hash.short()));
    }
}
