//! Process-wide signing secret with automatic memory zeroing.
//!
//! # Security
//! - Secret bytes live in a `Zeroizing` container and are cleared on drop
//! - `Debug` never prints the secret

use serde::{Deserialize, Deserializer};
use zeroize::Zeroizing;

/// Shortest accepted signing secret, in bytes.
pub const MIN_SECRET_LEN: usize = 32;

/// Token signing secret.
///
/// # Example
///
/// ```rust
/// use acsys_core::security::SigningSecret;
///
/// let secret = SigningSecret::new("0123456789abcdef0123456789abcdef");
/// assert!(secret.validate().is_ok());
/// assert!(!format!("{:?}", secret).contains("0123"));
/// ```
#[derive(Clone)]
pub struct SigningSecret(Zeroizing<Vec<u8>>);

impl SigningSecret {
    /// Wraps secret material.
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self(Zeroizing::new(secret.into()))
    }

    /// Generates a random secret, for first-run setups and tests.
    pub fn generate() -> Self {
        let mut bytes = Zeroizing::new(vec![0u8; MIN_SECRET_LEN * 2]);
        rand::fill(bytes.as_mut_slice());
        Self(bytes)
    }

    /// Raw secret bytes.
    pub fn expose(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Rejects secrets too short to sign tokens with.
    pub fn validate(&self) -> crate::Result<()> {
        if self.len() < MIN_SECRET_LEN {
            return Err(crate::error::AcsysError::configuration(format!(
                "auth.secret must be at least {} bytes",
                MIN_SECRET_LEN
            )));
        }
        Ok(())
    }
}

impl std::fmt::Debug for SigningSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningSecret")
            .field("len", &self.len())
            // Note: secret bytes are intentionally omitted
            .finish_non_exhaustive()
    }
}

impl<'de> Deserialize<'de> for SigningSecret {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Zeroizing::new(String::deserialize(deserializer)?);
        Ok(Self::new(raw.as_bytes()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secret_debug_is_redacted() {
        let secret = SigningSecret::new("super-secret-value-that-is-long-enough");
        let debug = format!("{:?}", secret);
        assert!(!debug.contains("super-secret"));
        assert!(debug.contains("len"));
    }

    #[test]
    fn test_secret_length_validation() {
        assert!(SigningSecret::new("short").validate().is_err());
        assert!(SigningSecret::new("x".repeat(MIN_SECRET_LEN)).validate().is_ok());
        assert!(SigningSecret::generate().validate().is_ok());
    }

    #[test]
    fn test_generated_secrets_differ() {
        assert_ne!(
            SigningSecret::generate().expose(),
            SigningSecret::generate().expose()
        );
    }

    #[test]
    fn test_secret_deserializes_from_string() {
        let secret: SigningSecret =
            serde_json::from_str("\"0123456789abcdef0123456789abcdef\"").unwrap();
        assert_eq!(secret.len(), 32);
    }
}
