//! Argon2id password hashing.
//!
//! Hashes are PHC strings, so the parameters used to create a hash travel
//! with it and verification keeps working after the configured cost changes.
//! Both operations run on the blocking thread pool.

use crate::Result;
use crate::error::AcsysError;
use argon2::{Algorithm, Argon2, Params, Version};
use password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

/// Salt length in bytes.
const SALT_LEN: usize = 16;

/// Argon2id cost parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Argon2Settings {
    /// Memory cost in KiB
    pub memory_kib: u32,
    /// Number of passes
    pub iterations: u32,
    /// Degree of parallelism
    pub parallelism: u32,
}

impl Default for Argon2Settings {
    fn default() -> Self {
        Self {
            memory_kib: 19_456,
            iterations: 2,
            parallelism: 1,
        }
    }
}

impl Argon2Settings {
    /// Cheapest accepted cost. Only for tests.
    pub fn minimal() -> Self {
        Self {
            memory_kib: Params::MIN_M_COST,
            iterations: Params::MIN_T_COST,
            parallelism: Params::MIN_P_COST,
        }
    }

    /// Checked Argon2 parameters.
    pub fn params(&self) -> Result<Params> {
        Params::new(self.memory_kib, self.iterations, self.parallelism, None).map_err(|e| {
            AcsysError::configuration(format!("Invalid Argon2 parameters: {}", e))
        })
    }
}

/// Hashes and verifies user passwords.
#[derive(Debug, Clone)]
pub struct PasswordHasherService {
    params: Params,
}

impl PasswordHasherService {
    pub fn new(settings: &Argon2Settings) -> Result<Self> {
        Ok(Self {
            params: settings.params()?,
        })
    }

    fn argon2(params: Params) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, params)
    }

    /// Hashes a password into a PHC string with a fresh random salt.
    pub async fn hash(&self, password: &str) -> Result<String> {
        let password = Zeroizing::new(password.to_owned());
        let params = self.params.clone();

        tokio::task::spawn_blocking(move || {
            let mut salt_bytes = [0u8; SALT_LEN];
            rand::fill(&mut salt_bytes);
            let salt = SaltString::encode_b64(&salt_bytes)
                .map_err(|e| AcsysError::configuration(format!("Invalid salt: {}", e)))?;

            Self::argon2(params)
                .hash_password(password.as_bytes(), &salt)
                .map(|hash| hash.to_string())
                .map_err(|e| AcsysError::configuration(format!("Password hashing failed: {}", e)))
        })
        .await
        .map_err(|e| AcsysError::io("Password hashing task failed", std::io::Error::other(e)))?
    }

    /// Verifies a password against a stored PHC string.
    ///
    /// Unparseable hashes verify as `false`.
    pub async fn verify(&self, password: &str, stored_hash: &str) -> Result<bool> {
        let password = Zeroizing::new(password.to_owned());
        let stored_hash = stored_hash.to_owned();
        let params = self.params.clone();

        tokio::task::spawn_blocking(move || {
            let Ok(parsed) = PasswordHash::new(&stored_hash) else {
                tracing::warn!("Stored password hash is not a valid PHC string");
                return false;
            };
            Self::argon2(params)
                .verify_password(password.as_bytes(), &parsed)
                .is_ok()
        })
        .await
        .map_err(|e| AcsysError::io("Password verification task failed", std::io::Error::other(e)))
    }
}
