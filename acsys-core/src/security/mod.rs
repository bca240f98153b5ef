//! Security primitives: signing secret, password hashing and tokens.
//!
//! # Security Guarantees
//! - The signing secret is stored in a `Zeroizing` container
//! - Passwords are copied into zeroizing buffers before hashing
//! - Token failures never reveal which check failed
//!
//! # Module Structure
//! - `secret`: Process-wide signing secret
//! - `passwords`: Argon2id hashing on the blocking thread pool
//! - `tokens`: HS256 session tokens and signed file links

mod passwords;
mod secret;
mod tokens;

pub use passwords::{Argon2Settings, PasswordHasherService};
pub use secret::{MIN_SECRET_LEN, SigningSecret};
pub use tokens::{
    Claims, MAX_LINK_TTL_SECS, MAX_SESSION_TTL_HOURS, TokenIssuer, TokenPair, TokenType, expiry_after,
};

/// Compares two byte strings in constant time.
pub fn constant_time_eq(left: &[u8], right: &[u8]) -> bool {
    use subtle::ConstantTimeEq;
    left.ct_eq(right).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq(b"same-hash", b"same-hash"));
        assert!(!constant_time_eq(b"same-hash", b"other-hash"));
        assert!(!constant_time_eq(b"", b"x"));
    }
}
