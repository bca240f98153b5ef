//! HS256 session tokens and signed file links.
//!
//! Tokens are stateless: validity is decided by the signature, the embedded
//! expiry and, for session tokens, the subject. The subject of a session
//! token is the user's stored password hash, so changing the password
//! invalidates every token issued before the change.

use super::SigningSecret;
use crate::Result;
use crate::error::AcsysError;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

/// Longest accepted access or refresh token lifetime, one year.
pub const MAX_SESSION_TTL_HOURS: i64 = 8_760;

/// Longest accepted file link lifetime, seven days.
pub const MAX_LINK_TTL_SECS: i64 = 604_800;

/// Purpose a token was issued for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
    File,
}

/// JWT claims shared by session tokens and file links.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Password hash for session tokens, file path for file links
    pub sub: String,
    /// User id, absent on file links
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
    pub typ: TokenType,
    pub iat: i64,
    pub exp: i64,
}

/// Access and refresh token pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub access_expires_at: DateTime<Utc>,
    pub refresh_expires_at: DateTime<Utc>,
}

/// Signs and verifies tokens with the process secret.
#[derive(Clone)]
pub struct TokenIssuer {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl std::fmt::Debug for TokenIssuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenIssuer")
            .field("access_ttl", &self.access_ttl)
            .field("refresh_ttl", &self.refresh_ttl)
            // Note: keys are intentionally omitted
            .finish_non_exhaustive()
    }
}

impl TokenIssuer {
    /// Creates an issuer with the given session lifetimes.
    ///
    /// # Errors
    /// Returns a configuration error for short secrets or TTLs that are not
    /// positive or exceed [`MAX_SESSION_TTL_HOURS`].
    pub fn new(secret: &SigningSecret, access_ttl: Duration, refresh_ttl: Duration) -> Result<Self> {
        secret.validate()?;
        if access_ttl <= Duration::zero() || refresh_ttl <= Duration::zero() {
            return Err(AcsysError::configuration("Token lifetimes must be positive"));
        }
        let max = Duration::try_hours(MAX_SESSION_TTL_HOURS).unwrap_or(Duration::MAX);
        if access_ttl > max || refresh_ttl > max {
            return Err(AcsysError::configuration(format!(
                "Token lifetimes cannot exceed {} hours",
                MAX_SESSION_TTL_HOURS
            )));
        }

        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret.expose()),
            decoding_key: DecodingKey::from_secret(secret.expose()),
            access_ttl,
            refresh_ttl,
        })
    }

    pub fn access_ttl(&self) -> Duration {
        self.access_ttl
    }

    pub fn refresh_ttl(&self) -> Duration {
        self.refresh_ttl
    }

    /// Signs arbitrary claims.
    pub fn encode_claims(&self, claims: &Claims) -> Result<String> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding_key).map_err(|e| {
            AcsysError::configuration(format!("Failed to sign token: {}", e))
        })
    }

    /// Issues a fresh access/refresh pair for a user.
    pub fn issue_pair(&self, user_id: &str, password_hash: &str) -> Result<TokenPair> {
        let now = Utc::now();
        let access_expires_at = expiry_after(now, self.access_ttl)?;
        let refresh_expires_at = expiry_after(now, self.refresh_ttl)?;

        let session_claims = |typ, expires_at: DateTime<Utc>| Claims {
            sub: password_hash.to_string(),
            uid: Some(user_id.to_string()),
            typ,
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
        };

        Ok(TokenPair {
            access_token: self.encode_claims(&session_claims(TokenType::Access, access_expires_at))?,
            refresh_token: self
                .encode_claims(&session_claims(TokenType::Refresh, refresh_expires_at))?,
            access_expires_at,
            refresh_expires_at,
        })
    }

    /// Verifies the signature only, leaving expiry to the caller.
    fn decode_signed(&self, token: &str) -> jsonwebtoken::errors::Result<Claims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.leeway = 0;

        decode::<Claims>(token, &self.decoding_key, &validation).map(|data| data.claims)
    }

    /// Verifies a session token of the expected type.
    ///
    /// Every failure is the same `Authentication` error, whether the token
    /// was malformed, forged, expired or of the wrong type.
    pub fn verify_session(&self, token: &str, expected: TokenType) -> Result<Claims> {
        let claims = self.decode_signed(token).map_err(|e| {
            tracing::debug!("Session token rejected: {:?}", e.kind());
            AcsysError::Authentication
        })?;

        if claims.typ != expected || claims.typ == TokenType::File || claims.uid.is_none() {
            tracing::debug!("Session token has unexpected type");
            return Err(AcsysError::Authentication);
        }

        if claims.exp <= Utc::now().timestamp() {
            tracing::debug!("Session token expired");
            return Err(AcsysError::Authentication);
        }

        Ok(claims)
    }

    /// Signs a link granting retrieval of `path` until `expires_at`.
    pub fn sign_file_link(&self, path: &str, expires_at: DateTime<Utc>) -> Result<String> {
        self.encode_claims(&Claims {
            sub: path.to_string(),
            uid: None,
            typ: TokenType::File,
            iat: Utc::now().timestamp(),
            exp: expires_at.timestamp(),
        })
    }

    /// Resolves a file link to the path it binds.
    ///
    /// # Errors
    /// - `LinkExpired` if the signature is valid but the expiry has passed
    /// - `InvalidLink` for anything else
    pub fn resolve_file_link(&self, token: &str) -> Result<String> {
        let claims = self
            .decode_signed(token)
            .map_err(|_| AcsysError::InvalidLink)?;

        if claims.typ != TokenType::File {
            return Err(AcsysError::InvalidLink);
        }

        if claims.exp <= Utc::now().timestamp() {
            return Err(AcsysError::LinkExpired);
        }

        Ok(claims.sub)
    }
}

/// `now + lifetime`, failing instead of overflowing.
pub fn expiry_after(now: DateTime<Utc>, lifetime: Duration) -> Result<DateTime<Utc>> {
    now.checked_add_signed(lifetime)
        .ok_or_else(|| AcsysError::invalid_query("Token lifetime is out of range"))
}
