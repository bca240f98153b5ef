//! Authentication and token lifecycle.
//!
//! Session tokens carry the user's stored password hash as their subject.
//! Every token-gated check re-reads the current hash and compares it in
//! constant time, so changing a password invalidates all tokens issued
//! before the change without any revocation list.
//!
//! Failures are reported as a single [`AcsysError::Authentication`] whether
//! the username is unknown, the password is wrong or the token is bad.

use crate::Result;
use crate::drivers::DataDriver;
use crate::error::AcsysError;
use crate::models::{Role, USERS_TABLE, User, UserProfile};
use crate::query::{Operator, QueryOptions};
use crate::security::{
    Argon2Settings, PasswordHasherService, TokenIssuer, TokenPair, TokenType, constant_time_eq,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use zeroize::Zeroizing;

/// Result of a successful login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    #[serde(flatten)]
    pub tokens: TokenPair,
    pub profile: UserProfile,
}

/// Password checks, token issuance and user provisioning.
pub struct AuthService {
    driver: Arc<dyn DataDriver>,
    hasher: PasswordHasherService,
    tokens: TokenIssuer,
    /// Hash verified against when the username is unknown
    dummy_hash: String,
}

impl std::fmt::Debug for AuthService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthService")
            .field("backend", &self.driver.database_type())
            .field("tokens", &self.tokens)
            .finish_non_exhaustive()
    }
}

impl AuthService {
    /// Builds the service. Hashes one random password up front so that
    /// unknown usernames cost the same as wrong passwords.
    pub async fn new(
        driver: Arc<dyn DataDriver>,
        tokens: TokenIssuer,
        argon2: &Argon2Settings,
    ) -> Result<Self> {
        let hasher = PasswordHasherService::new(argon2)?;

        let filler = Zeroizing::new(uuid::Uuid::new_v4().to_string());
        let dummy_hash = hasher.hash(&filler).await?;

        Ok(Self {
            driver,
            hasher,
            tokens,
            dummy_hash,
        })
    }

    /// Token issuer shared with file storage.
    pub fn tokens(&self) -> &TokenIssuer {
        &self.tokens
    }

    /// Checks credentials and issues a token pair.
    ///
    /// # Errors
    /// Returns `Authentication` for unknown usernames and wrong passwords
    /// alike.
    pub async fn authenticate(&self, username: &str, password: &str) -> Result<Session> {
        let user = self.find_by_username(username).await?;

        let (stored_hash, user) = match user {
            Some(user) => (user.password_hash.clone(), Some(user)),
            None => (self.dummy_hash.clone(), None),
        };

        let verified = self.hasher.verify(password, &stored_hash).await?;

        match user {
            Some(user) if verified => {
                let tokens = self.tokens.issue_pair(&user.id, &user.password_hash)?;
                tracing::info!("User {} signed in", user.id);
                Ok(Session {
                    tokens,
                    profile: user.profile(),
                })
            }
            _ => {
                tracing::warn!("Authentication failed");
                Err(AcsysError::Authentication)
            }
        }
    }

    /// Exchanges a valid refresh token for a new pair.
    ///
    /// The token's signature, expiry and type are checked, then its subject
    /// is compared with the user's current password hash.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair> {
        let claims = self.tokens.verify_session(refresh_token, TokenType::Refresh)?;
        let user_id = claims.uid.as_deref().ok_or(AcsysError::Authentication)?;

        let current_hash = match self.driver.verify_password(user_id).await {
            Ok(hash) => hash,
            Err(AcsysError::NotFound { .. }) => {
                tracing::warn!("Refresh token names an unknown user");
                return Err(AcsysError::Authentication);
            }
            Err(e) => return Err(e),
        };

        if !constant_time_eq(current_hash.as_bytes(), claims.sub.as_bytes()) {
            tracing::warn!("Refresh token predates a password change");
            return Err(AcsysError::Authentication);
        }

        self.tokens.issue_pair(user_id, &current_hash)
    }

    /// Resolves an access token to its user.
    ///
    /// # Errors
    /// Returns `Authentication` for invalid, expired or superseded tokens.
    pub async fn authorize(&self, access_token: &str) -> Result<User> {
        let claims = self.tokens.verify_session(access_token, TokenType::Access)?;
        let user_id = claims.uid.as_deref().ok_or(AcsysError::Authentication)?;

        let user = self
            .find_one(QueryOptions::all().with_filter("acsys_id", Operator::Eq, user_id))
            .await?
            .ok_or_else(|| {
                tracing::warn!("Access token names an unknown user");
                AcsysError::Authentication
            })?;

        if !constant_time_eq(user.password_hash.as_bytes(), claims.sub.as_bytes()) {
            tracing::warn!("Access token predates a password change");
            return Err(AcsysError::Authentication);
        }

        Ok(user)
    }

    /// Resolves an access token and requires the Administrator role.
    pub async fn authorize_admin(&self, access_token: &str) -> Result<User> {
        let user = self.authorize(access_token).await?;
        if user.role != Role::Administrator {
            tracing::warn!("User {} lacks the Administrator role", user.id);
            return Err(AcsysError::insufficient_privileges(Role::Administrator.to_string()));
        }
        Ok(user)
    }

    /// Provisions a user with a hashed password and a fresh id.
    ///
    /// # Errors
    /// Returns `InvalidQuery` for empty credentials or a taken username.
    pub async fn create_user(
        &self,
        username: &str,
        password: &str,
        role: Role,
        email: &str,
    ) -> Result<UserProfile> {
        if username.trim().is_empty() {
            return Err(AcsysError::invalid_query("Username cannot be empty"));
        }
        if password.is_empty() {
            return Err(AcsysError::invalid_query("Password cannot be empty"));
        }
        if self.find_by_username(username).await?.is_some() {
            return Err(AcsysError::invalid_query("Username is already taken"));
        }

        let user = User {
            id: uuid::Uuid::new_v4().to_string(),
            username: username.to_string(),
            password_hash: self.hasher.hash(password).await?,
            role,
            mode: String::new(),
            email: email.to_string(),
        };

        self.driver.insert_doc(USERS_TABLE, &user.to_record()?).await?;
        tracing::info!("Created user {} with role {}", user.id, user.role);

        Ok(user.profile())
    }

    /// Replaces a user's password hash, invalidating their tokens.
    ///
    /// # Errors
    /// Returns `NotFound` if no user has the id.
    pub async fn change_password(&self, user_id: &str, new_password: &str) -> Result<()> {
        if new_password.is_empty() {
            return Err(AcsysError::invalid_query("Password cannot be empty"));
        }

        let hash = self.hasher.hash(new_password).await?;
        let mut changes = crate::models::Record::new();
        changes.insert("acsys_cd".to_string(), serde_json::Value::String(hash));

        let options = QueryOptions::all().with_filter("acsys_id", Operator::Eq, user_id);
        let updated = self.driver.update_docs(USERS_TABLE, &options, &changes).await?;
        if updated == 0 {
            return Err(AcsysError::not_found("user"));
        }

        tracing::info!("Password changed for user {}", user_id);
        Ok(())
    }

    /// Whether any Administrator exists.
    pub async fn has_admin(&self) -> Result<bool> {
        let options = QueryOptions::all()
            .with_filter("role", Operator::Eq, Role::Administrator.to_string())
            .with_limit(1);
        Ok(!self.driver.get_users(&options).await?.is_empty())
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>> {
        self.find_one(QueryOptions::all().with_filter("username", Operator::Eq, username))
            .await
    }

    async fn find_one(&self, options: QueryOptions) -> Result<Option<User>> {
        let users = self.driver.get_users(&options.with_limit(1)).await?;
        Ok(users.into_iter().next())
    }
}

#[cfg(all(test, feature = "sqlite"))]
mod tests {
    use super::*;
    use crate::drivers::sqlite::SqliteDriver;
    use crate::security::SigningSecret;
    use chrono::Duration;

    async fn service() -> AuthService {
        let driver = SqliteDriver::new("sqlite::memory:").await.unwrap();
        driver.initialize().await.unwrap();
        let tokens = TokenIssuer::new(
            &SigningSecret::new("unit-test-secret-unit-test-secret!!"),
            Duration::hours(24),
            Duration::hours(72),
        )
        .unwrap();
        AuthService::new(Arc::new(driver), tokens, &Argon2Settings::minimal())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_auth_login_and_authorize() {
        let auth = service().await;
        auth.create_user("admin", "hunter2", Role::Administrator, "a@example.com")
            .await
            .unwrap();

        let session = auth.authenticate("admin", "hunter2").await.unwrap();
        assert_eq!(session.profile.username, "admin");

        let user = auth.authorize(&session.tokens.access_token).await.unwrap();
        assert_eq!(user.username, "admin");
        assert!(auth.authorize_admin(&session.tokens.access_token).await.is_ok());

        // Refresh tokens are not access tokens.
        let err = auth
            .authorize(&session.tokens.refresh_token)
            .await
            .unwrap_err();
        assert!(matches!(err, AcsysError::Authentication));
    }

    #[tokio::test]
    async fn test_auth_failures_are_uniform() {
        let auth = service().await;
        auth.create_user("admin", "hunter2", Role::Administrator, "")
            .await
            .unwrap();

        let wrong_password = auth.authenticate("admin", "nope").await.unwrap_err();
        let unknown_user = auth.authenticate("ghost", "hunter2").await.unwrap_err();

        assert!(matches!(wrong_password, AcsysError::Authentication));
        assert!(matches!(unknown_user, AcsysError::Authentication));
        assert_eq!(wrong_password.to_string(), unknown_user.to_string());
        assert_eq!(wrong_password.caller_message(), unknown_user.caller_message());
    }

    #[tokio::test]
    async fn test_auth_duplicate_username_rejected() {
        let auth = service().await;
        auth.create_user("sam", "pw", Role::Standard, "").await.unwrap();
        let err = auth
            .create_user("sam", "other", Role::Viewer, "")
            .await
            .unwrap_err();
        assert!(matches!(err, AcsysError::InvalidQuery { .. }));
    }

    #[tokio::test]
    async fn test_auth_non_admin_is_insufficient() {
        let auth = service().await;
        auth.create_user("sam", "pw", Role::Standard, "").await.unwrap();
        let session = auth.authenticate("sam", "pw").await.unwrap();

        let err = auth
            .authorize_admin(&session.tokens.access_token)
            .await
            .unwrap_err();
        assert!(matches!(err, AcsysError::InsufficientPrivileges { .. }));
    }

    #[tokio::test]
    async fn test_auth_has_admin() {
        let auth = service().await;
        assert!(!auth.has_admin().await.unwrap());
        auth.create_user("sam", "pw", Role::Standard, "").await.unwrap();
        assert!(!auth.has_admin().await.unwrap());
        auth.create_user("root", "pw", Role::Administrator, "")
            .await
            .unwrap();
        assert!(auth.has_admin().await.unwrap());
    }

    #[tokio::test]
    async fn test_auth_change_password_unknown_user() {
        let auth = service().await;
        let err = auth.change_password("missing", "pw").await.unwrap_err();
        assert!(matches!(err, AcsysError::NotFound { .. }));
    }
}
