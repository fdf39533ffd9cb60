//! Registration, login and token sessions
//!
//! Access tokens are short-lived HS256 JWTs. Refresh tokens are signed with a
//! separate secret; only a SHA-256 digest of the current one is stored, and
//! each refresh rotates it.

use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::aggregates::{NewUser, ProfileUpdate, Role, User};
use crate::error::{EcommerceError, Result};
use crate::payment::PaymentGateway;
use crate::store::{Store, UserStore};

const ACCESS_TOKEN_TTL_SECS: i64 = 60 * 60;
const REFRESH_TOKEN_TTL_DAYS: i64 = 7;
const MIN_PASSWORD_LEN: usize = 8;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub email: String,
    pub role: Role,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Debug, Serialize, Deserialize)]
struct RefreshClaims {
    sub: Uuid,
    jti: Uuid,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: &'static str,
    pub expires_in: i64,
    pub user: User,
}

#[derive(Debug, Clone)]
pub struct Registration {
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
}

pub fn hash_password(password: &str) -> Result<String> {
    use argon2::password_hash::rand_core::OsRng;
    use argon2::password_hash::SaltString;
    use argon2::{Argon2, PasswordHasher};
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| EcommerceError::internal(format!("password hashing failed: {e}")))?;
    Ok(hash.to_string())
}

pub fn verify_password(password: &str, hash: &str) -> bool {
    use argon2::{Argon2, PasswordHash, PasswordVerifier};
    let Ok(parsed) = PasswordHash::new(hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

fn digest(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

#[derive(Clone)]
pub struct AuthService {
    store: Arc<dyn Store>,
    gateway: Option<Arc<dyn PaymentGateway>>,
    jwt_secret: String,
    refresh_secret: String,
}

impl AuthService {
    pub fn new(
        store: Arc<dyn Store>,
        gateway: Option<Arc<dyn PaymentGateway>>,
        jwt_secret: impl Into<String>,
        refresh_secret: impl Into<String>,
    ) -> Self {
        Self {
            store,
            gateway,
            jwt_secret: jwt_secret.into(),
            refresh_secret: refresh_secret.into(),
        }
    }

    pub async fn register(&self, registration: Registration) -> Result<TokenPair> {
        let user = self.create_user(registration, Role::User).await?;
        let user = self.attach_billing_customer(user).await;
        tracing::info!(user_id = %user.id, "user registered");
        self.issue(user).await
    }

    async fn create_user(&self, registration: Registration, role: Role) -> Result<User> {
        let email = normalize_email(&registration.email);
        if !email.contains('@') {
            return Err(EcommerceError::validation("A valid email is required"));
        }
        if registration.password.chars().count() < MIN_PASSWORD_LEN {
            return Err(EcommerceError::validation(format!(
                "Password must be at least {MIN_PASSWORD_LEN} characters"
            )));
        }
        if self.store.user_by_email(&email).await?.is_some() {
            return Err(EcommerceError::conflict("EMAIL_EXISTS", "Email is already registered"));
        }
        self.store
            .insert_user(NewUser {
                email,
                password_hash: hash_password(&registration.password)?,
                first_name: registration.first_name.trim().to_string(),
                last_name: registration.last_name.trim().to_string(),
                role,
            })
            .await
    }

    /// Creates the provider customer. A failure leaves the user without one.
    async fn attach_billing_customer(&self, mut user: User) -> User {
        let Some(gateway) = &self.gateway else {
            return user;
        };
        let name = format!("{} {}", user.first_name, user.last_name);
        match gateway.create_customer(&user.email, name.trim(), user.id).await {
            Ok(customer_id) => match self.store.set_billing_id(user.id, &customer_id).await {
                Ok(()) => user.billing_id = Some(customer_id),
                Err(e) => tracing::error!(user_id = %user.id, error = %e, "failed to store billing id"),
            },
            Err(e) => tracing::warn!(user_id = %user.id, error = %e, "billing customer not created"),
        }
        user
    }

    /// Creates the admin account on first start when it does not exist yet.
    pub async fn ensure_admin(&self, email: &str, password: &str) -> Result<()> {
        if self.store.user_by_email(&normalize_email(email)).await?.is_some() {
            return Ok(());
        }
        let user = self
            .create_user(
                Registration {
                    email: email.to_string(),
                    password: password.to_string(),
                    first_name: "Admin".into(),
                    last_name: String::new(),
                },
                Role::Admin,
            )
            .await?;
        tracing::info!(user_id = %user.id, email = %user.email, "admin account created");
        Ok(())
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<TokenPair> {
        let email = normalize_email(email);
        let user = match self.store.user_by_email(&email).await? {
            Some(user) if verify_password(password, &user.password_hash) => user,
            _ => {
                tracing::debug!(email, "login rejected");
                return Err(EcommerceError::unauthorized("Invalid email or password"));
            }
        };
        tracing::info!(user_id = %user.id, "user logged in");
        self.issue(user).await
    }

    /// Exchanges the current refresh token for a new pair.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair> {
        let claims = jsonwebtoken::decode::<RefreshClaims>(
            refresh_token,
            &DecodingKey::from_secret(self.refresh_secret.as_bytes()),
            &Validation::default(),
        )
        .map_err(|e| {
            tracing::debug!("refresh token rejected: {e}");
            EcommerceError::unauthorized("Invalid or expired refresh token")
        })?
        .claims;

        let stored = self.store.refresh_token(claims.sub).await?;
        match stored {
            Some((hash, expires_at)) if hash == digest(refresh_token) && expires_at > Utc::now() => {}
            _ => {
                tracing::warn!(user_id = %claims.sub, "refresh token not current");
                return Err(EcommerceError::unauthorized("Invalid or expired refresh token"));
            }
        }
        let user = self
            .store
            .user(claims.sub)
            .await?
            .ok_or_else(|| EcommerceError::unauthorized("Invalid or expired refresh token"))?;
        self.issue(user).await
    }

    pub async fn logout(&self, user_id: Uuid) -> Result<()> {
        if self.store.revoke_refresh_token(user_id).await? {
            tracing::info!(%user_id, "user logged out");
        }
        Ok(())
    }

    pub async fn me(&self, user_id: Uuid) -> Result<User> {
        self.store
            .user(user_id)
            .await?
            .ok_or(EcommerceError::NotFound("User"))
    }

    /// Trims the provided names; an empty first name is refused.
    pub async fn update_profile(&self, user_id: Uuid, update: ProfileUpdate) -> Result<User> {
        let update = ProfileUpdate {
            first_name: update.first_name.map(|n| n.trim().to_string()),
            last_name: update.last_name.map(|n| n.trim().to_string()),
        };
        if update.is_empty() {
            return Err(EcommerceError::validation("Nothing to update"));
        }
        if update.first_name.as_deref() == Some("") {
            return Err(EcommerceError::validation("First name cannot be empty"));
        }
        let user = self
            .store
            .update_profile(user_id, &update)
            .await?
            .ok_or(EcommerceError::NotFound("User"))?;
        tracing::info!(%user_id, "profile updated");
        Ok(user)
    }

    /// Replaces the password after checking the current one. Every session
    /// must log in again afterwards.
    pub async fn change_password(&self, user_id: Uuid, current: &str, new: &str) -> Result<()> {
        let user = self.me(user_id).await?;
        if !verify_password(current, &user.password_hash) {
            tracing::warn!(%user_id, "password change with wrong current password");
            return Err(EcommerceError::unauthorized("Current password is incorrect"));
        }
        if new.chars().count() < MIN_PASSWORD_LEN {
            return Err(EcommerceError::validation(format!(
                "Password must be at least {MIN_PASSWORD_LEN} characters"
            )));
        }
        if !self.store.replace_password(user_id, &hash_password(new)?).await? {
            return Err(EcommerceError::NotFound("User"));
        }
        tracing::info!(%user_id, "password changed, refresh token revoked");
        Ok(())
    }

    pub fn verify_access(&self, token: &str) -> Result<Claims> {
        jsonwebtoken::decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.jwt_secret.as_bytes()),
            &Validation::default(),
        )
        .map(|data| data.claims)
        .map_err(|e| {
            tracing::debug!("access token rejected: {e}");
            EcommerceError::unauthorized("Invalid or expired token")
        })
    }

    async fn issue(&self, user: User) -> Result<TokenPair> {
        let now = Utc::now();
        let claims = Claims {
            sub: user.id,
            email: user.email.clone(),
            role: user.role,
            iat: now.timestamp(),
            exp: (now + Duration::seconds(ACCESS_TOKEN_TTL_SECS)).timestamp(),
        };
        let access_token = jsonwebtoken::encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.jwt_secret.as_bytes()),
        )
        .map_err(|e| EcommerceError::internal(format!("token encoding failed: {e}")))?;

        let refresh_expires = now + Duration::days(REFRESH_TOKEN_TTL_DAYS);
        let refresh_claims = RefreshClaims {
            sub: user.id,
            jti: Uuid::new_v4(),
            iat: now.timestamp(),
            exp: refresh_expires.timestamp(),
        };
        let refresh_token = jsonwebtoken::encode(
            &Header::default(),
            &refresh_claims,
            &EncodingKey::from_secret(self.refresh_secret.as_bytes()),
        )
        .map_err(|e| EcommerceError::internal(format!("token encoding failed: {e}")))?;
        self.store
            .store_refresh_token(user.id, &digest(&refresh_token), refresh_expires)
            .await?;

        Ok(TokenPair {
            access_token,
            refresh_token,
            token_type: "Bearer",
            expires_in: ACCESS_TOKEN_TTL_SECS,
            user,
        })
    }
}
