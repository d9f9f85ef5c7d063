use crate::{db, error::AppError, models::Role, AppState};
use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use async_trait::async_trait;
use axum::{
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::{
    collections::HashSet,
    sync::Arc,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("password hashing failed: {0}")]
    Hash(password_hash::Error),

    #[error("invalid or expired token: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Token(_) => {
                AppError::Unauthenticated("Could not validate credentials".into())
            }
            AuthError::Hash(e) => AppError::Internal(e.to_string()),
        }
    }
}

// ── Passwords ──────────────────────────────────────────────────────────────

pub fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut rand::thread_rng());
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(AuthError::Hash)
}

/// Constant-time check of `password` against a PHC-format hash. A malformed
/// stored hash verifies as false.
pub fn verify_password(password: &str, hash: &str) -> bool {
    PasswordHash::new(hash)
        .map(|parsed| {
            Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok()
        })
        .unwrap_or(false)
}

// ── Tokens ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User id
    pub sub: String,
    pub email: String,
    pub role: Role,
    pub iat: u64,
    pub exp: u64,
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

pub fn issue_token(
    user_id: i64,
    email: &str,
    role: Role,
    secret: &str,
    ttl: Duration,
) -> Result<String, AuthError> {
    let iat = now_secs();
    let claims = Claims {
        sub: user_id.to_string(),
        email: email.to_owned(),
        role,
        iat,
        exp: iat + ttl.as_secs(),
    };
    Ok(encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?)
}

/// Verify signature and expiry (HS256).
pub fn decode_token(token: &str, secret: &str) -> Result<Claims, AuthError> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )?;
    Ok(data.claims)
}

// ── Caller ─────────────────────────────────────────────────────────────────

/// The authenticated user a request runs as.
#[derive(Debug, Clone)]
pub struct Caller {
    pub user_id: i64,
    pub email: String,
    pub role: Role,
    pub assigned_clients: HashSet<i64>,
}

impl Caller {
    pub fn can_access_client(&self, client_id: i64) -> bool {
        self.role.can_access_all_clients() || self.assigned_clients.contains(&client_id)
    }

    pub fn require_client_access(&self, client_id: i64) -> Result<(), AppError> {
        if self.can_access_client(client_id) {
            Ok(())
        } else {
            Err(AppError::Forbidden(
                "Not authorized to access this client".into(),
            ))
        }
    }

    pub fn require_admin(&self) -> Result<(), AppError> {
        if self.role.is_admin() {
            Ok(())
        } else {
            Err(AppError::Forbidden("Admin role required".into()))
        }
    }
}

// ── AuthUser extractor ─────────────────────────────────────────────────────

/// Extractor that enforces authentication on any handler that includes it as
/// a parameter. The bearer token is verified and the user row re-read, so a
/// deactivated account or a changed role takes effect on the next request.
/// Anything else short-circuits with 401 before the handler runs.
pub struct AuthUser(pub Caller);

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    Arc<AppState>: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let state = Arc::<AppState>::from_ref(state);

        let TypedHeader(Authorization(bearer)) =
            TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, &())
                .await
                .map_err(|_| AppError::Unauthenticated("Not authenticated".into()))?;

        let claims = decode_token(bearer.token(), &state.config.jwt_secret)?;
        let user_id: i64 = claims
            .sub
            .parse()
            .map_err(|_| AppError::Unauthenticated("Could not validate credentials".into()))?;

        let user = db::get_user(&state.db, user_id)
            .await?
            .filter(|u| u.is_active)
            .ok_or_else(|| AppError::Unauthenticated("Could not validate credentials".into()))?;

        let assigned_clients = db::assigned_client_ids(&state.db, user.id)
            .await?
            .into_iter()
            .collect();

        Ok(AuthUser(Caller {
            user_id: user.id,
            email: user.email,
            role: user.role,
            assigned_clients,
        }))
    }
}
