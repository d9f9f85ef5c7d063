use crate::{
    auth::{self, AuthUser},
    db,
    error::AppError,
    models::{LoginForm, TokenResponse, UserResponse},
    AppState,
};
use axum::{
    extract::{Form, State},
    Json,
};
use std::{sync::Arc, time::Duration};

// ── Login ──────────────────────────────────────────────────────────────────

/// POST /auth/token
/// OAuth2 password form (`username` is the e-mail address).
pub async fn login(
    State(state): State<Arc<AppState>>,
    Form(form): Form<LoginForm>,
) -> Result<Json<TokenResponse>, AppError> {
    let user = db::get_user_with_hash(&state.db, form.username.trim()).await?;

    let user = match user {
        Some((user, hash)) if user.is_active && auth::verify_password(&form.password, &hash) => {
            user
        }
        _ => {
            // Use a small artificial delay to blunt brute-force attempts.
            tokio::time::sleep(Duration::from_millis(500)).await;
            tracing::info!(email = %form.username, "login rejected");
            return Err(AppError::Unauthenticated(
                "Incorrect email or password".into(),
            ));
        }
    };

    let access_token = auth::issue_token(
        user.id,
        &user.email,
        user.role,
        &state.config.jwt_secret,
        state.config.access_token_ttl,
    )?;

    tracing::info!(user_id = user.id, role = %user.role, "user logged in");

    Ok(Json(TokenResponse {
        access_token,
        token_type: "bearer".into(),
    }))
}

/// GET /auth/me
pub async fn me(
    AuthUser(caller): AuthUser,
    State(state): State<Arc<AppState>>,
) -> Result<Json<UserResponse>, AppError> {
    let user = db::get_user(&state.db, caller.user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".into()))?;
    let clients = db::assigned_clients(&state.db, user.id).await?;
    Ok(Json(UserResponse::new(user, clients)))
}

/// Create the configured first admin unless that e-mail already exists.
/// Returns whether a user was created.
pub async fn bootstrap_admin(
    pool: &sqlx::SqlitePool,
    email: &str,
    password: &str,
) -> Result<bool, AppError> {
    if db::email_taken(pool, email).await? {
        return Ok(false);
    }
    let hash = auth::hash_password(password)?;
    let user =
        db::create_user(pool, email, Some("Administrator"), &hash, crate::models::Role::Admin)
            .await?;
    tracing::info!(user_id = user.id, email, "bootstrap admin created");
    Ok(true)
}
