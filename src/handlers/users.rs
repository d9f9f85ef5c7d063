use crate::{
    auth::{self, AuthUser},
    db::{self, UserChanges},
    error::{conflict_on_unique, AppError},
    models::{CreateUserRequest, Role, UpdateUserRequest, User, UserResponse},
    AppState,
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use sqlx::SqlitePool;
use std::sync::Arc;

const MIN_PASSWORD_LEN: usize = 8;

fn parse_role(raw: &str) -> Result<Role, AppError> {
    raw.parse().map_err(AppError::Validation)
}

fn validate_email(raw: &str) -> Result<String, AppError> {
    let email = raw.trim().to_lowercase();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(email),
        _ => Err(AppError::Validation(format!("Invalid email address: {raw}"))),
    }
}

fn validate_password(password: &str) -> Result<(), AppError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::Validation(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    Ok(())
}

async fn respond(pool: &SqlitePool, user: User) -> Result<Json<UserResponse>, AppError> {
    let clients = db::assigned_clients(pool, user.id).await?;
    Ok(Json(UserResponse::new(user, clients)))
}

/// GET /users
pub async fn list_users(
    AuthUser(caller): AuthUser,
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<UserResponse>>, AppError> {
    caller.require_admin()?;
    let users = db::list_users(&state.db).await?;

    let mut out = Vec::with_capacity(users.len());
    for user in users {
        let clients = db::assigned_clients(&state.db, user.id).await?;
        out.push(UserResponse::new(user, clients));
    }
    Ok(Json(out))
}

/// GET /users/:id
pub async fn get_user(
    AuthUser(caller): AuthUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<UserResponse>, AppError> {
    caller.require_admin()?;
    let user = db::get_user(&state.db, id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".into()))?;
    respond(&state.db, user).await
}

/// POST /users
pub async fn create_user(
    AuthUser(caller): AuthUser,
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<UserResponse>), AppError> {
    caller.require_admin()?;

    let email = validate_email(&req.email)?;
    let role = match req.role.as_deref() {
        Some(raw) => parse_role(raw)?,
        None => Role::ClientManager,
    };
    validate_password(&req.password)?;
    if db::email_taken(&state.db, &email).await? {
        return Err(AppError::Validation("Email already registered".into()));
    }

    let hash = auth::hash_password(&req.password)?;
    let name = req.name.as_deref().map(str::trim).filter(|n| !n.is_empty());
    let user = db::create_user(&state.db, &email, name, &hash, role)
        .await
        .map_err(|e| conflict_on_unique(e, "Email already registered"))?;

    tracing::info!(user_id = user.id, role = %role, "user created");
    Ok((StatusCode::CREATED, respond(&state.db, user).await?))
}

/// PUT /users/:id
/// Only the supplied fields change. `clients`, when present, replaces the
/// assigned-client set.
pub async fn update_user(
    AuthUser(caller): AuthUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(req): Json<UpdateUserRequest>,
) -> Result<Json<UserResponse>, AppError> {
    caller.require_admin()?;

    let existing = db::get_user(&state.db, id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".into()))?;

    let email = req.email.as_deref().map(validate_email).transpose()?;
    if let Some(email) = &email {
        if *email != existing.email.to_lowercase() && db::email_taken(&state.db, email).await? {
            return Err(AppError::Validation("Email already registered".into()));
        }
    }
    let role = req.role.as_deref().map(parse_role).transpose()?;
    let hash = match req.password.as_deref() {
        Some(password) => {
            validate_password(password)?;
            Some(auth::hash_password(password)?)
        }
        None => None,
    };

    let changes = UserChanges {
        email: email.as_deref(),
        name: req.name.as_deref().map(str::trim),
        hashed_password: hash.as_deref(),
        role,
        is_active: req.is_active,
    };
    let user = db::update_user(&state.db, id, &changes)
        .await
        .map_err(|e| conflict_on_unique(e, "Email already registered"))?
        .ok_or_else(|| AppError::NotFound("User not found".into()))?;

    if let Some(client_ids) = &req.clients {
        db::set_assigned_clients(&state.db, id, client_ids).await?;
    }

    tracing::info!(user_id = id, "user updated");
    respond(&state.db, user).await
}

/// DELETE /users/:id
pub async fn delete_user(
    AuthUser(caller): AuthUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<StatusCode, AppError> {
    caller.require_admin()?;
    if id == caller.user_id {
        return Err(AppError::Validation("You cannot delete your own account".into()));
    }
    if !db::delete_user(&state.db, id).await? {
        return Err(AppError::NotFound("User not found".into()));
    }
    tracing::info!(user_id = id, "user deleted");
    Ok(StatusCode::NO_CONTENT)
}
