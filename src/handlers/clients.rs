use crate::{
    auth::AuthUser,
    db,
    error::{conflict_on_unique, AppError},
    models::{Client, ClientPayload},
    AppState,
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;

fn validate(payload: &ClientPayload) -> Result<String, AppError> {
    let name = payload.name.trim();
    if name.is_empty() {
        return Err(AppError::Validation("Client name must not be empty".into()));
    }
    Ok(name.to_owned())
}

/// GET /clients
/// Admins and agency heads see every client; client managers their own.
pub async fn list_clients(
    AuthUser(caller): AuthUser,
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Client>>, AppError> {
    let clients = if caller.role.can_access_all_clients() {
        db::list_clients(&state.db).await?
    } else {
        db::list_clients_for_user(&state.db, caller.user_id).await?
    };
    Ok(Json(clients))
}

/// GET /clients/:id
pub async fn get_client(
    AuthUser(caller): AuthUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<Client>, AppError> {
    caller.require_client_access(id)?;
    db::get_client(&state.db, id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound("Client not found".into()))
}

/// POST /clients
pub async fn create_client(
    AuthUser(caller): AuthUser,
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ClientPayload>,
) -> Result<(StatusCode, Json<Client>), AppError> {
    caller.require_admin()?;
    let name = validate(&payload)?;

    let client = db::create_client(
        &state.db,
        &name,
        &payload.campaign_keywords,
        payload.is_active.unwrap_or(true),
    )
    .await
    .map_err(|e| conflict_on_unique(e, "A client with this name already exists"))?;

    tracing::info!(client_id = client.id, name = %client.name, "client created");
    Ok((StatusCode::CREATED, Json(client)))
}

/// PUT /clients/:id
pub async fn update_client(
    AuthUser(caller): AuthUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(payload): Json<ClientPayload>,
) -> Result<Json<Client>, AppError> {
    caller.require_admin()?;
    let name = validate(&payload)?;

    db::update_client(
        &state.db,
        id,
        &name,
        &payload.campaign_keywords,
        payload.is_active,
    )
    .await
    .map_err(|e| conflict_on_unique(e, "A client with this name already exists"))?
    .map(Json)
    .ok_or_else(|| AppError::NotFound("Client not found".into()))
}

/// DELETE /clients/:id
pub async fn delete_client(
    AuthUser(caller): AuthUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<StatusCode, AppError> {
    caller.require_admin()?;
    if !db::delete_client(&state.db, id).await? {
        return Err(AppError::NotFound("Client not found".into()));
    }
    tracing::info!(client_id = id, "client deleted");
    Ok(StatusCode::NO_CONTENT)
}
