use crate::{
    auth::AuthUser,
    db,
    error::{conflict_on_unique, AppError},
    models::{Campaign, CreateCampaignRequest, MetricSample},
    AppState,
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde::Serialize;
use std::{collections::BTreeMap, sync::Arc};

#[derive(Debug, Serialize)]
pub struct IngestResponse {
    pub inserted: u64,
}

#[derive(Debug, Default, Serialize)]
pub struct SyncResponse {
    /// Campaigns upserted, per platform.
    pub synced: BTreeMap<String, usize>,
    /// Platforms that could not be listed, with the reason.
    pub failed: BTreeMap<String, String>,
}

/// GET /clients/:id/campaigns
pub async fn list_campaigns(
    AuthUser(caller): AuthUser,
    State(state): State<Arc<AppState>>,
    Path(client_id): Path<i64>,
) -> Result<Json<Vec<Campaign>>, AppError> {
    caller.require_client_access(client_id)?;
    if db::get_client(&state.db, client_id).await?.is_none() {
        return Err(AppError::NotFound("Client not found".into()));
    }
    Ok(Json(db::list_campaigns(&state.db, client_id).await?))
}

/// POST /clients/:id/campaigns
pub async fn create_campaign(
    AuthUser(caller): AuthUser,
    State(state): State<Arc<AppState>>,
    Path(client_id): Path<i64>,
    Json(req): Json<CreateCampaignRequest>,
) -> Result<(StatusCode, Json<Campaign>), AppError> {
    caller.require_admin()?;

    if req.name.trim().is_empty() {
        return Err(AppError::Validation("Campaign name must not be empty".into()));
    }
    if req.total_budget.is_sign_negative() || req.spent_budget.is_sign_negative() {
        return Err(AppError::Validation("Budgets must not be negative".into()));
    }
    if matches!(req.end_date, Some(end) if end < req.start_date) {
        return Err(AppError::Validation(
            "end_date must be on or after start_date".into(),
        ));
    }
    if db::get_client(&state.db, client_id).await?.is_none() {
        return Err(AppError::NotFound("Client not found".into()));
    }

    let campaign = db::create_campaign(&state.db, client_id, &req)
        .await
        .map_err(|e| conflict_on_unique(e, "This platform campaign is already linked"))?;

    tracing::info!(
        campaign_id = campaign.id,
        client_id,
        platform = %campaign.platform,
        "campaign created"
    );
    Ok((StatusCode::CREATED, Json(campaign)))
}

/// DELETE /campaigns/:id
pub async fn delete_campaign(
    AuthUser(caller): AuthUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<StatusCode, AppError> {
    caller.require_admin()?;
    if !db::delete_campaign(&state.db, id).await? {
        return Err(AppError::NotFound("Campaign not found".into()));
    }
    Ok(StatusCode::NO_CONTENT)
}

/// POST /campaigns/:id/metrics
/// Import daily samples for a campaign (seed data or offline exports).
pub async fn ingest_metrics(
    AuthUser(caller): AuthUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(samples): Json<Vec<MetricSample>>,
) -> Result<(StatusCode, Json<IngestResponse>), AppError> {
    caller.require_admin()?;

    for sample in &samples {
        sample.validate().map_err(AppError::Validation)?;
    }
    if db::get_campaign(&state.db, id).await?.is_none() {
        return Err(AppError::NotFound("Campaign not found".into()));
    }

    let inserted = db::insert_metric_samples(&state.db, id, &samples).await?;
    tracing::info!(campaign_id = id, inserted, "metric samples ingested");
    Ok((StatusCode::CREATED, Json(IngestResponse { inserted })))
}

/// POST /clients/:id/sync
/// Pull campaign lists from every configured platform and link the ones whose
/// names match the client's keywords.
pub async fn sync_campaigns(
    AuthUser(caller): AuthUser,
    State(state): State<Arc<AppState>>,
    Path(client_id): Path<i64>,
) -> Result<Json<SyncResponse>, AppError> {
    caller.require_admin()?;
    let client = db::get_client(&state.db, client_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Client not found".into()))?;

    let today = Utc::now().date_naive();
    let mut response = SyncResponse::default();

    for source in state.sources.platforms() {
        let platform = source.platform();
        let listed = match source.list_campaigns().await {
            Ok(listed) => listed,
            Err(err) => {
                tracing::warn!(client_id, platform = %platform, "campaign sync failed: {err}");
                response.failed.insert(platform.as_str().to_owned(), err.to_string());
                continue;
            }
        };

        let mut count = 0;
        for campaign in listed.iter().filter(|c| client.matches_campaign(&c.name)) {
            db::upsert_synced_campaign(&state.db, client_id, platform, campaign, today).await?;
            count += 1;
        }

        tracing::info!(client_id, platform = %platform, count, "campaigns synced");
        response.synced.insert(platform.as_str().to_owned(), count);
    }

    Ok(Json(response))
}
