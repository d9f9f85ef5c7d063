use crate::{
    auth::{AuthUser, Caller},
    error::AppError,
    report::{self, export::ReportSummary, PeriodQuery, ReportPeriod},
    AppState,
};
use axum::{
    extract::{rejection::QueryRejection, Path, Query, State},
    http::{header, HeaderMap, HeaderName, HeaderValue},
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use std::sync::Arc;

pub const DEGRADED_HEADER: &str = "x-report-degraded";
pub const DEGRADED_CAMPAIGNS_HEADER: &str = "x-report-degraded-campaigns";

#[derive(Debug, Deserialize)]
pub struct ReportQuery {
    pub client_id: i64,
    pub start_date: String,
    pub end_date: String,
}

fn query_params<T>(query: Result<Query<T>, QueryRejection>) -> Result<T, AppError> {
    query
        .map(|Query(q)| q)
        .map_err(|rejection| AppError::Validation(rejection.body_text()))
}

fn header_value(value: &str) -> Result<HeaderValue, AppError> {
    HeaderValue::from_str(value).map_err(|e| AppError::Internal(e.to_string()))
}

async fn export_response(
    state: &AppState,
    caller: &Caller,
    client_id: i64,
    period: ReportPeriod,
) -> Result<Response, AppError> {
    let exported = report::export_report(state, caller, client_id, period).await?;

    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(exported.document.content_type),
    );
    headers.insert(
        header::CONTENT_DISPOSITION,
        header_value(&format!("attachment; filename=\"{}\"", exported.filename))?,
    );

    let degraded = !exported.degraded_campaign_ids.is_empty();
    headers.insert(
        HeaderName::from_static(DEGRADED_HEADER),
        HeaderValue::from_static(if degraded { "true" } else { "false" }),
    );
    if degraded {
        let ids = exported
            .degraded_campaign_ids
            .iter()
            .map(i64::to_string)
            .collect::<Vec<_>>()
            .join(",");
        headers.insert(
            HeaderName::from_static(DEGRADED_CAMPAIGNS_HEADER),
            header_value(&ids)?,
        );
        tracing::warn!(client_id, campaigns = %ids, "report exported with degraded sources");
    }

    tracing::info!(
        client_id,
        user_id = caller.user_id,
        bytes = exported.document.bytes.len(),
        filename = %exported.filename,
        "report exported"
    );

    Ok((headers, exported.document.bytes).into_response())
}

/// GET /reports/export?client_id=&start_date=&end_date=
pub async fn export(
    AuthUser(caller): AuthUser,
    State(state): State<Arc<AppState>>,
    query: Result<Query<ReportQuery>, QueryRejection>,
) -> Result<Response, AppError> {
    let q = query_params(query)?;
    let period = ReportPeriod::parse(&q.start_date, &q.end_date)?;
    export_response(&state, &caller, q.client_id, period).await
}

/// GET /reports/export-client/:client_id?start_date=&end_date=
pub async fn export_client(
    AuthUser(caller): AuthUser,
    State(state): State<Arc<AppState>>,
    Path(client_id): Path<i64>,
    query: Result<Query<PeriodQuery>, QueryRejection>,
) -> Result<Response, AppError> {
    let q = query_params(query)?;
    let period = ReportPeriod::parse(&q.start_date, &q.end_date)?;
    export_response(&state, &caller, client_id, period).await
}

/// GET /reports/summary?client_id=&start_date=&end_date=
/// The same role-filtered figures as the export, as JSON.
pub async fn summary(
    AuthUser(caller): AuthUser,
    State(state): State<Arc<AppState>>,
    query: Result<Query<ReportQuery>, QueryRejection>,
) -> Result<Json<ReportSummary>, AppError> {
    let q = query_params(query)?;
    let period = ReportPeriod::parse(&q.start_date, &q.end_date)?;
    let data = report::build_report(&state, &caller, q.client_id, period).await?;

    Ok(Json(ReportSummary {
        client_id: data.client.id,
        report: data.model,
        degraded_campaign_ids: data.degraded_campaign_ids,
    }))
}
