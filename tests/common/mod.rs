#![allow(dead_code)]

use std::{sync::Arc, time::Duration};

use adreport::{
    auth, build_router,
    config::AppConfig,
    db,
    models::{Campaign, CreateCampaignRequest, MetricSample, Platform, Role, User},
    report::PptxRenderer,
    sources::{MetricsSources, StoredMetrics},
    AppState,
};
use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request},
    response::Response,
    Router,
};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use sqlx::SqlitePool;
use tower::ServiceExt;

pub const SECRET: &str = "integration-test-secret";

pub async fn pool() -> SqlitePool {
    db::connect("sqlite::memory:").await.unwrap()
}

pub fn stored_sources(pool: &SqlitePool, degrade: bool) -> MetricsSources {
    MetricsSources::new(Arc::new(StoredMetrics::new(pool.clone())), degrade)
}

pub fn app(pool: SqlitePool, sources: MetricsSources) -> Router {
    let state = Arc::new(AppState {
        db: pool,
        config: AppConfig::local("sqlite::memory:", SECRET),
        sources,
        renderer: Arc::new(PptxRenderer),
    });
    build_router(state)
}

pub async fn user(pool: &SqlitePool, email: &str, role: Role) -> (User, String) {
    let user = db::create_user(pool, email, None, "not-a-real-hash", role)
        .await
        .unwrap();
    let token =
        auth::issue_token(user.id, &user.email, role, SECRET, Duration::from_secs(600)).unwrap();
    (user, token)
}

pub fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
}

pub async fn campaign(
    pool: &SqlitePool,
    client_id: i64,
    name: &str,
    platform: Platform,
    external_id: Option<&str>,
) -> Campaign {
    db::create_campaign(
        pool,
        client_id,
        &CreateCampaignRequest {
            name: name.into(),
            platform,
            external_id: external_id.map(str::to_owned),
            status: None,
            start_date: day(1),
            end_date: None,
            total_budget: Decimal::new(200000, 2),
            spent_budget: Decimal::new(50000, 2),
        },
    )
    .await
    .unwrap()
}

pub fn sample(
    d: u32,
    impressions: u64,
    clicks: u64,
    conversions: u64,
    spend: &str,
) -> MetricSample {
    MetricSample {
        date: day(d),
        impressions,
        clicks,
        conversions,
        spend: spend.parse().unwrap(),
    }
}

pub fn request(
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<serde_json::Value>,
) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    match body {
        Some(json) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

pub fn get(uri: &str, token: Option<&str>) -> Request<Body> {
    request(Method::GET, uri, token, None)
}

pub async fn send(app: &Router, req: Request<Body>) -> Response {
    app.clone().oneshot(req).await.unwrap()
}

pub async fn body_bytes(resp: Response) -> Vec<u8> {
    to_bytes(resp.into_body(), usize::MAX).await.unwrap().to_vec()
}

pub async fn body_json(resp: Response) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(resp).await).unwrap()
}

pub fn decimal(value: &serde_json::Value) -> Decimal {
    value.as_str().unwrap().parse().unwrap()
}
