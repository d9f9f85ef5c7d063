mod common;

use std::sync::Arc;

use adreport::{
    auth,
    config::{PlatformConfig, PlatformHttpConfig},
    db,
    models::{Platform, Role},
    sources::PlatformClient,
};
use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
};
use common::*;
use rust_decimal::Decimal;
use serde_json::json;

const PPTX: &str = "application/vnd.openxmlformats-officedocument.presentationml.presentation";
const MARCH: &str = "start_date=2024-03-01&end_date=2024-03-31";

/// Acme with one measured campaign and one campaign without samples.
/// Early March totals 1000 impressions; the whole month 1001.
async fn seeded_client(pool: &sqlx::SqlitePool) -> i64 {
    let client = db::create_client(pool, "Acme Corp", &["acme".into()], true)
        .await
        .unwrap();
    let measured = campaign(pool, client.id, "Acme ABM", Platform::LinkedIn, None).await;
    campaign(pool, client.id, "Acme retargeting", Platform::RollWorks, None).await;
    db::insert_metric_samples(
        pool,
        measured.id,
        &[
            sample(5, 600, 30, 3, "60.00"),
            sample(6, 400, 20, 2, "40.00"),
            sample(28, 1, 1, 1, "1.00"),
        ],
    )
    .await
    .unwrap();
    client.id
}

#[tokio::test]
async fn health_needs_no_auth() {
    let pool = pool().await;
    let app = app(pool.clone(), stored_sources(&pool, true));
    assert_eq!(send(&app, get("/health", None)).await.status(), StatusCode::OK);
}

// ── Export ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn export_streams_a_pptx_attachment() {
    let pool = pool().await;
    let client_id = seeded_client(&pool).await;
    let (_, token) = user(&pool, "admin@agency.test", Role::Admin).await;
    let app = app(pool.clone(), stored_sources(&pool, true));

    let resp = send(
        &app,
        get(&format!("/reports/export?client_id={client_id}&{MARCH}"), Some(&token)),
    )
    .await;

    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()[header::CONTENT_TYPE], PPTX);
    assert_eq!(
        resp.headers()[header::CONTENT_DISPOSITION],
        "attachment; filename=\"Acme_Corp_report_2024-03-01_to_2024-03-31.pptx\""
    );
    assert_eq!(resp.headers()["x-report-degraded"], "false");
    assert!(resp.headers().get("x-report-degraded-campaigns").is_none());
    assert!(body_bytes(resp).await.starts_with(b"PK"));
}

#[tokio::test]
async fn path_style_export_matches_query_style() {
    let pool = pool().await;
    let client_id = seeded_client(&pool).await;
    let (_, token) = user(&pool, "head@agency.test", Role::AgencyHead).await;
    let app = app(pool.clone(), stored_sources(&pool, true));

    let resp = send(
        &app,
        get(&format!("/reports/export-client/{client_id}?{MARCH}"), Some(&token)),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()[header::CONTENT_TYPE], PPTX);
}

#[tokio::test]
async fn missing_or_bad_token_is_401() {
    let pool = pool().await;
    let client_id = seeded_client(&pool).await;
    let app = app(pool.clone(), stored_sources(&pool, true));
    let uri = format!("/reports/export?client_id={client_id}&{MARCH}");

    let resp = send(&app, get(&uri, None)).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(resp.headers()[header::WWW_AUTHENTICATE], "Bearer");
    assert_eq!(body_json(resp).await["error"]["code"], "AUTHENTICATION_ERROR");

    let resp = send(&app, get(&uri, Some("not.a.jwt"))).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn deactivated_user_is_rejected() {
    let pool = pool().await;
    let client_id = seeded_client(&pool).await;
    let (user, token) = user(&pool, "gone@agency.test", Role::Admin).await;
    db::update_user(
        &pool,
        user.id,
        &db::UserChanges {
            email: None,
            name: None,
            hashed_password: None,
            role: None,
            is_active: Some(false),
        },
    )
    .await
    .unwrap();
    let app = app(pool.clone(), stored_sources(&pool, true));

    let resp = send(
        &app,
        get(&format!("/reports/export?client_id={client_id}&{MARCH}"), Some(&token)),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn unassigned_client_manager_is_forbidden() {
    let pool = pool().await;
    let client_id = seeded_client(&pool).await;
    let (_, token) = user(&pool, "cm@agency.test", Role::ClientManager).await;
    let app = app(pool.clone(), stored_sources(&pool, true));

    let resp = send(
        &app,
        get(&format!("/reports/export?client_id={client_id}&{MARCH}"), Some(&token)),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    assert_eq!(body_json(resp).await["error"]["code"], "AUTHORIZATION_ERROR");

    // Unknown clients look the same, so existence is not revealed
    let resp = send(
        &app,
        get(&format!("/reports/export?client_id=9999&{MARCH}"), Some(&token)),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn unknown_client_is_404_for_admins() {
    let pool = pool().await;
    let (_, token) = user(&pool, "admin@agency.test", Role::Admin).await;
    let app = app(pool.clone(), stored_sources(&pool, true));

    let resp = send(
        &app,
        get(&format!("/reports/export?client_id=9999&{MARCH}"), Some(&token)),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn inverted_or_malformed_dates_are_400() {
    let pool = pool().await;
    let (_, token) = user(&pool, "admin@agency.test", Role::Admin).await;
    let app = app(pool.clone(), stored_sources(&pool, true));

    // Client 9999 does not exist: validation must win over the lookup
    let resp = send(
        &app,
        get(
            "/reports/export?client_id=9999&start_date=2024-03-31&end_date=2024-03-01",
            Some(&token),
        ),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(resp).await["error"]["code"], "VALIDATION_ERROR");

    let resp = send(
        &app,
        get(
            "/reports/export?client_id=1&start_date=March&end_date=2024-03-01",
            Some(&token),
        ),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = send(&app, get("/reports/export?client_id=1", Some(&token))).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

// ── Summary ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn summary_counts_only_in_range_samples() {
    let pool = pool().await;
    let client_id = seeded_client(&pool).await;
    let (_, token) = user(&pool, "admin@agency.test", Role::Admin).await;
    let app = app(pool.clone(), stored_sources(&pool, true));

    let resp = send(
        &app,
        get(
            &format!(
                "/reports/summary?client_id={client_id}&start_date=2024-03-01&end_date=2024-03-10"
            ),
            Some(&token),
        ),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;

    let summary = &body["summary"];
    assert_eq!(summary["impressions"], 1000);
    assert_eq!(summary["clicks"], 50);
    assert_eq!(summary["conversions"], 5);
    assert_eq!(decimal(&summary["spend"]), Decimal::new(100, 0));
    assert_eq!(decimal(&summary["ctr"]), Decimal::new(5, 2));
    assert_eq!(decimal(&summary["cost_per_click"]), Decimal::new(2, 0));
    assert_eq!(decimal(&summary["cost_per_conversion"]), Decimal::new(20, 0));
    assert_eq!(decimal(&summary["roi"]), Decimal::new(4, 0));

    // The campaign without samples contributes zeros rather than failing
    let campaigns = body["campaigns"].as_array().unwrap();
    assert_eq!(campaigns.len(), 2);
    assert_eq!(campaigns[1]["metrics"]["impressions"], 0);
    assert_eq!(decimal(&campaigns[1]["metrics"]["ctr"]), Decimal::ZERO);
    assert_eq!(campaigns[1]["degraded"], false);

    assert_eq!(decimal(&body["budget"]["total"]), Decimal::new(4000, 0));
    assert_eq!(body["degraded_campaign_ids"], json!([]));
}

#[tokio::test]
async fn client_manager_sees_no_financials() {
    let pool = pool().await;
    let client_id = seeded_client(&pool).await;
    let (cm, token) = user(&pool, "cm@agency.test", Role::ClientManager).await;
    db::set_assigned_clients(&pool, cm.id, &[client_id]).await.unwrap();
    let app = app(pool.clone(), stored_sources(&pool, true));

    let resp = send(
        &app,
        get(&format!("/reports/summary?client_id={client_id}&{MARCH}"), Some(&token)),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;

    let summary = body["summary"].as_object().unwrap();
    assert!(summary.contains_key("impressions"));
    assert!(summary.contains_key("conversion_rate"));
    for hidden in ["spend", "cost_per_click", "cost_per_conversion", "roi"] {
        assert!(!summary.contains_key(hidden), "{hidden} should be hidden");
    }
    assert!(body.get("budget").is_none());
    assert!(!body["campaigns"][0]["metrics"]
        .as_object()
        .unwrap()
        .contains_key("spend"));

    let resp = send(
        &app,
        get(&format!("/reports/export?client_id={client_id}&{MARCH}"), Some(&token)),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
}

// ── Degraded sources ───────────────────────────────────────────────────────

fn unreachable_linkedin() -> PlatformClient {
    let config = PlatformConfig {
        api_url: "http://127.0.0.1:1".into(),
        token_url: "http://127.0.0.1:1/oauth/token".into(),
        access_token: Some("token".into()),
        ..PlatformConfig::default()
    };
    let http = PlatformHttpConfig {
        timeout: std::time::Duration::from_secs(2),
        max_refresh_attempts: 1,
        refresh_backoff: std::time::Duration::from_millis(1),
    };
    PlatformClient::new(Platform::LinkedIn, &config, &http).unwrap()
}

#[tokio::test]
async fn unreachable_platform_degrades_the_export() {
    let pool = pool().await;
    let client_id = seeded_client(&pool).await;
    let linked = campaign(&pool, client_id, "Acme video", Platform::LinkedIn, Some("li-77")).await;
    let (_, token) = user(&pool, "admin@agency.test", Role::Admin).await;
    let sources = stored_sources(&pool, true).with_platform(Arc::new(unreachable_linkedin()));
    let app = app(pool.clone(), sources);

    let resp = send(
        &app,
        get(&format!("/reports/export?client_id={client_id}&{MARCH}"), Some(&token)),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()["x-report-degraded"], "true");
    assert_eq!(
        resp.headers()["x-report-degraded-campaigns"],
        linked.id.to_string().as_str()
    );

    let resp = send(
        &app,
        get(&format!("/reports/summary?client_id={client_id}&{MARCH}"), Some(&token)),
    )
    .await;
    let body = body_json(resp).await;
    assert_eq!(body["degraded_campaign_ids"], json!([linked.id]));
    // Stored campaigns still count
    assert_eq!(body["summary"]["impressions"], 1001);
}

#[tokio::test]
async fn unreachable_platform_is_502_without_degradation() {
    let pool = pool().await;
    let client_id = seeded_client(&pool).await;
    campaign(&pool, client_id, "Acme video", Platform::LinkedIn, Some("li-77")).await;
    let (_, token) = user(&pool, "admin@agency.test", Role::Admin).await;
    let sources = stored_sources(&pool, false).with_platform(Arc::new(unreachable_linkedin()));
    let app = app(pool.clone(), sources);

    let resp = send(
        &app,
        get(&format!("/reports/export?client_id={client_id}&{MARCH}"), Some(&token)),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(body_json(resp).await["error"]["code"], "UPSTREAM_UNAVAILABLE");
}

// ── Auth ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn login_issues_a_usable_token() {
    let pool = pool().await;
    let hash = auth::hash_password("correct horse").unwrap();
    db::create_user(&pool, "dana@agency.test", Some("Dana"), &hash, Role::AgencyHead)
        .await
        .unwrap();
    let app = app(pool.clone(), stored_sources(&pool, true));

    let form = |password: &str| {
        Request::builder()
            .method(Method::POST)
            .uri("/auth/token")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(format!(
                "username=dana%40agency.test&password={}",
                password.replace(' ', "+")
            )))
            .unwrap()
    };

    let resp = send(&app, form("wrong password")).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let resp = send(&app, form("correct horse")).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;
    assert_eq!(body["token_type"], "bearer");
    let token = body["access_token"].as_str().unwrap().to_owned();

    let me = body_json(send(&app, get("/auth/me", Some(&token))).await).await;
    assert_eq!(me["email"], "dana@agency.test");
    assert_eq!(me["role"], "agency_head");
    assert_eq!(me["name"], "Dana");
}

// ── Clients & users ────────────────────────────────────────────────────────

#[tokio::test]
async fn client_crud_is_admin_only_and_names_are_unique() {
    let pool = pool().await;
    let (_, admin) = user(&pool, "admin@agency.test", Role::Admin).await;
    let (_, head) = user(&pool, "head@agency.test", Role::AgencyHead).await;
    let app = app(pool.clone(), stored_sources(&pool, true));
    let payload = json!({"name": "Globex", "campaign_keywords": ["globex", "gx"]});

    let create =
        |token: &str| request(Method::POST, "/clients", Some(token), Some(payload.clone()));

    let resp = send(&app, create(&head[..])).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    let resp = send(&app, create(&admin[..])).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let created = body_json(resp).await;
    assert_eq!(created["campaign_keywords"], json!(["globex", "gx"]));

    let resp = send(&app, create(&admin[..])).await;
    assert_eq!(resp.status(), StatusCode::CONFLICT);

    let id = created["id"].as_i64().unwrap();
    let resp = send(
        &app,
        request(
            Method::PUT,
            &format!("/clients/{id}"),
            Some(&admin),
            Some(json!({"name": "Globex Inc", "is_active": false})),
        ),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let updated = body_json(resp).await;
    assert_eq!(updated["name"], "Globex Inc");
    assert_eq!(updated["is_active"], false);

    let uri = format!("/clients/{id}");
    let resp = send(&app, request(Method::DELETE, &uri, Some(&admin), None)).await;
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);
    let resp = send(&app, get(&format!("/clients/{id}"), Some(&admin))).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn client_managers_list_only_assigned_clients() {
    let pool = pool().await;
    let acme = db::create_client(&pool, "Acme", &[], true).await.unwrap();
    db::create_client(&pool, "Globex", &[], true).await.unwrap();
    let (_, admin) = user(&pool, "admin@agency.test", Role::Admin).await;
    let (cm, cm_token) = user(&pool, "cm@agency.test", Role::ClientManager).await;
    let app = app(pool.clone(), stored_sources(&pool, true));

    // Assign through the API
    let resp = send(
        &app,
        request(
            Method::PUT,
            &format!("/users/{}", cm.id),
            Some(&admin),
            Some(json!({"clients": [acme.id]})),
        ),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_json(resp).await["clients"][0]["name"], "Acme");

    let listed = body_json(send(&app, get("/clients", Some(&cm_token))).await).await;
    assert_eq!(listed.as_array().unwrap().len(), 1);
    assert_eq!(listed[0]["name"], "Acme");

    let all = body_json(send(&app, get("/clients", Some(&admin))).await).await;
    assert_eq!(all.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn user_management_rules() {
    let pool = pool().await;
    let (admin_user, admin) = user(&pool, "admin@agency.test", Role::Admin).await;
    let app = app(pool.clone(), stored_sources(&pool, true));

    let new_user = |email: &str, role: &str| {
        request(
            Method::POST,
            "/users",
            Some(&admin),
            Some(json!({"email": email, "password": "long enough", "role": role})),
        )
    };

    let resp = send(&app, new_user("cm@agency.test", "client_manager")).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    assert_eq!(body_json(resp).await["name"], "cm");

    let resp = send(&app, new_user("CM@agency.test", "client_manager")).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = send(&app, new_user("other@agency.test", "owner")).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = send(
        &app,
        request(Method::DELETE, &format!("/users/{}", admin_user.id), Some(&admin), None),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let users = body_json(send(&app, get("/users", Some(&admin))).await).await;
    assert_eq!(users.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn ingested_metrics_feed_reports() {
    let pool = pool().await;
    let client = db::create_client(&pool, "Initech", &[], true).await.unwrap();
    let (_, admin) = user(&pool, "admin@agency.test", Role::Admin).await;
    let app = app(pool.clone(), stored_sources(&pool, true));

    let resp = send(
        &app,
        request(
            Method::POST,
            &format!("/clients/{}/campaigns", client.id),
            Some(&admin),
            Some(json!({
                "name": "Initech search",
                "platform": "linkedin",
                "start_date": "2024-03-01"
            })),
        ),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let campaign_id = body_json(resp).await["id"].as_i64().unwrap();

    let resp = send(
        &app,
        request(
            Method::POST,
            &format!("/campaigns/{campaign_id}/metrics"),
            Some(&admin),
            Some(json!([
                {
                    "date": "2024-03-02",
                    "impressions": 200,
                    "clicks": 10,
                    "conversions": 1,
                    "spend": "12.50"
                },
                {"date": "2024-04-02", "impressions": 5000}
            ])),
        ),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    assert_eq!(body_json(resp).await["inserted"], 2);

    let resp = send(
        &app,
        request(
            Method::POST,
            &format!("/campaigns/{campaign_id}/metrics"),
            Some(&admin),
            Some(json!([{"date": "2024-03-03", "spend": "-1"}])),
        ),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    // Counts beyond the stored range and oversized spend are bad input, not server faults
    for rejected in [
        json!([{"date": "2024-03-02", "impressions": u64::MAX}]),
        json!([{"date": "2024-03-02", "spend": "50000000000000000000000000000"}]),
    ] {
        let resp = send(
            &app,
            request(
                Method::POST,
                &format!("/campaigns/{campaign_id}/metrics"),
                Some(&admin),
                Some(rejected),
            ),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(resp).await["error"]["code"], "VALIDATION_ERROR");
    }

    let body = body_json(
        send(
            &app,
            get(&format!("/reports/summary?client_id={}&{MARCH}", client.id), Some(&admin)),
        )
        .await,
    )
    .await;
    assert_eq!(body["summary"]["impressions"], 200);
    assert_eq!(decimal(&body["summary"]["spend"]), Decimal::new(1250, 2));
}
