use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::{header, RequestBuilder, Response, StatusCode};
use rust_decimal::Decimal;
use serde::{de::DeserializeOwned, Deserialize, Deserializer};

use super::{session::TokenSession, MetricsSource, PlatformSource, SourceError};
use crate::{
    config::{PlatformConfig, PlatformHttpConfig},
    models::{Campaign, CampaignStatus, MetricSample, Platform, SyncedCampaign},
    report::ReportPeriod,
};

// ── API response shapes ────────────────────────────────────────────────────

/// LinkedIn wraps collections in `elements`, RollWorks in `data`.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(alias = "data")]
    elements: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct ApiCampaign {
    #[serde(deserialize_with = "id_string")]
    id: String,
    name: String,
    #[serde(default)]
    status: Option<String>,
    #[serde(default, alias = "startDate", deserialize_with = "optional_date")]
    start_date: Option<NaiveDate>,
    #[serde(default, alias = "endDate", deserialize_with = "optional_date")]
    end_date: Option<NaiveDate>,
    #[serde(default, alias = "totalBudget", alias = "budget")]
    total_budget: Option<Decimal>,
    #[serde(default, alias = "spentBudget", alias = "spent")]
    spent_budget: Option<Decimal>,
}

#[derive(Debug, Deserialize)]
struct ApiMetricRow {
    #[serde(alias = "day", deserialize_with = "date_prefix")]
    date: NaiveDate,
    #[serde(default)]
    impressions: u64,
    #[serde(default)]
    clicks: u64,
    #[serde(default, alias = "externalWebsiteConversions")]
    conversions: u64,
    #[serde(default, alias = "costInUsd")]
    spend: Decimal,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Text(String),
    Number(i64),
}

fn id_string<'de, D: Deserializer<'de>>(de: D) -> Result<String, D::Error> {
    Ok(match RawId::deserialize(de)? {
        RawId::Text(s) => s,
        RawId::Number(n) => n.to_string(),
    })
}

/// Accepts `YYYY-MM-DD` optionally followed by a time part.
fn parse_date_prefix(raw: &str) -> Option<NaiveDate> {
    let prefix = raw.get(..10)?;
    NaiveDate::parse_from_str(prefix, "%Y-%m-%d").ok()
}

fn date_prefix<'de, D: Deserializer<'de>>(de: D) -> Result<NaiveDate, D::Error> {
    let raw = String::deserialize(de)?;
    parse_date_prefix(&raw)
        .ok_or_else(|| serde::de::Error::custom(format!("invalid date '{raw}'")))
}

fn optional_date<'de, D: Deserializer<'de>>(de: D) -> Result<Option<NaiveDate>, D::Error> {
    let raw = Option::<String>::deserialize(de)?;
    Ok(raw.as_deref().and_then(parse_date_prefix))
}

impl ApiCampaign {
    fn into_synced(self) -> SyncedCampaign {
        SyncedCampaign {
            status: self
                .status
                .as_deref()
                .and_then(|s| s.parse().ok())
                .unwrap_or(CampaignStatus::Active),
            external_id: self.id,
            name: self.name,
            start_date: self.start_date,
            end_date: self.end_date,
            total_budget: self.total_budget.unwrap_or_default().max(Decimal::ZERO),
            spent_budget: self.spent_budget.unwrap_or_default().max(Decimal::ZERO),
        }
    }
}

impl ApiMetricRow {
    fn into_sample(self, platform: Platform) -> Result<MetricSample, SourceError> {
        let sample = MetricSample {
            date: self.date,
            impressions: self.impressions,
            clicks: self.clicks,
            conversions: self.conversions,
            spend: self.spend,
        };
        sample
            .validate()
            .map_err(|message| SourceError::Decode { platform, message })?;
        Ok(sample)
    }
}

// ── Client ─────────────────────────────────────────────────────────────────

/// HTTP client for one ad platform's reporting API.
pub struct PlatformClient {
    platform: Platform,
    api_url: String,
    http: reqwest::Client,
    session: TokenSession,
}

impl PlatformClient {
    pub fn new(
        platform: Platform,
        config: &PlatformConfig,
        http_config: &PlatformHttpConfig,
    ) -> Result<Self, SourceError> {
        let http = reqwest::Client::builder()
            .timeout(http_config.timeout)
            .build()
            .map_err(|e| SourceError::Transport {
                platform,
                message: e.to_string(),
            })?;

        Ok(Self {
            platform,
            api_url: config.api_url.trim_end_matches('/').to_owned(),
            session: TokenSession::new(platform, config, http_config, http.clone()),
            http,
        })
    }

    fn campaigns_url(&self) -> String {
        match self.platform {
            Platform::LinkedIn => format!("{}/adCampaigns", self.api_url),
            Platform::RollWorks => format!("{}/campaigns", self.api_url),
        }
    }

    fn metrics_request(&self, external_id: &str, period: &ReportPeriod) -> RequestBuilder {
        let start = period.start.to_string();
        let end = period.end.to_string();
        match self.platform {
            Platform::LinkedIn => self
                .http
                .get(format!("{}/adCampaigns/{external_id}/metrics", self.api_url))
                .query(&[("start_date", start), ("end_date", end)]),
            Platform::RollWorks => self
                .http
                .get(format!("{}/campaigns/{external_id}/report", self.api_url))
                .query(&[
                    ("start_date", start),
                    ("end_date", end),
                    ("metrics", "impressions,clicks,spend,conversions".to_owned()),
                ]),
        }
    }

    async fn send(&self, request: RequestBuilder, token: &str) -> Result<Response, SourceError> {
        let mut request = request.bearer_auth(token).header(header::ACCEPT, "application/json");
        if self.platform == Platform::LinkedIn {
            request = request.header("X-Restli-Protocol-Version", "2.0.0");
        }
        request.send().await.map_err(|e| SourceError::Transport {
            platform: self.platform,
            message: e.to_string(),
        })
    }

    /// Issue an authenticated GET, refreshing the token once on a 401.
    async fn get_json<T: DeserializeOwned>(
        &self,
        build: impl Fn() -> RequestBuilder,
    ) -> Result<T, SourceError> {
        let token = self.session.access_token().await?;
        let mut resp = self.send(build(), &token).await?;

        if resp.status() == StatusCode::UNAUTHORIZED {
            tracing::debug!(platform = %self.platform, "access token rejected, refreshing");
            let fresh = self.session.refresh(Some(token.as_str())).await?;
            resp = self.send(build(), &fresh).await?;
            if resp.status() == StatusCode::UNAUTHORIZED {
                self.session.invalidate().await;
                return Err(self.session.reauthenticate());
            }
        }

        if !resp.status().is_success() {
            return Err(SourceError::Status {
                platform: self.platform,
                status: resp.status().as_u16(),
            });
        }

        resp.json::<T>().await.map_err(|e| SourceError::Decode {
            platform: self.platform,
            message: e.to_string(),
        })
    }
}

#[async_trait]
impl MetricsSource for PlatformClient {
    async fn fetch_samples(
        &self,
        campaign: &Campaign,
        period: &ReportPeriod,
    ) -> Result<Vec<MetricSample>, SourceError> {
        let Some(external_id) = campaign.external_id.as_deref() else {
            return Ok(Vec::new());
        };

        let envelope: Envelope<ApiMetricRow> = self
            .get_json(|| self.metrics_request(external_id, period))
            .await?;

        envelope
            .elements
            .into_iter()
            .map(|row| row.into_sample(self.platform))
            .collect()
    }
}

#[async_trait]
impl PlatformSource for PlatformClient {
    fn platform(&self) -> Platform {
        self.platform
    }

    async fn list_campaigns(&self) -> Result<Vec<SyncedCampaign>, SourceError> {
        let url = self.campaigns_url();
        let envelope: Envelope<ApiCampaign> = self.get_json(|| self.http.get(&url)).await?;
        Ok(envelope
            .elements
            .into_iter()
            .map(ApiCampaign::into_synced)
            .collect())
    }
}
