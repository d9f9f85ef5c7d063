//! Where metric samples come from, and how a failing source is reported.

pub mod platform;
pub mod session;
pub mod stored;

pub use platform::PlatformClient;
pub use session::TokenSession;
pub use stored::StoredMetrics;

use async_trait::async_trait;
use serde::Serialize;
use std::{collections::HashMap, sync::Arc};

use crate::models::{Campaign, MetricSample, Platform, SyncedCampaign};
use crate::report::ReportPeriod;

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("request to {platform} failed: {message}")]
    Transport { platform: Platform, message: String },

    #[error("{platform} responded with HTTP {status}")]
    Status { platform: Platform, status: u16 },

    #[error("{platform} credentials were rejected; re-authentication required")]
    ReauthenticationRequired { platform: Platform },

    #[error("unexpected response from {platform}: {message}")]
    Decode { platform: Platform, message: String },

    #[error("stored metrics unavailable: {0}")]
    Database(#[from] sqlx::Error),
}

/// Produces the samples for one campaign over a reporting window.
#[async_trait]
pub trait MetricsSource: Send + Sync {
    async fn fetch_samples(
        &self,
        campaign: &Campaign,
        period: &ReportPeriod,
    ) -> Result<Vec<MetricSample>, SourceError>;
}

/// An ad platform: a metrics source that can also list its campaigns.
#[async_trait]
pub trait PlatformSource: MetricsSource {
    fn platform(&self) -> Platform;

    async fn list_campaigns(&self) -> Result<Vec<SyncedCampaign>, SourceError>;
}

/// Provenance of a fetch. A degraded fetch carries zero samples, which is
/// not the same as a live fetch that found none.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SourceStatus {
    Live,
    Degraded { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fetched {
    pub samples: Vec<MetricSample>,
    pub status: SourceStatus,
}

impl Fetched {
    pub fn is_degraded(&self) -> bool {
        matches!(self.status, SourceStatus::Degraded { .. })
    }
}

/// Routes each campaign to its source and applies the degradation policy.
#[derive(Clone)]
pub struct MetricsSources {
    stored: Arc<dyn MetricsSource>,
    platforms: HashMap<Platform, Arc<dyn PlatformSource>>,
    degrade_on_failure: bool,
}

impl MetricsSources {
    pub fn new(stored: Arc<dyn MetricsSource>, degrade_on_failure: bool) -> Self {
        Self {
            stored,
            platforms: HashMap::new(),
            degrade_on_failure,
        }
    }

    pub fn with_platform(mut self, source: Arc<dyn PlatformSource>) -> Self {
        self.platforms.insert(source.platform(), source);
        self
    }

    /// Configured platforms, in a stable order.
    pub fn platforms(&self) -> Vec<Arc<dyn PlatformSource>> {
        Platform::ALL
            .iter()
            .filter_map(|p| self.platforms.get(p).cloned())
            .collect()
    }

    /// Samples for `campaign` inside `period`.
    ///
    /// Campaigns linked to a configured platform are read from it; all others
    /// from the local store. Upstream failures become a degraded, empty fetch
    /// unless degradation is switched off. Local database errors always
    /// propagate.
    pub async fn fetch(
        &self,
        campaign: &Campaign,
        period: &ReportPeriod,
    ) -> Result<Fetched, SourceError> {
        let result = match (&campaign.external_id, self.platforms.get(&campaign.platform)) {
            (Some(_), Some(source)) => source.fetch_samples(campaign, period).await,
            _ => self.stored.fetch_samples(campaign, period).await,
        };

        match result {
            Ok(samples) => Ok(Fetched {
                samples: samples
                    .into_iter()
                    .filter(|s| period.contains(s.date))
                    .collect(),
                status: SourceStatus::Live,
            }),
            Err(SourceError::Database(err)) => Err(SourceError::Database(err)),
            Err(err) if self.degrade_on_failure => {
                tracing::warn!(
                    campaign_id = campaign.id,
                    platform = %campaign.platform,
                    "metrics source degraded: {err}"
                );
                Ok(Fetched {
                    samples: Vec::new(),
                    status: SourceStatus::Degraded {
                        reason: err.to_string(),
                    },
                })
            }
            Err(err) => {
                tracing::error!(
                    campaign_id = campaign.id,
                    platform = %campaign.platform,
                    "metrics source failed: {err}"
                );
                Err(err)
            }
        }
    }
}
