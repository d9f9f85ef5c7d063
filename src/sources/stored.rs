use async_trait::async_trait;
use sqlx::SqlitePool;

use super::{MetricsSource, SourceError};
use crate::{
    db,
    models::{Campaign, MetricSample},
    report::ReportPeriod,
};

/// Samples previously ingested into the `metric_samples` table.
#[derive(Clone)]
pub struct StoredMetrics {
    pool: SqlitePool,
}

impl StoredMetrics {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MetricsSource for StoredMetrics {
    async fn fetch_samples(
        &self,
        campaign: &Campaign,
        period: &ReportPeriod,
    ) -> Result<Vec<MetricSample>, SourceError> {
        Ok(db::list_metric_samples(&self.pool, campaign.id, period.start, period.end).await?)
    }
}
