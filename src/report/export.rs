use chrono::Utc;
use serde::Serialize;

use super::{
    aggregate::aggregate,
    render::{BudgetSummary, CampaignSection, RenderedDocument, ReportModel},
    visibility::filter_for_role,
    ReportPeriod,
};
use crate::{
    auth::Caller,
    db,
    error::AppError,
    models::{Client, MetricSample},
    AppState,
};

/// A report assembled for one caller, before rendering.
pub struct ReportData {
    pub client: Client,
    /// Role-filtered model handed to the renderer.
    pub model: ReportModel,
    pub degraded_campaign_ids: Vec<i64>,
}

pub struct ExportedReport {
    pub filename: String,
    pub document: RenderedDocument,
    pub degraded_campaign_ids: Vec<i64>,
}

/// JSON body of `GET /reports/summary`.
#[derive(Debug, Serialize)]
pub struct ReportSummary {
    pub client_id: i64,
    #[serde(flatten)]
    pub report: ReportModel,
    pub degraded_campaign_ids: Vec<i64>,
}

/// Gather, aggregate and filter a client's report for `caller`.
///
/// Access is checked before anything is read, so a caller without access to
/// the client learns nothing, not even whether it exists. Campaigns without
/// samples in the period contribute zeros.
pub async fn build_report(
    state: &AppState,
    caller: &Caller,
    client_id: i64,
    period: ReportPeriod,
) -> Result<ReportData, AppError> {
    caller.require_client_access(client_id)?;

    let client = db::get_client(&state.db, client_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Client not found".into()))?;
    let campaigns = db::list_campaigns(&state.db, client_id).await?;

    let mut all_samples: Vec<MetricSample> = Vec::new();
    let mut sections = Vec::with_capacity(campaigns.len());
    let mut degraded_campaign_ids = Vec::new();

    for campaign in &campaigns {
        let fetched = state.sources.fetch(campaign, &period).await?;
        if fetched.is_degraded() {
            degraded_campaign_ids.push(campaign.id);
        }

        let campaign_metrics = aggregate(&fetched.samples)?;
        sections.push(CampaignSection {
            id: campaign.id,
            name: campaign.name.clone(),
            platform: campaign.platform,
            status: campaign.status,
            metrics: filter_for_role(&campaign_metrics, caller.role),
            degraded: fetched.is_degraded(),
        });
        all_samples.extend(fetched.samples);
    }

    let metrics = aggregate(&all_samples)?;

    tracing::info!(
        client_id,
        user_id = caller.user_id,
        role = %caller.role,
        campaigns = campaigns.len(),
        samples = all_samples.len(),
        degraded = degraded_campaign_ids.len(),
        "report assembled"
    );

    let model = ReportModel {
        client_name: client.name.clone(),
        period,
        summary: filter_for_role(&metrics, caller.role),
        campaigns: sections,
        budget: caller
            .role
            .can_view_financials()
            .then(|| BudgetSummary::from_campaigns(&campaigns)),
        generated_at: Utc::now(),
    };

    Ok(ReportData {
        client,
        model,
        degraded_campaign_ids,
    })
}

/// Build and render the report document.
pub async fn export_report(
    state: &AppState,
    caller: &Caller,
    client_id: i64,
    period: ReportPeriod,
) -> Result<ExportedReport, AppError> {
    let data = build_report(state, caller, client_id, period).await?;
    let document = state.renderer.render(data.model).await?;
    let filename = report_filename(&data.client.name, &period, document.extension);

    Ok(ExportedReport {
        filename,
        document,
        degraded_campaign_ids: data.degraded_campaign_ids,
    })
}

/// `{client}_report_{start}_to_{end}.{ext}`, with every character of the
/// client name outside `[A-Za-z0-9_-]` replaced by `_`.
pub fn report_filename(client_name: &str, period: &ReportPeriod, extension: &str) -> String {
    let safe: String = client_name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!("{safe}_report_{}_to_{}.{extension}", period.start, period.end)
}
