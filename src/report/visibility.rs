use rust_decimal::Decimal;
use serde::Serialize;

use super::aggregate::AggregatedMetrics;
use crate::models::Role;

/// What a caller is allowed to see of an [`AggregatedMetrics`]. Spend-derived
/// fields are `None` for roles without financial visibility and are then
/// omitted from serialized and rendered output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MetricsView {
    pub impressions: u64,
    pub clicks: u64,
    pub conversions: u64,
    pub ctr: Decimal,
    pub conversion_rate: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spend: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cost_per_click: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cost_per_conversion: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub roi: Option<Decimal>,
}

impl MetricsView {
    /// Every field present.
    pub fn full(metrics: &AggregatedMetrics) -> Self {
        Self {
            impressions: metrics.totals.impressions,
            clicks: metrics.totals.clicks,
            conversions: metrics.totals.conversions,
            ctr: metrics.ctr,
            conversion_rate: metrics.conversion_rate,
            spend: Some(metrics.totals.spend),
            cost_per_click: Some(metrics.cost_per_click),
            cost_per_conversion: Some(metrics.cost_per_conversion),
            roi: Some(metrics.roi),
        }
    }

    /// Drop the spend-derived fields the role may not see.
    pub fn redact(self, role: Role) -> Self {
        if role.can_view_financials() {
            return self;
        }
        Self {
            spend: None,
            cost_per_click: None,
            cost_per_conversion: None,
            roi: None,
            ..self
        }
    }
}

/// The view of `metrics` visible to `role`. `metrics` itself is untouched.
pub fn filter_for_role(metrics: &AggregatedMetrics, role: Role) -> MetricsView {
    MetricsView::full(metrics).redact(role)
}
