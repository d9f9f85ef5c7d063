//! Report pipeline: aggregate samples, redact by role, render a deck.

pub mod aggregate;
pub mod export;
pub mod format;
pub mod render;
pub mod visibility;

pub use aggregate::{aggregate, AggregateOverflow, AggregatedMetrics, Totals};
pub use export::{
    build_report, export_report, report_filename, ExportedReport, ReportData, ReportSummary,
};
pub use render::{DocumentRenderer, PptxRenderer, RenderError, RenderedDocument, ReportModel};
pub use visibility::MetricsView;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Inclusive reporting window. `start <= end` always holds once constructed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReportPeriod {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl ReportPeriod {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, AppError> {
        if start > end {
            return Err(AppError::Validation(format!(
                "start_date ({start}) must be on or before end_date ({end})"
            )));
        }
        Ok(Self { start, end })
    }

    /// Parse `YYYY-MM-DD` query parameters.
    pub fn parse(start: &str, end: &str) -> Result<Self, AppError> {
        Self::new(parse_date("start_date", start)?, parse_date("end_date", end)?)
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

fn parse_date(field: &str, raw: &str) -> Result<NaiveDate, AppError> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").map_err(|_| {
        AppError::Validation(format!("{field} must be a date in YYYY-MM-DD format, got '{raw}'"))
    })
}

/// Query string shared by the export and summary endpoints.
#[derive(Debug, Deserialize)]
pub struct PeriodQuery {
    pub start_date: String,
    pub end_date: String,
}
