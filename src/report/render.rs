use askama::Template;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::io::{Cursor, Write};
use zip::{write::FileOptions, CompressionMethod, ZipWriter};

use super::{aggregate::guarded_div, format, visibility::MetricsView, ReportPeriod};
use crate::models::{Campaign, CampaignStatus, Platform};

pub const PPTX_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.presentationml.presentation";

/// Campaign blocks per details slide (2 × 2 grid).
pub const CAMPAIGNS_PER_SLIDE: usize = 4;

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("template error: {0}")]
    Template(#[from] askama::Error),

    #[error("packaging error: {0}")]
    Package(#[from] zip::result::ZipError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("render task failed: {0}")]
    Task(String),
}

// ── Report model ───────────────────────────────────────────────────────────

/// Everything the renderer needs. Metric views are already filtered for the
/// caller's role.
#[derive(Debug, Clone, Serialize)]
pub struct ReportModel {
    pub client_name: String,
    pub period: ReportPeriod,
    pub summary: MetricsView,
    pub campaigns: Vec<CampaignSection>,
    /// Present only for roles with financial visibility.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub budget: Option<BudgetSummary>,
    pub generated_at: DateTime<Utc>,
}

impl ReportModel {
    pub fn degraded_campaigns(&self) -> usize {
        self.campaigns.iter().filter(|c| c.degraded).count()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CampaignSection {
    pub id: i64,
    pub name: String,
    pub platform: Platform,
    pub status: CampaignStatus,
    pub metrics: MetricsView,
    /// The campaign's source failed and its figures are zero fallbacks.
    pub degraded: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BudgetSummary {
    pub total: Decimal,
    pub spent: Decimal,
    /// Fraction of the total already spent; 0 when there is no budget.
    pub utilization: Decimal,
    pub remaining: Decimal,
}

impl BudgetSummary {
    pub fn from_campaigns(campaigns: &[Campaign]) -> Self {
        let total: Decimal = campaigns.iter().map(|c| c.total_budget).sum();
        let spent: Decimal = campaigns.iter().map(|c| c.spent_budget).sum();
        Self {
            total,
            spent,
            utilization: guarded_div(spent, total),
            remaining: total - spent,
        }
    }
}

pub struct RenderedDocument {
    pub bytes: Vec<u8>,
    pub content_type: &'static str,
    pub extension: &'static str,
}

/// Turns a report model into a downloadable document.
#[async_trait]
pub trait DocumentRenderer: Send + Sync {
    async fn render(&self, model: ReportModel) -> Result<RenderedDocument, RenderError>;
}

/// Renders Office Open XML presentations.
#[derive(Debug, Default, Clone, Copy)]
pub struct PptxRenderer;

#[async_trait]
impl DocumentRenderer for PptxRenderer {
    async fn render(&self, model: ReportModel) -> Result<RenderedDocument, RenderError> {
        // Templating and deflate are CPU work; keep them off the async workers
        let bytes = tokio::task::spawn_blocking(move || render_pptx(&model))
            .await
            .map_err(|e| RenderError::Task(e.to_string()))??;

        Ok(RenderedDocument {
            bytes,
            content_type: PPTX_CONTENT_TYPE,
            extension: "pptx",
        })
    }
}

// ── Slide composition ──────────────────────────────────────────────────────

const SLIDE_WIDTH: i64 = 12_192_000;
const SLIDE_HEIGHT: i64 = 6_858_000;
const MARGIN: i64 = 457_200;
const TITLE_HEIGHT: i64 = 1_005_840;
const BODY_TOP: i64 = MARGIN + TITLE_HEIGHT + 182_880;

const TITLE_SIZE: u32 = 3600;
const HEADING_SIZE: u32 = 2000;
const BODY_SIZE: u32 = 1800;
const DETAIL_SIZE: u32 = 1200;

struct Paragraph {
    text: String,
    bold: bool,
    size: u32,
}

impl Paragraph {
    fn new(text: impl Into<String>, size: u32) -> Self {
        Self { text: text.into(), bold: false, size }
    }

    fn bold(text: impl Into<String>, size: u32) -> Self {
        Self { text: text.into(), bold: true, size }
    }
}

struct Shape {
    id: u32,
    name: String,
    x: i64,
    y: i64,
    cx: i64,
    cy: i64,
    paragraphs: Vec<Paragraph>,
}

struct Slide {
    shapes: Vec<Shape>,
}

impl Slide {
    fn new(title: &str) -> Self {
        Self {
            shapes: vec![Shape {
                id: 2,
                name: "Title".to_owned(),
                x: MARGIN,
                y: MARGIN,
                cx: SLIDE_WIDTH - 2 * MARGIN,
                cy: TITLE_HEIGHT,
                paragraphs: vec![Paragraph::bold(title, TITLE_SIZE)],
            }],
        }
    }

    fn with_body(title: &str, paragraphs: Vec<Paragraph>) -> Self {
        let mut slide = Self::new(title);
        slide.add_box(
            MARGIN,
            BODY_TOP,
            SLIDE_WIDTH - 2 * MARGIN,
            SLIDE_HEIGHT - BODY_TOP - MARGIN,
            paragraphs,
        );
        slide
    }

    fn add_box(&mut self, x: i64, y: i64, cx: i64, cy: i64, paragraphs: Vec<Paragraph>) {
        let id = self.shapes.len() as u32 + 2;
        self.shapes.push(Shape {
            id,
            name: format!("Text {}", id - 1),
            x,
            y,
            cx,
            cy,
            paragraphs,
        });
    }
}

/// Metric lines in display order. Spend-derived lines appear only when the
/// view carries them.
fn metric_lines(view: &MetricsView) -> Vec<String> {
    let mut lines = vec![
        format!("Impressions: {}", format::count(view.impressions)),
        format!("Clicks: {}", format::count(view.clicks)),
        format!("Conversions: {}", format::count(view.conversions)),
        format!("CTR: {}", format::percent(view.ctr)),
        format!("Conversion rate: {}", format::percent(view.conversion_rate)),
    ];
    if let Some(spend) = view.spend {
        lines.push(format!("Spend: {}", format::currency(spend)));
    }
    if let Some(cpc) = view.cost_per_click {
        lines.push(format!("Cost per click: {}", format::currency(cpc)));
    }
    if let Some(cpa) = view.cost_per_conversion {
        lines.push(format!("Cost per conversion: {}", format::currency(cpa)));
    }
    if let Some(roi) = view.roi {
        lines.push(format!("ROI: {}", format::percent(roi)));
    }
    lines
}

fn title_slide(model: &ReportModel) -> Slide {
    let mut body = vec![
        Paragraph::new(
            format!("Period: {} to {}", model.period.start, model.period.end),
            HEADING_SIZE,
        ),
        Paragraph::new(format!("Campaigns: {}", model.campaigns.len()), BODY_SIZE),
    ];
    let degraded = model.degraded_campaigns();
    if degraded > 0 {
        body.push(Paragraph::new("", BODY_SIZE));
        body.push(Paragraph::bold(
            format!(
                "Note: metrics for {degraded} campaign(s) were unavailable. \
                 Totals may be understated."
            ),
            BODY_SIZE,
        ));
    }
    body.push(Paragraph::new("", BODY_SIZE));
    body.push(Paragraph::new(
        format!("Generated {}", model.generated_at.format("%Y-%m-%d %H:%M UTC")),
        DETAIL_SIZE,
    ));

    Slide::with_body(&format!("Campaign Report - {}", model.client_name), body)
}

fn summary_slide(model: &ReportModel) -> Slide {
    let body = metric_lines(&model.summary)
        .into_iter()
        .map(|line| Paragraph::new(line, BODY_SIZE))
        .collect();
    Slide::with_body("Performance Summary", body)
}

fn budget_slide(budget: &BudgetSummary) -> Slide {
    let body = vec![
        Paragraph::new(format!("Total budget: {}", format::currency(budget.total)), BODY_SIZE),
        Paragraph::new(format!("Spent: {}", format::currency(budget.spent)), BODY_SIZE),
        Paragraph::new(
            format!("Utilization: {}", format::percent(budget.utilization)),
            BODY_SIZE,
        ),
        Paragraph::new(format!("Remaining: {}", format::currency(budget.remaining)), BODY_SIZE),
    ];
    Slide::with_body("Budget Utilization", body)
}

fn campaign_block(section: &CampaignSection) -> Vec<Paragraph> {
    let mut paragraphs = vec![
        Paragraph::bold(section.name.clone(), BODY_SIZE),
        Paragraph::new(
            format!("{} | {}", section.platform.label(), section.status.label()),
            DETAIL_SIZE,
        ),
    ];
    if section.degraded {
        paragraphs.push(Paragraph::bold(
            "Metrics unavailable from the platform; figures shown as zero.",
            DETAIL_SIZE,
        ));
    }
    paragraphs.extend(
        metric_lines(&section.metrics)
            .into_iter()
            .map(|line| Paragraph::new(line, DETAIL_SIZE)),
    );
    paragraphs
}

fn campaign_slides(campaigns: &[CampaignSection]) -> Vec<Slide> {
    if campaigns.is_empty() {
        return vec![Slide::with_body(
            "Campaign Details",
            vec![Paragraph::new("No campaigns found for this client.", BODY_SIZE)],
        )];
    }

    let pages = campaigns.len().div_ceil(CAMPAIGNS_PER_SLIDE);
    let col_width = (SLIDE_WIDTH - 3 * MARGIN) / 2;
    let row_height = (SLIDE_HEIGHT - BODY_TOP - 2 * MARGIN) / 2;

    campaigns
        .chunks(CAMPAIGNS_PER_SLIDE)
        .enumerate()
        .map(|(page, chunk)| {
            let title = if pages > 1 {
                format!("Campaign Details ({}/{pages})", page + 1)
            } else {
                "Campaign Details".to_owned()
            };
            let mut slide = Slide::new(&title);
            for (i, section) in chunk.iter().enumerate() {
                let col = (i % 2) as i64;
                let row = (i / 2) as i64;
                slide.add_box(
                    MARGIN + col * (col_width + MARGIN),
                    BODY_TOP + row * (row_height + MARGIN),
                    col_width,
                    row_height,
                    campaign_block(section),
                );
            }
            slide
        })
        .collect()
}

fn compose(model: &ReportModel) -> Vec<Slide> {
    let mut slides = vec![title_slide(model), summary_slide(model)];
    if let Some(budget) = &model.budget {
        slides.push(budget_slide(budget));
    }
    slides.extend(campaign_slides(&model.campaigns));
    slides
}

// ── XML parts ──────────────────────────────────────────────────────────────

struct SlideRef {
    id: u32,
    rel_id: String,
    number: usize,
}

#[derive(Template)]
#[template(path = "pptx/slide.xml")]
struct SlideXml<'a> {
    shapes: &'a [Shape],
}

#[derive(Template)]
#[template(path = "pptx/presentation.xml")]
struct PresentationXml<'a> {
    slides: &'a [SlideRef],
    width: i64,
    height: i64,
}

#[derive(Template)]
#[template(path = "pptx/presentation_rels.xml")]
struct PresentationRelsXml<'a> {
    slides: &'a [SlideRef],
}

#[derive(Template)]
#[template(path = "pptx/content_types.xml")]
struct ContentTypesXml<'a> {
    slides: &'a [SlideRef],
}

#[derive(Template)]
#[template(path = "pptx/core.xml")]
struct CoreXml<'a> {
    title: &'a str,
    created: String,
}

#[derive(Template)]
#[template(path = "pptx/app.xml")]
struct AppXml {
    slide_count: usize,
}

const ROOT_RELS: &str = include_str!("../../templates/pptx/static/rels.xml");
const SLIDE_RELS: &str = include_str!("../../templates/pptx/static/slide_rels.xml");
const SLIDE_MASTER: &str = include_str!("../../templates/pptx/static/slideMaster1.xml");
const SLIDE_MASTER_RELS: &str = include_str!("../../templates/pptx/static/slideMaster1_rels.xml");
const SLIDE_LAYOUT: &str = include_str!("../../templates/pptx/static/slideLayout1.xml");
const SLIDE_LAYOUT_RELS: &str = include_str!("../../templates/pptx/static/slideLayout1_rels.xml");
const THEME: &str = include_str!("../../templates/pptx/static/theme1.xml");

/// Build the `.pptx` package for a report.
pub fn render_pptx(model: &ReportModel) -> Result<Vec<u8>, RenderError> {
    let slides = compose(model);

    // Presentation rIds 1 and 2 are the master and theme
    let refs: Vec<SlideRef> = (1..=slides.len())
        .map(|number| SlideRef {
            id: 255 + number as u32,
            rel_id: format!("rId{}", number + 2),
            number,
        })
        .collect();

    let title = format!("Campaign Report - {}", model.client_name);
    let mut parts: Vec<(String, String)> = vec![
        (
            "[Content_Types].xml".to_owned(),
            ContentTypesXml { slides: &refs }.render()?,
        ),
        ("_rels/.rels".to_owned(), ROOT_RELS.to_owned()),
        (
            "docProps/core.xml".to_owned(),
            CoreXml {
                title: &title,
                created: model.generated_at.format("%Y-%m-%dT%H:%M:%SZ").to_string(),
            }
            .render()?,
        ),
        (
            "docProps/app.xml".to_owned(),
            AppXml { slide_count: slides.len() }.render()?,
        ),
        (
            "ppt/presentation.xml".to_owned(),
            PresentationXml {
                slides: &refs,
                width: SLIDE_WIDTH,
                height: SLIDE_HEIGHT,
            }
            .render()?,
        ),
        (
            "ppt/_rels/presentation.xml.rels".to_owned(),
            PresentationRelsXml { slides: &refs }.render()?,
        ),
        ("ppt/slideMasters/slideMaster1.xml".to_owned(), SLIDE_MASTER.to_owned()),
        (
            "ppt/slideMasters/_rels/slideMaster1.xml.rels".to_owned(),
            SLIDE_MASTER_RELS.to_owned(),
        ),
        ("ppt/slideLayouts/slideLayout1.xml".to_owned(), SLIDE_LAYOUT.to_owned()),
        (
            "ppt/slideLayouts/_rels/slideLayout1.xml.rels".to_owned(),
            SLIDE_LAYOUT_RELS.to_owned(),
        ),
        ("ppt/theme/theme1.xml".to_owned(), THEME.to_owned()),
    ];

    for (slide, slide_ref) in slides.iter().zip(&refs) {
        parts.push((
            format!("ppt/slides/slide{}.xml", slide_ref.number),
            SlideXml { shapes: &slide.shapes }.render()?,
        ));
        parts.push((
            format!("ppt/slides/_rels/slide{}.xml.rels", slide_ref.number),
            SLIDE_RELS.to_owned(),
        ));
    }

    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);
    for (name, body) in parts {
        zip.start_file(name, options)?;
        zip.write_all(body.as_bytes())?;
    }

    Ok(zip.finish()?.into_inner())
}
