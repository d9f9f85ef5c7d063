use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

// ── Roles ──────────────────────────────────────────────────────────────────

/// Dashboard role. Governs which clients a user sees and whether
/// spend-derived figures appear in their reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    AgencyHead,
    ClientManager,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::Admin, Role::AgencyHead, Role::ClientManager];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::AgencyHead => "agency_head",
            Role::ClientManager => "client_manager",
        }
    }

    /// Owner-equivalent roles see spend, CPC, cost per conversion and ROI.
    pub fn can_view_financials(&self) -> bool {
        matches!(self, Role::Admin | Role::AgencyHead)
    }

    /// Owner-equivalent roles are not limited to their assigned clients.
    pub fn can_access_all_clients(&self) -> bool {
        matches!(self, Role::Admin | Role::AgencyHead)
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, Role::Admin)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Role::Admin),
            "agency_head" => Ok(Role::AgencyHead),
            "client_manager" => Ok(Role::ClientManager),
            _ => Err(format!(
                "Invalid role '{s}'. Must be one of: admin, agency_head, client_manager"
            )),
        }
    }
}

// ── Platforms / campaign status ────────────────────────────────────────────

/// External ad platform a campaign is sourced from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    LinkedIn,
    RollWorks,
}

impl Platform {
    pub const ALL: [Platform; 2] = [Platform::LinkedIn, Platform::RollWorks];

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::LinkedIn => "linkedin",
            Platform::RollWorks => "rollworks",
        }
    }

    /// Human-facing name used in rendered reports.
    pub fn label(&self) -> &'static str {
        match self {
            Platform::LinkedIn => "LinkedIn",
            Platform::RollWorks => "RollWorks",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "linkedin" => Ok(Platform::LinkedIn),
            "rollworks" => Ok(Platform::RollWorks),
            _ => Err(format!("Unknown platform: {s}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CampaignStatus {
    Active,
    Paused,
    Completed,
}

impl CampaignStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CampaignStatus::Active => "active",
            CampaignStatus::Paused => "paused",
            CampaignStatus::Completed => "completed",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            CampaignStatus::Active => "Active",
            CampaignStatus::Paused => "Paused",
            CampaignStatus::Completed => "Completed",
        }
    }
}

impl FromStr for CampaignStatus {
    type Err = String;

    /// Accepts our own values plus the spellings the ad platforms use.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "active" | "enabled" | "running" => Ok(CampaignStatus::Active),
            "paused" | "draft" => Ok(CampaignStatus::Paused),
            "completed" | "archived" | "ended" | "canceled" | "cancelled" => {
                Ok(CampaignStatus::Completed)
            }
            _ => Err(format!("Unknown campaign status: {s}")),
        }
    }
}

// ── Clients ────────────────────────────────────────────────────────────────

/// An agency client whose campaigns are reported on.
#[derive(Debug, Clone, Serialize)]
pub struct Client {
    pub id: i64,
    pub name: String,
    pub campaign_keywords: Vec<String>,
    pub is_active: bool,
    pub created_at: NaiveDateTime,
}

impl Client {
    /// True when any keyword occurs in the campaign name (case-insensitive).
    pub fn matches_campaign(&self, campaign_name: &str) -> bool {
        let name = campaign_name.to_lowercase();
        self.campaign_keywords
            .iter()
            .any(|keyword| name.contains(&keyword.to_lowercase()))
    }
}

/// A row from the `clients` table; keywords are stored comma-separated.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ClientRow {
    pub id: i64,
    pub name: String,
    pub campaign_keywords: String,
    pub is_active: bool,
    pub created_at: NaiveDateTime,
}

impl From<ClientRow> for Client {
    fn from(row: ClientRow) -> Self {
        Client {
            id: row.id,
            name: row.name,
            campaign_keywords: split_keywords(&row.campaign_keywords),
            is_active: row.is_active,
            created_at: row.created_at,
        }
    }
}

/// Minimal client reference embedded in user payloads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct ClientRef {
    pub id: i64,
    pub name: String,
}

pub fn split_keywords(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(str::to_owned)
        .collect()
}

pub fn join_keywords(keywords: &[String]) -> String {
    keywords
        .iter()
        .map(|k| k.replace(',', " "))
        .map(|k| k.trim().to_owned())
        .filter(|k| !k.is_empty())
        .collect::<Vec<_>>()
        .join(",")
}

// ── Campaigns ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct Campaign {
    pub id: i64,
    pub client_id: i64,
    pub name: String,
    pub platform: Platform,
    pub external_id: Option<String>,
    pub status: CampaignStatus,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub total_budget: Decimal,
    pub spent_budget: Decimal,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CampaignRow {
    pub id: i64,
    pub client_id: i64,
    pub name: String,
    pub platform: String,
    pub external_id: Option<String>,
    pub status: String,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub total_budget: String,
    pub spent_budget: String,
    pub created_at: NaiveDateTime,
}

impl TryFrom<CampaignRow> for Campaign {
    type Error = String;

    fn try_from(row: CampaignRow) -> Result<Self, Self::Error> {
        Ok(Campaign {
            id: row.id,
            client_id: row.client_id,
            name: row.name,
            platform: row.platform.parse()?,
            external_id: row.external_id,
            status: row.status.parse()?,
            start_date: row.start_date,
            end_date: row.end_date,
            total_budget: parse_money(&row.total_budget)?,
            spent_budget: parse_money(&row.spent_budget)?,
            created_at: row.created_at,
        })
    }
}

/// A campaign record as reported by an ad platform, already normalised.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncedCampaign {
    pub external_id: String,
    pub name: String,
    pub status: CampaignStatus,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub total_budget: Decimal,
    pub spent_budget: Decimal,
}

// ── Metric samples ─────────────────────────────────────────────────────────

/// One per-campaign measurement for a single day. Counts are non-negative by
/// type; spend is validated non-negative wherever samples enter the system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricSample {
    pub date: NaiveDate,
    #[serde(default)]
    pub impressions: u64,
    #[serde(default)]
    pub clicks: u64,
    #[serde(default)]
    pub conversions: u64,
    #[serde(default)]
    pub spend: Decimal,
}

/// Largest spend accepted for a single sample (one trillion).
pub const MAX_SAMPLE_SPEND: Decimal = Decimal::from_parts(0xD4A5_1000, 0xE8, 0, false, 0);

impl MetricSample {
    /// Reject samples the store cannot hold or the aggregator should never
    /// see: negative or oversized spend, counts beyond `i64::MAX`.
    pub fn validate(&self) -> Result<(), String> {
        if self.spend.is_sign_negative() && !self.spend.is_zero() {
            return Err(format!(
                "spend must not be negative (got {} on {})",
                self.spend, self.date
            ));
        }
        if self.spend > MAX_SAMPLE_SPEND {
            return Err(format!(
                "spend must not exceed {MAX_SAMPLE_SPEND} (got {} on {})",
                self.spend, self.date
            ));
        }
        for (field, value) in [
            ("impressions", self.impressions),
            ("clicks", self.clicks),
            ("conversions", self.conversions),
        ] {
            if i64::try_from(value).is_err() {
                return Err(format!("{field} out of range (got {value} on {})", self.date));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct MetricSampleRow {
    pub date: NaiveDate,
    pub impressions: i64,
    pub clicks: i64,
    pub conversions: i64,
    pub spend: String,
}

impl TryFrom<MetricSampleRow> for MetricSample {
    type Error = String;

    fn try_from(row: MetricSampleRow) -> Result<Self, Self::Error> {
        let count = |value: i64, field: &str| {
            u64::try_from(value).map_err(|_| format!("negative {field} count: {value}"))
        };
        Ok(MetricSample {
            date: row.date,
            impressions: count(row.impressions, "impressions")?,
            clicks: count(row.clicks, "clicks")?,
            conversions: count(row.conversions, "conversions")?,
            spend: parse_money(&row.spend)?,
        })
    }
}

/// Parse a stored decimal amount, rejecting negatives.
pub fn parse_money(raw: &str) -> Result<Decimal, String> {
    let value = Decimal::from_str(raw.trim()).map_err(|e| format!("invalid amount '{raw}': {e}"))?;
    if value.is_sign_negative() && !value.is_zero() {
        return Err(format!("negative amount: {raw}"));
    }
    Ok(value)
}

// ── Users ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub name: Option<String>,
    pub role: Role,
    pub is_active: bool,
    pub created_at: NaiveDateTime,
}

/// A row from the `users` table, including the password hash.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UserRow {
    pub id: i64,
    pub email: String,
    pub name: Option<String>,
    pub hashed_password: String,
    pub role: String,
    pub is_active: bool,
    pub created_at: NaiveDateTime,
}

impl TryFrom<UserRow> for User {
    type Error = String;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        Ok(User {
            id: row.id,
            email: row.email,
            name: row.name,
            role: row.role.parse()?,
            is_active: row.is_active,
            created_at: row.created_at,
        })
    }
}

/// User payload returned by the API, with the assigned clients.
#[derive(Debug, Clone, Serialize)]
pub struct UserResponse {
    pub id: i64,
    pub email: String,
    pub name: String,
    pub role: Role,
    pub is_active: bool,
    pub clients: Vec<ClientRef>,
}

impl UserResponse {
    pub fn new(user: User, clients: Vec<ClientRef>) -> Self {
        // Fall back to the mailbox name when no display name was set
        let name = user
            .name
            .clone()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| user.email.split('@').next().unwrap_or_default().to_owned());
        UserResponse {
            id: user.id,
            email: user.email,
            name,
            role: user.role,
            is_active: user.is_active,
            clients,
        }
    }
}

// ── Request payloads ───────────────────────────────────────────────────────

/// OAuth2-style password form posted to `/auth/token`.
#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
}

#[derive(Debug, Deserialize)]
pub struct ClientPayload {
    pub name: String,
    #[serde(default)]
    pub campaign_keywords: Vec<String>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct CreateCampaignRequest {
    pub name: String,
    pub platform: Platform,
    pub external_id: Option<String>,
    pub status: Option<CampaignStatus>,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub total_budget: Decimal,
    #[serde(default)]
    pub spent_budget: Decimal,
}

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub email: String,
    pub name: Option<String>,
    pub password: String,
    pub role: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateUserRequest {
    pub email: Option<String>,
    pub name: Option<String>,
    pub password: Option<String>,
    pub role: Option<String>,
    pub is_active: Option<bool>,
    pub clients: Option<Vec<i64>>,
}
