use crate::models::{
    join_keywords, Campaign, CampaignRow, CampaignStatus, Client, ClientRef, ClientRow,
    CreateCampaignRequest, MetricSample, MetricSampleRow, Platform, Role, SyncedCampaign, User,
    UserRow,
};
use chrono::NaiveDate;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
    SqlitePool,
};

const USER_COLUMNS: &str = "id, email, name, hashed_password, role, is_active, created_at";
const CLIENT_COLUMNS: &str = "id, name, campaign_keywords, is_active, created_at";
const CAMPAIGN_COLUMNS: &str = "id, client_id, name, platform, external_id, status, start_date, \
                                end_date, total_budget, spent_budget, created_at";

// ── Pool ───────────────────────────────────────────────────────────────────

/// Open the SQLite pool and apply the embedded migrations.
///
/// In-memory databases exist per connection, so they get a single connection
/// that is never recycled.
pub async fn connect(database_url: &str) -> anyhow::Result<SqlitePool> {
    let options = database_url
        .parse::<SqliteConnectOptions>()?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .foreign_keys(true);

    let pool = if database_url.contains(":memory:") {
        SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?
    } else {
        SqlitePoolOptions::new()
            .max_connections(10)
            .connect_with(options)
            .await?
    };

    sqlx::migrate!("./migrations").run(&pool).await?;
    tracing::info!("Database migrations applied");

    Ok(pool)
}

fn decode_err(message: String) -> sqlx::Error {
    sqlx::Error::Decode(message.into())
}

// ── Users ──────────────────────────────────────────────────────────────────

pub async fn get_user(pool: &SqlitePool, id: i64) -> Result<Option<User>, sqlx::Error> {
    let row: Option<UserRow> =
        sqlx::query_as(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"))
            .bind(id)
            .fetch_optional(pool)
            .await?;

    row.map(User::try_from).transpose().map_err(decode_err)
}

/// Fetch a user together with their password hash, for login.
pub async fn get_user_with_hash(
    pool: &SqlitePool,
    email: &str,
) -> Result<Option<(User, String)>, sqlx::Error> {
    let row: Option<UserRow> = sqlx::query_as(&format!(
        "SELECT {USER_COLUMNS} FROM users WHERE email = ?1 COLLATE NOCASE"
    ))
    .bind(email)
    .fetch_optional(pool)
    .await?;

    match row {
        Some(row) => {
            let hash = row.hashed_password.clone();
            let user = User::try_from(row).map_err(decode_err)?;
            Ok(Some((user, hash)))
        }
        None => Ok(None),
    }
}

pub async fn email_taken(pool: &SqlitePool, email: &str) -> Result<bool, sqlx::Error> {
    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE email = ?1 COLLATE NOCASE")
            .bind(email)
            .fetch_one(pool)
            .await?;
    Ok(count > 0)
}

pub async fn list_users(pool: &SqlitePool) -> Result<Vec<User>, sqlx::Error> {
    let rows: Vec<UserRow> =
        sqlx::query_as(&format!("SELECT {USER_COLUMNS} FROM users ORDER BY id"))
            .fetch_all(pool)
            .await?;

    rows.into_iter()
        .map(|r| User::try_from(r).map_err(decode_err))
        .collect()
}

pub async fn create_user(
    pool: &SqlitePool,
    email: &str,
    name: Option<&str>,
    hashed_password: &str,
    role: Role,
) -> Result<User, sqlx::Error> {
    let id = sqlx::query(
        "INSERT INTO users (email, name, hashed_password, role) VALUES (?1, ?2, ?3, ?4)",
    )
    .bind(email)
    .bind(name)
    .bind(hashed_password)
    .bind(role.as_str())
    .execute(pool)
    .await?
    .last_insert_rowid();

    get_user(pool, id).await?.ok_or(sqlx::Error::RowNotFound)
}

/// Field-wise user update; `None` leaves the column unchanged.
pub struct UserChanges<'a> {
    pub email: Option<&'a str>,
    pub name: Option<&'a str>,
    pub hashed_password: Option<&'a str>,
    pub role: Option<Role>,
    pub is_active: Option<bool>,
}

pub async fn update_user(
    pool: &SqlitePool,
    id: i64,
    changes: &UserChanges<'_>,
) -> Result<Option<User>, sqlx::Error> {
    let affected = sqlx::query(
        "UPDATE users
         SET email           = COALESCE(?1, email),
             name            = COALESCE(?2, name),
             hashed_password = COALESCE(?3, hashed_password),
             role            = COALESCE(?4, role),
             is_active       = COALESCE(?5, is_active)
         WHERE id = ?6",
    )
    .bind(changes.email)
    .bind(changes.name)
    .bind(changes.hashed_password)
    .bind(changes.role.map(|r| r.as_str()))
    .bind(changes.is_active)
    .bind(id)
    .execute(pool)
    .await?
    .rows_affected();

    if affected == 0 {
        return Ok(None);
    }
    get_user(pool, id).await
}

pub async fn delete_user(pool: &SqlitePool, id: i64) -> Result<bool, sqlx::Error> {
    let affected = sqlx::query("DELETE FROM users WHERE id = ?1")
        .bind(id)
        .execute(pool)
        .await?
        .rows_affected();

    Ok(affected > 0)
}

/// Client ids assigned to a user.
pub async fn assigned_client_ids(pool: &SqlitePool, user_id: i64) -> Result<Vec<i64>, sqlx::Error> {
    sqlx::query_scalar("SELECT client_id FROM user_clients WHERE user_id = ?1 ORDER BY client_id")
        .bind(user_id)
        .fetch_all(pool)
        .await
}

pub async fn assigned_clients(
    pool: &SqlitePool,
    user_id: i64,
) -> Result<Vec<ClientRef>, sqlx::Error> {
    sqlx::query_as(
        "SELECT c.id, c.name
         FROM clients c
         JOIN user_clients uc ON uc.client_id = c.id
         WHERE uc.user_id = ?1
         ORDER BY c.name",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await
}

/// Replace a user's assigned clients. Unknown client ids are ignored.
pub async fn set_assigned_clients(
    pool: &SqlitePool,
    user_id: i64,
    client_ids: &[i64],
) -> Result<(), sqlx::Error> {
    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM user_clients WHERE user_id = ?1")
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

    for client_id in client_ids {
        sqlx::query(
            "INSERT OR IGNORE INTO user_clients (user_id, client_id)
             SELECT ?1, id FROM clients WHERE id = ?2",
        )
        .bind(user_id)
        .bind(client_id)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await
}

// ── Clients ────────────────────────────────────────────────────────────────

pub async fn get_client(pool: &SqlitePool, id: i64) -> Result<Option<Client>, sqlx::Error> {
    let row: Option<ClientRow> =
        sqlx::query_as(&format!("SELECT {CLIENT_COLUMNS} FROM clients WHERE id = ?1"))
            .bind(id)
            .fetch_optional(pool)
            .await?;

    Ok(row.map(Client::from))
}

pub async fn list_clients(pool: &SqlitePool) -> Result<Vec<Client>, sqlx::Error> {
    let rows: Vec<ClientRow> =
        sqlx::query_as(&format!("SELECT {CLIENT_COLUMNS} FROM clients ORDER BY name"))
            .fetch_all(pool)
            .await?;

    Ok(rows.into_iter().map(Client::from).collect())
}

/// Clients assigned to one user, newest assignment order irrelevant.
pub async fn list_clients_for_user(
    pool: &SqlitePool,
    user_id: i64,
) -> Result<Vec<Client>, sqlx::Error> {
    let rows: Vec<ClientRow> = sqlx::query_as(
        "SELECT c.id, c.name, c.campaign_keywords, c.is_active, c.created_at
         FROM clients c
         JOIN user_clients uc ON uc.client_id = c.id
         WHERE uc.user_id = ?1
         ORDER BY c.name",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(Client::from).collect())
}

pub async fn create_client(
    pool: &SqlitePool,
    name: &str,
    keywords: &[String],
    is_active: bool,
) -> Result<Client, sqlx::Error> {
    let id = sqlx::query(
        "INSERT INTO clients (name, campaign_keywords, is_active) VALUES (?1, ?2, ?3)",
    )
    .bind(name)
    .bind(join_keywords(keywords))
    .bind(is_active)
    .execute(pool)
    .await?
    .last_insert_rowid();

    get_client(pool, id).await?.ok_or(sqlx::Error::RowNotFound)
}

pub async fn update_client(
    pool: &SqlitePool,
    id: i64,
    name: &str,
    keywords: &[String],
    is_active: Option<bool>,
) -> Result<Option<Client>, sqlx::Error> {
    let affected = sqlx::query(
        "UPDATE clients
         SET name = ?1, campaign_keywords = ?2, is_active = COALESCE(?3, is_active)
         WHERE id = ?4",
    )
    .bind(name)
    .bind(join_keywords(keywords))
    .bind(is_active)
    .bind(id)
    .execute(pool)
    .await?
    .rows_affected();

    if affected == 0 {
        return Ok(None);
    }
    get_client(pool, id).await
}

/// Permanently delete a client (cascades to campaigns, samples and assignments).
pub async fn delete_client(pool: &SqlitePool, id: i64) -> Result<bool, sqlx::Error> {
    let affected = sqlx::query("DELETE FROM clients WHERE id = ?1")
        .bind(id)
        .execute(pool)
        .await?
        .rows_affected();

    Ok(affected > 0)
}

// ── Campaigns ──────────────────────────────────────────────────────────────

fn to_campaigns(rows: Vec<CampaignRow>) -> Result<Vec<Campaign>, sqlx::Error> {
    rows.into_iter()
        .map(|r| Campaign::try_from(r).map_err(decode_err))
        .collect()
}

pub async fn list_campaigns(
    pool: &SqlitePool,
    client_id: i64,
) -> Result<Vec<Campaign>, sqlx::Error> {
    let rows: Vec<CampaignRow> = sqlx::query_as(&format!(
        "SELECT {CAMPAIGN_COLUMNS} FROM campaigns WHERE client_id = ?1 ORDER BY id"
    ))
    .bind(client_id)
    .fetch_all(pool)
    .await?;

    to_campaigns(rows)
}

pub async fn get_campaign(pool: &SqlitePool, id: i64) -> Result<Option<Campaign>, sqlx::Error> {
    let row: Option<CampaignRow> =
        sqlx::query_as(&format!("SELECT {CAMPAIGN_COLUMNS} FROM campaigns WHERE id = ?1"))
            .bind(id)
            .fetch_optional(pool)
            .await?;

    row.map(Campaign::try_from).transpose().map_err(decode_err)
}

pub async fn create_campaign(
    pool: &SqlitePool,
    client_id: i64,
    req: &CreateCampaignRequest,
) -> Result<Campaign, sqlx::Error> {
    let id = sqlx::query(
        "INSERT INTO campaigns
             (client_id, name, platform, external_id, status, start_date, end_date,
              total_budget, spent_budget)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
    )
    .bind(client_id)
    .bind(req.name.trim())
    .bind(req.platform.as_str())
    .bind(req.external_id.as_deref())
    .bind(req.status.unwrap_or(CampaignStatus::Active).as_str())
    .bind(req.start_date)
    .bind(req.end_date)
    .bind(req.total_budget.to_string())
    .bind(req.spent_budget.to_string())
    .execute(pool)
    .await?
    .last_insert_rowid();

    get_campaign(pool, id).await?.ok_or(sqlx::Error::RowNotFound)
}

/// Insert or refresh a platform campaign, keyed on `(platform, external_id)`.
pub async fn upsert_synced_campaign(
    pool: &SqlitePool,
    client_id: i64,
    platform: Platform,
    campaign: &SyncedCampaign,
    fallback_start: NaiveDate,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO campaigns
             (client_id, name, platform, external_id, status, start_date, end_date,
              total_budget, spent_budget)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
         ON CONFLICT (platform, external_id) DO UPDATE SET
             client_id    = excluded.client_id,
             name         = excluded.name,
             status       = excluded.status,
             start_date   = excluded.start_date,
             end_date     = excluded.end_date,
             total_budget = excluded.total_budget,
             spent_budget = excluded.spent_budget",
    )
    .bind(client_id)
    .bind(&campaign.name)
    .bind(platform.as_str())
    .bind(&campaign.external_id)
    .bind(campaign.status.as_str())
    .bind(campaign.start_date.unwrap_or(fallback_start))
    .bind(campaign.end_date)
    .bind(campaign.total_budget.to_string())
    .bind(campaign.spent_budget.to_string())
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn delete_campaign(pool: &SqlitePool, id: i64) -> Result<bool, sqlx::Error> {
    let affected = sqlx::query("DELETE FROM campaigns WHERE id = ?1")
        .bind(id)
        .execute(pool)
        .await?
        .rows_affected();

    Ok(affected > 0)
}

// ── Metric samples ─────────────────────────────────────────────────────────

/// Samples for one campaign whose date falls inside `[start, end]`.
pub async fn list_metric_samples(
    pool: &SqlitePool,
    campaign_id: i64,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<Vec<MetricSample>, sqlx::Error> {
    let rows: Vec<MetricSampleRow> = sqlx::query_as(
        "SELECT date, impressions, clicks, conversions, spend
         FROM metric_samples
         WHERE campaign_id = ?1 AND date BETWEEN ?2 AND ?3
         ORDER BY date, id",
    )
    .bind(campaign_id)
    .bind(start)
    .bind(end)
    .fetch_all(pool)
    .await?;

    rows.into_iter()
        .map(|r| MetricSample::try_from(r).map_err(decode_err))
        .collect()
}

/// Insert a batch of samples atomically. Returns the number written.
/// Samples are expected to have passed [`MetricSample::validate`].
pub async fn insert_metric_samples(
    pool: &SqlitePool,
    campaign_id: i64,
    samples: &[MetricSample],
) -> Result<u64, sqlx::Error> {
    let mut tx = pool.begin().await?;

    for sample in samples {
        sqlx::query(
            "INSERT INTO metric_samples (campaign_id, date, impressions, clicks, conversions, spend)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )
        .bind(campaign_id)
        .bind(sample.date)
        .bind(to_i64(sample.impressions)?)
        .bind(to_i64(sample.clicks)?)
        .bind(to_i64(sample.conversions)?)
        .bind(sample.spend.to_string())
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(samples.len() as u64)
}

fn to_i64(count: u64) -> Result<i64, sqlx::Error> {
    i64::try_from(count)
        .map_err(|_| sqlx::Error::Protocol(format!("count {count} exceeds the column range")))
}
