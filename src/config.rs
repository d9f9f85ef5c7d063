use anyhow::{Context, Result};
use std::{str::FromStr, time::Duration};

use crate::models::Platform;

#[derive(Debug, Clone)]
pub struct AppConfig {
    /// SQLite connection string, e.g. "sqlite:./adreport.db"
    pub database_url: String,

    /// Host to bind the HTTP server to, e.g. "0.0.0.0"
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// HS256 key used to sign and verify bearer tokens
    pub jwt_secret: String,

    /// Lifetime of an issued access token
    pub access_token_ttl: Duration,

    /// When true, a campaign whose metrics source fails contributes zero
    /// samples and the report is flagged degraded. When false the export
    /// fails with 502 instead.
    pub degrade_on_source_failure: bool,

    /// Outbound HTTP settings shared by all ad-platform clients
    pub platform_http: PlatformHttpConfig,

    pub linkedin: PlatformConfig,
    pub rollworks: PlatformConfig,

    /// Optional first admin, created at startup when missing
    pub bootstrap_admin: Option<(String, String)>,
}

#[derive(Debug, Clone)]
pub struct PlatformHttpConfig {
    pub timeout: Duration,
    /// Token refreshes attempted before re-authentication is required
    pub max_refresh_attempts: u32,
    /// Base delay of the exponential refresh backoff
    pub refresh_backoff: Duration,
}

impl Default for PlatformHttpConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_refresh_attempts: 3,
            refresh_backoff: Duration::from_millis(250),
        }
    }
}

/// Endpoints and credentials for one ad platform.
#[derive(Debug, Clone, Default)]
pub struct PlatformConfig {
    pub api_url: String,
    pub token_url: String,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
}

impl PlatformConfig {
    /// A platform is usable once it holds either kind of token.
    pub fn is_configured(&self) -> bool {
        self.access_token.is_some() || self.refresh_token.is_some()
    }

    fn from_env(platform: Platform) -> Self {
        let (prefix, api_default, token_default) = match platform {
            Platform::LinkedIn => (
                "LINKEDIN",
                "https://api.linkedin.com/v2".to_owned(),
                "https://www.linkedin.com/oauth/v2/accessToken".to_owned(),
            ),
            Platform::RollWorks => (
                "ROLLWORKS",
                "https://api.rollworks.com/v1".to_owned(),
                "https://api.rollworks.com/v1/oauth/token".to_owned(),
            ),
        };
        // RollWorks calls its OAuth client id an API key
        let client_id_var = match platform {
            Platform::LinkedIn => "LINKEDIN_CLIENT_ID",
            Platform::RollWorks => "ROLLWORKS_API_KEY",
        };

        Self {
            api_url: env_string(&format!("{prefix}_API_URL"))
                .unwrap_or(api_default)
                .trim_end_matches('/')
                .to_owned(),
            token_url: env_string(&format!("{prefix}_TOKEN_URL")).unwrap_or(token_default),
            client_id: env_string(client_id_var),
            client_secret: env_string(&format!("{prefix}_CLIENT_SECRET")),
            access_token: env_string(&format!("{prefix}_ACCESS_TOKEN")),
            refresh_token: env_string(&format!("{prefix}_REFRESH_TOKEN")),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables (populated by dotenvy before this is called).
    pub fn from_env() -> Result<Self> {
        let jwt_secret = std::env::var("JWT_SECRET")
            .context("JWT_SECRET must be set in the environment or .env file")?;

        if jwt_secret.trim().is_empty() {
            anyhow::bail!("JWT_SECRET must not be empty");
        }

        let port = env_parse("PORT", 8000u16)
            .context("PORT must be a valid port number (1–65535)")?;

        let access_token_minutes = env_parse("ACCESS_TOKEN_EXPIRE_MINUTES", 30u64)
            .context("ACCESS_TOKEN_EXPIRE_MINUTES must be a whole number of minutes")?;

        let degrade_on_source_failure = env_parse("REPORT_DEGRADE_ON_SOURCE_FAILURE", true)
            .context("REPORT_DEGRADE_ON_SOURCE_FAILURE must be true or false")?;

        let defaults = PlatformHttpConfig::default();
        let platform_http = PlatformHttpConfig {
            timeout: Duration::from_secs(
                env_parse("PLATFORM_TIMEOUT_SECS", defaults.timeout.as_secs())
                    .context("PLATFORM_TIMEOUT_SECS must be a whole number of seconds")?,
            ),
            max_refresh_attempts: env_parse(
                "PLATFORM_MAX_REFRESH_ATTEMPTS",
                defaults.max_refresh_attempts,
            )
            .context("PLATFORM_MAX_REFRESH_ATTEMPTS must be a whole number")?,
            refresh_backoff: Duration::from_millis(
                env_parse(
                    "PLATFORM_REFRESH_BACKOFF_MS",
                    defaults.refresh_backoff.as_millis() as u64,
                )
                .context("PLATFORM_REFRESH_BACKOFF_MS must be a whole number of milliseconds")?,
            ),
        };

        let bootstrap_admin = match (
            env_string("BOOTSTRAP_ADMIN_EMAIL"),
            env_string("BOOTSTRAP_ADMIN_PASSWORD"),
        ) {
            (Some(email), Some(password)) => Some((email, password)),
            (None, None) => None,
            _ => anyhow::bail!(
                "BOOTSTRAP_ADMIN_EMAIL and BOOTSTRAP_ADMIN_PASSWORD must be set together"
            ),
        };

        Ok(Self {
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite:./adreport.db".into()),
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port,
            jwt_secret,
            access_token_ttl: Duration::from_secs(access_token_minutes * 60),
            degrade_on_source_failure,
            platform_http,
            linkedin: PlatformConfig::from_env(Platform::LinkedIn),
            rollworks: PlatformConfig::from_env(Platform::RollWorks),
            bootstrap_admin,
        })
    }

    /// Configuration with every optional setting at its default and no
    /// platform credentials. Used for local runs and tests.
    pub fn local(database_url: &str, jwt_secret: &str) -> Self {
        Self {
            database_url: database_url.to_owned(),
            host: "127.0.0.1".to_owned(),
            port: 8000,
            jwt_secret: jwt_secret.to_owned(),
            access_token_ttl: Duration::from_secs(30 * 60),
            degrade_on_source_failure: true,
            platform_http: PlatformHttpConfig::default(),
            linkedin: PlatformConfig::default(),
            rollworks: PlatformConfig::default(),
            bootstrap_admin: None,
        }
    }

    pub fn platform(&self, platform: Platform) -> &PlatformConfig {
        match platform {
            Platform::LinkedIn => &self.linkedin,
            Platform::RollWorks => &self.rollworks,
        }
    }
}

/// Non-empty environment variable, trimmed.
fn env_string(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
}

fn env_parse<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env_string(key) {
        Some(raw) => raw
            .parse::<T>()
            .with_context(|| format!("invalid value for {key}: {raw}")),
        None => Ok(default),
    }
}
