use serde::Deserialize;

/// Default days between a generated period's end date and its reading deadline.
pub const DEFAULT_READING_DEADLINE_GRACE_DAYS: u32 = 14;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub jwt_secret: String,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            database_url: database_url_from_env()?,
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("PORT must be a valid number between 1-65535"))?,
            jwt_secret: std::env::var("JWT_SECRET")
                .map_err(|_| anyhow::anyhow!("JWT_SECRET environment variable required"))
                .and_then(|secret| {
                    if secret.trim().is_empty() {
                        anyhow::bail!("JWT_SECRET cannot be empty");
                    }
                    Ok(secret)
                })?,
        };

        // Log without sensitive values
        tracing::debug!("Database: {}", redact_database_url(&config.database_url));
        tracing::debug!("Server Port: {}", config.port);

        Ok(config)
    }
}

/// Reads and validates `DB_URL` / `DATABASE_URL`.
///
/// Maintenance binaries only need the database, so they call this directly
/// instead of loading the full server configuration.
pub fn database_url_from_env() -> anyhow::Result<String> {
    dotenvy::dotenv().ok();

    let url = std::env::var("DB_URL")
        .or_else(|_| std::env::var("DATABASE_URL"))
        .map_err(|_| anyhow::anyhow!("DB_URL or DATABASE_URL environment variable required"))?;

    validate_database_url(&url)?;
    Ok(url)
}

/// Reads `READING_DEADLINE_GRACE_DAYS`, the days between a generated
/// period's end date and its reading deadline.
pub fn grace_days_from_env() -> anyhow::Result<u32> {
    dotenvy::dotenv().ok();

    let days = parse_grace_days(std::env::var("READING_DEADLINE_GRACE_DAYS").ok().as_deref())?;
    tracing::debug!("Reading deadline grace: {} days", days);
    Ok(days)
}

fn parse_grace_days(raw: Option<&str>) -> anyhow::Result<u32> {
    match raw.map(str::trim) {
        None | Some("") => Ok(DEFAULT_READING_DEADLINE_GRACE_DAYS),
        Some(days) => days.parse().map_err(|_| {
            anyhow::anyhow!(
                "READING_DEADLINE_GRACE_DAYS must be a non-negative number, got '{}'",
                days
            )
        }),
    }
}

/// Scheme, host and database of a connection URL, without credentials.
pub fn redact_database_url(url: &str) -> String {
    let (scheme, rest) = url.split_once("://").unwrap_or(("", url));
    let location = rest.rsplit_once('@').map(|(_, host)| host).unwrap_or(rest);
    let location = location.split('?').next().unwrap_or(location);
    format!("{}://{}", scheme, location)
}

fn validate_database_url(url: &str) -> anyhow::Result<()> {
    if url.trim().is_empty() {
        anyhow::bail!("DB_URL cannot be empty");
    }
    if !url.starts_with("postgresql://") && !url.starts_with("postgres://") {
        anyhow::bail!("DB_URL must start with postgresql:// or postgres://");
    }
    Ok(())
}
