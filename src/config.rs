use std::path::PathBuf;
use std::time::Duration;

use crate::i18n::Language;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub assistant_api_url: String,
    pub postal_lookup_url: String,
    /// `None` keeps client stores in memory only.
    pub session_store_dir: Option<PathBuf>,
    pub chat_poll_interval: Duration,
    pub chat_poll_timeout: Duration,
    pub intake_redirect_delay: Duration,
    pub intake_redirect_to: String,
    pub analytics_cache_ttl: Duration,
    pub default_language: Language,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("PORT must be a valid number between 1-65535"))?,
            assistant_api_url: std::env::var("ASSISTANT_API_URL")
                .map_err(|_| anyhow::anyhow!("ASSISTANT_API_URL environment variable required"))
                .and_then(|url| validate_http_url("ASSISTANT_API_URL", url))?,
            postal_lookup_url: std::env::var("POSTAL_LOOKUP_URL")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .map(|url| validate_http_url("POSTAL_LOOKUP_URL", url))
                .transpose()?
                .unwrap_or_else(|| "https://viacep.com.br/ws".to_string()),
            session_store_dir: std::env::var("SESSION_STORE_DIR")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .map(PathBuf::from),
            chat_poll_interval: Duration::from_millis(parse_number(
                "CHAT_POLL_INTERVAL_MS",
                2000,
            )?),
            chat_poll_timeout: Duration::from_secs(parse_number("CHAT_POLL_TIMEOUT_SECS", 60)?),
            intake_redirect_delay: Duration::from_millis(parse_number(
                "INTAKE_REDIRECT_DELAY_MS",
                3000,
            )?),
            intake_redirect_to: std::env::var("INTAKE_REDIRECT_TO")
                .ok()
                .filter(|s| s.starts_with('/'))
                .unwrap_or_else(|| "/".to_string()),
            analytics_cache_ttl: Duration::from_secs(parse_number(
                "ANALYTICS_CACHE_TTL_SECS",
                60,
            )?),
            default_language: std::env::var("DEFAULT_LANGUAGE")
                .ok()
                .and_then(|code| Language::from_code(&code))
                .unwrap_or(Language::Pt),
        };

        if config.chat_poll_interval.is_zero() {
            anyhow::bail!("CHAT_POLL_INTERVAL_MS must be greater than zero");
        }
        if config.chat_poll_timeout < config.chat_poll_interval {
            anyhow::bail!("CHAT_POLL_TIMEOUT_SECS must be longer than the poll interval");
        }

        tracing::info!("Configuration loaded successfully");
        tracing::debug!("Assistant API URL: {}", config.assistant_api_url);
        tracing::debug!("Postal lookup URL: {}", config.postal_lookup_url);
        match config.session_store_dir {
            Some(ref dir) => tracing::info!("Client stores persisted under {}", dir.display()),
            None => tracing::info!("Client stores kept in memory"),
        }
        tracing::debug!("Server Port: {}", config.port);

        Ok(config)
    }
}

fn validate_http_url(name: &str, url: String) -> anyhow::Result<String> {
    if url.trim().is_empty() {
        anyhow::bail!("{} cannot be empty", name);
    }
    if !url.starts_with("http://") && !url.starts_with("https://") {
        anyhow::bail!("{} must start with http:// or https://", name);
    }
    url::Url::parse(&url).map_err(|e| anyhow::anyhow!("{} is not a valid URL: {}", name, e))?;
    Ok(url.trim_end_matches('/').to_string())
}

fn parse_number(name: &str, default: u64) -> anyhow::Result<u64> {
    match std::env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|_| anyhow::anyhow!("{} must be a positive integer", name)),
        _ => Ok(default),
    }
}
