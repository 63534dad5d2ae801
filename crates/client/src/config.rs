//! Client configuration

use std::env;
use std::time::Duration;

use anyhow::{Context, Result};
use url::Url;

use arcana_protocol::DivinationFormData;

use crate::infrastructure::websocket::client::default_stomp_host;
use crate::infrastructure::websocket::TransportConfig;

pub const DEFAULT_WS_URL: &str = "ws://localhost:8083/ws";
pub const DEFAULT_API_BASE_URL: &str = "http://localhost:8080";
pub const DEFAULT_API_TIMEOUT_SECS: u64 = 30;

/// Client configuration loaded from environment
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// WebSocket endpoint and STOMP host
    pub transport: TransportConfig,

    /// Base URL of the orchestrator and payment services
    pub api_base_url: Url,
    /// Timeout for REST calls
    pub api_timeout: Duration,

    /// Log every received event at info level
    pub log_events: bool,

    /// User owning the process
    pub user_id: Option<String>,
    /// Existing process to attach to
    pub process_id: Option<String>,
    /// BLIK code to pay with once subscribed
    pub blik_code: Option<String>,
    /// Form submitted when a new process has to be started
    pub form: DivinationFormData,
}

impl ClientConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let ws_url = parse_url(
            &lookup("ARCANA_WS_URL").unwrap_or_else(|| DEFAULT_WS_URL.to_string()),
            &["ws", "wss"],
        )
        .context("ARCANA_WS_URL must be a ws:// or wss:// URL")?;
        let stomp_host = non_empty(lookup("ARCANA_STOMP_HOST"))
            .unwrap_or_else(|| default_stomp_host(&ws_url));

        let api_base_url = parse_url(
            &lookup("ARCANA_API_BASE_URL").unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string()),
            &["http", "https"],
        )
        .context("ARCANA_API_BASE_URL must be an http:// or https:// URL")?;

        let api_timeout = Duration::from_secs(
            lookup("ARCANA_API_TIMEOUT_SECS")
                .unwrap_or_else(|| DEFAULT_API_TIMEOUT_SECS.to_string())
                .parse()
                .context("ARCANA_API_TIMEOUT_SECS must be a whole number of seconds")?,
        );

        Ok(Self {
            transport: TransportConfig { ws_url, stomp_host },
            api_base_url,
            api_timeout,
            log_events: lookup("ARCANA_LOG_EVENTS")
                .map(|v| parse_flag(&v))
                .unwrap_or(false),
            user_id: non_empty(lookup("ARCANA_USER_ID")),
            process_id: non_empty(lookup("ARCANA_PROCESS_ID")),
            blik_code: non_empty(lookup("ARCANA_BLIK_CODE")),
            form: DivinationFormData {
                name: lookup("ARCANA_FORM_NAME").unwrap_or_default(),
                date_of_birth: lookup("ARCANA_FORM_DATE_OF_BIRTH").unwrap_or_default(),
                favorite_color: lookup("ARCANA_FORM_FAVORITE_COLOR").unwrap_or_default(),
                favorite_number: lookup("ARCANA_FORM_FAVORITE_NUMBER").unwrap_or_default(),
                relationship_status: lookup("ARCANA_FORM_RELATIONSHIP_STATUS")
                    .unwrap_or_default(),
            },
        })
    }
}

fn parse_url(raw: &str, schemes: &[&str]) -> Result<Url> {
    let url = Url::parse(raw.trim()).with_context(|| format!("invalid URL: {raw}"))?;
    if !schemes.contains(&url.scheme()) {
        anyhow::bail!("unsupported scheme {:?} in {raw}", url.scheme());
    }
    Ok(url)
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
