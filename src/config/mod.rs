mod file_config;

pub use file_config::{FileConfig, RealtimeConfig};

use crate::auth::Credential;
use crate::realtime::{RealtimeSettings, ReconnectPolicy};
use anyhow::{anyhow, bail, Context, Result};
use reqwest::Url;
use std::time::Duration;

pub const DEFAULT_API_URL: &str = "http://localhost:3000/api";
pub const DEFAULT_PAGE_SIZE: u32 = 20;
pub const DEFAULT_REQUEST_TIMEOUT_SEC: u64 = 30;

/// CLI arguments that can be used for config resolution.
/// This struct mirrors the CLI arguments that can be overridden by TOML config.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub api_url: Option<String>,
    pub ws_url: Option<String>,
    pub token: Option<String>,
    pub user_id: Option<u64>,
    pub request_timeout_sec: u64,
    pub page_size: u32,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    // Core settings
    pub api_url: String,
    pub credential: Option<Credential>,
    pub user_id: Option<u64>,
    pub request_timeout: Duration,
    pub page_size: u32,

    // Push channel, including its derived URL
    pub realtime: RealtimeSettings,
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        let api_url = file
            .api_url
            .or_else(|| cli.api_url.clone())
            .unwrap_or_else(|| DEFAULT_API_URL.to_string());
        let api = parse_url(&api_url, &["http", "https"], "api_url")?;

        let ws_url = match file.ws_url.or_else(|| cli.ws_url.clone()) {
            Some(ws_url) => parse_url(&ws_url, &["ws", "wss"], "ws_url")?.to_string(),
            None => derive_ws_url(&api)?,
        };

        // An empty token is the same as no token at all
        let credential = file
            .token
            .or_else(|| cli.token.clone())
            .filter(|t| !t.trim().is_empty())
            .map(Credential::bearer);
        let user_id = file.user_id.or(cli.user_id);

        let request_timeout_sec = file
            .request_timeout_sec
            .unwrap_or(cli.request_timeout_sec);
        if request_timeout_sec == 0 {
            bail!("request_timeout_sec must be greater than zero");
        }

        let page_size = file.page_size.unwrap_or(cli.page_size);
        if page_size == 0 {
            bail!("page_size must be greater than zero");
        }

        // Realtime settings - merge file config with defaults
        let rt_file = file.realtime.unwrap_or_default();
        let defaults = RealtimeSettings::default();
        let policy = ReconnectPolicy {
            base_delay: rt_file
                .reconnect_base_delay_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.policy.base_delay),
            max_delay: rt_file
                .reconnect_max_delay_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.policy.max_delay),
            max_attempts: rt_file
                .max_reconnect_attempts
                .unwrap_or(defaults.policy.max_attempts),
        };
        if policy.max_delay < policy.base_delay {
            bail!(
                "reconnect_max_delay_ms ({:?}) is lower than reconnect_base_delay_ms ({:?})",
                policy.max_delay,
                policy.base_delay
            );
        }

        let realtime = RealtimeSettings {
            url: ws_url,
            policy,
            connect_timeout: rt_file
                .connect_timeout_sec
                .map(Duration::from_secs)
                .unwrap_or(defaults.connect_timeout),
            ping_interval: rt_file
                .ping_interval_sec
                .map(Duration::from_secs)
                .unwrap_or(defaults.ping_interval),
        };

        Ok(Self {
            api_url: api_url.trim_end_matches('/').to_string(),
            credential,
            user_id,
            request_timeout: Duration::from_secs(request_timeout_sec),
            page_size,
            realtime,
        })
    }

    /// The user id, required by anything that scopes the push channel.
    pub fn require_user_id(&self) -> Result<u64> {
        self.user_id
            .ok_or_else(|| anyhow!("user_id must be specified via --user-id or in config file"))
    }
}

fn parse_url(raw: &str, schemes: &[&str], field: &str) -> Result<Url> {
    let url = Url::parse(raw).with_context(|| format!("Invalid {}: {}", field, raw))?;
    if !schemes.contains(&url.scheme()) {
        bail!(
            "{} must use one of {:?}, got '{}'",
            field,
            schemes,
            url.scheme()
        );
    }
    Ok(url)
}

/// `http://host:port/api` becomes `ws://host:port/ws`.
fn derive_ws_url(api: &Url) -> Result<String> {
    let mut ws = api.clone();
    let scheme = if api.scheme() == "https" { "wss" } else { "ws" };
    ws.set_scheme(scheme)
        .map_err(|_| anyhow!("Cannot derive push channel URL from {}", api))?;
    ws.set_path("/ws");
    ws.set_query(None);
    ws.set_fragment(None);
    Ok(ws.to_string())
}
