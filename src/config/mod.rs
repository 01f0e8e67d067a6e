mod file_config;

pub use file_config::{FallbackConfig, FileConfig, RealtimeConfig};

use anyhow::{bail, Result};

pub const DEFAULT_WS_PATH: &str = "/ws/notifications";

/// CLI arguments that can be used for config resolution.
/// This struct mirrors the CLI arguments that can be overridden by TOML config.
#[derive(Debug, Clone)]
pub struct CliConfig {
    pub api_base_url: Option<String>,
    pub ws_path: String,
    pub token: Option<String>,
    pub request_timeout_sec: u64,
    pub page_size: u32,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            api_base_url: None,
            ws_path: DEFAULT_WS_PATH.to_string(),
            token: None,
            request_timeout_sec: 30,
            page_size: 50,
        }
    }
}

#[derive(Clone)]
pub struct AppConfig {
    // Core settings
    pub api_base_url: String,
    pub ws_path: String,
    pub token: Option<String>,
    pub request_timeout_sec: u64,
    pub page_size: u32,

    // Feature configs (with defaults)
    pub realtime: RealtimeSettings,
    pub fallback: FallbackSettings,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_base_url", &self.api_base_url)
            .field("ws_path", &self.ws_path)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("request_timeout_sec", &self.request_timeout_sec)
            .field("page_size", &self.page_size)
            .field("realtime", &self.realtime)
            .field("fallback", &self.fallback)
            .finish()
    }
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        // TOML overrides CLI for each field
        let api_base_url = file
            .api_base_url
            .or_else(|| cli.api_base_url.clone())
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "api_base_url must be specified via --api-base-url or in config file"
                )
            })?;
        let api_base_url = api_base_url.trim_end_matches('/').to_string();
        if !(api_base_url.starts_with("http://") || api_base_url.starts_with("https://")) {
            bail!("api_base_url must use http or https: {}", api_base_url);
        }

        let ws_path = file.ws_path.unwrap_or_else(|| cli.ws_path.clone());
        let token = file.token.or_else(|| cli.token.clone());
        let request_timeout_sec = file.request_timeout_sec.unwrap_or(cli.request_timeout_sec);
        let page_size = file.page_size.unwrap_or(cli.page_size);
        if page_size == 0 {
            bail!("page_size must be at least 1");
        }

        // Realtime settings - merge file config with defaults
        let rt_file = file.realtime.unwrap_or_default();
        let base_delay_ms = rt_file.base_delay_ms.unwrap_or(1000);
        let realtime = RealtimeSettings {
            base_delay_ms,
            max_delay_ms: rt_file
                .max_delay_ms
                .unwrap_or(base_delay_ms.saturating_mul(30)),
            max_attempts: rt_file.max_attempts.unwrap_or(10),
            heartbeat_interval_secs: rt_file.heartbeat_interval_secs.unwrap_or(30),
        };
        if realtime.base_delay_ms == 0 {
            bail!("realtime.base_delay_ms must be greater than zero");
        }
        if realtime.max_delay_ms < realtime.base_delay_ms {
            bail!(
                "realtime.max_delay_ms ({}) must not be below base_delay_ms ({})",
                realtime.max_delay_ms,
                realtime.base_delay_ms
            );
        }
        if realtime.heartbeat_interval_secs == 0 {
            bail!("realtime.heartbeat_interval_secs must be greater than zero");
        }

        let fb_file = file.fallback.unwrap_or_default();
        let fallback = FallbackSettings {
            failure_threshold: fb_file.failure_threshold.unwrap_or(3),
            poll_interval_secs: fb_file.poll_interval_secs.unwrap_or(30),
        };
        if fallback.failure_threshold == 0 {
            bail!("fallback.failure_threshold must be at least 1");
        }
        if fallback.poll_interval_secs == 0 {
            bail!("fallback.poll_interval_secs must be greater than zero");
        }

        Ok(Self {
            api_base_url,
            ws_path,
            token,
            request_timeout_sec,
            page_size,
            realtime,
            fallback,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RealtimeSettings {
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub max_attempts: u32,
    pub heartbeat_interval_secs: u64,
}

impl Default for RealtimeSettings {
    fn default() -> Self {
        Self {
            base_delay_ms: 1000,
            max_delay_ms: 30_000,
            max_attempts: 10,
            heartbeat_interval_secs: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FallbackSettings {
    pub failure_threshold: u32,
    pub poll_interval_secs: u64,
}

impl Default for FallbackSettings {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            poll_interval_secs: 30,
        }
    }
}
