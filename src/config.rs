/// Synchronization configuration from environment variables
///
/// Controls the jmwalletd endpoints, polling cadence, reconnect backoff and
/// the build mode used as the feature-flag fallback. Every component takes
/// the pieces it needs at construction; there is no process-wide settings
/// object.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::error::SyncError;

/// Fallback for feature flags when the backend gives no definitive answer
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BuildMode {
    Development,
    Production,
}

impl BuildMode {
    /// Mode of the compiled binary (debug builds count as development)
    pub fn current() -> Self {
        if cfg!(debug_assertions) {
            BuildMode::Development
        } else {
            BuildMode::Production
        }
    }

    pub fn is_development(&self) -> bool {
        matches!(self, BuildMode::Development)
    }
}

impl FromStr for BuildMode {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "development" | "dev" => Ok(BuildMode::Development),
            "production" | "prod" => Ok(BuildMode::Production),
            other => Err(SyncError::InvalidConfig(format!(
                "unknown build mode '{}'",
                other
            ))),
        }
    }
}

/// Timing knobs of the Service Status Channel
#[derive(Clone, Debug)]
pub struct ChannelConfig {
    /// Fixed cadence of session polls while push is not live
    pub poll_interval: Duration,
    /// Consecutive failed polls before the snapshot degrades to unreachable
    pub unreachable_after: u32,
    /// First reconnect delay after the push transport drops
    pub reconnect_min: Duration,
    /// Upper bound of the doubling reconnect delay
    pub reconnect_max: Duration,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(10),
            unreachable_after: 3,
            reconnect_min: Duration::from_millis(1_000),
            reconnect_max: Duration::from_millis(30_000),
        }
    }
}

#[derive(Clone, Debug)]
pub struct SyncConfig {
    /// Base URL of the reverse proxy in front of jmwalletd (no trailing slash)
    pub base_url: String,
    /// Websocket notification endpoint
    pub websocket_url: String,
    /// Per-request timeout of the HTTP client
    pub request_timeout: Duration,
    pub build_mode: BuildMode,
    pub channel: ChannelConfig,
}

impl SyncConfig {
    /// Load configuration from environment variables
    ///
    /// Environment variables:
    /// - `JM_BASE_URL`: proxy base URL (default `http://localhost:28183`)
    /// - `JM_WEBSOCKET_URL`: websocket URL (default derived from the base URL, path `/jmws`)
    /// - `JM_POLL_INTERVAL_SECS`: session poll cadence (default 10)
    /// - `JM_UNREACHABLE_AFTER`: failed polls before "unreachable" (default 3)
    /// - `JM_RECONNECT_MIN_MS` / `JM_RECONNECT_MAX_MS`: websocket backoff bounds
    /// - `JM_REQUEST_TIMEOUT_SECS`: HTTP timeout (default 30)
    /// - `JAM_BUILD_MODE`: "development" or "production" (default follows the build profile)
    ///
    /// Unparsable numeric values fall back to their defaults with a warning.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let base_url = env::var("JM_BASE_URL")
            .map(|url| url.trim_end_matches('/').to_string())
            .unwrap_or(defaults.base_url);
        log::info!("jmwalletd base URL: {}", base_url);

        let websocket_url =
            env::var("JM_WEBSOCKET_URL").unwrap_or_else(|_| websocket_url_for(&base_url));
        log::info!("jmwalletd websocket URL: {}", websocket_url);

        let build_mode = match env::var("JAM_BUILD_MODE") {
            Ok(value) => value.parse().unwrap_or_else(|e| {
                log::warn!("{}, using {:?}", e, defaults.build_mode);
                defaults.build_mode
            }),
            Err(_) => defaults.build_mode,
        };
        log::info!("Build mode: {:?}", build_mode);

        let channel = ChannelConfig {
            poll_interval: Duration::from_secs(env_number(
                "JM_POLL_INTERVAL_SECS",
                defaults.channel.poll_interval.as_secs(),
            )),
            unreachable_after: env_number(
                "JM_UNREACHABLE_AFTER",
                defaults.channel.unreachable_after,
            ),
            reconnect_min: Duration::from_millis(env_number(
                "JM_RECONNECT_MIN_MS",
                defaults.channel.reconnect_min.as_millis() as u64,
            )),
            reconnect_max: Duration::from_millis(env_number(
                "JM_RECONNECT_MAX_MS",
                defaults.channel.reconnect_max.as_millis() as u64,
            )),
        };
        log::info!(
            "Status channel: poll every {:?}, unreachable after {} failures, reconnect {:?}..{:?}",
            channel.poll_interval,
            channel.unreachable_after,
            channel.reconnect_min,
            channel.reconnect_max
        );

        let request_timeout = Duration::from_secs(env_number(
            "JM_REQUEST_TIMEOUT_SECS",
            defaults.request_timeout.as_secs(),
        ));

        Self {
            base_url,
            websocket_url,
            request_timeout,
            build_mode,
            channel,
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        let base_url = "http://localhost:28183".to_string();
        Self {
            websocket_url: websocket_url_for(&base_url),
            base_url,
            request_timeout: Duration::from_secs(30),
            build_mode: BuildMode::current(),
            channel: ChannelConfig::default(),
        }
    }
}

/// Derive `ws(s)://host/jmws` from an `http(s)://host[/path]` base URL
pub fn websocket_url_for(base_url: &str) -> String {
    let (scheme, rest) = if let Some(rest) = base_url.strip_prefix("https://") {
        ("wss", rest)
    } else if let Some(rest) = base_url.strip_prefix("http://") {
        ("ws", rest)
    } else {
        ("ws", base_url)
    };
    let host = rest.split('/').next().unwrap_or(rest);
    format!("{}://{}/jmws", scheme, host)
}

fn env_number<T: FromStr + Copy + std::fmt::Display>(name: &str, default: T) -> T {
    match env::var(name) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            log::warn!("Invalid {} '{}', using {}", name, raw, default);
            default
        }),
        Err(_) => default,
    }
}
