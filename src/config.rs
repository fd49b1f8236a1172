//! Application-level configuration loading: storage target, retry policy and server port.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use tracing::{info, warn};

use crate::lifecycle::RetryPolicy;

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "POLICY_PORTAL_CONFIG_PATH";

const DEFAULT_URI: &str = "mongodb://localhost:27017/policy_portal";
const DEFAULT_DATABASE: &str = "policy_portal";
const DEFAULT_APP_NAME: &str = "policy-portal-back";
const DEFAULT_PORT: u16 = 8080;
const DEFAULT_MAX_POOL_SIZE: u32 = 10;
const DEFAULT_SERVER_SELECTION_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_SOCKET_IDLE_TIMEOUT: Duration = Duration::from_secs(45);
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Deployment flavour; production forces encrypted transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OperatingMode {
    /// Local or test deployment.
    #[default]
    Development,
    /// Production deployment.
    Production,
}

impl OperatingMode {
    fn parse(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("production") {
            OperatingMode::Production
        } else {
            OperatingMode::Development
        }
    }
}

/// Where and how to reach the backing store. Fixed once resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreTarget {
    /// Connection string, possibly carrying credentials.
    pub uri: String,
    /// Database used for the readiness ping.
    pub database: String,
    /// Name reported to the server in the handshake.
    pub app_name: String,
    /// Upper bound on pooled connections.
    pub max_pool_size: u32,
    /// How long a single attempt may wait for a suitable server.
    pub server_selection_timeout: Duration,
    /// How long a pooled socket may sit idle before being dropped.
    pub socket_idle_timeout: Duration,
    /// TCP connect timeout for each socket.
    pub connect_timeout: Duration,
    /// Refuse plaintext connections.
    pub require_tls: bool,
}

impl Default for StoreTarget {
    fn default() -> Self {
        Self {
            uri: DEFAULT_URI.to_owned(),
            database: DEFAULT_DATABASE.to_owned(),
            app_name: DEFAULT_APP_NAME.to_owned(),
            max_pool_size: DEFAULT_MAX_POOL_SIZE,
            server_selection_timeout: DEFAULT_SERVER_SELECTION_TIMEOUT,
            socket_idle_timeout: DEFAULT_SOCKET_IDLE_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            require_tls: false,
        }
    }
}

impl StoreTarget {
    /// Host list of the connection string with scheme, credentials, path and
    /// query stripped, safe to expose on the health surface.
    pub fn host(&self) -> String {
        let rest = self
            .uri
            .split_once("://")
            .map_or(self.uri.as_str(), |(_, rest)| rest);
        let authority = rest.split(['/', '?']).next().unwrap_or(rest);
        let hosts = authority
            .rsplit_once('@')
            .map_or(authority, |(_, hosts)| hosts);
        hosts.to_owned()
    }
}

/// Immutable runtime configuration resolved once at startup.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AppConfig {
    /// Storage connection target.
    pub target: StoreTarget,
    /// Connection campaign bounds.
    pub retry: RetryPolicy,
    /// Deployment flavour.
    pub mode: OperatingMode,
    /// Port the health server listens on.
    pub port: u16,
}

impl AppConfig {
    /// Load the configuration file (if any) and apply environment overrides.
    pub fn load() -> Self {
        let raw = load_raw_config();
        Self::from_sources(raw, |key| env::var(key).ok())
    }

    /// Combine file settings and environment lookups into a configuration.
    fn from_sources(raw: RawConfig, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self {
            port: DEFAULT_PORT,
            ..Self::default()
        };

        if let Some(retry) = raw.retry {
            retry.apply(&mut config.retry);
        }
        if let Some(store) = raw.store {
            store.apply(&mut config.target);
        }

        if let Some(uri) = non_empty(lookup("MONGODB_URI")) {
            config.target.uri = uri;
        }
        if let Some(database) = non_empty(lookup("MONGODB_DB")) {
            config.target.database = database;
        }
        if let Some(mode) = non_empty(lookup("APP_ENV")) {
            config.mode = OperatingMode::parse(&mode);
        }
        if config.mode == OperatingMode::Production {
            config.target.require_tls = true;
        }

        config.port = lookup("PORT")
            .or_else(|| lookup("SERVER_PORT"))
            .and_then(|value| value.parse::<u16>().ok())
            .unwrap_or(DEFAULT_PORT);

        config
    }
}

#[derive(Debug, Default, Deserialize)]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
struct RawConfig {
    #[serde(default)]
    retry: Option<RawRetry>,
    #[serde(default)]
    store: Option<RawStore>,
}

#[derive(Debug, Deserialize)]
struct RawRetry {
    max_attempts: Option<u32>,
    base_delay_ms: Option<u64>,
    max_delay_ms: Option<u64>,
    multiplier: Option<f64>,
}

impl RawRetry {
    fn apply(self, policy: &mut RetryPolicy) {
        if let Some(max_attempts) = self.max_attempts {
            if max_attempts == 0 {
                warn!("retry.max_attempts must be at least 1; keeping default");
            } else {
                policy.max_attempts = max_attempts;
            }
        }
        if let Some(base) = self.base_delay_ms {
            policy.base_delay = Duration::from_millis(base);
        }
        if let Some(max) = self.max_delay_ms {
            policy.max_delay = Duration::from_millis(max);
        }
        if let Some(multiplier) = self.multiplier {
            if multiplier.is_finite() && multiplier >= 1.0 {
                policy.multiplier = multiplier;
            } else {
                warn!(multiplier, "retry.multiplier must be >= 1; keeping default");
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawStore {
    app_name: Option<String>,
    max_pool_size: Option<u32>,
    server_selection_timeout_ms: Option<u64>,
    socket_idle_timeout_ms: Option<u64>,
    connect_timeout_ms: Option<u64>,
    require_tls: Option<bool>,
}

impl RawStore {
    fn apply(self, target: &mut StoreTarget) {
        if let Some(app_name) = self.app_name {
            target.app_name = app_name;
        }
        if let Some(max_pool_size) = self.max_pool_size {
            target.max_pool_size = max_pool_size;
        }
        if let Some(ms) = self.server_selection_timeout_ms {
            target.server_selection_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = self.socket_idle_timeout_ms {
            target.socket_idle_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = self.connect_timeout_ms {
            target.connect_timeout = Duration::from_millis(ms);
        }
        if let Some(require_tls) = self.require_tls {
            target.require_tls = require_tls;
        }
    }
}

fn load_raw_config() -> RawConfig {
    let path = resolve_config_path();
    match fs::read_to_string(&path) {
        Ok(contents) => match serde_json::from_str::<RawConfig>(&contents) {
            Ok(raw) => {
                info!(path = %path.display(), "loaded configuration file");
                raw
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to parse config; falling back to defaults"
                );
                RawConfig::default()
            }
        },
        Err(err) if err.kind() == ErrorKind::NotFound => {
            info!(
                path = %path.display(),
                "config file not found; using built-in defaults"
            );
            RawConfig::default()
        }
        Err(err) => {
            warn!(
                path = %path.display(),
                error = %err,
                "failed to read config; falling back to defaults"
            );
            RawConfig::default()
        }
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.trim().is_empty())
}
