use std::net::SocketAddr;
use std::time::Duration;

use mediator_sync::RetryPolicy;
use serde::{Deserialize, Serialize};

/// Top-level configuration for the mediator.
///
/// Loaded from an optional TOML file, then overridden by environment
/// variables so deployments can inject credentials without a config file.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default = "RemoteConfig::fhir_default")]
    pub fhir: RemoteConfig,
    #[serde(default = "RemoteConfig::cht_default")]
    pub cht: RemoteConfig,
    #[serde(default = "RemoteConfig::openmrs_default")]
    pub openmrs: RemoteConfig,
    #[serde(default)]
    pub sync: SyncSettings,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration: TOML file when present, then env overrides.
    pub fn load(path: Option<&str>) -> anyhow::Result<Self> {
        let mut cfg = match path {
            Some(path) if std::path::Path::new(path).exists() => {
                let raw = std::fs::read_to_string(path)?;
                toml::from_str(&raw)?
            }
            _ => Self::default_with_remotes(),
        };
        cfg.apply_env_overrides();
        cfg.validate().map_err(|e| anyhow::anyhow!(e))?;
        Ok(cfg)
    }

    fn default_with_remotes() -> Self {
        Self {
            fhir: RemoteConfig::fhir_default(),
            cht: RemoteConfig::cht_default(),
            openmrs: RemoteConfig::openmrs_default(),
            ..Self::default()
        }
    }

    fn apply_env_overrides(&mut self) {
        self.server.apply_env();
        self.fhir.apply_env("FHIR");
        self.cht.apply_env("CHT");
        self.openmrs.apply_env("OPENMRS");
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.server.port == 0 {
            return Err("server.port must be > 0".into());
        }
        for (name, remote) in [
            ("fhir", &self.fhir),
            ("cht", &self.cht),
            ("openmrs", &self.openmrs),
        ] {
            if remote.url.is_empty() {
                return Err(format!("{name}.url must not be empty"));
            }
            url::Url::parse(&remote.url).map_err(|e| format!("{name}.url: {e}"))?;
            if remote.timeout_ms == 0 {
                return Err(format!("{name}.timeout_ms must be > 0"));
            }
        }
        if self.sync.concurrency == 0 {
            return Err("sync.concurrency must be > 0".into());
        }
        let lvl = self.logging.level.to_ascii_lowercase();
        let valid_levels = ["trace", "debug", "info", "warn", "error", "off"];
        if !valid_levels.contains(&lvl.as_str()) {
            return Err(format!("logging.level must be one of {valid_levels:?}"));
        }
        Ok(())
    }

    pub fn addr(&self) -> SocketAddr {
        use std::net::{IpAddr, Ipv4Addr};
        let host: IpAddr = self
            .server
            .host
            .parse()
            .unwrap_or(IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)));
        SocketAddr::from((host, self.server.port))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_body_limit")]
    pub body_limit_bytes: usize,
}

fn default_host() -> String {
    "0.0.0.0".into()
}
fn default_port() -> u16 {
    6000
}
fn default_body_limit() -> usize {
    1024 * 1024
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            body_limit_bytes: default_body_limit(),
        }
    }
}

impl ServerConfig {
    fn apply_env(&mut self) {
        if let Ok(host) = std::env::var("MEDIATOR_HOST")
            && !host.is_empty()
        {
            self.host = host;
        }
        if let Ok(port) = std::env::var("MEDIATOR_PORT")
            && let Ok(port) = port.parse()
        {
            self.port = port;
        }
    }
}

/// Connection settings for one remote system.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RemoteConfig {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_timeout_ms() -> u64 {
    15_000
}

impl RemoteConfig {
    fn with_url(url: &str) -> Self {
        Self {
            url: url.to_string(),
            username: String::new(),
            password: String::new(),
            timeout_ms: default_timeout_ms(),
        }
    }

    fn fhir_default() -> Self {
        Self::with_url("http://localhost:5001")
    }
    fn cht_default() -> Self {
        Self::with_url("http://localhost:5988")
    }
    fn openmrs_default() -> Self {
        Self::with_url("http://localhost:8090/openmrs")
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    fn apply_env(&mut self, prefix: &str) {
        for (suffix, slot) in [
            ("URL", &mut self.url),
            ("USERNAME", &mut self.username),
            ("PASSWORD", &mut self.password),
        ] {
            if let Ok(value) = std::env::var(format!("{prefix}_{suffix}"))
                && !value.is_empty()
            {
                *slot = value;
            }
        }
        if let Ok(timeout) = std::env::var(format!("{prefix}_TIMEOUT_MS"))
            && let Ok(timeout) = timeout.parse()
        {
            self.timeout_ms = timeout;
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSettings {
    /// Upper bound on items processed concurrently within one batch
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default)]
    pub retry: RetryPolicy,
}

fn default_concurrency() -> usize {
    4
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            retry: RetryPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".into()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}
