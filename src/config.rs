use std::time::Duration;

use anyhow::{Context, ensure};
use serde::Deserialize;

use crate::proxy::handler::{DEFAULT_DEVICE_NAME, HandlerConfig};
use crate::proxy::relay::RelayMode;
use crate::proxy::rewrite::{API_PREFIX, CAMERA_PREFIX, DASHBOARD_PREFIX};
use crate::proxy::upstream::UpstreamTarget;

/// Names the YAML file to load, if any.
pub const CONFIG_PATH_ENV: &str = "LIMELIGHT_PROXY_CONFIG";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub listen_addr: String,
    pub upstream: UpstreamConfig,
    pub ports: PortsConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    pub host: String,
    pub device_name: String,
    pub connect_timeout_ms: u64,
    pub read_timeout_ms: u64,
}

/// Upstream port per route.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PortsConfig {
    pub stream: u16,
    pub dashboard: u16,
    pub api: u16,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:8080".to_string(),
            upstream: UpstreamConfig::default(),
            ports: PortsConfig::default(),
        }
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            host: "172.29.0.1".to_string(),
            device_name: DEFAULT_DEVICE_NAME.to_string(),
            connect_timeout_ms: 5000,
            read_timeout_ms: 30000,
        }
    }
}

impl Default for PortsConfig {
    fn default() -> Self {
        Self {
            stream: 5800,
            dashboard: 5801,
            api: 5807,
        }
    }
}

impl Config {
    /// Defaults, then the YAML file named by `LIMELIGHT_PROXY_CONFIG`, then
    /// the `LISTEN` and `LIMELIGHT_HOST` environment variables.
    pub fn load() -> anyhow::Result<Self> {
        let mut cfg = match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) => {
                let raw = std::fs::read_to_string(&path)
                    .with_context(|| format!("reading config file {}", path))?;
                Self::from_yaml(&raw).with_context(|| format!("parsing config file {}", path))?
            }
            Err(_) => Self::default(),
        };

        if let Ok(listen_addr) = std::env::var("LISTEN") {
            cfg.listen_addr = listen_addr;
        }
        if let Ok(host) = std::env::var("LIMELIGHT_HOST") {
            cfg.upstream.host = host;
        }

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_yaml(raw: &str) -> anyhow::Result<Self> {
        let cfg: Config = serde_yaml::from_str(raw)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        ensure!(!self.listen_addr.is_empty(), "listen_addr must not be empty");
        ensure!(!self.upstream.host.is_empty(), "upstream.host must not be empty");
        ensure!(
            self.upstream.connect_timeout_ms > 0 && self.upstream.read_timeout_ms > 0,
            "upstream timeouts must be positive"
        );
        ensure!(
            self.ports.stream != 0 && self.ports.dashboard != 0 && self.ports.api != 0,
            "upstream ports must be non-zero"
        );
        Ok(())
    }

    fn target(&self, port: u16) -> UpstreamTarget {
        UpstreamTarget::new(self.upstream.host.clone(), port).with_timeouts(
            Duration::from_millis(self.upstream.connect_timeout_ms),
            Duration::from_millis(self.upstream.read_timeout_ms),
        )
    }

    /// Mount prefix and handler settings for each route.
    pub fn routes(&self) -> Vec<(&'static str, HandlerConfig)> {
        let route = |port, mode| {
            HandlerConfig::new(self.target(port), mode)
                .with_device_name(self.upstream.device_name.clone())
        };

        vec![
            (CAMERA_PREFIX, route(self.ports.stream, RelayMode::Streamed)),
            (DASHBOARD_PREFIX, route(self.ports.dashboard, RelayMode::Buffered)),
            (API_PREFIX, route(self.ports.api, RelayMode::Buffered)),
        ]
    }
}
