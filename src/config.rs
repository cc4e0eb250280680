//! Configuration for the gateway and the IPC endpoint
//!
//! Loaded from a YAML file; every field has a default matching the reference
//! loopback deployment, so an empty file (or a missing one, if the caller opts
//! in) yields a working setup.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use tokio::fs;

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub endpoint: EndpointConfig,
}

/// Gateway (hub) side: the OSC port pair toward the GUI and the TCP address
/// of the endpoint.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GatewayConfig {
    /// UDP port the gateway listens on for GUI commands
    #[serde(default = "default_osc_listen_port")]
    pub osc_listen_port: u16,
    /// UDP address the gateway sends state updates to (the GUI's listener)
    #[serde(default = "default_osc_send_addr")]
    pub osc_send_addr: SocketAddr,
    /// TCP address of the IPC endpoint inside the DAW
    #[serde(default = "default_ipc_addr")]
    pub ipc_addr: SocketAddr,
    /// Seconds to wait between reconnect attempts
    #[serde(default = "default_reconnect_secs")]
    pub reconnect_secs: f64,
    /// Seconds between UDP listener liveness checks
    #[serde(default = "default_rebind_check_secs")]
    pub rebind_check_secs: f64,
}

/// Endpoint (DAW-resident) side: listen address and meter cadence.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EndpointConfig {
    /// TCP address the endpoint listens on for gateway clients
    #[serde(default = "default_ipc_listen_addr")]
    pub listen_addr: SocketAddr,
    /// VU meter polling rate in Hz
    #[serde(default = "default_vu_rate_hz")]
    pub vu_rate_hz: f64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            osc_listen_port: default_osc_listen_port(),
            osc_send_addr: default_osc_send_addr(),
            ipc_addr: default_ipc_addr(),
            reconnect_secs: default_reconnect_secs(),
            rebind_check_secs: default_rebind_check_secs(),
        }
    }
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_ipc_listen_addr(),
            vu_rate_hz: default_vu_rate_hz(),
        }
    }
}

impl GatewayConfig {
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs_f64(self.reconnect_secs)
    }

    pub fn rebind_check_interval(&self) -> Duration {
        Duration::from_secs_f64(self.rebind_check_secs)
    }
}

impl EndpointConfig {
    /// VU polling period, floored so a bad config can't spin the loop.
    pub fn vu_period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.vu_rate_hz.max(0.1))
    }
}

impl AppConfig {
    /// Load configuration from a YAML file.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: AppConfig = serde_yaml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        Ok(config)
    }

    /// Load configuration, falling back to defaults if the file is absent.
    pub async fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if fs::try_exists(path).await.unwrap_or(false) {
            Self::load(path).await
        } else {
            Ok(Self::default())
        }
    }
}

fn default_osc_listen_port() -> u16 {
    9000
}

fn default_osc_send_addr() -> SocketAddr {
    "127.0.0.1:9002".parse().expect("valid default address")
}

fn default_ipc_addr() -> SocketAddr {
    "127.0.0.1:9001".parse().expect("valid default address")
}

fn default_ipc_listen_addr() -> SocketAddr {
    "127.0.0.1:9001".parse().expect("valid default address")
}

fn default_reconnect_secs() -> f64 {
    5.0
}

fn default_rebind_check_secs() -> f64 {
    1.0
}

fn default_vu_rate_hz() -> f64 {
    15.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_reference_deployment() {
        let config = AppConfig::default();
        assert_eq!(config.gateway.osc_listen_port, 9000);
        assert_eq!(config.gateway.osc_send_addr.port(), 9002);
        assert_eq!(config.gateway.ipc_addr.port(), 9001);
        assert_eq!(config.endpoint.listen_addr.port(), 9001);
        assert_eq!(config.gateway.reconnect_secs, 5.0);
        assert_eq!(config.endpoint.vu_rate_hz, 15.0);
    }

    #[test]
    fn test_partial_yaml_fills_defaults() {
        let yaml = "gateway:\n  osc_listen_port: 7000\n";
        let config: AppConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.gateway.osc_listen_port, 7000);
        assert_eq!(config.gateway.osc_send_addr.port(), 9002);
        assert_eq!(config.endpoint.vu_rate_hz, 15.0);
    }

    #[test]
    fn test_vu_period() {
        let endpoint = EndpointConfig::default();
        let period = endpoint.vu_period();
        assert!(period.as_millis() >= 66 && period.as_millis() <= 67);
    }
}
