//! Server Configuration
//!
//! Defaults, overridable from the environment:
//!
//! | Variable                   | Default        |
//! |----------------------------|----------------|
//! | `CRASH_BIND_ADDR`          | `0.0.0.0:8080` |
//! | `CRASH_DATA_DIR`           | `data`         |
//! | `CRASH_MAX_CONNECTIONS`    | `1000`         |
//! | `CRASH_DEFAULT_STEP`       | `0.01`         |
//! | `CRASH_DEFAULT_PERIOD_MS`  | `100`          |
//! | `CRASH_SURVIVAL_PERIOD_MS` | `200`          |
//! | `CRASH_SURVIVAL_CAP`       | `1000`         |
//! | `CRASH_HOUSE_EDGE`         | `0.99`         |
//!
//! Unparsable values are logged and ignored.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

use crate::stream::config::is_valid_step;
use crate::stream::StreamDefaults;

/// Dataset location.
#[derive(Debug, Clone, PartialEq)]
pub struct DataConfig {
    /// Directory holding `main.json` and audit files.
    pub data_dir: PathBuf,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
        }
    }
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address.
    pub bind_addr: SocketAddr,
    /// Maximum concurrent connections.
    pub max_connections: usize,
    /// Dataset location.
    pub data: DataConfig,
    /// Stream defaults.
    pub stream: StreamDefaults,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            max_connections: 1000,
            data: DataConfig::default(),
            stream: StreamDefaults::default(),
        }
    }
}

fn parse_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Option<T> {
    let raw = lookup(name)?;
    match raw.trim().parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!("Ignoring {}={:?}: not a valid value", name, raw);
            None
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(addr) = parse_var(&lookup, "CRASH_BIND_ADDR") {
            config.bind_addr = addr;
        }
        if let Some(dir) = lookup("CRASH_DATA_DIR").filter(|d| !d.is_empty()) {
            config.data.data_dir = PathBuf::from(dir);
        }
        if let Some(max) = parse_var(&lookup, "CRASH_MAX_CONNECTIONS") {
            config.max_connections = max;
        }
        if let Some(step) = parse_var::<f64>(&lookup, "CRASH_DEFAULT_STEP") {
            if is_valid_step(step) {
                config.stream.step = step;
            } else {
                warn!("Ignoring CRASH_DEFAULT_STEP={}: too small to move the value", step);
            }
        }
        if let Some(ms) = parse_var::<u64>(&lookup, "CRASH_DEFAULT_PERIOD_MS").filter(|ms| *ms > 0) {
            config.stream.period = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_var::<u64>(&lookup, "CRASH_SURVIVAL_PERIOD_MS").filter(|ms| *ms > 0) {
            config.stream.survival_period = Duration::from_millis(ms);
        }
        if let Some(cap) = parse_var::<f64>(&lookup, "CRASH_SURVIVAL_CAP") {
            if cap.is_finite() && cap >= 1.0 {
                config.stream.survival_cap = cap;
            } else {
                warn!("Ignoring CRASH_SURVIVAL_CAP={}: must be >= 1", cap);
            }
        }
        if let Some(edge) = parse_var::<f64>(&lookup, "CRASH_HOUSE_EDGE") {
            if edge > 0.0 && edge < 1.0 {
                config.stream.house_edge = edge;
            } else {
                warn!("Ignoring CRASH_HOUSE_EDGE={}: must be in (0, 1)", edge);
            }
        }

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: BTreeMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name: &str| vars.get(name).cloned()
    }

    #[test]
    fn test_server_config_default() {
        let config = ServerConfig::default();
        assert_eq!(config.bind_addr.port(), 8080);
        assert_eq!(config.max_connections, 1000);
        assert_eq!(config.stream.period, Duration::from_millis(100));
        assert_eq!(config.data.data_dir, PathBuf::from("data"));
    }

    #[test]
    fn test_overrides() {
        let config = ServerConfig::from_lookup(lookup_from(&[
            ("CRASH_BIND_ADDR", "127.0.0.1:9000"),
            ("CRASH_DATA_DIR", "/tmp/crashes"),
            ("CRASH_MAX_CONNECTIONS", "12"),
            ("CRASH_DEFAULT_STEP", "0.05"),
            ("CRASH_DEFAULT_PERIOD_MS", "50"),
            ("CRASH_SURVIVAL_PERIOD_MS", "400"),
            ("CRASH_SURVIVAL_CAP", "100"),
            ("CRASH_HOUSE_EDGE", "0.97"),
        ]));
        assert_eq!(config.bind_addr, "127.0.0.1:9000".parse().unwrap());
        assert_eq!(config.data.data_dir, PathBuf::from("/tmp/crashes"));
        assert_eq!(config.max_connections, 12);
        assert_eq!(config.stream.step, 0.05);
        assert_eq!(config.stream.period, Duration::from_millis(50));
        assert_eq!(config.stream.survival_period, Duration::from_millis(400));
        assert_eq!(config.stream.survival_cap, 100.0);
        assert_eq!(config.stream.house_edge, 0.97);
    }

    #[test]
    fn test_invalid_values_ignored() {
        let config = ServerConfig::from_lookup(lookup_from(&[
            ("CRASH_BIND_ADDR", "not-an-addr"),
            ("CRASH_MAX_CONNECTIONS", "-3"),
            ("CRASH_DEFAULT_STEP", "0.001"),
            ("CRASH_DEFAULT_PERIOD_MS", "0"),
            ("CRASH_HOUSE_EDGE", "1.5"),
        ]));
        let defaults = ServerConfig::default();
        assert_eq!(config.bind_addr, defaults.bind_addr);
        assert_eq!(config.max_connections, defaults.max_connections);
        assert_eq!(config.stream, defaults.stream);
    }
}
