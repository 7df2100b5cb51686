//! Stream Configuration
//!
//! Clients send a [`StreamRequest`] with every field optional. It is
//! validated against server [`StreamDefaults`] into a [`StreamConfig`]
//! before any stream task starts, so bad parameters never reach a loop.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::core::fair::{FairSeeds, DEFAULT_HOUSE_EDGE};
use crate::core::numeric::round2;
use crate::core::rng::StreamRng;
use crate::sampler::CrashSampler;
use crate::store::SampleStore;

use super::engine::{CrashEngine, StreamDriver, SurvivalMonitor, ROUND_START};

/// Default rise per tick.
pub const DEFAULT_STEP: f64 = 0.01;

/// Default tick period of crash streams.
pub const DEFAULT_PERIOD: Duration = Duration::from_millis(100);

/// Default tick period of the survival stream.
pub const DEFAULT_SURVIVAL_PERIOD: Duration = Duration::from_millis(200);

/// Default survival evaluation cap before wrapping to 1.0.
pub const DEFAULT_SURVIVAL_CAP: f64 = 1000.0;

/// Whether `step` moves a round off its start value after rounding.
///
/// Smaller steps round away and the round would never crash.
pub fn is_valid_step(step: f64) -> bool {
    step.is_finite() && step > 0.0 && round2(ROUND_START + step) > ROUND_START
}

/// Stream errors. All are raised before a stream starts.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StreamError {
    /// Provably-fair stream without both seeds.
    #[error("server_seed and client_seed are required")]
    MissingSeeds,

    /// Step that does not move the two-decimal value.
    #[error("step must move the value past 1.00 after rounding to 2 decimals, got {0}")]
    InvalidStep(f64),

    /// Zero period.
    #[error("period must be at least 1 ms, got {0}")]
    InvalidPeriod(u64),

    /// House edge outside (0, 1).
    #[error("house_edge must be in (0, 1), got {0}")]
    InvalidHouseEdge(f64),
}

/// Kind of stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamFlavor {
    /// Empirical sampling from the dataset.
    #[default]
    Sim,
    /// Pareto(1, 2) on every round.
    Parametric,
    /// Provably-fair from seeds.
    Pf,
    /// Survival curve over the dataset.
    Survival,
}

impl StreamFlavor {
    /// Session label used when the client gives none.
    pub fn default_label(self) -> &'static str {
        match self {
            Self::Sim => "sim",
            Self::Parametric => "parametric",
            Self::Pf => "pf",
            Self::Survival => "survival",
        }
    }
}

/// Server-side stream defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamDefaults {
    /// Rise per tick.
    pub step: f64,
    /// Crash stream tick period.
    pub period: Duration,
    /// Survival stream tick period.
    pub survival_period: Duration,
    /// Survival evaluation cap.
    pub survival_cap: f64,
    /// Provably-fair house edge.
    pub house_edge: f64,
}

impl Default for StreamDefaults {
    fn default() -> Self {
        Self {
            step: DEFAULT_STEP,
            period: DEFAULT_PERIOD,
            survival_period: DEFAULT_SURVIVAL_PERIOD,
            survival_cap: DEFAULT_SURVIVAL_CAP,
            house_edge: DEFAULT_HOUSE_EDGE,
        }
    }
}

/// Stream parameters as sent by a client.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamRequest {
    /// Kind of stream (default `sim`).
    #[serde(default)]
    pub flavor: StreamFlavor,
    /// Session label for persisted crashes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Rise per tick.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<f64>,
    /// Tick period in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub period: Option<u64>,
    /// HMAC key of a provably-fair stream.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_seed: Option<String>,
    /// HMAC message prefix of a provably-fair stream.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_seed: Option<String>,
    /// Starting nonce (default 0).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<u64>,
    /// House edge in (0, 1).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub house_edge: Option<f64>,
}

/// Validated stream configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamConfig {
    /// Unique id of this stream instance.
    pub stream_id: Uuid,
    /// Kind of stream.
    pub flavor: StreamFlavor,
    /// Session label for persisted crashes.
    pub label: String,
    /// Id attached to emitted events, if any.
    pub event_id: Option<String>,
    /// Rise per tick.
    pub step: f64,
    /// Tick period.
    pub period: Duration,
    /// Seeds for provably-fair streams.
    pub seeds: Option<FairSeeds>,
    /// Survival evaluation cap.
    pub survival_cap: f64,
}

fn non_empty(seed: Option<String>) -> Option<String> {
    seed.filter(|s| !s.is_empty())
}

impl StreamRequest {
    /// Provably-fair request.
    pub fn provably_fair(server_seed: &str, client_seed: &str, nonce: u64) -> Self {
        Self {
            flavor: StreamFlavor::Pf,
            server_seed: Some(server_seed.to_string()),
            client_seed: Some(client_seed.to_string()),
            nonce: Some(nonce),
            ..Default::default()
        }
    }

    /// Validate against `defaults`.
    pub fn into_config(self, defaults: &StreamDefaults) -> Result<StreamConfig, StreamError> {
        let step = self.step.unwrap_or(defaults.step);
        if !is_valid_step(step) {
            return Err(StreamError::InvalidStep(step));
        }

        let period = match self.period {
            Some(0) => return Err(StreamError::InvalidPeriod(0)),
            Some(ms) => Duration::from_millis(ms),
            None if self.flavor == StreamFlavor::Survival => defaults.survival_period,
            None => defaults.period,
        };

        let seeds = if self.flavor == StreamFlavor::Pf {
            let house_edge = self.house_edge.unwrap_or(defaults.house_edge);
            if house_edge.is_nan() || house_edge <= 0.0 || house_edge >= 1.0 {
                return Err(StreamError::InvalidHouseEdge(house_edge));
            }
            match (non_empty(self.server_seed), non_empty(self.client_seed)) {
                (Some(server), Some(client)) => Some(FairSeeds::new(
                    server,
                    client,
                    self.nonce.unwrap_or(0),
                    house_edge,
                )),
                _ => return Err(StreamError::MissingSeeds),
            }
        } else {
            None
        };

        let event_id = match self.flavor {
            StreamFlavor::Sim | StreamFlavor::Parametric => self
                .id
                .clone()
                .or_else(|| Some(self.flavor.default_label().to_string())),
            StreamFlavor::Pf | StreamFlavor::Survival => self.id.clone(),
        };
        let label = self
            .id
            .unwrap_or_else(|| self.flavor.default_label().to_string());

        Ok(StreamConfig {
            stream_id: Uuid::new_v4(),
            flavor: self.flavor,
            label,
            event_id,
            step,
            period,
            seeds,
            survival_cap: defaults.survival_cap,
        })
    }
}

impl StreamConfig {
    /// Build the engine for this configuration.
    pub fn build_driver(&self, store: Arc<dyn SampleStore>) -> StreamDriver {
        let rng = StreamRng::for_stream(&self.label, self.stream_id.as_bytes());
        let sampler = match (self.flavor, &self.seeds) {
            (StreamFlavor::Survival, _) => {
                return SurvivalMonitor::new(store, self.step, self.survival_cap).into();
            }
            (StreamFlavor::Pf, Some(seeds)) => CrashSampler::provably_fair(seeds.clone()),
            (StreamFlavor::Parametric, _) => CrashSampler::parametric(rng),
            _ => CrashSampler::empirical(store.clone(), rng),
        };
        CrashEngine::new(sampler, store, self.label.clone(), self.step)
            .with_event_id(self.event_id.clone())
            .into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::stream::StreamEvent;

    #[test]
    fn test_defaults_applied() {
        let config = StreamRequest::default()
            .into_config(&StreamDefaults::default())
            .unwrap();
        assert_eq!(config.flavor, StreamFlavor::Sim);
        assert_eq!(config.label, "sim");
        assert_eq!(config.event_id.as_deref(), Some("sim"));
        assert_eq!(config.step, 0.01);
        assert_eq!(config.period, Duration::from_millis(100));
        assert!(config.seeds.is_none());
    }

    #[test]
    fn test_survival_period_default() {
        let request = StreamRequest {
            flavor: StreamFlavor::Survival,
            ..Default::default()
        };
        let config = request.into_config(&StreamDefaults::default()).unwrap();
        assert_eq!(config.period, Duration::from_millis(200));
        assert_eq!(config.survival_cap, 1000.0);
    }

    #[test]
    fn test_missing_seeds() {
        let defaults = StreamDefaults::default();
        let request = StreamRequest {
            flavor: StreamFlavor::Pf,
            server_seed: Some("s".into()),
            ..Default::default()
        };
        assert_eq!(request.into_config(&defaults), Err(StreamError::MissingSeeds));

        let request = StreamRequest {
            flavor: StreamFlavor::Pf,
            server_seed: Some("s".into()),
            client_seed: Some(String::new()),
            ..Default::default()
        };
        assert_eq!(request.into_config(&defaults), Err(StreamError::MissingSeeds));
    }

    #[test]
    fn test_invalid_parameters() {
        let defaults = StreamDefaults::default();
        let bad_step = StreamRequest {
            step: Some(0.0),
            ..Default::default()
        };
        assert_eq!(bad_step.into_config(&defaults), Err(StreamError::InvalidStep(0.0)));

        for step in [0.004, 1e-9, f64::NAN, f64::INFINITY, -0.01] {
            let request = StreamRequest {
                step: Some(step),
                ..Default::default()
            };
            assert!(matches!(request.into_config(&defaults), Err(StreamError::InvalidStep(_))));
        }

        let bad_period = StreamRequest {
            period: Some(0),
            ..Default::default()
        };
        assert_eq!(bad_period.into_config(&defaults), Err(StreamError::InvalidPeriod(0)));

        let mut bad_edge = StreamRequest::provably_fair("s", "c", 0);
        bad_edge.house_edge = Some(1.0);
        assert_eq!(bad_edge.into_config(&defaults), Err(StreamError::InvalidHouseEdge(1.0)));
    }

    #[test]
    fn test_smallest_step_still_crashes() {
        assert!(!is_valid_step(0.004));
        // 1.005 is stored just below the midpoint and rounds down.
        assert!(!is_valid_step(0.005));
        assert!(is_valid_step(0.006));

        let request = StreamRequest {
            step: Some(0.006),
            ..StreamRequest::provably_fair("server-seed", "client-seed", 2)
        };
        let config = request.into_config(&StreamDefaults::default()).unwrap();
        let mut driver = config.build_driver(Arc::new(MemoryStore::new()));

        // R = 1.01157... at nonce 2.
        let crashed = (0..10).any(|_| driver.step().is_crash());
        assert!(crashed);
    }

    #[test]
    fn test_pf_config_and_driver() {
        let request = StreamRequest::provably_fair("server-seed", "client-seed", 2);
        let config = request.into_config(&StreamDefaults::default()).unwrap();
        assert_eq!(config.label, "pf");
        assert_eq!(config.event_id, None);
        let seeds = config.seeds.clone().unwrap();
        assert_eq!(seeds.nonce(), 2);
        assert_eq!(seeds.house_edge(), DEFAULT_HOUSE_EDGE);

        let mut driver = config.build_driver(Arc::new(MemoryStore::new()));
        assert_eq!(
            driver.step(),
            StreamEvent::Tick { id: None, x: 1.01, threshold: 1.01, nonce: Some(2) }
        );
    }

    #[test]
    fn test_custom_label() {
        let request = StreamRequest {
            flavor: StreamFlavor::Parametric,
            id: Some("table-7".into()),
            ..Default::default()
        };
        let config = request.into_config(&StreamDefaults::default()).unwrap();
        assert_eq!(config.label, "table-7");
        assert_eq!(config.event_id.as_deref(), Some("table-7"));
    }

    #[test]
    fn test_request_wire_format() {
        let request: StreamRequest =
            serde_json::from_str(r#"{"flavor":"pf","server_seed":"a","client_seed":"b"}"#).unwrap();
        assert_eq!(request.flavor, StreamFlavor::Pf);
        assert_eq!(request.nonce, None);

        let empty: StreamRequest = serde_json::from_str("{}").unwrap();
        assert_eq!(empty, StreamRequest::default());
    }
}
