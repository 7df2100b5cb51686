//! Stream Events
//!
//! Emitted by every stream loop in order, one per timer tick.

use serde::{Deserialize, Serialize};

/// Event emitted by a stream.
///
/// Wire format is a tagged JSON object:
///
/// ```text
/// {"type":"tick","id":"sim","x":1.23,"R":2.5}
/// {"type":"crash","R":1.01,"nonce":2}
/// {"type":"survival","x":1.5,"S":0.42,"n":120}
/// {"type":"error","error":"server_seed and client_seed are required"}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// The rising value moved without reaching the threshold.
    Tick {
        /// Stream label, when the stream reports one.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        /// Current value, 2 decimals.
        x: f64,
        /// Round threshold, 2 decimals.
        #[serde(rename = "R")]
        threshold: f64,
        /// Round nonce (provably-fair streams).
        #[serde(default, skip_serializing_if = "Option::is_none")]
        nonce: Option<u64>,
    },

    /// The rising value reached the threshold; the round is over.
    Crash {
        /// Stream label, when the stream reports one.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        /// Crash value, 2 decimals. This is also the persisted value.
        #[serde(rename = "R")]
        crash_value: f64,
        /// Nonce of the crashed round (provably-fair streams).
        #[serde(default, skip_serializing_if = "Option::is_none")]
        nonce: Option<u64>,
    },

    /// Empirical survival at the evaluation point.
    Survival {
        /// Evaluation point, 2 decimals.
        x: f64,
        /// S(x), 6 decimals.
        #[serde(rename = "S")]
        survival: f64,
        /// Sample size S was computed over.
        n: usize,
    },

    /// The stream could not start or continue.
    Error {
        /// Human-readable reason.
        error: String,
    },
}

impl StreamEvent {
    /// Whether this event ends a round.
    pub fn is_crash(&self) -> bool {
        matches!(self, Self::Crash { .. })
    }

    /// Build an error event.
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            error: message.into(),
        }
    }
}
