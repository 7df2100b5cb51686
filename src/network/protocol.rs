//! Protocol Messages
//!
//! Wire format for client-server communication over WebSocket.
//! All messages are JSON text frames tagged by `type`.

use serde::{Serialize, Deserialize};

use crate::stats::SummaryStats;
use crate::store::{is_valid_multiplier, parse_multiplier, parse_multiplier_list, DatasetListing, ParseError};
use crate::stream::{StreamEvent, StreamFlavor, StreamRequest};

// =============================================================================
// CLIENT -> SERVER MESSAGES
// =============================================================================

/// Messages sent from client to server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Start a stream, replacing any active one.
    Subscribe {
        /// Requested stream; every field is optional.
        #[serde(default)]
        stream: StreamRequest,
    },

    /// Stop the active stream.
    Unsubscribe,

    /// Record one crash by hand.
    AddCrash {
        /// Multiplier to record.
        value: MultiplierInput,
    },

    /// Bulk-append multipliers.
    AddValues(AddValuesRequest),

    /// Request dataset summary statistics.
    Summary,

    /// List dataset files.
    ListDatasets,

    /// Ping for latency measurement.
    Ping {
        /// Client timestamp, echoed back.
        timestamp: u64,
    },
}

/// A multiplier as typed by a user: a number, or text like `"2.95x"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MultiplierInput {
    /// Already numeric.
    Number(f64),
    /// Text with an optional `x` suffix.
    Text(String),
}

impl MultiplierInput {
    /// Parse and require >= 1.
    pub fn parse(&self) -> Result<f64, ParseError> {
        match self {
            Self::Number(v) if is_valid_multiplier(*v) => Ok(*v),
            Self::Number(v) => Err(ParseError::BelowOne(*v)),
            Self::Text(s) => parse_multiplier(s),
        }
    }
}

/// Bulk append request. `text` wins over `values` when both are present.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AddValuesRequest {
    /// Structured values.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub values: Option<Vec<f64>>,
    /// Raw text such as `"2.95x, 2.15x 1.00x"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Session label (default `web`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session: Option<String>,
}

impl AddValuesRequest {
    /// Candidate values to append, before range filtering.
    ///
    /// `None` when neither `text` nor `values` was given.
    pub fn candidates(&self) -> Option<Vec<f64>> {
        match (&self.text, &self.values) {
            (Some(text), _) if !text.is_empty() => Some(parse_multiplier_list(text)),
            (_, Some(values)) => Some(values.clone()),
            _ => None,
        }
    }
}

// =============================================================================
// SERVER -> CLIENT MESSAGES
// =============================================================================

/// Messages sent from server to client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Stream started.
    Subscribed {
        /// Id of the new stream.
        stream_id: String,
        /// Kind of stream started.
        flavor: StreamFlavor,
    },

    /// Stream stopped.
    Unsubscribed,

    /// Event from the active stream.
    Event {
        /// The stream event.
        event: StreamEvent,
    },

    /// Dataset summary.
    Summary(SummaryStats),

    /// Records appended.
    Added {
        /// Number of records written.
        added: usize,
        /// Audit file of a bulk append.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        file: Option<String>,
        /// Consolidated file name, once it exists.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        main: Option<String>,
    },

    /// Dataset files.
    Datasets(DatasetListing),

    /// Pong response.
    Pong {
        /// Client timestamp from the ping.
        timestamp: u64,
        /// Server time in milliseconds since the epoch.
        server_time: u64,
    },

    /// Error message.
    Error(ErrorPayload),

    /// Server is shutting down.
    Shutdown {
        /// Why the server is stopping.
        reason: String,
    },
}

/// Error details.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorPayload {
    /// Error code.
    pub code: ErrorCode,
    /// Human-readable message.
    pub message: String,
}

/// Error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Malformed message or parameters.
    InvalidInput,
    /// Multiplier unparsable or below 1.
    InvalidMultiplier,
    /// Dataset write failed.
    StorageFault,
    /// Server overloaded.
    ServerOverloaded,
}

impl ServerMessage {
    /// Build an error message.
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Error(ErrorPayload {
            code,
            message: message.into(),
        })
    }
}

// =============================================================================
// SERIALIZATION HELPERS
// =============================================================================

impl ClientMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

impl ServerMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}
