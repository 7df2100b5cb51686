//! Streaming Event Loop
//!
//! ## Module Structure
//!
//! - `events`: wire events (`tick`, `crash`, `survival`, `error`)
//! - `engine`: synchronous round state machines
//! - `config`: client stream requests and validation
//! - `runner`: cancellable tokio task per stream

pub mod config;
pub mod engine;
pub mod events;
pub mod runner;

use std::sync::Arc;

use tracing::info;

use crate::store::SampleStore;

pub use config::{StreamConfig, StreamDefaults, StreamError, StreamFlavor, StreamRequest};
pub use engine::{CrashEngine, RoundState, StreamDriver, SurvivalMonitor};
pub use events::StreamEvent;
pub use runner::{spawn_stream, StreamHandle};

/// Build and start the stream described by `config`.
pub fn start_stream(config: &StreamConfig, store: Arc<dyn SampleStore>) -> StreamHandle {
    info!(
        "Starting {:?} stream {} (label {}, step {}, period {:?})",
        config.flavor, config.stream_id, config.label, config.step, config.period
    );
    spawn_stream(config.build_driver(store), config.period)
}
