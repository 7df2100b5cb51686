//! # Crash Stream Server
//!
//! Live multiplier streams for crash-style games, backed by an append-only
//! dataset of observed crash points.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    CRASH STREAM SERVER                       │
//! ├─────────────────────────────────────────────────────────────┤
//! │  core/           - Deterministic primitives                  │
//! │  ├── fair.rs     - HMAC-SHA256 provably-fair crash points    │
//! │  ├── rng.rs      - Seedable Xorshift128+ stream PRNG         │
//! │  └── numeric.rs  - Rounding for the wire format              │
//! │                                                              │
//! │  store/          - Persisted sample                          │
//! │  ├── json.rs     - main.json + timestamped audit files       │
//! │  ├── memory.rs   - In-memory store for tests                 │
//! │  └── parse.rs    - "2.95x" style input parsing               │
//! │                                                              │
//! │  sampler/        - Crash threshold sources                   │
//! │  ├── empirical.rs- Resample stored values                    │
//! │  └── pareto.rs   - Pareto fallback law                       │
//! │                                                              │
//! │  stats/          - Summary, survival, model fitting          │
//! │                                                              │
//! │  stream/         - Tick/crash event loop                     │
//! │  ├── engine.rs   - Round state machine                       │
//! │  ├── runner.rs   - Cancellable periodic task                 │
//! │  └── events.rs   - Emitted event types                       │
//! │                                                              │
//! │  network/        - Networking (non-deterministic)            │
//! │  ├── server.rs   - WebSocket server                          │
//! │  └── protocol.rs - Message types                             │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Determinism
//!
//! Provably-fair rounds depend only on `(server_seed, client_seed, nonce)`
//! and reproduce bit-for-bit across platforms. Empirical and parametric
//! streams draw from a seeded [`core::StreamRng`], so a fixed seed and a
//! fixed sample replay the same thresholds.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod config;
pub mod core;
pub mod network;
pub mod sampler;
pub mod stats;
pub mod store;
pub mod stream;

// Re-export commonly used types
pub use crate::config::{DataConfig, ServerConfig};
pub use crate::core::{crash_point, FairSeeds, StreamRng};
pub use crate::sampler::CrashSampler;
pub use crate::stats::{summarize, SummaryStats};
pub use crate::store::{JsonFileStore, MemoryStore, MultiplierRecord, SampleStore};
pub use crate::stream::{start_stream, StreamConfig, StreamEvent, StreamHandle, StreamRequest};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
