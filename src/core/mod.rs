//! Core primitives.
//!
//! Everything here is pure: the provably-fair derivation, the seeded RNG
//! used by the samplers, and decimal rounding.

pub mod fair;
pub mod numeric;
pub mod rng;

// Re-export core types
pub use fair::{crash_point, FairSeeds, DEFAULT_HOUSE_EDGE};
pub use numeric::{round2, round6};
pub use rng::StreamRng;
