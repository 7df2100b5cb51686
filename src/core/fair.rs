//! Provably-Fair Crash Points
//!
//! A round's crash point is derived from an HMAC-SHA256 digest keyed by the
//! server seed over `client_seed || nonce`. Anyone holding the seeds can
//! recompute every round after the fact.
//!
//! ```text
//! digest = HMAC_SHA256(key = server_seed, msg = client_seed ++ decimal(nonce))
//! u      = int(hex(digest)[..13], 16) / 16^13        ∈ [0, 1)
//! u      = clamp(u, 1e-12, 1 - 1e-12)
//! R      = max(1.0, house_edge / (1 - u))
//! ```

use hmac::{Hmac, Mac};
use serde::{Serialize, Deserialize};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// House edge used when a stream does not configure one.
pub const DEFAULT_HOUSE_EDGE: f64 = 0.99;

/// Number of leading hex digits (52 bits) turned into the uniform draw.
pub const UNIFORM_HEX_DIGITS: usize = 13;

/// Clamp margin keeping `1 - u` away from zero.
pub const UNIFORM_EPSILON: f64 = 1e-12;

/// 16^13 = 2^52.
const UNIFORM_DENOMINATOR: f64 = (1u64 << (UNIFORM_HEX_DIGITS * 4)) as f64;

/// Compute the round digest.
pub fn round_digest(server_seed: &str, client_seed: &str, nonce: u64) -> [u8; 32] {
    let mut mac = HmacSha256::new_from_slice(server_seed.as_bytes())
        .expect("HMAC accepts keys of any length");
    mac.update(client_seed.as_bytes());
    mac.update(nonce.to_string().as_bytes());
    mac.finalize().into_bytes().into()
}

/// Lowercase hex of the round digest.
pub fn hmac_sha256_hex(server_seed: &str, client_seed: &str, nonce: u64) -> String {
    hex::encode(round_digest(server_seed, client_seed, nonce))
}

/// Map a digest to `u ∈ [0, 1)` from its first 13 hex digits.
///
/// 13 hex digits are the top 52 bits of the first 7 bytes, which an f64
/// represents exactly.
pub fn digest_to_uniform(digest: &[u8; 32]) -> f64 {
    let mut head = [0u8; 8];
    head.copy_from_slice(&digest[..8]);
    let head = u64::from_be_bytes(head) >> (64 - UNIFORM_HEX_DIGITS * 4);
    head as f64 / UNIFORM_DENOMINATOR
}

/// Apply the fairness transform to a uniform draw.
pub fn crash_point_from_uniform(u: f64, house_edge: f64) -> f64 {
    let u = u.clamp(UNIFORM_EPSILON, 1.0 - UNIFORM_EPSILON);
    (house_edge / (1.0 - u)).max(1.0)
}

/// Crash point for one round. Pure: identical inputs give identical bits.
pub fn crash_point(server_seed: &str, client_seed: &str, nonce: u64, house_edge: f64) -> f64 {
    let digest = round_digest(server_seed, client_seed, nonce);
    crash_point_from_uniform(digest_to_uniform(&digest), house_edge)
}

/// Crash points for `rounds` consecutive nonces starting at `start_nonce`.
///
/// Nonces wrap at `u64::MAX`, as [`FairSeeds::advance`] does.
pub fn sequence(
    server_seed: &str,
    client_seed: &str,
    start_nonce: u64,
    rounds: u64,
    house_edge: f64,
) -> Vec<f64> {
    (0..rounds)
        .map(|k| crash_point(server_seed, client_seed, start_nonce.wrapping_add(k), house_edge))
        .collect()
}

/// Seed material for one provably-fair stream.
///
/// Only `nonce` changes over the stream's lifetime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FairSeeds {
    server_seed: String,
    client_seed: String,
    nonce: u64,
    house_edge: f64,
}

impl FairSeeds {
    /// Create seeds. Callers validate `house_edge ∈ (0, 1)`.
    pub fn new(
        server_seed: impl Into<String>,
        client_seed: impl Into<String>,
        nonce: u64,
        house_edge: f64,
    ) -> Self {
        Self {
            server_seed: server_seed.into(),
            client_seed: client_seed.into(),
            nonce,
            house_edge,
        }
    }

    /// Current round nonce.
    pub fn nonce(&self) -> u64 {
        self.nonce
    }

    /// Configured house edge.
    pub fn house_edge(&self) -> f64 {
        self.house_edge
    }

    /// Crash point of the current round.
    pub fn crash_point(&self) -> f64 {
        crash_point(&self.server_seed, &self.client_seed, self.nonce, self.house_edge)
    }

    /// Hex digest of the current round, for verification.
    pub fn digest_hex(&self) -> String {
        hmac_sha256_hex(&self.server_seed, &self.client_seed, self.nonce)
    }

    /// Move to the next round.
    pub fn advance(&mut self) {
        self.nonce = self.nonce.wrapping_add(1);
    }
}

// =============================================================================
// TESTS
// =============================================================================
