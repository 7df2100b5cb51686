//! Stream Engines
//!
//! Synchronous per-tick state machines. The runner calls [`StreamDriver::step`]
//! once per timer tick and forwards the returned event.
//!
//! ```text
//! ROUND_ACTIVE --tick (x < R)--> ROUND_ACTIVE
//! ROUND_ACTIVE --tick (x >= R)--> CROSSED --persist, advance, reset--> ROUND_ACTIVE
//! ```
//!
//! CROSSED lasts only inside the crashing [`CrashEngine::step`] call.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::core::numeric::{round2, round6};
use crate::sampler::CrashSampler;
use crate::stats::survival_at;
use crate::store::SampleStore;

use super::events::StreamEvent;

/// Value every round starts from.
pub const ROUND_START: f64 = 1.0;

/// Per-stream round state, owned by exactly one loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundState {
    /// Rising value. Starts at 1.0 and never decreases within a round.
    pub current_value: f64,
    /// Crash threshold of the round.
    pub threshold: f64,
    /// Round nonce (provably-fair streams).
    pub nonce: Option<u64>,
}

/// Tick/crash loop over a sampler.
pub struct CrashEngine {
    state: RoundState,
    sampler: CrashSampler,
    store: Arc<dyn SampleStore>,
    label: String,
    event_id: Option<String>,
    step: f64,
    rounds: u64,
}

impl CrashEngine {
    /// Create an engine and draw the first round's threshold.
    pub fn new(
        mut sampler: CrashSampler,
        store: Arc<dyn SampleStore>,
        label: impl Into<String>,
        step: f64,
    ) -> Self {
        let draw = sampler.draw();
        Self {
            state: RoundState {
                current_value: ROUND_START,
                threshold: draw.threshold,
                nonce: draw.nonce,
            },
            sampler,
            store,
            label: label.into(),
            event_id: None,
            step,
            rounds: 0,
        }
    }

    /// Tag emitted events with `id`.
    pub fn with_event_id(mut self, id: Option<String>) -> Self {
        self.event_id = id;
        self
    }

    /// Current round state.
    pub fn state(&self) -> &RoundState {
        &self.state
    }

    /// Number of completed rounds.
    pub fn rounds(&self) -> u64 {
        self.rounds
    }

    /// Advance one tick.
    pub fn step(&mut self) -> StreamEvent {
        self.state.current_value = round2(self.state.current_value + self.step);

        if self.state.current_value < self.state.threshold {
            return StreamEvent::Tick {
                id: self.event_id.clone(),
                x: self.state.current_value,
                threshold: round2(self.state.threshold),
                nonce: self.state.nonce,
            };
        }

        let crash_value = round2(self.state.threshold);
        let nonce = self.state.nonce;

        if let Err(e) = self.store.append_record(crash_value, &self.label) {
            warn!("Failed to persist crash {} for {}: {}", crash_value, self.label, e);
        }

        self.rounds += 1;
        debug!(
            "Round {} of {} crashed at {} ({:?})",
            self.rounds, self.label, crash_value, nonce
        );

        self.sampler.advance();
        self.begin_round();

        StreamEvent::Crash {
            id: self.event_id.clone(),
            crash_value,
            nonce,
        }
    }

    fn begin_round(&mut self) {
        let draw = self.sampler.draw();
        self.state = RoundState {
            current_value: ROUND_START,
            threshold: draw.threshold,
            nonce: draw.nonce,
        };
    }
}

impl std::fmt::Debug for CrashEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CrashEngine")
            .field("state", &self.state)
            .field("sampler", &self.sampler.kind())
            .field("label", &self.label)
            .field("step", &self.step)
            .finish_non_exhaustive()
    }
}

/// Walks an evaluation point up the empirical survival curve.
pub struct SurvivalMonitor {
    x: f64,
    step: f64,
    cap: f64,
    store: Arc<dyn SampleStore>,
}

impl SurvivalMonitor {
    /// Start at 1.0.
    pub fn new(store: Arc<dyn SampleStore>, step: f64, cap: f64) -> Self {
        Self {
            x: ROUND_START,
            step,
            cap,
            store,
        }
    }

    /// Current evaluation point.
    pub fn x(&self) -> f64 {
        self.x
    }

    /// Emit S(x) over a fresh sample, then advance the point. Wraps to 1.0 past the cap.
    pub fn step(&mut self) -> StreamEvent {
        let sample = self.store.load_sample();
        let event = StreamEvent::Survival {
            x: round2(self.x),
            survival: round6(survival_at(self.x, &sample)),
            n: sample.len(),
        };

        self.x += self.step;
        if self.x > self.cap {
            self.x = ROUND_START;
        }
        event
    }
}

/// Engine driven by a stream task.
pub enum StreamDriver {
    /// Tick/crash rounds.
    Crash(CrashEngine),
    /// Survival curve walk.
    Survival(SurvivalMonitor),
}

impl StreamDriver {
    /// Advance one tick.
    pub fn step(&mut self) -> StreamEvent {
        match self {
            Self::Crash(engine) => engine.step(),
            Self::Survival(monitor) => monitor.step(),
        }
    }
}

impl From<CrashEngine> for StreamDriver {
    fn from(engine: CrashEngine) -> Self {
        Self::Crash(engine)
    }
}

impl From<SurvivalMonitor> for StreamDriver {
    fn from(monitor: SurvivalMonitor) -> Self {
        Self::Survival(monitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::fair::{FairSeeds, DEFAULT_HOUSE_EDGE};
    use crate::core::rng::StreamRng;
    use crate::store::MemoryStore;

    fn empirical_engine(store: Arc<MemoryStore>) -> CrashEngine {
        let sampler = CrashSampler::empirical(store.clone(), StreamRng::new(1));
        CrashEngine::new(sampler, store, "sim", 0.01).with_event_id(Some("sim".into()))
    }

    #[test]
    fn test_fifth_tick_crashes_at_threshold() {
        let store = Arc::new(MemoryStore::with_values("seed", &[1.05]));
        let mut engine = empirical_engine(store.clone());
        assert_eq!(engine.state().threshold, 1.05);

        for expected in [1.01, 1.02, 1.03, 1.04] {
            match engine.step() {
                StreamEvent::Tick { x, threshold, id, nonce } => {
                    assert_eq!(x, expected);
                    assert_eq!(threshold, 1.05);
                    assert_eq!(id.as_deref(), Some("sim"));
                    assert_eq!(nonce, None);
                }
                other => panic!("expected tick, got {:?}", other),
            }
        }

        assert_eq!(
            engine.step(),
            StreamEvent::Crash {
                id: Some("sim".into()),
                crash_value: 1.05,
                nonce: None
            }
        );
        assert_eq!(engine.rounds(), 1);
        assert_eq!(engine.state().current_value, ROUND_START);

        // New round starts from 1.00.
        match engine.step() {
            StreamEvent::Tick { x, .. } => assert_eq!(x, 1.01),
            other => panic!("expected tick, got {:?}", other),
        }
    }

    #[test]
    fn test_crash_is_persisted_with_label() {
        let store = Arc::new(MemoryStore::with_values("seed", &[1.02]));
        let mut engine = empirical_engine(store.clone());
        engine.step();
        assert!(engine.step().is_crash());

        let records = store.load_records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].session_id, "sim");
        assert_eq!(records[1].multiplier, 1.02);
    }

    #[test]
    fn test_provably_fair_rounds() {
        let store = Arc::new(MemoryStore::new());
        let sampler = CrashSampler::provably_fair(FairSeeds::new(
            "server-seed",
            "client-seed",
            2,
            DEFAULT_HOUSE_EDGE,
        ));
        let mut engine = CrashEngine::new(sampler, store.clone(), "pf", 0.01);

        // R = 1.01157... at nonce 2.
        assert_eq!(
            engine.step(),
            StreamEvent::Tick { id: None, x: 1.01, threshold: 1.01, nonce: Some(2) }
        );
        assert_eq!(
            engine.step(),
            StreamEvent::Crash { id: None, crash_value: 1.01, nonce: Some(2) }
        );
        assert_eq!(engine.state().nonce, Some(3));
        assert_eq!(
            engine.step(),
            StreamEvent::Tick { id: None, x: 1.01, threshold: 1.54, nonce: Some(3) }
        );
        assert_eq!(store.load_sample(), vec![1.01]);
    }

    #[test]
    fn test_persistence_failure_keeps_streaming() {
        let store = Arc::new(MemoryStore::with_values("seed", &[1.01]));
        store.set_reject_writes(true);
        let mut engine = empirical_engine(store.clone());

        for _ in 0..3 {
            assert!(engine.step().is_crash());
        }
        assert_eq!(engine.rounds(), 3);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_value_never_decreases_within_round() {
        let store = Arc::new(MemoryStore::with_values("seed", &[1.3, 2.0, 1.07]));
        let mut engine = empirical_engine(store);
        let mut last = ROUND_START;
        for _ in 0..500 {
            match engine.step() {
                StreamEvent::Tick { x, threshold, .. } => {
                    assert!(x > last);
                    assert!(x < threshold);
                    last = x;
                }
                StreamEvent::Crash { .. } => last = ROUND_START,
                other => panic!("unexpected {:?}", other),
            }
        }
    }

    #[test]
    fn test_survival_monitor_wraps() {
        let store = Arc::new(MemoryStore::with_values("seed", &[1.0, 2.0, 2.0, 3.0]));
        let mut monitor = SurvivalMonitor::new(store, 0.5, 2.0);

        assert_eq!(monitor.step(), StreamEvent::Survival { x: 1.0, survival: 1.0, n: 4 });
        assert_eq!(monitor.step(), StreamEvent::Survival { x: 1.5, survival: 0.75, n: 4 });
        assert_eq!(monitor.step(), StreamEvent::Survival { x: 2.0, survival: 0.75, n: 4 });
        // 2.5 exceeds the cap.
        assert_eq!(monitor.x(), ROUND_START);
        assert_eq!(monitor.step(), StreamEvent::Survival { x: 1.0, survival: 1.0, n: 4 });
    }

    #[test]
    fn test_survival_monitor_empty_store() {
        let mut monitor = SurvivalMonitor::new(Arc::new(MemoryStore::new()), 0.01, 1000.0);
        assert_eq!(monitor.step(), StreamEvent::Survival { x: 1.0, survival: 0.0, n: 0 });
    }
}
