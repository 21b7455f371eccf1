//! Simulated progress for a request that reports none of its own.
//!
//! The simulator only ever moves forward. While the request is outstanding it
//! creeps towards `cap` in shrinking steps; only [`ProgressSimulator::complete`]
//! takes it to 100. Every tick carries the generation it was scheduled for, so
//! a timer that fires after cancellation is a no-op.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

pub const COMPLETE: f64 = 100.0;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProgressBand {
    /// Upper bound (exclusive) of the progress range this band covers.
    pub below: f64,
    /// Largest increment a single tick may add inside this band.
    pub max_increment: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProgressConfig {
    pub tick_interval_ms: u64,
    pub submitted: f64,
    pub prepared: f64,
    pub cap: f64,
    pub bands: Vec<ProgressBand>,
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 250,
            submitted: 5.0,
            prepared: 15.0,
            cap: 95.0,
            bands: vec![
                ProgressBand { below: 60.0, max_increment: 3.0 },
                ProgressBand { below: 85.0, max_increment: 1.5 },
                ProgressBand { below: 95.0, max_increment: 0.2 },
            ],
        }
    }
}

impl ProgressConfig {
    #[must_use]
    pub fn ceiling_for(&self, value: f64) -> f64 {
        self.bands
            .iter()
            .find(|band| value < band.below)
            .map_or(0.0, |band| band.max_increment)
    }
}

/// Supplies the random part of each tick as a fraction in `[0, 1]`.
pub trait IncrementSource {
    fn next_fraction(&mut self) -> f64;
}

pub struct RandomIncrements(StdRng);

impl RandomIncrements {
    #[must_use]
    pub fn from_entropy() -> Self {
        Self(StdRng::from_entropy())
    }

    #[must_use]
    pub fn seeded(seed: u64) -> Self {
        Self(StdRng::seed_from_u64(seed))
    }
}

impl IncrementSource for RandomIncrements {
    fn next_fraction(&mut self) -> f64 {
        self.0.gen::<f64>()
    }
}

/// Always returns the same fraction.
#[derive(Clone, Copy, Debug)]
pub struct FixedIncrements(pub f64);

impl IncrementSource for FixedIncrements {
    fn next_fraction(&mut self) -> f64 {
        self.0
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    Idle,
    Preparing,
    Running { generation: u64 },
    Completed,
    Cancelled,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ProgressSimulator {
    config: ProgressConfig,
    value: f64,
    phase: Phase,
    generation: u64,
}

impl ProgressSimulator {
    #[must_use]
    pub fn new(config: ProgressConfig) -> Self {
        Self {
            config,
            value: 0.0,
            phase: Phase::Idle,
            generation: 0,
        }
    }

    #[must_use]
    pub const fn value(&self) -> f64 {
        self.value
    }

    #[must_use]
    pub const fn phase(&self) -> Phase {
        self.phase
    }

    #[must_use]
    pub fn config(&self) -> &ProgressConfig {
        &self.config
    }

    #[must_use]
    pub const fn running_generation(&self) -> Option<u64> {
        match self.phase {
            Phase::Running { generation } => Some(generation),
            _ => None,
        }
    }

    fn advance_to(&mut self, target: f64) {
        let target = target.min(self.config.cap);
        if target > self.value {
            self.value = target;
        }
    }

    /// The request has been handed off; inputs are still being prepared.
    pub fn submitted(&mut self) {
        if self.phase != Phase::Idle {
            return;
        }
        self.advance_to(self.config.submitted);
        self.phase = Phase::Preparing;
    }

    /// Inputs are ready to send. Returns the generation the first tick must
    /// be scheduled with.
    pub fn start_ticking(&mut self) -> Option<u64> {
        if self.phase != Phase::Preparing {
            return None;
        }
        self.advance_to(self.config.prepared);
        self.generation += 1;
        self.phase = Phase::Running {
            generation: self.generation,
        };
        Some(self.generation)
    }

    /// Applies one tick. Returns the new value, or `None` when the tick
    /// belongs to a generation that is no longer running.
    pub fn tick(&mut self, generation: u64, fraction: f64) -> Option<f64> {
        if self.running_generation() != Some(generation) {
            return None;
        }
        let fraction = if fraction.is_finite() {
            fraction.clamp(0.0, 1.0)
        } else {
            0.0
        };
        let increment = self.config.ceiling_for(self.value) * fraction;
        self.advance_to(self.value + increment);
        Some(self.value)
    }

    /// Stops ticking. Returns the generation whose timer should be cleared.
    pub fn cancel(&mut self) -> Option<u64> {
        let running = self.running_generation();
        if matches!(self.phase, Phase::Preparing | Phase::Running { .. }) {
            self.phase = Phase::Cancelled;
        }
        running
    }

    /// The real result arrived. Cancels ticking and pins the value at 100.
    pub fn complete(&mut self) -> Option<u64> {
        let running = self.running_generation();
        self.phase = Phase::Completed;
        self.value = COMPLETE;
        running
    }
}
