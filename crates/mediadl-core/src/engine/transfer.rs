//! Transfer model - what a progress driver asks for on every tick
//!
//! The simulated model stands in for a real transfer backend. Swapping it
//! out does not change anything about how the engine schedules or cancels.

use mediadl_types::EngineConfig;
use rand::Rng;

/// Outcome of a single progress tick
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    /// Advance by this many percentage points
    Advance(f64),
    /// Abort the transfer
    Fail(String),
}

/// Source of transfer speed and progress increments
pub trait TransferModel: Send + Sync {
    /// Speed for a download that is about to start; drawn once per download
    fn start_speed(&self) -> f64;

    /// Progress increment for the next tick
    fn next_step(&self) -> Step;
}

/// Randomized transfer that draws speed and increments uniformly
#[derive(Debug, Clone)]
pub struct SimulatedTransfer {
    min_speed: f64,
    max_speed: f64,
    max_step: f64,
    failure_rate: f64,
}

impl SimulatedTransfer {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            min_speed: config.min_speed,
            max_speed: config.max_speed,
            max_step: config.max_step,
            failure_rate: config.failure_rate,
        }
    }
}

impl Default for SimulatedTransfer {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}

impl TransferModel for SimulatedTransfer {
    fn start_speed(&self) -> f64 {
        rand::thread_rng().gen_range(self.min_speed..=self.max_speed)
    }

    fn next_step(&self) -> Step {
        let mut rng = rand::thread_rng();
        if self.failure_rate > 0.0 && rng.gen_bool(self.failure_rate) {
            return Step::Fail("simulated transfer failure".to_string());
        }
        Step::Advance(rng.gen_range(0.0..=self.max_step))
    }
}

/// Format a speed with one decimal place, e.g. "2.5 MB/s"
pub fn format_speed(speed: f64, unit: &str) -> String {
    format!("{:.1} {}", speed, unit)
}
