use std::ops::RangeInclusive;
use std::time::Duration;

use rand::Rng;
use tokio::time::sleep;
use tracing::debug;

use crate::config::PacingSection;

/// Bounded uniform random wait between remote interactions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pacer {
    range_ms: (u64, u64),
}

impl Pacer {
    pub fn new(range_ms: (u64, u64)) -> Self {
        let lower = range_ms.0.min(range_ms.1);
        let upper = range_ms.0.max(range_ms.1);
        Self {
            range_ms: (lower, upper),
        }
    }

    pub fn from_bounds(bounds: [u64; 2]) -> Self {
        Self::new((bounds[0], bounds[1]))
    }

    /// A pacer that never sleeps.
    pub fn disabled() -> Self {
        Self::new((0, 0))
    }

    pub fn range_ms(&self) -> (u64, u64) {
        self.range_ms
    }

    pub fn is_disabled(&self) -> bool {
        self.range_ms == (0, 0)
    }

    /// Picks the next delay without sleeping.
    pub fn next_delay(&self) -> Duration {
        if self.is_disabled() {
            return Duration::ZERO;
        }
        let mut rng = rand::thread_rng();
        Duration::from_millis(rng.gen_range(self.range_ms.0..=self.range_ms.1))
    }

    /// Sleeps for a random delay and returns the waited milliseconds.
    pub async fn wait(&self) -> u64 {
        let delay = self.next_delay();
        if delay.is_zero() {
            return 0;
        }
        debug!(delay_ms = delay.as_millis() as u64, "pacing");
        sleep(delay).await;
        delay.as_millis() as u64
    }
}

/// Per-character typing delay modelled on a characters-per-minute range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypingCadence {
    cadence_cpm: [u32; 2],
    jitter_ms: [u32; 2],
}

impl TypingCadence {
    pub fn new(cadence_cpm: [u32; 2], jitter_ms: [u32; 2]) -> Self {
        Self {
            cadence_cpm: ordered(cadence_cpm),
            jitter_ms: ordered(jitter_ms),
        }
    }

    pub fn from_pacing(pacing: &PacingSection) -> Self {
        Self::new(pacing.typing_cadence_cpm, pacing.typing_jitter_ms)
    }

    pub fn next_delay(&self) -> Duration {
        let mut rng = rand::thread_rng();
        let cadence_range = RangeInclusive::new(self.cadence_cpm[0], self.cadence_cpm[1]);
        let cadence = rng.gen_range(cadence_range).max(60) as f64;
        let base_delay = 60.0 / cadence;
        let jitter_range = RangeInclusive::new(self.jitter_ms[0], self.jitter_ms[1]);
        let jitter_ms = rng.gen_range(jitter_range);
        Duration::from_secs_f64(base_delay + jitter_ms as f64 / 1000.0)
    }
}

fn ordered(bounds: [u32; 2]) -> [u32; 2] {
    [bounds[0].min(bounds[1]), bounds[0].max(bounds[1])]
}
