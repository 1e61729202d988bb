use std::time::Duration;

/// Round trip time estimate, it only ever moves down towards the fastest
/// round trip observed, and never below the floor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RttEstimator {
    estimate: Duration,
    floor: Duration,
}

impl RttEstimator {
    pub fn new(initial: Duration, floor: Duration) -> Self {
        Self {
            estimate: initial.max(floor),
            floor,
        }
    }

    /// Folds in a measured round trip and returns the new estimate.
    pub fn update(&mut self, measured: Duration) -> Duration {
        self.estimate = self.estimate.min(measured.max(self.floor));
        self.estimate
    }

    pub fn estimate(&self) -> Duration {
        self.estimate
    }
}
