//! Trust region state machine
//!
//! Tracks the shared discrete/continuous search radius. Each iteration the
//! run loop derives an adjustment factor from the remaining per-dimensionality
//! budget and calls [`TrustRegion::update`]: no improvement shrinks the
//! region by the factor, a streak of strict improvements expands it. The
//! region terminates once the length drops below the configured minimum,
//! which triggers a split of the embedding or a full restart.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrustRegion {
    /// Embedded dimensionality this region was created for.
    pub dimensionality: usize,
    /// Current search radius (shared discrete/continuous scalar).
    pub length_discrete_continuous: f64,
    /// Initial radius; the reset value and the expansion cap.
    pub length_init_discrete: f64,
    /// Minimum radius; below it the region is terminated.
    pub length_min_discrete: f64,
    /// Consecutive strict improvements required before expansion.
    pub success_tolerance: usize,
    success_streak: usize,
}

impl TrustRegion {
    pub fn new(
        dimensionality: usize,
        length_init: f64,
        length_min: f64,
        success_tolerance: usize,
    ) -> Self {
        TrustRegion {
            dimensionality,
            length_discrete_continuous: length_init,
            length_init_discrete: length_init,
            length_min_discrete: length_min,
            success_tolerance,
            success_streak: 0,
        }
    }

    /// Applies one iteration's outcome.
    ///
    /// `adjustment_factor` is in `(0, 1]`; without improvement the length is
    /// multiplied by it, after `success_tolerance` consecutive strict
    /// improvements the length is divided by it (capped at the initial
    /// length).
    pub fn update(&mut self, fx_next: f64, fx_incumbent: f64, adjustment_factor: f64) {
        if fx_next < fx_incumbent {
            self.success_streak += 1;
            if self.success_streak >= self.success_tolerance {
                let old = self.length_discrete_continuous;
                self.length_discrete_continuous =
                    (old / adjustment_factor).min(self.length_init_discrete);
                self.success_streak = 0;
                log::info!(
                    "Trust region expanded: length {old:.3} -> {:.3}",
                    self.length_discrete_continuous
                );
            }
        } else {
            self.success_streak = 0;
            self.length_discrete_continuous *= adjustment_factor;
        }
    }

    /// True once the radius has fallen below the minimum.
    pub fn terminated(&self) -> bool {
        self.length_discrete_continuous < self.length_min_discrete
    }

    /// Restores the initial radius; used on full-dimensionality restart.
    pub fn reset(&mut self) {
        self.length_discrete_continuous = self.length_init_discrete;
        self.success_streak = 0;
    }

    /// Half-width of the trust-region box in the scaled `[0, 1]` embedded
    /// space, the initial length mapping to the full range.
    pub fn continuous_radius(&self) -> f64 {
        (self.length_discrete_continuous / self.length_init_discrete).min(1.0)
    }

    /// Maximum Hamming distance for discrete candidate moves.
    pub fn discrete_radius(&self, n_discrete_columns: usize) -> usize {
        (self.length_discrete_continuous.round() as usize)
            .min(n_discrete_columns)
            .max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn region() -> TrustRegion {
        TrustRegion::new(5, 40.0, 1.0, 3)
    }

    #[test]
    fn test_no_improvement_shrinks() {
        let mut tr = region();
        tr.update(2.0, 1.0, 0.5);
        assert_abs_diff_eq!(tr.length_discrete_continuous, 20.0);
    }

    #[test]
    fn test_tie_is_not_an_improvement() {
        let mut tr = region();
        tr.update(1.0, 1.0, 0.5);
        assert_abs_diff_eq!(tr.length_discrete_continuous, 20.0);
    }

    #[test]
    fn test_improvement_streak_expands_with_cap() {
        let mut tr = region();
        tr.update(2.0, 3.0, 0.5);
        tr.update(2.0, 3.0, 0.5);
        assert_abs_diff_eq!(tr.length_discrete_continuous, 40.0);
        tr.update(2.0, 3.0, 0.5);
        // capped at the initial length
        assert_abs_diff_eq!(tr.length_discrete_continuous, 40.0);

        let mut tr = TrustRegion::new(5, 40.0, 1.0, 1);
        tr.update(5.0, 4.0, 0.5);
        assert_abs_diff_eq!(tr.length_discrete_continuous, 20.0);
        tr.update(3.0, 4.0, 0.5);
        assert_abs_diff_eq!(tr.length_discrete_continuous, 40.0);
    }

    #[test]
    fn test_failure_resets_streak() {
        let mut tr = region();
        tr.update(2.0, 3.0, 1.0);
        tr.update(2.0, 3.0, 1.0);
        tr.update(4.0, 3.0, 1.0);
        tr.update(2.0, 3.0, 1.0);
        tr.update(2.0, 3.0, 1.0);
        assert_abs_diff_eq!(tr.length_discrete_continuous, 40.0);
    }

    #[test]
    fn test_terminates_below_minimum() {
        let mut tr = region();
        assert!(!tr.terminated());
        tr.length_discrete_continuous = 0.99;
        assert!(tr.terminated());
        tr.reset();
        assert!(!tr.terminated());
        assert_abs_diff_eq!(tr.length_discrete_continuous, 40.0);
    }

    #[test]
    fn test_radius_helpers() {
        let mut tr = region();
        assert_abs_diff_eq!(tr.continuous_radius(), 1.0);
        tr.length_discrete_continuous = 10.0;
        assert_abs_diff_eq!(tr.continuous_radius(), 0.25);
        assert_eq!(tr.discrete_radius(4), 4);
        tr.length_discrete_continuous = 2.4;
        assert_eq!(tr.discrete_radius(8), 2);
        tr.length_discrete_continuous = 0.2;
        assert_eq!(tr.discrete_radius(8), 1);
    }
}
