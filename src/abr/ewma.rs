//! Exponentially weighted moving average for bandwidth smoothing
//!
//! Fixed-alpha variant: every observation carries the same weight
//! regardless of spacing, which matches per-segment sampling. Two of
//! these run side by side (fast and slow) and the estimate takes the
//! minimum, biasing the controller toward caution.

/// Fixed-alpha EWMA. Uninitialized until the first observation.
#[derive(Debug, Clone)]
pub struct Ewma {
    alpha: f64,
    value: Option<f64>,
}

impl Ewma {
    /// # Panics
    ///
    /// Panics if `alpha` is outside `(0, 1]`.
    pub fn new(alpha: f64) -> Self {
        assert!(alpha > 0.0 && alpha <= 1.0, "alpha must be in (0, 1]");
        Self { alpha, value: None }
    }

    /// Fold in one observation. The first one seeds the average.
    pub fn observe(&mut self, sample: f64) {
        self.value = Some(match self.value {
            None => sample,
            Some(prev) => self.alpha * sample + (1.0 - self.alpha) * prev,
        });
    }

    pub fn value(&self) -> Option<f64> {
        self.value
    }

    pub fn reset(&mut self) {
        self.value = None;
    }
}
