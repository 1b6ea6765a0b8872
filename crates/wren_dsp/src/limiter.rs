//! Soft Limiter
//!
//! Built-in limiter unit: a tanh soft clipper.
//! - Below threshold: linear (unity gain)
//! - Above threshold: smooth saturation that approaches ±1.0

/// Tanh soft clipper with a linear threshold
#[derive(Debug, Clone)]
pub struct Limiter {
    threshold: f32,
}

impl Limiter {
    /// Create a limiter with a threshold in dB below 0 dBFS
    pub fn new(threshold_db: f32) -> Self {
        let mut limiter = Self { threshold: 1.0 };
        limiter.set_threshold_db(threshold_db);
        limiter
    }

    pub fn set_threshold_db(&mut self, db: f32) {
        self.threshold = 10.0_f32.powf(db.min(0.0) / 20.0);
    }

    /// Threshold in linear scale
    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// # Real-time Safety
    /// No allocations, O(n) time.
    #[inline]
    pub fn process_planar(&self, left: &mut [f32], right: &mut [f32]) {
        for sample in left.iter_mut().chain(right.iter_mut()) {
            *sample = soft_clip(*sample, self.threshold);
        }
    }
}

impl Default for Limiter {
    fn default() -> Self {
        Self::new(-3.0)
    }
}

/// Map samples above `threshold` onto the remaining headroom with tanh
///
/// Input at threshold maps to threshold; output never exceeds ±1.0.
#[inline]
fn soft_clip(sample: f32, threshold: f32) -> f32 {
    let magnitude = sample.abs();
    if magnitude <= threshold {
        return sample;
    }

    let headroom = 1.0 - threshold;
    let excess = (magnitude - threshold) / headroom.max(0.001);
    sample.signum() * (threshold + headroom * excess.tanh())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_threshold() {
        // -3dB ≈ 0.708
        assert!((Limiter::default().threshold() - 0.708).abs() < 0.01);
    }

    #[test]
    fn test_below_threshold_passthrough() {
        let limiter = Limiter::new(-3.0);
        let quiet = limiter.threshold() * 0.5;
        let mut left = vec![quiet, -quiet];
        let mut right = vec![0.0, 0.1];

        limiter.process_planar(&mut left, &mut right);

        assert_eq!(left, vec![quiet, -quiet]);
        assert_eq!(right, vec![0.0, 0.1]);
    }

    #[test]
    fn test_limits_and_preserves_polarity() {
        let limiter = Limiter::new(-6.0);
        let mut left = vec![2.0, 1000.0];
        let mut right = vec![-2.0, -1000.0];

        limiter.process_planar(&mut left, &mut right);

        assert!(left[0] < 1.0 && left[0] > 0.5);
        assert!(right[0] > -1.0 && right[0] < -0.5);
        assert!((left[0] + right[0]).abs() < 1e-6);
        assert!(left[1] <= 1.0 && right[1] >= -1.0);
    }

    #[test]
    fn test_continuous_at_threshold() {
        let limiter = Limiter::new(-3.0);
        let t = limiter.threshold();
        let below = soft_clip(t - 0.001, t);
        let above = soft_clip(t + 0.001, t);
        assert!((above - below).abs() < 0.01);
    }

    #[test]
    fn test_positive_threshold_is_capped_at_full_scale() {
        let limiter = Limiter::new(6.0);
        assert_eq!(limiter.threshold(), 1.0);
    }
}
