//! 10-Band Equalizer
//!
//! Built-in equalizer unit: a cascade of BiQuad filters per channel.
//! Based on the RBJ (Robert Bristow-Johnson) Audio EQ Cookbook.

use biquad::{Biquad, Coefficients, DirectForm2Transposed, ToHertz, Type, Q_BUTTERWORTH_F32};

/// Standard EQ band frequencies (Hz) - ISO octave centers
pub const EQ_BANDS: [f32; 10] = [
    31.0, 62.0, 125.0, 250.0, 500.0, 1000.0, 2000.0, 4000.0, 8000.0, 16000.0,
];

/// Gain range accepted per band (dB)
pub const MAX_BAND_GAIN_DB: f32 = 24.0;

/// Filter type for each EQ band
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BandType {
    LowShelf,
    Peaking,
    HighShelf,
}

impl BandType {
    fn for_index(index: usize) -> Self {
        match index {
            0 => BandType::LowShelf,
            9 => BandType::HighShelf,
            _ => BandType::Peaking,
        }
    }
}

/// Filter that passes its input unchanged
const IDENTITY: Coefficients<f32> = Coefficients {
    a1: 0.0,
    a2: 0.0,
    b0: 1.0,
    b1: 0.0,
    b2: 0.0,
};

/// Coefficients for one band
///
/// Bands at or above Nyquist cannot be realized at this rate and degrade to
/// an identity filter instead of failing.
fn band_coefficients(index: usize, gain_db: f32, sample_rate: f32) -> Coefficients<f32> {
    let frequency = EQ_BANDS[index];
    if gain_db == 0.0 || frequency * 2.0 >= sample_rate {
        return IDENTITY;
    }

    // biquad takes shelf and peak gains in dB
    let filter = match BandType::for_index(index) {
        BandType::LowShelf => Type::LowShelf(gain_db),
        BandType::Peaking => Type::PeakingEQ(gain_db),
        BandType::HighShelf => Type::HighShelf(gain_db),
    };

    Coefficients::<f32>::from_params(filter, sample_rate.hz(), frequency.hz(), Q_BUTTERWORTH_F32)
        .unwrap_or(IDENTITY)
}

/// The built-in equalizer
///
/// Designed for real-time use: no allocations in `process_planar()`.
/// Gain changes recompute a single band's coefficients in place.
pub struct Equalizer {
    // Each channel needs its own filter state
    filters_left: [DirectForm2Transposed<f32>; 10],
    filters_right: [DirectForm2Transposed<f32>; 10],
    gains_db: [f32; 10],
    sample_rate: f32,
}

impl Equalizer {
    /// Create a flat equalizer for the given sample rate
    pub fn new(sample_rate: f32) -> Self {
        Self {
            filters_left: core::array::from_fn(|_| DirectForm2Transposed::<f32>::new(IDENTITY)),
            filters_right: core::array::from_fn(|_| DirectForm2Transposed::<f32>::new(IDENTITY)),
            gains_db: [0.0; 10],
            sample_rate,
        }
    }

    /// Set gain for one band, clamped to ±24 dB
    ///
    /// No-op when the gain is unchanged. Out-of-range indices are ignored.
    /// Flat bands are skipped while processing, so a band leaving 0 dB starts
    /// from a clear delay line.
    pub fn set_band_gain(&mut self, band: usize, gain_db: f32) {
        let Some(current) = self.gains_db.get_mut(band) else {
            return;
        };
        let gain_db = gain_db.clamp(-MAX_BAND_GAIN_DB, MAX_BAND_GAIN_DB);
        if *current == gain_db {
            return;
        }
        let was_flat = *current == 0.0;
        *current = gain_db;

        let coeffs = band_coefficients(band, gain_db, self.sample_rate);
        self.filters_left[band].update_coefficients(coeffs);
        self.filters_right[band].update_coefficients(coeffs);
        if was_flat {
            self.filters_left[band].reset_state();
            self.filters_right[band].reset_state();
        }
    }

    pub fn band_gain(&self, band: usize) -> Option<f32> {
        self.gains_db.get(band).copied()
    }

    /// Process separate left/right channel buffers in place
    ///
    /// # Real-time Safety
    /// No allocations. O(n) where n = buffer length.
    #[inline]
    pub fn process_planar(&mut self, left: &mut [f32], right: &mut [f32]) {
        debug_assert_eq!(left.len(), right.len(), "Channel buffers must be same length");

        for (l, r) in left.iter_mut().zip(right.iter_mut()) {
            let mut sl = *l;
            let mut sr = *r;
            for band in 0..10 {
                if self.gains_db[band] != 0.0 {
                    sl = self.filters_left[band].run(sl);
                    sr = self.filters_right[band].run(sr);
                }
            }
            *l = sl;
            *r = sr;
        }
    }

    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    /// Clear delay lines
    pub fn reset(&mut self) {
        for i in 0..10 {
            self.filters_left[i].reset_state();
            self.filters_right[i].reset_state();
        }
    }
}
