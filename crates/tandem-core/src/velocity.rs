//! Velocity statistics for global loudness correction.

/// EMA smoothing factor. Deliberately slow so a few accented notes do
/// not swing the scale.
const SMOOTHING: f64 = 0.05;

/// Clamp on the live/reference ratio while the averages converge.
const SCALE_MIN: f64 = 0.25;
const SCALE_MAX: f64 = 4.0;

/// Exponential moving averages of live and matched-reference note
/// velocities. The scale they yield is applied to a reference note's
/// velocity before blending, never earlier than the first observation
/// on both sides.
#[derive(Debug, Default)]
pub struct VelocityStatistics {
    live: Option<f64>,
    reference: Option<f64>,
}

impl VelocityStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        self.live = None;
        self.reference = None;
    }

    /// Feed one live note-on velocity. The EMA snaps to the first
    /// observed value.
    pub fn observe_live(&mut self, velocity: u8) {
        Self::observe(&mut self.live, velocity);
    }

    /// Feed the velocity of the reference note a live note matched.
    pub fn observe_reference(&mut self, velocity: u8) {
        Self::observe(&mut self.reference, velocity);
    }

    fn observe(ema: &mut Option<f64>, velocity: u8) {
        let v = velocity as f64;
        *ema = Some(match *ema {
            Some(current) => current + SMOOTHING * (v - current),
            None => v,
        });
    }

    /// live EMA / reference EMA, clamped to [0.25, 4.0]. Exactly 1.0
    /// until both averages have seen at least one sample.
    pub fn scale(&self) -> f64 {
        match (self.live, self.reference) {
            (Some(live), Some(reference)) if reference > 0.0 => {
                (live / reference).clamp(SCALE_MIN, SCALE_MAX)
            }
            _ => 1.0,
        }
    }
}
