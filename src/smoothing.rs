/// Exponential moving average: `value = value * retention + input * (1 - retention)`.
///
/// A retention close to 1 reacts slowly and rejects transients; a retention
/// of 0 passes the input through unchanged.
#[derive(Clone, Copy, Debug)]
pub struct Smoother {
    retention: f32,
    value: f32,
}

impl Smoother {
    pub fn new(retention: f32) -> Self {
        Self::with_value(retention, 0.0)
    }

    pub fn with_value(retention: f32, value: f32) -> Self {
        Self {
            retention: retention.clamp(0.0, 1.0),
            value,
        }
    }

    pub fn push(&mut self, input: f32) -> f32 {
        self.value = blend(self.value, input, self.retention);
        self.value
    }

    pub fn value(&self) -> f32 {
        self.value
    }

    pub fn reset(&mut self, value: f32) {
        self.value = value;
    }
}

/// One smoothing step from `previous` toward `input`.
pub fn blend(previous: f32, input: f32, retention: f32) -> f32 {
    previous * retention + input * (1.0 - retention)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_push_moves_a_fraction_of_the_way() {
        let mut smoother = Smoother::new(0.85);
        let value = smoother.push(1.0);
        assert!((value - 0.15).abs() < 1e-6);
    }

    #[test]
    fn converges_to_constant_input() {
        let mut smoother = Smoother::new(0.85);
        for _ in 0..200 {
            smoother.push(0.4);
        }
        assert!((smoother.value() - 0.4).abs() < 1e-4);
    }

    #[test]
    fn single_transient_is_damped() {
        let mut smoother = Smoother::with_value(0.85, 0.1);
        let spiked = smoother.push(1.0);
        assert!(spiked < 0.25, "spiked={spiked}");
    }

    #[test]
    fn zero_retention_passes_input_through() {
        let mut smoother = Smoother::new(0.0);
        assert_eq!(smoother.push(0.7), 0.7);
    }
}
