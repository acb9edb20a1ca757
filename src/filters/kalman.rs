use super::PositionFilter;
use crate::constants::DEFAULT_FPS;
use nalgebra::{Matrix2, Matrix2x4, Matrix4, Vector2, Vector4};

/// Constant-velocity Kalman filter over pixel positions
pub struct KalmanFilter {
    // [x, y, vx, vy]
    state: Vector4<f64>,
    covariance: Matrix4<f64>,
    process_noise: Matrix4<f64>,
    measurement_noise: Matrix2<f64>,
    transition: Matrix4<f64>,
    measurement: Matrix2x4<f64>,
    initialized: bool,
}

/// Acceleration noise, px/s^2 squared
const PROCESS_NOISE: f64 = 400.0;
/// Tracker box jitter, px squared
const MEASUREMENT_NOISE: f64 = 9.0;
/// Velocity uncertainty on a fresh track
const INITIAL_VELOCITY_VARIANCE: f64 = 1000.0;

impl KalmanFilter {
    pub fn new() -> Self {
        let dt: f64 = 1.0 / DEFAULT_FPS;

        #[rustfmt::skip]
        let transition = Matrix4::new(
            1.0, 0.0, dt, 0.0,
            0.0, 1.0, 0.0, dt,
            0.0, 0.0, 1.0, 0.0,
            0.0, 0.0, 0.0, 1.0,
        );

        #[rustfmt::skip]
        let measurement = Matrix2x4::new(
            1.0, 0.0, 0.0, 0.0,
            0.0, 1.0, 0.0, 0.0,
        );

        let q = PROCESS_NOISE;
        #[rustfmt::skip]
        let process_noise = Matrix4::new(
            q * dt.powi(4) / 4.0, 0.0, q * dt.powi(3) / 2.0, 0.0,
            0.0, q * dt.powi(4) / 4.0, 0.0, q * dt.powi(3) / 2.0,
            q * dt.powi(3) / 2.0, 0.0, q * dt.powi(2), 0.0,
            0.0, q * dt.powi(3) / 2.0, 0.0, q * dt.powi(2),
        );

        Self {
            state: Vector4::zeros(),
            covariance: Matrix4::identity(),
            process_noise,
            measurement_noise: Matrix2::identity() * MEASUREMENT_NOISE,
            transition,
            measurement,
            initialized: false,
        }
    }

    fn initialize(&mut self, position: Vector2<f64>) {
        self.state = Vector4::new(position.x, position.y, 0.0, 0.0);
        self.covariance = Matrix4::from_diagonal(&Vector4::new(
            MEASUREMENT_NOISE,
            MEASUREMENT_NOISE,
            INITIAL_VELOCITY_VARIANCE,
            INITIAL_VELOCITY_VARIANCE,
        ));
        self.initialized = true;
    }

    fn predict(&mut self) {
        self.state = self.transition * self.state;
        self.covariance = self.transition * self.covariance * self.transition.transpose() + self.process_noise;
    }

    fn update(&mut self, position: Vector2<f64>) {
        let innovation = position - self.measurement * self.state;
        let innovation_cov = self.measurement * self.covariance * self.measurement.transpose() + self.measurement_noise;

        // Keep the prediction if the innovation covariance collapsed
        let Some(inverse) = innovation_cov.try_inverse() else {
            return;
        };
        let gain = self.covariance * self.measurement.transpose() * inverse;

        self.state += gain * innovation;
        self.covariance = (Matrix4::identity() - gain * self.measurement) * self.covariance;
    }
}

impl Default for KalmanFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl PositionFilter for KalmanFilter {
    fn apply(&mut self, x: f64, y: f64) -> (f64, f64) {
        let position = Vector2::new(x, y);
        if self.initialized {
            self.predict();
            self.update(position);
        } else {
            self.initialize(position);
        }
        (self.state[0], self.state[1])
    }

    fn reset(&mut self) {
        self.state = Vector4::zeros();
        self.covariance = Matrix4::identity();
        self.initialized = false;
    }

    fn name(&self) -> &str {
        "KalmanFilter"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_position_passes_through() {
        let mut filter = KalmanFilter::new();
        assert_eq!(filter.apply(320.0, 240.0), (320.0, 240.0));
    }

    #[test]
    fn test_step_is_smoothed() {
        let mut filter = KalmanFilter::new();
        filter.apply(100.0, 100.0);
        let (x, y) = filter.apply(110.0, 90.0);
        assert!(x > 100.0 && x < 110.0);
        assert!(y < 100.0 && y > 90.0);
    }

    #[test]
    fn test_converges_on_still_target() {
        let mut filter = KalmanFilter::new();
        filter.apply(0.0, 0.0);
        let mut out = (0.0, 0.0);
        for _ in 0..200 {
            out = filter.apply(50.0, -20.0);
        }
        assert!((out.0 - 50.0).abs() < 0.5);
        assert!((out.1 + 20.0).abs() < 0.5);
    }

    #[test]
    fn test_reset_reinitializes() {
        let mut filter = KalmanFilter::new();
        filter.apply(0.0, 0.0);
        filter.apply(10.0, 10.0);
        filter.reset();
        assert_eq!(filter.apply(500.0, 400.0), (500.0, 400.0));
    }
}
