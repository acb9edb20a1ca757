//! Optional smoothing of tracked face positions.
//!
//! Positions are forwarded raw by default. A filter sits between the face
//! tracker and the position mapper and trades latency for less jitter.

/// Kalman filter with a constant-velocity model
pub mod kalman;

/// Moving average filter for simple smoothing
pub mod moving_average;

/// Exponential filter for responsive smoothing
pub mod exponential;

use crate::{Error, Result};

/// Trait for all position filters
pub trait PositionFilter: Send {
    /// Filter one pixel position
    fn apply(&mut self, x: f64, y: f64) -> (f64, f64);

    /// Forget all history, e.g. after the track was lost
    fn reset(&mut self);

    /// Get filter name
    fn name(&self) -> &str;
}

/// Passes positions through unchanged
pub struct NoFilter;

impl PositionFilter for NoFilter {
    fn apply(&mut self, x: f64, y: f64) -> (f64, f64) {
        (x, y)
    }

    fn reset(&mut self) {}

    fn name(&self) -> &str {
        "NoFilter"
    }
}

fn parse_param<T: std::str::FromStr>(spec: &str, raw: Option<&str>, default: T) -> Result<T> {
    match raw {
        None => Ok(default),
        Some(raw) => raw
            .parse()
            .map_err(|_| Error::FilterError(format!("Invalid parameter '{raw}' in filter '{spec}'"))),
    }
}

/// Create a position filter from `name[:param]`.
///
/// # Errors
///
/// Returns `FilterError` for unknown names or out-of-range parameters.
pub fn create_filter(spec: &str) -> Result<Box<dyn PositionFilter>> {
    let lowered = spec.to_lowercase();
    let mut parts = lowered.splitn(2, ':');
    let name = parts.next().unwrap_or_default();
    let param = parts.next();

    match name {
        "none" | "nofilter" => Ok(Box::new(NoFilter)),
        "kalman" => Ok(Box::new(kalman::KalmanFilter::new())),
        "moving_average" | "movingaverage" => {
            let window = parse_param(spec, param, 5usize)?;
            if window == 0 {
                return Err(Error::FilterError("Window size must be greater than 0".to_string()));
            }
            Ok(Box::new(moving_average::MovingAverageFilter::new(window)))
        }
        "exponential" => {
            let alpha = parse_param(spec, param, 0.5f64)?;
            if !(alpha > 0.0 && alpha <= 1.0) {
                return Err(Error::FilterError(format!("Alpha must be in (0, 1], got {alpha}")));
            }
            Ok(Box::new(exponential::ExponentialFilter::new(alpha)))
        }
        _ => Err(Error::FilterError(format!("Unknown filter type: {spec}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_filter() {
        let mut filter = NoFilter;
        assert_eq!(filter.apply(10.0, 20.0), (10.0, 20.0));
    }

    #[test]
    fn test_create_filter() {
        assert_eq!(create_filter("none").unwrap().name(), "NoFilter");
        assert_eq!(create_filter("Kalman").unwrap().name(), "KalmanFilter");
        assert_eq!(create_filter("moving_average:3").unwrap().name(), "MovingAverageFilter");
        assert_eq!(create_filter("exponential:0.2").unwrap().name(), "ExponentialFilter");
    }

    #[test]
    fn test_create_filter_rejects_bad_specs() {
        for spec in ["unknown", "moving_average:0", "moving_average:abc", "exponential:0", "exponential:1.5"] {
            assert!(
                matches!(create_filter(spec), Err(Error::FilterError(_))),
                "expected error for {spec}"
            );
        }
    }
}
