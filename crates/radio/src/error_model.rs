//! Distance-based link error models

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::RadioError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorModelKind {
    Constant,
    PerCurve,
    Stochastic,
}

/// Packet error probability as a function of sender/receiver distance.
pub trait RangeErrorModel {
    fn error_rate(&self, distance: f64) -> f64;

    /// Range implied by the model itself, overriding the channel's.
    fn max_range(&self) -> Option<f64> {
        None
    }

    fn kind(&self) -> ErrorModelKind;

    /// One uniform draw against [`Self::error_rate`].
    fn packet_in_error(&self, distance: f64, rng: &mut dyn rand::RngCore) -> bool {
        rng.random::<f64>() < self.error_rate(distance)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConstantErrorModel {
    rate: f64,
}

impl ConstantErrorModel {
    pub fn new(rate: f64) -> Result<Self, RadioError> {
        if !(0.0..=1.0).contains(&rate) {
            return Err(RadioError::InvalidConfig(format!(
                "constant error rate {rate} outside [0, 1]"
            )));
        }
        Ok(Self { rate })
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }
}

impl RangeErrorModel for ConstantErrorModel {
    fn error_rate(&self, _distance: f64) -> f64 {
        self.rate
    }

    fn kind(&self) -> ErrorModelKind {
        ErrorModelKind::Constant
    }
}

/// Piecewise-linear packet error curve over distance.
#[derive(Debug, Clone, PartialEq)]
pub struct PerCurve {
    /// Sorted by distance, unique distances.
    points: Vec<(f64, f64)>,
}

impl PerCurve {
    /// Builds the curve from (distance, probability) points in any order.
    /// When a distance repeats, the first point given wins.
    pub fn new(points: impl IntoIterator<Item = (f64, f64)>) -> Result<Self, RadioError> {
        let mut curve = Self { points: Vec::new() };
        for (distance, probability) in points {
            curve.add_point(distance, probability)?;
        }
        if curve.points.is_empty() {
            return Err(RadioError::InvalidConfig("per-curve model has no points".into()));
        }
        Ok(curve)
    }

    pub fn add_point(&mut self, distance: f64, probability: f64) -> Result<(), RadioError> {
        if !distance.is_finite() || distance < 0.0 {
            return Err(RadioError::InvalidConfig(format!("invalid curve distance {distance}")));
        }
        if !(0.0..=1.0).contains(&probability) {
            return Err(RadioError::InvalidConfig(format!(
                "curve probability {probability} outside [0, 1]"
            )));
        }
        let idx = self.points.partition_point(|(d, _)| *d < distance);
        if self.points.get(idx).map(|(d, _)| *d == distance).unwrap_or(false) {
            return Ok(());
        }
        self.points.insert(idx, (distance, probability));
        Ok(())
    }

    pub fn points(&self) -> &[(f64, f64)] {
        &self.points
    }
}

impl RangeErrorModel for PerCurve {
    fn error_rate(&self, distance: f64) -> f64 {
        let idx = self.points.partition_point(|(d, _)| *d < distance);
        let Some(&(upper_d, upper_p)) = self.points.get(idx) else {
            // beyond the last point
            return 1.0;
        };
        if upper_d == distance {
            return upper_p;
        }
        if idx == 0 {
            // closer than the first point
            return upper_p;
        }
        let (lower_d, lower_p) = self.points[idx - 1];
        lower_p + ((distance - lower_d) / (upper_d - lower_d)) * (upper_p - lower_p)
    }

    fn max_range(&self) -> Option<f64> {
        self.points.last().map(|(d, _)| *d)
    }

    fn kind(&self) -> ErrorModelKind {
        ErrorModelKind::PerCurve
    }
}
