//! Piecewise-linear lookup tables
//!
//! Engine curves (throttle → RPM, RPM → power, RPM → torque, RPM → fuel flow)
//! are sparse sample tables. An [`Interpolator`] validates its samples at
//! construction and evaluates them with linear interpolation, clamping to the
//! first/last sample outside the table range. Tables with strictly monotonic
//! samples can also be inverted once at load and then read backwards.

use log::warn;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum InterpolatorError {
    #[error("interpolator needs at least 2 points, got {0}")]
    TooFewPoints(usize),
    #[error("x values must be strictly increasing (index {0})")]
    NotIncreasing(usize),
    #[error("x and y have different lengths ({0} vs {1})")]
    LengthMismatch(usize, usize),
    #[error("y values must be strictly monotonic to invert (index {0})")]
    NotInvertible(usize),
}

/// A validated piecewise-linear function `y = f(x)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<(f32, f32)>", into = "Vec<(f32, f32)>")]
pub struct Interpolator {
    x: Vec<f32>,
    y: Vec<f32>,
}

impl TryFrom<Vec<(f32, f32)>> for Interpolator {
    type Error = InterpolatorError;

    fn try_from(points: Vec<(f32, f32)>) -> Result<Self, Self::Error> {
        Self::from_points(&points)
    }
}

impl From<Interpolator> for Vec<(f32, f32)> {
    fn from(table: Interpolator) -> Self {
        table.x.into_iter().zip(table.y).collect()
    }
}

impl Interpolator {
    pub fn new(x: Vec<f32>, y: Vec<f32>) -> Result<Self, InterpolatorError> {
        if x.len() != y.len() {
            return Err(InterpolatorError::LengthMismatch(x.len(), y.len()));
        }
        if x.len() < 2 {
            return Err(InterpolatorError::TooFewPoints(x.len()));
        }
        if let Some(i) = x.windows(2).position(|w| w[1] <= w[0]) {
            return Err(InterpolatorError::NotIncreasing(i + 1));
        }
        Ok(Self { x, y })
    }

    pub fn from_points(points: &[(f32, f32)]) -> Result<Self, InterpolatorError> {
        let (x, y) = points.iter().copied().unzip();
        Self::new(x, y)
    }

    /// Straight line through two points, used as a configuration fallback
    pub fn linear(x0: f32, y0: f32, x1: f32, y1: f32) -> Self {
        if x1 > x0 {
            Self {
                x: vec![x0, x1],
                y: vec![y0, y1],
            }
        } else {
            Self {
                x: vec![x0, x0 + 1.0],
                y: vec![y0, y0],
            }
        }
    }

    /// Parses a table, logging and substituting `fallback` when it is invalid
    pub fn or_warn(
        name: &str,
        points: Option<&[(f32, f32)]>,
        fallback: impl FnOnce() -> Interpolator,
    ) -> Self {
        match points {
            None => fallback(),
            Some(points) => match Self::from_points(points) {
                Ok(table) => table,
                Err(e) => {
                    warn!("Table {}: {}, using default", name, e);
                    fallback()
                }
            },
        }
    }

    /// Swaps the axes, giving `x = f⁻¹(y)`
    ///
    /// The samples must be strictly increasing or strictly decreasing in y.
    pub fn inverse(&self) -> Result<Self, InterpolatorError> {
        let increasing = self.y[1] > self.y[0];
        if let Some(i) = self
            .y
            .windows(2)
            .position(|w| w[1] == w[0] || (w[1] > w[0]) != increasing)
        {
            return Err(InterpolatorError::NotInvertible(i + 1));
        }
        let mut x = self.y.clone();
        let mut y = self.x.clone();
        if !increasing {
            x.reverse();
            y.reverse();
        }
        Self::new(x, y)
    }

    /// Evaluates the table at `x`
    pub fn get(&self, x: f32) -> f32 {
        let last = self.x.len() - 1;
        if x <= self.x[0] {
            return self.y[0];
        }
        if x >= self.x[last] {
            return self.y[last];
        }
        // partition_point gives the first sample strictly greater than x
        let hi = self.x.partition_point(|&sample| sample <= x);
        let lo = hi - 1;
        let t = (x - self.x[lo]) / (self.x[hi] - self.x[lo]);
        self.y[lo] + t * (self.y[hi] - self.y[lo])
    }
}
