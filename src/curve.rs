// ==============================================================================
// curve.rs — PIECEWISE-LINEAR TUNING CURVES
// ------------------------------------------------------------------------------
// Used for the speed-sensitive steering curve (mph -> steer factor) and the
// engine power curve (rpm fraction -> torque fraction).
//
// Points are (x, y) pairs sorted by x. Inputs left of the first point return
// the first y, inputs right of the last point return the last y.
// ==============================================================================

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LinearCurve {
    points: Vec<(f32, f32)>,
}

impl LinearCurve {
    /// A mapping of `(x, y)` pairs that make up the continuous piecewise function.
    #[must_use]
    pub fn new(points: Vec<(f32, f32)>) -> Self {
        Self { points }
    }

    /// Returns the output of the curve. An empty curve is flat at 1.
    #[must_use]
    pub fn get_output(&self, input: f32) -> f32 {
        let Some(&(first_x, first_y)) = self.points.first() else {
            return 1.0;
        };
        if input <= first_x {
            return first_y;
        }

        let Some(idx) = self.points.iter().position(|&(x, _)| x > input) else {
            return self.points[self.points.len() - 1].1;
        };

        let (base_x, base_y) = self.points[idx - 1];
        let (max_x, max_y) = self.points[idx];
        let x_diff = max_x - base_x;
        if x_diff <= f32::EPSILON {
            return max_y;
        }

        let interp_frac = (input - base_x) / x_diff;
        (max_y - base_y) * interp_frac + base_y
    }

    /// x of the highest point (first one on ties).
    #[must_use]
    pub fn peak_x(&self) -> f32 {
        self.points
            .iter()
            .fold(None::<(f32, f32)>, |best, &p| match best {
                Some(b) if b.1 >= p.1 => Some(b),
                _ => Some(p),
            })
            .map_or(0.0, |(x, _)| x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interpolates_between_points() {
        let curve = LinearCurve::new(vec![(0.0, 0.0), (1.0, 10.0), (2.0, 0.0)]);
        assert!((curve.get_output(0.5) - 5.0).abs() < 1e-5);
        assert!((curve.get_output(1.5) - 5.0).abs() < 1e-5);
    }

    #[test]
    fn clamps_outside_range() {
        let curve = LinearCurve::new(vec![(10.0, 2.0), (20.0, 4.0)]);
        assert_eq!(curve.get_output(-5.0), 2.0);
        assert_eq!(curve.get_output(100.0), 4.0);
    }

    #[test]
    fn peak_is_highest_point() {
        let curve = LinearCurve::new(vec![(0.0, 0.4), (0.7, 1.0), (1.0, 0.8)]);
        assert_eq!(curve.peak_x(), 0.7);
    }

    #[test]
    fn empty_curve_is_flat() {
        let curve = LinearCurve::new(Vec::new());
        assert_eq!(curve.get_output(3.0), 1.0);
        assert_eq!(curve.peak_x(), 0.0);
    }
}
