//! One-dimensional interpolation over a recording's native time grid.
//!
//! One [`Interp1d`] is built per recording and sampled once per event,
//! so the cubic second-derivative solve is amortized over all events.
//! Queries outside the covered time range yield NaN, never extrapolation.
use ndarray::{Array2, ArrayViewMut1};

use crate::config::Interp;

/// Interpolant over `[features, times]` data on a strictly increasing
/// time vector.
pub struct Interp1d {
    x: Vec<f64>,
    y: Array2<f64>,
    kind: Interp,
    /// Second derivatives for the natural cubic spline, `[features, times]`.
    d2: Option<Array2<f64>>,
}

impl Interp1d {
    /// # Panics
    ///
    /// Panics if `x.len() != y.ncols()` or `x` is shorter than 2 samples;
    /// both are internal invariants of `Raw`.
    pub fn new(x: Vec<f64>, y: Array2<f64>, kind: Interp) -> Self {
        assert_eq!(x.len(), y.ncols(), "time vector / data mismatch");
        assert!(x.len() >= 2, "interpolation needs at least two samples");
        let d2 = matches!(kind, Interp::Cubic).then(|| natural_spline_d2(&x, &y));
        Self { x, y, kind, d2 }
    }

    pub fn n_features(&self) -> usize {
        self.y.nrows()
    }

    /// Sample every feature at time `t` into `out` (length `n_features`).
    pub fn sample_into(&self, t: f64, out: &mut ArrayViewMut1<f64>) {
        let n = self.x.len();
        if t.is_nan() || t < self.x[0] || t > self.x[n - 1] {
            out.fill(f64::NAN);
            return;
        }
        // Interval i with x[i] <= t <= x[i+1].
        let i = match self.x.binary_search_by(|v| v.partial_cmp(&t).unwrap()) {
            Ok(k) => k.min(n - 2),
            Err(k) => k - 1,
        };
        match self.kind {
            Interp::Nearest => {
                let k = if t - self.x[i] <= self.x[i + 1] - t { i } else { i + 1 };
                for (o, &v) in out.iter_mut().zip(self.y.column(k)) {
                    *o = v;
                }
            }
            Interp::Linear => {
                let w = (t - self.x[i]) / (self.x[i + 1] - self.x[i]);
                for ((o, &y0), &y1) in out
                    .iter_mut()
                    .zip(self.y.column(i))
                    .zip(self.y.column(i + 1))
                {
                    *o = y0 + w * (y1 - y0);
                }
            }
            Interp::Cubic => {
                let d2 = self.d2.as_ref().expect("cubic coefficients");
                let h = self.x[i + 1] - self.x[i];
                let a = (self.x[i + 1] - t) / h;
                let b = (t - self.x[i]) / h;
                let ca = (a * a * a - a) * h * h / 6.0;
                let cb = (b * b * b - b) * h * h / 6.0;
                for f in 0..self.y.nrows() {
                    out[f] = a * self.y[[f, i]]
                        + b * self.y[[f, i + 1]]
                        + ca * d2[[f, i]]
                        + cb * d2[[f, i + 1]];
                }
            }
        }
    }
}

/// Second derivatives of the natural cubic spline per feature row
/// (tridiagonal solve, zero curvature at both ends).
fn natural_spline_d2(x: &[f64], y: &Array2<f64>) -> Array2<f64> {
    let n = x.len();
    let mut d2 = Array2::<f64>::zeros(y.raw_dim());
    let mut u = vec![0.0; n];
    for f in 0..y.nrows() {
        u.iter_mut().for_each(|v| *v = 0.0);
        for i in 1..n - 1 {
            let sig = (x[i] - x[i - 1]) / (x[i + 1] - x[i - 1]);
            let p = sig * d2[[f, i - 1]] + 2.0;
            d2[[f, i]] = (sig - 1.0) / p;
            let dy1 = (y[[f, i + 1]] - y[[f, i]]) / (x[i + 1] - x[i]);
            let dy0 = (y[[f, i]] - y[[f, i - 1]]) / (x[i] - x[i - 1]);
            u[i] = (6.0 * (dy1 - dy0) / (x[i + 1] - x[i - 1]) - sig * u[i - 1]) / p;
        }
        d2[[f, n - 1]] = 0.0;
        for i in (0..n - 1).rev() {
            d2[[f, i]] = d2[[f, i]] * d2[[f, i + 1]] + u[i];
        }
    }
    d2
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array1, Array2};

    fn ramp(n: usize) -> (Vec<f64>, Array2<f64>) {
        let x: Vec<f64> = (0..n).map(|i| i as f64).collect();
        let y = Array2::from_shape_fn((1, n), |(_, t)| 2.0 * t as f64 + 1.0);
        (x, y)
    }

    #[test]
    fn linear_hits_samples_and_midpoints() {
        let (x, y) = ramp(8);
        let f = Interp1d::new(x, y, Interp::Linear);
        let mut out = Array1::zeros(1);
        f.sample_into(3.0, &mut out.view_mut());
        approx::assert_abs_diff_eq!(out[0], 7.0, epsilon = 1e-12);
        f.sample_into(3.5, &mut out.view_mut());
        approx::assert_abs_diff_eq!(out[0], 8.0, epsilon = 1e-12);
    }

    #[test]
    fn out_of_range_is_nan() {
        let (x, y) = ramp(4);
        let f = Interp1d::new(x, y, Interp::Linear);
        let mut out = Array1::zeros(1);
        f.sample_into(-0.1, &mut out.view_mut());
        assert!(out[0].is_nan());
        f.sample_into(3.1, &mut out.view_mut());
        assert!(out[0].is_nan());
        // Boundary samples are covered.
        f.sample_into(3.0, &mut out.view_mut());
        assert!(!out[0].is_nan());
    }

    #[test]
    fn nearest_picks_closer_sample() {
        let (x, y) = ramp(4);
        let f = Interp1d::new(x, y, Interp::Nearest);
        let mut out = Array1::zeros(1);
        f.sample_into(1.4, &mut out.view_mut());
        approx::assert_abs_diff_eq!(out[0], 3.0, epsilon = 1e-12);
        f.sample_into(1.6, &mut out.view_mut());
        approx::assert_abs_diff_eq!(out[0], 5.0, epsilon = 1e-12);
    }

    #[test]
    fn cubic_reproduces_line_exactly() {
        // A straight line has zero curvature, so the natural spline is exact.
        let (x, y) = ramp(16);
        let f = Interp1d::new(x, y, Interp::Cubic);
        let mut out = Array1::zeros(1);
        for &t in &[0.0, 0.25, 7.5, 14.9, 15.0] {
            f.sample_into(t, &mut out.view_mut());
            approx::assert_abs_diff_eq!(out[0], 2.0 * t + 1.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn cubic_interpolates_smooth_signal() {
        let n = 64;
        let x: Vec<f64> = (0..n).map(|i| i as f64 * 0.25).collect();
        let y = Array2::from_shape_fn((1, n), |(_, t)| (x[t]).sin());
        let f = Interp1d::new(x, y, Interp::Cubic);
        let mut out = Array1::zeros(1);
        f.sample_into(5.0, &mut out.view_mut());
        approx::assert_abs_diff_eq!(out[0], 5.0_f64.sin(), epsilon = 1e-4);
    }
}
