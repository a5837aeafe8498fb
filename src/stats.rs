//! NaN-aware reductions and percentiles.
//!
//! NaN marks relative-time samples that fell outside a recording's
//! coverage. Every reduction here treats NaN as missing; a lane that is
//! all-NaN reduces to NaN (sum: 0), matching numpy's `nan*` family.
use ndarray::{ArrayD, ArrayViewD, Axis, IxDyn};

use crate::config::Reduction;

/// Reduce one lane of values, ignoring NaN.
pub fn reduce_lane(values: impl Iterator<Item = f64>, reduction: Reduction) -> f64 {
    let mut kept: Vec<f64> = values.filter(|v| !v.is_nan()).collect();
    match reduction {
        Reduction::Sum => kept.iter().sum(),
        Reduction::Mean => {
            if kept.is_empty() {
                f64::NAN
            } else {
                kept.iter().sum::<f64>() / kept.len() as f64
            }
        }
        Reduction::Median => {
            if kept.is_empty() {
                return f64::NAN;
            }
            kept.sort_by(|a, b| a.partial_cmp(b).unwrap());
            let n = kept.len();
            if n % 2 == 1 {
                kept[n / 2]
            } else {
                0.5 * (kept[n / 2 - 1] + kept[n / 2])
            }
        }
    }
}

/// Reduce `x` along `axis`, dropping that axis.
pub fn reduce_axis(x: &ArrayViewD<f64>, axis: usize, reduction: Reduction) -> ArrayD<f64> {
    x.map_axis(Axis(axis), |lane| reduce_lane(lane.iter().copied(), reduction))
}

/// Percentile with linear interpolation between closest ranks (numpy's
/// default). `q` is in percent. NaN values are dropped first; an empty
/// lane yields NaN.
pub fn percentile(values: &[f64], q: f64) -> f64 {
    let mut kept: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
    if kept.is_empty() {
        return f64::NAN;
    }
    kept.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let rank = q / 100.0 * (kept.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    kept[lo] + (kept[hi] - kept[lo]) * (rank - lo as f64)
}

/// Percentiles of `x` along axis 0, one output layer per entry of `qs`.
/// Output shape: `[qs.len(), x.shape()[1..]]`.
pub fn percentiles_axis0(x: &ArrayViewD<f64>, qs: &[f64]) -> ArrayD<f64> {
    let rest: Vec<usize> = x.shape()[1..].to_vec();
    let rest_len: usize = rest.iter().product();
    let mut buf = vec![0.0; qs.len() * rest_len];
    for (j, lane) in x.lanes(Axis(0)).into_iter().enumerate() {
        let col: Vec<f64> = lane.iter().copied().collect();
        for (qi, &q) in qs.iter().enumerate() {
            buf[qi * rest_len + j] = percentile(&col, q);
        }
    }
    let mut shape = vec![qs.len()];
    shape.extend_from_slice(&rest);
    ArrayD::from_shape_vec(IxDyn(&shape), buf).expect("percentile shape")
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn mean_ignores_nan() {
        let v = reduce_lane([1.0, f64::NAN, 3.0].into_iter(), Reduction::Mean);
        approx::assert_abs_diff_eq!(v, 2.0, epsilon = 1e-12);
    }

    #[test]
    fn all_nan_lane_is_nan() {
        assert!(reduce_lane([f64::NAN; 3].into_iter(), Reduction::Mean).is_nan());
        assert!(reduce_lane([f64::NAN; 3].into_iter(), Reduction::Median).is_nan());
        assert_eq!(reduce_lane([f64::NAN; 3].into_iter(), Reduction::Sum), 0.0);
    }

    #[test]
    fn median_even_and_odd() {
        let odd = reduce_lane([3.0, 1.0, 2.0].into_iter(), Reduction::Median);
        approx::assert_abs_diff_eq!(odd, 2.0, epsilon = 1e-12);
        let even = reduce_lane([4.0, 1.0, 2.0, 3.0].into_iter(), Reduction::Median);
        approx::assert_abs_diff_eq!(even, 2.5, epsilon = 1e-12);
    }

    #[test]
    fn reduce_axis_drops_axis() {
        let x = array![[1.0, 2.0], [3.0, 4.0]].into_dyn();
        let m = reduce_axis(&x.view(), 1, Reduction::Mean);
        assert_eq!(m.shape(), &[2]);
        approx::assert_abs_diff_eq!(m[[0]], 1.5, epsilon = 1e-12);
        approx::assert_abs_diff_eq!(m[[1]], 3.5, epsilon = 1e-12);
    }

    #[test]
    fn percentile_linear_interpolation() {
        let v = [1.0, 2.0, 3.0, 4.0];
        approx::assert_abs_diff_eq!(percentile(&v, 0.0), 1.0, epsilon = 1e-12);
        approx::assert_abs_diff_eq!(percentile(&v, 100.0), 4.0, epsilon = 1e-12);
        approx::assert_abs_diff_eq!(percentile(&v, 50.0), 2.5, epsilon = 1e-12);
        approx::assert_abs_diff_eq!(percentile(&v, 25.0), 1.75, epsilon = 1e-12);
    }

    #[test]
    fn percentiles_axis0_shape_and_order() {
        // 3 samples x 2 columns.
        let x = array![[1.0, 10.0], [2.0, 20.0], [3.0, 30.0]].into_dyn();
        let p = percentiles_axis0(&x.view(), &[0.0, 100.0]);
        assert_eq!(p.shape(), &[2, 2]);
        approx::assert_abs_diff_eq!(p[[0, 0]], 1.0, epsilon = 1e-12);
        approx::assert_abs_diff_eq!(p[[0, 1]], 10.0, epsilon = 1e-12);
        approx::assert_abs_diff_eq!(p[[1, 0]], 3.0, epsilon = 1e-12);
        approx::assert_abs_diff_eq!(p[[1, 1]], 30.0, epsilon = 1e-12);
    }
}
