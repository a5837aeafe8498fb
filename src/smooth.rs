//! Temporal smoothing with a normalized Hamming FIR kernel.
//!
//! The kernel is applied zero-phase by overlap-add FFT convolution with
//! the output shifted left by `(N-1)/2` samples; the edge transient is
//! suppressed by reflect-limited padding of `N-1` samples on each side.
//! Smoothing runs once over the whole recording before epoch extraction,
//! so the cost is amortized over all events.
use ndarray::Array2;
use rustfft::{num_complex::Complex, FftPlanner};

use crate::error::{Error, Result};
use std::f64::consts::PI;

/// Normalized Hamming smoothing kernel of odd length `n` (unit sum, so
/// DC gain is 1 and a constant signal passes through unchanged).
pub fn hamming_kernel(n: usize) -> Result<Vec<f64>> {
    if n < 3 || n % 2 == 0 {
        return Err(Error::ShapeInvariantViolation(format!(
            "smoothing kernel length must be odd and >= 3, got {n}"
        )));
    }
    let mut h: Vec<f64> = (0..n)
        .map(|i| 0.54 - 0.46 * (2.0 * PI * i as f64 / (n - 1) as f64).cos())
        .collect();
    let s: f64 = h.iter().sum();
    h.iter_mut().for_each(|v| *v /= s);
    Ok(h)
}

/// Smooth every row of `data` ([features, times]) in place with the
/// odd-length kernel `h`.
pub fn smooth_rows(data: &mut Array2<f64>, h: &[f64]) -> Result<()> {
    for mut row in data.rows_mut() {
        let x: Vec<f64> = row.iter().copied().collect();
        let y = smooth_1d(&x, h)?;
        for (r, v) in row.iter_mut().zip(y) {
            *r = v;
        }
    }
    Ok(())
}

/// Zero-phase FIR smoothing of a single signal. Returns a vector of the
/// same length as `x`.
pub fn smooth_1d(x: &[f64], h: &[f64]) -> Result<Vec<f64>> {
    let n_x = x.len();
    let n_h = h.len();
    if n_x == 0 {
        return Ok(vec![]);
    }
    if n_h % 2 == 0 {
        return Err(Error::ShapeInvariantViolation(format!(
            "smoothing kernel length must be odd, got {n_h}"
        )));
    }

    // Shift for zero-phase: (N-1)/2.
    let shift = (n_h - 1) / 2;
    let n_edge = n_h - 1;

    let x_ext = reflect_limited_pad(x, n_edge, n_edge);
    let n_ext = x_ext.len();

    let n_fft = choose_fft_len(n_h, n_ext);
    let h_fft = fft_of_kernel(h, n_fft);

    let n_seg = n_fft - n_h + 1;
    let n_segments = n_ext.div_ceil(n_seg);
    let mut smoothed = vec![0.0_f64; n_ext];

    let mut planner: FftPlanner<f64> = FftPlanner::new();
    let fft_fwd = planner.plan_fft_forward(n_fft);
    let fft_inv = planner.plan_fft_inverse(n_fft);
    let inv_scale = 1.0 / n_fft as f64;

    for seg_idx in 0..n_segments {
        let start = seg_idx * n_seg;
        let stop = (start + n_seg).min(n_ext);

        let mut buf: Vec<Complex<f64>> = x_ext[start..stop]
            .iter()
            .map(|&v| Complex { re: v, im: 0.0 })
            .chain(std::iter::repeat(Complex::default()))
            .take(n_fft)
            .collect();

        fft_fwd.process(&mut buf);
        for (b, &hf) in buf.iter_mut().zip(h_fft.iter()) {
            *b *= hf;
        }
        fft_inv.process(&mut buf);

        // Overlap-add, compensating the zero-phase shift.
        let out_start = start.saturating_sub(shift);
        let out_end = (out_start + n_fft).min(n_ext);
        let prod_start = if start < shift { shift - start } else { 0 };
        for (o, p) in (out_start..out_end).zip(prod_start..) {
            if p < buf.len() {
                smoothed[o] += buf[p].re * inv_scale;
            }
        }
    }

    Ok(smoothed[n_edge..n_edge + n_x].to_vec())
}

/// Reflect-limited padding: odd reflection around the edge samples,
/// zero-filled when the requested padding exceeds the signal.
fn reflect_limited_pad(x: &[f64], n_l: usize, n_r: usize) -> Vec<f64> {
    let n = x.len();
    let actual_l = n_l.min(n - 1);
    let actual_r = n_r.min(n - 1);

    let mut out = Vec::with_capacity(n_l + n + n_r);
    for _ in actual_l..n_l {
        out.push(0.0);
    }
    for i in (1..=actual_l).rev() {
        out.push(2.0 * x[0] - x[i]);
    }
    out.extend_from_slice(x);
    let last = x[n - 1];
    for i in 1..=actual_r {
        let idx = (n - 1).saturating_sub(i);
        out.push(2.0 * last - x[idx]);
    }
    for _ in actual_r..n_r {
        out.push(0.0);
    }
    out
}

/// Power-of-2 FFT block size minimizing the overlap-add operation count.
fn choose_fft_len(n_h: usize, n_x: usize) -> usize {
    let min_fft = 2 * n_h - 1;
    let max_pow = (n_x as f64).log2().ceil() as u32 + 1;
    let min_pow = (min_fft as f64).log2().ceil() as u32;

    let mut best_n = 1_usize << max_pow;
    let mut best_cost = f64::INFINITY;
    for pow in min_pow..=max_pow {
        let n = 1_usize << pow;
        if n < min_fft {
            continue;
        }
        let n_seg = (n - n_h + 1) as f64;
        let cost = (n_x as f64 / n_seg).ceil() * n as f64 * (pow as f64 + 1.0)
            + 4e-5 * n as f64 * n_x as f64;
        if cost < best_cost {
            best_cost = cost;
            best_n = n;
        }
    }
    best_n
}

fn fft_of_kernel(h: &[f64], n_fft: usize) -> Vec<Complex<f64>> {
    let mut buf: Vec<Complex<f64>> = h
        .iter()
        .map(|&v| Complex { re: v, im: 0.0 })
        .chain(std::iter::repeat(Complex::default()))
        .take(n_fft)
        .collect();
    let mut planner: FftPlanner<f64> = FftPlanner::new();
    planner.plan_fft_forward(n_fft).process(&mut buf);
    buf
}
