//! Shared fixtures for the integration tests.
#![allow(dead_code)]

use std::path::PathBuf;

use ndarray::Array2;

use evoked::{Baseline, EpochConfig, EventId, Raw};

/// Unique temp path per test binary invocation.
pub fn tmp_path(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("evoked-test-{}-{name}", std::process::id()))
}

/// A recording where feature `f` reads `(f + 1) * t` at time `t`, so
/// any linear interpolation result is predictable in closed form.
pub fn ramp_raw(n_features: usize, n_times: usize, tr: f64) -> Raw {
    let data = Array2::from_shape_fn((n_features, n_times), |(f, t)| {
        (f + 1) as f64 * t as f64 * tr
    });
    Raw::from_array(data, tr)
}

/// Event rows from `(onset, duration, label)` triples.
pub fn event_rows(rows: &[(f64, f64, i64)]) -> Array2<f64> {
    let mut out = Array2::zeros((rows.len(), 3));
    for (k, &(onset, dur, label)) in rows.iter().enumerate() {
        out[[k, 0]] = onset;
        out[[k, 1]] = dur;
        out[[k, 2]] = label as f64;
    }
    out
}

/// Extraction config with no baseline correction, so raw interpolated
/// values survive into the tensor.
pub fn no_baseline_cfg(tmin: f64, tmax: f64, dt: f64) -> EpochConfig {
    EpochConfig {
        tmin,
        tmax,
        dt,
        baseline: Baseline::None,
        ..EpochConfig::default()
    }
}

/// The two-condition dictionary used across the end-to-end tests.
pub fn cond_xy() -> EventId {
    EventId::from_pairs([("Cond/X", 1), ("Cond/Y", 2)])
}
