//! Aggregation, averaging, error bands, and the summary table.
mod common;

use approx::assert_abs_diff_eq;
use ndarray::Array3;

use evoked::{
    AggregateAxes, AverageConfig, Baseline, EpochConfig, Epochs, Error, ErrorEnvelope,
    ErrorModel, EventId, Reduction,
};

use common::{event_rows, no_baseline_cfg, ramp_raw};

/// 4 events x 2 features x 3 samples with hand-computable values:
/// `data[e, f, t] = e + 10 f + 100 t`.
fn small_epochs() -> Epochs {
    let data = Array3::from_shape_fn((4, 2, 3), |(e, f, t)| {
        e as f64 + 10.0 * f as f64 + 100.0 * t as f64
    });
    Epochs::from_array(data, None, 0.0, Baseline::None, None, None, None).unwrap()
}

#[test]
fn aggregate_reduces_requested_axes() {
    let epochs = small_epochs();

    let by_event = epochs.aggregate(AggregateAxes::EVENT, Reduction::Mean);
    assert_eq!(by_event.values.shape(), &[2, 3]);
    assert!(by_event.event_labels.is_none());
    assert_abs_diff_eq!(by_event.values[[0, 0]], 1.5, epsilon = 1e-12);
    assert_abs_diff_eq!(by_event.values[[1, 2]], 211.5, epsilon = 1e-12);

    let by_feature = epochs.aggregate(AggregateAxes::FEATURE, Reduction::Mean);
    assert_eq!(by_feature.values.shape(), &[4, 3]);
    assert_eq!(by_feature.times.as_deref(), Some(&[0.0, 1.0, 2.0][..]));

    let all = epochs.aggregate(
        AggregateAxes { event: true, feature: true, time: true },
        Reduction::Mean,
    );
    assert_eq!(all.values.shape(), &[] as &[usize]);
    assert_abs_diff_eq!(all.values.iter().next().copied().unwrap(), 106.5, epsilon = 1e-12);
}

#[test]
fn sum_and_median_reductions() {
    let epochs = small_epochs();
    let sums = epochs.aggregate(AggregateAxes::EVENT, Reduction::Sum);
    assert_abs_diff_eq!(sums.values[[0, 0]], 6.0, epsilon = 1e-12);
    let meds = epochs.aggregate(AggregateAxes::EVENT, Reduction::Median);
    assert_abs_diff_eq!(meds.values[[0, 0]], 1.5, epsilon = 1e-12);
}

#[test]
fn average_mean_curve() {
    let epochs = small_epochs();
    let cfg = AverageConfig {
        feature: true,
        seed: Some(7),
        ..AverageConfig::default()
    };
    let ev = epochs.average(&cfg).unwrap();
    assert_eq!(ev.nave, 4);
    // Feature axis reduced first: mean over f of (e + 10f + 100t) is
    // e + 5 + 100t; mean over e gives 6.5 + 100t.
    assert_eq!(ev.data.shape(), &[3]);
    for t in 0..3 {
        assert_abs_diff_eq!(ev.data[[t]], 6.5 + 100.0 * t as f64, epsilon = 1e-12);
    }
    assert_eq!(ev.times, vec![0.0, 1.0, 2.0]);
}

#[test]
fn bootstrap_band_is_seed_reproducible() {
    let epochs = small_epochs();
    let cfg = AverageConfig {
        error: ErrorModel::Bootstrap { ci: 95.0, n_boot: 200 },
        seed: Some(42),
        ..AverageConfig::default()
    };
    let a = epochs.average(&cfg).unwrap();
    let b = epochs.average(&cfg).unwrap();
    let (band_a, band_b) = match (&a.error, &b.error) {
        (ErrorEnvelope::Bootstrap { band: x, .. }, ErrorEnvelope::Bootstrap { band: y, .. }) => {
            (x, y)
        }
        _ => panic!("expected bootstrap envelopes"),
    };
    assert_eq!(band_a, band_b);
    assert_eq!(band_a.shape(), &[2, 3]);
    // Offsets: lower <= 0 <= upper at every point.
    for t in 0..3 {
        assert!(band_a[[0, t]] <= 1e-12);
        assert!(band_a[[1, t]] >= -1e-12);
    }
    // Envelope curves bracket the point estimate.
    let (lo, hi) = a.envelope();
    for t in 0..3 {
        assert!(lo[[t]] <= a.data[[t]] + 1e-12);
        assert!(hi[[t]] >= a.data[[t]] - 1e-12);
    }
}

#[test]
fn instance_deviations_are_mean_centered() {
    let epochs = small_epochs();
    let cfg = AverageConfig {
        error: ErrorModel::Instance,
        ..AverageConfig::default()
    };
    let ev = epochs.average(&cfg).unwrap();
    let dev = match &ev.error {
        ErrorEnvelope::Instance { deviations } => deviations,
        _ => panic!("expected instance envelope"),
    };
    assert_eq!(dev.shape(), &[4, 3]);
    for t in 0..3 {
        let s: f64 = (0..4).map(|e| dev[[e, t]]).sum();
        assert_abs_diff_eq!(s, 0.0, epsilon = 1e-9);
    }
}

#[test]
fn averaging_empty_selection_is_rejected() {
    let raw = ramp_raw(1, 100, 1.0);
    let ev = event_rows(&[(20.0, 0.0, 1)]);
    let id = EventId::from_pairs([("A", 1), ("B", 2)]);
    let epochs =
        evoked::extract_epochs(&raw, &ev, Some(id), &no_baseline_cfg(-2.0, 2.0, 1.0)).unwrap();
    let none = epochs.pick_labels(&["B"]).unwrap();
    let err = none.average(&AverageConfig::default()).unwrap_err();
    assert!(matches!(err, Error::EmptyEventSet), "got {err}");
}

#[test]
fn average_carries_selection_condition() {
    let raw = ramp_raw(1, 200, 1.0);
    let ev = event_rows(&[(20.0, 0.0, 1), (40.0, 0.0, 2)]);
    let id = EventId::from_pairs([("Physical/Left", 1), ("Imagined/Left", 2)]);
    let epochs =
        evoked::extract_epochs(&raw, &ev, Some(id), &no_baseline_cfg(-2.0, 2.0, 1.0)).unwrap();
    let sub = epochs.pick_labels(&["Physical"]).unwrap();
    let evoked = sub.average(&AverageConfig { seed: Some(1), ..Default::default() }).unwrap();
    assert_eq!(evoked.condition.as_deref(), Some("Physical"));
    assert_eq!(evoked.nave, 1);
}

#[test]
fn summary_explodes_composite_labels() {
    let raw = ramp_raw(2, 300, 1.0);
    let ev = event_rows(&[
        (20.0, 0.0, 1),
        (40.0, 0.0, 2),
        (60.0, 0.0, 1),
    ]);
    let id = EventId::from_pairs([("Physical/Left", 1), ("Imagined/Right", 2)]);
    let cfg = EpochConfig {
        conditions: Some(vec!["modality".into(), "side".into()]),
        ..no_baseline_cfg(-1.0, 2.0, 1.0)
    };
    let epochs = evoked::extract_epochs(&raw, &ev, Some(id), &cfg).unwrap();

    // Reduce events and features, keep time: one row per condition x time.
    let axes = AggregateAxes { event: true, feature: true, time: false };
    let summary = epochs.summary(axes, Reduction::Mean).unwrap();
    assert_eq!(summary.factor_names, vec!["modality", "side"]);
    assert_eq!(summary.rows.len(), 2 * 4);
    let first = &summary.rows[0];
    assert_eq!(first.factors, vec!["Physical", "Left"]);
    assert_eq!(first.feature, -1);
    assert_abs_diff_eq!(first.time, -1.0, epsilon = 1e-12);
    // Events 1 and 3 (onsets 20, 60) averaged on a mean-over-features
    // ramp: ((t + 20) + 2 (t + 20)) / 2 averaged with onset 60 gives
    // 1.5 (t + 40).
    assert_abs_diff_eq!(first.value, 1.5 * 39.0, epsilon = 1e-9);

    let tsv = summary.to_tsv();
    let mut lines = tsv.lines();
    assert_eq!(lines.next(), Some("modality\tside\tvoxel\ttime\tvalue"));
    assert_eq!(tsv.lines().count(), 1 + summary.rows.len());
}

#[test]
fn summary_without_declared_factors_is_rejected() {
    let epochs = small_epochs();
    let err = epochs
        .summary(AggregateAxes::EVENT, Reduction::Mean)
        .unwrap_err();
    assert!(matches!(err, Error::ConditionsNotDeclared), "got {err}");
}
