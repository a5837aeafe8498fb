//! Event-locked epochs: extraction, selection, aggregation, averaging.
//!
//! An [`Epochs`] owns a `[events, features, times]` tensor cut from a
//! continuous recording around event onsets, resampled onto a common
//! relative-time grid and baseline-corrected. Relative times that fall
//! outside the recording's coverage hold NaN; NaN is a value here, not
//! an error, and every reduction downstream ignores it.
use std::collections::BTreeSet;

use ndarray::{s, Array2, Array3, ArrayD, Axis, IxDyn};
use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::config::{
    AggregateAxes, AverageConfig, Baseline, EpochConfig, ErrorModel, Interp, Reduction,
};
use crate::error::{Error, Result};
use crate::events::{default_event_id, EventId};
use crate::evoked::{ErrorEnvelope, Evoked};
use crate::interp::Interp1d;
use crate::raw::Raw;
use crate::{smooth, stats};

/// Metadata carried by an epochs collection.
#[derive(Debug, Clone)]
pub struct EpochsInfo {
    /// Sampling rate of the relative-time grid (`1 / dt`).
    pub sfreq: f64,
    pub tmin: f64,
    pub tmax: f64,
    pub baseline: Baseline,
    /// Interpolation used at extraction; `None` for `from_array` data.
    pub interp: Option<Interp>,
    /// Smoothing kernel length used at extraction, if any.
    pub hamm: Option<usize>,
    /// Ordered condition factor names for composite labels.
    pub conditions: Option<Vec<String>>,
    /// Label recorded by the last label-based selection.
    pub condition: Option<String>,
    pub feature_name: String,
    pub value_name: String,
}

/// Selection along one axis of an epochs tensor.
///
/// Selectors are explicit variants resolved once at the selection
/// boundary: `Labels` is valid only on the event axis, `Range` only on
/// the time axis.
#[derive(Debug, Clone)]
pub enum Selector {
    All,
    /// Composite label names, OR-combined; each name matches a stored
    /// label whose `/`-token set contains all of the query's tokens.
    Labels(Vec<String>),
    Indices(Vec<usize>),
    Mask(Vec<bool>),
    /// Inclusive time bounds, resolved against the grid at selection time.
    Range(f64, f64),
}

/// The epochs collection: tensor, source events, pruned dictionary,
/// relative-time grid, metadata.
#[derive(Debug, Clone)]
pub struct Epochs {
    pub(crate) data: Array3<f64>,
    pub(crate) events: Array2<f64>,
    pub(crate) event_id: EventId,
    pub(crate) times: Vec<f64>,
    pub(crate) info: EpochsInfo,
}

/// Relative-time grid for a `[tmin, tmax]` window stepped by `dt`.
///
/// When the window straddles zero the grid is the concatenation of a
/// backward branch from `-dt` to just past `tmin` and a forward branch
/// from `0` to just past `tmax`, so event onset (time 0) is always an
/// exact grid point regardless of window asymmetry. Otherwise a single
/// forward range.
pub fn relative_time_grid(tmin: f64, tmax: f64, dt: f64) -> Vec<f64> {
    if tmin < 0.0 && tmax > 0.0 {
        let mut grid = Vec::new();
        let mut k = 1usize;
        while -(k as f64) * dt > tmin - dt / 2.0 {
            grid.push(-(k as f64) * dt);
            k += 1;
        }
        grid.reverse();
        let mut k = 0usize;
        while k as f64 * dt < tmax + dt / 2.0 {
            grid.push(k as f64 * dt);
            k += 1;
        }
        grid
    } else {
        let mut grid = Vec::new();
        let mut k = 0usize;
        while tmin + k as f64 * dt < tmax + dt / 2.0 {
            grid.push(tmin + k as f64 * dt);
            k += 1;
        }
        grid
    }
}

impl Epochs {
    /// Extract epochs from one recording.
    ///
    /// Builds the relative-time grid, optionally smooths the whole
    /// recording once, builds one interpolant, samples it at
    /// `onset + grid` per event (in event order), and applies the
    /// configured baseline to the full tensor.
    ///
    /// Without an explicit `event_id` a dictionary is derived from the
    /// labels present. A zero-row event array is [`Error::EmptyEventSet`];
    /// a label without a dictionary entry is a shape invariant violation.
    pub fn new(
        raw: &Raw,
        events: &Array2<f64>,
        event_id: Option<EventId>,
        cfg: &EpochConfig,
    ) -> Result<Epochs> {
        if events.nrows() == 0 {
            return Err(Error::EmptyEventSet);
        }
        if events.ncols() != 3 {
            return Err(Error::ShapeInvariantViolation(format!(
                "event array has {} columns, expected 3",
                events.ncols()
            )));
        }
        let event_id = event_id.unwrap_or_else(|| default_event_id(&events.view()));
        check_labels_known(events, &event_id)?;

        let times = relative_time_grid(cfg.tmin, cfg.tmax, cfg.dt);

        let mut x = raw.data().clone();
        if let Some(n) = cfg.hamm {
            let h = smooth::hamming_kernel(n)?;
            smooth::smooth_rows(&mut x, &h)?;
        }
        let f = Interp1d::new(raw.times().to_vec(), x, cfg.interp);

        let mut data = Array3::zeros((events.nrows(), raw.n_features(), times.len()));
        for k in 0..events.nrows() {
            let onset = events[[k, 0]];
            for (ti, &rt) in times.iter().enumerate() {
                f.sample_into(onset + rt, &mut data.slice_mut(s![k, .., ti]));
            }
        }
        baseline_correct(&mut data, &times, cfg.baseline, Reduction::Mean);

        Ok(Epochs {
            data,
            events: events.clone(),
            event_id,
            info: EpochsInfo {
                sfreq: 1.0 / cfg.dt,
                tmin: cfg.tmin,
                tmax: cfg.tmax,
                baseline: cfg.baseline,
                interp: Some(cfg.interp),
                hamm: cfg.hamm,
                conditions: cfg.conditions.clone(),
                condition: None,
                feature_name: "voxel".into(),
                value_name: "value".into(),
            },
            times,
        })
    }

    /// Wrap an already-epoched `[events, features, times]` tensor.
    ///
    /// `tr` is the grid step in seconds (default 1), `tmin` the time of
    /// the first sample. Missing events become zero-filled placeholder
    /// rows labeled 0. The baseline is applied to the supplied data.
    pub fn from_array(
        data: Array3<f64>,
        tr: Option<f64>,
        tmin: f64,
        baseline: Baseline,
        events: Option<Array2<f64>>,
        event_id: Option<EventId>,
        conditions: Option<Vec<String>>,
    ) -> Result<Epochs> {
        let (n_events, _, n_times) = data.dim();
        let dt = tr.unwrap_or(1.0);
        let times: Vec<f64> = (0..n_times).map(|i| tmin + i as f64 * dt).collect();

        let events = match events {
            Some(ev) => {
                if ev.nrows() != n_events || ev.ncols() != 3 {
                    return Err(Error::ShapeInvariantViolation(format!(
                        "events array is {}x{}, expected {n_events}x3",
                        ev.nrows(),
                        ev.ncols()
                    )));
                }
                ev
            }
            None => Array2::zeros((n_events, 3)),
        };
        let event_id = match event_id {
            Some(id) => {
                check_labels_known(&events, &id)?;
                id
            }
            None => {
                if events.column(2).iter().all(|&v| v == 0.0) {
                    EventId::from_pairs([("Event", 0)])
                } else {
                    default_event_id(&events.view())
                }
            }
        };

        let mut data = data;
        baseline_correct(&mut data, &times, baseline, Reduction::Mean);

        Ok(Epochs {
            data,
            events,
            event_id,
            info: EpochsInfo {
                sfreq: 1.0 / dt,
                tmin,
                tmax: times.last().copied().unwrap_or(tmin),
                baseline,
                interp: None,
                hamm: None,
                conditions,
                condition: None,
                feature_name: "voxel".into(),
                value_name: "value".into(),
            },
            times,
        })
    }

    pub fn n_events(&self) -> usize {
        self.data.dim().0
    }

    pub fn n_features(&self) -> usize {
        self.data.dim().1
    }

    pub fn n_times(&self) -> usize {
        self.data.dim().2
    }

    pub fn data(&self) -> &Array3<f64> {
        &self.data
    }

    /// `[n_events, 3]` rows of `[onset, duration, label]` in source
    /// units; after extraction only the label column is meaningful.
    pub fn events(&self) -> &Array2<f64> {
        &self.events
    }

    pub fn event_id(&self) -> &EventId {
        &self.event_id
    }

    /// Relative-time grid (seconds from event onset).
    pub fn times(&self) -> &[f64] {
        &self.times
    }

    pub fn info(&self) -> &EpochsInfo {
        &self.info
    }

    /// Integer labels of the event rows, in row order.
    pub fn labels(&self) -> Vec<i64> {
        self.events.column(2).iter().map(|&v| v as i64).collect()
    }

    /// Select along the three orthogonal axes.
    ///
    /// The result owns freshly materialized tensors and a dictionary
    /// pruned to the labels still present; source recordings are never
    /// touched. An empty selection is structurally valid.
    pub fn pick(&self, event: &Selector, feature: &Selector, time: &Selector) -> Result<Epochs> {
        let (rows, condition) = self.resolve_event(event)?;
        let cols = resolve_plain(feature, self.n_features(), "feature")?;
        let tsel = self.resolve_time(time)?;

        let data = self
            .data
            .select(Axis(0), &rows)
            .select(Axis(1), &cols)
            .select(Axis(2), &tsel);
        let events = self.events.select(Axis(0), &rows);
        let present: BTreeSet<i64> = events.column(2).iter().map(|&v| v as i64).collect();
        let event_id = self.event_id.pruned(&present);
        let times: Vec<f64> = tsel.iter().map(|&i| self.times[i]).collect();

        let mut info = self.info.clone();
        if condition.is_some() {
            info.condition = condition;
        }
        if let (Some(&t0), Some(&t1)) = (times.first(), times.last()) {
            info.tmin = t0;
            info.tmax = t1;
        }
        Ok(Epochs { data, events, event_id, times, info })
    }

    /// Shorthand for label-based event selection.
    pub fn pick_labels(&self, keys: &[&str]) -> Result<Epochs> {
        let keys = keys.iter().map(|k| k.to_string()).collect();
        self.pick(&Selector::Labels(keys), &Selector::All, &Selector::All)
    }

    /// Remove event rows by index; the label dictionary is re-pruned
    /// exactly as for label-based selection.
    pub fn drop_events(&self, ids: &[usize]) -> Result<Epochs> {
        let drop: BTreeSet<usize> = ids.iter().copied().collect();
        let keep: Vec<usize> = (0..self.n_events()).filter(|i| !drop.contains(i)).collect();
        self.pick(&Selector::Indices(keep), &Selector::All, &Selector::All)
    }

    /// Re-apply baseline correction with a NaN-aware mean.
    ///
    /// Replaces the prior correction rather than composing with it: the
    /// reference level is recomputed from the current data, so only
    /// [`Baseline::None`] is idempotent in general.
    pub fn apply_baseline(&self, baseline: Baseline) -> Epochs {
        self.apply_baseline_with(baseline, Reduction::Mean)
    }

    /// Like [`Self::apply_baseline`] with an explicit window reduction.
    pub fn apply_baseline_with(&self, baseline: Baseline, reduction: Reduction) -> Epochs {
        let mut inst = self.clone();
        baseline_correct(&mut inst.data, &inst.times, baseline, reduction);
        inst.info.baseline = baseline;
        inst
    }

    /// Reduce the chosen axes, returning the reduced values plus index
    /// metadata for the axes that were kept.
    pub fn aggregate(&self, axes: AggregateAxes, reduction: Reduction) -> Aggregated {
        let mut values: ArrayD<f64> = self.data.clone().into_dyn();
        // Highest axis first so the remaining indices stay valid.
        if axes.time {
            values = stats::reduce_axis(&values.view(), 2, reduction);
        }
        if axes.feature {
            values = stats::reduce_axis(&values.view(), 1, reduction);
        }
        if axes.event {
            values = stats::reduce_axis(&values.view(), 0, reduction);
        }
        Aggregated {
            values,
            event_labels: (!axes.event).then(|| self.labels()),
            features: (!axes.feature).then(|| (0..self.n_features()).collect()),
            times: (!axes.time).then(|| self.times.clone()),
        }
    }

    /// Average over events into an [`Evoked`], reducing the feature
    /// and/or time axes first per `cfg` and the event axis last.
    ///
    /// The bootstrap envelope is the central `ci`% percentile band of
    /// `n_boot` resampled reductions, expressed as offsets from the
    /// point estimate (directly additive to the mean curve, possibly
    /// asymmetric). The instance envelope keeps one offset curve per
    /// event.
    pub fn average(&self, cfg: &AverageConfig) -> Result<Evoked> {
        let agg = self.aggregate(
            AggregateAxes { event: false, feature: cfg.feature, time: cfg.time },
            cfg.reduction,
        );
        let x = agg.values;
        let nave = x.shape()[0];
        if nave == 0 {
            return Err(Error::EmptyEventSet);
        }
        let data = stats::reduce_axis(&x.view(), 0, cfg.reduction);

        let error = match cfg.error {
            ErrorModel::Bootstrap { ci, n_boot } => {
                let mut rng: StdRng = match cfg.seed {
                    Some(seed) => StdRng::seed_from_u64(seed),
                    None => StdRng::from_entropy(),
                };
                let rest: Vec<usize> = x.shape()[1..].to_vec();
                let rest_len: usize = rest.iter().product();
                let mut boot = vec![0.0_f64; n_boot * rest_len];
                let mut idx = vec![0usize; nave];
                for b in 0..n_boot {
                    for i in idx.iter_mut() {
                        *i = rng.gen_range(0..nave);
                    }
                    let reduced =
                        stats::reduce_axis(&x.select(Axis(0), &idx).view(), 0, cfg.reduction);
                    for (o, &v) in boot[b * rest_len..(b + 1) * rest_len]
                        .iter_mut()
                        .zip(reduced.iter())
                    {
                        *o = v;
                    }
                }
                let mut shape = vec![n_boot];
                shape.extend(&rest);
                let boot = ArrayD::from_shape_vec(IxDyn(&shape), boot)?;
                let band =
                    stats::percentiles_axis0(&boot.view(), &[50.0 - ci / 2.0, 50.0 + ci / 2.0]);
                let band = &band - &data;
                ErrorEnvelope::Bootstrap { ci, band }
            }
            ErrorModel::Instance => ErrorEnvelope::Instance { deviations: &x - &data },
        };

        let times = agg.times.unwrap_or_else(|| {
            vec![stats::reduce_lane(self.times.iter().copied(), Reduction::Mean)]
        });
        Ok(Evoked {
            data,
            nave,
            times,
            error,
            condition: cfg.condition.clone().or_else(|| self.info.condition.clone()),
            feature_name: self.info.feature_name.clone(),
            value_name: self.info.value_name.clone(),
        })
    }

    /// Long-format summary table: one row per (condition-factor
    /// combination x feature x time), with the reduced value. This is
    /// the hand-off format to external tabular/statistical tooling.
    ///
    /// Requires the ordered factor names in `info.conditions`; every
    /// present composite label must have one value per factor.
    pub fn summary(&self, axes: AggregateAxes, reduction: Reduction) -> Result<Summary> {
        let factor_names = self
            .info
            .conditions
            .clone()
            .ok_or(Error::ConditionsNotDeclared)?;

        let names: Vec<String> = self.event_id.iter().map(|(n, _)| n.to_string()).collect();
        let mut rows = Vec::new();
        for ev in names {
            let factors: Vec<String> = ev.split('/').map(str::to_string).collect();
            if factors.len() != factor_names.len() {
                return Err(Error::ShapeInvariantViolation(format!(
                    "label '{ev}' has {} factor values, metadata declares {}",
                    factors.len(),
                    factor_names.len()
                )));
            }
            let sub = self.pick_labels(&[&ev])?;
            let agg = sub.aggregate(axes, reduction);
            let ne = if axes.event { 1 } else { sub.n_events() };
            let nf = if axes.feature { 1 } else { sub.n_features() };
            let nt = if axes.time { 1 } else { sub.n_times() };
            let mean_time = stats::reduce_lane(sub.times.iter().copied(), Reduction::Mean);
            let vals: Vec<f64> = agg.values.iter().copied().collect();
            debug_assert_eq!(vals.len(), ne * nf * nt);
            for e in 0..ne {
                for f in 0..nf {
                    for t in 0..nt {
                        rows.push(SummaryRow {
                            factors: factors.clone(),
                            feature: if axes.feature { -1 } else { f as i64 },
                            time: if axes.time { mean_time } else { sub.times[t] },
                            value: vals[(e * nf + f) * nt + t],
                        });
                    }
                }
            }
        }
        Ok(Summary {
            factor_names,
            feature_name: self.info.feature_name.clone(),
            value_name: self.info.value_name.clone(),
            rows,
        })
    }

    fn resolve_event(&self, sel: &Selector) -> Result<(Vec<usize>, Option<String>)> {
        match sel {
            Selector::All => Ok(((0..self.n_events()).collect(), None)),
            Selector::Labels(keys) => {
                let matched = self.partial_match_ids(keys);
                let rows = self
                    .events
                    .column(2)
                    .iter()
                    .enumerate()
                    .filter_map(|(i, &v)| matched.contains(&(v as i64)).then_some(i))
                    .collect();
                Ok((rows, Some(keys.join(" | "))))
            }
            Selector::Range(..) => Err(Error::ShapeInvariantViolation(
                "range selector is only valid on the time axis".into(),
            )),
            other => Ok((resolve_plain(other, self.n_events(), "event")?, None)),
        }
    }

    fn resolve_time(&self, sel: &Selector) -> Result<Vec<usize>> {
        match sel {
            Selector::Range(lo, hi) => Ok(self
                .times
                .iter()
                .enumerate()
                .filter_map(|(i, &t)| (*lo <= t && t <= *hi).then_some(i))
                .collect()),
            other => resolve_plain(other, self.n_times(), "time"),
        }
    }

    /// Labels whose `/`-token set contains every token of at least one
    /// query name (queries OR-combined).
    fn partial_match_ids(&self, keys: &[String]) -> BTreeSet<i64> {
        let mut matched = BTreeSet::new();
        for key in keys {
            let key_set: BTreeSet<&str> = key.split('/').collect();
            for (name, id) in self.event_id.iter() {
                let name_set: BTreeSet<&str> = name.split('/').collect();
                if key_set.is_subset(&name_set) {
                    matched.insert(id);
                }
            }
        }
        matched
    }
}

/// Index/mask resolution shared by the feature and time axes, and by
/// index/mask selection on the event axis.
fn resolve_plain(sel: &Selector, len: usize, axis: &str) -> Result<Vec<usize>> {
    match sel {
        Selector::All => Ok((0..len).collect()),
        Selector::Indices(idx) => {
            if let Some(&bad) = idx.iter().find(|&&i| i >= len) {
                return Err(Error::ShapeInvariantViolation(format!(
                    "{axis} index {bad} out of range for axis of length {len}"
                )));
            }
            Ok(idx.clone())
        }
        Selector::Mask(m) => {
            if m.len() != len {
                return Err(Error::ShapeInvariantViolation(format!(
                    "{axis} mask has {} entries for axis of length {len}",
                    m.len()
                )));
            }
            Ok(m.iter().enumerate().filter_map(|(i, &k)| k.then_some(i)).collect())
        }
        Selector::Labels(_) => Err(Error::ShapeInvariantViolation(
            "label selector is only valid on the event axis".into(),
        )),
        Selector::Range(..) => Err(Error::ShapeInvariantViolation(
            "range selector is only valid on the time axis".into(),
        )),
    }
}

fn check_labels_known(events: &Array2<f64>, event_id: &EventId) -> Result<()> {
    for &l in events.column(2) {
        if !event_id.contains_id(l as i64) {
            return Err(Error::ShapeInvariantViolation(format!(
                "event label {} has no dictionary entry",
                l as i64
            )));
        }
    }
    Ok(())
}

/// Subtract the baseline level from every `[feature, time]` slice.
///
/// `All` always uses a NaN-aware mean; a `Window` uses `reduction`,
/// with open bounds extending to the grid edges. A window whose samples
/// are all NaN propagates NaN into the row, matching the missing-data
/// semantics of the extracted tensor.
fn baseline_correct(
    data: &mut Array3<f64>,
    times: &[f64],
    baseline: Baseline,
    reduction: Reduction,
) {
    if times.is_empty() {
        return;
    }
    let (sel, reduction): (Vec<usize>, Reduction) = match baseline {
        Baseline::None => return,
        Baseline::All => ((0..times.len()).collect(), Reduction::Mean),
        Baseline::Window(lo, hi) => {
            let lo = lo.unwrap_or(times[0]);
            let hi = hi.unwrap_or(*times.last().unwrap());
            (
                times
                    .iter()
                    .enumerate()
                    .filter_map(|(i, &t)| (lo <= t && t <= hi).then_some(i))
                    .collect(),
                reduction,
            )
        }
    };
    for mut epoch in data.outer_iter_mut() {
        for mut row in epoch.rows_mut() {
            let base = stats::reduce_lane(sel.iter().map(|&i| row[i]), reduction);
            row.mapv_inplace(|v| v - base);
        }
    }
}

/// Concatenate per-run epochs into one collection, preserving run order.
///
/// All inputs must share feature count and relative-time grid; the
/// dictionaries are merged in order of first appearance and must agree
/// on shared names.
pub fn concatenate_epochs(list: &[Epochs]) -> Result<Epochs> {
    let first = list.first().ok_or_else(|| {
        Error::ShapeInvariantViolation("cannot concatenate zero epoch collections".into())
    })?;
    for e in &list[1..] {
        if e.n_features() != first.n_features() || e.times != first.times {
            return Err(Error::ShapeInvariantViolation(
                "concatenated epochs must share feature count and time grid".into(),
            ));
        }
    }
    let data = ndarray::concatenate(
        Axis(0),
        &list.iter().map(|e| e.data.view()).collect::<Vec<_>>(),
    )?;
    let events = ndarray::concatenate(
        Axis(0),
        &list.iter().map(|e| e.events.view()).collect::<Vec<_>>(),
    )?;
    let mut event_id = first.event_id.clone();
    for e in &list[1..] {
        for (name, id) in e.event_id.iter() {
            match event_id.id(name) {
                Some(existing) if existing != id => {
                    return Err(Error::ShapeInvariantViolation(format!(
                        "label '{name}' maps to both {existing} and {id}"
                    )));
                }
                Some(_) => {}
                None => event_id.insert(name, id),
            }
        }
    }
    Ok(Epochs {
        data,
        events,
        event_id,
        times: first.times.clone(),
        info: first.info.clone(),
    })
}

/// Result of [`Epochs::aggregate`]: reduced values plus the index
/// metadata of the axes that were kept (`None` marks a reduced axis).
#[derive(Debug, Clone)]
pub struct Aggregated {
    pub values: ArrayD<f64>,
    pub event_labels: Option<Vec<i64>>,
    pub features: Option<Vec<usize>>,
    pub times: Option<Vec<f64>>,
}

/// Long-format table produced by [`Epochs::summary`].
#[derive(Debug, Clone)]
pub struct Summary {
    pub factor_names: Vec<String>,
    pub feature_name: String,
    pub value_name: String,
    pub rows: Vec<SummaryRow>,
}

/// One (condition x feature x time) observation.
#[derive(Debug, Clone)]
pub struct SummaryRow {
    /// One value per declared factor, from the exploded composite label.
    pub factors: Vec<String>,
    /// Feature index, `-1` when the feature axis was aggregated.
    pub feature: i64,
    /// Grid time, or the mean grid time when the time axis was reduced.
    pub time: f64,
    pub value: f64,
}

impl Summary {
    /// Tab-separated rendition with a header line.
    pub fn to_tsv(&self) -> String {
        let mut out = String::new();
        for name in &self.factor_names {
            out.push_str(name);
            out.push('\t');
        }
        out.push_str(&self.feature_name);
        out.push_str("\ttime\t");
        out.push_str(&self.value_name);
        out.push('\n');
        for row in &self.rows {
            for f in &row.factors {
                out.push_str(f);
                out.push('\t');
            }
            out.push_str(&format!("{}\t{}\t{}\n", row.feature, row.time, row.value));
        }
        out
    }
}
