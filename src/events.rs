//! Event timeline parsing.
//!
//! Converts per-run stimulus-timing sources into canonical per-run event
//! arrays of `[onset, duration, label]` rows plus a name → label
//! dictionary. Two source forms are supported: one timing file per
//! condition (one line per run, `*` marking a run without occurrences)
//! and a tabular trial log.
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use ndarray::{Array2, ArrayView2};

use crate::error::{Error, Result};

/// Ordered mapping from condition name to positive integer label.
///
/// Kept as an explicit ordered list: factor ordering and summary output
/// order follow insertion order, never a hash map's iteration order.
/// Names are unique; integers need not be contiguous. Label 0 is
/// reserved for "unlabeled" placeholder events.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventId {
    entries: Vec<(String, i64)>,
}

impl EventId {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs<I, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, i64)>,
        S: Into<String>,
    {
        Self {
            entries: pairs.into_iter().map(|(n, i)| (n.into(), i)).collect(),
        }
    }

    /// Insert or overwrite an entry, keeping first-insertion order.
    pub fn insert(&mut self, name: &str, id: i64) {
        match self.entries.iter_mut().find(|(n, _)| n == name) {
            Some(entry) => entry.1 = id,
            None => self.entries.push((name.to_string(), id)),
        }
    }

    pub fn id(&self, name: &str) -> Option<i64> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, i)| *i)
    }

    pub fn name(&self, id: i64) -> Option<&str> {
        self.entries
            .iter()
            .find(|(_, i)| *i == id)
            .map(|(n, _)| n.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, i64)> {
        self.entries.iter().map(|(n, i)| (n.as_str(), *i))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains_id(&self, id: i64) -> bool {
        self.entries.iter().any(|(_, i)| *i == id)
    }

    /// Keep only entries whose label appears in `present`, preserving order.
    pub fn pruned(&self, present: &BTreeSet<i64>) -> Self {
        Self {
            entries: self
                .entries
                .iter()
                .filter(|(_, i)| present.contains(i))
                .cloned()
                .collect(),
        }
    }
}

/// Dictionary derived from the labels actually present in an event
/// array: `"1" -> 1`, `"2" -> 2`, ... in ascending label order.
pub fn default_event_id(events: &ArrayView2<f64>) -> EventId {
    let labels: BTreeSet<i64> = events.column(2).iter().map(|&v| v as i64).collect();
    EventId::from_pairs(labels.into_iter().map(|id| (id.to_string(), id)))
}

/// Read events from per-condition stimulus timing files.
///
/// Each file holds one non-blank line per run with whitespace-separated
/// onset times for that condition, or a single `*` for a run without
/// occurrences; blank lines are skipped. Labels are assigned 1..K in
/// the order of `event_files`. Every file must describe the same number
/// of runs.
///
/// Returns per-run event arrays sorted by onset plus the dictionary.
pub fn read_events<P: AsRef<Path>>(
    event_files: &[(String, P)],
) -> Result<(Vec<Array2<f64>>, EventId)> {
    let mut event_id = EventId::new();
    // Per run: (onset, duration, label) triples across all conditions.
    let mut runs: Vec<Vec<(f64, f64, i64)>> = Vec::new();
    let mut n_runs: Option<usize> = None;

    for (eid, (name, file)) in event_files.iter().enumerate() {
        let label = eid as i64 + 1;
        event_id.insert(name, label);

        let text = fs::read_to_string(file.as_ref())?;
        let lines: Vec<&str> = text.lines().map(str::trim).filter(|l| !l.is_empty()).collect();

        match n_runs {
            None => {
                n_runs = Some(lines.len());
                runs.resize(lines.len(), Vec::new());
            }
            Some(expected) if expected != lines.len() => {
                return Err(Error::MalformedTimingSource(format!(
                    "condition '{name}' describes {} runs, expected {expected}",
                    lines.len()
                )));
            }
            Some(_) => {}
        }

        for (rid, line) in lines.iter().enumerate() {
            if line.starts_with('*') {
                continue;
            }
            for tok in line.split_whitespace() {
                let onset: f64 = tok
                    .parse()
                    .ok()
                    .filter(|v: &f64| v.is_finite())
                    .ok_or_else(|| {
                        Error::MalformedTimingSource(format!(
                            "condition '{name}', run {rid}: bad onset '{tok}'"
                        ))
                    })?;
                runs[rid].push((onset, 0.0, label));
            }
        }
    }

    let events = runs.into_iter().map(|run| to_sorted_array(run)).collect();
    Ok((events, event_id))
}

/// Row-per-trial table, the second timing-source form.
///
/// The crate does not interpret file formats beyond this minimal
/// tab-separated layout; richer tabular inputs are converted by the
/// caller.
#[derive(Debug, Clone)]
pub struct TrialTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl TrialTable {
    /// Parse a header line plus tab-separated rows; blank lines skipped.
    pub fn from_tsv(text: &str) -> Result<Self> {
        let mut lines = text.lines().filter(|l| !l.trim().is_empty());
        let header = lines.next().ok_or_else(|| {
            Error::MalformedTimingSource("trial table has no header line".into())
        })?;
        let columns: Vec<String> = header.split('\t').map(|s| s.trim().to_string()).collect();
        let mut rows = Vec::new();
        for (k, line) in lines.enumerate() {
            let row: Vec<String> = line.split('\t').map(|s| s.trim().to_string()).collect();
            if row.len() != columns.len() {
                return Err(Error::MalformedTimingSource(format!(
                    "trial table row {k} has {} fields, expected {}",
                    row.len(),
                    columns.len()
                )));
            }
            rows.push(row);
        }
        Ok(Self { columns, rows })
    }

    fn column(&self, name: &str) -> Result<usize> {
        self.columns.iter().position(|c| c == name).ok_or_else(|| {
            Error::MalformedTimingSource(format!("trial table is missing column '{name}'"))
        })
    }
}

/// Build per-run events from a trial table.
///
/// `run` and `time` name the run-identifier and onset columns,
/// `conditions` the factor columns whose values are joined with `/` to
/// form composite labels, `duration` an optional duration column.
///
/// Without an explicit `event_id`, one is derived as the cartesian
/// product of observed factor levels (first-appearance order, last
/// factor fastest), labeled 1..K in product order. With an explicit
/// dictionary, a trial whose composite name is absent is an error.
///
/// Runs appear in first-appearance order; each run's events are sorted
/// by onset.
pub fn events_from_table(
    table: &TrialTable,
    run: &str,
    time: &str,
    conditions: &[&str],
    duration: Option<&str>,
    event_id: Option<EventId>,
) -> Result<(Vec<Array2<f64>>, EventId)> {
    let run_col = table.column(run)?;
    let time_col = table.column(time)?;
    let cond_cols: Vec<usize> = conditions
        .iter()
        .map(|c| table.column(c))
        .collect::<Result<_>>()?;
    let dur_col = duration.map(|c| table.column(c)).transpose()?;

    let event_id = match event_id {
        Some(id) => id,
        None => derive_event_id(table, &cond_cols),
    };

    // Runs in first-appearance order.
    let mut run_order: Vec<&str> = Vec::new();
    for row in &table.rows {
        let r = row[run_col].as_str();
        if !run_order.contains(&r) {
            run_order.push(r);
        }
    }

    let mut events = Vec::with_capacity(run_order.len());
    for run_val in run_order {
        let mut rows: Vec<(f64, f64, i64)> = Vec::new();
        for (k, row) in table.rows.iter().enumerate() {
            if row[run_col] != run_val {
                continue;
            }
            let onset: f64 = row[time_col]
                .parse()
                .ok()
                .filter(|v: &f64| v.is_finite())
                .ok_or_else(|| {
                    Error::MalformedTimingSource(format!(
                        "trial {k}: bad onset '{}'",
                        row[time_col]
                    ))
                })?;
            let dur = match dur_col {
                None => 0.0,
                Some(c) => row[c].parse().map_err(|_| {
                    Error::MalformedTimingSource(format!(
                        "trial {k}: bad duration '{}'",
                        row[c]
                    ))
                })?,
            };
            let name = cond_cols
                .iter()
                .map(|&c| row[c].as_str())
                .collect::<Vec<_>>()
                .join("/");
            let label = event_id.id(&name).ok_or_else(|| {
                Error::MalformedTimingSource(format!(
                    "trial {k}: condition '{name}' is not in the event dictionary"
                ))
            })?;
            rows.push((onset, dur, label));
        }
        events.push(to_sorted_array(rows));
    }
    Ok((events, event_id))
}

/// Cartesian product of observed factor levels, last factor fastest.
fn derive_event_id(table: &TrialTable, cond_cols: &[usize]) -> EventId {
    let mut levels: Vec<Vec<&str>> = vec![Vec::new(); cond_cols.len()];
    for row in &table.rows {
        for (k, &c) in cond_cols.iter().enumerate() {
            let v = row[c].as_str();
            if !levels[k].contains(&v) {
                levels[k].push(v);
            }
        }
    }
    let mut event_id = EventId::new();
    let mut combo = vec![0usize; levels.len()];
    let total: usize = levels.iter().map(|l| l.len()).product();
    for k in 0..total {
        let name = combo
            .iter()
            .zip(&levels)
            .map(|(&i, lv)| lv[i])
            .collect::<Vec<_>>()
            .join("/");
        event_id.insert(&name, k as i64 + 1);
        // Odometer increment, last factor fastest.
        for d in (0..combo.len()).rev() {
            combo[d] += 1;
            if combo[d] < levels[d].len() {
                break;
            }
            combo[d] = 0;
        }
    }
    event_id
}

fn to_sorted_array(mut rows: Vec<(f64, f64, i64)>) -> Array2<f64> {
    rows.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap());
    let mut out = Array2::zeros((rows.len(), 3));
    for (k, (onset, dur, label)) in rows.into_iter().enumerate() {
        out[[k, 0]] = onset;
        out[[k, 1]] = dur;
        out[[k, 2]] = label as f64;
    }
    out
}
