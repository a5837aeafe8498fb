//! Continuous recordings and the cached recording collection.
//!
//! A [`Raw`] holds one run's `[features, times]` array behind an `Arc`:
//! derivations copy metadata and share the buffer, and only a feature
//! selection materializes a fresh array. Nothing in this crate writes
//! through a shared buffer.
use std::path::Path;
use std::sync::Arc;

use ndarray::Array2;

use crate::config::EpochConfig;
use crate::epochs::{concatenate_epochs, Epochs};
use crate::error::{Error, Result};
use crate::events::EventId;

/// Reads `[features, times]` arrays for the recording cache. File
/// formats (volumes, channel dumps) live behind this seam; the crate
/// only sees the masked array and its sampling interval in seconds.
pub trait RawSource {
    fn read(&self, id: &str, mask: &[bool]) -> Result<(Array2<f64>, f64)>;
}

/// One run's continuous recording.
#[derive(Debug, Clone)]
pub struct Raw {
    data: Arc<Array2<f64>>,
    sfreq: f64,
    times: Vec<f64>,
    mask: Vec<bool>,
}

impl Raw {
    /// Wrap an in-memory `[features, times]` array sampled every `tr`
    /// seconds. All features are kept in the mask.
    pub fn from_array(data: Array2<f64>, tr: f64) -> Self {
        let n_features = data.nrows();
        let times = (0..data.ncols()).map(|i| i as f64 * tr).collect();
        Self {
            data: Arc::new(data),
            sfreq: 1.0 / tr,
            times,
            mask: vec![true; n_features],
        }
    }

    pub fn n_features(&self) -> usize {
        self.data.nrows()
    }

    pub fn n_times(&self) -> usize {
        self.data.ncols()
    }

    pub fn sfreq(&self) -> f64 {
        self.sfreq
    }

    /// Sampling interval in seconds.
    pub fn tr(&self) -> f64 {
        1.0 / self.sfreq
    }

    /// Sample times in seconds, strictly increasing, `n_times` long.
    pub fn times(&self) -> &[f64] {
        &self.times
    }

    pub fn data(&self) -> &Array2<f64> {
        &self.data
    }

    pub fn mask(&self) -> &[bool] {
        &self.mask
    }

    pub(crate) fn from_parts(data: Arc<Array2<f64>>, tr: f64, mask: Vec<bool>) -> Self {
        let times = (0..data.ncols()).map(|i| i as f64 * tr).collect();
        Self { data, sfreq: 1.0 / tr, times, mask }
    }

    /// Derive a recording restricted to features where `keep` is true.
    /// This is a mutating derivation, so the result owns a fresh buffer.
    pub fn derive_with_features(&self, keep: &[bool]) -> Result<Raw> {
        if keep.len() != self.n_features() {
            return Err(Error::ShapeInvariantViolation(format!(
                "feature mask has {} entries for {} features",
                keep.len(),
                self.n_features()
            )));
        }
        let rows: Vec<usize> = keep
            .iter()
            .enumerate()
            .filter_map(|(i, &k)| k.then_some(i))
            .collect();
        let data = self.data.select(ndarray::Axis(0), &rows);
        Ok(Raw {
            data: Arc::new(data),
            sfreq: self.sfreq,
            times: self.times.clone(),
            mask: keep.to_vec(),
        })
    }
}

/// Ordered set of recordings sharing one spatial mask, with on-disk
/// memoization so repeated constructions skip the expensive raw reads.
#[derive(Debug, Clone)]
pub struct RawCache {
    pub(crate) mask: Vec<bool>,
    pub(crate) raws: Vec<Raw>,
}

impl RawCache {
    /// Load the cache blob at `cache_file` verbatim when it exists
    /// (a corrupt existing blob is a hard failure, never rebuilt), or
    /// read every source through `source` and persist the result when a
    /// path was given. No path means no persistence.
    pub fn new<S: RawSource>(
        source: &S,
        ids: &[String],
        mask: Vec<bool>,
        cache_file: Option<&Path>,
    ) -> Result<Self> {
        if let Some(path) = cache_file {
            if path.exists() {
                return Self::load(path);
            }
        }
        let raws = ids
            .iter()
            .map(|id| {
                let (data, tr) = source.read(id, &mask)?;
                Ok(Raw::from_array(data, tr))
            })
            .collect::<Result<Vec<_>>>()?;
        let cache = Self { mask, raws };
        if let Some(path) = cache_file {
            cache.save(path)?;
        }
        Ok(cache)
    }

    pub fn n_runs(&self) -> usize {
        self.raws.len()
    }

    pub fn mask(&self) -> &[bool] {
        &self.mask
    }

    /// Recordings filtered to features where `keep` is true (`None`
    /// shares the cached buffers unfiltered).
    pub fn get_raws(&self, keep: Option<&[bool]>) -> Result<Vec<Raw>> {
        match keep {
            None => Ok(self.raws.clone()),
            Some(keep) => self.raws.iter().map(|r| r.derive_with_features(keep)).collect(),
        }
    }

    /// Extract epochs for every run and concatenate in run order.
    ///
    /// `events` must supply one array per cached recording, in the same
    /// order; a count mismatch is a hard failure. With a `cache_file`,
    /// an existing blob is loaded verbatim and a fresh result persisted.
    pub fn get_epochs(
        &self,
        events: &[Array2<f64>],
        event_id: &EventId,
        cfg: &EpochConfig,
        cache_file: Option<&Path>,
    ) -> Result<Epochs> {
        if events.len() != self.n_runs() {
            return Err(Error::RunCountMismatch {
                events: events.len(),
                runs: self.n_runs(),
            });
        }
        if let Some(path) = cache_file {
            if path.exists() {
                return Epochs::load(path);
            }
        }
        let per_run = self
            .raws
            .iter()
            .zip(events)
            .map(|(raw, ev)| Epochs::new(raw, ev, Some(event_id.clone()), cfg))
            .collect::<Result<Vec<_>>>()?;
        let epochs = concatenate_epochs(&per_run)?;
        if let Some(path) = cache_file {
            epochs.save(path)?;
        }
        Ok(epochs)
    }
}

/// Builds one epochs tensor from a raw recording and its event array.
///
/// Convenience wrapper over [`Epochs::new`] for callers that do not go
/// through a [`RawCache`].
pub fn extract_epochs(
    raw: &Raw,
    events: &Array2<f64>,
    event_id: Option<EventId>,
    cfg: &EpochConfig,
) -> Result<Epochs> {
    Epochs::new(raw, events, event_id, cfg)
}

/// In-memory source for tests and synthetic pipelines.
pub struct ArraySource {
    pub runs: Vec<Array2<f64>>,
    pub tr: f64,
}

impl RawSource for ArraySource {
    fn read(&self, id: &str, mask: &[bool]) -> Result<(Array2<f64>, f64)> {
        let idx: usize = id.parse().map_err(|_| {
            Error::ShapeInvariantViolation(format!("ArraySource id must be an index, got '{id}'"))
        })?;
        let run = self.runs.get(idx).ok_or_else(|| {
            Error::ShapeInvariantViolation(format!("ArraySource has no run {idx}"))
        })?;
        if mask.len() != run.nrows() {
            return Err(Error::ShapeInvariantViolation(format!(
                "mask has {} entries for {} features",
                mask.len(),
                run.nrows()
            )));
        }
        let rows: Vec<usize> = mask
            .iter()
            .enumerate()
            .filter_map(|(i, &k)| k.then_some(i))
            .collect();
        Ok((run.select(ndarray::Axis(0), &rows), self.tr))
    }
}
