//! # evoked — event-locked epoch extraction and averaging
//!
//! `evoked` turns continuous physiological recordings plus stimulus
//! timing into event-locked epoch tensors and averaged evoked
//! responses, the way fMRI/ERP deconvolution toolchains do it. All
//! numerics are `f64` on [ndarray](https://crates.io/crates/ndarray);
//! samples a window reaches for outside a recording's coverage are NaN
//! and every reduction is NaN-aware.
//!
//! ## Pipeline overview
//!
//! ```text
//! per-run recordings [features, times]          stimulus timing files
//!   │                                             │
//!   ├─ RawCache::new()        masked reads,       ├─ read_events() /
//!   │                         blob memoization    │  events_from_table()
//!   │                                             │  → [onset, duration, label]
//!   └─ RawCache::get_epochs() ◄───────────────────┘
//!        │   smooth once → interpolate at onset + grid → baseline
//!        │   → concatenate runs → [events, features, times]
//!        │
//!        ├─ Epochs::pick()        hierarchical "A/B" label selection
//!        ├─ Epochs::aggregate()   NaN-aware mean / sum / median
//!        ├─ Epochs::average()     → Evoked + bootstrap/instance band
//!        └─ Epochs::summary()     → long-format table for stats tooling
//! ```
//!
//! ## Quick start
//!
//! ```no_run
//! use evoked::{read_events, AverageConfig, EpochConfig, Raw};
//! use ndarray::Array2;
//!
//! // One run: 100 features sampled every 2 s.
//! let raw = Raw::from_array(Array2::zeros((100, 300)), 2.0);
//!
//! // Timing files, one per condition, one line of onsets per run.
//! let (events, event_id) = read_events(&[
//!     ("Physical/Left".to_string(), "phys_left.1D"),
//!     ("Physical/Right".to_string(), "phys_right.1D"),
//! ]).unwrap();
//!
//! let cfg = EpochConfig { tmin: -4.0, tmax: 12.0, ..EpochConfig::default() };
//! let epochs = evoked::extract_epochs(&raw, &events[0], Some(event_id), &cfg).unwrap();
//!
//! // Every epoch matching the "Physical" branch, averaged with a
//! // bootstrap error band.
//! let physical = epochs.pick_labels(&["Physical"]).unwrap();
//! let evoked = physical.average(&AverageConfig::default()).unwrap();
//! println!("{} events -> {:?}", evoked.nave, evoked.data.shape());
//! ```

pub mod config;
pub mod epochs;
pub mod error;
pub mod events;
pub mod evoked;
pub mod interp;
pub mod io;
pub mod raw;
pub mod smooth;
pub mod stats;

// ── Crate-root re-exports ─────────────────────────────────────────────────
//
// Everything a downstream user is likely to need is available directly as
// `evoked::Foo` without having to know the internal module layout.

pub use config::{
    AggregateAxes, AverageConfig, Baseline, EpochConfig, ErrorModel, Interp, Reduction,
};
pub use epochs::{
    concatenate_epochs, relative_time_grid, Aggregated, Epochs, EpochsInfo, Selector, Summary,
    SummaryRow,
};
pub use error::{Error, Result};
pub use events::{default_event_id, events_from_table, read_events, EventId, TrialTable};
pub use evoked::{ErrorEnvelope, Evoked};
pub use io::{load_evoked, load_raw_array, save_evoked, save_raw_array, BlobSource};
pub use raw::{extract_epochs, ArraySource, Raw, RawCache, RawSource};

/// Extract epochs from every run and average them in one call.
///
/// Chains [`Epochs::new`] per run, [`concatenate_epochs`], and
/// [`Epochs::average`]. `events` must hold one array per recording in
/// the same order. For repeated extractions prefer a [`RawCache`],
/// which memoizes both the recordings and the epochs tensor on disk.
pub fn extract_and_average(
    raws: &[Raw],
    events: &[ndarray::Array2<f64>],
    event_id: &EventId,
    epoch_cfg: &EpochConfig,
    avg_cfg: &AverageConfig,
) -> Result<Evoked> {
    if events.len() != raws.len() {
        return Err(Error::RunCountMismatch { events: events.len(), runs: raws.len() });
    }
    let per_run = raws
        .iter()
        .zip(events)
        .map(|(raw, ev)| Epochs::new(raw, ev, Some(event_id.clone()), epoch_cfg))
        .collect::<Result<Vec<_>>>()?;
    concatenate_epochs(&per_run)?.average(avg_cfg)
}
