//! Extraction and averaging configuration.
//!
//! [`EpochConfig`] holds every tunable parameter for raw-to-epoch
//! conversion, [`AverageConfig`] for epoch-to-evoked reduction. All
//! fields are `pub` so you can construct one with struct-update syntax:
//!
//! ```
//! use evoked::{EpochConfig, Interp};
//!
//! let cfg = EpochConfig {
//!     tmin: -2.0,
//!     tmax: 12.0,
//!     interp: Interp::Cubic,
//!     ..EpochConfig::default()
//! };
//! ```

/// Baseline correction policy for an epoch's relative-time axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Baseline {
    /// Identity; the data keeps its raw level.
    None,
    /// Subtract the per-event, per-feature NaN-aware mean over the whole
    /// relative-time axis.
    All,
    /// Subtract the reduction over samples with `lo <= t <= hi`. `None`
    /// on either bound extends to the corresponding edge of the grid.
    Window(Option<f64>, Option<f64>),
}

/// Interpolation kind used when resampling a recording onto the
/// relative-time grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interp {
    Nearest,
    Linear,
    /// Natural cubic spline.
    Cubic,
}

/// NaN-aware reduction applied by aggregation and baseline correction.
/// All variants ignore NaN rather than propagate it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reduction {
    Mean,
    Sum,
    Median,
}

/// Configuration for [`crate::Epochs::new`].
#[derive(Debug, Clone)]
pub struct EpochConfig {
    /// Window start relative to event onset (seconds, usually negative).
    pub tmin: f64,
    /// Window end relative to event onset (seconds).
    pub tmax: f64,
    /// Relative-time grid step (seconds).
    pub dt: f64,
    /// Interpolation kind for resampling onto the grid.
    pub interp: Interp,
    /// Optional odd length of a normalized Hamming smoothing kernel
    /// applied to the whole recording before resampling.
    pub hamm: Option<usize>,
    /// Baseline correction applied to the extracted tensor.
    pub baseline: Baseline,
    /// Ordered condition factor names making up composite event labels,
    /// e.g. `["modality", "side"]` for labels like `"Physical/Left"`.
    /// Required by `Epochs::summary`.
    pub conditions: Option<Vec<String>>,
}

impl Default for EpochConfig {
    /// A `[-5, 15]` s window at 10 Hz with a `(-2, 0)` s baseline and
    /// linear interpolation.
    fn default() -> Self {
        Self {
            tmin: -5.0,
            tmax: 15.0,
            dt: 0.1,
            interp: Interp::Linear,
            hamm: None,
            baseline: Baseline::Window(Some(-2.0), Some(0.0)),
            conditions: None,
        }
    }
}

/// Error model for [`crate::Epochs::average`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ErrorModel {
    /// Resample events with replacement `n_boot` times; the envelope is
    /// the central `ci`% percentile band of the resample distribution,
    /// stored as offsets from the point estimate.
    Bootstrap { ci: f64, n_boot: usize },
    /// The envelope is every individual event's reduced curve as an
    /// offset from the mean.
    Instance,
}

/// Configuration for [`crate::Epochs::average`].
#[derive(Debug, Clone)]
pub struct AverageConfig {
    /// Reduce the feature axis before averaging over events.
    pub feature: bool,
    /// Reduce the time axis before averaging over events.
    pub time: bool,
    /// Reduction used along every reduced axis.
    pub reduction: Reduction,
    pub error: ErrorModel,
    /// Condition label carried on the resulting `Evoked`; falls back to
    /// the label recorded by the last label-based selection.
    pub condition: Option<String>,
    /// Seed for the bootstrap RNG. `None` draws from entropy.
    pub seed: Option<u64>,
}

impl Default for AverageConfig {
    /// Feature-reduced mean with a 1000-draw 95% bootstrap band.
    fn default() -> Self {
        Self {
            feature: true,
            time: false,
            reduction: Reduction::Mean,
            error: ErrorModel::Bootstrap { ci: 95.0, n_boot: 1000 },
            condition: None,
            seed: None,
        }
    }
}

/// Axes to reduce in [`crate::Epochs::aggregate`].
#[derive(Debug, Clone, Copy, Default)]
pub struct AggregateAxes {
    pub event: bool,
    pub feature: bool,
    pub time: bool,
}

impl AggregateAxes {
    pub const EVENT: Self = Self { event: true, feature: false, time: false };
    pub const FEATURE: Self = Self { event: false, feature: true, time: false };
    pub const TIME: Self = Self { event: false, feature: false, time: true };
}
