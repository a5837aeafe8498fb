//! Averaged evoked responses.
//!
//! An [`Evoked`] is the across-event average of one condition's epochs,
//! produced by [`crate::Epochs::average`]. It is read-only after
//! construction and never flows back into an epochs collection; the
//! curve plus envelope is the hand-off to external rendering.
use ndarray::ArrayD;

/// Error envelope attached to an evoked response. Both variants store
/// offsets from the point estimate, so `data + offset` is directly
/// plottable.
#[derive(Debug, Clone)]
pub enum ErrorEnvelope {
    /// Central percentile band of the bootstrap resample distribution:
    /// `band` has shape `[2, ...data.shape()]` (lower, upper offsets).
    /// The offsets come straight from resample percentiles and may be
    /// asymmetric around zero.
    Bootstrap { ci: f64, band: ArrayD<f64> },
    /// One offset curve per event: `deviations` has shape
    /// `[nave, ...data.shape()]` and is centered on the mean.
    Instance { deviations: ArrayD<f64> },
}

/// The averaged response for one condition.
#[derive(Debug, Clone)]
pub struct Evoked {
    /// Point estimate; `[features, times]`, or reduced along whichever
    /// axes `average` collapsed.
    pub data: ArrayD<f64>,
    /// Number of events averaged.
    pub nave: usize,
    /// Relative times of `data`'s last axis; a single mean time when the
    /// time axis was reduced.
    pub times: Vec<f64>,
    pub error: ErrorEnvelope,
    /// Condition label, from the averaging config or the last
    /// label-based selection.
    pub condition: Option<String>,
    pub feature_name: String,
    pub value_name: String,
}

impl Evoked {
    /// Lower and upper envelope curves (`data + offset`), collapsing an
    /// instance envelope to its pointwise extrema.
    pub fn envelope(&self) -> (ArrayD<f64>, ArrayD<f64>) {
        match &self.error {
            ErrorEnvelope::Bootstrap { band, .. } => {
                let lower = &self.data + &band.index_axis(ndarray::Axis(0), 0);
                let upper = &self.data + &band.index_axis(ndarray::Axis(0), 1);
                (lower, upper)
            }
            ErrorEnvelope::Instance { deviations } => {
                let lo = deviations.map_axis(ndarray::Axis(0), |lane| {
                    lane.iter().copied().filter(|v| !v.is_nan()).fold(f64::INFINITY, f64::min)
                });
                let hi = deviations.map_axis(ndarray::Axis(0), |lane| {
                    lane.iter()
                        .copied()
                        .filter(|v| !v.is_nan())
                        .fold(f64::NEG_INFINITY, f64::max)
                });
                (&self.data + &lo, &self.data + &hi)
            }
        }
    }
}
