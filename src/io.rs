//! Cache and interchange blobs.
//!
//! All on-disk artifacts share one safetensors-compatible container: a
//! little-endian `u64` header length, a JSON header mapping entry names
//! to `{dtype, shape, data_offsets}`, then the concatenated entry
//! bytes. Numeric tensors are F64; structured metadata rides along as a
//! U8 entry holding JSON. Anything unreadable in a blob is
//! [`Error::CorruptCache`]; a corrupt blob is never silently rebuilt.
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use ndarray::{Array2, Array3, ArrayD, Axis, IxDyn};
use serde_json::{json, Value};

use crate::config::{Baseline, Interp};
use crate::epochs::{Epochs, EpochsInfo};
use crate::error::{Error, Result};
use crate::events::EventId;
use crate::evoked::{ErrorEnvelope, Evoked};
use crate::raw::{Raw, RawCache, RawSource};

fn corrupt(path: &Path, reason: impl Into<String>) -> Error {
    Error::CorruptCache { path: path.to_path_buf(), reason: reason.into() }
}

// ── Container writer ──────────────────────────────────────────────────────────

pub(crate) struct BlobWriter {
    entries: Vec<(String, Vec<u8>, &'static str, Vec<usize>)>,
}

impl BlobWriter {
    pub(crate) fn new() -> Self {
        Self { entries: Vec::new() }
    }

    pub(crate) fn add_f64<I: IntoIterator<Item = f64>>(
        &mut self,
        name: &str,
        data: I,
        shape: Vec<usize>,
    ) {
        let bytes: Vec<u8> = data.into_iter().flat_map(|v| v.to_le_bytes()).collect();
        self.entries.push((name.to_string(), bytes, "F64", shape));
    }

    pub(crate) fn add_json(&mut self, name: &str, value: &Value) -> Result<()> {
        let bytes = serde_json::to_vec(value)?;
        let len = bytes.len();
        self.entries.push((name.to_string(), bytes, "U8", vec![len]));
        Ok(())
    }

    pub(crate) fn write(&self, path: &Path) -> Result<()> {
        use std::io::Write;
        let mut header_map = serde_json::Map::new();
        let mut offset: usize = 0;
        for (name, data, dtype, shape) in &self.entries {
            header_map.insert(
                name.clone(),
                json!({
                    "dtype": dtype,
                    "shape": shape,
                    "data_offsets": [offset, offset + data.len()],
                }),
            );
            offset += data.len();
        }
        let hdr_bytes = serde_json::to_vec(&header_map)?;
        let pad = (8 - hdr_bytes.len() % 8) % 8;
        let padded: Vec<u8> = hdr_bytes
            .into_iter()
            .chain(std::iter::repeat(b' ').take(pad))
            .collect();
        let mut f = fs::File::create(path)?;
        f.write_all(&(padded.len() as u64).to_le_bytes())?;
        f.write_all(&padded)?;
        for (_, data, _, _) in &self.entries {
            f.write_all(data)?;
        }
        Ok(())
    }
}

// ── Container reader ──────────────────────────────────────────────────────────

#[derive(Debug)]
pub(crate) struct Blob {
    path: PathBuf,
    header: serde_json::Map<String, Value>,
    data_start: usize,
    bytes: Vec<u8>,
}

impl Blob {
    pub(crate) fn open(path: &Path) -> Result<Self> {
        let bytes = fs::read(path)?;
        if bytes.len() < 8 {
            return Err(corrupt(path, "file shorter than the header length field"));
        }
        let n = u64::from_le_bytes(bytes[..8].try_into().unwrap()) as usize;
        if bytes.len() < 8 + n {
            return Err(corrupt(path, "header runs past end of file"));
        }
        let header: serde_json::Map<String, Value> = serde_json::from_slice(&bytes[8..8 + n])
            .map_err(|e| corrupt(path, format!("bad header JSON: {e}")))?;
        Ok(Self { path: path.to_path_buf(), header, data_start: 8 + n, bytes })
    }

    pub(crate) fn corrupt(&self, reason: impl Into<String>) -> Error {
        corrupt(&self.path, reason)
    }

    fn entry(&self, name: &str) -> Result<(&Value, &[u8])> {
        let entry = self
            .header
            .get(name)
            .ok_or_else(|| self.corrupt(format!("missing entry '{name}'")))?;
        let offs = entry
            .get("data_offsets")
            .and_then(Value::as_array)
            .ok_or_else(|| self.corrupt(format!("entry '{name}' has no data_offsets")))?;
        let (s, e) = match (offs.first().and_then(Value::as_u64), offs.get(1).and_then(Value::as_u64)) {
            (Some(s), Some(e)) if s <= e => (s as usize, e as usize),
            _ => return Err(self.corrupt(format!("entry '{name}' has bad data_offsets"))),
        };
        if self.data_start + e > self.bytes.len() {
            return Err(self.corrupt(format!("entry '{name}' runs past end of file")));
        }
        Ok((entry, &self.bytes[self.data_start + s..self.data_start + e]))
    }

    pub(crate) fn f64_tensor(&self, name: &str) -> Result<(Vec<f64>, Vec<usize>)> {
        let (entry, raw) = self.entry(name)?;
        let shape: Vec<usize> = entry
            .get("shape")
            .and_then(Value::as_array)
            .ok_or_else(|| self.corrupt(format!("entry '{name}' has no shape")))?
            .iter()
            .map(|v| v.as_u64().map(|u| u as usize))
            .collect::<Option<_>>()
            .ok_or_else(|| self.corrupt(format!("entry '{name}' has a bad shape")))?;
        let n: usize = shape.iter().product();
        if raw.len() != n * 8 {
            return Err(self.corrupt(format!(
                "entry '{name}' holds {} bytes for shape {shape:?}",
                raw.len()
            )));
        }
        let data = raw
            .chunks_exact(8)
            .map(|b| f64::from_le_bytes(b.try_into().unwrap()))
            .collect();
        Ok((data, shape))
    }

    pub(crate) fn json(&self, name: &str) -> Result<Value> {
        let (_, raw) = self.entry(name)?;
        serde_json::from_slice(raw)
            .map_err(|e| self.corrupt(format!("entry '{name}' is not valid JSON: {e}")))
    }
}

// ── Single-recording blobs ────────────────────────────────────────────────────

/// Persist one `[features, times]` recording sampled every `tr` seconds.
pub fn save_raw_array(data: &Array2<f64>, tr: f64, path: &Path) -> Result<()> {
    let mut w = BlobWriter::new();
    w.add_f64("data", data.iter().copied(), vec![data.nrows(), data.ncols()]);
    w.add_json("meta", &json!({ "tr": tr }))?;
    w.write(path)
}

/// Read back a recording written by [`save_raw_array`].
pub fn load_raw_array(path: &Path) -> Result<(Array2<f64>, f64)> {
    let blob = Blob::open(path)?;
    let (v, shape) = blob.f64_tensor("data")?;
    if shape.len() != 2 {
        return Err(blob.corrupt("recording tensor is not 2-dimensional"));
    }
    let data = Array2::from_shape_vec((shape[0], shape[1]), v)
        .map_err(|e| blob.corrupt(e.to_string()))?;
    let meta = blob.json("meta")?;
    let tr = meta
        .get("tr")
        .and_then(Value::as_f64)
        .ok_or_else(|| blob.corrupt("meta is missing 'tr'"))?;
    Ok((data, tr))
}

/// [`RawSource`] over per-run recording blobs; the source id is the
/// file path.
pub struct BlobSource;

impl RawSource for BlobSource {
    fn read(&self, id: &str, mask: &[bool]) -> Result<(Array2<f64>, f64)> {
        let (data, tr) = load_raw_array(Path::new(id))?;
        if mask.len() != data.nrows() {
            return Err(Error::ShapeInvariantViolation(format!(
                "mask has {} entries for {} features in '{id}'",
                mask.len(),
                data.nrows()
            )));
        }
        let rows: Vec<usize> = mask
            .iter()
            .enumerate()
            .filter_map(|(i, &k)| k.then_some(i))
            .collect();
        Ok((data.select(Axis(0), &rows), tr))
    }
}

// ── Recording-cache blobs ─────────────────────────────────────────────────────

impl RawCache {
    /// Persist every cached recording plus the shared mask.
    pub fn save(&self, path: &Path) -> Result<()> {
        let mut w = BlobWriter::new();
        for (i, raw) in self.raws.iter().enumerate() {
            w.add_f64(
                &format!("run_{i}"),
                raw.data().iter().copied(),
                vec![raw.n_features(), raw.n_times()],
            );
        }
        let meta = json!({
            "mask": self.mask,
            "trs": self.raws.iter().map(Raw::tr).collect::<Vec<_>>(),
        });
        w.add_json("meta", &meta)?;
        w.write(path)
    }

    /// Read back a cache written by [`Self::save`].
    pub fn load(path: &Path) -> Result<RawCache> {
        let blob = Blob::open(path)?;
        let meta = blob.json("meta")?;
        let mask: Vec<bool> = meta
            .get("mask")
            .cloned()
            .map(serde_json::from_value)
            .transpose()
            .map_err(|e| blob.corrupt(format!("meta field 'mask': {e}")))?
            .ok_or_else(|| blob.corrupt("meta is missing 'mask'"))?;
        let trs: Vec<f64> = meta
            .get("trs")
            .cloned()
            .map(serde_json::from_value)
            .transpose()
            .map_err(|e| blob.corrupt(format!("meta field 'trs': {e}")))?
            .ok_or_else(|| blob.corrupt("meta is missing 'trs'"))?;
        let mut raws = Vec::with_capacity(trs.len());
        for (i, &tr) in trs.iter().enumerate() {
            let (v, shape) = blob.f64_tensor(&format!("run_{i}"))?;
            if shape.len() != 2 {
                return Err(blob.corrupt(format!("run_{i} tensor is not 2-dimensional")));
            }
            let data = Array2::from_shape_vec((shape[0], shape[1]), v)
                .map_err(|e| blob.corrupt(e.to_string()))?;
            raws.push(Raw::from_parts(Arc::new(data), tr, vec![true; shape[0]]));
        }
        Ok(RawCache { mask, raws })
    }
}

// ── Epochs blobs ──────────────────────────────────────────────────────────────

fn baseline_to_json(b: Baseline) -> Value {
    match b {
        Baseline::None => json!({ "kind": "none" }),
        Baseline::All => json!({ "kind": "all" }),
        Baseline::Window(lo, hi) => json!({ "kind": "window", "lo": lo, "hi": hi }),
    }
}

fn baseline_from_json(v: &Value) -> Option<Baseline> {
    match v.get("kind")?.as_str()? {
        "none" => Some(Baseline::None),
        "all" => Some(Baseline::All),
        "window" => {
            let bound = |k: &str| match v.get(k) {
                None | Some(Value::Null) => Some(None),
                Some(x) => x.as_f64().map(Some),
            };
            Some(Baseline::Window(bound("lo")?, bound("hi")?))
        }
        _ => None,
    }
}

fn interp_to_json(i: Option<Interp>) -> Value {
    match i {
        None => Value::Null,
        Some(Interp::Nearest) => json!("nearest"),
        Some(Interp::Linear) => json!("linear"),
        Some(Interp::Cubic) => json!("cubic"),
    }
}

fn interp_from_json(v: &Value) -> Option<Option<Interp>> {
    match v {
        Value::Null => Some(None),
        Value::String(s) => match s.as_str() {
            "nearest" => Some(Some(Interp::Nearest)),
            "linear" => Some(Some(Interp::Linear)),
            "cubic" => Some(Some(Interp::Cubic)),
            _ => None,
        },
        _ => None,
    }
}

impl Epochs {
    /// Persist the full collection: tensor, events, grid, dictionary,
    /// metadata.
    pub fn save(&self, path: &Path) -> Result<()> {
        let mut w = BlobWriter::new();
        w.add_f64("data", self.data.iter().copied(), self.data.shape().to_vec());
        w.add_f64(
            "events",
            self.events.iter().copied(),
            vec![self.events.nrows(), self.events.ncols()],
        );
        w.add_f64("times", self.times.iter().copied(), vec![self.times.len()]);
        let info = &self.info;
        let meta = json!({
            "event_id": self.event_id.iter().collect::<Vec<(&str, i64)>>(),
            "info": {
                "sfreq": info.sfreq,
                "tmin": info.tmin,
                "tmax": info.tmax,
                "baseline": baseline_to_json(info.baseline),
                "interp": interp_to_json(info.interp),
                "hamm": info.hamm,
                "conditions": info.conditions,
                "condition": info.condition,
                "feature_name": info.feature_name,
                "value_name": info.value_name,
            },
        });
        w.add_json("meta", &meta)?;
        w.write(path)
    }

    /// Read back a collection written by [`Self::save`].
    pub fn load(path: &Path) -> Result<Epochs> {
        let blob = Blob::open(path)?;

        let (v, shape) = blob.f64_tensor("data")?;
        if shape.len() != 3 {
            return Err(blob.corrupt("epochs tensor is not 3-dimensional"));
        }
        let data = Array3::from_shape_vec((shape[0], shape[1], shape[2]), v)
            .map_err(|e| blob.corrupt(e.to_string()))?;

        let (v, shape) = blob.f64_tensor("events")?;
        if shape.len() != 2 {
            return Err(blob.corrupt("events tensor is not 2-dimensional"));
        }
        let events = Array2::from_shape_vec((shape[0], shape[1]), v)
            .map_err(|e| blob.corrupt(e.to_string()))?;

        let (times, _) = blob.f64_tensor("times")?;

        let meta = blob.json("meta")?;
        let pairs: Vec<(String, i64)> = meta
            .get("event_id")
            .cloned()
            .map(serde_json::from_value)
            .transpose()
            .map_err(|e| blob.corrupt(format!("meta field 'event_id': {e}")))?
            .ok_or_else(|| blob.corrupt("meta is missing 'event_id'"))?;
        let event_id = EventId::from_pairs(pairs);

        let iv = meta
            .get("info")
            .ok_or_else(|| blob.corrupt("meta is missing 'info'"))?;
        let num = |k: &str| {
            iv.get(k)
                .and_then(Value::as_f64)
                .ok_or_else(|| blob.corrupt(format!("info field '{k}'")))
        };
        let opt = |k: &str| -> Result<Value> {
            Ok(iv.get(k).cloned().unwrap_or(Value::Null))
        };
        let baseline = baseline_from_json(&opt("baseline")?)
            .ok_or_else(|| blob.corrupt("info field 'baseline'"))?;
        let interp = interp_from_json(&opt("interp")?)
            .ok_or_else(|| blob.corrupt("info field 'interp'"))?;
        let hamm: Option<usize> = serde_json::from_value(opt("hamm")?)
            .map_err(|e| blob.corrupt(format!("info field 'hamm': {e}")))?;
        let conditions: Option<Vec<String>> = serde_json::from_value(opt("conditions")?)
            .map_err(|e| blob.corrupt(format!("info field 'conditions': {e}")))?;
        let condition: Option<String> = serde_json::from_value(opt("condition")?)
            .map_err(|e| blob.corrupt(format!("info field 'condition': {e}")))?;
        let name = |k: &str| {
            iv.get(k)
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| blob.corrupt(format!("info field '{k}'")))
        };
        let info = EpochsInfo {
            sfreq: num("sfreq")?,
            tmin: num("tmin")?,
            tmax: num("tmax")?,
            baseline,
            interp,
            hamm,
            conditions,
            condition,
            feature_name: name("feature_name")?,
            value_name: name("value_name")?,
        };

        if events.nrows() != data.dim().0 || times.len() != data.dim().2 {
            return Err(blob.corrupt("tensor, events, and grid disagree in shape"));
        }
        Ok(Epochs { data, events, event_id, times, info })
    }
}

// ── Evoked blobs ──────────────────────────────────────────────────────────────

/// Persist an averaged response (the CLI's output format).
pub fn save_evoked(ev: &Evoked, path: &Path) -> Result<()> {
    let mut w = BlobWriter::new();
    w.add_f64("data", ev.data.iter().copied(), ev.data.shape().to_vec());
    w.add_f64("times", ev.times.iter().copied(), vec![ev.times.len()]);
    let error = match &ev.error {
        ErrorEnvelope::Bootstrap { ci, band } => {
            w.add_f64("band", band.iter().copied(), band.shape().to_vec());
            json!({ "kind": "bootstrap", "ci": ci })
        }
        ErrorEnvelope::Instance { deviations } => {
            w.add_f64("band", deviations.iter().copied(), deviations.shape().to_vec());
            json!({ "kind": "instance" })
        }
    };
    let meta = json!({
        "nave": ev.nave,
        "condition": ev.condition,
        "feature_name": ev.feature_name,
        "value_name": ev.value_name,
        "error": error,
    });
    w.add_json("meta", &meta)?;
    w.write(path)
}

/// Read back a response written by [`save_evoked`].
pub fn load_evoked(path: &Path) -> Result<Evoked> {
    let blob = Blob::open(path)?;
    let (v, shape) = blob.f64_tensor("data")?;
    let data = ArrayD::from_shape_vec(IxDyn(&shape), v)
        .map_err(|e| blob.corrupt(e.to_string()))?;
    let (times, _) = blob.f64_tensor("times")?;
    let (bv, bshape) = blob.f64_tensor("band")?;
    let band = ArrayD::from_shape_vec(IxDyn(&bshape), bv)
        .map_err(|e| blob.corrupt(e.to_string()))?;

    let meta = blob.json("meta")?;
    let nave = meta
        .get("nave")
        .and_then(Value::as_u64)
        .ok_or_else(|| blob.corrupt("meta is missing 'nave'"))? as usize;
    let condition: Option<String> =
        serde_json::from_value(meta.get("condition").cloned().unwrap_or(Value::Null))
            .map_err(|e| blob.corrupt(format!("meta field 'condition': {e}")))?;
    let name = |k: &str| {
        meta.get(k)
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| blob.corrupt(format!("meta field '{k}'")))
    };
    let errv = meta
        .get("error")
        .ok_or_else(|| blob.corrupt("meta is missing 'error'"))?;
    let error = match errv.get("kind").and_then(Value::as_str) {
        Some("bootstrap") => {
            let ci = errv
                .get("ci")
                .and_then(Value::as_f64)
                .ok_or_else(|| blob.corrupt("bootstrap error is missing 'ci'"))?;
            ErrorEnvelope::Bootstrap { ci, band }
        }
        Some("instance") => ErrorEnvelope::Instance { deviations: band },
        _ => return Err(blob.corrupt("meta field 'error'")),
    };
    Ok(Evoked {
        data,
        nave,
        times,
        error,
        condition,
        feature_name: name("feature_name")?,
        value_name: name("value_name")?,
    })
}
