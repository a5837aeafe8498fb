use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::PathBuf;

use evoked::{
    io::{save_evoked, BlobSource},
    read_events, AverageConfig, Baseline, EpochConfig, ErrorModel, Interp, RawCache, Selector,
};

#[derive(Parser)]
#[command(
    name = "evoked_avg",
    about = "Average event-locked responses from recording blobs and stimulus timing files"
)]
struct Args {
    /// Per-run recording blob (repeat once per run, in run order)
    #[arg(long = "raw", required = true)]
    raws: Vec<PathBuf>,

    /// Timing file as NAME=PATH, one per condition (repeatable);
    /// NAME may be a composite label like Physical/Left
    #[arg(long = "timing", required = true)]
    timings: Vec<String>,

    /// Evoked blob output path
    #[arg(long)]
    output: PathBuf,

    /// Optional recording-cache blob (loaded verbatim when it exists)
    #[arg(long)]
    cache: Option<PathBuf>,

    /// Optional epochs-cache blob (loaded verbatim when it exists)
    #[arg(long)]
    epochs_cache: Option<PathBuf>,

    /// Window start relative to onset, seconds
    #[arg(long, default_value_t = -5.0, allow_hyphen_values = true)]
    tmin: f64,

    /// Window end relative to onset, seconds
    #[arg(long, default_value_t = 15.0)]
    tmax: f64,

    /// Relative-time grid step, seconds
    #[arg(long, default_value_t = 0.1)]
    dt: f64,

    /// Interpolation: nearest, linear, or cubic
    #[arg(long, default_value = "linear")]
    interp: String,

    /// Odd length of a Hamming smoothing kernel applied before extraction
    #[arg(long)]
    hamm: Option<usize>,

    /// Baseline: "none", "all", or "LO:HI" in seconds (empty bound = grid edge)
    #[arg(long, default_value = "-2:0", allow_hyphen_values = true)]
    baseline: String,

    /// Restrict averaging to labels matching this name (e.g. "Physical")
    #[arg(long)]
    pick: Option<String>,

    /// Bootstrap confidence level in percent
    #[arg(long, default_value_t = 95.0)]
    ci: f64,

    /// Bootstrap resample count
    #[arg(long, default_value_t = 1000)]
    n_boot: usize,

    /// Bootstrap RNG seed (omit for entropy)
    #[arg(long)]
    seed: Option<u64>,
}

fn parse_interp(s: &str) -> Result<Interp> {
    match s {
        "nearest" => Ok(Interp::Nearest),
        "linear" => Ok(Interp::Linear),
        "cubic" => Ok(Interp::Cubic),
        other => bail!("unknown interpolation '{other}'"),
    }
}

fn parse_baseline(s: &str) -> Result<Baseline> {
    match s {
        "none" => Ok(Baseline::None),
        "all" => Ok(Baseline::All),
        other => {
            let (lo, hi) = other
                .split_once(':')
                .with_context(|| format!("baseline '{other}' is not none, all, or LO:HI"))?;
            let bound = |b: &str| -> Result<Option<f64>> {
                if b.is_empty() {
                    Ok(None)
                } else {
                    Ok(Some(b.parse().with_context(|| format!("bad baseline bound '{b}'"))?))
                }
            };
            Ok(Baseline::Window(bound(lo)?, bound(hi)?))
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    let timing: Vec<(String, String)> = args
        .timings
        .iter()
        .map(|t| {
            t.split_once('=')
                .map(|(n, p)| (n.to_string(), p.to_string()))
                .with_context(|| format!("timing '{t}' is not NAME=PATH"))
        })
        .collect::<Result<_>>()?;
    let (events, event_id) = read_events(&timing)?;
    println!(
        "{} conditions over {} runs",
        event_id.len(),
        events.len()
    );

    // Mask comes from the first recording: keep every feature.
    let (first, _) = evoked::load_raw_array(&args.raws[0])?;
    let mask = vec![true; first.nrows()];
    let ids: Vec<String> = args
        .raws
        .iter()
        .map(|p| p.to_string_lossy().into_owned())
        .collect();
    let cache = RawCache::new(&BlobSource, &ids, mask, args.cache.as_deref())?;
    println!("Cached {} recordings", cache.n_runs());

    let cfg = EpochConfig {
        tmin: args.tmin,
        tmax: args.tmax,
        dt: args.dt,
        interp: parse_interp(&args.interp)?,
        hamm: args.hamm,
        baseline: parse_baseline(&args.baseline)?,
        conditions: None,
    };
    let epochs = cache.get_epochs(&events, &event_id, &cfg, args.epochs_cache.as_deref())?;
    println!(
        "Extracted {} epochs x {} features x {} samples",
        epochs.n_events(),
        epochs.n_features(),
        epochs.n_times()
    );

    let picked = match &args.pick {
        None => epochs,
        Some(label) => epochs.pick(
            &Selector::Labels(vec![label.clone()]),
            &Selector::All,
            &Selector::All,
        )?,
    };

    let avg_cfg = AverageConfig {
        error: ErrorModel::Bootstrap { ci: args.ci, n_boot: args.n_boot },
        condition: args.pick.clone(),
        seed: args.seed,
        ..AverageConfig::default()
    };
    let evoked = picked.average(&avg_cfg)?;
    println!("Averaged {} events", evoked.nave);

    save_evoked(&evoked, &args.output)?;
    println!("Written -> {}", args.output.display());

    Ok(())
}
