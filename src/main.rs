//! nmr-nus: NUS reconstruction (IST, GRINS) and convolution peak picking
//! for NMRPipe data.

#![allow(dead_code)]

mod data;
mod log;
mod pipeline;

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::data::{PipeDataset, PipeFile};
use crate::log::ReproLog;
use crate::pipeline::reconstruct::{self, Layout};
use crate::pipeline::{load_params, picking};
use nus_core::SampleSchedule;
use nus_pick::PickConfig;
use nus_recon::{CutoffMode, GrinsConfig, IstConfig};

#[derive(Parser)]
#[command(
    name = "nmr-nus",
    version,
    about = "Reconstruct non-uniformly sampled NMR data and pick peaks"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Write a reproducibility log (.txt, .json or .sh by extension)
    #[arg(long, global = true)]
    repro_log: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Iterative soft thresholding reconstruction
    Ist(IstArgs),
    /// Iterative peak detection and lineshape subtraction
    Grins(GrinsArgs),
    /// Convolution peak picking of a spectrum
    Pick(PickArgs),
    /// Print a Poisson-gap sampling schedule
    Schedule(ScheduleArgs),
}

#[derive(Clone, Copy, ValueEnum)]
enum ModeArg {
    Abs,
    Phased,
    PhasedPositive,
}

impl From<ModeArg> for CutoffMode {
    fn from(m: ModeArg) -> Self {
        match m {
            ModeArg::Abs => CutoffMode::Abs,
            ModeArg::Phased => CutoffMode::Phased,
            ModeArg::PhasedPositive => CutoffMode::PhasedPositive,
        }
    }
}

fn mode_name(mode: CutoffMode) -> &'static str {
    match mode {
        CutoffMode::Abs => "abs",
        CutoffMode::Phased => "phased",
        CutoffMode::PhasedPositive => "phased-positive",
    }
}

#[derive(Args)]
struct IstArgs {
    /// Input NMRPipe time-domain file, unsampled points zero
    #[arg(short, long)]
    r#in: PathBuf,

    /// nuslist with one acquired point per line
    #[arg(short, long)]
    schedule: PathBuf,

    /// Output NMRPipe file
    #[arg(short, long)]
    out: PathBuf,

    /// JSON parameter file; flags override it
    #[arg(long)]
    params: Option<PathBuf>,

    /// Fraction of the largest coefficient kept per pass
    #[arg(long)]
    threshold: Option<f64>,

    #[arg(long)]
    loops: Option<usize>,

    #[arg(long, value_enum)]
    mode: Option<ModeArg>,

    /// Decay the threshold toward 0.5 after iteration 50
    #[arg(long, default_value_t = false)]
    adaptive: bool,

    /// Write the frequency-domain result instead of time domain
    #[arg(long, default_value_t = false)]
    freq: bool,
}

#[derive(Args)]
struct GrinsArgs {
    /// Input NMRPipe time-domain file, unsampled points zero
    #[arg(short, long)]
    r#in: PathBuf,

    #[arg(short, long)]
    schedule: PathBuf,

    #[arg(short, long)]
    out: PathBuf,

    #[arg(long)]
    params: Option<PathBuf>,

    /// Noise level; 0 estimates it
    #[arg(long)]
    noise: Option<f64>,

    /// Fraction of each detected amplitude subtracted per pass
    #[arg(long)]
    scale: Option<f64>,

    /// Add the detected lines to the residual instead of replacing it
    #[arg(long, default_value_t = false)]
    preserve: bool,

    /// Keep the model at measured points
    #[arg(long, default_value_t = false)]
    synthetic: bool,

    /// Per-iteration diagnostic log
    #[arg(long)]
    diag: Option<PathBuf>,
}

#[derive(Args)]
struct PickArgs {
    /// Input NMRPipe spectrum (1D or 2D)
    #[arg(short, long)]
    r#in: PathBuf,

    #[arg(long)]
    params: Option<PathBuf>,

    #[arg(long)]
    threshold: Option<f64>,

    #[arg(long)]
    iterations: Option<usize>,

    /// Line width in points; once, or once per dimension
    #[arg(long = "width")]
    widths: Vec<f64>,

    #[arg(long)]
    squash: Option<f64>,

    #[arg(long)]
    workers: Option<usize>,

    /// Peak list output (JSON)
    #[arg(short, long)]
    out: Option<PathBuf>,

    /// Also print the per-region fit ratios
    #[arg(long, default_value_t = false)]
    ratios: bool,
}

#[derive(Args)]
struct ScheduleArgs {
    /// Grid size
    #[arg(long)]
    size: usize,

    /// Number of acquired points
    #[arg(long)]
    samples: usize,

    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// Output file (stdout if omitted)
    #[arg(short, long)]
    out: Option<PathBuf>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_secs()
        .init();

    let cli = Cli::parse();
    ::log::info!("nmr-nus v{}", env!("CARGO_PKG_VERSION"));

    let mut repro = ReproLog::new();
    match cli.command {
        Command::Ist(args) => run_ist(args, &mut repro)?,
        Command::Grins(args) => run_grins(args, &mut repro)?,
        Command::Pick(args) => run_pick(args, &mut repro)?,
        Command::Schedule(args) => run_schedule(args, &mut repro)?,
    }

    if let Some(path) = &cli.repro_log {
        repro.save(path)?;
        ::log::info!("Reproducibility log written to {}", path.display());
    }
    Ok(())
}

fn load_input(path: &Path, schedule: &Path) -> Result<(PipeFile, SampleSchedule), Box<dyn std::error::Error>> {
    let file = PipeFile::read(path)?;
    let schedule = reconstruct::load_schedule(schedule, file.data.sizes())?;
    Ok((file, schedule))
}

fn run_ist(args: IstArgs, repro: &mut ReproLog) -> Result<(), Box<dyn std::error::Error>> {
    let mut config: IstConfig = load_params(args.params.as_deref())?;
    if let Some(t) = args.threshold {
        config.threshold = t;
    }
    if let Some(l) = args.loops {
        config.loops = l;
    }
    if let Some(m) = args.mode {
        config.mode = m.into();
    }
    config.adaptive |= args.adaptive;
    config.time_domain = !args.freq;

    let (mut file, schedule) = load_input(&args.r#in, &args.schedule)?;
    let layout = reconstruct::layout(&schedule, &file.data)?;
    let reports = reconstruct::run_ist(&mut file.data, Arc::new(schedule), config.clone())?;
    if args.freq {
        match layout {
            Layout::Full => {
                for dim in 0..file.data.ndim() {
                    file.header.set_frequency_domain(dim, true);
                }
            }
            Layout::Columns => file.header.set_frequency_domain(0, true),
        }
    }
    file.write(&args.out)?;

    let iterations: usize = reports.iter().map(|r| r.iterations()).sum();
    let mut command = format!(
        "nmr-nus ist --in {} --schedule {} --out {} --threshold {} --loops {} --mode {}",
        args.r#in.display(),
        args.schedule.display(),
        args.out.display(),
        config.threshold,
        config.loops,
        mode_name(config.mode)
    );
    if config.adaptive {
        command.push_str(" --adaptive");
    }
    if args.freq {
        command.push_str(" --freq");
    }
    repro.add_source(&args.r#in.display().to_string());
    repro.add_entry(
        "IST",
        &format!("{} vectors, {} iterations in total", reports.len(), iterations),
        &command,
        &config,
    );
    Ok(())
}

fn run_grins(args: GrinsArgs, repro: &mut ReproLog) -> Result<(), Box<dyn std::error::Error>> {
    let mut config: GrinsConfig = load_params(args.params.as_deref())?;
    if let Some(n) = args.noise {
        config.noise = n;
    }
    if let Some(s) = args.scale {
        config.scale = s;
    }
    config.preserve |= args.preserve;
    config.synthetic |= args.synthetic;

    let (mut file, schedule) = load_input(&args.r#in, &args.schedule)?;
    let mut diag = match &args.diag {
        Some(p) => Some(BufWriter::new(File::create(p)?)),
        None => None,
    };
    let report = reconstruct::run_grins(
        &mut file.data,
        Arc::new(schedule),
        config.clone(),
        diag.as_mut().map(|w| w as &mut dyn Write),
    )?;
    if let Some(w) = diag.as_mut() {
        w.flush()?;
    }
    file.write(&args.out)?;

    let mut command = format!(
        "nmr-nus grins --in {} --schedule {} --out {} --noise {} --scale {}",
        args.r#in.display(),
        args.schedule.display(),
        args.out.display(),
        config.noise,
        config.scale
    );
    if config.preserve {
        command.push_str(" --preserve");
    }
    if config.synthetic {
        command.push_str(" --synthetic");
    }
    if let Some(p) = &args.diag {
        command.push_str(&format!(" --diag {}", p.display()));
    }
    repro.add_source(&args.r#in.display().to_string());
    repro.add_entry(
        "GRINS",
        &format!(
            "{} iterations, noise {:.4e}{}, difference {:.4e}",
            report.iterations.len(),
            report.noise,
            if report.stopped_on_noise { " (noise floor reached)" } else { "" },
            report.difference
        ),
        &command,
        &config,
    );
    Ok(())
}

fn run_pick(args: PickArgs, repro: &mut ReproLog) -> Result<(), Box<dyn std::error::Error>> {
    let mut config: PickConfig = load_params(args.params.as_deref())?;
    if let Some(t) = args.threshold {
        config.threshold = t;
    }
    if let Some(i) = args.iterations {
        config.iterations = i;
    }
    if !args.widths.is_empty() {
        config.widths = args.widths.clone();
    }
    if let Some(s) = args.squash {
        config.squash = s;
    }
    if let Some(w) = args.workers {
        config.workers = w;
    }

    let dataset = PipeDataset::open(&args.r#in)?;
    let list = picking::pick_dataset(&dataset, &dataset.name(), config.clone())?;

    let stdout = io::stdout();
    let mut out = stdout.lock();
    out.write_all(picking::peak_table(&list).as_bytes())?;
    if args.ratios {
        let fits = picking::fit_regions(&dataset, config.clone())?;
        out.write_all(b"\n")?;
        out.write_all(picking::region_table(&fits).as_bytes())?;
    }
    out.flush()?;
    if let Some(p) = &args.out {
        picking::save_peak_list(&list, p)?;
    }

    let widths: Vec<String> = config.widths.iter().map(|w| format!(" --width {}", w)).collect();
    let mut command = format!(
        "nmr-nus pick --in {} --threshold {} --iterations {}{} --squash {} --workers {}",
        args.r#in.display(),
        config.threshold,
        config.iterations,
        widths.concat(),
        config.squash,
        config.workers
    );
    if let Some(p) = &args.out {
        command.push_str(&format!(" --out {}", p.display()));
    }
    repro.add_source(&args.r#in.display().to_string());
    repro.add_entry("Pick", &format!("{} peaks", list.len()), &command, &config);
    Ok(())
}

fn run_schedule(args: ScheduleArgs, repro: &mut ReproLog) -> Result<(), Box<dyn std::error::Error>> {
    let schedule = SampleSchedule::poisson_gap(args.size, args.samples, args.seed)?;
    let text = schedule.to_text();
    match &args.out {
        Some(p) => std::fs::write(p, &text)?,
        None => io::stdout().lock().write_all(text.as_bytes())?,
    }

    let mut command = format!(
        "nmr-nus schedule --size {} --samples {} --seed {}",
        args.size, args.samples, args.seed
    );
    if let Some(p) = &args.out {
        command.push_str(&format!(" --out {}", p.display()));
    }
    repro.add_entry(
        "Schedule",
        &format!("Poisson-gap, {} of {} points", args.samples, args.size),
        &command,
        &(),
    );
    Ok(())
}
