//! Command-line driver: argument parsing, file framing, and the in-place
//! overwrite pattern (write a sibling temp file, then rename).

use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use log::info;
use structopt::StructOpt;

use arcwelder::{Welder, WelderConfig};

#[derive(Debug, StructOpt)]
#[structopt(
    name = "arcwelder",
    about = "Compress runs of short linear gcode moves into arc commands."
)]
struct Opt {
    /// Source gcode file.
    #[structopt(parse(from_os_str))]
    source: PathBuf,

    /// Target file. When omitted, the source is rewritten in place.
    #[structopt(parse(from_os_str))]
    target: Option<PathBuf>,

    /// Maximum deviation between the arc and the original path, in mm.
    #[structopt(long, default_value = "0.05")]
    resolution_mm: f64,

    /// Allowed relative error between arc length and polyline length.
    #[structopt(long, default_value = "0.05")]
    path_tolerance_percent: f64,

    /// Reject circles with a radius above this, in mm.
    #[structopt(long, default_value = "1000000")]
    max_radius_mm: f64,

    /// Permit Z changes within an arc (helical moves).
    #[structopt(long)]
    allow_3d_arcs: bool,

    /// Permit arcs with zero extrusion.
    #[structopt(long)]
    allow_travel_arcs: bool,

    /// Raise output precision to match observed input precision.
    #[structopt(long)]
    allow_dynamic_precision: bool,

    /// Fractional digits for X, Y, Z, I and J (3-6).
    #[structopt(long, default_value = "3")]
    default_xyz_precision: u8,

    /// Fractional digits for E (3-6).
    #[structopt(long, default_value = "5")]
    default_e_precision: u8,

    /// Tolerance on extrusion-per-mm variation inside an arc; 0 disables.
    #[structopt(long, default_value = "0.05")]
    extrusion_rate_variance_percent: f64,

    /// Split arcs so no emitted line exceeds this many bytes; 0 disables.
    #[structopt(long, default_value = "0")]
    max_gcode_length: usize,

    /// Treat G90/G91 as also switching the extruder axis mode.
    #[structopt(long)]
    g90_influences_extruder: bool,

    /// Minimum sampled points per candidate arc.
    #[structopt(long, default_value = "5")]
    min_arc_segments: usize,

    /// Rolling point buffer capacity.
    #[structopt(long, default_value = "50")]
    max_arc_segments: usize,

    /// Seconds between progress reports.
    #[structopt(long, default_value = "1.0")]
    progress_period_seconds: f64,

    /// Suppress progress reports.
    #[structopt(long, short)]
    quiet: bool,
}

impl Opt {
    fn config(&self) -> WelderConfig {
        WelderConfig {
            resolution_mm: self.resolution_mm,
            path_tolerance_percent: self.path_tolerance_percent,
            max_radius_mm: self.max_radius_mm,
            min_arc_segments: self.min_arc_segments,
            max_arc_segments: self.max_arc_segments,
            allow_3d_arcs: self.allow_3d_arcs,
            allow_travel_arcs: self.allow_travel_arcs,
            allow_dynamic_precision: self.allow_dynamic_precision,
            default_xyz_precision: self.default_xyz_precision,
            default_e_precision: self.default_e_precision,
            extrusion_rate_variance_percent: self.extrusion_rate_variance_percent,
            max_gcode_length: self.max_gcode_length,
            g90_g91_influences_extruder: self.g90_influences_extruder,
            notification_period_seconds: self.progress_period_seconds,
        }
    }
}

fn main() -> Result<()> {
    env_logger::init();
    let opt = Opt::from_args();
    run(&opt)
}

fn run(opt: &Opt) -> Result<()> {
    let source_size = fs::metadata(&opt.source)
        .with_context(|| format!("cannot read source `{}`", opt.source.display()))?
        .len();

    let in_place = opt.target.is_none();
    let target_path = opt.target.clone().unwrap_or_else(|| {
        let mut path = opt.source.clone().into_os_string();
        path.push(".welding");
        PathBuf::from(path)
    });
    if !in_place && target_path == opt.source {
        bail!("target must differ from the source; omit it to rewrite in place");
    }

    let source = BufReader::new(
        File::open(&opt.source)
            .with_context(|| format!("cannot open source `{}`", opt.source.display()))?,
    );
    let target = BufWriter::new(
        File::create(&target_path)
            .with_context(|| format!("cannot create target `{}`", target_path.display()))?,
    );

    let mut welder = Welder::new(opt.config())
        .context("invalid configuration")?
        .with_source_size(source_size);
    if !opt.quiet {
        welder = welder.with_progress(Box::new(|progress| {
            eprintln!("{progress}");
            true
        }));
    }

    let result = match welder.process(source, target) {
        Ok(result) => result,
        Err(err) => {
            // Leave no half-written temp file behind on a failed in-place run.
            if in_place {
                let _ = fs::remove_file(&target_path);
            }
            return Err(err).context("welding failed");
        }
    };

    if in_place {
        fs::rename(&target_path, &opt.source).with_context(|| {
            format!("cannot replace `{}` with the welded copy", opt.source.display())
        })?;
    }

    info!("{}", result.message);
    println!("{}", result.message);
    println!("{}", result.progress);
    if !opt.quiet {
        println!("source segments:\n{}", result.statistics.source_segments);
        println!("target segments:\n{}", result.statistics.target_segments);
    }
    Ok(())
}
