#![deny(unused_must_use)]

use clap::Parser;
use datarando::analysis::PrecomputedOracle;
use datarando::datarando::{DataRando, Options};
use datarando::il;
use datarando::Error;
use log::{info, LevelFilter, Log, Metadata, Record};
use serde::Deserialize;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process;

/// A module to randomize, with the points-to results for it.
#[derive(Deserialize)]
struct Job {
    module: il::Module,
    #[serde(flatten)]
    oracle: PrecomputedOracle,
    #[serde(default)]
    options: Options,
}

#[derive(Parser)]
#[command(name = "datarando", about = "Randomize the data representation of an IL module")]
struct Args {
    /// JSON job holding `module`, `points_to`, and optionally `call_graph`
    /// and `options`.
    job: PathBuf,

    /// Where to write the randomized module. Defaults to stdout.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Write the masks and statistics of the run as JSON.
    #[arg(long)]
    report: Option<PathBuf>,

    #[arg(long)]
    seed: Option<u64>,

    #[arg(long)]
    salt: Option<String>,

    #[arg(long)]
    effective_mask_size: Option<u64>,

    /// Leave classes holding only private, constant addresses unmasked.
    #[arg(long)]
    safety_analysis: bool,

    #[arg(long)]
    always_emit_mask_alignment: bool,

    #[arg(long)]
    print_equivalence_classes_to: Option<PathBuf>,

    #[arg(long)]
    print_usage_counts_to: Option<PathBuf>,

    #[arg(long)]
    print_allocation_counts: bool,

    #[arg(long)]
    max_fixed_point_iterations: Option<usize>,

    /// Repeat for more output.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Args {
    fn apply(&self, options: &mut Options) {
        if let Some(seed) = self.seed {
            options.set_seed(seed);
        }
        if let Some(ref salt) = self.salt {
            options.set_salt(Some(salt.clone()));
        }
        if let Some(size) = self.effective_mask_size {
            options.set_effective_mask_size(size);
        }
        if self.safety_analysis {
            options.set_safety_analysis(true);
        }
        if self.always_emit_mask_alignment {
            options.set_always_emit_mask_alignment(true);
        }
        if self.print_equivalence_classes_to.is_some() {
            options.set_print_equivalence_classes_to(self.print_equivalence_classes_to.clone());
        }
        if self.print_usage_counts_to.is_some() {
            options.set_print_usage_counts_to(self.print_usage_counts_to.clone());
        }
        if self.print_allocation_counts {
            options.set_print_allocation_counts(true);
        }
        if let Some(iterations) = self.max_fixed_point_iterations {
            options.set_max_fixed_point_iterations(iterations);
        }
    }

    fn level(&self) -> LevelFilter {
        match self.verbose {
            0 => LevelFilter::Warn,
            1 => LevelFilter::Info,
            2 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    }
}

struct StderrLogger;

impl Log for StderrLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            eprintln!("{} - {}", record.level(), record.args());
        }
    }

    fn flush(&self) {}
}

static LOGGER: StderrLogger = StderrLogger;

fn write_json<T: serde::Serialize>(path: Option<&Path>, value: &T) -> Result<(), Error> {
    match path {
        Some(path) => {
            let mut writer = BufWriter::new(File::create(path)?);
            serde_json::to_writer_pretty(&mut writer, value)?;
            writer.flush()?;
        }
        None => {
            let stdout = std::io::stdout();
            let mut writer = stdout.lock();
            serde_json::to_writer_pretty(&mut writer, value)?;
            writeln!(writer)?;
        }
    }
    Ok(())
}

fn run(args: Args) -> Result<(), Error> {
    let job: Job = serde_json::from_reader(BufReader::new(File::open(&args.job)?))?;
    let Job {
        mut module,
        oracle,
        mut options,
    } = job;
    args.apply(&mut options);

    info!("Randomizing {}", module.name());
    let report = DataRando::new(options)?.run(&mut module, &oracle)?;

    write_json(args.output.as_deref(), &module)?;
    if let Some(ref path) = args.report {
        write_json(Some(path), &report)?;
    }
    Ok(())
}

fn main() {
    let args = Args::parse();
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(args.level());
    }

    if let Err(error) = run(args) {
        eprintln!("datarando: {}", error);
        process::exit(1);
    }
}
