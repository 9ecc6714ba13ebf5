use std::{
    fs::File,
    io::{self, BufReader, BufWriter, Write},
    path::PathBuf,
};

use clap::Parser;
use dift_analysis::{
    config::TaintConfig,
    report::{ReportFormat, ReportWriter},
    taint::Tracer,
};
use dift_core::{error::DiftError, trace::JsonLinesSource};
use dift_utils::{
    config::Config,
    log::{config::LogConfig, info, init_logging_with_config, must_init_logging},
};

/// Replay an instruction trace and report the memory addresses whose values
/// were later used to compute other addresses.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Arg {
    #[arg(help = "instruction trace, one JSON event per line")]
    trace: PathBuf,

    #[arg(short, long, help = "report file, stdout if unset")]
    output: Option<PathBuf>,

    #[arg(short, long, help = "console log level")]
    level: Option<String>,

    #[arg(long, help = "configuration file")]
    config: Option<PathBuf>,

    #[arg(long, help = "size of the color pool (1-64)")]
    colors: Option<usize>,

    #[arg(long, help = "instructions to execute before reporting")]
    warmup: Option<u64>,

    #[arg(long, help = "report format: csv or json")]
    format: Option<ReportFormat>,
}

fn main() -> Result<(), DiftError> {
    let args = Arg::parse();

    if args.config.is_none() && args.level.is_none() {
        must_init_logging();
    } else {
        let mut log_cfg = match &args.config {
            Some(path) => LogConfig::load_from_file(path, LogConfig::default())?,
            None => LogConfig::load_or(LogConfig::default())?,
        };
        if let Some(level) = args.level {
            log_cfg.console_level = level;
        }
        init_logging_with_config(log_cfg)?;
    }

    let mut cfg = match &args.config {
        Some(path) => TaintConfig::load_from_file(path, TaintConfig::default())?,
        None => TaintConfig::load_or(TaintConfig::default())?,
    };

    if let Some(colors) = args.colors {
        cfg.num_colors = colors;
    }
    if let Some(warmup) = args.warmup {
        cfg.warmup = warmup;
    }
    if let Some(format) = args.format {
        cfg.report_format = format;
    }
    if args.output.is_some() {
        cfg.output = args.output;
    }

    let mut tracer = Tracer::from_config(&cfg)?;
    let mut source = JsonLinesSource::new(BufReader::new(File::open(&args.trace)?));
    let out: Box<dyn Write> = match &cfg.output {
        Some(path) => Box::new(BufWriter::new(File::create(path)?)),
        None => Box::new(BufWriter::new(io::stdout().lock())),
    };
    let mut writer = ReportWriter::new(out, cfg.report_format);

    info!(
        trace = %args.trace.display(),
        colors = cfg.num_colors,
        warmup = cfg.warmup,
        format = %cfg.report_format,
        "start replaying trace"
    );
    tracer.run(&mut source, &mut writer)?;
    Ok(())
}
