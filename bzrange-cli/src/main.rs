//! bzrange - print a time range of log lines from a bzip2 file
//!
//! ```bash
//! bzrange --from '2017-02-21 14:53:22' --to '2017-02-21 15:00:00' --file app.log.bz2
//! ```
//!
//! Only the blocks around the range are decompressed. Output is whole
//! blocks, so it can start somewhat before `--from` and end somewhat after
//! `--to`. `--plan` prints where the range was found as JSON instead.

mod logging;

use anyhow::{Context, Result};
use bzrange_core::range::{ExtractConfig, RangeExtractor};
use bzrange_core::timestamp::ColumnPolicy;
use bzrange_core::RangeError;
use clap::Parser;
use logging::LogFormat;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "bzrange", version)]
#[command(about = "Extract a time range of log lines from a bzip2 file", long_about = None)]
struct Cli {
    /// Start of the range, e.g. "2017-02-21 14:53:22"
    #[arg(long)]
    from: String,

    /// End of the range, in the same format as --from
    #[arg(long)]
    to: String,

    /// bzip2-compressed log file
    #[arg(long)]
    file: PathBuf,

    /// Print the located blocks as JSON instead of extracting
    #[arg(long)]
    plan: bool,

    /// Byte column of the datetime in each line (detected from the first line
    /// by default)
    #[arg(long)]
    column: Option<usize>,

    /// Decode chunk size in bytes
    #[arg(long, default_value_t = bzrange_core::config::CHUNK_SIZE)]
    chunk_size: usize,

    /// Backward step in bytes when probing for the last block
    #[arg(long, default_value_t = bzrange_core::config::LAST_BLOCK_PROBE_STEP)]
    probe_step: u64,

    /// Log filter directives, used when BZRANGE_LOG and RUST_LOG are unset
    #[arg(long, default_value = "warn")]
    log_level: String,

    /// Diagnostic log layout
    #[arg(long, value_enum, default_value_t = LogFormat::Compact)]
    log_format: LogFormat,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::setup_logging(&cli.log_level, cli.log_format);

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("bzrange: {:#}", e);
            let code = e
                .downcast_ref::<RangeError>()
                .map_or(1, RangeError::exit_code);
            ExitCode::from(code)
        }
    }
}

fn run(cli: &Cli) -> Result<()> {
    let config = ExtractConfig {
        chunk_size: cli.chunk_size,
        probe_step: cli.probe_step,
        correction_stride: cli.chunk_size as u64,
        column: cli.column.map_or(ColumnPolicy::Detect, ColumnPolicy::Fixed),
    };
    let extractor = RangeExtractor::new(config)?;

    let file = File::open(&cli.file)
        .with_context(|| format!("failed to open {}", cli.file.display()))?;
    info!("Extracting {} .. {} from {}", cli.from, cli.to, cli.file.display());

    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());

    if cli.plan {
        let report = extractor.plan(file, &cli.from, &cli.to)?;
        serde_json::to_writer_pretty(&mut out, &report)?;
        writeln!(out)?;
    } else {
        extractor.extract(file, &cli.from, &cli.to, &mut out)?;
    }

    out.flush()?;
    Ok(())
}
