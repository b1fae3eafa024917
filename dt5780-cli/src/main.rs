//! DT5780 list-mode converter CLI application.
//!
//! Converts CAEN DT5780 binary list-mode files to columnar or CSV output.

use anyhow::{Context, Result};
use clap::Parser;
use dt5780_core::{convert, Config, ConvertError, FormatFlags, OutputFormat};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Instant;
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// CAEN DT5780 list-mode file converter.
///
/// Decodes the flat binary record stream written by the digitizer and stores
/// one row per record in a columnar (.dtc) or CSV (.csv) file.
#[derive(Parser, Debug)]
#[command(name = "dt5780")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Input list-mode file path
    #[arg(value_name = "INPUT")]
    input: PathBuf,

    /// Output file path (.dtc, .csv)
    ///
    /// The output format is determined by the file extension unless
    /// --format is given:
    /// - .dtc / .col / .bin: columnar store
    /// - .csv: comma-separated values
    #[arg(value_name = "OUTPUT")]
    output: PathBuf,

    /// Records carry a calibrated energy field
    ///
    /// Must match how the file was written: decoding with the wrong
    /// setting misaligns every field after the first record's charge.
    #[arg(long)]
    calibrated: bool,

    /// Keep waveform samples in the output
    #[arg(short, long)]
    waveform: bool,

    /// TOML file with a [format] table (calibrated, write_waveform)
    ///
    /// Command-line flags take precedence over the file.
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Output format (csv, columnar); overrides the output extension
    #[arg(short, long)]
    format: Option<String>,

    /// Suppress progress output
    #[arg(short, long)]
    quiet: bool,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

fn init_logging(debug: bool) -> Result<()> {
    let level = if debug { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive(format!("dt5780_core={level}").parse()?),
        )
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

fn resolve_flags(args: &Args) -> Result<FormatFlags> {
    let config = match &args.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("Failed to load config {:?}", path))?,
        None => Config::default(),
    };
    debug!(?config, "Resolved configuration");

    let mut flags = config.format_flags();
    flags.calibrated |= args.calibrated;
    flags.write_waveform |= args.waveform;
    Ok(flags)
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.debug)?;

    let flags = resolve_flags(&args)?;

    let format = match &args.format {
        Some(name) => OutputFormat::from_str(name).context("Invalid output format")?,
        None => OutputFormat::from_path(&args.output)
            .context("Unsupported output extension. Use .dtc or .csv, or pass --format")?,
    };

    // Setup progress bar
    let progress = if args.quiet {
        ProgressBar::hidden()
    } else {
        let pb = ProgressBar::new(0);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {percent}% {pos}/{len} words {msg}")?
                .progress_chars("=> "),
        );
        pb.set_message(format!(
            "Decoding {:?}...",
            args.input.file_name().unwrap_or_default()
        ));
        pb
    };

    let start_time = Instant::now();

    let result = convert(&args.input, &args.output, format, flags, |p| {
        progress.set_length(p.words_total as u64);
        progress.set_position(p.words_read as u64);
        progress.set_message(format!("{} records", p.records));
    });

    let summary = match result {
        Ok(summary) => summary,
        Err(err) => {
            progress.abandon_with_message("failed");
            if let ConvertError::Framing(decode) = &err {
                if let Some(offset) = decode.byte_offset() {
                    eprintln!(
                        "hint: framing error at byte offset {}; check that --calibrated matches the acquisition settings",
                        offset
                    );
                }
            }
            return Err(anyhow::Error::new(err).context(format!(
                "Failed to convert {:?}",
                args.input.file_name().unwrap_or_default()
            )));
        }
    };

    let total_duration = start_time.elapsed();

    progress.finish_with_message(format!(
        "Done! Decoded {} records in {:.2}s",
        summary.records,
        total_duration.as_secs_f64()
    ));

    if !args.quiet {
        // Print summary
        let records_per_sec = summary.records as f64 / total_duration.as_secs_f64();
        eprintln!();
        eprintln!("Summary:");
        eprintln!("  Input:        {:?}", args.input);
        eprintln!("  Output:       {:?}", args.output);
        eprintln!("  Records:      {}", summary.records);
        eprintln!("  Words read:   {}", summary.words);
        eprintln!("  Calibrated:   {}", summary.flags.calibrated);
        eprintln!("  Waveforms:    {}", summary.flags.write_waveform);
        eprintln!("  Duration:     {:.3}s", total_duration.as_secs_f64());
        eprintln!("  Throughput:   {:.0} records/s", records_per_sec);
    }

    Ok(())
}
