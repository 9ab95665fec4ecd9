use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::{Duration, Instant};

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use myzip_core::config::hardware_threads;
use myzip_core::format::scan_mode;
use myzip_core::{pack_archive, resolve, unpack_archive, ErrorKind, Mode, RunOptions};

// ── CLI definition ─────────────────────────────────────────────────────────

/// Command line of the template program.
#[derive(Parser)]
#[command(
    name = "myzip",
    about = "Compress a file into a self-extracting copy of this program",
    version
)]
struct PackCli {
    /// Compression level 0-9 (default 6)
    #[arg(short, long, allow_negative_numbers = true)]
    level: Option<i32>,
    /// Spend more CPU time for a smaller archive
    #[arg(short, long)]
    extreme: bool,
    /// Report progress and a summary on stderr
    #[arg(short, long)]
    verbose: bool,
    /// Upper bound on encoder threads (never above the hardware or 8)
    #[arg(short, long, env = "MYZIP_THREADS", allow_negative_numbers = true)]
    threads: Option<i32>,
    /// File to compress
    input: PathBuf,
    /// Self-extracting archive to create
    output: PathBuf,
}

/// Command line of a packed archive.
#[derive(Parser)]
#[command(
    name = "myzip",
    about = "Extract the file packed into this program",
    version
)]
struct UnpackCli {
    /// Report progress and a summary on stderr
    #[arg(short, long)]
    verbose: bool,
    /// Where to write the extracted file
    output: PathBuf,
}

// ── Helpers ────────────────────────────────────────────────────────────────

/// Filter used when `RUST_LOG` is unset. `myzip` is the binary's own target.
fn default_filter(verbose: bool) -> EnvFilter {
    let level = if verbose { "info" } else { "warn" };
    EnvFilter::new(format!(
        "myzip_core={level},myzip_codecs={level},myzip={level}"
    ))
}

fn init_logging(verbose: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter(verbose));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

fn human_bytes(n: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut v = n as f64;
    let mut unit = 0;
    while v >= 1024.0 && unit < UNITS.len() - 1 {
        v /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", n)
    } else {
        format!("{:.2} {}", v, UNITS[unit])
    }
}

/// Progress observer: `\rIn progress NN.NN%` on stderr when verbose.
fn progress_reporter(verbose: bool) -> impl FnMut(u64, u64) {
    move |current, total| {
        if !verbose {
            return;
        }
        let percent = if total == 0 {
            100.0
        } else {
            100.0 * current as f64 / total as f64
        };
        let mut stderr = io::stderr().lock();
        // Progress output is best effort.
        let _ = write!(stderr, "\rIn progress {:.2}%", percent);
        let _ = stderr.flush();
    }
}

/// Attach the failing stage to a core error. `markers` names the stage in
/// which a format error was raised.
fn stage_error(err: myzip_core::Error, action: &str, markers: &str) -> anyhow::Error {
    let stage = match err.kind() {
        ErrorKind::Format => markers,
        ErrorKind::Io => "file I/O",
        ErrorKind::Codec => "the compression backend",
    };
    anyhow::Error::new(err).context(format!("{} failed in {}", action, stage))
}

const PROGRAM_IMAGE: &str = "reading the program image";
const ARCHIVE_HEADER: &str = "reading the archive header";

/// Per-run options; `verbose` drives logging, progress and the summary block.
fn run_options(verbose: bool) -> RunOptions {
    RunOptions {
        verbose,
        ..RunOptions::default()
    }
}

fn clamp_level(level: i32) -> u8 {
    u8::try_from(level.max(0)).unwrap_or(u8::MAX)
}

/// Bytes per second, or 0 when no measurable time has passed.
fn throughput(bytes: u64, elapsed: Duration) -> u64 {
    let secs = elapsed.as_secs_f64();
    if secs > 0.0 {
        (bytes as f64 / secs) as u64
    } else {
        0
    }
}

// ── Mode implementations ───────────────────────────────────────────────────

fn run_pack(exe: &Path, cli: PackCli) -> anyhow::Result<()> {
    let options = run_options(cli.verbose);
    init_logging(options.verbose);

    let config = resolve(
        cli.level.map(clamp_level),
        cli.extreme,
        cli.threads,
        hardware_threads(),
    );
    tracing::debug!(?config, ?options, "resolved configuration");

    let image =
        std::fs::read(exe).with_context(|| format!("reading program image {:?}", exe))?;
    let mut encoder = myzip_codecs::encoder_for(&config)
        .map_err(|e| stage_error(e, "initializing the encoder", PROGRAM_IMAGE))?;

    let t0 = Instant::now();
    let result = pack_archive(
        image,
        &cli.input,
        &cli.output,
        &mut encoder,
        &options,
        progress_reporter(options.verbose),
    );
    if options.verbose {
        eprintln!();
    }
    let summary = result.map_err(|e| {
        stage_error(
            e,
            &format!("packing {:?} into {:?}", cli.input, cli.output),
            PROGRAM_IMAGE,
        )
    })?;
    let elapsed = t0.elapsed();

    tracing::info!(
        header_len = summary.header_len,
        input_len = summary.input_len,
        payload_len = summary.payload_len,
        "archive written"
    );
    if options.verbose {
        let ratio = if summary.payload_len == 0 {
            1.0
        } else {
            summary.input_len as f64 / summary.payload_len as f64
        };
        eprintln!("  level       : {}{}", config.level, if config.extreme { "e" } else { "" });
        eprintln!("  threads     : {}", config.threads);
        eprintln!("  raw size    : {}", human_bytes(summary.input_len));
        eprintln!("  compressed  : {}", human_bytes(summary.payload_len));
        eprintln!("  header      : {}", human_bytes(summary.header_len));
        eprintln!("  archive     : {}", human_bytes(summary.archive_len()));
        eprintln!("  ratio       : {:.2}x", ratio);
        eprintln!("  elapsed     : {:.3}s", elapsed.as_secs_f64());
    }
    Ok(())
}

fn run_unpack(exe: &Path, cli: UnpackCli) -> anyhow::Result<()> {
    let options = run_options(cli.verbose);
    init_logging(options.verbose);

    let mut decoder = myzip_codecs::decoder()
        .map_err(|e| stage_error(e, "initializing the decoder", ARCHIVE_HEADER))?;

    let t0 = Instant::now();
    let result = unpack_archive(
        exe,
        &cli.output,
        &mut decoder,
        &options,
        progress_reporter(options.verbose),
    );
    if options.verbose {
        eprintln!();
    }
    let summary = result.map_err(|e| {
        stage_error(e, &format!("extracting into {:?}", cli.output), ARCHIVE_HEADER)
    })?;
    let elapsed = t0.elapsed();

    tracing::info!(
        data_offset = summary.data_offset,
        payload_len = summary.payload_len,
        output_len = summary.output_len,
        "file extracted"
    );
    if options.verbose {
        eprintln!("  compressed  : {}", human_bytes(summary.payload_len));
        eprintln!("  raw size    : {}", human_bytes(summary.output_len));
        eprintln!(
            "  throughput  : {}/s",
            human_bytes(throughput(summary.output_len, elapsed))
        );
        eprintln!("  elapsed     : {:.3}s", elapsed.as_secs_f64());
    }
    Ok(())
}

// ── Entry point ────────────────────────────────────────────────────────────

/// Decide from this program's own mode marker which command line applies.
fn run() -> anyhow::Result<()> {
    let exe = std::env::current_exe().context("locating this program's file")?;
    let file = File::open(&exe).with_context(|| format!("opening program image {:?}", exe))?;
    let mode = scan_mode(file)
        .map_err(|e| stage_error(e, "reading the mode marker", PROGRAM_IMAGE))?;

    match mode {
        Mode::Pack => run_pack(&exe, PackCli::parse()),
        Mode::Unpack => run_unpack(&exe, UnpackCli::parse()),
    }
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "run failed");
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
