use std::fs;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use glob::glob;
use ravenlink_core::{
    ConfigError, NotificationSplit, PipelineConfig, PublishedReading, ReplayOptions,
    ReplayReport, decode_measurement,
};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

const LONG_VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (commit ",
    env!("RAVENLINK_BUILD_COMMIT"),
    ", ",
    env!("RAVENLINK_BUILD_DATE"),
    ")"
);

const DEFAULT_LOG_FILTER: &str = "ravenlink=info,ravenlink_core=warn";
const VERBOSE_LOG_FILTER: &str = "ravenlink=debug,ravenlink_core=debug";

#[derive(Parser, Debug)]
#[command(name = "ravenlink")]
#[command(version, long_version = LONG_VERSION)]
#[command(
    about = "Ingest instantaneous-demand readings from a RAVEn energy monitor.",
    long_about = None,
    after_help = "Examples:\n  ravenlink replay capture.xml -o report.json\n  ravenlink replay capture.xml --stdout --batch-size 3 --chunk-bytes 64\n  ravenlink decode 0x1c6b2e40 0x0004b0 0x01 0x03e8"
)]
struct Cli {
    /// Only log errors and suppress status output
    #[arg(long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    /// Log debug details (batches, drains)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Replay a captured serial stream and write a JSON report.
    #[command(
        after_help = "Examples:\n  ravenlink replay capture.xml -o report.json\n  ravenlink replay 'captures/*.xml' --stdout --pretty"
    )]
    Replay {
        /// Path (or glob matching one file) of the captured byte stream
        input: PathBuf,

        /// Output report path (JSON)
        #[arg(short = 'o', long, required_unless_present = "stdout")]
        report: Option<PathBuf>,

        /// Write JSON report to stdout
        #[arg(long, conflicts_with = "report")]
        stdout: bool,

        /// Pretty-print JSON output
        #[arg(long, conflicts_with = "compact")]
        pretty: bool,

        /// Compact JSON output (default)
        #[arg(long)]
        compact: bool,

        /// Notifications per batch
        #[arg(long)]
        batch_size: Option<usize>,

        /// Destination name readings are published under
        #[arg(long)]
        destination: Option<String>,

        /// Deliver fixed-size chunks instead of one notification per message
        #[arg(long)]
        chunk_bytes: Option<NonZeroUsize>,

        /// Pipeline configuration file (JSON)
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Decode one set of hexadecimal demand fields.
    #[command(after_help = "Example:\n  ravenlink decode 0x1c6b2e40 0x0004b0 0x01 0x03e8")]
    Decode {
        /// Device timestamp (seconds since 2000-01-01 UTC)
        timestamp: String,
        /// Raw demand reading
        demand: String,
        /// Multiplier (zero means one)
        multiplier: String,
        /// Divisor (zero means one)
        divisor: String,

        /// Destination name attached to the reading
        #[arg(long)]
        destination: Option<String>,

        /// Pretty-print JSON output
        #[arg(long)]
        pretty: bool,
    },

    /// Stream live readings from a serial device as JSON lines.
    #[cfg(feature = "serial")]
    Listen {
        /// Serial device path
        #[arg(long)]
        device: Option<String>,

        /// Notifications per batch
        #[arg(long)]
        batch_size: Option<usize>,

        /// Destination name readings are published under
        #[arg(long)]
        destination: Option<String>,

        /// Stop after this many completed batches
        #[arg(long)]
        max_batches: Option<u64>,

        /// Pipeline configuration file (JSON)
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.quiet, cli.verbose);

    let result = match cli.command {
        Commands::Replay {
            input,
            report,
            stdout,
            pretty,
            compact,
            batch_size,
            destination,
            chunk_bytes,
            config,
        } => {
            let overrides = Overrides {
                config,
                batch_size,
                destination,
                device: None,
            };
            cmd_replay(
                input,
                report,
                stdout,
                OutputFormat::from_flags(pretty, compact),
                chunk_bytes,
                overrides,
                cli.quiet,
            )
        }
        Commands::Decode {
            timestamp,
            demand,
            multiplier,
            divisor,
            destination,
            pretty,
        } => cmd_decode(
            [&timestamp, &demand, &multiplier, &divisor].map(String::as_str),
            destination,
            pretty,
        ),
        #[cfg(feature = "serial")]
        Commands::Listen {
            device,
            batch_size,
            destination,
            max_batches,
            config,
        } => {
            let overrides = Overrides {
                config,
                batch_size,
                destination,
                device,
            };
            listen::cmd_listen(overrides, max_batches)
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {}", err.message);
            if let Some(hint) = err.hint {
                eprintln!("hint: {}", hint);
            }
            ExitCode::from(2)
        }
    }
}

fn init_tracing(quiet: bool, verbose: bool) {
    let fallback = if quiet {
        "error"
    } else if verbose {
        VERBOSE_LOG_FILTER
    } else {
        DEFAULT_LOG_FILTER
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

#[derive(Debug)]
struct CliError {
    message: String,
    hint: Option<String>,
}

impl CliError {
    fn new(message: impl Into<String>, hint: Option<String>) -> Self {
        Self {
            message: message.into(),
            hint,
        }
    }
}

impl std::fmt::Display for CliError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

impl From<anyhow::Error> for CliError {
    fn from(err: anyhow::Error) -> Self {
        CliError::new(format!("{err:#}"), None)
    }
}

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        let hint = match &err {
            ConfigError::Io(_) => "check the --config path",
            ConfigError::Json(_) => "expected a JSON object with known pipeline keys",
            ConfigError::Invalid(_) => "fix the value in the config file or override it with a flag",
        };
        CliError::new(err.to_string(), Some(hint.to_string()))
    }
}

/// Config file plus the command-line values layered over it.
#[derive(Debug, Default)]
struct Overrides {
    config: Option<PathBuf>,
    batch_size: Option<usize>,
    destination: Option<String>,
    device: Option<String>,
}

impl Overrides {
    fn resolve(self) -> Result<PipelineConfig, CliError> {
        let mut config = match self.config.as_ref() {
            Some(path) => PipelineConfig::from_json_file(path)?,
            None => PipelineConfig::default(),
        };
        if let Some(batch_size) = self.batch_size {
            config.batch_size = batch_size;
        }
        if let Some(destination) = self.destination {
            config.destination = destination;
        }
        if let Some(device) = self.device {
            config.device = device;
        }
        config.validate()?;
        Ok(config)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputFormat {
    Compact,
    Pretty,
}

impl OutputFormat {
    fn from_flags(pretty: bool, _compact: bool) -> Self {
        if pretty { Self::Pretty } else { Self::Compact }
    }
}

fn to_json<T: Serialize>(value: &T, format: OutputFormat) -> Result<String, CliError> {
    let json = match format {
        OutputFormat::Pretty => serde_json::to_string_pretty(value),
        OutputFormat::Compact => serde_json::to_string(value),
    };
    json.context("JSON serialization failed").map_err(Into::into)
}

fn cmd_replay(
    input: PathBuf,
    report: Option<PathBuf>,
    stdout: bool,
    format: OutputFormat,
    chunk_bytes: Option<NonZeroUsize>,
    overrides: Overrides,
    quiet: bool,
) -> Result<(), CliError> {
    let config = overrides.resolve()?;
    let resolved_input = resolve_input_path(&input)?;
    validate_input_file(&resolved_input)?;

    let report = if stdout {
        None
    } else {
        Some(report.ok_or_else(|| {
            CliError::new(
                "missing output path",
                Some("use -o/--report or --stdout".to_string()),
            )
        })?)
    };
    if let Some(report_path) = report.as_ref() {
        ensure_distinct_output(&resolved_input, report_path)?;
    }

    let options = ReplayOptions {
        batch_size: config.batch_size,
        destination: config.destination,
        split: chunk_bytes.map_or(NotificationSplit::Envelope, NotificationSplit::Bytes),
    };
    let rep = ravenlink_core::replay_file(&resolved_input, &options)
        .with_context(|| format!("replay failed: {}", resolved_input.display()))?;
    let json = to_json(&rep, format)?;

    let Some(report) = report else {
        print!("{}", json);
        return Ok(());
    };

    if let Some(parent) = report.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create output directory: {}", parent.display())
            })?;
        }
    }
    fs::write(&report, json)
        .with_context(|| format!("Failed to write report: {}", report.display()))?;

    if !quiet {
        print_summary(&rep);
        eprintln!("OK: report written -> {}", report.display());
    }
    Ok(())
}

fn print_summary(rep: &ReplayReport) {
    let summary = &rep.summary;
    eprintln!(
        "{} notifications, {} batches, {} readings published",
        summary.notifications, summary.batches, summary.published
    );
    if summary.malformed_blocks > 0 || summary.parse_failures > 0 {
        eprintln!(
            "  skipped: {} malformed blocks, {} batches discarded as unparsable",
            summary.malformed_blocks, summary.parse_failures
        );
    }
    if summary.pending_notifications > 0 {
        eprintln!(
            "  discarded: {} notifications in an incomplete batch",
            summary.pending_notifications
        );
    }
}

fn ensure_distinct_output(input: &Path, report_path: &Path) -> Result<(), CliError> {
    let input_abs = fs::canonicalize(input)
        .with_context(|| format!("Failed to resolve input path: {}", input.display()))?;
    let report_dir = report_path
        .parent()
        .map(|parent| {
            if parent.as_os_str().is_empty() {
                fs::canonicalize(".")
            } else {
                fs::canonicalize(parent)
            }
        })
        .transpose()
        .with_context(|| format!("Failed to resolve output path: {}", report_path.display()))?;
    let (Some(report_dir), Some(file_name)) = (report_dir, report_path.file_name()) else {
        return Ok(());
    };
    if report_dir.join(file_name) == input_abs {
        return Err(CliError::new(
            format!(
                "report path must differ from input: {}",
                report_path.display()
            ),
            Some("choose a different output path".to_string()),
        ));
    }
    Ok(())
}

/// `decode` output: the raw device values next to the published reading.
#[derive(Debug, Serialize)]
struct DecodedReading {
    raw_timestamp: u64,
    magnitude: f64,
    #[serde(flatten)]
    reading: PublishedReading,
}

fn cmd_decode(
    fields: [&str; 4],
    destination: Option<String>,
    pretty: bool,
) -> Result<(), CliError> {
    let [timestamp, demand, multiplier, divisor] = fields.map(without_hex_prefix);
    let measurement =
        decode_measurement(timestamp, demand, multiplier, divisor).map_err(|err| {
            CliError::new(
                err.to_string(),
                Some("pass hexadecimal values, e.g. 0x1c6b2e40 0x0004b0 0x01 0x03e8".to_string()),
            )
        })?;

    let destination = destination.unwrap_or_else(|| PipelineConfig::default().destination);
    let decoded = DecodedReading {
        raw_timestamp: measurement.raw_timestamp(),
        magnitude: measurement.magnitude(),
        reading: PublishedReading::new(&destination, &measurement),
    };
    println!("{}", to_json(&decoded, OutputFormat::from_flags(pretty, false))?);
    Ok(())
}

fn without_hex_prefix(raw: &str) -> &str {
    raw.strip_prefix("0x")
        .or_else(|| raw.strip_prefix("0X"))
        .unwrap_or(raw)
}

fn validate_input_file(input: &Path) -> Result<(), CliError> {
    if !input.exists() {
        return Err(CliError::new(
            format!("input file not found: {}", input.display()),
            Some("pass a file captured from the device's serial output".to_string()),
        ));
    }
    if !input.is_file() {
        return Err(CliError::new(
            format!("input is not a file: {}", input.display()),
            Some("pass a file captured from the device's serial output".to_string()),
        ));
    }
    Ok(())
}

fn resolve_input_path(input: &Path) -> Result<PathBuf, CliError> {
    let pattern = input.to_string_lossy();
    if !is_glob_pattern(&pattern) {
        return Ok(input.to_path_buf());
    }

    let mut matches = Vec::new();
    let paths = glob(&pattern).map_err(|err| {
        CliError::new(
            format!("invalid input pattern '{}'", pattern),
            Some(format!("pattern error: {}", err.msg)),
        )
    })?;
    for entry in paths {
        let path = entry.map_err(|err| {
            CliError::new(
                format!("invalid input pattern '{}'", pattern),
                Some(format!("pattern error: {}", err)),
            )
        })?;
        if path.is_file() {
            matches.push(path);
        }
    }

    if matches.is_empty() {
        return Err(CliError::new(
            format!("no files match pattern '{}'", pattern),
            Some("check the path or quote the pattern".to_string()),
        ));
    }
    if matches.len() > 1 {
        let hint = "pass a single capture file, or run once per file".to_string();
        let listed = matches
            .iter()
            .take(3)
            .map(|p| p.display().to_string())
            .collect::<Vec<_>>()
            .join(", ");
        let more = if matches.len() > 3 { ", ..." } else { "" };
        let message = format!(
            "multiple files match pattern '{}' ({} matches); matches: {}{}",
            pattern,
            matches.len(),
            listed,
            more
        );
        return Err(CliError::new(message, Some(hint)));
    }

    Ok(matches.remove(0))
}

fn is_glob_pattern(input: &str) -> bool {
    input.contains('*') || input.contains('?') || input.contains('[')
}

#[cfg(feature = "serial")]
mod listen {
    use std::io::Write;
    use std::sync::Arc;

    use ravenlink_core::{
        BatchCollector, Connection, MeasurementSink, NotifyOutcome, PublishTarget,
        PublishedReading, SerialSource,
    };
    use tracing::{info, warn};

    use super::{CliError, Overrides};

    /// Writes each reading as one JSON line on stdout.
    struct JsonLinesSink;

    impl MeasurementSink for JsonLinesSink {
        fn publish(&self, _destination: &str, reading: &PublishedReading) {
            let line = match serde_json::to_string(reading) {
                Ok(line) => line,
                Err(err) => {
                    warn!(error = %err, "failed to serialize reading");
                    return;
                }
            };
            let mut out = std::io::stdout().lock();
            if let Err(err) = writeln!(out, "{line}").and_then(|()| out.flush()) {
                warn!(error = %err, "failed to write reading");
            }
        }
    }

    pub(super) fn cmd_listen(
        overrides: Overrides,
        max_batches: Option<u64>,
    ) -> Result<(), CliError> {
        let config = overrides.resolve()?;
        let source = SerialSource::open(&config.device, config.baud_rate).map_err(|err| {
            CliError::new(
                err.to_string(),
                Some("check --device and that the stick is plugged in".to_string()),
            )
        })?;

        let policy = config.drain_policy();
        let target = PublishTarget::bound(Arc::new(JsonLinesSink), config.destination.as_str());
        let collector = BatchCollector::new(config.batch_size, policy, target)
            .map_err(|err| CliError::new(err.to_string(), None))?;
        let mut connection = Connection::new(source, collector);
        info!(device = %config.device, batch_size = config.batch_size, "listening");

        let mut batches = 0u64;
        let result = connection.run_until(policy.poll_interval, |outcome| {
            if matches!(outcome, NotifyOutcome::Completed(_)) {
                batches += 1;
            }
            max_batches.is_none_or(|limit| batches < limit)
        });
        let closed = connection.close();

        result.map_err(|err| {
            CliError::new(
                format!("serial read failed: {err}"),
                Some("the device may have been unplugged".to_string()),
            )
        })?;
        closed.map_err(|err| CliError::new(err.to_string(), None))
    }
}
