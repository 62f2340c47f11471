//! bfmt: multithreaded Blowfish file cipher
//!
//! Commands:
//!   encrypt <input> <output>   - encrypt a file (alias: e)
//!   decrypt <input> <output>   - decrypt a file (alias: d)
//!   config show                - display current configuration

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use secrecy::{ExposeSecret, SecretSlice};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};
use zeroize::Zeroizing;

use bfmt_cipher::Blowfish;
use bfmt_core::config::BfmtConfig;
use bfmt_core::Mode;
use bfmt_driver::{NoProgress, Progress, RunReport};

// ── CLI structure ──────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "bfmt",
    version,
    about = "Multithreaded Blowfish file cipher",
    long_about = "bfmt: encrypt and decrypt files with Blowfish (ECB) across a pool of worker threads"
)]
struct Cli {
    /// Path to bfmt.toml configuration file
    #[arg(long, short = 'c', env = "BFMT_CONFIG", default_value = "bfmt.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error); overrides [log].level
    #[arg(long, env = "BFMT_LOG")]
    log: Option<String>,

    /// Log format; overrides [log].format
    #[arg(long)]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Encrypt INPUT into OUTPUT
    #[command(visible_alias = "e")]
    Encrypt(CipherArgs),

    /// Decrypt INPUT into OUTPUT
    #[command(visible_alias = "d")]
    Decrypt(CipherArgs),

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the active configuration (merged defaults + config file)
    Show,
}

#[derive(Args, Debug)]
struct CipherArgs {
    /// File to read
    input: PathBuf,

    /// File to write (created or truncated)
    output: PathBuf,

    /// Read the key from a file (raw bytes, one trailing newline ignored);
    /// takes precedence over --key and BFMT_KEY
    #[arg(long, short = 'k')]
    key_file: Option<PathBuf>,

    /// Key given directly (4 to 56 bytes)
    #[arg(long, env = "BFMT_KEY", hide_env_values = true)]
    key: Option<String>,

    /// Worker threads (0 = one per CPU); overrides [driver].workers
    #[arg(long, short = 'w')]
    workers: Option<usize>,

    /// Per-worker buffer cap in bytes; overrides [driver].frame_threshold
    #[arg(long)]
    frame_threshold: Option<u64>,

    /// Show a progress bar
    #[arg(long)]
    progress: bool,
}

#[derive(Clone, Debug, ValueEnum)]
enum LogFormat {
    Json,
    Text,
}

// ── Entry point ───────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    let cli = Cli::parse();
    let loaded = load_config(&cli.config)?;
    let found = loaded.is_some();
    let config = loaded.unwrap_or_default();

    let level = cli.log.as_deref().unwrap_or(&config.log.level);
    let format = cli
        .log_format
        .clone()
        .unwrap_or_else(|| parse_log_format(&config.log.format));
    init_logging(level, &format);

    if !found {
        warn!(
            "config file not found: {}  (using defaults)",
            cli.config.display()
        );
    }

    match cli.command {
        Commands::Encrypt(args) => cmd_run(&config, Mode::Encrypt, args),
        Commands::Decrypt(args) => cmd_run(&config, Mode::Decrypt, args),
        Commands::Config { action: ConfigAction::Show } => {
            cmd_config_show(&config, &cli.config)
        }
    }
}

// ── Config loading ────────────────────────────────────────────────────────────

/// `None` when the file does not exist.
fn load_config(path: &Path) -> Result<Option<BfmtConfig>> {
    if !path.exists() {
        return Ok(None);
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading config: {}", path.display()))?;
    let config = toml::from_str(&content)
        .with_context(|| format!("parsing config: {}", path.display()))?;
    Ok(Some(config))
}

fn parse_log_format(value: &str) -> LogFormat {
    LogFormat::from_str(value, true).unwrap_or(LogFormat::Text)
}

fn init_logging(level: &str, format: &LogFormat) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}

// ── Key loading ───────────────────────────────────────────────────────────────

/// Take the key out of `args`: `--key-file` first, then `--key` / `BFMT_KEY`.
///
/// Every intermediate copy is zeroized; the inline key is removed from
/// `args` so it does not outlive this call.
fn load_key(args: &mut CipherArgs) -> Result<SecretSlice<u8>> {
    let inline = args.key.take().map(Zeroizing::new);

    if let Some(path) = &args.key_file {
        let bytes = Zeroizing::new(
            std::fs::read(path)
                .with_context(|| format!("reading key file: {}", path.display()))?,
        );
        return Ok(SecretSlice::from(strip_line_ending(&bytes).to_vec()));
    }
    match inline {
        Some(key) => Ok(SecretSlice::from(key.as_bytes().to_vec())),
        None => anyhow::bail!("no key given\nUse --key-file <PATH>, --key <KEY> or set BFMT_KEY"),
    }
}

/// Drop one trailing `\n` or `\r\n`.
fn strip_line_ending(bytes: &[u8]) -> &[u8] {
    match bytes.strip_suffix(b"\n") {
        Some(line) => line.strip_suffix(b"\r").unwrap_or(line),
        None => bytes,
    }
}

// ── Progress bar ──────────────────────────────────────────────────────────────

struct BarProgress(ProgressBar);

impl Progress for BarProgress {
    fn advance(&self, bytes: u64) {
        self.0.inc(bytes);
    }
}

fn make_progress_bar(total: u64, prefix: &str) -> ProgressBar {
    let pb = ProgressBar::new(total);
    let style = ProgressStyle::with_template(
        "{prefix:.bold} [{bar:40.cyan/blue}] {bytes}/{total_bytes} {binary_bytes_per_sec}",
    )
    .unwrap_or_else(|_| ProgressStyle::default_bar())
    .progress_chars("=>-");
    pb.set_style(style);
    pb.set_prefix(prefix.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

/// Bytes the driver reports through `Progress` for an input of `length`.
fn progress_total(mode: Mode, length: u64) -> u64 {
    bfmt_driver::payload_length(mode, length)
        .map(|payload| payload - payload % bfmt_core::BLOCK_LEN as u64)
        .unwrap_or(0)
}

// ── `bfmt encrypt` / `bfmt decrypt` ───────────────────────────────────────────

fn cmd_run(config: &BfmtConfig, mode: Mode, mut args: CipherArgs) -> Result<()> {
    let mut driver = config.driver.clone();
    if let Some(workers) = args.workers {
        driver.workers = workers;
    }
    if let Some(threshold) = args.frame_threshold {
        driver.frame_threshold = threshold;
    }
    driver.validate()?;

    let key = load_key(&mut args)?;
    let cipher = Blowfish::from_key_bytes(key.expose_secret()).context("building cipher")?;
    drop(key);

    let (input, output) = bfmt_driver::open_files(&args.input, &args.output)
        .with_context(|| format!("opening {} → {}", args.input.display(), args.output.display()))?;

    let bar = if args.progress {
        let length = input.metadata().map(|m| m.len()).unwrap_or(0);
        Some(BarProgress(make_progress_bar(
            progress_total(mode, length),
            mode.as_str(),
        )))
    } else {
        None
    };
    let progress: &dyn Progress = match &bar {
        Some(bar) => bar as &dyn Progress,
        None => &NoProgress,
    };

    let outcome = bfmt_driver::run(&cipher, mode, input, output, &driver, progress);
    if let Some(bar) = &bar {
        bar.0.finish_and_clear();
    }

    let report = match outcome {
        Ok(report) => report,
        Err(e) => {
            if let Err(rm) = std::fs::remove_file(&args.output) {
                warn!("removing partial output {}: {rm}", args.output.display());
            }
            return Err(e).with_context(|| format!("{mode} {}", args.input.display()));
        }
    };

    log_report(&report, &args.output);
    println!("Elapsed time: {} ms", report.elapsed.as_millis());
    Ok(())
}

fn log_report(report: &RunReport, output: &Path) {
    info!(
        mode = %report.mode,
        output = %output.display(),
        bytes_read = report.bytes_read,
        bytes_written = report.bytes_written,
        workers = report.layout.worker_count,
        block_size = report.layout.block_size,
        frame_size = report.layout.frame_size,
        padding = report.layout.padding_length,
        elapsed_ms = report.elapsed.as_millis() as u64,
        "run complete"
    );
}

// ── `bfmt config show` ────────────────────────────────────────────────────────

fn cmd_config_show(config: &BfmtConfig, config_path: &Path) -> Result<()> {
    if config_path.exists() {
        println!("# Configuration from: {}", config_path.display());
    } else {
        println!("# Configuration: defaults (no file at {})", config_path.display());
    }
    println!();
    let rendered = toml::to_string_pretty(config).context("serializing config to TOML")?;
    print!("{rendered}");
    Ok(())
}
