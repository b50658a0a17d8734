//! Redirect Check CLI Application
//!
//! A command-line interface for verifying product URL pairs from a CSV export
//! and classifying each pair as a redirect, a link change, or a case for
//! manual analysis. This CLI is a thin layer over redirect-check-lib.

mod ui;

use clap::builder::styling::{AnsiColor, Effects, Styles};
use clap::Parser;
use redirect_check_lib::{
    load_env_config, parse_duration, parse_key_value, read_rows_from_path, survey,
    validate_workers, ConfigManager, EnvConfig, Pipeline, ProbeStrategy, QueryTemplate,
    RedirectCheckError, ResultWriter, RunConfig,
};
use std::process;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

const STYLES: Styles = Styles::styled()
    .header(AnsiColor::Yellow.on_default().effects(Effects::BOLD))
    .usage(AnsiColor::Yellow.on_default().effects(Effects::BOLD))
    .literal(AnsiColor::Green.on_default().effects(Effects::BOLD))
    .placeholder(AnsiColor::Cyan.on_default());

const DEFAULT_OUTPUT: &str = "output.csv";

/// CLI arguments for redirect-check
#[derive(Parser, Debug)]
#[command(name = "redirect-check")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Verify URL pairs from a CSV and classify the redirects they need")]
#[command(
    long_about = "Verify source/destination URL pairs from a CSV export and classify each pair.\n\nEvery URL is probed with HEAD (falling back to GET). A live destination needs a human look (ANALISAR), a live source with a dead destination needs a redirect (REDIRECIONAR), and anything else needs a link change (ALTERAR)."
)]
#[command(styles = STYLES)]
pub struct Args {
    /// Input CSV (header row, then one product per line)
    #[arg(value_name = "INPUT", help_heading = "Input/Output")]
    pub input: Option<String>,

    /// Output CSV file [default: output.csv]
    #[arg(
        short = 'o',
        long = "output",
        value_name = "FILE",
        help_heading = "Input/Output"
    )]
    pub output: Option<String>,

    /// Parse the input and report eligible pairs without sending requests
    #[arg(long = "dry-run", help_heading = "Input/Output")]
    pub dry_run: bool,

    /// Print the run summary as JSON
    #[arg(short = 'j', long = "json", help_heading = "Input/Output")]
    pub json: bool,

    /// Concurrent row workers (default: 50, max: 500)
    #[arg(
        short = 'w',
        long = "workers",
        value_name = "N",
        help_heading = "Performance"
    )]
    pub workers: Option<usize>,

    /// Rows admitted per second (default: 10)
    #[arg(
        short = 'r',
        long = "rate",
        value_name = "N",
        help_heading = "Performance"
    )]
    pub rate: Option<u32>,

    /// Rows buffered between admission and the workers (default: 200)
    #[arg(long = "queue-capacity", value_name = "N", help_heading = "Performance")]
    pub queue_capacity: Option<usize>,

    /// Longest wait for an admission token before a row is given up, e.g. "500ms" (default: 30s)
    #[arg(long = "admission-timeout", value_name = "DURATION", help_heading = "Performance")]
    pub admission_timeout: Option<String>,

    /// Pause after a row could not be admitted (default: 1s)
    #[arg(long = "admission-backoff", value_name = "DURATION", help_heading = "Performance")]
    pub admission_backoff: Option<String>,

    /// Per-request timeout, e.g. "30s" or "2m" (default: 210s)
    #[arg(long = "timeout", value_name = "DURATION", help_heading = "HTTP")]
    pub timeout: Option<String>,

    /// Probe strategy: "head" (HEAD, GET fallback) or "get" (GET only)
    #[arg(long = "probe", value_name = "STRATEGY", help_heading = "HTTP")]
    pub probe: Option<String>,

    /// Extra request header, KEY=VALUE (repeatable)
    #[arg(
        short = 'H',
        long = "header",
        value_name = "KEY=VALUE",
        action = clap::ArgAction::Append,
        help_heading = "HTTP"
    )]
    pub headers: Vec<String>,

    /// Query parameter added to every URL, KEY=VALUE; "{{ now }}" expands per request (repeatable)
    #[arg(
        short = 'q',
        long = "query",
        value_name = "KEY=VALUE",
        action = clap::ArgAction::Append,
        help_heading = "HTTP"
    )]
    pub query: Vec<String>,

    /// User-Agent sent with every request
    #[arg(long = "user-agent", value_name = "UA", help_heading = "HTTP")]
    pub user_agent: Option<String>,

    /// Use specific config file instead of automatic discovery
    #[arg(long = "config", value_name = "FILE", help_heading = "Configuration")]
    pub config: Option<String>,

    /// Show debug logs (per-URL probe details)
    #[arg(short = 'd', long = "debug", help_heading = "Configuration")]
    pub debug: bool,

    /// Verbose logging (one line per classified pair)
    #[arg(short = 'v', long = "verbose", help_heading = "Configuration")]
    pub verbose: bool,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    init_logging(&args);

    // Validate arguments
    if let Err(e) = validate_args(&args) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }

    tracing::debug!(version = env!("CARGO_PKG_VERSION"), "redirect-check starting");

    if let Err(e) = run_redirect_check(args).await {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

/// Install the stderr subscriber. `RUST_LOG` wins over the flags.
fn init_logging(args: &Args) {
    let level = if args.debug {
        "debug"
    } else if args.verbose {
        "info"
    } else {
        "warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "warn,redirect_check_lib={level},redirect_check={level}"
        ))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn validate_args(args: &Args) -> Result<(), String> {
    if let Some(workers) = args.workers {
        validate_workers(workers).map_err(|_| "Workers must be between 1 and 500".to_string())?;
    }

    if args.rate == Some(0) {
        return Err("Rate must be at least 1".to_string());
    }

    if args.queue_capacity == Some(0) {
        return Err("Queue capacity must be at least 1".to_string());
    }

    for duration in [&args.timeout, &args.admission_timeout, &args.admission_backoff]
        .into_iter()
        .flatten()
    {
        parse_duration(duration).map_err(|e| e.to_string())?;
    }

    if let Some(probe) = &args.probe {
        if ProbeStrategy::parse(probe).is_none() {
            return Err(format!("Invalid probe '{}'. Use 'head' or 'get'", probe));
        }
    }

    for header in &args.headers {
        parse_key_value(header).map_err(|e| e.to_string())?;
    }

    for query in &args.query {
        let (_, value) = parse_key_value(query).map_err(|e| e.to_string())?;
        QueryTemplate::parse(&value).map_err(|e| e.to_string())?;
    }

    Ok(())
}

async fn run_redirect_check(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let env_config = load_env_config(args.verbose);
    let config = build_config(&args, &env_config)?;

    let input = args
        .input
        .clone()
        .or_else(|| env_config.input.clone())
        .ok_or("You must specify an INPUT file (or set RC_INPUT)")?;
    let output = args
        .output
        .clone()
        .or_else(|| env_config.output.clone())
        .unwrap_or_else(|| DEFAULT_OUTPUT.to_string());

    // Input problems are fatal before anything is sent
    let rows = read_rows_from_path(&input)?;

    if args.dry_run {
        let report = survey(&rows, &config.schema);
        if args.json {
            println!("{}", serde_json::to_string_pretty(&report)?);
        } else {
            ui::print_survey(&input, &report);
        }
        return Ok(());
    }

    let pipeline = Pipeline::new(config)?;
    let writer = Arc::new(ResultWriter::create(&output)?);

    let cancel = CancellationToken::new();
    spawn_interrupt_handler(cancel.clone());

    if !args.json {
        ui::print_header(&input, &output, pipeline.config());
    }

    let summary = pipeline.run(rows, writer, cancel).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        ui::print_summary(&summary, &output);
    }

    if summary.cancelled {
        return Err(RedirectCheckError::Cancelled.into());
    }
    Ok(())
}

/// What a Ctrl-C does, by how many have been received so far.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Interrupt {
    /// Stop admitting rows and let the ones in progress finish
    Drain,
    /// Give up immediately
    Abort,
}

impl Interrupt {
    fn nth(count: usize) -> Self {
        if count <= 1 {
            Interrupt::Drain
        } else {
            Interrupt::Abort
        }
    }
}

/// Exit status after a second Ctrl-C (128 + SIGINT).
const INTERRUPTED_EXIT_CODE: i32 = 130;

/// First Ctrl-C cancels the run, a second one exits right away.
fn spawn_interrupt_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        let mut received = 0;
        while tokio::signal::ctrl_c().await.is_ok() {
            received += 1;
            match Interrupt::nth(received) {
                Interrupt::Drain => {
                    tracing::warn!(
                        "interrupt received, finishing rows in progress (Ctrl-C again to abort)"
                    );
                    cancel.cancel();
                }
                Interrupt::Abort => {
                    eprintln!("Aborted");
                    process::exit(INTERRUPTED_EXIT_CODE);
                }
            }
        }
    });
}

/// Resolve the run configuration: CLI > RC_* env > config files > defaults.
fn build_config(args: &Args, env_config: &EnvConfig) -> Result<RunConfig, RedirectCheckError> {
    let config_manager = ConfigManager::new(args.verbose);

    // Step 1: explicit config file (CLI, then RC_CONFIG) or discovery
    let explicit_config_path = args.config.as_ref().or(env_config.config.as_ref());
    let file_config = match explicit_config_path {
        Some(path) => {
            tracing::info!(path = %path, "using explicit config file");
            config_manager.load_file(path)?
        }
        None => config_manager.discover_and_load()?,
    };
    let config = file_config.apply_to(RunConfig::default())?;

    // Step 2: environment variables (RC_*)
    let config = env_config.apply_to(config);

    // Step 3: CLI arguments (highest precedence)
    apply_cli_args_to_config(config, args)
}

/// Apply CLI arguments to config. Only flags the user passed override.
fn apply_cli_args_to_config(
    mut config: RunConfig,
    args: &Args,
) -> Result<RunConfig, RedirectCheckError> {
    if let Some(workers) = args.workers {
        validate_workers(workers)?;
        config = config.with_workers(workers);
    }
    if let Some(rate) = args.rate {
        config = config.with_rate(rate);
    }
    if let Some(capacity) = args.queue_capacity {
        config = config.with_queue_capacity(capacity);
    }
    if let Some(timeout) = &args.timeout {
        config = config.with_timeout(parse_duration(timeout)?);
    }
    if let Some(timeout) = &args.admission_timeout {
        config = config.with_admission_timeout(parse_duration(timeout)?);
    }
    if let Some(backoff) = &args.admission_backoff {
        config = config.with_admission_backoff(parse_duration(backoff)?);
    }
    if let Some(probe) = &args.probe {
        let probe = ProbeStrategy::parse(probe).ok_or_else(|| {
            RedirectCheckError::config(format!("Invalid probe '{}'. Use 'head' or 'get'", probe))
        })?;
        config = config.with_probe(probe);
    }
    if let Some(user_agent) = &args.user_agent {
        config.http.user_agent = user_agent.clone();
    }
    for header in &args.headers {
        let (name, value) = parse_key_value(header)?;
        config = config.with_header(name, value);
    }
    for query in &args.query {
        let (name, value) = parse_key_value(query)?;
        QueryTemplate::parse(&value)?;
        config = config.with_query(name, value);
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::time::Duration;
    use tempfile::NamedTempFile;

    // Helper function with all required fields
    fn create_test_args() -> Args {
        Args {
            input: Some("links.csv".to_string()),
            output: None,
            dry_run: false,
            json: false,
            workers: None,
            rate: None,
            queue_capacity: None,
            admission_timeout: None,
            admission_backoff: None,
            timeout: None,
            probe: None,
            headers: vec![],
            query: vec![],
            user_agent: None,
            config: None,
            debug: false,
            verbose: false,
        }
    }

    fn config_file(content: &str) -> NamedTempFile {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(content.as_bytes()).unwrap();
        temp_file.flush().unwrap();
        temp_file
    }

    #[test]
    fn test_args_parse() {
        let args = Args::try_parse_from([
            "redirect-check",
            "links.csv",
            "-o",
            "out.csv",
            "-w",
            "8",
            "-H",
            "accept-language=pt-BR",
            "-H",
            "x-team=seo",
            "-q",
            "t={{ now }}",
        ])
        .unwrap();

        assert_eq!(args.input.as_deref(), Some("links.csv"));
        assert_eq!(args.output.as_deref(), Some("out.csv"));
        assert_eq!(args.workers, Some(8));
        assert_eq!(args.headers.len(), 2);
        assert_eq!(args.query, vec!["t={{ now }}".to_string()]);
        assert!(validate_args(&args).is_ok());
    }

    #[test]
    fn test_validate_args_rejects_bad_values() {
        let cases: [fn(&mut Args); 10] = [
            |a: &mut Args| a.workers = Some(0),
            |a: &mut Args| a.workers = Some(501),
            |a: &mut Args| a.rate = Some(0),
            |a: &mut Args| a.queue_capacity = Some(0),
            |a: &mut Args| a.timeout = Some("later".to_string()),
            |a: &mut Args| a.admission_timeout = Some("0ms".to_string()),
            |a: &mut Args| a.admission_backoff = Some("eventually".to_string()),
            |a: &mut Args| a.probe = Some("options".to_string()),
            |a: &mut Args| a.headers = vec!["no-separator".to_string()],
            |a: &mut Args| a.query = vec!["t={{ today }}".to_string()],
        ];
        for mutate in cases {
            let mut args = create_test_args();
            mutate(&mut args);
            assert!(validate_args(&args).is_err(), "{:?}", args);
        }
    }

    #[test]
    fn test_cli_args_override_config() {
        let mut args = create_test_args();
        args.workers = Some(5);
        args.probe = Some("get".to_string());
        args.timeout = Some("30s".to_string());
        args.headers = vec!["accept=text/html".to_string()];
        args.query = vec!["cache=0".to_string()];

        let config = apply_cli_args_to_config(RunConfig::default().with_rate(3), &args).unwrap();
        assert_eq!(config.workers, 5);
        assert_eq!(config.rate_per_second, 3);
        assert_eq!(config.probe, ProbeStrategy::GetOnly);
        assert_eq!(config.http.timeout, Duration::from_secs(30));
        assert_eq!(config.http.headers.get("accept").unwrap(), "text/html");
        assert_eq!(config.http.query.get("cache").unwrap(), "0");
    }

    #[test]
    fn test_admission_flags_override_config() {
        let mut args = create_test_args();
        args.admission_timeout = Some("250ms".to_string());
        args.admission_backoff = Some("3s".to_string());

        let config = apply_cli_args_to_config(RunConfig::default(), &args).unwrap();
        assert_eq!(config.admission_timeout, Duration::from_millis(250));
        assert_eq!(config.admission_backoff, Duration::from_secs(3));
    }

    #[test]
    fn test_second_interrupt_aborts() {
        assert_eq!(Interrupt::nth(1), Interrupt::Drain);
        assert_eq!(Interrupt::nth(2), Interrupt::Abort);
        assert_eq!(Interrupt::nth(5), Interrupt::Abort);
    }

    #[test]
    fn test_unset_cli_args_keep_config() {
        let args = create_test_args();
        let base = RunConfig::default().with_workers(7).with_rate(2);
        let config = apply_cli_args_to_config(base.clone(), &args).unwrap();
        assert_eq!(config, base);
    }

    #[test]
    fn test_build_config_precedence() {
        let file = config_file("[defaults]\nworkers = 30\nrate = 4\nqueue_capacity = 50\n");
        let mut args = create_test_args();
        args.config = Some(file.path().to_string_lossy().into_owned());
        args.workers = Some(12);

        let env_config = EnvConfig {
            rate: Some(6),
            ..EnvConfig::default()
        };

        let config = build_config(&args, &env_config).unwrap();
        assert_eq!(config.workers, 12); // CLI
        assert_eq!(config.rate_per_second, 6); // env
        assert_eq!(config.queue_capacity, 50); // file
        assert_eq!(config.http.timeout, Duration::from_secs(210)); // default
    }

    #[test]
    fn test_build_config_uses_env_config_path() {
        let file = config_file("[defaults]\nprobe = \"get\"\n");
        let env_config = EnvConfig {
            config: Some(file.path().to_string_lossy().into_owned()),
            ..EnvConfig::default()
        };

        let config = build_config(&create_test_args(), &env_config).unwrap();
        assert_eq!(config.probe, ProbeStrategy::GetOnly);
    }

    #[test]
    fn test_build_config_missing_explicit_file_fails() {
        let mut args = create_test_args();
        args.config = Some("/no/such/config.toml".to_string());
        let err = build_config(&args, &EnvConfig::default()).unwrap_err();
        assert!(matches!(err, RedirectCheckError::FileError { .. }));
    }
}
