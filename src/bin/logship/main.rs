// SPDX-License-Identifier: Apache-2.0

use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;
use gethostname::gethostname;
use tokio::select;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{EnvFilter, Registry};

use logship::config;
use logship::parsers::ParserRegistry;
use logship::relay::{datadog, DatadogRelay, LogglyRelay};
use logship::scraper::Scraper;

/// Environment flag that turns the monitor event relay on.
const MONITOR_ENV: &str = "IMQS_MONITOR";

#[derive(Debug, Parser)]
#[command(name = "logship", version, about = "Tails service log files and relays parsed records")]
struct Args {
    /// Service registry config file
    #[arg(long, env = "LOGSHIP_CONFIG")]
    config: PathBuf,

    /// Where tailing state (per-file offsets) is persisted
    #[arg(long, env = "LOGSHIP_STATE_FILE", default_value = "/var/lib/logship/state.json")]
    state_file: PathBuf,

    /// Meta-log file; stdout when unset
    #[arg(long, env = "LOGSHIP_META_LOG_FILE")]
    meta_log_file: Option<PathBuf>,

    /// Delay between polls of the watched files
    #[arg(long, env = "LOGSHIP_POLL_INTERVAL", default_value = "30s")]
    poll_interval: humantime::Duration,

    /// Bulk aggregation endpoint
    #[arg(
        long,
        env = "LOGSHIP_LOGGLY_URL",
        default_value = "https://logs-01.loggly.com/bulk"
    )]
    loggly_url: String,

    /// API key for the bulk endpoint; the bulk relay is disabled when unset
    #[arg(long, env = "LOGSHIP_LOGGLY_API_KEY")]
    loggly_api_key: Option<String>,

    /// Datadog agent config file, read for api_key and hostname
    #[arg(
        long,
        env = "LOGSHIP_DATADOG_CONF",
        default_value = "c:/ProgramData/Datadog/datadog.conf"
    )]
    datadog_conf: PathBuf,

    /// Datadog events endpoint
    #[arg(
        long,
        env = "LOGSHIP_DATADOG_EVENTS_URL",
        default_value = "https://app.datadoghq.com/api/v1/events"
    )]
    datadog_events_url: String,

    /// Optional file overriding the logical hostname stamped onto records
    #[arg(
        long,
        env = "LOGSHIP_HOSTNAME_FILE",
        default_value = "c:/imqsbin/conf/hostname"
    )]
    hostname_file: PathBuf,

    /// Timeout for each relay POST
    #[arg(long, env = "LOGSHIP_SEND_TIMEOUT", default_value = "15s")]
    send_timeout: humantime::Duration,

    /// Meta-log filter, e.g. info or logship=debug
    #[arg(long, env = "LOGSHIP_LOG_LEVEL", default_value = "info")]
    log_level: String,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let _guard = match setup_logging(&args.log_level, args.meta_log_file.as_deref()) {
        Ok(g) => g,
        Err(e) => {
            eprintln!("ERROR: failed to set up logging: {}", e);
            return ExitCode::from(1);
        }
    };

    match run_agent(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Failed to run agent");
            ExitCode::from(1)
        }
    }
}

#[tokio::main]
async fn run_agent(args: Args) -> Result<(), Box<dyn Error + Send + Sync>> {
    if let Err(e) = rustls::crypto::ring::default_provider().install_default() {
        return Err(format!("failed to initialize crypto library: {:?}", e).into());
    }

    let parsers = ParserRegistry::new()?;
    let registry = config::load(&args.config)?;

    let own_hostname = gethostname().to_string_lossy().into_owned();
    let hostname = host_override(&args.hostname_file).unwrap_or_else(|| own_hostname.clone());
    info!(hostname = %hostname, own_hostname = %own_hostname, "Starting logship");

    let mut scraper = Scraper::new(
        hostname.as_str(),
        own_hostname.as_str(),
        Some(args.state_file.clone()),
    )
    .with_poll_interval(args.poll_interval.into());

    let (sources, skipped) = registry.log_sources(&parsers);
    for message in &skipped {
        warn!("Error in configuration: {}", message);
    }
    for source in sources {
        scraper.add_source(source);
    }
    if scraper.source_count() == 0 {
        return Err("no usable log sources configured, nothing to do".into());
    }

    let send_timeout: std::time::Duration = args.send_timeout.into();
    match &args.loggly_api_key {
        Some(key) => {
            scraper.add_relay(Box::new(LogglyRelay::new(
                args.loggly_url.as_str(),
                key.as_str(),
                send_timeout,
            )));
        }
        None => warn!("Bulk relay not configured, no API key supplied"),
    }

    if datadog::monitor_enabled(std::env::var(MONITOR_ENV).ok().as_deref()) {
        match datadog::read_agent_config(&args.datadog_conf) {
            Ok(agent_config) => {
                scraper.add_relay(Box::new(DatadogRelay::new(
                    args.datadog_events_url.as_str(),
                    agent_config,
                    own_hostname.as_str(),
                    send_timeout,
                )));
            }
            Err(e) => warn!(error = %e, "Datadog relay not loaded"),
        }
    }

    let cancel = CancellationToken::new();
    let scrape_cancel = cancel.clone();
    let mut handle = tokio::spawn(async move {
        scraper.run(scrape_cancel).await;
    });

    select! {
        _ = signal_wait() => {
            info!("Shutdown signal received");
            cancel.cancel();
        }
        r = &mut handle => {
            r?;
            warn!("Unexpected early exit of scrape loop");
            return Ok(());
        }
    }

    handle.await?;
    Ok(())
}

/// The deployment can pin the logical hostname in a one-line file; a URL
/// scheme prefix is stripped so the file may hold the instance's public URL.
fn host_override(path: &Path) -> Option<String> {
    let raw = fs::read_to_string(path).ok()?;
    let line = raw.trim();
    if line.is_empty() {
        return None;
    }
    let host = line
        .strip_prefix("http://")
        .or_else(|| line.strip_prefix("https://"))
        .unwrap_or(line);
    Some(host.to_string())
}

#[cfg(unix)]
async fn signal_wait() {
    use tokio::signal::unix::{signal, SignalKind};
    let mut sig_term = signal(SignalKind::terminate()).expect("failed to install signal handler");
    let mut sig_int = signal(SignalKind::interrupt()).expect("failed to install signal handler");

    select! {
        _ = sig_term.recv() => {},
        _ = sig_int.recv() => {},
    }
}

#[cfg(not(unix))]
async fn signal_wait() {
    let _ = tokio::signal::ctrl_c().await;
}

type LoggerGuard = tracing_appender::non_blocking::WorkerGuard;

fn setup_logging(log_level: &str, log_file: Option<&Path>) -> std::io::Result<LoggerGuard> {
    let (non_blocking_writer, guard) = match log_file {
        Some(path) => {
            let file = fs::OpenOptions::new().create(true).append(true).open(path)?;
            tracing_appender::non_blocking(file)
        }
        None => tracing_appender::non_blocking(std::io::stdout()),
    };

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking_writer)
        .with_target(false)
        .with_level(true)
        .compact();

    let subscriber = Registry::default()
        .with(EnvFilter::new(log_level))
        .with(file_layer);
    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| std::io::Error::other(e.to_string()))?;

    Ok(guard)
}
