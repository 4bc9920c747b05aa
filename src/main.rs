use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::fmt::writer::MakeWriterExt;
use vmctl::config::Config;
use vmctl::console::{self, ConsoleSink, StdinSource};
use vmctl::dispatcher::Dispatcher;
use vmctl::provider::rest::auth::{Credentials, PASSWORD_ENV};
use vmctl::provider::rest::client::format_api_error;
use vmctl::provider::{InMemoryProvider, ResourceProvider, RestProvider};
use vmctl::report;

/// Batch lifecycle control for virtual machines
#[derive(Parser, Debug)]
#[command(name = "vmctl", version, about, long_about = None)]
struct Args {
    /// Config file (default: ./vcenterconfig.json, then the user config dir)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Endpoint host, overrides the config file
    #[arg(long)]
    host: Option<String>,

    /// User name, overrides the config file
    #[arg(short, long)]
    user: Option<String>,

    /// Skip TLS certificate verification
    #[arg(long)]
    insecure: bool,

    /// Run against an inventory file instead of a live endpoint
    #[arg(long, value_name = "INVENTORY")]
    simulate: Option<PathBuf>,

    /// Run in read-only mode (block all lifecycle operations)
    #[arg(long)]
    readonly: bool,

    /// Log level for debugging
    #[arg(long, value_enum, default_value = "off")]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Option<Mode>,
}

#[derive(Subcommand, Debug, Clone)]
enum Mode {
    /// Interactive lifecycle menu (default)
    Menu,
    /// Print session info and VM details
    Report {
        /// Only VMs whose name contains this text; prompts when omitted
        #[arg(short, long)]
        filter: Option<String>,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn to_tracing_level(self) -> Option<Level> {
        match self {
            LogLevel::Off => None,
            LogLevel::Error => Some(Level::ERROR),
            LogLevel::Warn => Some(Level::WARN),
            LogLevel::Info => Some(Level::INFO),
            LogLevel::Debug => Some(Level::DEBUG),
            LogLevel::Trace => Some(Level::TRACE),
        }
    }
}

fn setup_logging(level: LogLevel) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let Some(tracing_level) = level.to_tracing_level() else {
        return Ok(None);
    };

    let log_path = get_log_path();

    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("Failed to open log file {}", log_path.display()))?;

    let (non_blocking, guard) = tracing_appender::non_blocking(file);

    tracing_subscriber::fmt()
        .with_max_level(tracing_level)
        .with_writer(non_blocking.with_max_level(tracing_level))
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .init();

    tracing::info!("vmctl started with log level: {:?}", level);
    tracing::info!("Log file: {:?}", log_path);

    Ok(Some(guard))
}

fn get_log_path() -> PathBuf {
    if let Some(config_dir) = dirs::config_dir() {
        return config_dir.join("vmctl").join("vmctl.log");
    }
    if let Some(home) = dirs::home_dir() {
        return home.join(".vmctl").join("vmctl.log");
    }
    PathBuf::from("vmctl.log")
}

/// Build the provider: simulated inventory or a live session
async fn connect(args: &Args, config: &Config) -> Result<Box<dyn ResourceProvider>> {
    if let Some(inventory) = &args.simulate {
        let provider = InMemoryProvider::from_file(inventory)?;
        return Ok(Box::new(provider));
    }

    let host = config.effective_host(args.host.as_deref()).context(
        "No endpoint configured. Set vcenter_host in vcenterconfig.json or use --host",
    )?;
    let user = config
        .effective_user(args.user.as_deref())
        .context("No user configured. Set username in vcenterconfig.json or use --user")?;

    println!("Endpoint: {}", host);
    println!("Username: {}", user);

    let password = match std::env::var(PASSWORD_ENV) {
        Ok(password) if !password.is_empty() => password,
        _ => console::prompt_password("Enter password: ")?,
    };

    let credentials = Credentials::new(&user, &password);
    let provider = RestProvider::connect(&host, credentials, args.insecure || config.insecure)
        .await
        .map_err(|e| anyhow::anyhow!("{}", format_api_error(&e)))?;

    tracing::info!("Connected to {}", host);
    Ok(Box::new(provider))
}

async fn run(args: &Args, config: &Config, provider: &dyn ResourceProvider) -> Result<()> {
    match args.command.clone().unwrap_or(Mode::Menu) {
        Mode::Menu => {
            let mut dispatcher =
                Dispatcher::new(provider, config.controller_options()).readonly(args.readonly);
            dispatcher
                .run(&mut StdinSource::new(), &mut ConsoleSink)
                .await
        }
        Mode::Report { filter } => {
            let query = match filter {
                Some(q) => q,
                None => console::prompt_line("Enter VM name (leave blank for all VMs): ")?,
            };
            let report = report::build_report(provider, Some(&query)).await?;
            console::print_report(&report);
            Ok(())
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let _log_guard = setup_logging(args.log_level)?;

    let config = Config::load(args.config.as_deref())?;
    let provider = connect(&args, &config).await?;

    let result = run(&args, &config, provider.as_ref()).await;

    // Release the session whether or not the run succeeded
    if let Err(e) = provider.disconnect().await {
        tracing::warn!("Failed to close session: {:#}", e);
    }

    if let Err(err) = &result {
        tracing::error!("Session ended with error: {:#}", err);
    }
    result
}
