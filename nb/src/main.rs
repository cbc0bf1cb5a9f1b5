//! nanobridge - synchronous bridge to an asynchronous agent backend
//!
//! CLI entry point for serving the bridge and talking to the backend.

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use colored::Colorize;
use eyre::{Context, Result, eyre};
use tracing::{debug, info, warn};

use nanobridge::Utterance;
use nanobridge::cli::{Cli, Command, get_log_path};
use nanobridge::config::Config;
use nanobridge::dispatch::probe;
use nanobridge::server::BridgeService;

fn setup_logging(cli_log_level: Option<&str>, config_log_level: Option<&str>) -> Result<()> {
    // Note: Can't log params here since logging isn't initialized yet
    let log_path = get_log_path();
    if let Some(log_dir) = log_path.parent() {
        fs::create_dir_all(log_dir).context("Failed to create log directory")?;
    }

    // Determine log level with priority: CLI --log-level > config file > default (INFO)
    let level = match cli_log_level.or(config_log_level) {
        Some(s) => match s.to_uppercase().as_str() {
            "TRACE" => tracing::Level::TRACE,
            "DEBUG" => tracing::Level::DEBUG,
            "INFO" => tracing::Level::INFO,
            "WARN" | "WARNING" => tracing::Level::WARN,
            "ERROR" => tracing::Level::ERROR,
            _ => {
                eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", s);
                tracing::Level::INFO
            }
        },
        None => tracing::Level::INFO,
    };

    let log_file = fs::File::create(&log_path).context("Failed to create log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (level: {:?})", level);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging with priority: CLI > config > INFO default
    let config_log_level = Config::load_log_level(cli.config.as_ref());
    setup_logging(cli.log_level.as_deref(), config_log_level.as_deref()).context("Failed to setup logging")?;

    match cli.command {
        Command::Serve => cmd_serve(&load_config(cli.config.as_ref())?).await,
        Command::Ask { text, timeout } => cmd_ask(&load_config(cli.config.as_ref())?, text, timeout).await,
        Command::Check { url } => cmd_check(&load_config(cli.config.as_ref())?, url).await,
        Command::Init {
            backend_url,
            agent_name,
            output,
            force,
        } => cmd_init(backend_url, agent_name, output, force),
        Command::ShowConfig => cmd_show_config(&load_config(cli.config.as_ref())?),
    }
}

fn load_config(path: Option<&PathBuf>) -> Result<Config> {
    let config = Config::load(path).context("Failed to load configuration")?;
    info!(
        "nanobridge loaded config: agent={}, backend={}",
        config.backend.agent_name,
        config.backend.url.as_deref().unwrap_or("<unregistered>")
    );
    Ok(config)
}

/// Resolve on SIGINT or SIGTERM (Ctrl+C elsewhere)
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match (signal(SignalKind::interrupt()), signal(SignalKind::terminate())) {
            (Ok(mut sigint), Ok(mut sigterm)) => {
                tokio::select! {
                    _ = sigint.recv() => warn!("SIGINT received"),
                    _ = sigterm.recv() => warn!("SIGTERM received"),
                }
                return;
            }
            (Err(e), _) | (_, Err(e)) => {
                warn!(error = %e, "Failed to install signal handlers, falling back to ctrl_c");
            }
        }
    }

    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for ctrl_c");
        std::future::pending::<()>().await;
    }
    debug!("shutdown_signal: ctrl_c received");
}

async fn cmd_serve(config: &Config) -> Result<()> {
    let service = BridgeService::bind(config).await?;

    println!("{} {}", "Listening on".green(), service.local_addr());
    println!("  webhook:      {}", service.webhook_url());
    println!("  conversation: http://{}/api/conversation", service.local_addr());
    match config.backend.url.as_deref() {
        Some(url) => println!("  backend:      {}", url),
        None => println!("  backend:      {}", "waiting for /api/register".yellow()),
    }

    service.run(shutdown_signal()).await
}

async fn cmd_ask(config: &Config, text: String, timeout: Option<f64>) -> Result<()> {
    let timeout = timeout
        .map(Duration::try_from_secs_f64)
        .transpose()
        .map_err(|e| eyre!("Invalid --timeout: {}", e))?;

    let service = BridgeService::bind(config).await?;
    let bridge = service.bridge();

    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let server = tokio::spawn(service.run(async move {
        let _ = stop_rx.await;
    }));

    let result = bridge.process_utterance(Utterance::new(text), timeout).await;

    let _ = stop_tx.send(());
    match server.await {
        Ok(Err(e)) => warn!(error = %e, "Server ended with error"),
        Err(e) => warn!(error = %e, "Server task failed"),
        Ok(Ok(())) => {}
    }

    match result {
        Ok(reply) => {
            println!("{}", reply.text);
            Ok(())
        }
        Err(e) => {
            eprintln!("{} {}", "Error:".red(), e);
            Err(eyre!(e))
        }
    }
}

async fn cmd_check(config: &Config, url: Option<String>) -> Result<()> {
    let url = url
        .or_else(|| config.backend.url.clone())
        .ok_or_else(|| eyre!("No backend URL given and backend.url is not configured"))?;

    match probe(&url).await {
        Ok(status) if status < 500 => {
            println!("{} {} (HTTP {})", "✓ reachable".green(), url, status);
            Ok(())
        }
        Ok(status) => {
            println!("{} {} (HTTP {})", "✗ unhealthy".red(), url, status);
            Err(eyre!("Backend at {} answered HTTP {}", url, status))
        }
        Err(e) => {
            println!("{} {} ({})", "✗ unreachable".red(), url, e);
            Err(eyre!("Backend at {} is unreachable: {}", url, e))
        }
    }
}

fn cmd_init(
    backend_url: Option<String>,
    agent_name: Option<String>,
    output: Option<PathBuf>,
    force: bool,
) -> Result<()> {
    let path = output
        .or_else(Config::user_config_path)
        .unwrap_or_else(|| PathBuf::from(".nanobridge.yml"));
    if path.exists() && !force {
        return Err(eyre!("{} already exists (use --force to overwrite)", path.display()));
    }

    let mut config = Config::default();
    config.backend.url = backend_url
        .map(|u| u.trim().trim_end_matches('/').to_string())
        .filter(|u| !u.is_empty());
    if let Some(name) = agent_name.map(|n| n.trim().to_string()).filter(|n| !n.is_empty()) {
        config.backend.agent_name = name;
    }
    config.save(&path)?;

    println!("{} {}", "Wrote".green(), path.display());
    println!("  webhook-id: {}", config.server.webhook_id);
    Ok(())
}

fn cmd_show_config(config: &Config) -> Result<()> {
    print!("{}", config.to_yaml()?);
    Ok(())
}
