//! CLI command definitions and subcommands

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::debug;

/// nanobridge - synchronous front door for an asynchronous agent backend
#[derive(Parser)]
#[command(
    name = "nb",
    about = "Bridge synchronous questions to a webhook-answering agent backend",
    version = env!("CARGO_PKG_VERSION"),
    after_help = "Logs are written to: ~/.local/share/nanobridge/logs/nanobridge.log"
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[arg(
        short = 'l',
        long = "log-level",
        global = true,
        help = "Log level (TRACE, DEBUG, INFO, WARN, ERROR)"
    )]
    pub log_level: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the HTTP server (callback webhook, registration and conversation API)
    Serve,

    /// Send one utterance and print the answer
    Ask {
        /// Text to send
        text: String,

        /// Seconds to wait for the answer (defaults to backend.request-timeout-secs)
        #[arg(short, long)]
        timeout: Option<f64>,
    },

    /// Check whether the backend is reachable
    Check {
        /// Backend URL (defaults to backend.url)
        url: Option<String>,
    },

    /// Write a new config file with a fresh webhook id
    Init {
        /// Backend URL to POST utterances to
        #[arg(long)]
        backend_url: Option<String>,

        /// Display name of the agent
        #[arg(long)]
        agent_name: Option<String>,

        /// Where to write the file (defaults to ~/.config/nanobridge/nanobridge.yml)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Print the effective configuration as YAML
    ShowConfig,
}

/// Get the log file path
pub fn get_log_path() -> PathBuf {
    debug!("get_log_path: called");
    let path = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("nanobridge")
        .join("logs")
        .join("nanobridge.log");
    debug!(?path, "get_log_path: returning path");
    path
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse_serve() {
        let cli = Cli::parse_from(["nb", "serve"]);
        assert!(matches!(cli.command, Command::Serve));
        assert!(cli.config.is_none());
    }

    #[test]
    fn test_cli_parse_ask_with_timeout() {
        let cli = Cli::parse_from(["nb", "ask", "turn on the lights", "--timeout", "2.5"]);
        match cli.command {
            Command::Ask { text, timeout } => {
                assert_eq!(text, "turn on the lights");
                assert_eq!(timeout, Some(2.5));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_cli_parse_global_flags_after_subcommand() {
        let cli = Cli::parse_from(["nb", "check", "-c", "/tmp/nb.yml", "-l", "debug"]);
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/nb.yml")));
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
        assert!(matches!(cli.command, Command::Check { url: None }));
    }

    #[test]
    fn test_cli_parse_init() {
        let cli = Cli::parse_from([
            "nb",
            "init",
            "--backend-url",
            "http://nanobot:18790/ha/",
            "--agent-name",
            "Jarvis",
            "--output",
            "nb.yml",
        ]);
        match cli.command {
            Command::Init {
                backend_url,
                agent_name,
                output,
                force,
            } => {
                assert_eq!(backend_url.as_deref(), Some("http://nanobot:18790/ha/"));
                assert_eq!(agent_name.as_deref(), Some("Jarvis"));
                assert_eq!(output, Some(PathBuf::from("nb.yml")));
                assert!(!force);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_cli_requires_subcommand() {
        assert!(Cli::try_parse_from(["nb"]).is_err());
    }

    #[test]
    fn test_log_path() {
        let path = get_log_path();
        assert!(path.ends_with("nanobridge/logs/nanobridge.log"));
    }
}
