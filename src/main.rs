// ABOUTME: Entry point for the slink binary
// ABOUTME: Loads config, initializes logging and metrics, then runs, sends or dumps the directory

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use slink::config::Config;
use slink::handler::LoggingHandler;
use slink::logging;
use slink::platform::SlackTransport;
use slink_core::{EntityKind, RelayError, Supervisor};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

#[derive(Parser)]
#[command(name = "slink", version, about = "Slack adapter for chat bots")]
struct Cli {
    /// Path to config.toml (defaults to ./config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Connect and log every received message (default)
    Run,
    /// Send one message to a channel, group or user by name, then exit
    Send {
        /// Destination display name, without '#'
        #[arg(long)]
        to: String,
        /// Message text
        text: String,
        /// Seconds to wait for the directory before giving up
        #[arg(long, default_value_t = 30)]
        timeout: u64,
    },
    /// Print the cached channels, groups and users, then exit
    Directory {
        /// Seconds to wait for the directory before giving up
        #[arg(long, default_value_t = 30)]
        timeout: u64,
    },
}

type Runner = JoinHandle<Result<(), RelayError>>;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = Config::load(cli.config.as_deref())?;
    let _log_guard = logging::init(&config.logging)?;

    tracing::info!(
        protocol = %config.adapter.protocol,
        event_buffer = config.adapter.event_buffer,
        log_format = ?config.logging.format,
        "Configuration loaded"
    );

    if let Some(addr) = config.metrics.socket_addr()? {
        slink::metrics::init_metrics(addr)?;
    }

    let transport = Arc::new(SlackTransport::new(config.adapter.event_buffer)?);
    let handler = Arc::new(LoggingHandler::new());
    let supervisor = Arc::new(Supervisor::new(
        transport,
        handler,
        config.adapter.clone(),
    ));

    let credential = config.slack.credential();
    let mut runner: Runner = {
        let supervisor = Arc::clone(&supervisor);
        tokio::spawn(async move { supervisor.run(&credential).await })
    };

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => {
            tokio::select! {
                result = &mut runner => return finish(result),
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("Ctrl-C received, shutting down");
                    supervisor.shutdown();
                }
            }
        }
        Command::Send { to, text, timeout } => {
            wait_ready(&supervisor, &mut runner, timeout).await?;
            supervisor
                .outbound()
                .send(&to, &text)
                .await
                .with_context(|| format!("Failed to send to {}", to))?;
            println!("Sent to {}", to);
            supervisor.shutdown();
        }
        Command::Directory { timeout } => {
            wait_ready(&supervisor, &mut runner, timeout).await?;
            print_directory(&supervisor);
            supervisor.shutdown();
        }
    }

    finish(runner.await)
}

/// Block until the first full directory population, the timeout, or the
/// supervisor ending early (e.g. rejected credentials)
async fn wait_ready(supervisor: &Supervisor, runner: &mut Runner, timeout_secs: u64) -> Result<()> {
    let readiness = supervisor.readiness();
    tokio::select! {
        ready = tokio::time::timeout(Duration::from_secs(timeout_secs), readiness.wait()) => {
            ready.map_err(|_| anyhow::anyhow!("Directory not ready after {}s", timeout_secs))
        }
        result = runner => {
            finish(result)?;
            anyhow::bail!("Connection closed before the directory was ready")
        }
    }
}

fn finish(result: std::result::Result<Result<(), RelayError>, tokio::task::JoinError>) -> Result<()> {
    result.context("Supervisor task failed")??;
    tracing::info!("Supervisor finished");
    Ok(())
}

fn print_directory(supervisor: &Supervisor) {
    let directory = supervisor.directory();
    for kind in [
        EntityKind::PublicChannel,
        EntityKind::PrivateGroup,
        EntityKind::DirectUser,
    ] {
        let snapshot = directory.snapshot(kind);
        let mut records: Vec<_> = snapshot.values().collect();
        records.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));

        println!("{} ({})", kind, records.len());
        for record in records {
            match &record.real_name {
                Some(real_name) => println!("  {:<12} {} ({})", record.id, record.name, real_name),
                None => println!("  {:<12} {}", record.id, record.name),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults_to_run() {
        let cli = Cli::try_parse_from(["slink"]).unwrap();
        assert!(cli.command.is_none());
        assert!(cli.config.is_none());
    }

    #[test]
    fn test_cli_send_arguments() {
        let cli = Cli::try_parse_from([
            "slink",
            "--config",
            "/etc/slink.toml",
            "send",
            "--to",
            "general",
            "deploy finished",
        ])
        .unwrap();

        assert_eq!(cli.config, Some(PathBuf::from("/etc/slink.toml")));
        match cli.command {
            Some(Command::Send { to, text, timeout }) => {
                assert_eq!(to, "general");
                assert_eq!(text, "deploy finished");
                assert_eq!(timeout, 30);
            }
            _ => panic!("expected send"),
        }
    }

    #[test]
    fn test_cli_send_requires_destination() {
        assert!(Cli::try_parse_from(["slink", "send", "hello"]).is_err());
    }
}
