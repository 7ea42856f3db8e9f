use anyhow::Context;
use clap::Parser;
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use srehub_agent::config::constants::AGENT_VERSION;
use srehub_agent::utils::logging;
use srehub_agent::{AgentArgs, AgentConfig, AgentError, Command, TransportController};

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    // Parse command line arguments
    let args = AgentArgs::parse();

    match args.command {
        Command::Version => {
            println!("srehub-agent {}", AGENT_VERSION);
            Ok(ExitCode::SUCCESS)
        }
        Command::Run { config, log_level } => {
            let mut config = AgentConfig::load(&config)
                .with_context(|| format!("Failed to load configuration from {}", config.display()))?;
            if let Some(level) = log_level {
                config.log_level = level;
            }

            // The guard flushes file logs on exit.
            let _log_guard = match &config.log_file {
                Some(path) => Some(logging::init_file_logging(&config.log_level, path)?),
                None => {
                    logging::init_logging(&config.log_level)?;
                    None
                }
            };

            run_agent(config).await
        }
    }
}

async fn run_agent(config: AgentConfig) -> anyhow::Result<ExitCode> {
    info!("Starting SREHub agent {}", AGENT_VERSION);
    info!("Agent ID: {}, server: {}", config.agent_id, config.server_addr);

    let token = CancellationToken::new();
    tokio::spawn(wait_for_shutdown(token.clone()));

    let controller = TransportController::new(config);
    let result = controller.run(token.clone()).await;

    controller.terminals().close_all().await;

    match result {
        Err(AgentError::Cancelled) if token.is_cancelled() => {
            info!("Agent stopped");
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            error!("Agent exited with error: {}", e);
            Ok(ExitCode::FAILURE)
        }
        Ok(()) => Ok(ExitCode::SUCCESS),
    }
}

/// Cancel `token` on SIGINT or SIGTERM
async fn wait_for_shutdown(token: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let (mut sigterm, mut sigint) = match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
            (Ok(term), Ok(int)) => (term, int),
            (Err(e), _) | (_, Err(e)) => {
                error!("Failed to install signal handlers: {}", e);
                return;
            }
        };

        tokio::select! {
            _ = sigterm.recv() => info!("Received SIGTERM, shutting down"),
            _ = sigint.recv() => info!("Received SIGINT, shutting down"),
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
            return;
        }
        info!("Received Ctrl-C, shutting down");
    }

    token.cancel();
}
