use anyhow::{Context, Result};
use colored::Colorize;
use std::sync::Arc;
use tokio::io::BufReader;
use tracing::{debug, warn};

use super::repl::Repl;
use super::server::{serve, ServerState};
use crate::{
    app::{load_config, load_config_from, Config},
    cli::{handle_command, Cli, Commands},
    models::ModelFactory,
    session::Session,
};

/// Main runtime orchestrator
pub struct Orchestrator {
    cli: Cli,
    config: Config,
}

impl Orchestrator {
    /// Create a new orchestrator from CLI args
    pub fn new(cli: Cli) -> Result<Self> {
        let config = if let Some(config_path) = &cli.config {
            load_config_from(config_path)?
        } else {
            match load_config() {
                Ok(cfg) => cfg,
                Err(e) => {
                    warn!("Failed to load config: {:#}. Using defaults.", e);
                    Config::default()
                }
            }
        };

        Ok(Self { cli, config })
    }

    /// Run the orchestrator
    pub async fn run(self) -> Result<()> {
        if let Some(command) = &self.cli.command {
            if handle_command(command, &self.config)? {
                return Ok(());
            }
        }

        match self.cli.command.clone() {
            Some(Commands::Serve { host, port }) => self.run_server(host, port).await,
            _ => self.run_chat().await,
        }
    }

    /// Model to start with (CLI arg > config)
    fn initial_model(&self) -> &str {
        self.cli
            .model
            .as_deref()
            .unwrap_or(&self.config.default_model)
    }

    /// Interactive terminal chat on stdin/stdout
    async fn run_chat(&self) -> Result<()> {
        let client = ModelFactory::create(&self.config.api)?;
        let catalog = Arc::new(self.config.catalog()?);
        let session = Session::new(client, catalog, self.initial_model())
            .context("Could not start chat session")?;

        let streaming = self.cli.stream || self.config.stream;
        debug!(model = %session.current_model(), streaming, "Starting chat session");

        let mut repl = Repl::new(session, streaming, std::io::stdout());
        repl.run(BufReader::new(tokio::io::stdin())).await
    }

    /// Stateless HTTP API
    async fn run_server(&self, host: Option<String>, port: Option<u16>) -> Result<()> {
        let client = ModelFactory::create(&self.config.api)?;
        let catalog = Arc::new(self.config.catalog()?);

        let host = host.unwrap_or_else(|| self.config.server.host.clone());
        let port = port.unwrap_or(self.config.server.port);

        println!(
            "Serving {} models on {}",
            catalog.len(),
            format!("http://{}:{}", host, port).green()
        );

        serve(ServerState::new(client, catalog), &host, port).await
    }
}
