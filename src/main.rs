use anyhow::Result;
use clap::Parser;

use gemini_chat::{app::load_env_file, cli::Cli, runtime::Orchestrator, utils::init_logger};
use tracing::debug;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // .env is read before the logger so RUST_LOG can live there too
    let env_file = load_env_file(None);
    init_logger(cli.verbose);
    if let Some(path) = env_file {
        debug!("Loaded environment from {}", path.display());
    }

    let orchestrator = Orchestrator::new(cli)?;
    orchestrator.run().await
}
