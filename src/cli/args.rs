use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "gemini-chat")]
#[command(version)]
#[command(about = "Chat with Gemini models from the terminal or over HTTP", long_about = None)]
pub struct Cli {
    /// Model to start with, by catalog key or id (e.g., 1, gemini-1.5-pro)
    #[arg(short, long)]
    pub model: Option<String>,

    /// Path to configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    pub verbose: bool,

    /// Start the terminal chat in streaming mode
    #[arg(short, long)]
    pub stream: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Start an interactive chat session (default)
    Chat,
    /// Run the HTTP API server
    Serve {
        /// Address to bind (overrides config)
        #[arg(long)]
        host: Option<String>,
        /// Port to listen on (overrides config)
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// List available models
    Models,
    /// Write a default configuration file
    Init,
    /// Show version information
    Version,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_chat() {
        let cli = Cli::parse_from(["gemini-chat"]);
        assert!(cli.command.is_none());
        assert!(!cli.stream);
    }

    #[test]
    fn test_serve_overrides() {
        let cli = Cli::parse_from(["gemini-chat", "--model", "3", "serve", "--port", "8080"]);
        assert_eq!(cli.model.as_deref(), Some("3"));
        match cli.command {
            Some(Commands::Serve { host, port }) => {
                assert_eq!(host, None);
                assert_eq!(port, Some(8080));
            }
            other => panic!("Expected serve, got {:?}", other),
        }
    }
}
