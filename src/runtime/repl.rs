use anyhow::{Context, Result};
use colored::Colorize;
use futures::StreamExt;
use std::io::Write;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use crate::session::Session;

/// A slash command typed at the prompt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplCommand {
    Models,
    Switch(Option<String>),
    Clear,
    ToggleStream,
    Help,
    Exit,
    Unknown(String),
}

/// One line of terminal input
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplInput {
    Empty,
    Command(ReplCommand),
    Message(String),
}

/// Classify a line of input. Command words are case-insensitive.
pub fn parse_input(line: &str) -> ReplInput {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return ReplInput::Empty;
    }

    if !trimmed.starts_with('/') {
        return ReplInput::Message(trimmed.to_string());
    }

    let mut parts = trimmed.split_whitespace();
    let cmd = parts.next().unwrap_or_default().to_lowercase();
    let arg = parts.next().map(str::to_string);

    let command = match cmd.as_str() {
        "/exit" | "/quit" => ReplCommand::Exit,
        "/help" => ReplCommand::Help,
        "/models" => ReplCommand::Models,
        "/switch" => ReplCommand::Switch(arg),
        "/clear" => ReplCommand::Clear,
        "/stream" => ReplCommand::ToggleStream,
        _ => ReplCommand::Unknown(cmd),
    };
    ReplInput::Command(command)
}

/// Line-oriented chat loop over a session
pub struct Repl<W: Write> {
    session: Session,
    streaming: bool,
    out: W,
}

impl<W: Write> Repl<W> {
    pub fn new(session: Session, streaming: bool, out: W) -> Self {
        Self {
            session,
            streaming,
            out,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming
    }

    /// Run until `/exit` or end of input
    pub async fn run<R>(&mut self, input: R) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
    {
        self.show_banner()?;

        let mut lines = input.lines();
        loop {
            write!(self.out, "{} ", "You:".green().bold())?;
            self.out.flush()?;

            let Some(line) = lines.next_line().await.context("Failed to read input")? else {
                writeln!(self.out)?;
                break;
            };

            if !self.handle_line(&line).await? {
                break;
            }
        }

        Ok(())
    }

    /// Handle one line. Returns `false` when the loop should stop.
    pub async fn handle_line(&mut self, line: &str) -> Result<bool> {
        match parse_input(line) {
            ReplInput::Empty => {}
            ReplInput::Message(text) => self.chat(&text).await?,
            ReplInput::Command(ReplCommand::Exit) => {
                writeln!(self.out, "Goodbye!")?;
                return Ok(false);
            }
            ReplInput::Command(ReplCommand::Help) => self.show_help()?,
            ReplInput::Command(ReplCommand::Models) => self.show_models()?,
            ReplInput::Command(ReplCommand::Switch(arg)) => self.switch_model(arg.as_deref())?,
            ReplInput::Command(ReplCommand::Clear) => {
                self.session.clear();
                writeln!(self.out, "\nChat history cleared.\n")?;
            }
            ReplInput::Command(ReplCommand::ToggleStream) => {
                self.streaming = !self.streaming;
                let state = if self.streaming { "ON" } else { "OFF" };
                writeln!(self.out, "\nStreaming mode: {}\n", state)?;
            }
            ReplInput::Command(ReplCommand::Unknown(_)) => {
                writeln!(self.out, "\nUnknown command. Type /help for available commands.\n")?;
            }
        }
        Ok(true)
    }

    fn show_banner(&mut self) -> Result<()> {
        writeln!(self.out, "=================================")?;
        writeln!(self.out, "   Gemini AI Chat Application")?;
        writeln!(self.out, "=================================")?;
        writeln!(self.out, "Current model: {}", self.session.current_model().cyan())?;
        writeln!(self.out, "Type /help for commands\n")?;
        Ok(())
    }

    fn show_help(&mut self) -> Result<()> {
        writeln!(
            self.out,
            "\nCommands:\n  \
             /models     - Show available models\n  \
             /switch <n> - Switch to model number n\n  \
             /clear      - Clear chat history\n  \
             /stream     - Toggle streaming mode\n  \
             /help       - Show this help\n  \
             /exit       - Exit the program\n\n\
             Current model: {}\n",
            self.session.current_model()
        )?;
        Ok(())
    }

    fn show_models(&mut self) -> Result<()> {
        let current = self.session.current_model();
        writeln!(self.out, "\nAvailable models:")?;
        for (key, model) in self.session.list_models().iter() {
            let marker = if model.id == current { " (current)" } else { "" };
            writeln!(self.out, "  {}. {}{}", key, model.name, marker.green())?;
        }
        writeln!(self.out, "\nUse /switch <number> to change model\n")?;
        Ok(())
    }

    fn switch_model(&mut self, key: Option<&str>) -> Result<()> {
        match key.map(|k| self.session.select_model(k)) {
            Some(Ok(model)) => {
                writeln!(
                    self.out,
                    "\nSwitched to {}\nChat history cleared.\n",
                    model.id.cyan()
                )?;
            }
            _ => {
                writeln!(
                    self.out,
                    "\nInvalid model number. Use /models to see available options.\n"
                )?;
            }
        }
        Ok(())
    }

    /// Send one turn and print the reply; turn errors are reported, not returned
    async fn chat(&mut self, text: &str) -> Result<()> {
        if self.streaming {
            return self.chat_streaming(text).await;
        }

        match self.session.send_turn(text).await {
            Ok(reply) => {
                writeln!(self.out, "\n{} {}\n", "Assistant:".cyan().bold(), reply.text)?;
            }
            Err(e) => {
                writeln!(self.out, "\n{} {}\n", "Error:".red().bold(), e)?;
            }
        }
        Ok(())
    }

    async fn chat_streaming(&mut self, text: &str) -> Result<()> {
        let mut turn = match self.session.send_turn_streaming(text).await {
            Ok(turn) => turn,
            Err(e) => {
                writeln!(self.out, "\n{} {}\n", "Error:".red().bold(), e)?;
                return Ok(());
            }
        };

        write!(self.out, "\n{} ", "Assistant:".cyan().bold())?;
        while let Some(fragment) = turn.next().await {
            match fragment {
                Ok(fragment) => {
                    write!(self.out, "{}", fragment)?;
                    self.out.flush()?;
                }
                Err(e) => {
                    writeln!(self.out, "\n{} {}\n", "Error:".red().bold(), e)?;
                    return Ok(());
                }
            }
        }
        writeln!(self.out, "\n")?;
        Ok(())
    }
}
