/// Runtime module - terminal and HTTP drivers over the conversation session
mod orchestrator;
mod repl;
mod server;

pub use orchestrator::Orchestrator;
pub use repl::{parse_input, Repl, ReplCommand, ReplInput};
pub use server::{
    router, serve, ChatRequest, ChatResponse, ErrorResponse, ServerState, WireMessage, WirePart,
};
