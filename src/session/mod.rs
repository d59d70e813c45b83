/// Conversation session - Gateway

mod conversation;
mod stream;

pub use conversation::Session;
pub use stream::TurnStream;
