pub mod app;
pub mod cli;
pub mod constants;
pub mod models;
pub mod runtime;
pub mod session;
pub mod utils;

pub use app::{load_config, Config};
pub use models::{ChatMessage, GeminiClient, MessageRole, ModelCatalog, ModelClient, ModelFactory};
pub use session::{Session, TurnStream};
pub use utils::{ModelError, SessionError};
