// Gateway module for models - follows the Train Station Pattern
// All external access must go through this gateway

// Private submodules - not directly accessible from outside
mod catalog;
mod factory;
mod gemini;
mod traits;
mod types;

// Public re-exports - the ONLY way to access model functionality
pub use catalog::{default_catalog_entries, CatalogEntry, ModelCatalog};
pub use factory::ModelFactory;
pub use gemini::GeminiClient;
pub use traits::ModelClient;
#[cfg(test)]
pub use traits::MockModelClient;
pub use types::{ChatMessage, FragmentStream, MessageRole, ModelEntry};
