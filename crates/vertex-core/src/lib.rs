pub mod config;
pub mod error;
pub mod message;
pub mod model;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::config::VertexConfig;
    pub use crate::error::{AuthError, ModelError, Result, VertexError};
    pub use crate::message::{ChatMessage, Role, UsageSummary};
    pub use crate::model::{CallOptions, ChatDelta, ChatModel, ChatResult, ChatStream, ChatStreamEvent};
}
