pub mod http_errors;
pub mod http_handler;
pub mod in_memory_store;
pub mod json_body;
pub mod mailer;
pub mod middleware;

/// Re-export commonly used types from adapters
pub use http_handler::{AppState, pipeline, router, routes};
pub use in_memory_store::InMemoryStore;
pub use json_body::JsonBody;
pub use mailer::{LogMailer, WebhookMailer};
pub use middleware::*;
