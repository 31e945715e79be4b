use async_trait::async_trait;
use thiserror::Error;

/// Custom error type for notification delivery
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum MailerError {
    /// The delivery endpoint could not be reached
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// Delivery did not complete in time
    #[error("Timeout error after {0:?}")]
    Timeout(std::time::Duration),

    /// The delivery endpoint refused the message
    #[error("Delivery rejected with status {status}: {body}")]
    Rejected { status: u16, body: String },
}

/// Mailer defines the port for sending templated notifications.
///
/// Only ever called from background tasks, never on a request path.
#[async_trait]
pub trait Mailer: Send + Sync + 'static {
    /// Send the message rendered from `template` with `data` to `recipient`
    async fn send(
        &self,
        recipient: &str,
        template: &str,
        data: serde_json::Value,
    ) -> Result<(), MailerError>;
}
