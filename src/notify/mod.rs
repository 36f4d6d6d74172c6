//! Outbound notifications.
//!
//! Delivery is best-effort: callers use `send_best_effort`, which logs a
//! failed send and carries on. Consistency never depends on a message
//! arriving.

pub mod messages;
pub mod telegram;

use async_trait::async_trait;
use tracing::{info, warn};

pub use telegram::TelegramNotifier;

#[derive(Debug, Clone, thiserror::Error)]
pub enum NotifyError {
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Gave up after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: String },
}

/// A single fixed destination for text messages.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, text: &str) -> Result<(), NotifyError>;
}

/// Send and swallow failures. Returns whether the message went out.
pub async fn send_best_effort(notifier: &dyn Notifier, text: &str) -> bool {
    match notifier.send(text).await {
        Ok(()) => true,
        Err(e) => {
            warn!(error = %e, "Notification failed (continuing)");
            false
        }
    }
}

/// Dry-run notifier: writes messages to the log instead of sending them.
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, text: &str) -> Result<(), NotifyError> {
        info!(message = %text, "[DRY RUN] Notification");
        Ok(())
    }
}
