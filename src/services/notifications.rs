//! Notification dispatch.
//!
//! Fire-and-forget: the event processing loop calls `notify` after a booking
//! transaction commits and logs any failure. No notification outcome ever
//! influences the critical path.

use async_trait::async_trait;
use tracing::info;

use crate::events::Recipient;

/// Errors from a notification backend. Callers log these; they are never
/// propagated to the booking path.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("Delivery failed: {0}")]
    Delivery(String),
}

/// Abstract notification channel (push, email, in-app).
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(
        &self,
        recipient: &Recipient,
        title: &str,
        content: &str,
        metadata: serde_json::Value,
    ) -> Result<(), NotifyError>;
}

/// Default implementation: structured log lines. Deployments swap in a real
/// channel by injecting another `Notifier` at process start.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(
        &self,
        recipient: &Recipient,
        title: &str,
        content: &str,
        metadata: serde_json::Value,
    ) -> Result<(), NotifyError> {
        match recipient {
            Recipient::User(user_id) => {
                info!(user_id = %user_id, title, content, %metadata, "notification")
            }
            Recipient::Guest(email) => {
                info!(guest_email = %email, title, content, %metadata, "notification")
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[tokio::test]
    async fn log_notifier_accepts_both_recipient_kinds() {
        let notifier = LogNotifier;
        notifier
            .notify(
                &Recipient::User(Uuid::new_v4()),
                "Booking received",
                "hello",
                serde_json::json!({}),
            )
            .await
            .expect("user notify");
        notifier
            .notify(
                &Recipient::Guest("rider@example.com".into()),
                "Booking received",
                "hello",
                serde_json::json!({}),
            )
            .await
            .expect("guest notify");
    }
}
