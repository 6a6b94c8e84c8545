/// Outbound mail
///
/// Delivery is best effort. Callers go through [`send_best_effort`], which
/// logs the message content when delivery fails so that an operator can
/// still act on it (a password-reset link, for example).

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Relay request timeout
const RELAY_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("Mail relay request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Mail relay rejected message with status {0}")]
    Rejected(u16),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MailMessage {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Mail delivery backend
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, message: &MailMessage) -> Result<(), MailError>;
}

/// Writes messages to the log instead of delivering them
#[derive(Debug, Clone, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, message: &MailMessage) -> Result<(), MailError> {
        tracing::info!(
            from = %message.from,
            to = %message.to,
            subject = %message.subject,
            body = %message.body,
            "Mail (log only)"
        );
        Ok(())
    }
}

/// POSTs each message as JSON to an HTTP mail relay
#[derive(Debug, Clone)]
pub struct RelayMailer {
    url: String,
    client: reqwest::Client,
}

impl RelayMailer {
    pub fn new(url: impl Into<String>) -> Result<Self, MailError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(RELAY_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            url: url.into(),
            client,
        })
    }
}

#[async_trait]
impl Mailer for RelayMailer {
    async fn send(&self, message: &MailMessage) -> Result<(), MailError> {
        let response = self.client.post(&self.url).json(message).send().await?;

        if !response.status().is_success() {
            return Err(MailError::Rejected(response.status().as_u16()));
        }

        tracing::debug!(to = %message.to, subject = %message.subject, "Mail relayed");
        Ok(())
    }
}

/// Sends `message`, logging its content on failure
///
/// Returns whether delivery succeeded.
pub async fn send_best_effort(mailer: &dyn Mailer, message: &MailMessage) -> bool {
    match mailer.send(message).await {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(
                error = %e,
                to = %message.to,
                subject = %message.subject,
                body = %message.body,
                "Mail delivery failed"
            );
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingMailer;

    #[async_trait]
    impl Mailer for FailingMailer {
        async fn send(&self, _message: &MailMessage) -> Result<(), MailError> {
            Err(MailError::Rejected(502))
        }
    }

    fn message() -> MailMessage {
        MailMessage {
            from: "noreply@rolodex.local".to_string(),
            to: "ada@example.com".to_string(),
            subject: "Hello".to_string(),
            body: "Test".to_string(),
        }
    }

    #[tokio::test]
    async fn test_log_mailer_always_succeeds() {
        assert!(send_best_effort(&LogMailer, &message()).await);
    }

    #[tokio::test]
    async fn test_failure_is_reported_not_raised() {
        assert!(!send_best_effort(&FailingMailer, &message()).await);
    }

    #[tokio::test]
    async fn test_unreachable_relay_fails() {
        // Port 9 (discard) on localhost is not expected to speak HTTP
        let relay = RelayMailer::new("http://127.0.0.1:9/send").unwrap();
        assert!(relay.send(&message()).await.is_err());
    }
}
