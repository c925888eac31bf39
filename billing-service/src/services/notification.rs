//! Notification collaborators: SMTP email, HTTP SMS, and a mock.
//!
//! Notifications are fire-and-forget from the core's point of view:
//! [`notify_best_effort`] logs failures and never propagates them, so a
//! state transition is never rolled back because a message did not go out.

use crate::config::{SmsConfig, SmtpConfig};
use async_trait::async_trait;
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::Mailbox,
    transport::smtp::authentication::Credentials,
};
use secrecy::ExposeSecret;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NotifierError {
    #[error("Notifier not enabled: {0}")]
    NotEnabled(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Send error: {0}")]
    SendFailed(String),

    #[error("Invalid recipient: {0}")]
    InvalidRecipient(String),
}

/// Where a notification goes.
#[derive(Debug, Clone)]
pub enum Recipient {
    Email(String),
    /// Full phone number including country code.
    Phone(String),
}

impl Recipient {
    pub fn as_str(&self) -> &str {
        match self {
            Recipient::Email(s) | Recipient::Phone(s) => s,
        }
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, recipient: &Recipient, message: &str) -> Result<(), NotifierError>;
}

/// Send without letting a failure escape. The caller's transition has
/// already committed; all we can do is log.
pub async fn notify_best_effort(notifier: &dyn Notifier, recipient: &Recipient, message: &str) {
    if let Err(e) = notifier.notify(recipient, message).await {
        tracing::warn!(
            recipient = %recipient.as_str(),
            error = %e,
            "Notification delivery failed"
        );
    }
}

// -------------------------------------------------------------------------
// SMTP email
// -------------------------------------------------------------------------

pub struct SmtpNotifier {
    config: SmtpConfig,
    transport: Option<AsyncSmtpTransport<Tokio1Executor>>,
}

impl SmtpNotifier {
    pub fn new(config: SmtpConfig) -> Result<Self, NotifierError> {
        if !config.enabled {
            return Ok(Self {
                config,
                transport: None,
            });
        }

        let creds = Credentials::new(
            config.user.clone(),
            config.password.expose_secret().clone(),
        );

        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
            .map_err(|e| {
                NotifierError::Configuration(format!("Failed to create SMTP relay: {}", e))
            })?
            .port(config.port)
            .credentials(creds)
            .build();

        Ok(Self {
            config,
            transport: Some(transport),
        })
    }
}

#[async_trait]
impl Notifier for SmtpNotifier {
    async fn notify(&self, recipient: &Recipient, message: &str) -> Result<(), NotifierError> {
        if !self.config.enabled {
            return Err(NotifierError::NotEnabled(
                "SMTP notifier is not enabled".to_string(),
            ));
        }

        let Recipient::Email(address) = recipient else {
            return Err(NotifierError::InvalidRecipient(
                "SMTP notifier requires an email recipient".to_string(),
            ));
        };

        let transport = self.transport.as_ref().ok_or_else(|| {
            NotifierError::Configuration("SMTP transport not initialized".to_string())
        })?;

        let from_mailbox: Mailbox =
            format!("{} <{}>", self.config.from_name, self.config.from_email)
                .parse()
                .map_err(|e| {
                    NotifierError::Configuration(format!("Invalid from address: {}", e))
                })?;

        let to_mailbox: Mailbox = address
            .parse()
            .map_err(|e| NotifierError::InvalidRecipient(format!("Invalid recipient: {}", e)))?;

        let email = Message::builder()
            .from(from_mailbox)
            .to(to_mailbox)
            .subject("Notification")
            .body(message.to_string())
            .map_err(|e| NotifierError::SendFailed(format!("Failed to build message: {}", e)))?;

        transport
            .send(email)
            .await
            .map_err(|e| NotifierError::SendFailed(format!("SMTP send failed: {}", e)))?;

        tracing::info!(recipient = %address, "Email notification sent");
        Ok(())
    }
}

// -------------------------------------------------------------------------
// HTTP SMS
// -------------------------------------------------------------------------

pub struct SmsNotifier {
    config: SmsConfig,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct SmsRequest {
    sender: String,
    sms: Vec<SmsEntry>,
}

#[derive(Debug, Serialize)]
struct SmsEntry {
    message: String,
    to: Vec<String>,
}

impl SmsNotifier {
    pub fn new(config: SmsConfig, client: reqwest::Client) -> Self {
        Self { config, client }
    }
}

#[async_trait]
impl Notifier for SmsNotifier {
    async fn notify(&self, recipient: &Recipient, message: &str) -> Result<(), NotifierError> {
        if !self.config.enabled {
            return Err(NotifierError::NotEnabled(
                "SMS notifier is not enabled".to_string(),
            ));
        }

        let Recipient::Phone(number) = recipient else {
            return Err(NotifierError::InvalidRecipient(
                "SMS notifier requires a phone recipient".to_string(),
            ));
        };

        // Keep digits and the leading +, drop formatting characters.
        let normalized: String = number
            .chars()
            .filter(|c| c.is_ascii_digit() || *c == '+')
            .collect();
        if normalized.is_empty() {
            return Err(NotifierError::InvalidRecipient(
                "Phone number is empty".to_string(),
            ));
        }

        let request = SmsRequest {
            sender: self.config.sender_id.clone(),
            sms: vec![SmsEntry {
                message: message.to_string(),
                to: vec![normalized.clone()],
            }],
        };

        let response = self
            .client
            .post(&self.config.api_url)
            .header("authkey", self.config.auth_key.expose_secret())
            .json(&request)
            .send()
            .await
            .map_err(|e| NotifierError::Connection(format!("Failed to reach SMS API: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(NotifierError::SendFailed(format!(
                "SMS API returned {}: {}",
                status, body
            )));
        }

        tracing::info!(recipient = %normalized, "SMS notification sent");
        Ok(())
    }
}

// -------------------------------------------------------------------------
// Routing and mock
// -------------------------------------------------------------------------

/// Routes by recipient kind: email through SMTP, phone through SMS.
pub struct CompositeNotifier {
    email: Box<dyn Notifier>,
    sms: Box<dyn Notifier>,
}

impl CompositeNotifier {
    pub fn new(email: Box<dyn Notifier>, sms: Box<dyn Notifier>) -> Self {
        Self { email, sms }
    }
}

#[async_trait]
impl Notifier for CompositeNotifier {
    async fn notify(&self, recipient: &Recipient, message: &str) -> Result<(), NotifierError> {
        match recipient {
            Recipient::Email(_) => self.email.notify(recipient, message).await,
            Recipient::Phone(_) => self.sms.notify(recipient, message).await,
        }
    }
}

/// In-memory notifier capturing messages for assertions.
#[derive(Default)]
pub struct MockNotifier {
    pub sent: std::sync::Mutex<Vec<(String, String)>>,
}

#[async_trait]
impl Notifier for MockNotifier {
    async fn notify(&self, recipient: &Recipient, message: &str) -> Result<(), NotifierError> {
        self.sent
            .lock()
            .unwrap()
            .push((recipient.as_str().to_string(), message.to_string()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn best_effort_swallows_failures() {
        struct FailingNotifier;

        #[async_trait]
        impl Notifier for FailingNotifier {
            async fn notify(&self, _: &Recipient, _: &str) -> Result<(), NotifierError> {
                Err(NotifierError::SendFailed("boom".to_string()))
            }
        }

        // Must not panic or propagate.
        notify_best_effort(
            &FailingNotifier,
            &Recipient::Email("client@example.com".to_string()),
            "Votre devis a été approuvé",
        )
        .await;
    }

    #[tokio::test]
    async fn mock_notifier_captures_messages() {
        let mock = MockNotifier::default();
        mock.notify(&Recipient::Phone("+216 20 123 456".to_string()), "Bonjour")
            .await
            .unwrap();
        let sent = mock.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].1, "Bonjour");
    }
}
