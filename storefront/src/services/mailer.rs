// storefront/src/services/mailer.rs

//! Mail transports. `SmtpMailer` delivers through lettre; `LogMailer` only
//! logs, for environments without SMTP credentials.

use crate::config::SmtpConfig;
use async_trait::async_trait;
use lettre::{
  message::{header::ContentType, Mailbox, MultiPart, SinglePart},
  transport::smtp::authentication::Credentials,
  AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use thiserror::Error;
use tracing::{info, instrument};
use uuid::Uuid;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MailError {
  /// Worth retrying: connection problems, timeouts, 4xx SMTP replies.
  #[error("transient mail failure: {0}")]
  Transient(String),
  /// Retrying cannot help: bad addresses, rejected recipients, 5xx replies.
  #[error("permanent mail failure: {0}")]
  Permanent(String),
}

impl MailError {
  pub fn is_transient(&self) -> bool {
    matches!(self, MailError::Transient(_))
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingEmail {
  pub to: String,
  pub subject: String,
  pub html_body: String,
  pub text_body: String,
}

#[async_trait]
pub trait Mailer: Send + Sync {
  /// Sends one message and returns its message id.
  async fn send(&self, email: &OutgoingEmail) -> Result<String, MailError>;
}

pub struct SmtpMailer {
  transport: AsyncSmtpTransport<Tokio1Executor>,
  from: Mailbox,
}

impl SmtpMailer {
  pub fn new(config: &SmtpConfig, from: &str) -> Result<Self, MailError> {
    let from = from
      .parse::<Mailbox>()
      .map_err(|e| MailError::Permanent(format!("invalid sender '{}': {}", from, e)))?;
    let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
      .map_err(|e| MailError::Permanent(format!("invalid SMTP relay '{}': {}", config.host, e)))?
      .port(config.port)
      .credentials(Credentials::new(config.username.clone(), config.password.clone()))
      .timeout(Some(config.timeout))
      .build();
    Ok(Self { transport, from })
  }

  fn build_message(&self, email: &OutgoingEmail, message_id: &str) -> Result<Message, MailError> {
    let to = email
      .to
      .parse::<Mailbox>()
      .map_err(|e| MailError::Permanent(format!("invalid recipient '{}': {}", email.to, e)))?;
    Message::builder()
      .from(self.from.clone())
      .to(to)
      .subject(email.subject.clone())
      .message_id(Some(message_id.to_string()))
      .multipart(
        MultiPart::alternative()
          .singlepart(
            SinglePart::builder()
              .header(ContentType::TEXT_PLAIN)
              .body(email.text_body.clone()),
          )
          .singlepart(
            SinglePart::builder()
              .header(ContentType::TEXT_HTML)
              .body(email.html_body.clone()),
          ),
      )
      .map_err(|e| MailError::Permanent(format!("could not build message: {}", e)))
  }

  fn message_id(&self) -> String {
    format!("<{}@{}>", Uuid::new_v4(), self.from.email.domain())
  }
}

#[async_trait]
impl Mailer for SmtpMailer {
  #[instrument(name = "SmtpMailer::send", skip_all, fields(subject = %email.subject), err)]
  async fn send(&self, email: &OutgoingEmail) -> Result<String, MailError> {
    let message_id = self.message_id();
    let message = self.build_message(email, &message_id)?;
    match self.transport.send(message).await {
      Ok(response) => {
        info!(code = %response.code(), "Email accepted by SMTP relay.");
        Ok(message_id)
      }
      Err(e) if e.is_permanent() => Err(MailError::Permanent(e.to_string())),
      Err(e) => Err(MailError::Transient(e.to_string())),
    }
  }
}

/// Logs each message instead of sending it.
#[derive(Debug, Default, Clone)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
  async fn send(&self, email: &OutgoingEmail) -> Result<String, MailError> {
    let message_id = format!("log-{}", Uuid::new_v4());
    info!(
      to = %email.to,
      subject = %email.subject,
      message_id = %message_id,
      "SMTP not configured; email logged instead of sent."
    );
    Ok(message_id)
  }
}
