//! Email functionality for sending verification codes.

use crate::config::SmtpConfig;
use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::{
        authentication::Credentials,
        client::{Tls, TlsParameters},
    },
    Message, SmtpTransport, Transport,
};
use std::{fmt, sync::Arc, time::Duration};
use thiserror::Error;
use tracing::{debug, error, info};

/// Port on which SMTP servers expect TLS from the first byte
const IMPLICIT_TLS_PORT: u16 = 465;

/// Mail delivery errors
#[derive(Error, Debug)]
pub enum MailError {
    #[error("Invalid email address: {0}")]
    InvalidAddress(String),

    #[error("Failed to build email: {0}")]
    Build(String),

    #[error("SMTP error: {0}")]
    Transport(#[from] lettre::transport::smtp::Error),

    #[error("SMTP connection test failed")]
    Unreachable,

    #[error("Mail task failed: {0}")]
    Task(String),
}

/// Capability to deliver verification codes
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Mailer: Send + Sync {
    /// Account the mailer authenticates as
    fn account(&self) -> String;

    /// Send `code` to `to`, mentioning how long it stays valid
    async fn send_code(&self, to: &str, code: &str, ttl_minutes: u64) -> Result<(), MailError>;

    /// Open the transport and authenticate without sending anything
    async fn test_connection(&self) -> Result<(), MailError>;
}

/// SMTP mailer
#[derive(Debug, Clone)]
pub struct SmtpMailer {
    transport: SmtpTransport,
    account: String,
    from_address: Mailbox,
    subject: String,
}

impl SmtpMailer {
    /// Create a new SMTP mailer authenticating with `username` / `password`
    pub fn new(config: &SmtpConfig, username: &str, password: &str) -> Result<Self, MailError> {
        let from = config.from_address.as_deref().unwrap_or(username);
        let from_address: Mailbox = from
            .parse()
            .map_err(|e| MailError::InvalidAddress(format!("{}: {}", from, e)))?;

        let tls_parameters = TlsParameters::builder(config.server.clone())
            .dangerous_accept_invalid_certs(config.accept_invalid_certs)
            .build()?;

        let tls = if config.port == IMPLICIT_TLS_PORT {
            Tls::Wrapper(tls_parameters)
        } else {
            Tls::Required(tls_parameters)
        };

        let credentials = Credentials::new(username.to_string(), password.to_string());

        let transport = SmtpTransport::builder_dangerous(config.server.as_str())
            .port(config.port)
            .tls(tls)
            .credentials(credentials)
            .timeout(Some(Duration::from_secs(config.timeout_secs)))
            .build();

        Ok(Self {
            transport,
            account: username.to_string(),
            from_address,
            subject: config.subject.clone(),
        })
    }

    /// Build the message carrying `code` to `to_email`
    fn build_message(&self, to_email: &str, code: &str, ttl_minutes: u64) -> Result<Message, MailError> {
        let to_address: Mailbox = to_email
            .parse()
            .map_err(|e| MailError::InvalidAddress(format!("{}: {}", to_email, e)))?;

        Message::builder()
            .from(self.from_address.clone())
            .to(to_address)
            .subject(&self.subject)
            .header(ContentType::TEXT_PLAIN)
            .body(create_email_body(code, ttl_minutes))
            .map_err(|e| MailError::Build(e.to_string()))
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    fn account(&self) -> String {
        self.account.clone()
    }

    async fn send_code(&self, to_email: &str, code: &str, ttl_minutes: u64) -> Result<(), MailError> {
        let email = self.build_message(to_email, code, ttl_minutes)?;

        debug!("Sending verification email to: {}", to_email);

        // SmtpTransport is blocking; keep it off the async workers
        let transport = self.transport.clone();
        let result = tokio::task::spawn_blocking(move || transport.send(&email))
            .await
            .map_err(|e| MailError::Task(e.to_string()))?;

        match result {
            Ok(response) => {
                info!("Sent verification email to: {} (response: {:?})", to_email, response.code());
                Ok(())
            }
            Err(e) => {
                error!("Failed to send email to {}: {}", to_email, e);
                Err(MailError::Transport(e))
            }
        }
    }

    async fn test_connection(&self) -> Result<(), MailError> {
        debug!("Testing SMTP connection");

        let transport = self.transport.clone();
        let result = tokio::task::spawn_blocking(move || transport.test_connection())
            .await
            .map_err(|e| MailError::Task(e.to_string()))?;

        match result {
            Ok(true) => {
                info!("SMTP connection test successful");
                Ok(())
            }
            Ok(false) => {
                error!("SMTP connection test failed");
                Err(MailError::Unreachable)
            }
            Err(e) => {
                error!("SMTP connection error: {}", e);
                Err(MailError::Transport(e))
            }
        }
    }
}

/// Create the email body with the code
pub fn create_email_body(code: &str, ttl_minutes: u64) -> String {
    format!(
        r#"Email Verification

Your verification code is: {}

Enter this code to confirm your email address.
This code will expire in {} minutes.

If you did not request this code, please ignore this email.
"#,
        code, ttl_minutes
    )
}

/// Whether mail can be sent at all
#[derive(Clone)]
pub enum MailDispatcher {
    Configured(Arc<dyn Mailer>),
    Unconfigured,
}

impl MailDispatcher {
    /// SMTP dispatcher when credentials are present, otherwise `Unconfigured`
    pub fn from_config(config: &SmtpConfig) -> Result<Self, MailError> {
        match config.credentials() {
            Some((username, password)) => {
                let mailer = SmtpMailer::new(config, username, password)?;
                info!("Email dispatch configured for account {}", username);
                Ok(Self::Configured(Arc::new(mailer)))
            }
            None => Ok(Self::Unconfigured),
        }
    }

    pub fn is_configured(&self) -> bool {
        matches!(self, Self::Configured(_))
    }
}

impl fmt::Debug for MailDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Configured(mailer) => f
                .debug_tuple("Configured")
                .field(&mailer.account())
                .finish(),
            Self::Unconfigured => f.write_str("Unconfigured"),
        }
    }
}

/// Minimal syntactic check: non-empty and contains `@`
pub fn is_plausible_email(email: &str) -> bool {
    !email.is_empty() && email.contains('@')
}
