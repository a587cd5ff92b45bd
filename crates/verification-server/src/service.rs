//! Issuing and checking verification codes.

use crate::{
    code::generate_code,
    email::{is_plausible_email, MailDispatcher, MailError},
    error::{VerificationError, VerificationResult},
    store::{CodeStore, VerificationEntry},
};
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A code that was delivered and stored
#[derive(Debug, Clone)]
pub struct IssuedCode {
    pub code: String,
    pub expires_at: DateTime<Utc>,
}

/// Why the mail transport check failed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailTestFailure {
    pub configured: bool,
    pub reason: String,
}

/// Verification service tying the generator, store and dispatcher together
#[derive(Debug, Clone)]
pub struct VerificationService {
    store: Arc<CodeStore>,
    dispatcher: MailDispatcher,
    code_ttl: Duration,
    dispatch_timeout: std::time::Duration,
}

impl VerificationService {
    pub fn new(
        store: Arc<CodeStore>,
        dispatcher: MailDispatcher,
        code_ttl: Duration,
        dispatch_timeout: std::time::Duration,
    ) -> Self {
        Self {
            store,
            dispatcher,
            code_ttl,
            dispatch_timeout,
        }
    }

    pub fn store(&self) -> &Arc<CodeStore> {
        &self.store
    }

    pub fn email_configured(&self) -> bool {
        self.dispatcher.is_configured()
    }

    /// Generate a code for `email`, mail it, and store it.
    ///
    /// The entry is written only once the mail went out, so a failed send
    /// leaves any earlier pending code for the address untouched.
    pub async fn issue(&self, email: &str) -> VerificationResult<IssuedCode> {
        if !is_plausible_email(email) {
            return Err(VerificationError::InvalidInput(
                "Valid email address is required".to_string(),
            ));
        }

        let mailer = match &self.dispatcher {
            MailDispatcher::Configured(mailer) => mailer,
            MailDispatcher::Unconfigured => {
                warn!("Verification requested for {} but email is not configured", email);
                return Err(VerificationError::NotConfigured);
            }
        };

        let code = generate_code();
        let ttl_minutes = self.code_ttl.num_minutes().max(0) as u64;

        let sent = tokio::time::timeout(
            self.dispatch_timeout,
            mailer.send_code(email, &code, ttl_minutes),
        )
        .await;

        match sent {
            Ok(Ok(())) => {}
            Ok(Err(MailError::InvalidAddress(reason))) => {
                return Err(VerificationError::InvalidInput(format!(
                    "Invalid email address: {}",
                    reason
                )));
            }
            Ok(Err(e)) => return Err(VerificationError::DispatchFailed(e.to_string())),
            Err(_) => {
                warn!(
                    "Email dispatch to {} timed out after {:?}",
                    email, self.dispatch_timeout
                );
                return Err(VerificationError::DispatchFailed(format!(
                    "timed out after {} seconds",
                    self.dispatch_timeout.as_secs()
                )));
            }
        }

        let created_at = self.store.now();
        let expires_at = created_at + self.code_ttl;
        self.store.put(
            email,
            VerificationEntry {
                code: code.clone(),
                created_at,
                expires_at,
            },
        );

        info!("Issued verification code for {}", email);
        Ok(IssuedCode { code, expires_at })
    }

    /// Check `code` against the pending entry for `email`, consuming it on success.
    ///
    /// A wrong code leaves the entry in place; an expired entry is removed.
    pub fn verify(&self, email: &str, code: &str) -> VerificationResult<()> {
        if email.is_empty() || code.is_empty() {
            return Err(VerificationError::InvalidInput(
                "Email and code are required".to_string(),
            ));
        }

        let entry = self.store.get(email).ok_or_else(|| {
            debug!("No pending code for {}", email);
            VerificationError::NotFound
        })?;

        if entry.is_expired_at(self.store.now()) {
            self.store.delete(email);
            warn!("Attempted to use expired code for email: {}", email);
            return Err(VerificationError::Expired);
        }

        if entry.code != code {
            warn!("Code mismatch for email: {}", email);
            return Err(VerificationError::Mismatch);
        }

        // Lost a race against another verification or a re-issue
        if !self.store.remove_if_code(email, code) {
            return Err(VerificationError::NotFound);
        }

        info!("Verified email: {}", email);
        Ok(())
    }

    /// Open the mail transport and report the account on success
    pub async fn test_connection(&self) -> Result<String, EmailTestFailure> {
        let mailer = match &self.dispatcher {
            MailDispatcher::Configured(mailer) => mailer,
            MailDispatcher::Unconfigured => {
                return Err(EmailTestFailure {
                    configured: false,
                    reason: "Email credentials are not configured".to_string(),
                });
            }
        };

        match tokio::time::timeout(self.dispatch_timeout, mailer.test_connection()).await {
            Ok(Ok(())) => Ok(mailer.account()),
            Ok(Err(e)) => Err(EmailTestFailure {
                configured: true,
                reason: e.to_string(),
            }),
            Err(_) => Err(EmailTestFailure {
                configured: true,
                reason: format!(
                    "Connection test timed out after {} seconds",
                    self.dispatch_timeout.as_secs()
                ),
            }),
        }
    }
}
