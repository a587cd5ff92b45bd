//! Configuration management for the verification server.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Environment variable holding the mail account name
pub const EMAIL_USER_ENV: &str = "EMAIL_USER";

/// Environment variable holding the mail account secret
pub const EMAIL_PASS_ENV: &str = "EMAIL_PASS";

/// Environment variable overriding the HTTP port
pub const PORT_ENV: &str = "PORT";

/// Longest code lifetime accepted, in minutes
pub const MAX_CODE_TTL_MINUTES: u64 = 24 * 60;

/// Longest interval between expiry sweeps, in minutes
pub const MAX_CLEANUP_INTERVAL_MINUTES: u64 = 24 * 60;

/// Longest bound on a single dispatch, in seconds
pub const MAX_DISPATCH_TIMEOUT_SECS: u64 = 10 * 60;

/// Configuration for the verification server
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// HTTP server configuration
    pub http: HttpConfig,

    /// SMTP email configuration
    pub smtp: SmtpConfig,

    /// Code lifetime and eviction configuration
    pub verification: VerificationConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Port to bind to
    pub port: u16,

    /// Address to bind to
    pub bind_address: String,
}

/// SMTP configuration for sending emails
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SmtpConfig {
    /// SMTP server hostname
    pub server: String,

    /// SMTP server port (465 uses implicit TLS, anything else STARTTLS)
    pub port: u16,

    /// Account used for authentication
    pub username: Option<String>,

    /// Secret used for authentication
    pub password: Option<String>,

    /// From email address, defaults to the account
    pub from_address: Option<String>,

    /// Email subject line
    pub subject: String,

    /// Skip certificate validation on the TLS channel
    pub accept_invalid_certs: bool,

    /// Socket timeout for the SMTP connection in seconds
    pub timeout_secs: u64,
}

/// Code lifetime and eviction configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VerificationConfig {
    /// How long an issued code stays valid, in minutes
    pub code_ttl_minutes: u64,

    /// Interval between sweeps of expired codes, in minutes
    pub cleanup_interval_minutes: u64,

    /// Upper bound on a single email dispatch, in seconds
    pub dispatch_timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            port: 3001,
            bind_address: "0.0.0.0".to_string(),
        }
    }
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            server: "smtp.gmail.com".to_string(),
            port: 587,
            username: None,
            password: None,
            from_address: None,
            subject: "Your Verification Code".to_string(),
            accept_invalid_certs: true,
            timeout_secs: 30,
        }
    }
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            code_ttl_minutes: 10,
            cleanup_interval_minutes: 5,
            dispatch_timeout_secs: 30,
        }
    }
}

impl SmtpConfig {
    /// Account and secret, if both are present and non-empty
    pub fn credentials(&self) -> Option<(&str, &str)> {
        let username = self.username.as_deref().filter(|s| !s.trim().is_empty())?;
        let password = self.password.as_deref().filter(|s| !s.trim().is_empty())?;
        Some((username, password))
    }

    pub fn is_configured(&self) -> bool {
        self.credentials().is_some()
    }
}

impl ServerConfig {
    /// Load configuration from an optional TOML file, then the environment.
    ///
    /// `VERIFY_`-prefixed variables (`VERIFY_SMTP__SERVER`, ...) override the
    /// file; `EMAIL_USER`, `EMAIL_PASS` and `PORT` override both.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, config::ConfigError> {
        let path = path.as_ref();
        let settings = config::Config::builder()
            .add_source(config::File::from(path).required(false))
            .add_source(
                config::Environment::with_prefix("VERIFY")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        let mut config: Self = settings.try_deserialize()?;
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Load configuration from a TOML file that must exist
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, config::ConfigError> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path.as_ref()))
            .build()?;

        settings.try_deserialize()
    }

    /// Apply the deployment variables through `lookup`
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), config::ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(user) = lookup(EMAIL_USER_ENV) {
            self.smtp.username = Some(user);
        }
        if let Some(pass) = lookup(EMAIL_PASS_ENV) {
            self.smtp.password = Some(pass);
        }
        if let Some(port) = lookup(PORT_ENV) {
            self.http.port = port.trim().parse().map_err(|_| {
                config::ConfigError::Message(format!("{} must be a port number, got '{}'", PORT_ENV, port))
            })?;
        }
        Ok(())
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let toml_string = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_string)?;
        Ok(())
    }

    /// Validate the configuration.
    ///
    /// Missing SMTP credentials are allowed: the server starts with email
    /// dispatch disabled and reports it through the health endpoint.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.http.port == 0 {
            return Err(anyhow::anyhow!("HTTP port must be greater than 0"));
        }

        if self.smtp.server.trim().is_empty() {
            return Err(anyhow::anyhow!("SMTP server must be set"));
        }

        if self.smtp.port == 0 {
            return Err(anyhow::anyhow!("SMTP port must be greater than 0"));
        }

        if !(1..=MAX_CODE_TTL_MINUTES).contains(&self.verification.code_ttl_minutes) {
            return Err(anyhow::anyhow!(
                "Code TTL must be between 1 and {} minutes",
                MAX_CODE_TTL_MINUTES
            ));
        }

        if !(1..=MAX_CLEANUP_INTERVAL_MINUTES).contains(&self.verification.cleanup_interval_minutes) {
            return Err(anyhow::anyhow!(
                "Cleanup interval must be between 1 and {} minutes",
                MAX_CLEANUP_INTERVAL_MINUTES
            ));
        }

        if !(1..=MAX_DISPATCH_TIMEOUT_SECS).contains(&self.verification.dispatch_timeout_secs) {
            return Err(anyhow::anyhow!(
                "Dispatch timeout must be between 1 and {} seconds",
                MAX_DISPATCH_TIMEOUT_SECS
            ));
        }

        Ok(())
    }
}
