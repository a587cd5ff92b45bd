//! Email Verification Server - one-time codes delivered over SMTP
//!
//! This crate provides an HTTP server that proves control of an email address:
//! 1. A client submits an email address
//! 2. Server generates a 6-digit code and sends it via SMTP to that address
//! 3. The client submits the code back to the server within its validity window
//! 4. Server checks the code and consumes it on success

pub mod clock;
pub mod code;
pub mod config;
pub mod email;
pub mod error;
pub mod http;
pub mod service;
pub mod store;

pub use config::ServerConfig;
pub use error::{VerificationError, VerificationResult};
pub use service::VerificationService;
