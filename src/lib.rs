//! CertHub Mailer - Bulk Email Delivery Engine
//!
//! This crate provides the bulk email delivery engine for the CertHub
//! certificate platform: campaign lifecycle, OAuth-token-backed provider
//! sessions, batched dispatch with backoff, an append-only delivery ledger,
//! and progress reporting.

pub mod config;
pub mod domain;
pub mod error;
pub mod repository;
pub mod service;
pub mod source;
pub mod telemetry;
pub mod template;
pub mod token;
pub mod transport;

// Re-export commonly used types
pub use config::Config;
pub use error::{MailerError, Result};
