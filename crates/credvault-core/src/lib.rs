//! # credvault-core
//!
//! Core library for credvault providing:
//! - Configuration file parsing (credvault.yaml) with environment overrides
//! - The error taxonomy and its status-code mapping
//! - Domain types shared by every crate (names, kinds, audit records, ACLs)

pub mod config;
pub mod error;
pub mod types;

pub use config::CredvaultConfig;
pub use error::{Error, ErrorResponse, Result};
