//! Core types, traits, and configuration for the unclip data pipeline.
//!
//! This crate provides the foundational abstractions shared by the data,
//! hub and CLI crates:
//!
//! - Configuration types for datasets, loaders and data modules
//! - Capability traits ([`Dataset`], [`DataModule`])
//! - Error handling infrastructure
//! - Secure handling of secrets (Hub tokens)

#![warn(missing_docs)]

mod config;
mod error;
mod secrets;
mod traits;

pub use config::*;
pub use error::*;
pub use secrets::SecretString;
pub use traits::*;

