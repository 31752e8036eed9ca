//! BucketIO Common - Shared types and utilities
//!
//! This crate provides the key/path mapping, directory entry types, error
//! definitions and configuration used across all BucketIO components.

pub mod config;
pub mod error;
pub mod logging;
pub mod types;

pub use config::Config;
pub use error::{Error, Result};
pub use types::*;
