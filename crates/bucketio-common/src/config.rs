//! Configuration types for BucketIO
//!
//! This module defines configuration structures used across components.
//! Every field has a default so a partial TOML file is enough.

use crate::error::{Error, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use tracing::debug;

/// Root configuration for BucketIO
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Bucket and key layout
    pub bucket: BucketConfig,
    /// Spooling and paging parameters
    pub io: IoConfig,
    /// Capability flags gating every entry point
    pub perms: Perms,
    /// Server-side encryption passed through to the store
    pub server_side_encryption: ServerSideEncryption,
    /// Logging configuration
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&contents)
            .map_err(|e| Error::configuration(format!("{}: {e}", path.display())))?;
        debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(contents).map_err(|e| Error::configuration(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject combinations the adapters cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.io.reader_min_chunk_size == 0 {
            return Err(Error::configuration("io.reader_min_chunk_size must be positive"));
        }
        if self.io.list_page_size == 0 {
            return Err(Error::configuration("io.list_page_size must be positive"));
        }
        self.server_side_encryption.validate()
    }
}

/// Bucket and key layout
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct BucketConfig {
    /// Bucket name
    pub name: String,
    /// Root prepended to every protocol path to form a store key
    pub key_prefix: String,
    /// Maximum object size in bytes; negative means unbounded
    pub max_object_size: i64,
}

impl BucketConfig {
    /// Size limit for uploads, `None` when unbounded
    #[must_use]
    pub fn max_object_size(&self) -> Option<u64> {
        u64::try_from(self.max_object_size).ok()
    }
}

impl Default for BucketConfig {
    fn default() -> Self {
        Self {
            name: "bucketio".to_string(),
            key_prefix: String::new(),
            max_object_size: -1,
        }
    }
}

/// Spooling and paging parameters
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct IoConfig {
    /// Bytes retained behind the read cursor of a download (default: 1 MB)
    pub reader_lookback_buffer_size: usize,
    /// Minimum bytes fetched from a download per refill (default: 256 KB)
    pub reader_min_chunk_size: usize,
    /// Entries retained behind the cursor of a listing
    pub lister_lookback_buffer_size: usize,
    /// Keys requested per enumeration page
    pub list_page_size: usize,
}

impl Default for IoConfig {
    fn default() -> Self {
        Self {
            reader_lookback_buffer_size: 1024 * 1024, // 1 MB
            reader_min_chunk_size: 256 * 1024,        // 256 KB
            lister_lookback_buffer_size: 100,
            list_page_size: 10_000,
        }
    }
}

/// Capability flags
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Perms {
    pub readable: bool,
    pub writable: bool,
    pub listable: bool,
}

impl Default for Perms {
    fn default() -> Self {
        Self {
            readable: true,
            writable: true,
            listable: true,
        }
    }
}

/// Server-side encryption mode
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum SseType {
    #[default]
    None,
    /// Customer-provided key (SSE-C)
    Aes256,
    /// Key management service
    Kms,
}

impl TryFrom<String> for SseType {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        match value.to_ascii_lowercase().as_str() {
            "" | "none" => Ok(Self::None),
            "aes256" => Ok(Self::Aes256),
            "kms" => Ok(Self::Kms),
            _ => Err(Error::configuration(format!(
                "invalid value for server_side_encryption.type: {value}"
            ))),
        }
    }
}

impl From<SseType> for String {
    fn from(value: SseType) -> Self {
        match value {
            SseType::None => "none",
            SseType::Aes256 => "aes256",
            SseType::Kms => "kms",
        }
        .to_string()
    }
}

/// Server-side encryption parameters, passed through to every store call
/// that accepts them
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSideEncryption {
    #[serde(rename = "type")]
    pub sse_type: SseType,
    /// Base64-encoded customer key (SSE-C)
    pub customer_key: String,
    /// Base64-encoded MD5 of the raw customer key; derived when empty
    pub customer_key_md5: String,
    /// KMS key id
    pub kms_key_id: String,
}

impl ServerSideEncryption {
    /// Algorithm name for SSE-C requests
    #[must_use]
    pub const fn customer_algorithm(&self) -> Option<&'static str> {
        match self.sse_type {
            SseType::Aes256 => Some("AES256"),
            _ => None,
        }
    }

    /// Value of the store's `ServerSideEncryption` parameter
    #[must_use]
    pub const fn store_algorithm(&self) -> Option<&'static str> {
        match self.sse_type {
            SseType::Kms => Some("aws:kms"),
            _ => None,
        }
    }

    #[must_use]
    pub fn customer_key(&self) -> Option<&str> {
        non_empty(&self.customer_key)
    }

    #[must_use]
    pub fn kms_key_id(&self) -> Option<&str> {
        non_empty(&self.kms_key_id)
    }

    /// Customer key digest, computed from the key when not configured
    #[must_use]
    pub fn customer_key_md5(&self) -> Option<String> {
        if let Some(md5) = non_empty(&self.customer_key_md5) {
            return Some(md5.to_string());
        }
        let raw = BASE64.decode(self.customer_key()?).ok()?;
        Some(BASE64.encode(md5::compute(raw).0))
    }

    fn validate(&self) -> Result<()> {
        match self.sse_type {
            SseType::None => Ok(()),
            SseType::Aes256 => {
                let key = self.customer_key().ok_or_else(|| {
                    Error::configuration("aes256 encryption requires customer_key")
                })?;
                let raw = BASE64.decode(key).map_err(|e| {
                    Error::configuration(format!("customer_key is not valid base64: {e}"))
                })?;
                if raw.len() != 32 {
                    return Err(Error::configuration(format!(
                        "customer_key must decode to 32 bytes, got {}",
                        raw.len()
                    )));
                }
                Ok(())
            }
            SseType::Kms => self
                .kms_key_id()
                .map(|_| ())
                .ok_or_else(|| Error::configuration("kms encryption requires kms_key_id")),
        }
    }
}

// Keys stay out of logs.
impl fmt::Debug for ServerSideEncryption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerSideEncryption")
            .field("sse_type", &self.sse_type)
            .field("customer_key", &self.customer_key().map(|_| "<redacted>"))
            .field("kms_key_id", &self.kms_key_id())
            .finish_non_exhaustive()
    }
}

/// Logging configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive, overridden by `RUST_LOG`
    pub level: String,
    /// Emit JSON lines instead of human-readable text
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

fn non_empty(s: &str) -> Option<&str> {
    if s.is_empty() { None } else { Some(s) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const KEY_32: &str = "MDEyMzQ1Njc4OWFiY2RlZjAxMjM0NTY3ODlhYmNkZWY=";

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.bucket.max_object_size(), None);
        assert_eq!(config.io.reader_lookback_buffer_size, 1024 * 1024);
        assert_eq!(config.io.lister_lookback_buffer_size, 100);
        assert!(config.perms.readable && config.perms.writable && config.perms.listable);
        assert_eq!(config.server_side_encryption.sse_type, SseType::None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml() {
        let config = Config::from_toml_str(
            r#"
            [bucket]
            name = "transfers"
            key_prefix = "/sftp/"
            max_object_size = 10

            [perms]
            writable = false
            "#,
        )
        .unwrap();
        assert_eq!(config.bucket.name, "transfers");
        assert_eq!(config.bucket.max_object_size(), Some(10));
        assert!(!config.perms.writable);
        assert!(config.perms.readable);
        assert_eq!(config.io.list_page_size, 10_000);
    }

    #[test]
    fn test_sse_type_case_insensitive() {
        let config = Config::from_toml_str(
            r#"
            [server_side_encryption]
            type = "KMS"
            kms_key_id = "alias/transfers"
            "#,
        )
        .unwrap();
        let sse = &config.server_side_encryption;
        assert_eq!(sse.sse_type, SseType::Kms);
        assert_eq!(sse.store_algorithm(), Some("aws:kms"));
        assert_eq!(sse.customer_algorithm(), None);
    }

    #[test]
    fn test_invalid_sse_type() {
        let err = Config::from_toml_str("[server_side_encryption]\ntype = \"rot13\"\n").unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn test_kms_requires_key_id() {
        let err = Config::from_toml_str("[server_side_encryption]\ntype = \"kms\"\n").unwrap_err();
        assert!(err.to_string().contains("kms_key_id"));
    }

    #[test]
    fn test_customer_key_md5_derived() {
        let sse = ServerSideEncryption {
            sse_type: SseType::Aes256,
            customer_key: KEY_32.to_string(),
            ..Default::default()
        };
        assert!(sse.validate().is_ok());
        let raw = BASE64.decode(KEY_32).unwrap();
        assert_eq!(sse.customer_key_md5(), Some(BASE64.encode(md5::compute(raw).0)));
        assert_eq!(sse.customer_algorithm(), Some("AES256"));
    }

    #[test]
    fn test_customer_key_must_be_32_bytes() {
        let sse = ServerSideEncryption {
            sse_type: SseType::Aes256,
            customer_key: BASE64.encode(b"short"),
            ..Default::default()
        };
        assert!(sse.validate().is_err());
    }

    #[test]
    fn test_debug_redacts_customer_key() {
        let sse = ServerSideEncryption {
            sse_type: SseType::Aes256,
            customer_key: KEY_32.to_string(),
            ..Default::default()
        };
        assert!(!format!("{sse:?}").contains(KEY_32));
    }

    #[test]
    fn test_zero_chunk_size_rejected() {
        let err = Config::from_toml_str("[io]\nreader_min_chunk_size = 0\n").unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[io]\nlister_lookback_buffer_size = 7").unwrap();
        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.io.lister_lookback_buffer_size, 7);
    }

    #[test]
    fn test_load_missing_file() {
        let err = Config::load("/nonexistent/bucketio.toml").unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }
}
