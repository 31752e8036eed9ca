//! Request and response types for store calls

use bucketio_common::config::ServerSideEncryption;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::fmt;
use std::pin::Pin;
use tokio::io::AsyncRead;

/// Group URI granting access to every authenticated principal
pub const AUTHENTICATED_USERS_URI: &str = "http://acs.amazonaws.com/groups/global/AuthenticatedUsers";
/// Group URI granting access to anyone
pub const ALL_USERS_URI: &str = "http://acs.amazonaws.com/groups/global/AllUsers";

/// Streaming download body
pub type ObjectBody = Pin<Box<dyn AsyncRead + Send>>;

/// Canned ACL attached to uploads and copies
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CannedAcl {
    #[default]
    Private,
}

impl CannedAcl {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Private => "private",
        }
    }
}

/// Download request
#[derive(Clone, Debug)]
pub struct GetObjectRequest {
    pub bucket: String,
    pub key: String,
    /// Only the customer-key parameters apply to downloads
    pub sse: ServerSideEncryption,
}

/// Download response
pub struct GetObjectOutput {
    pub body: ObjectBody,
    pub content_length: Option<u64>,
    pub last_modified: Option<DateTime<Utc>>,
}

impl fmt::Debug for GetObjectOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GetObjectOutput")
            .field("content_length", &self.content_length)
            .field("last_modified", &self.last_modified)
            .finish_non_exhaustive()
    }
}

/// Single atomic upload of a complete payload
#[derive(Clone, Debug)]
pub struct PutObjectRequest {
    pub bucket: String,
    pub key: String,
    pub body: Bytes,
    pub acl: CannedAcl,
    pub sse: ServerSideEncryption,
}

/// Same-bucket copy
#[derive(Clone, Debug)]
pub struct CopyObjectRequest {
    pub bucket: String,
    pub source_key: String,
    pub key: String,
    pub acl: CannedAcl,
    pub sse: ServerSideEncryption,
}

impl CopyObjectRequest {
    /// `bucket/source_key`, the form stores expect for the copy source
    #[must_use]
    pub fn copy_source(&self) -> String {
        format!("{}/{}", self.bucket, self.source_key)
    }
}

/// Object metadata
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ObjectHead {
    pub content_length: u64,
    pub last_modified: DateTime<Utc>,
}

/// Object owner
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Owner {
    pub id: String,
    pub display_name: Option<String>,
}

/// Principal a grant applies to
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Grantee {
    CanonicalUser { id: String },
    Group { uri: String },
    Email { address: String },
}

/// Permission conveyed by a grant
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Permission {
    Read,
    Write,
    ReadAcp,
    WriteAcp,
    FullControl,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Grant {
    pub grantee: Grantee,
    pub permission: Permission,
}

impl Grant {
    #[must_use]
    pub fn user(id: impl Into<String>, permission: Permission) -> Self {
        Self {
            grantee: Grantee::CanonicalUser { id: id.into() },
            permission,
        }
    }

    #[must_use]
    pub fn group(uri: impl Into<String>, permission: Permission) -> Self {
        Self {
            grantee: Grantee::Group { uri: uri.into() },
            permission,
        }
    }
}

/// Access control list of one object
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ObjectAcl {
    pub owner: Option<Owner>,
    pub grants: Vec<Grant>,
}

/// Delimiter-bounded paginated enumeration request
#[derive(Clone, Debug)]
pub struct ListObjectsRequest {
    pub bucket: String,
    pub prefix: String,
    pub delimiter: Option<String>,
    pub max_keys: usize,
    pub continuation_token: Option<String>,
}

/// One enumerated object
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObjectSummary {
    pub key: String,
    pub size: u64,
    pub last_modified: DateTime<Utc>,
}

/// One page of an enumeration
#[derive(Clone, Debug, Default)]
pub struct ListObjectsPage {
    /// Grouped keys, each ending with the delimiter
    pub common_prefixes: Vec<String>,
    pub contents: Vec<ObjectSummary>,
    /// Present when more results follow
    pub next_continuation_token: Option<String>,
}
