//! In-memory object store
//!
//! Keeps committed objects in an ordered map so that delimited enumeration
//! can walk a key range. Used by tests and for running the adapters without
//! a remote store. Every call is counted per operation, and individual
//! operations can be made to fail.

use crate::store::ObjectStore;
use crate::types::{
    CannedAcl, CopyObjectRequest, GetObjectOutput, GetObjectRequest, Grant,
    ListObjectsPage, ListObjectsRequest, ObjectAcl, ObjectHead, ObjectSummary, Owner, Permission,
    PutObjectRequest,
};
use async_trait::async_trait;
use bucketio_common::config::{ServerSideEncryption, SseType};
use bucketio_common::{Error, Result};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

/// Owner id assigned to objects created through this store
pub const DEFAULT_OWNER_ID: &str = "memory-store-owner";

/// Store operation, for call accounting and fault injection
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StoreOp {
    Get,
    Put,
    Delete,
    Copy,
    GetAcl,
    Head,
    List,
}

impl StoreOp {
    const ALL: [Self; 7] = [
        Self::Get,
        Self::Put,
        Self::Delete,
        Self::Copy,
        Self::GetAcl,
        Self::Head,
        Self::List,
    ];

    const fn index(self) -> usize {
        self as usize
    }

    /// Operation name as logged and reported in errors
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Get => "GetObject",
            Self::Put => "PutObject",
            Self::Delete => "DeleteObject",
            Self::Copy => "CopyObject",
            Self::GetAcl => "GetObjectAcl",
            Self::Head => "HeadObject",
            Self::List => "ListObjectsV2",
        }
    }
}

#[derive(Clone, Debug)]
struct StoredObject {
    data: Bytes,
    last_modified: DateTime<Utc>,
    acl: ObjectAcl,
    /// Digest of the SSE-C key the object was written with
    customer_key_md5: Option<String>,
}

/// Object store held entirely in memory
pub struct MemoryStore {
    bucket: String,
    owner_id: String,
    objects: RwLock<BTreeMap<String, StoredObject>>,
    calls: [AtomicU64; 7],
    /// Call count from which each failing operation starts to fail
    failing: Mutex<HashMap<StoreOp, u64>>,
}

impl MemoryStore {
    /// Create an empty store serving `bucket`
    #[must_use]
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            owner_id: DEFAULT_OWNER_ID.to_string(),
            objects: RwLock::new(BTreeMap::new()),
            calls: Default::default(),
            failing: Mutex::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn owner_id(&self) -> &str {
        &self.owner_id
    }

    /// Seed an object directly, bypassing call accounting
    pub fn insert(&self, key: impl Into<String>, data: impl Into<Bytes>, last_modified: DateTime<Utc>) {
        let object = StoredObject {
            data: data.into(),
            last_modified,
            acl: self.canned_acl(CannedAcl::Private),
            customer_key_md5: None,
        };
        self.objects.write().insert(key.into(), object);
    }

    /// Replace the ACL of an existing object
    pub fn set_acl(&self, key: &str, acl: ObjectAcl) -> bool {
        match self.objects.write().get_mut(key) {
            Some(object) => {
                object.acl = acl;
                true
            }
            None => false,
        }
    }

    /// Contents of a committed object
    #[must_use]
    pub fn object(&self, key: &str) -> Option<Bytes> {
        self.objects.read().get(key).map(|o| o.data.clone())
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.objects.read().contains_key(key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.objects.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.objects.read().is_empty()
    }

    /// Number of calls made for `op`
    #[must_use]
    pub fn call_count(&self, op: StoreOp) -> u64 {
        self.calls[op.index()].load(Ordering::Relaxed)
    }

    /// Number of calls made across all operations
    #[must_use]
    pub fn total_calls(&self) -> u64 {
        StoreOp::ALL.iter().map(|op| self.call_count(*op)).sum()
    }

    /// Make every subsequent call of `op` fail
    pub fn fail_operation(&self, op: StoreOp) {
        self.fail_operation_after(op, 0);
    }

    /// Let the next `calls` calls of `op` through, then fail the rest
    pub fn fail_operation_after(&self, op: StoreOp, calls: u64) {
        self.failing.lock().insert(op, self.call_count(op) + calls);
    }

    pub fn clear_failures(&self) {
        self.failing.lock().clear();
    }

    /// Account for a call and apply injected faults
    fn begin(&self, op: StoreOp, bucket: &str, key: &str) -> Result<()> {
        let previous = self.calls[op.index()].fetch_add(1, Ordering::Relaxed);
        if self.failing.lock().get(&op).is_some_and(|&from| previous >= from) {
            return Err(Error::store(op.name(), bucket, key, "injected failure"));
        }
        if bucket != self.bucket {
            return Err(Error::store(op.name(), bucket, key, "no such bucket"));
        }
        Ok(())
    }

    fn not_found(&self, key: &str) -> Error {
        Error::ObjectNotFound {
            bucket: self.bucket.clone(),
            key: key.to_string(),
        }
    }

    fn canned_acl(&self, acl: CannedAcl) -> ObjectAcl {
        let grants = match acl {
            CannedAcl::Private => vec![Grant::user(&self.owner_id, Permission::FullControl)],
        };
        ObjectAcl {
            owner: Some(Owner {
                id: self.owner_id.clone(),
                display_name: None,
            }),
            grants,
        }
    }

    fn stored(&self, data: Bytes, acl: CannedAcl, sse: &ServerSideEncryption) -> StoredObject {
        StoredObject {
            data,
            last_modified: Utc::now(),
            acl: self.canned_acl(acl),
            customer_key_md5: match sse.sse_type {
                SseType::Aes256 => sse.customer_key_md5(),
                SseType::None | SseType::Kms => None,
            },
        }
    }
}

/// Walk `objects` from the request's resume point and build one page
fn list_page(objects: &BTreeMap<String, StoredObject>, request: &ListObjectsRequest) -> ListObjectsPage {
    let delimiter = request.delimiter.as_deref().filter(|d| !d.is_empty());
    let start = match &request.continuation_token {
        Some(token) => Bound::Excluded(token.clone()),
        None => Bound::Included(request.prefix.clone()),
    };
    // A token naming a group means every key below it was already reported.
    let resumed_group = request
        .continuation_token
        .as_deref()
        .filter(|t| *t != request.prefix && delimiter.is_some_and(|d| t.ends_with(d)));

    let mut page = ListObjectsPage::default();
    let mut count = 0usize;
    let mut last: Option<String> = None;

    for (key, object) in objects.range((start, Bound::Unbounded)) {
        if !key.starts_with(&request.prefix) {
            break;
        }
        if resumed_group.is_some_and(|group| key.starts_with(group)) {
            continue;
        }
        let rest = &key[request.prefix.len()..];
        let group = delimiter
            .and_then(|d| rest.find(d).map(|idx| format!("{}{}", request.prefix, &rest[..idx + d.len()])));

        if let Some(group) = group {
            if page.common_prefixes.last() == Some(&group) {
                continue;
            }
            if count == request.max_keys {
                page.next_continuation_token = last;
                return page;
            }
            page.common_prefixes.push(group.clone());
            last = Some(group);
        } else {
            if count == request.max_keys {
                page.next_continuation_token = last;
                return page;
            }
            page.contents.push(ObjectSummary {
                key: key.clone(),
                size: object.data.len() as u64,
                last_modified: object.last_modified,
            });
            last = Some(key.clone());
        }
        count += 1;
    }
    page
}

#[async_trait]
impl ObjectStore for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn get_object(&self, request: GetObjectRequest) -> Result<GetObjectOutput> {
        self.begin(StoreOp::Get, &request.bucket, &request.key)?;
        let object = self
            .objects
            .read()
            .get(&request.key)
            .cloned()
            .ok_or_else(|| self.not_found(&request.key))?;

        let presented = request
            .sse
            .customer_algorithm()
            .and_then(|_| request.sse.customer_key_md5());
        if object.customer_key_md5 != presented {
            return Err(Error::store(
                StoreOp::Get.name(),
                &request.bucket,
                &request.key,
                "server-side encryption customer key mismatch",
            ));
        }

        debug!("memory store serving {} ({} bytes)", request.key, object.data.len());
        Ok(GetObjectOutput {
            content_length: Some(object.data.len() as u64),
            last_modified: Some(object.last_modified),
            body: Box::pin(std::io::Cursor::new(object.data)),
        })
    }

    async fn put_object(&self, request: PutObjectRequest) -> Result<()> {
        self.begin(StoreOp::Put, &request.bucket, &request.key)?;
        let object = self.stored(request.body, request.acl, &request.sse);
        self.objects.write().insert(request.key, object);
        Ok(())
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<()> {
        self.begin(StoreOp::Delete, bucket, key)?;
        // Deleting an absent key succeeds, as on S3.
        self.objects.write().remove(key);
        Ok(())
    }

    async fn copy_object(&self, request: CopyObjectRequest) -> Result<()> {
        self.begin(StoreOp::Copy, &request.bucket, &request.key)?;
        let mut objects = self.objects.write();
        let data = objects
            .get(&request.source_key)
            .map(|o| o.data.clone())
            .ok_or_else(|| self.not_found(&request.source_key))?;
        let object = self.stored(data, request.acl, &request.sse);
        objects.insert(request.key, object);
        Ok(())
    }

    async fn get_object_acl(&self, bucket: &str, key: &str) -> Result<ObjectAcl> {
        self.begin(StoreOp::GetAcl, bucket, key)?;
        self.objects
            .read()
            .get(key)
            .map(|o| o.acl.clone())
            .ok_or_else(|| self.not_found(key))
    }

    async fn head_object(&self, bucket: &str, key: &str) -> Result<ObjectHead> {
        self.begin(StoreOp::Head, bucket, key)?;
        self.objects
            .read()
            .get(key)
            .map(|o| ObjectHead {
                content_length: o.data.len() as u64,
                last_modified: o.last_modified,
            })
            .ok_or_else(|| self.not_found(key))
    }

    async fn list_objects(&self, request: ListObjectsRequest) -> Result<ListObjectsPage> {
        self.begin(StoreOp::List, &request.bucket, &request.prefix)?;
        if request.max_keys == 0 {
            return Err(Error::invalid_argument("max_keys must be positive"));
        }
        Ok(list_page(&self.objects.read(), &request))
    }
}
