//! Single-entry stat resolution
//!
//! Resolution order: the root, an in-flight upload, an existing object
//! (permission bits from its grants, size and time from its metadata), then
//! an implicit directory (some key below `key/`). Anything else does not
//! exist.

use crate::acl::acl_to_mode;
use crate::io::{ListAt, ListPage};
use crate::lister::DIR_PERM;
use crate::phantom::PhantomRegistry;
use async_trait::async_trait;
use bucketio_common::{Error, FileEntry, FileMode, KEY_SEPARATOR, KeyPath, Result};
use bucketio_store::{ListObjectsRequest, ObjectStore, RequestContext};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::debug;

/// Stat handle for one key, read through [`ListAt`] at offset 0
pub struct ObjectStat {
    ctx: RequestContext,
    store: Arc<dyn ObjectStore>,
    registry: Arc<PhantomRegistry>,
    bucket: String,
    key: KeyPath,
    page_size: usize,
    clock: fn() -> DateTime<Utc>,
}

impl ObjectStat {
    pub fn new(
        ctx: RequestContext,
        store: Arc<dyn ObjectStore>,
        registry: Arc<PhantomRegistry>,
        bucket: impl Into<String>,
        key: KeyPath,
    ) -> Self {
        Self {
            ctx,
            store,
            registry,
            bucket: bucket.into(),
            key,
            page_size: 10_000,
            clock: Utc::now,
        }
    }

    /// Keys requested by the implicit-directory probe
    #[must_use]
    pub const fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    /// Time source for entries the store reports no time for
    #[must_use]
    pub const fn with_clock(mut self, clock: fn() -> DateTime<Utc>) -> Self {
        self.clock = clock;
        self
    }

    pub async fn resolve(&self) -> Result<FileEntry> {
        if self.key.is_root() {
            return Ok(FileEntry::new(
                KEY_SEPARATOR.to_string(),
                DateTime::UNIX_EPOCH,
                0,
                FileMode::dir(DIR_PERM),
            ));
        }
        if let Some(info) = self.registry.get(&self.key) {
            return Ok(info.snapshot().to_entry());
        }

        let key = self.key.to_string();
        debug!("GetObjectAcl(Bucket={}, Key={})", self.bucket, key);
        match self.ctx.run(self.store.get_object_acl(&self.bucket, &key)).await {
            Ok(acl) => {
                debug!("=> {:?}", acl);
                let mode = FileMode::file(acl_to_mode(&acl));
                self.head(&key, mode).await
            }
            Err(e) if e.is_canceled() => Err(e),
            Err(e) => {
                debug!("=> {e}");
                self.probe_directory(&key).await
            }
        }
    }

    async fn head(&self, key: &str, mode: FileMode) -> Result<FileEntry> {
        debug!("HeadObject(Bucket={}, Key={})", self.bucket, key);
        match self.ctx.run(self.store.head_object(&self.bucket, key)).await {
            Ok(head) => {
                debug!(
                    "=> {{ ContentLength={}, LastModified={} }}",
                    head.content_length, head.last_modified
                );
                Ok(FileEntry::new(
                    self.key.base(),
                    head.last_modified,
                    head.content_length,
                    mode,
                ))
            }
            Err(e) if e.is_canceled() => Err(e),
            Err(e) => {
                debug!("=> {e}");
                Ok(FileEntry::new(self.key.base(), (self.clock)(), 0, mode))
            }
        }
    }

    async fn probe_directory(&self, key: &str) -> Result<FileEntry> {
        debug!("ListObjectsV2(Bucket={}, Prefix={})", self.bucket, key);
        let request = ListObjectsRequest {
            bucket: self.bucket.clone(),
            prefix: key.to_string(),
            delimiter: Some(KEY_SEPARATOR.to_string()),
            max_keys: self.page_size,
            continuation_token: None,
        };
        let dir_prefix = self.key.list_prefix();
        match self.ctx.run(self.store.list_objects(request)).await {
            Ok(page) => {
                debug!(
                    "=> {{ CommonPrefixes=len({}), Contents=len({}) }}",
                    page.common_prefixes.len(),
                    page.contents.len()
                );
                // siblings such as `key-2/` group under the same prefix
                if page.common_prefixes.iter().any(|p| *p == dir_prefix) {
                    Ok(FileEntry::new(
                        self.key.base(),
                        (self.clock)(),
                        0,
                        FileMode::dir(DIR_PERM),
                    ))
                } else {
                    Err(self.not_found(key))
                }
            }
            Err(e) if e.is_canceled() => Err(e),
            Err(e) => {
                debug!("=> {e}");
                Err(self.not_found(key))
            }
        }
    }

    fn not_found(&self, key: &str) -> Error {
        Error::ObjectNotFound {
            bucket: self.bucket.clone(),
            key: key.to_string(),
        }
    }
}

#[async_trait]
impl ListAt for ObjectStat {
    async fn list_at(&self, offset: u64, limit: usize) -> Result<ListPage> {
        debug!(limit, offset, "ObjectStat.list_at {}", self.key);
        if limit == 0 {
            return Ok(ListPage::default());
        }
        if offset > 0 {
            return Err(Error::OutOfRange { position: offset });
        }
        let entry = self.resolve().await?;
        Ok(ListPage {
            entries: vec![entry],
            eof: true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::phantom::PhantomObject;
    use bucketio_store::{ALL_USERS_URI, Grant, MemoryStore, ObjectAcl, Owner, Permission, StoreOp};
    use bytes::Bytes;

    const BUCKET: &str = "bucket";

    fn ts(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    fn fixed_now() -> DateTime<Utc> {
        ts(1_000_000)
    }

    fn stat(store: &Arc<MemoryStore>, registry: &Arc<PhantomRegistry>, key: &str) -> ObjectStat {
        ObjectStat::new(
            RequestContext::default(),
            store.clone(),
            Arc::clone(registry),
            BUCKET,
            KeyPath::split(key),
        )
        .with_clock(fixed_now)
    }

    #[tokio::test]
    async fn test_root() {
        let store = Arc::new(MemoryStore::new(BUCKET));
        let registry = Arc::new(PhantomRegistry::new());
        let entry = stat(&store, &registry, "/").resolve().await.unwrap();
        assert_eq!(entry.name(), "/");
        assert_eq!(entry.mode(), FileMode::dir(0o755));
        assert_eq!(entry.modified(), DateTime::UNIX_EPOCH);
        assert_eq!(store.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_phantom_without_store_calls() {
        let store = Arc::new(MemoryStore::new(BUCKET));
        let registry = Arc::new(PhantomRegistry::new());
        let info = Arc::new(PhantomObject::new(
            KeyPath::split("dir/up.bin"),
            ts(42),
            Arc::new(Bytes::new()),
        ));
        info.set_size(7);
        registry.add(info);

        let entry = stat(&store, &registry, "dir/up.bin").resolve().await.unwrap();
        assert_eq!(entry.name(), "up.bin");
        assert_eq!(entry.size(), 7);
        assert_eq!(entry.modified(), ts(42));
        assert_eq!(entry.mode(), FileMode::file(0o600));
        assert_eq!(store.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_existing_object() {
        let store = Arc::new(MemoryStore::new(BUCKET));
        store.insert("dir/f.txt", "hello", ts(10));
        let owner = store.owner_id().to_string();
        store.set_acl(
            "dir/f.txt",
            ObjectAcl {
                owner: Some(Owner {
                    id: owner.clone(),
                    display_name: None,
                }),
                grants: vec![
                    Grant::user(owner, Permission::FullControl),
                    Grant::group(ALL_USERS_URI, Permission::Read),
                ],
            },
        );
        let registry = Arc::new(PhantomRegistry::new());

        let entry = stat(&store, &registry, "/dir/f.txt").resolve().await.unwrap();
        assert_eq!(entry.name(), "f.txt");
        assert_eq!(entry.size(), 5);
        assert_eq!(entry.modified(), ts(10));
        assert_eq!(entry.mode(), FileMode::file(0o644));
        assert_eq!(store.call_count(StoreOp::GetAcl), 1);
        assert_eq!(store.call_count(StoreOp::Head), 1);
        assert_eq!(store.call_count(StoreOp::List), 0);
    }

    #[tokio::test]
    async fn test_head_failure_keeps_acl_mode() {
        let store = Arc::new(MemoryStore::new(BUCKET));
        store.insert("f", "hello", ts(10));
        store.fail_operation(StoreOp::Head);
        let registry = Arc::new(PhantomRegistry::new());

        let entry = stat(&store, &registry, "f").resolve().await.unwrap();
        assert_eq!(entry.size(), 0);
        assert_eq!(entry.modified(), fixed_now());
        assert_eq!(entry.mode(), FileMode::file(0o600));
    }

    #[tokio::test]
    async fn test_implicit_directory() {
        let store = Arc::new(MemoryStore::new(BUCKET));
        store.insert("a/b/c", "x", ts(1));
        let registry = Arc::new(PhantomRegistry::new());

        let entry = stat(&store, &registry, "a/b").resolve().await.unwrap();
        assert!(entry.is_dir());
        assert_eq!(entry.name(), "b");
        assert_eq!(entry.mode(), FileMode::dir(0o755));
        assert_eq!(entry.modified(), fixed_now());
        assert_eq!(store.call_count(StoreOp::List), 1);
    }

    #[tokio::test]
    async fn test_sibling_prefix_is_not_a_directory() {
        let store = Arc::new(MemoryStore::new(BUCKET));
        store.insert("a/bc/x", "x", ts(1));
        let registry = Arc::new(PhantomRegistry::new());

        let err = stat(&store, &registry, "a/b").resolve().await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_not_found() {
        let store = Arc::new(MemoryStore::new(BUCKET));
        let registry = Arc::new(PhantomRegistry::new());
        let err = stat(&store, &registry, "missing").resolve().await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_list_at_positions() {
        let store = Arc::new(MemoryStore::new(BUCKET));
        store.insert("f", "x", ts(1));
        let registry = Arc::new(PhantomRegistry::new());
        let stat = stat(&store, &registry, "f");

        let page = stat.list_at(0, 0).await.unwrap();
        assert!(page.is_empty());
        assert_eq!(store.total_calls(), 0);

        assert!(matches!(
            stat.list_at(1, 10).await,
            Err(Error::OutOfRange { position: 1 })
        ));

        let page = stat.list_at(0, 10).await.unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page.entries[0].name(), "f");
    }

    #[tokio::test]
    async fn test_canceled_stat_is_not_reported_missing() {
        let store = Arc::new(MemoryStore::new(BUCKET));
        let registry = Arc::new(PhantomRegistry::new());
        let ctx = RequestContext::default();
        ctx.cancel();
        let stat = ObjectStat::new(ctx, store.clone(), registry, BUCKET, KeyPath::split("f"));
        assert!(stat.resolve().await.unwrap_err().is_canceled());
    }
}
