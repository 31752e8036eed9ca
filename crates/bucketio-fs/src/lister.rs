//! Directory listing over paginated key enumeration
//!
//! Entries are produced in this order: synthetic `.` and `..`, in-flight
//! uploads directly under the directory, then the store's pages (grouped
//! sub-prefixes as directories, objects as files). Entries already produced
//! are kept in a [`Spool`] with a bounded lookback, like the download
//! reader.

use crate::io::{ListAt, ListPage};
use crate::phantom::PhantomRegistry;
use crate::spool::Spool;
use async_trait::async_trait;
use bucketio_common::{FileEntry, FileMode, KEY_SEPARATOR, KeyPath, Result};
use bucketio_store::{ListObjectsRequest, ObjectStore, RequestContext};
use chrono::{DateTime, TimeDelta, Utc};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

/// Permission bits reported for directories
pub const DIR_PERM: u32 = 0o755;
/// Permission bits reported for listed objects
pub const FILE_PERM: u32 = 0o644;

/// Timestamp given to entries the store has no time for
pub(crate) fn synthetic_time() -> DateTime<Utc> {
    DateTime::UNIX_EPOCH + TimeDelta::seconds(1)
}

/// Last path segment of a store key, ignoring a trailing separator
pub(crate) fn base_name(key: &str) -> String {
    KeyPath::split(key).base().to_string()
}

/// Enumeration settings
#[derive(Clone, Debug)]
pub struct ListerOptions {
    pub bucket: String,
    /// Entries retained behind the furthest position served
    pub lookback: usize,
    /// Keys requested per store page
    pub page_size: usize,
}

#[derive(Default)]
struct ListerState {
    spool: Spool<FileEntry>,
    started: bool,
    pages: usize,
    continuation: Option<String>,
    no_more: bool,
}

/// Listing handle for one directory
pub struct ObjectLister {
    ctx: RequestContext,
    store: Arc<dyn ObjectStore>,
    registry: Arc<PhantomRegistry>,
    options: ListerOptions,
    prefix: KeyPath,
    state: Mutex<ListerState>,
}

impl ObjectLister {
    pub fn new(
        ctx: RequestContext,
        store: Arc<dyn ObjectStore>,
        registry: Arc<PhantomRegistry>,
        options: ListerOptions,
        prefix: KeyPath,
    ) -> Self {
        Self {
            ctx,
            store,
            registry,
            options,
            prefix,
            state: Mutex::new(ListerState::default()),
        }
    }

    /// Spool the entries that precede the first store page
    fn start(&self, state: &mut ListerState) {
        let dir = FileMode::dir(DIR_PERM);
        state.spool.push(FileEntry::new(".", synthetic_time(), 0, dir));
        state.spool.push(FileEntry::new("..", synthetic_time(), 0, dir));
        for info in self.registry.list(&self.prefix) {
            state.spool.push(info.snapshot().to_entry());
        }
        state.started = true;
    }

    /// Fetch the next store page into the spool
    async fn fetch_page(&self, state: &mut ListerState) -> Result<()> {
        let prefix = self.prefix.list_prefix();
        debug!(
            "ListObjectsV2(Bucket={}, Prefix={}, Continuation={:?})",
            self.options.bucket, prefix, state.continuation
        );
        let request = ListObjectsRequest {
            bucket: self.options.bucket.clone(),
            prefix: prefix.clone(),
            delimiter: Some(KEY_SEPARATOR.to_string()),
            max_keys: self.options.page_size,
            continuation_token: state.continuation.clone(),
        };
        let page = self
            .ctx
            .run(self.store.list_objects(request))
            .await
            .inspect_err(|e| debug!("=> {e}"))?;
        debug!(
            "=> {{ CommonPrefixes=len({}), Contents=len({}) }}",
            page.common_prefixes.len(),
            page.contents.len()
        );

        if state.pages == 0 {
            for common_prefix in &page.common_prefixes {
                state.spool.push(FileEntry::new(
                    base_name(common_prefix),
                    synthetic_time(),
                    0,
                    FileMode::dir(DIR_PERM),
                ));
            }
        }
        for object in page.contents {
            // directory marker
            if object.key == prefix {
                continue;
            }
            state.spool.push(FileEntry::new(
                base_name(&object.key),
                object.last_modified,
                object.size,
                FileMode::file(FILE_PERM),
            ));
        }
        state.pages += 1;
        state.no_more = page.next_continuation_token.is_none();
        state.continuation = page.next_continuation_token;
        Ok(())
    }
}

#[async_trait]
impl ListAt for ObjectLister {
    async fn list_at(&self, offset: u64, limit: usize) -> Result<ListPage> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;

        let mut rel = state.spool.relative(offset)?;
        let mut entries = state.spool.slice(rel, limit).to_vec();
        rel += entries.len();
        if entries.len() >= limit {
            return Ok(ListPage {
                entries,
                eof: state.no_more && rel >= state.spool.len(),
            });
        }
        if state.no_more {
            return Ok(ListPage { entries, eof: true });
        }

        rel = state.spool.advance(rel, self.options.lookback);
        if !state.started {
            self.start(state);
        }
        // an offset past the spooled entries may need several pages
        loop {
            self.fetch_page(state).await?;
            rel = state.spool.advance(rel, self.options.lookback);
            if rel < state.spool.len() || state.no_more {
                break;
            }
        }

        let more = state.spool.slice(rel, limit - entries.len());
        let exhausted = rel + more.len() >= state.spool.len();
        entries.extend_from_slice(more);
        Ok(ListPage {
            entries,
            eof: state.no_more && exhausted,
        })
    }
}
