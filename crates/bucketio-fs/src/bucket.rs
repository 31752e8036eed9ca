//! Protocol verbs over one bucket
//!
//! [`BucketIo`] is what the file-transfer server calls into: read-open,
//! write-open, file commands and listing. Every verb first checks the
//! configured capability flags, maps the protocol path to a store key and
//! consults the phantom registry before touching the store.

use crate::io::{ListAt, ReadAt, SnapshotReader, WriteAt};
use crate::lister::{ListerOptions, ObjectLister};
use crate::phantom::PhantomRegistry;
use crate::reader::LookbackReader;
use crate::sink::{SinkOptions, UploadSink};
use crate::stat::ObjectStat;
use bucketio_common::config::{IoConfig, Perms, ServerSideEncryption};
use bucketio_common::{Config, Error, KeyMapper, KeyPath, Result};
use bucketio_store::{CannedAcl, CopyObjectRequest, GetObjectRequest, ObjectStore, RequestContext};
use chrono::{DateTime, Utc};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// File commands
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FileCommand {
    Rename { from: String, to: String },
    Remove { path: String },
    Setstat { path: String },
    Mkdir { path: String },
    Rmdir { path: String },
    Symlink { path: String, target: String },
}

impl FileCommand {
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Rename { .. } => "Rename",
            Self::Remove { .. } => "Remove",
            Self::Setstat { .. } => "Setstat",
            Self::Mkdir { .. } => "Mkdir",
            Self::Rmdir { .. } => "Rmdir",
            Self::Symlink { .. } => "Symlink",
        }
    }
}

/// Listing-style requests
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ListMethod {
    List,
    Stat,
    Readlink,
}

impl FromStr for ListMethod {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "list" => Ok(Self::List),
            "stat" => Ok(Self::Stat),
            "readlink" => Ok(Self::Readlink),
            _ => Err(Error::UnsupportedMethod(s.to_string())),
        }
    }
}

/// Adapter from file-transfer verbs to one bucket of an object store
pub struct BucketIo {
    store: Arc<dyn ObjectStore>,
    registry: Arc<PhantomRegistry>,
    bucket: String,
    keys: KeyMapper,
    perms: Perms,
    sse: ServerSideEncryption,
    io: IoConfig,
    max_object_size: Option<u64>,
    shutdown: CancellationToken,
    clock: fn() -> DateTime<Utc>,
}

impl BucketIo {
    /// Build the adapter for `config.bucket`
    ///
    /// `registry` is shared by every adapter of the process; `shutdown`
    /// cancels every in-flight store call when the server stops.
    pub fn new(
        config: &Config,
        store: Arc<dyn ObjectStore>,
        registry: Arc<PhantomRegistry>,
        shutdown: CancellationToken,
    ) -> Self {
        info!(
            "Serving bucket {} (root {:?}) from {} store",
            config.bucket.name,
            config.bucket.key_prefix,
            store.name()
        );
        Self {
            store,
            registry,
            bucket: config.bucket.name.clone(),
            keys: KeyMapper::new(&config.bucket.key_prefix),
            perms: config.perms,
            sse: config.server_side_encryption.clone(),
            io: config.io.clone(),
            max_object_size: config.bucket.max_object_size(),
            shutdown,
            clock: Utc::now,
        }
    }

    /// Replace the time source used for new uploads and stat fallbacks
    #[must_use]
    pub const fn with_clock(mut self, clock: fn() -> DateTime<Utc>) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub const fn registry(&self) -> &Arc<PhantomRegistry> {
        &self.registry
    }

    #[must_use]
    pub const fn key_mapper(&self) -> &KeyMapper {
        &self.keys
    }

    fn context(&self, request: &CancellationToken) -> RequestContext {
        RequestContext::new(&self.shutdown, request.clone())
    }

    fn check(allowed: bool, operation: &'static str) -> Result<()> {
        if allowed {
            Ok(())
        } else {
            Err(Error::not_allowed(operation))
        }
    }

    /// Open `path` for positional reads
    ///
    /// An upload still in flight is served from its buffered bytes as of
    /// this call.
    pub async fn open_read(&self, path: &str, request: &CancellationToken) -> Result<Box<dyn ReadAt>> {
        Self::check(self.perms.readable, "read")?;
        let key = self.keys.to_key(path);

        if let Some(info) = self.registry.get(&key) {
            debug!("serving in-flight upload {}", key);
            return Ok(Box::new(SnapshotReader::new(info.content())));
        }

        let ctx = self.context(request);
        let key = key.to_string();
        debug!("GetObject(Bucket={}, Key={})", self.bucket, key);
        let output = ctx
            .run(self.store.get_object(GetObjectRequest {
                bucket: self.bucket.clone(),
                key: key.clone(),
                sse: self.sse.clone(),
            }))
            .await
            .inspect_err(|e| debug!("=> {e}"))?;
        debug!("=> {:?}", output);

        Ok(Box::new(LookbackReader::new(
            ctx,
            output.body,
            format!("{}/{}", self.bucket, key),
            self.io.reader_lookback_buffer_size,
            self.io.reader_min_chunk_size,
        )))
    }

    /// Open `path` for positional writes
    ///
    /// The file shows up in stat and listings at once; it reaches the store
    /// when the returned handle is closed.
    pub fn open_write(&self, path: &str, request: &CancellationToken) -> Result<Box<dyn WriteAt>> {
        Self::check(self.perms.writable, "write")?;
        let key = self.keys.to_key(path);
        debug!("UploadSink.create(key={})", key);
        let sink = UploadSink::create(
            self.context(request),
            Arc::clone(&self.store),
            Arc::clone(&self.registry),
            SinkOptions {
                bucket: self.bucket.clone(),
                sse: self.sse.clone(),
                max_object_size: self.max_object_size,
            },
            key,
            (self.clock)(),
        )?;
        Ok(Box::new(sink))
    }

    pub async fn file_cmd(&self, command: FileCommand, request: &CancellationToken) -> Result<()> {
        Self::check(self.perms.writable, "write")?;
        match command {
            FileCommand::Rename { from, to } => {
                let src = self.keys.to_key(&from);
                let dest = self.keys.to_key(&to);
                self.rename(&src, &dest, request).await
            }
            FileCommand::Remove { path } => {
                let key = self.keys.to_key(&path);
                self.remove(&key, request).await
            }
            other => {
                debug!("{} accepted without effect", other.name());
                Ok(())
            }
        }
    }

    async fn rename(&self, src: &KeyPath, dest: &KeyPath, request: &CancellationToken) -> Result<()> {
        if self.registry.rename(src, dest) {
            debug!("renamed in-flight upload {} to {}", src, dest);
            return Ok(());
        }

        let ctx = self.context(request);
        let copy = CopyObjectRequest {
            bucket: self.bucket.clone(),
            source_key: src.to_string(),
            key: dest.to_string(),
            acl: CannedAcl::Private,
            sse: self.sse.clone(),
        };
        debug!(
            "CopyObject(Bucket={}, Key={}, CopySource={}, ACL={}, Sse={:?})",
            copy.bucket,
            copy.key,
            copy.copy_source(),
            copy.acl.as_str(),
            self.sse.sse_type
        );
        ctx.run(self.store.copy_object(copy))
            .await
            .inspect_err(|e| debug!("=> {e}"))?;

        let src = src.to_string();
        debug!("DeleteObject(Bucket={}, Key={})", self.bucket, src);
        ctx.run(self.store.delete_object(&self.bucket, &src))
            .await
            .inspect_err(|e| debug!("=> {e}"))
    }

    async fn remove(&self, key: &KeyPath, request: &CancellationToken) -> Result<()> {
        if let Some(info) = self.registry.remove(key) {
            debug!("discarded in-flight upload {}", key);
            info.discard();
            return Ok(());
        }

        let ctx = self.context(request);
        let key = key.to_string();
        debug!("DeleteObject(Bucket={}, Key={})", self.bucket, key);
        ctx.run(self.store.delete_object(&self.bucket, &key))
            .await
            .inspect_err(|e| debug!("=> {e}"))
    }

    /// Open a listing or stat handle for `path`
    pub fn list(&self, method: ListMethod, path: &str, request: &CancellationToken) -> Result<Box<dyn ListAt>> {
        match method {
            ListMethod::List => {
                Self::check(self.perms.listable, "listing")?;
                Ok(Box::new(ObjectLister::new(
                    self.context(request),
                    Arc::clone(&self.store),
                    Arc::clone(&self.registry),
                    ListerOptions {
                        bucket: self.bucket.clone(),
                        lookback: self.io.lister_lookback_buffer_size,
                        page_size: self.io.list_page_size,
                    },
                    self.keys.to_key(path),
                )))
            }
            ListMethod::Stat | ListMethod::Readlink => {
                Self::check(self.perms.readable || self.perms.listable, "stat")?;
                let stat = ObjectStat::new(
                    self.context(request),
                    Arc::clone(&self.store),
                    Arc::clone(&self.registry),
                    self.bucket.clone(),
                    self.keys.to_key(path),
                )
                .with_page_size(self.io.list_page_size)
                .with_clock(self.clock);
                Ok(Box::new(stat))
            }
        }
    }
}

impl fmt::Debug for BucketIo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BucketIo")
            .field("store", &self.store.name())
            .field("bucket", &self.bucket)
            .field("root", self.keys.root())
            .field("perms", &self.perms)
            .field("max_object_size", &self.max_object_size)
            .finish_non_exhaustive()
    }
}
