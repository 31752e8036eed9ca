//! Buffered upload sink
//!
//! Positional writes accumulate in memory while the upload is visible as a
//! phantom entry. Close withdraws the phantom entry and commits the whole
//! buffer with a single put.

use crate::io::WriteAt;
use crate::phantom::{PhantomContent, PhantomObject, PhantomRegistry};
use async_trait::async_trait;
use bucketio_common::config::ServerSideEncryption;
use bucketio_common::{Error, KeyPath, Result};
use bucketio_store::{CannedAcl, ObjectStore, PutObjectRequest, RequestContext};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, error};

/// Growable byte buffer supporting writes at arbitrary offsets
#[derive(Debug, Default)]
pub struct UploadBuffer {
    data: RwLock<Vec<u8>>,
}

impl UploadBuffer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Write `buf` at `offset`, zero-filling any gap before it
    ///
    /// Fails without touching the buffer when the write ends past `usize::MAX`
    /// or the grown buffer cannot be allocated.
    pub fn write_at(&self, buf: &[u8], offset: usize) -> Result<usize> {
        let end = offset.checked_add(buf.len()).ok_or_else(|| {
            Error::invalid_argument(format!("write of {} bytes at {offset} overflows", buf.len()))
        })?;
        let mut data = self.data.write();
        if data.len() < end {
            let additional = end - data.len();
            data.try_reserve(additional)
                .map_err(|e| Error::invalid_argument(format!("cannot buffer {end} bytes: {e}")))?;
            data.resize(end, 0);
        }
        data[offset..end].copy_from_slice(buf);
        Ok(buf.len())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }

    #[must_use]
    pub fn to_bytes(&self) -> Bytes {
        Bytes::copy_from_slice(&self.data.read())
    }
}

impl PhantomContent for UploadBuffer {
    fn snapshot(&self) -> Bytes {
        self.to_bytes()
    }

    fn size(&self) -> u64 {
        self.len() as u64
    }
}

/// Settings shared by every sink of one bucket
#[derive(Clone, Debug)]
pub struct SinkOptions {
    pub bucket: String,
    pub sse: ServerSideEncryption,
    /// `None` for unbounded
    pub max_object_size: Option<u64>,
}

/// Upload handle for one write-open
pub struct UploadSink {
    ctx: RequestContext,
    store: Arc<dyn ObjectStore>,
    registry: Arc<PhantomRegistry>,
    options: SinkOptions,
    info: Arc<PhantomObject>,
    buffer: Arc<UploadBuffer>,
    closed: tokio::sync::Mutex<bool>,
}

impl UploadSink {
    /// Register a phantom entry for `key` and return the sink feeding it
    ///
    /// Fails with [`Error::UploadInProgress`] when another upload to the same
    /// key is still open.
    pub fn create(
        ctx: RequestContext,
        store: Arc<dyn ObjectStore>,
        registry: Arc<PhantomRegistry>,
        options: SinkOptions,
        key: KeyPath,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        let buffer = Arc::new(UploadBuffer::new());
        let content: Arc<dyn PhantomContent> = buffer.clone();
        let info = Arc::new(PhantomObject::new(key, now, content));
        if !registry.add(Arc::clone(&info)) {
            return Err(Error::UploadInProgress(info.key().to_string()));
        }
        Ok(Self {
            ctx,
            store,
            registry,
            options,
            info,
            buffer,
            closed: tokio::sync::Mutex::new(false),
        })
    }

    /// Phantom entry backing this upload
    #[must_use]
    pub const fn info(&self) -> &Arc<PhantomObject> {
        &self.info
    }

    fn check_limit(&self, len: usize, offset: u64) -> Result<()> {
        let Some(max_size) = self.options.max_object_size else {
            return Ok(());
        };
        match offset.checked_add(len as u64) {
            Some(end) if end <= max_size => Ok(()),
            _ => Err(Error::EntityTooLarge { max_size }),
        }
    }
}

#[async_trait]
impl WriteAt for UploadSink {
    async fn write_at(&self, buf: &[u8], offset: u64) -> Result<usize> {
        let closed = self.closed.lock().await;
        if *closed {
            return Err(Error::Closed);
        }
        self.check_limit(buf.len(), offset)?;
        debug!(len = buf.len(), offset, "UploadSink.write_at");
        let start = usize::try_from(offset)
            .map_err(|_| Error::invalid_argument(format!("write offset {offset} too large")))?;
        let n = self.buffer.write_at(buf, start)?;
        self.info.set_size(self.buffer.len() as u64);
        Ok(n)
    }

    async fn close(&self) -> Result<()> {
        let mut closed = self.closed.lock().await;
        if *closed {
            return Ok(());
        }
        *closed = true;

        self.registry.remove_by_ref(&self.info);
        // no longer registered, so the key cannot change under us
        let key = self.info.key().to_string();
        if self.info.is_discarded() {
            debug!("upload of {}/{} was removed before close", self.options.bucket, key);
            return Ok(());
        }

        let request = PutObjectRequest {
            bucket: self.options.bucket.clone(),
            key: key.clone(),
            body: self.buffer.to_bytes(),
            acl: CannedAcl::Private,
            sse: self.options.sse.clone(),
        };
        debug!(
            "PutObject(Bucket={}, Key={}, ACL={}, Sse={:?})",
            request.bucket,
            request.key,
            request.acl.as_str(),
            request.sse
        );
        match self.ctx.run(self.store.put_object(request)).await {
            Ok(()) => {
                debug!("=> OK");
                Ok(())
            }
            Err(e) => {
                debug!("=> {e}");
                error!("failed to put object {}/{}: {}", self.options.bucket, key, e);
                Err(e)
            }
        }
    }
}
