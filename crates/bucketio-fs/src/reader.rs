//! Positional reads over a forward-only download stream
//!
//! The download body can only be consumed front to back, but file-transfer
//! clients issue positional reads that arrive slightly out of order. Bytes
//! already pulled from the body are kept in a [`Spool`] so recent positions
//! can be served again; anything further than the lookback distance behind
//! the furthest read is gone for good.

use crate::io::ReadAt;
use crate::spool::Spool;
use async_trait::async_trait;
use bucketio_common::{Error, Result};
use bucketio_store::{ObjectBody, RequestContext};
use tokio::io::AsyncReadExt;
use tokio::sync::Mutex;
use tracing::debug;

struct ReaderState {
    spool: Spool<u8>,
    /// `None` once closed, canceled or broken
    body: Option<ObjectBody>,
    no_more: bool,
}

/// Download handle with a bounded replay window
pub struct LookbackReader {
    ctx: RequestContext,
    label: String,
    lookback: usize,
    min_chunk_size: usize,
    state: Mutex<ReaderState>,
}

impl LookbackReader {
    /// Wrap `body`; `label` names the object in log lines
    pub fn new(
        ctx: RequestContext,
        body: ObjectBody,
        label: impl Into<String>,
        lookback: usize,
        min_chunk_size: usize,
    ) -> Self {
        Self {
            ctx,
            label: label.into(),
            lookback,
            min_chunk_size,
            state: Mutex::new(ReaderState {
                spool: Spool::new(),
                body: Some(body),
                no_more: false,
            }),
        }
    }
}

/// Fill `buf` from `body`, stopping early only at end of stream
async fn read_full(body: &mut ObjectBody, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match body.read(&mut buf[filled..]).await? {
            0 => break,
            n => filled += n,
        }
    }
    Ok(filled)
}

/// Consume up to `len` bytes of `body` without keeping them
async fn discard(body: &mut ObjectBody, len: u64) -> Result<u64> {
    let mut skipped = body.take(len);
    Ok(tokio::io::copy(&mut skipped, &mut tokio::io::sink()).await?)
}

impl ReaderState {
    /// Drop the body after a failed or canceled transfer
    fn abandon(&mut self, e: Error) -> Error {
        if e.is_canceled() {
            debug!("canceled");
        } else {
            debug!("=> {e}");
        }
        // a partially consumed body cannot be resumed
        self.body = None;
        e
    }
}

#[async_trait]
impl ReadAt for LookbackReader {
    async fn read_at(&self, buf: &mut [u8], offset: u64) -> Result<usize> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;

        debug!(len = buf.len(), offset, "read_at {}", self.label);
        let mut rel = state.spool.relative(offset)?;

        let cached = state.spool.slice(rel, buf.len());
        let served = cached.len();
        buf[..served].copy_from_slice(cached);
        rel += served;
        let remaining = buf.len() - served;
        if remaining == 0 || state.no_more {
            return Ok(served);
        }

        let Some(body) = state.body.as_mut() else {
            return Err(Error::Closed);
        };

        rel = state.spool.advance(rel, self.lookback);
        if rel > self.lookback {
            // the spool is empty; stream past everything outside the window
            let skip = (rel - self.lookback) as u64;
            debug!(skip, spool_offset = state.spool.offset(), "skipping {}", self.label);
            let discarded = self.ctx.run(discard(body, skip)).await;
            let skipped = match discarded {
                Ok(n) => n,
                Err(e) => return Err(state.abandon(e)),
            };
            state.spool.skip(skipped);
            if skipped < skip {
                state.no_more = true;
                return Ok(served);
            }
            rel = self.lookback;
        }

        let start = state.spool.len();
        let end = rel
            .checked_add(remaining)
            .map(|wanted| wanted.max(start.saturating_add(self.min_chunk_size)))
            .ok_or(Error::OutOfRange { position: offset })?;
        debug!(
            rel,
            spooled = start,
            spool_offset = state.spool.offset(),
            fetch = end - start,
            "refilling {}",
            self.label
        );

        let items = state.spool.items_mut();
        items.resize(end, 0);
        let fetched = self.ctx.run(read_full(body, &mut items[start..end])).await;
        match fetched {
            Ok(n) => {
                items.truncate(start + n);
                if n < end - start {
                    state.no_more = true;
                }
            }
            Err(e) => {
                items.truncate(start);
                return Err(state.abandon(e));
            }
        }

        rel = state.spool.advance(rel, self.lookback);
        let available = state.spool.slice(rel, remaining);
        let n = available.len();
        buf[served..served + n].copy_from_slice(available);
        Ok(served + n)
    }

    async fn close(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.body.take().is_some() {
            debug!("closed {}", self.label);
        }
        Ok(())
    }
}
