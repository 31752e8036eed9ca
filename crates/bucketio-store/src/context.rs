//! Cancelable store calls
//!
//! Every blocking store call made on behalf of a protocol request runs under
//! a [`RequestContext`]: the combination of the process-wide shutdown token
//! and the request's own token. Whichever fires first ends the call.

use bucketio_common::{Error, Result};
use std::future::Future;
use tokio_util::sync::CancellationToken;

/// Cancellation scope of one protocol request
#[derive(Clone, Debug, Default)]
pub struct RequestContext {
    shutdown: CancellationToken,
    request: CancellationToken,
}

impl RequestContext {
    /// Combine the server's shutdown token with a request token
    #[must_use]
    pub fn new(shutdown: &CancellationToken, request: CancellationToken) -> Self {
        Self {
            shutdown: shutdown.clone(),
            request,
        }
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.shutdown.is_cancelled() || self.request.is_cancelled()
    }

    /// Cancel this request only
    pub fn cancel(&self) {
        self.request.cancel();
    }

    /// Resolves once either token is canceled
    pub async fn cancelled(&self) {
        tokio::select! {
            () = self.shutdown.cancelled() => {}
            () = self.request.cancelled() => {}
        }
    }

    /// Run `fut` to completion unless the context is canceled first
    ///
    /// On cancellation `fut` is dropped, which interrupts whatever transfer it
    /// had in flight, and [`Error::Canceled`] is returned.
    pub async fn run<F, T>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        tokio::select! {
            biased;
            () = self.cancelled() => Err(Error::Canceled),
            result = fut => result,
        }
    }
}
