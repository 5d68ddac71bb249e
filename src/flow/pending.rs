//! Abortable in-flight decision-matrix request.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures_util::future::{AbortHandle, Aborted, BoxFuture};

use crate::error::FlowError;
use crate::provider::DecisionOutcome;

/// The asynchronous `Init → Decision` step of one batch.
///
/// Resolves to the [`DecisionOutcome`] for the batch it was requested for, or
/// [`FlowError::Cancelled`] if the flow moved on to another batch or was torn
/// down first. Feed the outcome back through
/// [`StagedFlow::apply_decision`](super::StagedFlow::apply_decision).
#[must_use = "a pending decision does nothing unless awaited"]
pub struct PendingDecision {
    batch_id: String,
    handle: AbortHandle,
    inner: BoxFuture<'static, Result<DecisionOutcome, Aborted>>,
}

impl PendingDecision {
    pub(crate) fn new(
        batch_id: String,
        handle: AbortHandle,
        inner: BoxFuture<'static, Result<DecisionOutcome, Aborted>>,
    ) -> Self {
        Self {
            batch_id,
            handle,
            inner,
        }
    }

    /// Batch the request belongs to.
    #[must_use]
    pub fn batch_id(&self) -> &str {
        &self.batch_id
    }

    /// Handle that cancels this request.
    #[must_use]
    pub fn abort_handle(&self) -> AbortHandle {
        self.handle.clone()
    }

    /// Returns true if the request has been cancelled.
    #[must_use]
    pub fn is_aborted(&self) -> bool {
        self.handle.is_aborted()
    }
}

impl std::fmt::Debug for PendingDecision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingDecision")
            .field("batch_id", &self.batch_id)
            .field("aborted", &self.is_aborted())
            .finish_non_exhaustive()
    }
}

impl Future for PendingDecision {
    type Output = Result<DecisionOutcome, FlowError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let polled = self.inner.as_mut().poll(cx);
        polled.map(|result| {
            result.map_err(|_| FlowError::Cancelled {
                batch_id: self.batch_id.clone(),
            })
        })
    }
}
