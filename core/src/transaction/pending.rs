//! In-flight asynchronous commits.
//!
//! [`TransactionManager::begin_commit_async`](super::TransactionManager::begin_commit_async)
//! moves the request out of the manager into a [`PendingCommit`] and holds
//! the busy latch until the matching
//! [`finish_commit_async`](super::TransactionManager::finish_commit_async).
//! Dropping either half early releases the latch and discards the request.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use super::error::RequestResult;
use super::history::RequestRecord;
use super::request::RequestId;
use super::session::SessionId;

/// Shared flag naming the request whose asynchronous commit is in flight.
#[derive(Clone, Default)]
pub(crate) struct BusyLatch {
    holder: Arc<Mutex<Option<RequestId>>>,
}

impl BusyLatch {
    pub(crate) fn holder(&self) -> Option<RequestId> {
        *self.holder.lock()
    }

    pub(crate) fn is_held(&self) -> bool {
        self.holder.lock().is_some()
    }

    pub(crate) fn acquire(&self, request: RequestId) -> LatchGuard {
        *self.holder.lock() = Some(request);
        LatchGuard {
            holder: Arc::clone(&self.holder),
            request,
            finished: false,
        }
    }
}

impl fmt::Debug for BusyLatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BusyLatch")
            .field("holder", &self.holder())
            .finish()
    }
}

/// Releases the latch when dropped.
pub(crate) struct LatchGuard {
    holder: Arc<Mutex<Option<RequestId>>>,
    request: RequestId,
    finished: bool,
}

impl LatchGuard {
    pub(crate) fn finish(mut self) {
        self.finished = true;
    }
}

impl Drop for LatchGuard {
    fn drop(&mut self) {
        if !self.finished {
            log::warn!(
                target: "transaction",
                "Asynchronous commit of request {} dropped before completion, request discarded",
                self.request
            );
        }
        let mut holder = self.holder.lock();
        if *holder == Some(self.request) {
            *holder = None;
        }
    }
}

/// A request whose asynchronous commit has been started.
///
/// Drive it with [`run`](Self::run) and hand the result back to the manager
/// with [`finish_commit_async`](super::TransactionManager::finish_commit_async).
pub struct PendingCommit {
    record: RequestRecord,
    target: SessionId,
    guard: LatchGuard,
}

impl PendingCommit {
    pub(crate) fn new(record: RequestRecord, target: SessionId, guard: LatchGuard) -> Self {
        Self {
            record,
            target,
            guard,
        }
    }

    pub fn request(&self) -> RequestId {
        self.record.id()
    }

    pub fn description(&self) -> &str {
        self.record.description()
    }

    /// Session the committed request will be recorded into.
    pub fn target_session(&self) -> SessionId {
        self.target
    }

    /// Awaits the request's `commit_async`.
    pub async fn run(mut self) -> CommitOutcome {
        let result = self.record.request.commit_async().await;
        CommitOutcome {
            record: self.record,
            target: self.target,
            result,
            guard: self.guard,
        }
    }
}

impl fmt::Debug for PendingCommit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingCommit")
            .field("request", &self.record.id())
            .field("target", &self.target)
            .finish()
    }
}

/// Result of [`PendingCommit::run`], still holding the busy latch.
pub struct CommitOutcome {
    record: RequestRecord,
    target: SessionId,
    result: RequestResult,
    guard: LatchGuard,
}

impl CommitOutcome {
    pub fn request(&self) -> RequestId {
        self.record.id()
    }

    pub fn result(&self) -> &RequestResult {
        &self.result
    }

    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }

    pub(crate) fn into_parts(self) -> (RequestRecord, SessionId, RequestResult, LatchGuard) {
        (self.record, self.target, self.result, self.guard)
    }
}

impl fmt::Debug for CommitOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommitOutcome")
            .field("request", &self.record.id())
            .field("target", &self.target)
            .field("result", &self.result)
            .finish()
    }
}
