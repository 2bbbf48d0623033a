//! Signal dispatch gate.
//!
//! Every lifecycle notification the manager emits goes through a
//! [`SignalGate`]. The gate can hold notifications back (blocked mode),
//! replay them later in insertion order, veto individual dispatches through
//! a predicate, or drop everything while suppressed. It never touches the
//! [`Signal`] implementation itself.

use std::collections::VecDeque;
use std::fmt;

use super::request::RequestInfo;
use super::signal::Signal;

/// Names one of the manager's signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignalKind {
    Created,
    Aborting,
    Aborted,
    Committing,
    Committed,
    Undoing,
    Undone,
    Redoing,
    Redone,
    UndoRedoStateChanged,
}

impl SignalKind {
    pub fn name(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Aborting => "aborting",
            Self::Aborted => "aborted",
            Self::Committing => "committing",
            Self::Committed => "committed",
            Self::Undoing => "undoing",
            Self::Undone => "undone",
            Self::Redoing => "redoing",
            Self::Redone => "redone",
            Self::UndoRedoStateChanged => "undo_redo_state_changed",
        }
    }
}

impl fmt::Display for SignalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Payload of a gated signal.
#[derive(Debug, Clone, PartialEq)]
pub enum SignalData {
    Request(RequestInfo),
    Empty,
}

impl SignalData {
    pub fn request(&self) -> Option<&RequestInfo> {
        match self {
            Self::Request(info) => Some(info),
            Self::Empty => None,
        }
    }
}

/// A notification held back while signals were blocked.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockedSignal {
    pub kind: SignalKind,
    pub data: SignalData,
}

/// The signals owned by a [`TransactionManager`](super::TransactionManager).
///
/// Listeners subscribe directly on the fields:
///
/// ```ignore
/// manager.signals().committed.listen(|info| log::info!("{}", info.description));
/// ```
#[derive(Debug, Default)]
pub struct ManagerSignals {
    pub created: Signal<RequestInfo>,
    pub aborting: Signal<RequestInfo>,
    pub aborted: Signal<RequestInfo>,
    pub committing: Signal<RequestInfo>,
    pub committed: Signal<RequestInfo>,
    pub undoing: Signal<RequestInfo>,
    pub undone: Signal<RequestInfo>,
    pub redoing: Signal<RequestInfo>,
    pub redone: Signal<RequestInfo>,
    pub undo_redo_state_changed: Signal<()>,
}

impl ManagerSignals {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the request-carrying signal for `kind`.
    ///
    /// `None` for [`SignalKind::UndoRedoStateChanged`], which has no payload.
    pub fn request_signal(&self, kind: SignalKind) -> Option<&Signal<RequestInfo>> {
        match kind {
            SignalKind::Created => Some(&self.created),
            SignalKind::Aborting => Some(&self.aborting),
            SignalKind::Aborted => Some(&self.aborted),
            SignalKind::Committing => Some(&self.committing),
            SignalKind::Committed => Some(&self.committed),
            SignalKind::Undoing => Some(&self.undoing),
            SignalKind::Undone => Some(&self.undone),
            SignalKind::Redoing => Some(&self.redoing),
            SignalKind::Redone => Some(&self.redone),
            SignalKind::UndoRedoStateChanged => None,
        }
    }

    /// Fires the signal named by `kind` without any gating.
    pub fn dispatch(&self, kind: SignalKind, data: &SignalData) {
        match (kind, data) {
            (SignalKind::UndoRedoStateChanged, _) => self.undo_redo_state_changed.dispatch(&()),
            (kind, SignalData::Request(info)) => {
                if let Some(signal) = self.request_signal(kind) {
                    signal.dispatch(info);
                }
            }
            (kind, SignalData::Empty) => {
                log::warn!(target: "transaction", "Signal {kind} dispatched without a request");
            }
        }
    }

    /// Drops every listener of every signal.
    pub fn clear_listeners(&self) {
        for kind in [
            SignalKind::Created,
            SignalKind::Aborting,
            SignalKind::Aborted,
            SignalKind::Committing,
            SignalKind::Committed,
            SignalKind::Undoing,
            SignalKind::Undone,
            SignalKind::Redoing,
            SignalKind::Redone,
        ] {
            if let Some(signal) = self.request_signal(kind) {
                signal.clear();
            }
        }
        self.undo_redo_state_changed.clear();
    }
}

/// Predicate consulted before each dispatch; `false` vetoes it.
pub type DispatchCondition = Box<dyn FnMut(SignalKind, &SignalData) -> bool + Send>;

/// Queue-and-replay decorator around [`ManagerSignals`].
#[derive(Default)]
pub struct SignalGate {
    blocking: bool,
    suppressed: bool,
    queue: VecDeque<BlockedSignal>,
    condition: Option<DispatchCondition>,
}

impl SignalGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts queueing signals instead of dispatching them.
    pub fn start_blocking(&mut self) {
        self.blocking = true;
    }

    /// Stops queueing. Already queued signals stay queued until
    /// [`flush`](Self::flush).
    pub fn stop_blocking(&mut self) {
        self.blocking = false;
    }

    pub fn is_blocking(&self) -> bool {
        self.blocking
    }

    pub fn set_suppressed(&mut self, suppressed: bool) {
        self.suppressed = suppressed;
    }

    pub fn is_suppressed(&self) -> bool {
        self.suppressed
    }

    pub fn set_condition(&mut self, condition: Option<DispatchCondition>) {
        self.condition = condition;
    }

    /// Evaluates the dispatch condition for one signal.
    pub fn allows(&mut self, kind: SignalKind, data: &SignalData) -> bool {
        match &mut self.condition {
            Some(condition) => condition(kind, data),
            None => true,
        }
    }

    /// Queues the signal if blocking is active. Returns whether it was queued.
    pub fn block(&mut self, kind: SignalKind, data: SignalData) -> bool {
        if !self.blocking || self.suppressed {
            return false;
        }
        self.queue.push_back(BlockedSignal { kind, data });
        true
    }

    /// Routes one signal: dropped while suppressed, queued while blocking,
    /// otherwise dispatched if the condition allows it.
    pub fn emit(&mut self, signals: &ManagerSignals, kind: SignalKind, data: SignalData) {
        if self.suppressed {
            return;
        }
        if !self.blocking {
            if self.allows(kind, &data) {
                signals.dispatch(kind, &data);
            }
            return;
        }
        self.block(kind, data);
    }

    /// Replays every queued signal in insertion order and empties the queue.
    ///
    /// Each replay passes through the dispatch condition. Returns the number
    /// of signals actually dispatched.
    pub fn flush(&mut self, signals: &ManagerSignals) -> usize {
        let queued = std::mem::take(&mut self.queue);
        let mut dispatched = 0;
        for BlockedSignal { kind, data } in queued {
            if self.suppressed {
                continue;
            }
            if self.allows(kind, &data) {
                signals.dispatch(kind, &data);
                dispatched += 1;
            }
        }
        dispatched
    }

    /// Drops queued signals without dispatching them.
    pub fn discard_queue(&mut self) {
        self.queue.clear();
    }

    pub fn queued(&self) -> impl Iterator<Item = &BlockedSignal> {
        self.queue.iter()
    }

    pub fn queued_count(&self) -> usize {
        self.queue.len()
    }
}

impl fmt::Debug for SignalGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignalGate")
            .field("blocking", &self.blocking)
            .field("suppressed", &self.suppressed)
            .field("queued", &self.queue.len())
            .field("has_condition", &self.condition.is_some())
            .finish()
    }
}
