//! The transaction manager.
//!
//! [`TransactionManager`] is the only entry point of the transaction layer.
//! It owns the request registry, every live request, the session stack and
//! the signal gate, and it sequences every lifecycle transition:
//!
//! ```text
//! create_request ──► commit ──► history of the active session ──► undo ⇄ redo
//!        └─────────► abort
//! ```
//!
//! Misuse (double commit, stale ids, closing a session that is not on top,
//! anything while an asynchronous commit is in flight) is logged and turned
//! into a no-op returning `false`. The `try_*` variants report the reason as
//! a [`TransactionError`] instead.

use std::collections::HashMap;
use std::fmt;

use super::config::ManagerConfig;
use super::error::{RequestResult, TransactionError, TransactionResult};
use super::gate::{ManagerSignals, SignalData, SignalGate, SignalKind};
use super::history::{HistorySnapshot, RequestRecord};
use super::pending::{BusyLatch, CommitOutcome, PendingCommit};
use super::registry::{RequestArgs, RequestRegistry, RequestTypeEntry};
use super::request::{Request, RequestId, RequestInfo, RequestState};
use super::session::{CommitOptions, Session, SessionControl, SessionId, SessionOptions};

const DEFAULT_SESSION_DESCRIPTION: &str = "Default";

/// Sequences requests, sessions, undo/redo and lifecycle signals.
///
/// # Example
///
/// ```ignore
/// let mut manager = TransactionManager::new();
/// manager.register("move", |args| Ok(Box::new(MoveShape::from_args(args)?) as Box<dyn Request>));
///
/// let id = manager.create_request("move", vec![5.0.into(), 5.0.into()], true)?;
/// manager.commit(id, false);
/// assert!(manager.can_undo());
/// manager.undo();
/// ```
pub struct TransactionManager {
    config: ManagerConfig,
    enabled: bool,
    undo_redo_blocked: bool,
    registry: RequestRegistry,
    signals: ManagerSignals,
    gate: SignalGate,
    /// Session stack; index 0 is the default session and is never popped.
    sessions: Vec<Session>,
    /// Requests that are activated but neither committed nor aborted.
    active: HashMap<RequestId, RequestRecord>,
    busy: BusyLatch,
    next_request_id: u64,
    next_session_id: u64,
}

impl TransactionManager {
    pub fn new() -> Self {
        Self::with_config(ManagerConfig::default())
    }

    pub fn with_config(config: ManagerConfig) -> Self {
        let mut manager = Self {
            enabled: config.enabled,
            config,
            undo_redo_blocked: false,
            registry: RequestRegistry::new(),
            signals: ManagerSignals::new(),
            gate: SignalGate::new(),
            sessions: Vec::new(),
            active: HashMap::new(),
            busy: BusyLatch::default(),
            next_request_id: 1,
            next_session_id: 1,
        };
        let default = manager.default_session();
        manager.sessions.push(default);
        log::debug!(
            target: "transaction",
            "Transaction manager created (max_undo_step = {})",
            manager.config.max_undo_step
        );
        manager
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    /// History bound of the default session.
    pub fn max_undo_step(&self) -> usize {
        self.config.max_undo_step
    }

    /// Changes the default session's history bound, evicting immediately.
    pub fn set_max_undo_step(&mut self, max_undo_step: usize) {
        let before = self.undo_redo_state();
        self.config.max_undo_step = max_undo_step;
        self.sessions[0].history_mut().set_max_undo_step(max_undo_step);
        self.notify_if_changed(before);
    }

    /// Clears all state, drops the registry and every listener, and disables
    /// the manager.
    pub fn dispose(&mut self) {
        self.clear(false);
        self.registry.clear();
        self.signals.clear_listeners();
        self.gate = SignalGate::new();
        self.enabled = false;
        log::info!(target: "transaction", "Transaction manager disposed");
    }

    // ------------------------------------------------------------------
    // Enable / disable
    // ------------------------------------------------------------------

    pub fn enable(&mut self) {
        self.set_enabled(true);
    }

    /// Turns commit, abort, undo, redo and session operations into silent
    /// no-ops. History is kept.
    pub fn disable(&mut self) {
        self.set_enabled(false);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn set_enabled(&mut self, enabled: bool) {
        if self.enabled == enabled {
            return;
        }
        let before = self.undo_redo_state();
        self.enabled = enabled;
        log::info!(
            target: "transaction",
            "Transaction manager {}",
            if enabled { "enabled" } else { "disabled" }
        );
        self.notify_if_changed(before);
    }

    // ------------------------------------------------------------------
    // Registry
    // ------------------------------------------------------------------

    /// Registers (or replaces) the factory for `type_key`.
    pub fn register<F>(&mut self, type_key: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn(RequestArgs) -> RequestResult<Box<dyn Request>> + Send + Sync + 'static,
    {
        self.registry.register(RequestTypeEntry::new(type_key, factory));
        self
    }

    /// Registers a factory whose arguments are rewritten by `adapter` first.
    pub fn register_with_adapter<F, A>(
        &mut self,
        type_key: impl Into<String>,
        factory: F,
        adapter: A,
    ) -> &mut Self
    where
        F: Fn(RequestArgs) -> RequestResult<Box<dyn Request>> + Send + Sync + 'static,
        A: Fn(RequestArgs) -> RequestArgs + Send + Sync + 'static,
    {
        self.registry
            .register(RequestTypeEntry::new(type_key, factory).with_adapter(adapter));
        self
    }

    pub fn register_all(&mut self, entries: impl IntoIterator<Item = RequestTypeEntry>) -> &mut Self {
        for entry in entries {
            self.registry.register(entry);
        }
        self
    }

    pub fn request_type(&self, type_key: &str) -> Option<&RequestTypeEntry> {
        self.registry.get(type_key)
    }

    pub fn is_registered(&self, type_key: &str) -> bool {
        self.registry.contains(type_key)
    }

    /// Registered type keys, sorted.
    pub fn registered_types(&self) -> Vec<&str> {
        self.registry.type_keys()
    }

    // ------------------------------------------------------------------
    // Request lifecycle
    // ------------------------------------------------------------------

    /// Instantiates a registered request type and activates it.
    ///
    /// Emits `created` when `emit_created` is set.
    pub fn create_request(
        &mut self,
        type_key: &str,
        args: RequestArgs,
        emit_created: bool,
    ) -> TransactionResult<RequestId> {
        let Some(entry) = self.registry.get(type_key) else {
            let err = TransactionError::UnregisteredType(type_key.to_owned());
            log::error!(target: "transaction", "{err}");
            return Err(err);
        };
        let request = entry.instantiate(args).map_err(|e| {
            log::warn!(target: "transaction", "Failed to instantiate \"{type_key}\": {e}");
            TransactionError::from(e)
        })?;
        self.activate_record(Some(type_key.to_owned()), request, emit_created)
    }

    /// Like [`create_request`](Self::create_request) with an ad-hoc factory.
    pub fn create_request_with<F>(
        &mut self,
        factory: F,
        args: RequestArgs,
        emit_created: bool,
    ) -> TransactionResult<RequestId>
    where
        F: FnOnce(RequestArgs) -> RequestResult<Box<dyn Request>>,
    {
        let request = factory(args).map_err(|e| {
            log::warn!(target: "transaction", "Failed to instantiate request: {e}");
            TransactionError::from(e)
        })?;
        self.activate_record(None, request, emit_created)
    }

    /// Takes ownership of `request` and activates it (`Created → Active`).
    ///
    /// A request whose `activate` fails is dropped.
    pub fn activate_request(&mut self, request: Box<dyn Request>) -> TransactionResult<RequestId> {
        self.activate_record(None, request, false)
    }

    fn activate_record(
        &mut self,
        type_key: Option<String>,
        request: Box<dyn Request>,
        emit_created: bool,
    ) -> TransactionResult<RequestId> {
        let id = self.alloc_request_id();
        let session = self.active_session();
        let mut record = RequestRecord::new(id, type_key, request, session);
        if let Err(e) = record.request.activate() {
            log::warn!(
                target: "transaction",
                "Request {id} \"{}\" failed to activate: {e}",
                record.description()
            );
            return Err(e.into());
        }
        record.state = RequestState::Active;
        log::trace!(
            target: "transaction",
            "Request {id} \"{}\" active in session {session}",
            record.description()
        );

        let info = emit_created.then(|| record.info());
        self.top_mut().active_request = Some(id);
        self.active.insert(id, record);
        if let Some(info) = info {
            self.emit_request(SignalKind::Created, info);
        }
        Ok(id)
    }

    /// Commits an active request (`Active → Committed`).
    ///
    /// Reversible requests are recorded into the active session, or straight
    /// into the default session with `skip_session_commit`.
    pub fn commit(&mut self, id: RequestId, skip_session_commit: bool) -> bool {
        report(
            "commit",
            self.try_commit(id, skip_session_commit).map(|()| true),
        )
    }

    pub fn try_commit(&mut self, id: RequestId, skip_session_commit: bool) -> TransactionResult<()> {
        self.check_ready()?;
        let mut record = self.take_active(id, "commit")?;
        let before = self.undo_redo_state();

        self.emit_request(SignalKind::Committing, record.info());
        if let Err(e) = record.request.commit() {
            self.active.insert(id, record);
            return Err(e.into());
        }

        let session = self.commit_target(skip_session_commit);
        self.complete_commit(record, session);
        self.notify_if_changed(before);
        Ok(())
    }

    /// Aborts an active request (`Active → Aborted`).
    pub fn abort(&mut self, id: RequestId) -> bool {
        report("abort", self.try_abort(id).map(|()| true))
    }

    pub fn try_abort(&mut self, id: RequestId) -> TransactionResult<()> {
        self.check_ready()?;
        let mut record = self.take_active(id, "abort")?;

        self.emit_request(SignalKind::Aborting, record.info());
        if let Err(e) = record.request.abort() {
            log::warn!(
                target: "transaction",
                "Request {id} \"{}\" did not abort cleanly: {e}",
                record.description()
            );
        }
        record.state = RequestState::Aborted;
        self.clear_active_request(id);
        self.emit_request(SignalKind::Aborted, record.info());
        Ok(())
    }

    /// Commits through the request's `commit_async`, holding the busy latch
    /// while the future runs.
    pub async fn commit_async(&mut self, id: RequestId, skip_session_commit: bool) -> bool {
        let pending = match self.begin_commit_async(id, skip_session_commit) {
            Ok(pending) => pending,
            Err(e) => return report("commit_async", Err(e)),
        };
        let outcome = pending.run().await;
        self.finish_commit_async(outcome)
    }

    /// First half of an asynchronous commit: emits `committing`, takes the
    /// request out of the manager and acquires the busy latch.
    pub fn begin_commit_async(
        &mut self,
        id: RequestId,
        skip_session_commit: bool,
    ) -> TransactionResult<PendingCommit> {
        self.check_ready()?;
        let record = self.take_active(id, "commit")?;
        let session = self.commit_target(skip_session_commit);

        self.emit_request(SignalKind::Committing, record.info());
        let guard = self.busy.acquire(id);
        log::debug!(
            target: "transaction",
            "Asynchronous commit of request {id} started, recording into session {session}"
        );
        Ok(PendingCommit::new(record, session, guard))
    }

    /// Second half of an asynchronous commit. Releases the latch, then
    /// records the request or puts it back as active if its commit failed.
    pub fn finish_commit_async(&mut self, outcome: CommitOutcome) -> bool {
        let (record, session, result, guard) = outcome.into_parts();
        guard.finish();
        let id = record.id();

        if let Err(e) = result {
            log::error!(
                target: "transaction",
                "Request {id} \"{}\" failed to commit: {e}",
                record.description()
            );
            self.active.insert(id, record);
            return false;
        }

        let before = self.undo_redo_state();
        self.complete_commit(record, session);
        self.notify_if_changed(before);
        true
    }

    /// Whether an asynchronous commit holds the busy latch.
    pub fn is_busy(&self) -> bool {
        self.busy.is_held()
    }

    fn commit_target(&self, skip_session_commit: bool) -> SessionId {
        if skip_session_commit {
            SessionId::DEFAULT
        } else {
            self.active_session()
        }
    }

    fn complete_commit(&mut self, mut record: RequestRecord, session: SessionId) {
        record.state = RequestState::Committed;
        let info = record.info();
        self.clear_active_request(record.id());

        // The initiating session may have been cleared away meanwhile.
        let index = self
            .session_index(session)
            .unwrap_or(self.sessions.len() - 1);
        record.session = self.sessions[index].id();
        self.record_into(index, record);
        self.emit_request(SignalKind::Committed, info);
    }

    fn record_into(&mut self, index: usize, mut record: RequestRecord) {
        if !record.is_reversible() {
            log::debug!(
                target: "transaction",
                "Request {} \"{}\" is not reversible, not recorded",
                record.id(),
                record.description()
            );
            return;
        }
        let session = &mut self.sessions[index];
        log::debug!(
            target: "transaction",
            "Recording request {} \"{}\" into session {}",
            record.id(),
            record.description(),
            session.id()
        );
        session.history_mut().push(record);
    }

    fn take_active(&mut self, id: RequestId, operation: &'static str) -> TransactionResult<RequestRecord> {
        if let Some(record) = self.active.remove(&id) {
            return Ok(record);
        }
        match self.request_state(id) {
            Some(state) => Err(TransactionError::InvalidStateTransition {
                request: id,
                state,
                operation,
            }),
            None => Err(TransactionError::UnknownRequest(id)),
        }
    }

    fn clear_active_request(&mut self, id: RequestId) {
        for session in &mut self.sessions {
            if session.active_request == Some(id) {
                session.active_request = None;
            }
        }
    }

    /// Current state of a live request, wherever it is held.
    pub fn request_state(&self, id: RequestId) -> Option<RequestState> {
        if let Some(record) = self.active.get(&id) {
            return Some(record.state());
        }
        if self.busy.holder() == Some(id) {
            return Some(RequestState::Active);
        }
        self.sessions
            .iter()
            .find_map(|session| session.history().find_state(id))
    }

    /// The active session's most recently activated request, if still active.
    pub fn active_request(&self) -> Option<RequestInfo> {
        let id = self.top().active_request?;
        self.active.get(&id).map(RequestRecord::info)
    }

    // ------------------------------------------------------------------
    // Undo / redo
    // ------------------------------------------------------------------

    pub fn can_undo(&self) -> bool {
        self.enabled && !self.undo_redo_blocked && self.undo_redo_session().history().can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.enabled && !self.undo_redo_blocked && self.undo_redo_session().history().can_redo()
    }

    /// Reverses the newest entry of the undo-redo session.
    ///
    /// Sessions stacked above the undo-redo session are discarded first.
    pub fn undo(&mut self) -> bool {
        report("undo", self.try_undo())
    }

    /// Like [`undo`](Self::undo); `Ok(false)` when there is nothing to undo.
    pub fn try_undo(&mut self) -> TransactionResult<bool> {
        self.check_ready()?;
        if !self.can_undo() {
            log::debug!(target: "transaction", "Nothing to undo");
            return Ok(false);
        }
        let before = self.undo_redo_state();
        self.discard_sessions_above_undo_redo();

        let index = self.sessions.len() - 1;
        let Some(mut record) = self.sessions[index].history_mut().pop_undo() else {
            return Ok(false);
        };
        self.emit_request(SignalKind::Undoing, record.info());
        if let Err(e) = record.undo() {
            self.sessions[index].history_mut().restore_undo(record);
            self.notify_if_changed(before);
            return Err(e.into());
        }
        let info = record.info();
        self.sessions[index].history_mut().push_redo(record);
        self.emit_request(SignalKind::Undone, info);
        self.notify_if_changed(before);
        Ok(true)
    }

    /// Re-applies the newest redo entry of the undo-redo session.
    pub fn redo(&mut self) -> bool {
        report("redo", self.try_redo())
    }

    /// Like [`redo`](Self::redo); `Ok(false)` when there is nothing to redo.
    pub fn try_redo(&mut self) -> TransactionResult<bool> {
        self.check_ready()?;
        if !self.can_redo() {
            log::debug!(target: "transaction", "Nothing to redo");
            return Ok(false);
        }
        let before = self.undo_redo_state();
        self.discard_sessions_above_undo_redo();

        let index = self.sessions.len() - 1;
        let Some(mut record) = self.sessions[index].history_mut().pop_redo() else {
            return Ok(false);
        };
        self.emit_request(SignalKind::Redoing, record.info());
        if let Err(e) = record.redo() {
            self.sessions[index].history_mut().push_redo(record);
            self.notify_if_changed(before);
            return Err(e.into());
        }
        let info = record.info();
        self.sessions[index].history_mut().restore_undo(record);
        self.emit_request(SignalKind::Redone, info);
        self.notify_if_changed(before);
        Ok(true)
    }

    pub fn block_undo_redo(&mut self) {
        self.set_undo_redo_blocked(true);
    }

    pub fn unblock_undo_redo(&mut self) {
        self.set_undo_redo_blocked(false);
    }

    pub fn is_undo_redo_blocked(&self) -> bool {
        self.undo_redo_blocked
    }

    fn set_undo_redo_blocked(&mut self, blocked: bool) {
        let before = self.undo_redo_state();
        self.undo_redo_blocked = blocked;
        self.notify_if_changed(before);
    }

    /// Topmost session with undo/redo enabled. The default session always is.
    fn undo_redo_index(&self) -> usize {
        self.sessions
            .iter()
            .rposition(Session::undo_redo_enabled)
            .unwrap_or(0)
    }

    fn undo_redo_session(&self) -> &Session {
        &self.sessions[self.undo_redo_index()]
    }

    fn discard_sessions_above_undo_redo(&mut self) {
        let keep = self.undo_redo_index() + 1;
        for session in self.sessions.drain(keep..) {
            log::warn!(
                target: "transaction",
                "Discarding session {} \"{}\" with {} entries before undo/redo",
                session.id(),
                session.description(),
                session.history().undo_count()
            );
        }
    }

    fn undo_redo_state(&self) -> (bool, bool) {
        (self.can_undo(), self.can_redo())
    }

    fn notify_if_changed(&mut self, before: (bool, bool)) {
        if self.undo_redo_state() != before {
            self.emit(SignalKind::UndoRedoStateChanged, SignalData::Empty);
        }
    }

    /// History of each session from the default session upward, at most
    /// `max_depth` levels.
    pub fn request_stack(&self, max_depth: Option<usize>) -> Vec<HistorySnapshot> {
        self.sessions
            .iter()
            .take(max_depth.unwrap_or(usize::MAX))
            .map(|session| HistorySnapshot {
                session: session.id(),
                description: session.description().to_owned(),
                undo: session.history().undo_infos(),
                redo: session.history().redo_infos(),
            })
            .collect()
    }

    /// Newest entry of the default session's history.
    pub fn latest_committed_request(&self) -> Option<RequestInfo> {
        self.sessions[0].history().peek_undo().map(RequestRecord::info)
    }

    /// Newest entry of the active session's history.
    pub fn latest_committed_session_request(&self) -> Option<RequestInfo> {
        self.top().history().peek_undo().map(RequestRecord::info)
    }

    // ------------------------------------------------------------------
    // Sessions
    // ------------------------------------------------------------------

    /// Pushes a new session on top of the stack.
    ///
    /// The session keeps every entry unless `options` caps it. The bound of
    /// the default session applies once its entries land there.
    ///
    /// Returns a detached control while the manager is disabled or busy.
    pub fn start_session(&mut self, options: SessionOptions) -> SessionControl {
        if let Err(e) = self.check_ready() {
            report("start_session", Err(e));
            return SessionControl::detached();
        }
        let before = self.undo_redo_state();
        let id = SessionId::from_raw(self.next_session_id);
        self.next_session_id += 1;
        let composite_id = self.alloc_request_id();

        // Only the default session is bounded by the manager config.
        let session = Session::new(id, options, usize::MAX, composite_id);
        log::debug!(
            target: "transaction",
            "Session {id} \"{}\" started at depth {}",
            session.description(),
            self.sessions.len()
        );
        self.sessions.push(session);
        self.notify_if_changed(before);
        SessionControl::attached(id)
    }

    /// Closes the topmost session, merging its history into one request in
    /// the parent or moving the entries over one by one.
    pub fn commit_session(&mut self, session: SessionId, options: CommitOptions) -> bool {
        report(
            "commit_session",
            self.try_commit_session(session, options).map(|()| true),
        )
    }

    pub fn try_commit_session(
        &mut self,
        session: SessionId,
        options: CommitOptions,
    ) -> TransactionResult<()> {
        self.check_ready()?;
        let before = self.undo_redo_state();
        let mut closed = self.pop_session(session)?;
        let parent = self.sessions.len() - 1;

        if options.merge_request {
            self.record_merged(&mut closed, parent);
        } else {
            let entries = closed.take_entries();
            let parent_id = self.sessions[parent].id();
            log::debug!(
                target: "transaction",
                "Session {session} committed unmerged, moving {} entries into session {parent_id}",
                entries.len()
            );
            for record in entries {
                self.record_moved(record, parent);
            }
        }
        self.notify_if_changed(before);
        Ok(())
    }

    fn record_merged(&mut self, closed: &mut Session, parent: usize) {
        let Some(merged) = closed.take_merged() else {
            log::debug!(
                target: "transaction",
                "Session {} committed with nothing to record",
                closed.id()
            );
            return;
        };
        let mut record = RequestRecord::new(
            closed.composite_id(),
            None,
            Box::new(merged),
            self.sessions[parent].id(),
        );
        record.state = RequestState::Active;
        self.emit_request(SignalKind::Committing, record.info());

        // Members were applied when they were committed inside the session.
        record.state = RequestState::Committed;
        let info = record.info();
        self.record_into(parent, record);
        self.emit_request(SignalKind::Committed, info);
    }

    /// Records an entry of an unmerged session into `parent` like a fresh
    /// commit. Its effects are already applied.
    fn record_moved(&mut self, mut record: RequestRecord, parent: usize) {
        record.session = self.sessions[parent].id();
        record.state = RequestState::Active;
        self.emit_request(SignalKind::Committing, record.info());

        record.state = RequestState::Committed;
        let info = record.info();
        self.record_into(parent, record);
        self.emit_request(SignalKind::Committed, info);
    }

    /// Closes the topmost session and drops its entries without undoing them.
    pub fn abort_session(&mut self, session: SessionId) -> bool {
        report(
            "abort_session",
            self.try_abort_session(session).map(|()| true),
        )
    }

    pub fn try_abort_session(&mut self, session: SessionId) -> TransactionResult<()> {
        self.check_ready()?;
        let before = self.undo_redo_state();
        let closed = self.pop_session(session)?;
        log::info!(
            target: "transaction",
            "Session {session} \"{}\" aborted, {} entries dropped without undo",
            closed.description(),
            closed.history().undo_count()
        );
        self.notify_if_changed(before);
        Ok(())
    }

    /// Commits the topmost session merged if it recorded anything, otherwise
    /// discards it.
    pub fn end_session(&mut self, session: SessionId) -> bool {
        report("end_session", self.try_end_session(session).map(|()| true))
    }

    pub fn try_end_session(&mut self, session: SessionId) -> TransactionResult<()> {
        self.check_ready()?;
        if self.active_session() == session && self.top().history().can_undo() {
            self.try_commit_session(session, CommitOptions::merged())
        } else {
            self.try_abort_session(session)
        }
    }

    /// Preview of the merged request `session` would commit to.
    ///
    /// `None` unless `session` is the active, non-default session.
    pub fn session_to_request(&self, session: SessionId) -> Option<RequestInfo> {
        let top = self.top();
        if top.id() != session || session.is_default() {
            return None;
        }
        top.preview()
    }

    /// Number of open sessions, the default one included.
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Id of the topmost session.
    pub fn active_session(&self) -> SessionId {
        self.top().id()
    }

    pub fn session(&self, session: SessionId) -> Option<&Session> {
        self.sessions.iter().find(|s| s.id() == session)
    }

    fn pop_session(&mut self, session: SessionId) -> TransactionResult<Session> {
        if session.is_default() {
            return Err(TransactionError::DefaultSession);
        }
        if self.active_session() != session {
            return Err(TransactionError::NotTopmostSession(session));
        }
        self.sessions
            .pop()
            .ok_or(TransactionError::NotTopmostSession(session))
    }

    fn session_index(&self, session: SessionId) -> Option<usize> {
        self.sessions.iter().position(|s| s.id() == session)
    }

    fn top(&self) -> &Session {
        &self.sessions[self.sessions.len() - 1]
    }

    fn top_mut(&mut self) -> &mut Session {
        let last = self.sessions.len() - 1;
        &mut self.sessions[last]
    }

    fn default_session(&mut self) -> Session {
        let composite_id = self.alloc_request_id();
        Session::new(
            SessionId::DEFAULT,
            SessionOptions::new().with_description(DEFAULT_SESSION_DESCRIPTION),
            self.config.max_undo_step,
            composite_id,
        )
    }

    // ------------------------------------------------------------------
    // Transactions
    // ------------------------------------------------------------------

    /// Runs `f` inside an implicit session.
    ///
    /// On `Ok` the session is committed merged under `description`. On `Err`
    /// every entry recorded by `f` is undone in reverse order and the session
    /// is discarded. Returns `Ok(false)` without calling `f` while the
    /// manager is suppressed or disabled.
    pub fn transact<F>(&mut self, description: impl Into<String>, f: F) -> TransactionResult<bool>
    where
        F: FnOnce(&mut Self) -> TransactionResult<()>,
    {
        if self.gate.is_suppressed() || !self.enabled {
            log::debug!(target: "transaction", "Transaction skipped");
            return Ok(false);
        }
        if self.is_busy() {
            return Err(TransactionError::Busy);
        }
        let control = self.start_session(SessionOptions::new().with_description(description));
        if !control.is_attached() {
            return Ok(false);
        }
        let session = control.id();

        match f(self) {
            Ok(()) => {
                self.end_sessions_above(session);
                self.try_commit_session(session, CommitOptions::merged())?;
                Ok(true)
            }
            Err(e) => {
                log::warn!(
                    target: "transaction",
                    "Transaction in session {session} failed, rolling back: {e}"
                );
                self.rollback_from(session);
                Err(e)
            }
        }
    }

    fn end_sessions_above(&mut self, session: SessionId) {
        while self.session_index(session).is_some() {
            let top = self.active_session();
            if top == session {
                break;
            }
            log::warn!(
                target: "transaction",
                "Session {top} left open inside a transaction, ending it"
            );
            if let Err(e) = self.try_end_session(top) {
                log::warn!(target: "transaction", "Could not end session {top}: {e}");
                break;
            }
        }
    }

    /// Undoes and drops `session` and every session above it.
    fn rollback_from(&mut self, session: SessionId) {
        let Some(index) = self.session_index(session).filter(|&index| index > 0) else {
            return;
        };
        let before = self.undo_redo_state();
        let closed: Vec<Session> = self.sessions.drain(index..).collect();
        for mut closed in closed.into_iter().rev() {
            while let Some(mut record) = closed.history_mut().pop_undo() {
                self.emit_request(SignalKind::Undoing, record.info());
                match record.undo() {
                    Ok(()) => self.emit_request(SignalKind::Undone, record.info()),
                    Err(e) => {
                        log::error!(
                            target: "transaction",
                            "Rollback of request {} \"{}\" failed: {e}",
                            record.id(),
                            record.description()
                        );
                    }
                }
            }
        }
        self.notify_if_changed(before);
    }

    // ------------------------------------------------------------------
    // Clearing
    // ------------------------------------------------------------------

    /// Drops every session but a fresh default one, all active requests and
    /// the blocked-signal queue.
    pub fn clear(&mut self, dispatch_signal: bool) {
        let dropped = self.active.len();
        self.sessions.clear();
        let default = self.default_session();
        self.sessions.push(default);
        self.active.clear();
        self.gate.discard_queue();
        log::info!(
            target: "transaction",
            "Transaction history cleared, {dropped} active requests dropped"
        );
        if dispatch_signal {
            self.emit(SignalKind::UndoRedoStateChanged, SignalData::Empty);
        }
    }

    /// Clears the undo-redo session's history only.
    pub fn reset(&mut self) {
        let index = self.undo_redo_index();
        self.sessions[index].history_mut().clear();
        log::debug!(
            target: "transaction",
            "History of session {} reset",
            self.sessions[index].id()
        );
        self.emit(SignalKind::UndoRedoStateChanged, SignalData::Empty);
    }

    // ------------------------------------------------------------------
    // Signals
    // ------------------------------------------------------------------

    pub fn signals(&self) -> &ManagerSignals {
        &self.signals
    }

    /// Queues signals until [`clear_blocked_signals`](Self::clear_blocked_signals).
    pub fn start_block_signals(&mut self) {
        self.gate.start_blocking();
    }

    /// Stops queueing; already queued signals stay queued.
    pub fn stop_block_signals(&mut self) {
        self.gate.stop_blocking();
    }

    pub fn is_blocking_signals(&self) -> bool {
        self.gate.is_blocking()
    }

    pub fn block_signal(&mut self, kind: SignalKind, data: SignalData) -> bool {
        self.gate.block(kind, data)
    }

    /// Replays queued signals in order. Returns how many were dispatched.
    pub fn clear_blocked_signals(&mut self) -> usize {
        let queued = self.gate.queued_count();
        let dispatched = self.gate.flush(&self.signals);
        log::debug!(
            target: "transaction",
            "Replayed {dispatched} of {queued} blocked signals"
        );
        dispatched
    }

    pub fn blocked_signal_count(&self) -> usize {
        self.gate.queued_count()
    }

    /// While suppressed nothing is dispatched or queued.
    pub fn set_suppressed(&mut self, suppressed: bool) {
        self.gate.set_suppressed(suppressed);
    }

    pub fn is_suppressed(&self) -> bool {
        self.gate.is_suppressed()
    }

    /// Installs a predicate consulted before every dispatch.
    pub fn set_signal_dispatch_condition<F>(&mut self, condition: F)
    where
        F: FnMut(SignalKind, &SignalData) -> bool + Send + 'static,
    {
        self.gate.set_condition(Some(Box::new(condition)));
    }

    pub fn clear_signal_dispatch_condition(&mut self) {
        self.gate.set_condition(None);
    }

    /// Evaluates the dispatch condition for one signal.
    pub fn signal_dispatch_condition(&mut self, kind: SignalKind, data: &SignalData) -> bool {
        self.gate.allows(kind, data)
    }

    fn emit(&mut self, kind: SignalKind, data: SignalData) {
        self.gate.emit(&self.signals, kind, data);
    }

    fn emit_request(&mut self, kind: SignalKind, info: RequestInfo) {
        self.emit(kind, SignalData::Request(info));
    }

    fn check_ready(&self) -> TransactionResult<()> {
        if !self.enabled {
            return Err(TransactionError::Disabled);
        }
        if self.busy.is_held() {
            return Err(TransactionError::Busy);
        }
        Ok(())
    }

    fn alloc_request_id(&mut self) -> RequestId {
        let id = RequestId::from_raw(self.next_request_id);
        self.next_request_id += 1;
        id
    }
}

impl Default for TransactionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for TransactionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionManager")
            .field("enabled", &self.enabled)
            .field("undo_redo_blocked", &self.undo_redo_blocked)
            .field("registered_types", &self.registry.len())
            .field("sessions", &self.sessions.len())
            .field("active_requests", &self.active.len())
            .field("busy", &self.busy)
            .field("gate", &self.gate)
            .finish()
    }
}

/// Logs a rejected operation and folds the result into a flag.
fn report(operation: &str, result: TransactionResult<bool>) -> bool {
    match result {
        Ok(done) => done,
        Err(TransactionError::Disabled) => {
            log::debug!(target: "transaction", "{operation} ignored: manager is disabled");
            false
        }
        Err(e @ TransactionError::Request(_)) => {
            log::error!(target: "transaction", "{operation} failed: {e}");
            false
        }
        Err(e) => {
            log::warn!(target: "transaction", "{operation} ignored: {e}");
            false
        }
    }
}
