//! Undo/redo history.
//!
//! [`UndoRedoStack`] manages a linear undo/redo stack of committed
//! [`RequestRecord`]s. When a new record is pushed, the redo stack is
//! cleared (standard editor behavior).

use std::collections::VecDeque;
use std::fmt;

use super::error::{RequestError, RequestResult};
use super::request::{Request, RequestId, RequestInfo, RequestState};
use super::session::{MergedRequest, SessionId};

/// Default maximum number of undo steps.
pub const DEFAULT_MAX_UNDO_STEP: usize = 25;

/// A request plus the lifecycle bookkeeping the manager keeps for it.
pub struct RequestRecord {
    pub(crate) id: RequestId,
    pub(crate) type_key: Option<String>,
    pub(crate) request: Box<dyn Request>,
    pub(crate) state: RequestState,
    /// Session that was active when the request was activated.
    pub(crate) session: SessionId,
}

impl RequestRecord {
    pub(crate) fn new(
        id: RequestId,
        type_key: Option<String>,
        request: Box<dyn Request>,
        session: SessionId,
    ) -> Self {
        Self {
            id,
            type_key,
            request,
            state: RequestState::Created,
            session,
        }
    }

    pub fn id(&self) -> RequestId {
        self.id
    }

    pub fn state(&self) -> RequestState {
        self.state
    }

    pub fn session(&self) -> SessionId {
        self.session
    }

    pub fn description(&self) -> &str {
        self.request.description()
    }

    pub(crate) fn merged(&self) -> Option<&MergedRequest> {
        let request: &dyn Request = &*self.request;
        request.as_any().downcast_ref::<MergedRequest>()
    }

    /// Read-only snapshot of this record (and merged members, if any).
    pub fn info(&self) -> RequestInfo {
        RequestInfo {
            id: self.id,
            type_key: self.type_key.clone(),
            description: self.request.description().to_owned(),
            state: self.state,
            members: self
                .merged()
                .map(|merged| merged.members().iter().map(RequestRecord::info).collect())
                .unwrap_or_default(),
        }
    }

    pub(crate) fn is_reversible(&mut self) -> bool {
        self.request.as_reversible().is_some()
    }

    /// Reverses the record: `Committed → Undone`.
    pub(crate) fn undo(&mut self) -> RequestResult {
        self.request
            .as_reversible()
            .ok_or(RequestError::NotReversible)?
            .undo()?;
        self.state = RequestState::Undone;
        Ok(())
    }

    /// Re-applies the record: `Undone → Committed`.
    pub(crate) fn redo(&mut self) -> RequestResult {
        self.request
            .as_reversible()
            .ok_or(RequestError::NotReversible)?
            .redo()?;
        self.state = RequestState::Committed;
        Ok(())
    }

    /// State of `id` if it is this record or one of its merged members.
    pub(crate) fn find_state(&self, id: RequestId) -> Option<RequestState> {
        if self.id == id {
            return Some(self.state);
        }
        self.merged()?
            .members()
            .iter()
            .find_map(|member| member.find_state(id))
    }
}

impl fmt::Debug for RequestRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestRecord")
            .field("id", &self.id)
            .field("type_key", &self.type_key)
            .field("state", &self.state)
            .field("session", &self.session)
            .field("request", &self.request)
            .finish()
    }
}

/// Read-only view of one session's history, newest entries first.
#[derive(Debug, Clone, PartialEq)]
pub struct HistorySnapshot {
    pub session: SessionId,
    pub description: String,
    pub undo: Vec<RequestInfo>,
    pub redo: Vec<RequestInfo>,
}

/// Bounded undo/redo stack of committed records.
///
/// The undo stack is a [`VecDeque`]; when it exceeds `max_undo_step` the
/// oldest record is dropped from the front. The redo stack is a [`Vec`]
/// that can never grow larger than the undo stack was.
pub struct UndoRedoStack {
    undo_stack: VecDeque<RequestRecord>,
    redo_stack: Vec<RequestRecord>,
    max_undo_step: usize,
}

impl UndoRedoStack {
    pub fn new(max_undo_step: usize) -> Self {
        Self {
            undo_stack: VecDeque::new(),
            redo_stack: Vec::new(),
            max_undo_step,
        }
    }

    /// Pushes a newly committed record, clearing the redo stack.
    ///
    /// Returns the number of records evicted to honor `max_undo_step`.
    pub(crate) fn push(&mut self, record: RequestRecord) -> usize {
        if !self.redo_stack.is_empty() {
            log::debug!(
                target: "transaction",
                "Discarding {} redo entries",
                self.redo_stack.len()
            );
            self.redo_stack.clear();
        }
        self.undo_stack.push_back(record);
        self.enforce_limit()
    }

    fn enforce_limit(&mut self) -> usize {
        let mut evicted = 0;
        while self.undo_stack.len() > self.max_undo_step {
            if let Some(dropped) = self.undo_stack.pop_front() {
                log::debug!(
                    target: "transaction",
                    "Evicting request {} \"{}\" from history",
                    dropped.id,
                    dropped.description()
                );
            }
            evicted += 1;
        }
        evicted
    }

    pub(crate) fn pop_undo(&mut self) -> Option<RequestRecord> {
        self.undo_stack.pop_back()
    }

    pub(crate) fn pop_redo(&mut self) -> Option<RequestRecord> {
        self.redo_stack.pop()
    }

    /// Puts a record back on top of the undo stack without touching redo.
    ///
    /// Used after a successful redo and to restore a record whose undo failed.
    pub(crate) fn restore_undo(&mut self, record: RequestRecord) {
        self.undo_stack.push_back(record);
        self.enforce_limit();
    }

    /// Puts a record on top of the redo stack.
    pub(crate) fn push_redo(&mut self, record: RequestRecord) {
        self.redo_stack.push(record);
    }

    /// Removes and returns every undo record, oldest first. Redo is dropped.
    pub(crate) fn take_undo(&mut self) -> Vec<RequestRecord> {
        self.redo_stack.clear();
        self.undo_stack.drain(..).collect()
    }

    pub fn peek_undo(&self) -> Option<&RequestRecord> {
        self.undo_stack.back()
    }

    pub fn peek_redo(&self) -> Option<&RequestRecord> {
        self.redo_stack.last()
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn undo_count(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn redo_count(&self) -> usize {
        self.redo_stack.len()
    }

    pub fn max_undo_step(&self) -> usize {
        self.max_undo_step
    }

    /// Changes the bound, evicting immediately if the stack is over it.
    pub fn set_max_undo_step(&mut self, max_undo_step: usize) {
        self.max_undo_step = max_undo_step;
        self.enforce_limit();
    }

    /// Undo entries, most recent first.
    pub fn undo_infos(&self) -> Vec<RequestInfo> {
        self.undo_stack.iter().rev().map(RequestRecord::info).collect()
    }

    /// Redo entries, most recent first.
    pub fn redo_infos(&self) -> Vec<RequestInfo> {
        self.redo_stack.iter().rev().map(RequestRecord::info).collect()
    }

    pub(crate) fn find_state(&self, id: RequestId) -> Option<RequestState> {
        self.undo_stack
            .iter()
            .chain(self.redo_stack.iter())
            .find_map(|record| record.find_state(id))
    }

    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
    }
}

impl fmt::Debug for UndoRedoStack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UndoRedoStack")
            .field("undo_count", &self.undo_stack.len())
            .field("redo_count", &self.redo_stack.len())
            .field("max_undo_step", &self.max_undo_step)
            .finish()
    }
}
