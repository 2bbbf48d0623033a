//! Sessions: nested batches of committed requests.
//!
//! A [`Session`] collects the requests committed while it is the active
//! (topmost) session. Closing it either merges the collected records into a
//! single [`MergedRequest`], moves them into the parent one by one, or
//! discards them. The manager owns the session stack; callers hold a
//! [`SessionControl`] bound to the session they opened.

use std::fmt;

use super::error::{RequestError, RequestResult, TransactionError, TransactionResult};
use super::history::{RequestRecord, UndoRedoStack};
use super::manager::TransactionManager;
use super::request::{Request, RequestId, RequestInfo, RequestState, Reversible};

/// Identifier of a session on the manager's session stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SessionId(u64);

impl SessionId {
    /// The default session, always at the bottom of the stack.
    pub const DEFAULT: SessionId = SessionId(0);

    pub(crate) const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u64 {
        self.0
    }

    pub fn is_default(self) -> bool {
        self == Self::DEFAULT
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Decides which committed records take part in a merged session request.
pub type RequestFilter = Box<dyn Fn(&RequestInfo) -> bool + Send>;

/// Options for [`TransactionManager::start_session`].
pub struct SessionOptions {
    /// History bound. Nested sessions are unbounded when `None`, so every
    /// entry survives until the session is merged, moved or rolled back.
    pub max_undo_step: Option<usize>,
    /// Whether `undo`/`redo` target this session while it is open.
    pub undo_redo_enabled: bool,
    /// Filter applied when the session is turned into a request.
    pub to_request_filter: Option<RequestFilter>,
    /// Description of the merged request.
    pub description: Option<String>,
}

impl SessionOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Caps this session's own history. Entries evicted while the session is
    /// open are not part of its merged request.
    pub fn with_max_undo_step(mut self, max_undo_step: usize) -> Self {
        self.max_undo_step = Some(max_undo_step);
        self
    }

    /// Keeps `undo`/`redo` on the enclosing session while this one is open.
    pub fn without_undo_redo(mut self) -> Self {
        self.undo_redo_enabled = false;
        self
    }

    pub fn with_filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(&RequestInfo) -> bool + Send + 'static,
    {
        self.to_request_filter = Some(Box::new(filter));
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            max_undo_step: None,
            undo_redo_enabled: true,
            to_request_filter: None,
            description: None,
        }
    }
}

impl fmt::Debug for SessionOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionOptions")
            .field("max_undo_step", &self.max_undo_step)
            .field("undo_redo_enabled", &self.undo_redo_enabled)
            .field("has_filter", &self.to_request_filter.is_some())
            .field("description", &self.description)
            .finish()
    }
}

/// Options for committing a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommitOptions {
    /// Merge the session into one request (default) instead of moving its
    /// records into the parent one by one.
    pub merge_request: bool,
}

impl CommitOptions {
    pub fn merged() -> Self {
        Self {
            merge_request: true,
        }
    }

    pub fn unmerged() -> Self {
        Self {
            merge_request: false,
        }
    }
}

impl Default for CommitOptions {
    fn default() -> Self {
        Self::merged()
    }
}

const DEFAULT_SESSION_DESCRIPTION: &str = "Session";

/// One level of the session stack.
pub struct Session {
    id: SessionId,
    description: String,
    undo_redo_enabled: bool,
    filter: Option<RequestFilter>,
    history: UndoRedoStack,
    /// Most recently activated request in this session.
    pub(crate) active_request: Option<RequestId>,
    /// Id the merged request receives if this session is committed merged.
    composite_id: RequestId,
}

impl Session {
    pub(crate) fn new(
        id: SessionId,
        options: SessionOptions,
        default_max_undo_step: usize,
        composite_id: RequestId,
    ) -> Self {
        Self {
            id,
            description: options
                .description
                .unwrap_or_else(|| DEFAULT_SESSION_DESCRIPTION.to_owned()),
            undo_redo_enabled: options.undo_redo_enabled,
            filter: options.to_request_filter,
            history: UndoRedoStack::new(options.max_undo_step.unwrap_or(default_max_undo_step)),
            active_request: None,
            composite_id,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn undo_redo_enabled(&self) -> bool {
        self.undo_redo_enabled
    }

    pub fn history(&self) -> &UndoRedoStack {
        &self.history
    }

    pub(crate) fn history_mut(&mut self) -> &mut UndoRedoStack {
        &mut self.history
    }

    pub fn composite_id(&self) -> RequestId {
        self.composite_id
    }

    fn accepts(&self, record: &RequestRecord) -> bool {
        match &self.filter {
            Some(filter) => filter(&record.info()),
            None => true,
        }
    }

    /// Preview of the merged request this session would produce.
    ///
    /// `None` when no committed record passes the filter.
    pub fn preview(&self) -> Option<RequestInfo> {
        let mut members: Vec<RequestInfo> = self
            .history
            .undo_infos()
            .into_iter()
            .rev()
            .collect::<Vec<_>>();
        if let Some(filter) = &self.filter {
            members.retain(|info| filter(info));
        }
        if members.is_empty() {
            return None;
        }
        Some(RequestInfo {
            id: self.composite_id,
            type_key: None,
            description: self.description.clone(),
            state: RequestState::Active,
            members,
        })
    }

    /// Removes the committed records that pass the filter, oldest first.
    ///
    /// Records rejected by the filter are dropped.
    pub(crate) fn take_entries(&mut self) -> Vec<RequestRecord> {
        let records = self.history.take_undo();
        let (kept, dropped): (Vec<_>, Vec<_>) =
            records.into_iter().partition(|record| self.accepts(record));
        if !dropped.is_empty() {
            log::debug!(
                target: "transaction",
                "Session {} filter dropped {} entries",
                self.id,
                dropped.len()
            );
        }
        kept
    }

    /// Turns the filtered records into one merged request.
    pub(crate) fn take_merged(&mut self) -> Option<MergedRequest> {
        let members = self.take_entries();
        if members.is_empty() {
            return None;
        }
        Some(MergedRequest {
            description: self.description.clone(),
            members,
        })
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("description", &self.description)
            .field("undo_redo_enabled", &self.undo_redo_enabled)
            .field("history", &self.history)
            .field("active_request", &self.active_request)
            .finish()
    }
}

/// Composite request produced by committing a session merged.
///
/// Undo runs the members' undo in reverse commit order, redo runs their
/// redo in commit order. A member failure rolls the already processed
/// members back so the composite stays all-or-nothing.
pub struct MergedRequest {
    description: String,
    members: Vec<RequestRecord>,
}

impl MergedRequest {
    pub fn members(&self) -> &[RequestRecord] {
        &self.members
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

impl fmt::Debug for MergedRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MergedRequest")
            .field("description", &self.description)
            .field("members", &self.members.len())
            .finish()
    }
}

impl Request for MergedRequest {
    // Members were committed individually while the session was open.
    fn commit(&mut self) -> RequestResult {
        Ok(())
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn as_reversible(&mut self) -> Option<&mut dyn Reversible> {
        Some(self)
    }
}

impl Reversible for MergedRequest {
    fn undo(&mut self) -> RequestResult {
        for i in (0..self.members.len()).rev() {
            if let Err(e) = self.members[i].undo() {
                for member in &mut self.members[i + 1..] {
                    if let Err(rollback) = member.redo() {
                        log_rollback_failure(member, &rollback);
                    }
                }
                return Err(e);
            }
        }
        Ok(())
    }

    fn redo(&mut self) -> RequestResult {
        for i in 0..self.members.len() {
            if let Err(e) = self.members[i].redo() {
                for member in self.members[..i].iter_mut().rev() {
                    if let Err(rollback) = member.undo() {
                        log_rollback_failure(member, &rollback);
                    }
                }
                return Err(e);
            }
        }
        Ok(())
    }
}

fn log_rollback_failure(member: &RequestRecord, error: &RequestError) {
    log::error!(
        target: "transaction",
        "Rollback of merged member {} \"{}\" failed: {error}",
        member.id(),
        member.description()
    );
}

/// Handle to a session opened with [`TransactionManager::start_session`].
///
/// A control is *detached* when the manager refused to open the session
/// (disabled or busy); every operation on it is then a no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionControl {
    session: SessionId,
    attached: bool,
}

impl SessionControl {
    pub(crate) fn attached(session: SessionId) -> Self {
        Self {
            session,
            attached: true,
        }
    }

    pub(crate) fn detached() -> Self {
        Self {
            session: SessionId::DEFAULT,
            attached: false,
        }
    }

    pub fn id(&self) -> SessionId {
        self.session
    }

    pub fn is_attached(&self) -> bool {
        self.attached
    }

    /// See [`TransactionManager::commit_session`].
    pub fn commit(&self, manager: &mut TransactionManager, options: CommitOptions) -> bool {
        self.attached && manager.commit_session(self.session, options)
    }

    /// See [`TransactionManager::abort_session`].
    pub fn abort(&self, manager: &mut TransactionManager) -> bool {
        self.attached && manager.abort_session(self.session)
    }

    /// See [`TransactionManager::end_session`].
    pub fn end(&self, manager: &mut TransactionManager) -> bool {
        self.attached && manager.end_session(self.session)
    }

    /// See [`TransactionManager::session_to_request`].
    pub fn to_request(&self, manager: &TransactionManager) -> Option<RequestInfo> {
        if !self.attached {
            return None;
        }
        manager.session_to_request(self.session)
    }

    /// Like [`commit`](Self::commit) but reports why nothing happened.
    pub fn try_commit(
        &self,
        manager: &mut TransactionManager,
        options: CommitOptions,
    ) -> TransactionResult<()> {
        if !self.attached {
            return Err(TransactionError::DetachedSession);
        }
        manager.try_commit_session(self.session, options)
    }
}
