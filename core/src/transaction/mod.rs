//! Transactional request manager with undo/redo.
//!
//! Editor code never mutates a document directly. It creates a *request*,
//! hands it to the [`TransactionManager`] and commits or aborts it. The
//! manager records reversible requests in a bounded history, groups them
//! into nested sessions and reports every lifecycle step through typed
//! signals.
//!
//! - [`Request`] / [`Reversible`]: a unit of work and its undo capability
//! - [`FnRequest`]: closure-backed request
//! - [`RequestRegistry`]: type key to factory mapping used by
//!   [`TransactionManager::create_request`]
//! - [`UndoRedoStack`]: bounded undo list plus redo list
//! - [`Session`] / [`SessionControl`]: nested batches, optionally merged
//!   into a single [`MergedRequest`]
//! - [`ManagerSignals`] / [`SignalGate`]: lifecycle notifications and the
//!   block / replay / veto / suppress layer in front of them
//! - [`PendingCommit`]: an asynchronous commit in flight
//!
//! # Sessions
//!
//! A session collects the requests committed while it is on top of the
//! stack. Committing it merged records one composite request in the parent,
//! so a drag made of many small moves is undone in one step. Aborting a
//! session drops its entries *without* undoing them.
//!
//! ```ignore
//! let drag = manager.start_session(SessionOptions::new().with_description("Drag"));
//! for step in steps {
//!     let id = manager.create_request("move", step, false)?;
//!     manager.commit(id, false);
//! }
//! drag.commit(&mut manager, CommitOptions::merged());
//! manager.undo(); // reverts the whole drag
//! ```

mod config;
mod error;
mod gate;
mod history;
mod manager;
mod pending;
mod registry;
mod request;
mod session;
mod signal;

pub use config::ManagerConfig;
pub use error::{RequestError, RequestResult, TransactionError, TransactionResult};
pub use gate::{
    BlockedSignal, DispatchCondition, ManagerSignals, SignalData, SignalGate, SignalKind,
};
pub use history::{DEFAULT_MAX_UNDO_STEP, HistorySnapshot, RequestRecord, UndoRedoStack};
pub use manager::TransactionManager;
pub use pending::{CommitOutcome, PendingCommit};
pub use registry::{
    ArgAdapter, ArgValue, RequestArgs, RequestFactory, RequestRegistry, RequestTypeEntry,
};
pub use request::{
    AsAny, CommitFuture, FnRequest, Request, RequestId, RequestInfo, RequestState, Reversible,
};
pub use session::{
    CommitOptions, MergedRequest, RequestFilter, Session, SessionControl, SessionId,
    SessionOptions,
};
pub use signal::{ListenerId, Signal};
