//! Error types for requests and the transaction manager.

use thiserror::Error;

use super::request::{RequestId, RequestState};
use super::session::SessionId;

/// Error returned by a [`Request`](super::Request) capability.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RequestError {
    /// The request (or the state it edits) is not in a state that allows the call.
    #[error("invalid state: {0}")]
    InvalidState(String),
    /// Undo or redo was requested from a request without the reversible capability.
    #[error("request is not reversible")]
    NotReversible,
    /// A custom error with a description.
    #[error("{0}")]
    Custom(String),
}

/// Result type for request capabilities.
pub type RequestResult<T = ()> = Result<T, RequestError>;

/// Errors reported by the [`TransactionManager`](super::TransactionManager).
///
/// The `try_*` methods of the manager return these directly. Their `bool`
/// counterparts log the error and report `false` instead.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransactionError {
    /// No factory is registered under the given type key.
    #[error("request type \"{0}\" is not registered")]
    UnregisteredType(String),
    /// The request is not in the state the operation requires.
    #[error("cannot {operation} request {request}: it is {state}")]
    InvalidStateTransition {
        request: RequestId,
        state: RequestState,
        operation: &'static str,
    },
    /// The id does not refer to any live request.
    #[error("unknown request {0}")]
    UnknownRequest(RequestId),
    /// A session operation targeted a session that is not the active one.
    #[error("session {0} is not the topmost session")]
    NotTopmostSession(SessionId),
    /// The session control was handed out while the manager refused new sessions.
    #[error("session control is detached")]
    DetachedSession,
    /// A session operation targeted the default session.
    #[error("the default session cannot be closed")]
    DefaultSession,
    /// An asynchronous commit is in flight.
    #[error("an asynchronous commit is in progress")]
    Busy,
    /// The manager is disabled.
    #[error("transaction manager is disabled")]
    Disabled,
    /// A request capability failed.
    #[error("request failed: {0}")]
    Request(#[from] RequestError),
}

/// Result type for manager operations that surface errors.
pub type TransactionResult<T = ()> = Result<T, TransactionError>;
