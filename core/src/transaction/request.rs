//! Requests: the opaque units of editor work sequenced by the manager.
//!
//! - [`Request`]: core capability (activate / commit / abort)
//! - [`Reversible`]: optional undo / redo capability
//! - [`RequestState`]: lifecycle state tracked by the manager
//! - [`RequestInfo`]: read-only snapshot used by signals and introspection
//! - [`FnRequest`]: closure-backed request for callers without a dedicated type
//!
//! Requests are self-contained: each implementation stores whatever data it
//! needs to apply and reverse its edit (entity ids, old/new values, etc.).

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::pin::Pin;

use super::error::{RequestError, RequestResult};

/// Helper trait for downcasting request trait objects to concrete types.
///
/// Automatically implemented for all `'static` types.
pub trait AsAny: 'static {
    /// Returns a reference to `self` as `&dyn Any` for downcasting.
    fn as_any(&self) -> &dyn Any;
}

impl<T: 'static> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Identifier the manager assigns to every request it tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RequestId(u64);

impl RequestId {
    /// Wraps a raw id value.
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw id value.
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Lifecycle state of a request.
///
/// ```text
/// Created ──activate──► Active ──commit──► Committed ◄──redo── Undone
///                          │                   └──────undo──────►
///                          └──abort──► Aborted
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestState {
    Created,
    Active,
    Committed,
    Aborted,
    Undone,
}

impl fmt::Display for RequestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Created => "created",
            Self::Active => "active",
            Self::Committed => "committed",
            Self::Aborted => "aborted",
            Self::Undone => "undone",
        };
        f.write_str(name)
    }
}

/// Boxed future returned by [`Request::commit_async`].
pub type CommitFuture<'a> = Pin<Box<dyn Future<Output = RequestResult> + Send + 'a>>;

/// Undo / redo capability of a request.
pub trait Reversible {
    /// Reverses the committed effect.
    fn undo(&mut self) -> RequestResult;

    /// Re-applies the effect after an [`undo`](Self::undo).
    fn redo(&mut self) -> RequestResult;
}

/// A unit of editor work (Command pattern).
///
/// The manager never inspects a request beyond this contract. Requests
/// that can be reversed expose it through [`as_reversible`](Self::as_reversible);
/// only those are recorded in the undo/redo history.
///
/// # Example
///
/// ```ignore
/// #[derive(Debug)]
/// struct MoveShape {
///     doc: Arc<Mutex<Document>>,
///     dx: f64,
///     dy: f64,
/// }
///
/// impl Request for MoveShape {
///     fn commit(&mut self) -> RequestResult {
///         self.doc.lock().translate(self.dx, self.dy);
///         Ok(())
///     }
///
///     fn description(&self) -> &str {
///         "Move shape"
///     }
///
///     fn as_reversible(&mut self) -> Option<&mut dyn Reversible> {
///         Some(self)
///     }
/// }
///
/// impl Reversible for MoveShape {
///     fn undo(&mut self) -> RequestResult {
///         self.doc.lock().translate(-self.dx, -self.dy);
///         Ok(())
///     }
///
///     fn redo(&mut self) -> RequestResult {
///         self.commit()
///     }
/// }
/// ```
pub trait Request: fmt::Debug + AsAny + Send {
    /// Called once when the manager takes ownership of the request.
    fn activate(&mut self) -> RequestResult {
        Ok(())
    }

    /// Finalizes the edit.
    fn commit(&mut self) -> RequestResult;

    /// Asynchronous commit. Defaults to the synchronous [`commit`](Self::commit).
    fn commit_async(&mut self) -> CommitFuture<'_> {
        let result = self.commit();
        Box::pin(std::future::ready(result))
    }

    /// Discards the edit while the request is still active.
    fn abort(&mut self) -> RequestResult {
        Ok(())
    }

    /// A short, human-readable description for history listings.
    fn description(&self) -> &str;

    /// Returns the undo/redo capability if the request has one.
    ///
    /// Default: `None` (committed but never recorded in history).
    fn as_reversible(&mut self) -> Option<&mut dyn Reversible> {
        None
    }
}

/// Read-only snapshot of a tracked request.
///
/// Carried by every lifecycle signal and returned by the introspection
/// queries; holding one never gives access to the request itself.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestInfo {
    pub id: RequestId,
    pub type_key: Option<String>,
    pub description: String,
    pub state: RequestState,
    /// Members of a merged session request, in commit order.
    pub members: Vec<RequestInfo>,
}

type Callback = Box<dyn FnMut() -> RequestResult + Send>;

/// A request assembled from closures.
///
/// The request is reversible once an undo callback is set. Redo runs the
/// redo callback if present, otherwise the commit callback again.
///
/// ```ignore
/// let doc = Arc::clone(&shared);
/// let undo_doc = Arc::clone(&shared);
/// let request = FnRequest::new("Rename")
///     .on_commit(move || { doc.lock().name = "B".into(); Ok(()) })
///     .on_undo(move || { undo_doc.lock().name = "A".into(); Ok(()) });
/// manager.activate_request(Box::new(request))?;
/// ```
pub struct FnRequest {
    description: String,
    on_activate: Option<Callback>,
    on_commit: Option<Callback>,
    on_abort: Option<Callback>,
    on_undo: Option<Callback>,
    on_redo: Option<Callback>,
}

impl FnRequest {
    /// Creates a request that does nothing until callbacks are attached.
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            on_activate: None,
            on_commit: None,
            on_abort: None,
            on_undo: None,
            on_redo: None,
        }
    }

    pub fn on_activate<F>(mut self, f: F) -> Self
    where
        F: FnMut() -> RequestResult + Send + 'static,
    {
        self.on_activate = Some(Box::new(f));
        self
    }

    pub fn on_commit<F>(mut self, f: F) -> Self
    where
        F: FnMut() -> RequestResult + Send + 'static,
    {
        self.on_commit = Some(Box::new(f));
        self
    }

    pub fn on_abort<F>(mut self, f: F) -> Self
    where
        F: FnMut() -> RequestResult + Send + 'static,
    {
        self.on_abort = Some(Box::new(f));
        self
    }

    pub fn on_undo<F>(mut self, f: F) -> Self
    where
        F: FnMut() -> RequestResult + Send + 'static,
    {
        self.on_undo = Some(Box::new(f));
        self
    }

    pub fn on_redo<F>(mut self, f: F) -> Self
    where
        F: FnMut() -> RequestResult + Send + 'static,
    {
        self.on_redo = Some(Box::new(f));
        self
    }
}

fn run(callback: &mut Option<Callback>) -> RequestResult {
    match callback {
        Some(f) => f(),
        None => Ok(()),
    }
}

impl fmt::Debug for FnRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnRequest")
            .field("description", &self.description)
            .field("reversible", &self.on_undo.is_some())
            .finish()
    }
}

impl Request for FnRequest {
    fn activate(&mut self) -> RequestResult {
        run(&mut self.on_activate)
    }

    fn commit(&mut self) -> RequestResult {
        run(&mut self.on_commit)
    }

    fn abort(&mut self) -> RequestResult {
        run(&mut self.on_abort)
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn as_reversible(&mut self) -> Option<&mut dyn Reversible> {
        if self.on_undo.is_some() {
            Some(self)
        } else {
            None
        }
    }
}

impl Reversible for FnRequest {
    fn undo(&mut self) -> RequestResult {
        match &mut self.on_undo {
            Some(f) => f(),
            None => Err(RequestError::NotReversible),
        }
    }

    fn redo(&mut self) -> RequestResult {
        if self.on_redo.is_some() {
            run(&mut self.on_redo)
        } else {
            run(&mut self.on_commit)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicI32, Ordering};

    fn counter_request(counter: &Arc<AtomicI32>, amount: i32) -> FnRequest {
        let commit = Arc::clone(counter);
        let undo = Arc::clone(counter);
        FnRequest::new("Add")
            .on_commit(move || {
                commit.fetch_add(amount, Ordering::SeqCst);
                Ok(())
            })
            .on_undo(move || {
                undo.fetch_sub(amount, Ordering::SeqCst);
                Ok(())
            })
    }

    #[test]
    fn state_display() {
        assert_eq!(RequestState::Active.to_string(), "active");
        assert_eq!(RequestState::Undone.to_string(), "undone");
    }

    #[test]
    fn id_display() {
        assert_eq!(RequestId::from_raw(3).to_string(), "#3");
        assert_eq!(RequestId::from_raw(3).raw(), 3);
    }

    #[test]
    fn fn_request_commit_undo_redo() {
        let counter = Arc::new(AtomicI32::new(0));
        let mut request = counter_request(&counter, 5);

        request.commit().unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 5);

        let reversible = request.as_reversible().unwrap();
        reversible.undo().unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 0);
        reversible.redo().unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn fn_request_without_undo_is_not_reversible() {
        let mut request = FnRequest::new("Select").on_commit(|| Ok(()));
        assert!(request.as_reversible().is_none());
        assert_eq!(
            Reversible::undo(&mut request),
            Err(RequestError::NotReversible)
        );
    }

    #[test]
    fn explicit_redo_callback_wins() {
        let counter = Arc::new(AtomicI32::new(0));
        let redo = Arc::clone(&counter);
        let mut request = counter_request(&counter, 1).on_redo(move || {
            redo.fetch_add(100, Ordering::SeqCst);
            Ok(())
        });
        request.as_reversible().unwrap().redo().unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 100);
    }

    #[test]
    fn default_commit_async_runs_commit() {
        let counter = Arc::new(AtomicI32::new(0));
        let mut request = counter_request(&counter, 2);
        pollster::block_on(request.commit_async()).unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn request_is_dyn_compatible() {
        let counter = Arc::new(AtomicI32::new(0));
        let mut boxed: Box<dyn Request> = Box::new(counter_request(&counter, 3));
        boxed.commit().unwrap();
        assert_eq!(boxed.description(), "Add");
        let request: &dyn Request = &*boxed;
        assert!(request.as_any().downcast_ref::<FnRequest>().is_some());
    }
}
