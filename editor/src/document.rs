//! The edited document: a set of named points.
//!
//! Every change goes through a request registered with the transaction
//! manager, so each one is undoable:
//!
//! - `"move"`: `[name, x, y]` moves a point (`[x, y]` moves [`DEFAULT_POINT`])
//! - `"rename"`: `[from, to]` renames a point

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use lilium_core::transaction::{
    ArgValue, Request, RequestArgs, RequestError, RequestResult, RequestTypeEntry, Reversible,
    TransactionManager,
};
use parking_lot::Mutex;

use crate::project::PointConfig;

/// Point moved by `"move"` requests that do not name one.
pub const DEFAULT_POINT: &str = "origin";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Document shared between the editor and the requests that edit it.
pub type SharedDocument = Arc<Mutex<Document>>;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Document {
    points: BTreeMap<String, Point>,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a document from the project's `[[point]]` tables.
    ///
    /// An empty list yields a document holding only [`DEFAULT_POINT`].
    pub fn from_config(points: &[PointConfig]) -> Self {
        let mut document = Self::new();
        for point in points {
            document.set_point(&point.name, Point::new(point.x, point.y));
        }
        if document.points.is_empty() {
            document.set_point(DEFAULT_POINT, Point::new(0.0, 0.0));
        }
        document
    }

    pub fn shared(self) -> SharedDocument {
        Arc::new(Mutex::new(self))
    }

    pub fn point(&self, name: &str) -> Option<Point> {
        self.points.get(name).copied()
    }

    /// Sets a point, returning its previous position.
    pub fn set_point(&mut self, name: &str, point: Point) -> Option<Point> {
        self.points.insert(name.to_owned(), point)
    }

    pub fn rename(&mut self, from: &str, to: &str) -> RequestResult {
        if self.points.contains_key(to) {
            return Err(RequestError::InvalidState(format!(
                "a point named \"{to}\" already exists"
            )));
        }
        let point = self
            .points
            .remove(from)
            .ok_or_else(|| RequestError::InvalidState(format!("no point named \"{from}\"")))?;
        self.points.insert(to.to_owned(), point);
        Ok(())
    }

    pub fn points(&self) -> impl Iterator<Item = (&str, Point)> {
        self.points.iter().map(|(name, point)| (name.as_str(), *point))
    }
}

impl fmt::Display for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, point) in self.points() {
            writeln!(f, "  {name:<16} {point}")?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// Moves a named point to an absolute position.
#[derive(Debug)]
pub struct MoveRequest {
    document: SharedDocument,
    name: String,
    target: Point,
    previous: Option<Point>,
    description: String,
}

impl MoveRequest {
    pub fn new(document: &SharedDocument, name: impl Into<String>, target: Point) -> Self {
        let name = name.into();
        Self {
            description: format!("Move {name} to {target}"),
            document: Arc::clone(document),
            name,
            target,
            previous: None,
        }
    }

    fn from_args(document: &SharedDocument, args: &RequestArgs) -> RequestResult<Self> {
        let name = args
            .first()
            .and_then(ArgValue::as_str)
            .ok_or_else(|| RequestError::Custom("move: expected a point name".into()))?;
        let coord = |index: usize| {
            args.get(index)
                .and_then(ArgValue::as_f64)
                .ok_or_else(|| RequestError::Custom(format!("move: missing coordinate {index}")))
        };
        Ok(Self::new(document, name, Point::new(coord(1)?, coord(2)?)))
    }
}

impl Request for MoveRequest {
    fn activate(&mut self) -> RequestResult {
        match self.document.lock().point(&self.name) {
            Some(_) => Ok(()),
            None => Err(RequestError::InvalidState(format!(
                "no point named \"{}\"",
                self.name
            ))),
        }
    }

    fn commit(&mut self) -> RequestResult {
        self.previous = self.document.lock().set_point(&self.name, self.target);
        Ok(())
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn as_reversible(&mut self) -> Option<&mut dyn Reversible> {
        Some(self)
    }
}

impl Reversible for MoveRequest {
    fn undo(&mut self) -> RequestResult {
        let previous = self
            .previous
            .ok_or_else(|| RequestError::InvalidState("move was never committed".into()))?;
        self.document.lock().set_point(&self.name, previous);
        Ok(())
    }

    fn redo(&mut self) -> RequestResult {
        self.document.lock().set_point(&self.name, self.target);
        Ok(())
    }
}

/// Renames a point.
#[derive(Debug)]
pub struct RenameRequest {
    document: SharedDocument,
    from: String,
    to: String,
    description: String,
}

impl RenameRequest {
    pub fn new(document: &SharedDocument, from: impl Into<String>, to: impl Into<String>) -> Self {
        let from = from.into();
        let to = to.into();
        Self {
            description: format!("Rename {from} to {to}"),
            document: Arc::clone(document),
            from,
            to,
        }
    }
}

impl Request for RenameRequest {
    fn commit(&mut self) -> RequestResult {
        self.document.lock().rename(&self.from, &self.to)
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn as_reversible(&mut self) -> Option<&mut dyn Reversible> {
        Some(self)
    }
}

impl Reversible for RenameRequest {
    fn undo(&mut self) -> RequestResult {
        self.document.lock().rename(&self.to, &self.from)
    }

    fn redo(&mut self) -> RequestResult {
        self.commit()
    }
}

/// Prepends [`DEFAULT_POINT`] when a `"move"` call omits the point name.
fn default_point_name(mut args: RequestArgs) -> RequestArgs {
    if args.first().and_then(ArgValue::as_str).is_none() {
        args.insert(0, ArgValue::from(DEFAULT_POINT));
    }
    args
}

/// Registers the document's request types.
pub fn register_requests(manager: &mut TransactionManager, document: &SharedDocument) {
    let move_doc = Arc::clone(document);
    let rename_doc = Arc::clone(document);
    manager.register_all([
        RequestTypeEntry::new("move", move |args| {
            Ok(Box::new(MoveRequest::from_args(&move_doc, &args)?) as Box<dyn Request>)
        })
        .with_adapter(default_point_name),
        RequestTypeEntry::new("rename", move |args| {
            let name = |index: usize| {
                args.get(index)
                    .and_then(ArgValue::as_str)
                    .map(str::to_owned)
                    .ok_or_else(|| RequestError::Custom(format!("rename: missing name {index}")))
            };
            Ok(Box::new(RenameRequest::new(&rename_doc, name(0)?, name(1)?)) as Box<dyn Request>)
        }),
    ]);
}
