//! Shared fixtures for the transaction integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use parking_lot::Mutex;

use lilium_core::transaction::{
    ArgValue, Request, RequestArgs, RequestError, RequestResult, Reversible, SignalKind,
    TransactionManager,
};

/// A 2D point shared between the test and the requests that edit it.
pub type SharedPoint = Arc<Mutex<(f64, f64)>>;

pub fn point() -> SharedPoint {
    Arc::new(Mutex::new((0.0, 0.0)))
}

/// Moves a point to an absolute position.
#[derive(Debug)]
pub struct MoveRequest {
    point: SharedPoint,
    target: (f64, f64),
    previous: Option<(f64, f64)>,
}

impl MoveRequest {
    pub fn new(point: &SharedPoint, x: f64, y: f64) -> Self {
        Self {
            point: Arc::clone(point),
            target: (x, y),
            previous: None,
        }
    }
}

impl Request for MoveRequest {
    fn commit(&mut self) -> RequestResult {
        let mut point = self.point.lock();
        self.previous = Some(*point);
        *point = self.target;
        Ok(())
    }

    fn description(&self) -> &str {
        "Move"
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
        *self.point.lock() = previous;
        Ok(())
    }

    fn redo(&mut self) -> RequestResult {
        *self.point.lock() = self.target;
        Ok(())
    }
}

/// Registers `"move"` taking `[x, y]` for `point`.
pub fn register_move(manager: &mut TransactionManager, point: &SharedPoint) {
    let point = Arc::clone(point);
    manager.register("move", move |args: RequestArgs| {
        let coord = |index: usize| {
            args.get(index)
                .and_then(ArgValue::as_f64)
                .ok_or_else(|| RequestError::Custom(format!("move: missing coordinate {index}")))
        };
        Ok(Box::new(MoveRequest::new(&point, coord(0)?, coord(1)?)) as Box<dyn Request>)
    });
}

/// Creates and commits a `"move"` request. Panics if creation fails.
pub fn commit_move(manager: &mut TransactionManager, x: f64, y: f64) -> bool {
    let id = manager
        .create_request("move", vec![x.into(), y.into()], false)
        .expect("move is registered");
    manager.commit(id, false)
}

/// Every signal the manager dispatched, with the request's raw id
/// (`0` for `undo_redo_state_changed`).
pub type SignalLog = Arc<Mutex<Vec<(SignalKind, u64)>>>;

pub fn record_signals(manager: &TransactionManager) -> SignalLog {
    let log: SignalLog = Arc::new(Mutex::new(Vec::new()));
    let signals = manager.signals();
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
        if let Some(signal) = signals.request_signal(kind) {
            let sink = Arc::clone(&log);
            signal.listen(move |info| sink.lock().push((kind, info.id.raw())));
        }
    }
    let sink = Arc::clone(&log);
    signals
        .undo_redo_state_changed
        .listen(move |_| sink.lock().push((SignalKind::UndoRedoStateChanged, 0)));
    log
}

pub fn kinds(log: &SignalLog) -> Vec<SignalKind> {
    log.lock().iter().map(|(kind, _)| *kind).collect()
}

pub fn count(log: &SignalLog, kind: SignalKind) -> usize {
    log.lock().iter().filter(|(k, _)| *k == kind).count()
}
