//! Logger for script runs.
//!
//! Every record goes to `env_logger` as usual. Warnings and errors are also
//! kept in a bounded [`ProblemLog`] so the run summary can list what went
//! wrong, split into manager problems and editor problems.

use std::collections::VecDeque;
use std::sync::{Arc, OnceLock};

use log::Log;
use parking_lot::Mutex;

/// Log target used by `lilium_core::transaction`.
pub const TRANSACTION_TARGET: &str = "transaction";

const MAX_PROBLEMS: usize = 1_000;

/// A captured warning or error.
pub struct Problem {
    pub level: log::Level,
    pub target: String,
    pub message: String,
}

impl Problem {
    /// Whether the transaction manager reported this problem.
    pub fn from_manager(&self) -> bool {
        self.target == TRANSACTION_TARGET
    }
}

/// Warnings and errors of the current run, oldest dropped first, plus a
/// count of every record that passed the filter.
pub struct ProblemLog {
    problems: VecDeque<Problem>,
    capacity: usize,
    records: usize,
}

impl ProblemLog {
    fn new(capacity: usize) -> Self {
        Self {
            problems: VecDeque::new(),
            capacity,
            records: 0,
        }
    }

    pub fn problems(&self) -> impl Iterator<Item = &Problem> {
        self.problems.iter()
    }

    pub fn problem_count(&self) -> usize {
        self.problems.len()
    }

    /// Number of records logged during the run, problems included.
    pub fn records(&self) -> usize {
        self.records
    }

    /// Problems reported by the transaction manager.
    pub fn manager_problems(&self) -> usize {
        self.problems.iter().filter(|p| p.from_manager()).count()
    }

    fn record(&mut self, level: log::Level, target: &str, message: String) {
        self.records += 1;
        if level > log::Level::Warn {
            return;
        }
        if self.problems.len() == self.capacity {
            self.problems.pop_front();
        }
        self.problems.push_back(Problem {
            level,
            target: target.to_owned(),
            message,
        });
    }
}

static PROBLEM_LOG: OnceLock<Arc<Mutex<ProblemLog>>> = OnceLock::new();

/// The run's problem log, if [`install`] was called.
pub fn problem_log() -> Option<Arc<Mutex<ProblemLog>>> {
    PROBLEM_LOG.get().cloned()
}

struct CapturingLogger {
    inner: env_logger::Logger,
    problems: Arc<Mutex<ProblemLog>>,
}

impl Log for CapturingLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        self.inner.enabled(metadata)
    }

    fn log(&self, record: &log::Record) {
        if !self.inner.enabled(record.metadata()) {
            return;
        }
        self.inner.log(record);
        self.problems
            .lock()
            .record(record.level(), record.target(), record.args().to_string());
    }

    fn flush(&self) {
        self.inner.flush();
    }
}

/// Installs the capturing logger. `default_filter` applies when `RUST_LOG`
/// is not set.
pub fn install(default_filter: &str) -> Result<(), String> {
    let problems = Arc::new(Mutex::new(ProblemLog::new(MAX_PROBLEMS)));
    PROBLEM_LOG
        .set(Arc::clone(&problems))
        .map_err(|_| "logger installed twice".to_owned())?;

    let inner =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
            .build();
    let max_level = inner.filter();

    log::set_boxed_logger(Box::new(CapturingLogger { inner, problems }))
        .map_err(|e| format!("logger already set: {e}"))?;
    log::set_max_level(max_level);
    Ok(())
}
