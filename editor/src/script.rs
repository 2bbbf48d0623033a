//! Scripted editing sessions.
//!
//! A script is a TOML file of `[[step]]` tables executed in order against
//! the transaction manager. Requests and sessions are referred to by label:
//!
//! ```toml
//! [[step]]
//! op = "create"
//! type = "move"
//! args = ["origin", 5, 5]
//! label = "m1"
//!
//! [[step]]
//! op = "commit"
//! label = "m1"
//!
//! [[step]]
//! op = "undo"
//! ```

use std::collections::HashMap;
use std::path::Path;

use lilium_core::transaction::{
    ArgValue, CommitOptions, RequestId, SessionControl, SessionOptions, TransactionManager,
};
use serde::Deserialize;

/// Script run when no `--script` is given.
pub const DEMO_SCRIPT: &str = r#"
[[step]]
op = "create"
type = "move"
args = [5, 5]
label = "first"

[[step]]
op = "commit"
label = "first"

[[step]]
op = "undo"

[[step]]
op = "redo"

[[step]]
op = "start_session"
label = "drag"
description = "Drag origin"

[[step]]
op = "create"
type = "move"
args = [6, 5]
label = "drag1"

[[step]]
op = "commit"
label = "drag1"

[[step]]
op = "create"
type = "move"
args = [7, 6]
label = "drag2"

[[step]]
op = "commit_async"
label = "drag2"

[[step]]
op = "commit_session"
label = "drag"

[[step]]
op = "create"
type = "rename"
args = ["origin", "anchor"]
label = "rename"

[[step]]
op = "commit"
label = "rename"
"#;

#[derive(Debug, Clone, Deserialize)]
pub struct Script {
    #[serde(default, rename = "step")]
    pub steps: Vec<Step>,
}

fn default_true() -> bool {
    true
}

/// One scripted operation.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Step {
    /// Instantiates and activates a registered request type.
    Create {
        r#type: String,
        #[serde(default)]
        args: Vec<ArgValue>,
        /// Defaults to the type key.
        label: Option<String>,
        #[serde(default = "default_true")]
        emit: bool,
    },
    Commit {
        label: String,
        #[serde(default)]
        skip_session: bool,
    },
    CommitAsync {
        label: String,
        #[serde(default)]
        skip_session: bool,
    },
    Abort {
        label: String,
    },
    Undo,
    Redo,
    StartSession {
        label: String,
        description: Option<String>,
        max_undo_step: Option<usize>,
        #[serde(default = "default_true")]
        undo_redo: bool,
    },
    CommitSession {
        label: String,
        #[serde(default = "default_true")]
        merge: bool,
    },
    AbortSession {
        label: String,
    },
    EndSession {
        label: String,
    },
    BlockSignals,
    FlushSignals,
    BlockUndoRedo,
    UnblockUndoRedo,
}

/// Load a script from a TOML file.
pub fn load_script(path: &Path) -> Result<Script, String> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("failed to read {}: {e}", path.display()))?;
    parse_script(&content).map_err(|e| format!("{}: {e}", path.display()))
}

pub fn parse_script(content: &str) -> Result<Script, String> {
    toml::from_str(content).map_err(|e| format!("failed to parse script: {e}"))
}

/// Counts of a finished run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScriptReport {
    pub steps: usize,
    /// Steps that failed or that the manager turned into a no-op.
    pub rejected: usize,
}

/// Executes script steps, tracking labelled requests and sessions.
pub struct ScriptRunner<'a> {
    manager: &'a mut TransactionManager,
    requests: HashMap<String, RequestId>,
    sessions: HashMap<String, SessionControl>,
}

impl<'a> ScriptRunner<'a> {
    pub fn new(manager: &'a mut TransactionManager) -> Self {
        Self {
            manager,
            requests: HashMap::new(),
            sessions: HashMap::new(),
        }
    }

    pub fn run(&mut self, script: &Script) -> ScriptReport {
        let mut report = ScriptReport::default();
        for (index, step) in script.steps.iter().enumerate() {
            report.steps += 1;
            match self.execute(step) {
                Ok(true) => log::info!("step {}: {:?}", index + 1, step),
                Ok(false) => {
                    report.rejected += 1;
                    log::warn!("step {}: {:?} had no effect", index + 1, step);
                }
                Err(e) => {
                    report.rejected += 1;
                    log::error!("step {}: {e}", index + 1);
                }
            }
        }
        report
    }

    fn execute(&mut self, step: &Step) -> Result<bool, String> {
        match step {
            Step::Create {
                r#type,
                args,
                label,
                emit,
            } => {
                let id = self
                    .manager
                    .create_request(r#type, args.clone(), *emit)
                    .map_err(|e| e.to_string())?;
                let label = label.clone().unwrap_or_else(|| r#type.clone());
                self.requests.insert(label, id);
                Ok(true)
            }
            Step::Commit {
                label,
                skip_session,
            } => {
                let id = self.request(label)?;
                Ok(self.manager.commit(id, *skip_session))
            }
            Step::CommitAsync {
                label,
                skip_session,
            } => {
                let id = self.request(label)?;
                Ok(pollster::block_on(
                    self.manager.commit_async(id, *skip_session),
                ))
            }
            Step::Abort { label } => {
                let id = self.request(label)?;
                Ok(self.manager.abort(id))
            }
            Step::Undo => Ok(self.manager.undo()),
            Step::Redo => Ok(self.manager.redo()),
            Step::StartSession {
                label,
                description,
                max_undo_step,
                undo_redo,
            } => {
                let mut options = SessionOptions::new();
                if let Some(description) = description {
                    options = options.with_description(description.clone());
                }
                if let Some(max_undo_step) = max_undo_step {
                    options = options.with_max_undo_step(*max_undo_step);
                }
                if !undo_redo {
                    options = options.without_undo_redo();
                }
                let control = self.manager.start_session(options);
                if !control.is_attached() {
                    return Ok(false);
                }
                self.sessions.insert(label.clone(), control);
                Ok(true)
            }
            Step::CommitSession { label, merge } => {
                let control = self.session(label)?;
                let options = if *merge {
                    CommitOptions::merged()
                } else {
                    CommitOptions::unmerged()
                };
                Ok(control.commit(self.manager, options))
            }
            Step::AbortSession { label } => {
                let control = self.session(label)?;
                Ok(control.abort(self.manager))
            }
            Step::EndSession { label } => {
                let control = self.session(label)?;
                Ok(control.end(self.manager))
            }
            Step::BlockSignals => {
                self.manager.start_block_signals();
                Ok(true)
            }
            Step::FlushSignals => {
                self.manager.stop_block_signals();
                let replayed = self.manager.clear_blocked_signals();
                log::debug!("Replayed {replayed} blocked signals");
                Ok(true)
            }
            Step::BlockUndoRedo => {
                self.manager.block_undo_redo();
                Ok(true)
            }
            Step::UnblockUndoRedo => {
                self.manager.unblock_undo_redo();
                Ok(true)
            }
        }
    }

    fn request(&self, label: &str) -> Result<RequestId, String> {
        self.requests
            .get(label)
            .copied()
            .ok_or_else(|| format!("no request labelled \"{label}\""))
    }

    fn session(&self, label: &str) -> Result<SessionControl, String> {
        self.sessions
            .get(label)
            .copied()
            .ok_or_else(|| format!("no session labelled \"{label}\""))
    }
}
