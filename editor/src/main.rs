mod document;
mod history_panel;
mod log_capture;
mod project;
mod script;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use lilium_core::transaction::{RequestInfo, SignalKind, TransactionManager};

use document::Document;

/// Lilium editor arguments.
#[derive(Parser, Debug)]
#[command(
    name = "lilium-editor",
    about = "Headless Lilium editor driven by session scripts",
    long_about = "Runs a scripted editing session against a document of named points.\n\n\
        Every edit goes through the transaction manager, so the script can commit,\n\
        abort, undo and redo requests and group them into sessions.\n\
        \n\
        EXAMPLES:\n\
          # Run the built-in demo session\n\
          ./lilium-editor\n\
        \n\
          # Run a script with debug logging\n\
          ./lilium-editor --script session.toml --verbose",
    version
)]
struct Args {
    /// Project configuration file.
    #[arg(long, default_value = "lilium.toml")]
    config: PathBuf,

    /// Session script to execute. Runs the built-in demo when omitted.
    #[arg(long)]
    script: Option<PathBuf>,

    /// Log every manager operation (overrides the `[log]` filter).
    #[arg(long)]
    verbose: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let loaded = project::load_project(&args.config);
    let filter = if args.verbose {
        "debug".to_owned()
    } else {
        loaded
            .as_ref()
            .map(|config| config.log.filter.clone())
            .unwrap_or_else(|_| "info".to_owned())
    };
    if let Err(e) = log_capture::install(&filter) {
        eprintln!("{e}");
        return ExitCode::FAILURE;
    }
    lilium_core::init();

    let config = project::or_default(loaded);
    let script = match &args.script {
        Some(path) => script::load_script(path),
        None => script::parse_script(script::DEMO_SCRIPT),
    };
    let script = match script {
        Ok(script) => script,
        Err(e) => {
            log::error!("{e}");
            return ExitCode::FAILURE;
        }
    };

    let document = Document::from_config(&config.points).shared();
    let mut manager = TransactionManager::with_config(config.manager.clone());
    document::register_requests(&mut manager, &document);
    watch_signals(&manager);

    log::info!(
        "Project \"{}\": running {} steps",
        config.project.name,
        script.steps.len()
    );
    let report = script::ScriptRunner::new(&mut manager).run(&script);

    println!("Document:");
    print!("{}", *document.lock());
    println!();
    println!("History:");
    print!("{}", history_panel::render_history(&manager));

    if let Some(problems) = log_capture::problem_log() {
        let problems = problems.lock();
        println!();
        println!(
            "{} steps, {} rejected, {} log records, {} problems ({} from the manager)",
            report.steps,
            report.rejected,
            problems.records(),
            problems.problem_count(),
            problems.manager_problems()
        );
        for problem in problems.problems() {
            let source = if problem.from_manager() {
                "manager"
            } else {
                problem.target.as_str()
            };
            println!("  [{}] {source}: {}", problem.level, problem.message);
        }
    }

    manager.dispose();
    if report.rejected == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

/// Logs every lifecycle signal the manager dispatches.
fn watch_signals(manager: &TransactionManager) {
    let signals = manager.signals();
    for kind in [
        SignalKind::Created,
        SignalKind::Aborted,
        SignalKind::Committed,
        SignalKind::Undone,
        SignalKind::Redone,
    ] {
        if let Some(signal) = signals.request_signal(kind) {
            signal.listen(move |info: &RequestInfo| {
                log::info!("{kind} {} \"{}\"", info.id, info.description);
            });
        }
    }
    for kind in [
        SignalKind::Aborting,
        SignalKind::Committing,
        SignalKind::Undoing,
        SignalKind::Redoing,
    ] {
        if let Some(signal) = signals.request_signal(kind) {
            signal.listen(move |info: &RequestInfo| {
                log::debug!("{kind} {}", info.id);
            });
        }
    }
    signals
        .undo_redo_state_changed
        .listen(|_| log::debug!("undo/redo state changed"));
}
