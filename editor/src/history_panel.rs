use std::fmt::Write;

use lilium_core::transaction::{RequestInfo, TransactionManager};

/// Renders the undo/redo history of every open session for debugging.
///
/// Redo entries are listed above the current-position marker (next to redo
/// closest to it), undo entries below, most recent first.
pub fn render_history(manager: &TransactionManager) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Undo: {} | Redo: {}",
        if manager.can_undo() { "yes" } else { "no" },
        if manager.can_redo() { "yes" } else { "no" }
    );

    for snapshot in manager.request_stack(None) {
        let _ = writeln!(
            out,
            "-- session {} \"{}\" (undo {}, redo {})",
            snapshot.session,
            snapshot.description,
            snapshot.undo.len(),
            snapshot.redo.len()
        );
        for info in snapshot.redo.iter().rev() {
            write_entry(&mut out, "REDO", info, 0);
        }
        let _ = writeln!(out, "  ▸ current");
        for info in &snapshot.undo {
            write_entry(&mut out, "UNDO", info, 0);
        }
    }
    out
}

fn write_entry(out: &mut String, tag: &str, info: &RequestInfo, depth: usize) {
    let indent = "  ".repeat(depth + 1);
    let _ = writeln!(out, "{indent}{tag} {} {}", info.id, info.description);
    for member in &info.members {
        write_entry(out, "·", member, depth + 1);
    }
}
