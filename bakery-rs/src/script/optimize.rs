//! Batching pass.
//!
//! A run of adjacent commands of the same batchable kind that touch the same
//! resource is merged into one batched command, so the executor opens and
//! writes the resource once.  Runs end at any other command, at a change of
//! resource, or when a member reads a variable an earlier member writes.

use tracing::debug;

use super::command::{Command, CommandInfo, CommandKind};

/// Batch every eligible run in `block`, recursing into nested bodies.
pub fn optimize(block: Vec<Command>) -> Vec<Command> {
    let mut out: Vec<Command> = Vec::with_capacity(block.len());
    let mut run: Vec<Command> = Vec::new();

    for mut cmd in block {
        for body in cmd.blocks_mut() {
            *body = optimize(std::mem::take(body));
        }
        if let Some(first) = run.first() {
            if !joins(first, &run, &cmd) {
                flush(&mut run, &mut out);
            }
        }
        if resource_key(&cmd).is_some() {
            run.push(cmd);
        } else {
            out.push(cmd);
        }
    }
    flush(&mut run, &mut out);
    out
}

fn flush(run: &mut Vec<Command>, out: &mut Vec<Command>) {
    match run.len() {
        0 => {}
        1 => out.extend(run.drain(..)),
        _ => {
            let members = std::mem::take(run);
            let first = &members[0];
            let Some(kind) = first.kind.batched() else {
                out.extend(members);
                return;
            };
            debug!(kind = %kind, count = members.len(), line = first.line, "batched commands");
            out.push(Command {
                kind,
                args: Vec::new(),
                flags: Vec::new(),
                line: first.line,
                raw: first.raw.clone(),
                info: CommandInfo::Batch(members),
            });
        }
    }
}

/// Whether `next` may extend the run started by `first`.
fn joins(first: &Command, run: &[Command], next: &Command) -> bool {
    if next.kind != first.kind {
        return false;
    }
    let (Some(a), Some(b)) = (resource_key(first), resource_key(next)) else {
        return false;
    };
    if a != b {
        return false;
    }
    let written: Vec<String> = run.iter().filter_map(written_var).map(|v| v.to_lowercase()).collect();
    written.is_empty() || !reads_any(next, &written)
}

/// Resource key of `Visible`: it always edits the running script's interface.
const RUNNING_INTERFACE: &str = "<running script>|interface";

/// The resource a batchable command touches, `None` if it cannot batch.
pub fn resource_key(cmd: &Command) -> Option<String> {
    if !matches!(cmd.info, CommandInfo::Plain) {
        return None;
    }
    cmd.kind.batched()?;
    let key = match cmd.kind {
        CommandKind::TXTAddLine => format!("{}|{}", cmd.arg(0).trim(), cmd.arg(2).trim()),
        CommandKind::Visible => RUNNING_INTERFACE.to_owned(),
        CommandKind::ReadInterface | CommandKind::WriteInterface => cmd.arg(1).trim().to_owned(),
        _ => cmd.arg(0).trim().to_owned(),
    };
    Some(key.to_lowercase())
}

/// Destination variable a batchable command writes.
fn written_var(cmd: &Command) -> Option<&str> {
    let dest = match cmd.kind {
        CommandKind::IniRead | CommandKind::ReadInterface => cmd.arg(3),
        CommandKind::IniReadSection => cmd.arg(2),
        _ => return None,
    };
    Some(dest.trim())
}

fn reads_any(cmd: &Command, written: &[String]) -> bool {
    cmd.args.iter().chain(cmd.flags.iter()).any(|arg| {
        let arg = arg.to_lowercase();
        written.iter().any(|w| arg.contains(w.as_str()))
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────
