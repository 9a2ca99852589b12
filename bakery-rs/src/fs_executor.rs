//! Executor and probe backed by the local filesystem.
//!
//! Covers the file, directory, text and INI commands plus the console-side
//! interface commands (`Echo`, `Message`, `Beep`, `Wait`).  Anything else is
//! reported as unsupported.  Batched commands load their file once, apply
//! every member in order and write the file back once.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use aho_corasick::AhoCorasickBuilder;
use tracing::debug;

use crate::error::{LookupError, RuntimeError};
use crate::executor::{ExecResult, Executor, LogEntry, LogState, MemberFailure, ResourceProbe};
use crate::ini::{write_atomic, IniDocument};
use crate::pattern::{has_wildcard, matching_entries, native_path, EntryKind};
use crate::script::command::{Command, CommandInfo, CommandKind};
use crate::script::interp::InterpreterContext;

const WAIT_SLICE: Duration = Duration::from_millis(50);

/// Filesystem-backed [`Executor`].
#[derive(Debug, Default)]
pub struct FsExecutor {
    /// Message texts shown so far, for hosts without a dialog.
    pub messages: Vec<String>,
}

impl FsExecutor {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Executor for FsExecutor {
    fn execute(&mut self, cmd: &Command, ctx: &mut InterpreterContext) -> Result<ExecResult, RuntimeError> {
        let members: &[Command] = match &cmd.info {
            CommandInfo::Batch(members) => members,
            _ => std::slice::from_ref(cmd),
        };
        let kind = cmd.kind.unbatched().unwrap_or(cmd.kind);
        debug!(%kind, line = cmd.line, count = members.len(), "execute");

        let logs = match kind {
            CommandKind::Echo => {
                let text = ctx.preprocess(cmd.arg(0))?;
                let state = if cmd.has_flag("WARN") { LogState::Warning } else { LogState::Success };
                vec![LogEntry::new(state, text)]
            }
            CommandKind::Message => {
                let text = ctx.preprocess(cmd.arg(0))?;
                self.messages.push(text.clone());
                vec![LogEntry::new(LogState::Info, text)]
            }
            CommandKind::Beep => vec![LogEntry::ignore("Beep")],
            CommandKind::Wait => vec![wait(cmd, ctx)?],

            CommandKind::FileCreateBlank => vec![file_create_blank(cmd, ctx)?],
            CommandKind::FileDelete => file_delete(cmd, ctx)?,
            CommandKind::FileCopy => file_copy(cmd, ctx)?,
            CommandKind::DirMake => vec![dir_make(cmd, ctx)?],
            CommandKind::DirDelete => vec![dir_delete(cmd, ctx)?],
            CommandKind::DirCopy => dir_copy(cmd, ctx)?,

            CommandKind::TXTAddLine
            | CommandKind::TXTReplace
            | CommandKind::TXTDelLine
            | CommandKind::TXTDelSpaces
            | CommandKind::TXTDelEmptyLines => return Ok(text_ops(members, ctx)),

            CommandKind::IniRead
            | CommandKind::IniWrite
            | CommandKind::IniDelete
            | CommandKind::IniReadSection
            | CommandKind::IniAddSection
            | CommandKind::IniDeleteSection
            | CommandKind::IniWriteTextLine => return Ok(ini_ops(members, ctx)),
            CommandKind::IniMerge => vec![ini_merge(cmd, ctx)?],
            CommandKind::IniCompact => vec![ini_compact(cmd, ctx)?],

            other => return Err(RuntimeError::Unsupported(other.name().to_owned())),
        };
        Ok(ExecResult::logs(logs))
    }
}

fn arg(cmd: &Command, idx: usize, ctx: &InterpreterContext) -> Result<String, RuntimeError> {
    ctx.preprocess(cmd.arg(idx))
}

fn path_arg(cmd: &Command, idx: usize, ctx: &InterpreterContext) -> Result<(String, PathBuf), RuntimeError> {
    let raw = arg(cmd, idx, ctx)?;
    let path = native_path(&raw);
    Ok((raw, path))
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> RuntimeError + '_ {
    move |e| RuntimeError::io(path, e)
}

// ── Interface ─────────────────────────────────────────────────────────────────

fn wait(cmd: &Command, ctx: &InterpreterContext) -> Result<LogEntry, RuntimeError> {
    let raw = arg(cmd, 0, ctx)?;
    let secs: u64 = raw.trim().parse().map_err(|_| RuntimeError::InvalidInteger(raw.clone()))?;
    let deadline = Instant::now() + Duration::from_secs(secs);
    while Instant::now() < deadline {
        if ctx.is_cancelled() {
            return Err(RuntimeError::Cancelled);
        }
        std::thread::sleep(WAIT_SLICE.min(deadline.saturating_duration_since(Instant::now())));
    }
    Ok(LogEntry::success(format!("Waited {secs} second(s)")))
}

// ── Files and directories ─────────────────────────────────────────────────────

fn file_create_blank(cmd: &Command, ctx: &InterpreterContext) -> Result<LogEntry, RuntimeError> {
    let (raw, path) = path_arg(cmd, 0, ctx)?;
    let existed = path.exists();
    if existed && cmd.has_flag("PRESERVE") {
        let state = if cmd.has_flag("NOWARN") { LogState::Ignore } else { LogState::Warning };
        return Ok(LogEntry::new(state, format!("[{raw}] already exists, preserved")));
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(io_err(parent))?;
    }
    std::fs::write(&path, b"").map_err(io_err(&path))?;
    Ok(if existed && !cmd.has_flag("NOWARN") {
        LogEntry::new(LogState::Overwrite, format!("[{raw}] overwritten with a blank file"))
    } else {
        LogEntry::success(format!("Created blank file [{raw}]"))
    })
}

fn file_delete(cmd: &Command, ctx: &InterpreterContext) -> Result<Vec<LogEntry>, RuntimeError> {
    let raw = arg(cmd, 0, ctx)?;
    let files = matching_entries(&raw, EntryKind::File).map_err(io_err(Path::new(&raw)))?;
    if files.is_empty() {
        let state = if cmd.has_flag("NOWARN") { LogState::Ignore } else { LogState::Warning };
        return Ok(vec![LogEntry::new(state, format!("No file matches [{raw}]"))]);
    }
    files
        .iter()
        .map(|f| {
            std::fs::remove_file(f).map_err(io_err(f))?;
            Ok(LogEntry::success(format!("Deleted [{}]", f.display())))
        })
        .collect()
}

fn file_copy(cmd: &Command, ctx: &InterpreterContext) -> Result<Vec<LogEntry>, RuntimeError> {
    let src = arg(cmd, 0, ctx)?;
    let (dest_raw, dest) = path_arg(cmd, 1, ctx)?;
    let sources = matching_entries(&src, EntryKind::File).map_err(io_err(Path::new(&src)))?;
    if sources.is_empty() {
        return Err(RuntimeError::msg(format!("No file matches [{src}]")));
    }
    let into_dir = dest.is_dir() || has_wildcard(&src) || dest_raw.ends_with(['\\', '/']);
    if into_dir {
        std::fs::create_dir_all(&dest).map_err(io_err(&dest))?;
    }

    let mut logs = Vec::with_capacity(sources.len());
    for file in &sources {
        let target = match (into_dir, file.file_name()) {
            (true, Some(name)) => dest.join(name),
            _ => dest.clone(),
        };
        let exists = target.exists();
        if exists && cmd.has_flag("PRESERVE") {
            let state = if cmd.has_flag("NOWARN") { LogState::Ignore } else { LogState::Warning };
            logs.push(LogEntry::new(state, format!("[{}] already exists, preserved", target.display())));
            continue;
        }
        std::fs::copy(file, &target).map_err(io_err(file))?;
        let state = if exists && !cmd.has_flag("NOWARN") { LogState::Overwrite } else { LogState::Success };
        logs.push(LogEntry::new(state, format!("Copied [{}] to [{}]", file.display(), target.display())));
    }
    Ok(logs)
}

fn dir_make(cmd: &Command, ctx: &InterpreterContext) -> Result<LogEntry, RuntimeError> {
    let (raw, path) = path_arg(cmd, 0, ctx)?;
    if path.is_file() {
        return Err(RuntimeError::msg(format!("[{raw}] is a file, not a directory")));
    }
    if path.is_dir() {
        return Ok(LogEntry::ignore(format!("Directory [{raw}] already exists")));
    }
    std::fs::create_dir_all(&path).map_err(io_err(&path))?;
    Ok(LogEntry::success(format!("Created directory [{raw}]")))
}

fn dir_delete(cmd: &Command, ctx: &InterpreterContext) -> Result<LogEntry, RuntimeError> {
    let (raw, path) = path_arg(cmd, 0, ctx)?;
    if !path.is_dir() {
        return Ok(LogEntry::warning(format!("Directory [{raw}] does not exist")));
    }
    std::fs::remove_dir_all(&path).map_err(io_err(&path))?;
    Ok(LogEntry::success(format!("Deleted directory [{raw}]")))
}

fn copy_tree(src: &Path, dest: &Path) -> Result<(), RuntimeError> {
    std::fs::create_dir_all(dest).map_err(io_err(dest))?;
    for entry in std::fs::read_dir(src).map_err(io_err(src))? {
        let entry = entry.map_err(io_err(src))?;
        let from = entry.path();
        let to = dest.join(entry.file_name());
        if from.is_dir() {
            copy_tree(&from, &to)?;
        } else {
            std::fs::copy(&from, &to).map_err(io_err(&from))?;
        }
    }
    Ok(())
}

/// `DirCopy,<src>,<dest>` copies `src` into `dest`.  With a wildcard in the
/// last component, every matching subdirectory is copied; the matching
/// top-level files only under `LegacyDirCopyWildcardBug`.
fn dir_copy(cmd: &Command, ctx: &InterpreterContext) -> Result<Vec<LogEntry>, RuntimeError> {
    let src = arg(cmd, 0, ctx)?;
    let (_, dest) = path_arg(cmd, 1, ctx)?;
    let src_path = native_path(&src);
    let wildcard = src_path.file_name().and_then(|n| n.to_str()).is_some_and(has_wildcard);

    if !wildcard {
        let Some(name) = src_path.file_name() else {
            return Err(RuntimeError::msg(format!("[{src}] has no directory name")));
        };
        if !src_path.is_dir() {
            return Err(RuntimeError::msg(format!("Directory [{src}] does not exist")));
        }
        copy_tree(&src_path, &dest.join(name))?;
        return Ok(vec![LogEntry::success(format!("Copied directory [{src}] to [{}]", dest.display()))]);
    }

    let legacy = ctx.config().compat.legacy_dir_copy_wildcard_bug;
    let kind = if legacy { EntryKind::Any } else { EntryKind::Dir };
    let entries = matching_entries(&src, kind).map_err(io_err(&src_path))?;
    std::fs::create_dir_all(&dest).map_err(io_err(&dest))?;
    let mut logs = Vec::with_capacity(entries.len());
    for entry in entries {
        let Some(name) = entry.file_name() else { continue };
        let target = dest.join(name);
        if entry.is_dir() {
            copy_tree(&entry, &target)?;
        } else {
            std::fs::copy(&entry, &target).map_err(io_err(&entry))?;
        }
        logs.push(LogEntry::success(format!("Copied [{}] to [{}]", entry.display(), target.display())));
    }
    if logs.is_empty() {
        logs.push(LogEntry::warning(format!("Nothing matches [{src}]")));
    }
    Ok(logs)
}

// ── Text files ────────────────────────────────────────────────────────────────

struct TextFile {
    lines: Vec<String>,
    crlf: bool,
}

impl TextFile {
    fn load(path: &Path, create: bool) -> Result<Self, RuntimeError> {
        match std::fs::read_to_string(path) {
            Ok(text) => {
                let text = text.strip_prefix('\u{feff}').unwrap_or(&text);
                Ok(TextFile { lines: text.lines().map(str::to_owned).collect(), crlf: text.contains("\r\n") })
            }
            Err(e) if create && e.kind() == std::io::ErrorKind::NotFound => {
                Ok(TextFile { lines: Vec::new(), crlf: cfg!(windows) })
            }
            Err(e) => Err(RuntimeError::io(path, e)),
        }
    }

    fn save(&self, path: &Path) -> Result<(), RuntimeError> {
        let nl = if self.crlf { "\r\n" } else { "\n" };
        let mut text = self.lines.join(nl);
        if !self.lines.is_empty() {
            text.push_str(nl);
        }
        write_atomic(path, text.as_bytes()).map_err(io_err(path))
    }
}

/// Failure of the whole batch, pinned to its first member.  Members share one
/// file, so a load or save error hits the first of them run sequentially.
fn first_failed(error: RuntimeError) -> ExecResult {
    ExecResult::partial(Vec::new(), Some(MemberFailure { index: 0, error }))
}

fn text_ops(members: &[Command], ctx: &InterpreterContext) -> ExecResult {
    let Some(first) = members.first() else { return ExecResult::default() };
    let loaded = path_arg(first, 0, ctx).and_then(|(raw, path)| {
        let file = TextFile::load(&path, first.kind == CommandKind::TXTAddLine)?;
        Ok((raw, path, file))
    });
    let (raw, path, mut file) = match loaded {
        Ok(loaded) => loaded,
        Err(error) => return first_failed(error),
    };
    let mut logs = Vec::with_capacity(members.len());
    let mut failed = None;
    for (index, m) in members.iter().enumerate() {
        match apply_text(&mut file, &raw, m, ctx) {
            Ok(entry) => logs.push(entry.at(m)),
            Err(error) => {
                failed = Some(MemberFailure { index, error });
                break;
            }
        }
    }
    if !logs.is_empty() {
        if let Err(error) = file.save(&path) {
            return first_failed(error);
        }
    }
    ExecResult::partial(logs, failed)
}

fn apply_text(file: &mut TextFile, name: &str, m: &Command, ctx: &InterpreterContext) -> Result<LogEntry, RuntimeError> {
    let entry = match m.kind {
        CommandKind::TXTAddLine => {
            let line = arg(m, 1, ctx)?;
            let mode = arg(m, 2, ctx)?;
            if mode.eq_ignore_ascii_case("Append") {
                file.lines.push(line.clone());
            } else if mode.eq_ignore_ascii_case("Prepend") {
                file.lines.insert(0, line.clone());
            } else {
                return Err(RuntimeError::msg(format!("Invalid TXTAddLine mode [{mode}]")));
            }
            LogEntry::success(format!("Added [{line}] to [{name}]"))
        }
        CommandKind::TXTReplace => {
            let old = arg(m, 1, ctx)?;
            let new = arg(m, 2, ctx)?;
            if old.is_empty() {
                return Err(RuntimeError::msg("TXTReplace needs a non-empty search string"));
            }
            let ac = AhoCorasickBuilder::new().ascii_case_insensitive(true).build([old.as_str()]);
            for line in &mut file.lines {
                if ac.is_match(line.as_str()) {
                    *line = ac.replace_all(line, &[new.as_str()]);
                }
            }
            LogEntry::success(format!("Replaced [{old}] with [{new}] in [{name}]"))
        }
        CommandKind::TXTDelLine => {
            let prefix = arg(m, 1, ctx)?.to_lowercase();
            let before = file.lines.len();
            file.lines.retain(|l| !l.to_lowercase().starts_with(&prefix));
            let removed = before - file.lines.len();
            if removed == 0 {
                LogEntry::ignore(format!("No line of [{name}] starts with [{prefix}]"))
            } else {
                LogEntry::success(format!("Deleted {removed} line(s) from [{name}]"))
            }
        }
        CommandKind::TXTDelSpaces => {
            for line in &mut file.lines {
                *line = line.trim().to_owned();
            }
            LogEntry::success(format!("Trimmed spaces in [{name}]"))
        }
        CommandKind::TXTDelEmptyLines => {
            file.lines.retain(|l| !l.trim().is_empty());
            LogEntry::success(format!("Deleted empty lines of [{name}]"))
        }
        other => return Err(RuntimeError::Unsupported(other.name().to_owned())),
    };
    Ok(entry)
}

// ── INI files ─────────────────────────────────────────────────────────────────

fn ini_ops(members: &[Command], ctx: &mut InterpreterContext) -> ExecResult {
    let Some(first) = members.first() else { return ExecResult::default() };
    let loaded = path_arg(first, 0, ctx).and_then(|(raw, path)| {
        let doc = IniDocument::load(&path).map_err(io_err(&path))?;
        Ok((raw, path, doc))
    });
    let (raw, path, mut doc) = match loaded {
        Ok(loaded) => loaded,
        Err(error) => return first_failed(error),
    };
    let mut dirty = false;
    let mut logs = Vec::with_capacity(members.len());
    let mut failed = None;
    for (index, m) in members.iter().enumerate() {
        match apply_ini(&mut doc, &raw, m, ctx) {
            Ok((entry, changed)) => {
                dirty |= changed;
                logs.push(entry.at(m));
            }
            Err(error) => {
                failed = Some(MemberFailure { index, error });
                break;
            }
        }
    }
    if dirty {
        if ctx.config().compat.auto_compact_on_ini_write && first.kind == CommandKind::IniWrite {
            doc.compact();
        }
        if let Err(e) = doc.save(&path) {
            return first_failed(RuntimeError::io(&path, e));
        }
    }
    ExecResult::partial(logs, failed)
}

/// Apply one INI command; returns its log and whether the document changed.
fn apply_ini(
    doc: &mut IniDocument,
    name: &str,
    m: &Command,
    ctx: &mut InterpreterContext,
) -> Result<(LogEntry, bool), RuntimeError> {
    let section = arg(m, 1, ctx)?;
    Ok(match m.kind {
        CommandKind::IniRead => {
            let key = arg(m, 2, ctx)?;
            let value = match (doc.get(&section, &key), m.flag_value("Default")) {
                (Some(v), _) => v,
                (None, Some(default)) => ctx.preprocess(default)?,
                (None, None) => {
                    ctx.assign(m.arg(3), "")?;
                    return Ok((LogEntry::ignore(format!("Key [{key}] does not exist in [{name}]")), false));
                }
            };
            let assigned = ctx.assign(m.arg(3), &value)?;
            let entry = if assigned.state == LogState::Warning {
                assigned
            } else {
                LogEntry::success(format!("Key [{key}] read from [{name}] as [{value}]"))
            };
            (entry, false)
        }
        CommandKind::IniWrite => {
            let key = arg(m, 2, ctx)?;
            let value = arg(m, 3, ctx)?;
            doc.set(&section, &key, &value);
            (LogEntry::success(format!("Key [{key}] set to [{value}] in [{name}]")), true)
        }
        CommandKind::IniDelete => {
            let key = arg(m, 2, ctx)?;
            if doc.delete(&section, &key) {
                (LogEntry::success(format!("Key [{key}] deleted from [{name}]")), true)
            } else {
                (LogEntry::ignore(format!("Key [{key}] does not exist in [{name}]")), false)
            }
        }
        CommandKind::IniReadSection => {
            let delim = match m.flag_value("Delim") {
                Some(d) => ctx.preprocess(d)?,
                None => "|".to_owned(),
            };
            match doc.section_lines(&section) {
                Some(lines) => {
                    ctx.assign(m.arg(2), &lines.join(&delim))?;
                    (LogEntry::success(format!("Section [{section}] read from [{name}]")), false)
                }
                None => {
                    ctx.assign(m.arg(2), "")?;
                    (LogEntry::ignore(format!("Section [{section}] does not exist in [{name}]")), false)
                }
            }
        }
        CommandKind::IniAddSection => {
            if doc.add_section(&section) {
                (LogEntry::success(format!("Section [{section}] added to [{name}]")), true)
            } else {
                (LogEntry::ignore(format!("Section [{section}] already exists in [{name}]")), false)
            }
        }
        CommandKind::IniDeleteSection => {
            if doc.delete_section(&section) {
                (LogEntry::success(format!("Section [{section}] deleted from [{name}]")), true)
            } else {
                (LogEntry::ignore(format!("Section [{section}] does not exist in [{name}]")), false)
            }
        }
        CommandKind::IniWriteTextLine => {
            let text = arg(m, 2, ctx)?;
            doc.write_text_line(&section, &text, m.has_flag("APPEND"));
            (LogEntry::success(format!("Line [{text}] written to section [{section}] of [{name}]")), true)
        }
        other => return Err(RuntimeError::Unsupported(other.name().to_owned())),
    })
}

fn ini_merge(cmd: &Command, ctx: &InterpreterContext) -> Result<LogEntry, RuntimeError> {
    let (src_raw, src) = path_arg(cmd, 0, ctx)?;
    let (dest_raw, dest) = path_arg(cmd, 1, ctx)?;
    if !src.is_file() {
        return Err(RuntimeError::msg(format!("File [{src_raw}] does not exist")));
    }
    let other = IniDocument::load(&src).map_err(io_err(&src))?;
    let mut doc = IniDocument::load(&dest).map_err(io_err(&dest))?;
    doc.merge(&other);
    doc.save(&dest).map_err(io_err(&dest))?;
    Ok(LogEntry::success(format!("Merged [{src_raw}] into [{dest_raw}]")))
}

fn ini_compact(cmd: &Command, ctx: &InterpreterContext) -> Result<LogEntry, RuntimeError> {
    let (raw, path) = path_arg(cmd, 0, ctx)?;
    if !path.is_file() {
        return Err(RuntimeError::msg(format!("File [{raw}] does not exist")));
    }
    let mut doc = IniDocument::load(&path).map_err(io_err(&path))?;
    doc.compact();
    doc.save(&path).map_err(io_err(&path))?;
    Ok(LogEntry::success(format!("Compacted [{raw}]")))
}

// ── Probe ─────────────────────────────────────────────────────────────────────

/// Filesystem-backed [`ResourceProbe`].
#[derive(Debug, Default, Clone)]
pub struct FsProbe {
    /// Answer for `Question` conditions that carry no default.
    pub answer: Option<bool>,
}

impl ResourceProbe for FsProbe {
    fn file_exists(&self, path: &str) -> Result<bool, LookupError> {
        matching_entries(path, EntryKind::File)
            .map(|v| !v.is_empty())
            .map_err(|e| LookupError::Failed(e.to_string()))
    }

    fn dir_exists(&self, path: &str) -> Result<bool, LookupError> {
        matching_entries(path, EntryKind::Dir)
            .map(|v| !v.is_empty())
            .map_err(|e| LookupError::Failed(e.to_string()))
    }

    fn ini_section_exists(&self, file: &str, section: &str) -> Result<bool, LookupError> {
        let path = native_path(file);
        if !path.is_file() {
            return Ok(false);
        }
        IniDocument::load(&path)
            .map(|doc| doc.has_section(section))
            .map_err(|e| LookupError::Failed(e.to_string()))
    }

    fn question(&self, _message: &str, _timeout: Option<u64>, default: Option<bool>) -> Result<bool, LookupError> {
        default.or(self.answer).ok_or(LookupError::Unsupported("interactive question"))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::script::stmt::{parse_statement, ParseOptions};

    fn cmd(text: &str) -> Command {
        parse_statement(text, 1, &ParseOptions::default()).expect("parse")
    }

    fn batch(kind: CommandKind, texts: &[&str]) -> Command {
        let members: Vec<Command> = texts.iter().map(|t| cmd(t)).collect();
        Command {
            kind,
            args: Vec::new(),
            flags: Vec::new(),
            line: 1,
            raw: texts[0].to_owned(),
            info: CommandInfo::Batch(members),
        }
    }

    fn exec(c: &Command, ctx: &mut InterpreterContext) -> Result<Vec<LogEntry>, RuntimeError> {
        let result = FsExecutor::new().execute(c, ctx)?;
        match result.failed {
            Some(failure) => Err(failure.error),
            None => Ok(result.logs),
        }
    }

    #[test]
    fn ini_write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let ini = dir.path().join("a.ini");
        let mut ctx = InterpreterContext::new(Config::default());
        exec(&cmd(&format!("IniWrite,{},Sec,Key,Value", ini.display())), &mut ctx).unwrap();
        exec(&cmd(&format!("IniRead,{},Sec,Key,%Out%", ini.display())), &mut ctx).unwrap();
        assert_eq!(ctx.variable("Out").as_deref(), Some("Value"));
    }

    #[test]
    fn ini_read_escapes_literal_values() {
        let dir = tempfile::tempdir().unwrap();
        let ini = dir.path().join("a.ini");
        std::fs::write(&ini, "[S]\nK=50%,done\n").unwrap();
        let mut ctx = InterpreterContext::new(Config::default());
        exec(&cmd(&format!("IniRead,{},S,K,%V%", ini.display())), &mut ctx).unwrap();
        assert_eq!(ctx.preprocess("%V%").unwrap(), "50%,done");
    }

    #[test]
    fn ini_read_default_and_missing() {
        let dir = tempfile::tempdir().unwrap();
        let ini = dir.path().join("a.ini");
        let mut ctx = InterpreterContext::new(Config::default());
        exec(&cmd(&format!("IniRead,{},S,K,%V%,Default=fallback", ini.display())), &mut ctx).unwrap();
        assert_eq!(ctx.variable("V").as_deref(), Some("fallback"));
        let logs = exec(&cmd(&format!("IniRead,{},S,K,%W%", ini.display())), &mut ctx).unwrap();
        assert_eq!(logs[0].state, LogState::Ignore);
        assert_eq!(ctx.variable("W").as_deref(), Some(""));
    }

    #[test]
    fn batched_ini_writes_log_each_member() {
        let dir = tempfile::tempdir().unwrap();
        let ini = dir.path().join("b.ini");
        let p = ini.display();
        let c = batch(
            CommandKind::IniWriteOp,
            &[&format!("IniWrite,{p},S,A,1"), &format!("IniWrite,{p},S,B,2"), &format!("IniWrite,{p},T,C,3")],
        );
        let mut ctx = InterpreterContext::new(Config::default());
        let logs = exec(&c, &mut ctx).unwrap();
        assert_eq!(logs.len(), 3);
        let doc = IniDocument::load(&ini).unwrap();
        assert_eq!(doc.get("S", "B").as_deref(), Some("2"));
        assert_eq!(doc.get("T", "C").as_deref(), Some("3"));
    }

    #[test]
    fn failing_member_keeps_earlier_writes() {
        let dir = tempfile::tempdir().unwrap();
        let ini = dir.path().join("c.ini");
        let p = ini.display();
        let c = batch(
            CommandKind::IniWriteOp,
            &[&format!("IniWrite,{p},S,K1,1"), &format!("IniWrite,{p},S,K2,#c"), &format!("IniWrite,{p},S,K3,3")],
        );
        let mut ctx = InterpreterContext::new(Config::default());
        let result = FsExecutor::new().execute(&c, &mut ctx).unwrap();
        assert_eq!(result.logs.len(), 1);
        assert_eq!(result.failed, Some(MemberFailure { index: 1, error: RuntimeError::NoActiveLoop }));
        assert_eq!(std::fs::read_to_string(&ini).unwrap(), "[S]\nK1=1\n");
    }

    #[test]
    fn text_add_replace_delete() {
        let dir = tempfile::tempdir().unwrap();
        let txt = dir.path().join("a.txt");
        let p = txt.display();
        let mut ctx = InterpreterContext::new(Config::default());
        exec(&cmd(&format!("TXTAddLine,{p},Hello World,Append")), &mut ctx).unwrap();
        exec(&cmd(&format!("TXTAddLine,{p},first,Prepend")), &mut ctx).unwrap();
        exec(&cmd(&format!("TXTReplace,{p},WORLD,There")), &mut ctx).unwrap();
        assert_eq!(std::fs::read_to_string(&txt).unwrap(), "first\nHello There\n");
        exec(&cmd(&format!("TXTDelLine,{p},FIR")), &mut ctx).unwrap();
        assert_eq!(std::fs::read_to_string(&txt).unwrap(), "Hello There\n");
    }

    #[test]
    fn replace_on_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctx = InterpreterContext::new(Config::default());
        let c = cmd(&format!("TXTReplace,{}/none.txt,a,b", dir.path().display()));
        assert!(matches!(exec(&c, &mut ctx), Err(RuntimeError::Io { .. })));
    }

    #[test]
    fn file_copy_with_wildcard() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "a").unwrap();
        std::fs::write(dir.path().join("b.txt"), "b").unwrap();
        std::fs::write(dir.path().join("c.log"), "c").unwrap();
        let out = dir.path().join("out");
        let mut ctx = InterpreterContext::new(Config::default());
        let logs = exec(&cmd(&format!("FileCopy,{}/*.txt,{}", dir.path().display(), out.display())), &mut ctx).unwrap();
        assert_eq!(logs.len(), 2);
        assert!(out.join("a.txt").is_file());
        assert!(!out.join("c.log").exists());
    }

    #[test]
    fn dir_copy_wildcard_legacy_flag() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src");
        std::fs::create_dir_all(src.join("sub")).unwrap();
        std::fs::write(src.join("sub/x.txt"), "x").unwrap();
        std::fs::write(src.join("top.txt"), "t").unwrap();
        let c = cmd(&format!("DirCopy,{}/*,{}", src.display(), dir.path().join("d1").display()));

        let mut ctx = InterpreterContext::new(Config::default());
        exec(&c, &mut ctx).unwrap();
        assert!(dir.path().join("d1/sub/x.txt").is_file());
        assert!(!dir.path().join("d1/top.txt").exists());

        let mut config = Config::default();
        config.compat.legacy_dir_copy_wildcard_bug = true;
        let mut ctx = InterpreterContext::new(config);
        let c = cmd(&format!("DirCopy,{}/*,{}", src.display(), dir.path().join("d2").display()));
        exec(&c, &mut ctx).unwrap();
        assert!(dir.path().join("d2/top.txt").is_file());
    }

    #[test]
    fn file_create_blank_preserve() {
        let dir = tempfile::tempdir().unwrap();
        let f = dir.path().join("x.txt");
        std::fs::write(&f, "data").unwrap();
        let mut ctx = InterpreterContext::new(Config::default());
        let logs = exec(&cmd(&format!("FileCreateBlank,{},PRESERVE", f.display())), &mut ctx).unwrap();
        assert_eq!(logs[0].state, LogState::Warning);
        assert_eq!(std::fs::read_to_string(&f).unwrap(), "data");
        let logs = exec(&cmd(&format!("FileCreateBlank,{}", f.display())), &mut ctx).unwrap();
        assert_eq!(logs[0].state, LogState::Overwrite);
        assert_eq!(std::fs::read_to_string(&f).unwrap(), "");
    }

    #[test]
    fn unsupported_commands_are_errors() {
        let mut ctx = InterpreterContext::new(Config::default());
        let err = exec(&cmd("RegHiveUnload,HKLM\\Temp"), &mut ctx).unwrap_err();
        assert_eq!(err, RuntimeError::Unsupported("RegHiveUnload".into()));
    }

    #[test]
    fn probe_checks_files_and_sections() {
        let dir = tempfile::tempdir().unwrap();
        let ini = dir.path().join("p.ini");
        std::fs::write(&ini, "[Main]\nk=v\n").unwrap();
        let probe = FsProbe::default();
        let p = ini.display().to_string();
        assert!(probe.file_exists(&p).unwrap());
        assert!(probe.file_exists(&format!("{}/*.INI", dir.path().display())).unwrap());
        assert!(!probe.dir_exists(&p).unwrap());
        assert!(probe.ini_section_exists(&p, "main").unwrap());
        assert!(!probe.ini_section_exists(&p, "Other").unwrap());
        assert!(probe.question("?", None, None).is_err());
        assert!(FsProbe { answer: Some(true) }.question("?", None, None).unwrap());
    }
}
