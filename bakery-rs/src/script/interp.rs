//! Build script interpreter.
//!
//! The [`Interpreter`] walks parsed sections statement by statement.  It owns
//! control flow (`If`, loops, section calls, `Exit`/`Halt`/`Return`), the
//! variable and macro tables and the log; every other command is handed to
//! an [`Executor`] together with the [`InterpreterContext`].
//!
//! Non-local exits are carried by [`HaltSignal`] in the context rather than
//! by Rust control flow: a block stops as soon as a signal is pending, loops
//! consume `LoopBreak`/`LoopContinue`, section calls consume
//! `SectionReturn`, and the remaining signals unwind to the build driver.
//!
//! Values are stored in script-text form: `Set` expands variables and
//! parameters but keeps escape sequences, which are decoded only when a
//! value finally reaches a command operand.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::{CompatFlags, Config};
use crate::error::{EngineError, ParseError, RuntimeError};
use crate::executor::{ExecResult, Executor, LogEntry, LogState, MemberFailure, ResourceProbe};
use crate::ini::IniDocument;
use crate::macros::{MacroEntry, MacroScope, MacroStore};
use crate::var::{detect_key, trim_percent, VarKey, VarScope, VarStore, Variables, FIXED_FIRST, FIXED_LAST};

use super::command::{BranchCondition, CallParams, Command, CommandInfo, CondKind, LoopMode, SetScope, SystemOp};
use super::cond::{self, CondEnv};
use super::escape::escape;
use super::expand::{self, ExpandContext};
use super::source::{ParsedSection, Script};
use super::stmt::ParseOptions;

/// Nested section calls allowed before the build is stopped.
pub const MAX_CALL_DEPTH: usize = 128;

const VARIABLES_SECTION: &str = "Variables";

// ── Signals and status ────────────────────────────────────────────────────────

/// A pending non-local exit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HaltSignal {
    /// `Exit`: stop the current script, continue the build.
    ScriptHalt,
    /// `Halt`, an unmuted error or cancellation: stop the build.
    CommandHalt,
    /// `Return`: leave the current section.
    SectionReturn,
    LoopBreak,
    LoopContinue,
}

/// Final state of a build, ordered by severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum BuildStatus {
    Finished,
    Exited,
    Halted,
    Failed,
    Cancelled,
}

/// Result of [`Interpreter::run_build`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildReport {
    pub status: BuildStatus,
    pub logs: Vec<LogEntry>,
}

impl BuildReport {
    /// Entries with the given state.
    pub fn with_state(&self, state: LogState) -> impl Iterator<Item = &LogEntry> {
        self.logs.iter().filter(move |l| l.state == state)
    }

    pub fn messages(&self) -> Vec<&str> {
        self.logs.iter().map(|l| l.message.as_str()).collect()
    }
}

// ── Frames ────────────────────────────────────────────────────────────────────

/// One active loop.  Letter loops keep the character code in `counter`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopFrame {
    pub mode: LoopMode,
    pub counter: i64,
    pub step: i64,
    pub end: i64,
}

impl LoopFrame {
    fn in_range(&self) -> bool {
        if self.step > 0 {
            self.counter <= self.end
        } else {
            self.counter >= self.end
        }
    }

    pub fn counter_text(&self) -> String {
        match self.mode {
            LoopMode::Number => self.counter.to_string(),
            LoopMode::Letter => u32::try_from(self.counter)
                .ok()
                .and_then(char::from_u32)
                .map(String::from)
                .unwrap_or_default(),
        }
    }
}

/// One active section (or macro) call.
#[derive(Debug)]
struct SectionFrame {
    script: Arc<Script>,
    section: String,
    ins: Vec<String>,
    /// Caller variables bound to `#o1`..`#o9`, bare names.
    outs: Vec<String>,
    entry: bool,
    current_line: usize,
    /// Inclusive line window muted by `System,ErrorOff`.
    error_off: Option<(usize, usize)>,
    /// `System,SetLocal` snapshots of the Local scope and `#r`, innermost last.
    saved_locals: Vec<(VarStore, String)>,
}

impl SectionFrame {
    fn new(script: Arc<Script>, section: &str, ins: Vec<String>, outs: Vec<String>, entry: bool) -> Self {
        SectionFrame {
            script,
            section: section.to_owned(),
            ins,
            outs,
            entry,
            current_line: 0,
            error_off: None,
            saved_locals: Vec::new(),
        }
    }

    fn muted(&self) -> bool {
        self.error_off.is_some_and(|(from, to)| (from..=to).contains(&self.current_line))
    }
}

// ── Context ───────────────────────────────────────────────────────────────────

/// Interpreter state shared with executors.
#[derive(Debug)]
pub struct InterpreterContext {
    config: Config,
    pub vars: Variables,
    pub macros: MacroStore,
    frames: Vec<SectionFrame>,
    loops: Vec<LoopFrame>,
    return_value: String,
    halt: Option<HaltSignal>,
    logs: Vec<LogEntry>,
    status: BuildStatus,
    cancel: Arc<AtomicBool>,
}

impl InterpreterContext {
    pub fn new(config: Config) -> Self {
        InterpreterContext {
            config,
            vars: Variables::new(),
            macros: MacroStore::new(),
            frames: Vec::new(),
            loops: Vec::new(),
            return_value: String::new(),
            halt: None,
            logs: Vec::new(),
            status: BuildStatus::Finished,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }

    /// Script of the innermost section call.
    pub fn current_script(&self) -> Option<&Arc<Script>> {
        self.frames.last().map(|f| &f.script)
    }

    /// Value of `name` as a script would read it.
    pub fn variable(&self, name: &str) -> Option<String> {
        self.vars.get(name, self.read_order()).map(str::to_owned)
    }

    /// Expand and decode one operand.
    pub fn preprocess(&self, src: &str) -> Result<String, RuntimeError> {
        expand::preprocess(src, self)
    }

    pub fn preprocess_all(&self, args: &[String]) -> Result<Vec<String>, RuntimeError> {
        expand::preprocess_all(args, self)
    }

    /// Expand without decoding escapes, for values that are stored.
    pub fn expand(&self, src: &str) -> Result<String, RuntimeError> {
        expand::expand(src, self)
    }

    /// Store a literal value (e.g. read from a file) into a destination key,
    /// with `Set` semantics in the local scope.
    pub fn assign(&mut self, key: &str, literal: &str) -> Result<LogEntry, RuntimeError> {
        self.set_variable(key, Some(&escape(literal)), SetScope::Local)
    }

    fn read_order(&self) -> &'static [VarScope] {
        if self.config.compat.overridable_fixed_variables {
            &FIXED_LAST
        } else {
            &FIXED_FIRST
        }
    }

    // ── Logging ───────────────────────────────────────────────────────────────

    fn muted(&self) -> bool {
        self.frames.iter().any(SectionFrame::muted)
    }

    /// Record a log entry, applying `ErrorOff` windows.  An unmuted error
    /// halts the build when `stop_build_on_error` is set.
    pub fn push_log(&mut self, mut entry: LogEntry) {
        entry.depth = self.frames.len();
        if entry.state.is_mutable() && self.muted() {
            entry.state = LogState::Muted;
        }
        match entry.state {
            LogState::Error => {
                warn!(line = entry.line, depth = entry.depth, "{}", entry.message);
                if self.config.stop_build_on_error {
                    self.raise(HaltSignal::CommandHalt, BuildStatus::Failed);
                }
            }
            state => debug!(%state, line = entry.line, depth = entry.depth, "{}", entry.message),
        }
        self.logs.push(entry);
    }

    fn raise(&mut self, signal: HaltSignal, status: BuildStatus) {
        self.halt = Some(signal);
        self.status = self.status.max(status);
    }

    fn cancelled(&mut self) {
        self.raise(HaltSignal::CommandHalt, BuildStatus::Cancelled);
        let mut entry = LogEntry::new(LogState::Error, RuntimeError::Cancelled.to_string());
        entry.depth = self.frames.len();
        self.logs.push(entry);
    }

    // ── Variable writes ───────────────────────────────────────────────────────

    /// Write `value` (script-text form, `None` for `NIL`) to a `Set` key.
    pub fn set_variable(&mut self, key: &str, value: Option<&str>, scope: SetScope) -> Result<LogEntry, RuntimeError> {
        let extended = !self.config.compat.disable_extended_section_params;
        match detect_key(key).ok_or_else(|| RuntimeError::InvalidKey(key.to_owned()))? {
            VarKey::Var(name) => self.set_named(&name, value, scope),
            VarKey::InParam(n) => {
                let frame = self.frames.last_mut().ok_or_else(|| RuntimeError::msg("no active section"))?;
                let v = value.unwrap_or("NIL").to_owned();
                if frame.ins.len() < n {
                    frame.ins.resize(n, String::new());
                }
                frame.ins[n - 1] = v.clone();
                Ok(LogEntry::success(format!("Section parameter [#{n}] set to [{v}]")))
            }
            VarKey::OutParam(_) | VarKey::ReturnValue if !extended => {
                Ok(LogEntry::warning(format!("[{key}] is disabled by the compatibility option")))
            }
            VarKey::OutParam(n) => {
                let bound = self.frames.last().and_then(|f| f.outs.get(n - 1)).cloned();
                let name = bound.ok_or_else(|| RuntimeError::msg(format!("[#o{n}] is not bound to a variable")))?;
                let scope = if !self.vars.store(VarScope::Local).contains(&name)
                    && self.vars.store(VarScope::Global).contains(&name)
                {
                    SetScope::Global
                } else {
                    SetScope::Local
                };
                self.set_named(&name, Some(value.unwrap_or("NIL")), scope)
            }
            VarKey::ReturnValue => {
                self.return_value = value.unwrap_or("").to_owned();
                Ok(LogEntry::success(format!("Return value [#r] set to [{}]", self.return_value)))
            }
            VarKey::LoopCounter => {
                if !self.config.compat.overridable_loop_counter {
                    return Err(RuntimeError::msg("[#c] can only be set when OverridableLoopCounter is enabled"));
                }
                let Some(v) = value else {
                    return Ok(LogEntry::warning("Loop counter [#c] cannot be deleted"));
                };
                let frame = self.loops.last_mut().ok_or(RuntimeError::NoActiveLoop)?;
                frame.counter = match frame.mode {
                    LoopMode::Number => parse_int(v)?,
                    LoopMode::Letter => i64::from(u32::from(parse_letter(v)?)),
                };
                Ok(LogEntry::success(format!("Loop counter [#c] set to [{v}]")))
            }
        }
    }

    fn set_named(&mut self, name: &str, value: Option<&str>, scope: SetScope) -> Result<LogEntry, RuntimeError> {
        if self.vars.is_fixed(name) && !self.config.compat.overridable_fixed_variables {
            return Ok(LogEntry::warning(format!("Fixed variable [%{name}%] cannot be overwritten")));
        }
        let Some(value) = value else {
            let global = self.vars.unset(VarScope::Global, name);
            let local = self.vars.unset(VarScope::Local, name);
            if scope == SetScope::Permanent {
                self.persist_line(&format!("%{name}%"), None)?;
            }
            return Ok(match (global, local) {
                (true, _) => LogEntry::success(format!("Global variable [%{name}%] was deleted")),
                (false, true) => LogEntry::success(format!("Local variable [%{name}%] was deleted")),
                _ => LogEntry::ignore(format!("Variable [%{name}%] does not exist")),
            });
        };
        let label = match scope {
            SetScope::Local => {
                self.vars.set(VarScope::Local, name, value);
                "Local"
            }
            SetScope::Global => {
                self.vars.set(VarScope::Global, name, value);
                self.vars.unset(VarScope::Local, name);
                "Global"
            }
            SetScope::Permanent => {
                self.vars.set(VarScope::Global, name, value);
                self.vars.unset(VarScope::Local, name);
                self.persist_line(&format!("%{name}%"), Some(value))?;
                "Permanent"
            }
        };
        Ok(LogEntry::success(format!("{label} variable [%{name}%] set to [{value}]")))
    }

    /// Write (or delete) `key` in the `[Variables]` section of the running
    /// script file.
    fn persist_line(&self, key: &str, value: Option<&str>) -> Result<(), RuntimeError> {
        let path = self
            .current_script()
            .map(|s| s.path.clone())
            .ok_or_else(|| RuntimeError::msg("no script to persist into"))?;
        let mut doc = IniDocument::load(&path).map_err(|e| RuntimeError::io(&path, e))?;
        match value {
            Some(v) => {
                doc.set(VARIABLES_SECTION, key, v);
            }
            None => {
                doc.delete(VARIABLES_SECTION, key);
            }
        }
        doc.save(&path).map_err(|e| RuntimeError::io(&path, e))
    }

    fn parse_options(&self) -> ParseOptions<'static> {
        ParseOptions { compat: self.config.compat, macro_lookup: None }
    }
}

impl ExpandContext for InterpreterContext {
    fn var(&self, name: &str) -> Option<String> {
        self.variable(name)
    }

    fn in_param(&self, n: usize) -> Option<String> {
        self.frames.last()?.ins.get(n.checked_sub(1)?).cloned()
    }

    fn in_param_count(&self) -> usize {
        self.frames.last().map_or(0, |f| f.ins.len())
    }

    fn out_param(&self, n: usize) -> Option<String> {
        let name = self.frames.last()?.outs.get(n.checked_sub(1)?)?;
        Some(self.variable(name).unwrap_or_default())
    }

    fn out_param_count(&self) -> usize {
        self.frames.last().map_or(0, |f| f.outs.len())
    }

    fn return_value(&self) -> String {
        self.return_value.clone()
    }

    fn loop_counter(&self) -> Option<String> {
        self.loops.last().map(LoopFrame::counter_text)
    }

    fn at_entry_section(&self) -> bool {
        self.frames.last().is_some_and(|f| f.entry)
    }

    fn compat(&self) -> CompatFlags {
        self.config.compat
    }

    fn expansion_limit(&self) -> usize {
        self.config.expansion_limit
    }
}

struct CondView<'c> {
    ctx: &'c InterpreterContext,
    probe: &'c dyn ResourceProbe,
}

impl CondEnv for CondView<'_> {
    fn probe(&self) -> &dyn ResourceProbe {
        self.probe
    }

    fn var_exists(&self, name: &str) -> bool {
        self.ctx.vars.contains(name)
    }

    fn macro_exists(&self, name: &str) -> bool {
        self.ctx.macros.contains(name)
    }
}

// ── Interpreter ───────────────────────────────────────────────────────────────

/// Runs scripts against an executor and a resource probe.
pub struct Interpreter<'a> {
    ctx: InterpreterContext,
    executor: &'a mut dyn Executor,
    probe: &'a dyn ResourceProbe,
    scripts: HashMap<PathBuf, Arc<Script>>,
}

impl<'a> Interpreter<'a> {
    pub fn new(config: Config, executor: &'a mut dyn Executor, probe: &'a dyn ResourceProbe) -> Self {
        Interpreter { ctx: InterpreterContext::new(config), executor, probe, scripts: HashMap::new() }
    }

    /// Define a host-provided, read-only variable.
    pub fn set_fixed(&mut self, name: &str, value: impl Into<String>) {
        self.ctx.vars.set(VarScope::Fixed, name, value);
    }

    /// Flag that stops the build at the next statement when set.
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.ctx.cancel)
    }

    pub fn set_cancel_handle(&mut self, flag: Arc<AtomicBool>) {
        self.ctx.cancel = flag;
    }

    /// Run the entry section of each script in turn.  `Exit` moves on to the
    /// next script; `Halt`, an unmuted error or cancellation stops the build.
    pub fn run_build(&mut self, paths: &[PathBuf]) -> Result<BuildReport, EngineError> {
        let mut status = BuildStatus::Finished;
        for path in paths {
            let script = Arc::new(Script::load(path)?);
            status = status.max(self.run_one(script)?);
            if status >= BuildStatus::Halted {
                break;
            }
        }
        info!(?status, logs = self.ctx.logs.len(), "build finished");
        Ok(self.take_report(status))
    }

    /// Run one already loaded script.
    pub fn run_script(&mut self, script: Script) -> Result<BuildReport, EngineError> {
        let status = self.run_one(Arc::new(script))?;
        Ok(self.take_report(status))
    }

    fn take_report(&mut self, status: BuildStatus) -> BuildReport {
        self.ctx.status = BuildStatus::Finished;
        BuildReport { status, logs: std::mem::take(&mut self.ctx.logs) }
    }

    fn run_one(&mut self, script: Arc<Script>) -> Result<BuildStatus, EngineError> {
        let entry = self.ctx.config.entry_section.clone();
        let path = script.display_path();
        if script.section(&entry).is_none() {
            return Err(EngineError::MissingEntry { path, section: entry });
        }
        self.scripts.insert(script.path.clone(), Arc::clone(&script));

        self.ctx.vars.replace_local(VarStore::new());
        self.ctx.macros.clear_local();
        self.ctx.return_value.clear();
        self.ctx.halt = None;
        self.ctx.status = BuildStatus::Finished;
        self.set_fixed("ScriptFile", path.clone());
        self.set_fixed("ScriptDir", script.dir().display().to_string());
        self.load_script_declarations(&script);

        let body = match self.section_body(&script, &entry) {
            Some(Ok(body)) => body,
            Some(Err(errors)) => return Err(EngineError::Parse { path, errors }),
            None => return Err(EngineError::MissingEntry { path, section: entry }),
        };

        info!(script = %path, section = %entry, "running script");
        self.ctx.push_log(LogEntry::new(LogState::Info, format!("Processing [{path}] section [{entry}]")));
        if let Err(e) = self.call_block(script, &entry, Vec::new(), Vec::new(), true, &body) {
            self.ctx.push_log(LogEntry::new(LogState::Error, e.to_string()));
        }

        if self.ctx.halt == Some(HaltSignal::ScriptHalt) {
            self.ctx.status = self.ctx.status.max(BuildStatus::Exited);
        }
        if self.ctx.halt == Some(HaltSignal::CommandHalt) {
            self.ctx.status = self.ctx.status.max(BuildStatus::Halted);
        }
        self.ctx.halt = None;
        Ok(self.ctx.status)
    }

    /// Global variables and macros declared by a script.
    fn load_script_declarations(&mut self, script: &Script) {
        let opts = self.ctx.parse_options();
        let (vars, var_macros) = script.declarations(VARIABLES_SECTION);
        for decl in vars {
            if !self.ctx.vars.is_fixed(&decl.key) {
                self.ctx.vars.set(VarScope::Global, &decl.key, decl.value);
            }
        }
        let (_, api) = script.declarations(&self.ctx.config.macro_section);
        let mut errors = self.ctx.macros.load(MacroScope::Global, &api, &opts);
        errors.extend(self.ctx.macros.load(MacroScope::Global, &var_macros, &opts));
        for e in errors {
            self.ctx.push_log(LogEntry::warning(format!("Macro ignored: {e}")));
        }
    }

    /// Parsed body of `name`, `None` if the section does not exist.
    fn section_body(&self, script: &Script, name: &str) -> Option<ParsedSection> {
        let section = script.section(name)?;
        let macros = &self.ctx.macros;
        let known: &dyn Fn(&str) -> bool = &|n: &str| macros.contains(n);
        let opts = ParseOptions {
            compat: self.ctx.config.compat,
            macro_lookup: if script.can_define_macros() { None } else { Some(known) },
        };
        Some(section.commands(&opts, self.ctx.config.optimize_code))
    }

    // ── Blocks ────────────────────────────────────────────────────────────────

    /// Push a section frame, run `body`, pop the frame.
    fn call_block(
        &mut self,
        script: Arc<Script>,
        section: &str,
        ins: Vec<String>,
        outs: Vec<String>,
        entry: bool,
        body: &[Command],
    ) -> Result<(), RuntimeError> {
        if self.ctx.frames.len() >= MAX_CALL_DEPTH {
            return Err(RuntimeError::msg(format!("section calls nested deeper than {MAX_CALL_DEPTH}")));
        }
        debug!(section, depth = self.ctx.frames.len() + 1, params = ins.len(), "enter section");
        self.ctx.frames.push(SectionFrame::new(script, section, ins, outs, entry));
        self.ctx.return_value.clear();
        self.exec_block(body);

        if let Some(frame) = self.ctx.frames.pop() {
            if let Some((outer, _)) = frame.saved_locals.into_iter().next() {
                self.ctx.vars.replace_local(outer);
                self.ctx.push_log(LogEntry::warning(format!(
                    "[System,SetLocal] in section [{}] was not closed by [System,EndLocal]",
                    frame.section
                )));
            }
        }
        if self.ctx.halt == Some(HaltSignal::SectionReturn) {
            self.ctx.halt = None;
        }
        Ok(())
    }

    /// Run statements until the block ends or a signal is pending.
    fn exec_block(&mut self, cmds: &[Command]) {
        for cmd in cmds {
            if self.ctx.halt.is_some() {
                break;
            }
            if self.ctx.is_cancelled() {
                self.ctx.cancelled();
                break;
            }
            self.set_line(cmd.line);
            if let Err(e) = self.exec_stmt(cmd) {
                if e == RuntimeError::Cancelled {
                    self.ctx.cancelled();
                } else {
                    self.ctx.push_log(LogEntry::new(LogState::Error, e.to_string()).at(cmd));
                }
            }
        }
    }

    fn set_line(&mut self, line: usize) {
        if let Some(frame) = self.ctx.frames.last_mut() {
            frame.current_line = line;
        }
    }

    /// Report a failed batch member at its own line, then run the members
    /// after it one by one, as if the batch had never been formed.
    fn resume_batch(&mut self, cmd: &Command, failure: MemberFailure) -> Result<(), RuntimeError> {
        let members = match &cmd.info {
            CommandInfo::Batch(members) => members.as_slice(),
            _ => std::slice::from_ref(cmd),
        };
        let Some(member) = members.get(failure.index) else { return Err(failure.error) };
        self.set_line(member.line);
        if failure.error == RuntimeError::Cancelled {
            return Err(failure.error);
        }
        debug!(line = member.line, index = failure.index, "batch member failed");
        self.ctx.push_log(LogEntry::new(LogState::Error, failure.error.to_string()).at(member));
        self.exec_block(&members[failure.index + 1..]);
        Ok(())
    }

    fn log(&mut self, cmd: &Command, entry: LogEntry) {
        self.ctx.push_log(entry.at(cmd));
    }

    fn exec_stmt(&mut self, cmd: &Command) -> Result<(), RuntimeError> {
        match &cmd.info {
            CommandInfo::If { cond, body, else_body } => {
                let taken = self.eval_condition(cond)?;
                debug!(line = cmd.line, taken, "branch");
                if taken {
                    self.exec_block(body);
                } else if let Some(else_body) = else_body {
                    self.exec_block(else_body);
                }
                Ok(())
            }
            CommandInfo::Else { .. } | CommandInfo::Begin | CommandInfo::End => {
                Err(RuntimeError::msg(format!("[{}] is not attached to a block", cmd.kind)))
            }

            CommandInfo::ForRange { start, end, step, body } => {
                let start_v = parse_int(&self.ctx.preprocess(start)?)?;
                let end_v = parse_int(&self.ctx.preprocess(end)?)?;
                let step_v = parse_int(&self.ctx.preprocess(step)?)?;
                if step_v == 0 || (start_v < end_v && step_v < 0) || (start_v > end_v && step_v > 0) {
                    return Err(RuntimeError::InvalidStep {
                        start: start_v.to_string(),
                        end: end_v.to_string(),
                        step: step_v.to_string(),
                    });
                }
                let frame = LoopFrame { mode: LoopMode::Number, counter: start_v, step: step_v, end: end_v };
                self.run_loop(frame, |this| {
                    this.exec_block(body);
                    Ok(())
                })
            }
            CommandInfo::ForLetter { start, end, body } => {
                let (start_v, end_v) = letter_range(&self.ctx.preprocess(start)?, &self.ctx.preprocess(end)?)?;
                let step = if start_v <= end_v { 1 } else { -1 };
                let frame = LoopFrame { mode: LoopMode::Letter, counter: start_v, step, end: end_v };
                self.run_loop(frame, |this| {
                    this.exec_block(body);
                    Ok(())
                })
            }
            CommandInfo::Break => self.loop_signal(HaltSignal::LoopBreak, "[Break]"),
            CommandInfo::Continue => self.loop_signal(HaltSignal::LoopContinue, "[Continue]"),
            CommandInfo::LoopBreak => self.loop_signal(HaltSignal::LoopBreak, "[Loop,BREAK]"),

            CommandInfo::Run { script, section, params, isolate } => {
                let ins = self.expand_all(&params.ins)?;
                self.call_section(script, section, ins, &params.outs, *isolate)
            }
            CommandInfo::Loop { mode, script, section, start, end, params } => {
                self.exec_loop(*mode, script, section, start, end, params)
            }

            CommandInfo::Set { key, value, scope } => {
                let expanded = self.ctx.expand(value)?;
                let value = (!expanded.trim().eq_ignore_ascii_case("NIL")).then_some(expanded.as_str());
                let entry = self.ctx.set_variable(key, value, *scope)?;
                self.log(cmd, entry);
                Ok(())
            }
            CommandInfo::SetMacro { name, body, scope } => self.set_macro(cmd, name, body, *scope),
            CommandInfo::AddVariables { script, section, global } => {
                let target = self.resolve_script(&self.ctx.preprocess(script)?)?;
                let section = self.ctx.preprocess(section)?;
                if target.section(&section).is_none() {
                    return Err(RuntimeError::SectionNotFound { script: target.display_path(), section });
                }
                let scope = if *global { (VarScope::Global, MacroScope::Global) } else { (VarScope::Local, MacroScope::Local) };
                let (vars, macros) = self.add_declarations(cmd, &target, &section, scope)?;
                self.log(cmd, LogEntry::success(format!("Added {vars} variable(s) and {macros} macro(s) from [{section}]")));
                Ok(())
            }

            CommandInfo::Exit { message, nowarn } => {
                let text = match message {
                    Some(m) => self.ctx.preprocess(m)?,
                    None => "Script exited".to_owned(),
                };
                let state = if *nowarn { LogState::Info } else { LogState::Warning };
                self.log(cmd, LogEntry::new(state, text));
                self.ctx.raise(HaltSignal::ScriptHalt, BuildStatus::Exited);
                Ok(())
            }
            CommandInfo::Halt { message } => {
                let text = match message {
                    Some(m) => self.ctx.preprocess(m)?,
                    None => "Build halted".to_owned(),
                };
                self.log(cmd, LogEntry::warning(text));
                self.ctx.raise(HaltSignal::CommandHalt, BuildStatus::Halted);
                Ok(())
            }
            CommandInfo::Return { value } => {
                if let Some(v) = value {
                    self.ctx.return_value = self.ctx.expand(v)?;
                }
                self.ctx.raise(HaltSignal::SectionReturn, BuildStatus::Finished);
                Ok(())
            }

            CommandInfo::System(SystemOp::ErrorOff(lines)) => {
                let n = match lines {
                    Some(l) => usize::try_from(parse_int(&self.ctx.preprocess(l)?)?)
                        .map_err(|_| RuntimeError::InvalidInteger(l.clone()))?,
                    None => 1,
                };
                if let Some(frame) = self.ctx.frames.last_mut() {
                    frame.error_off = (n > 0).then_some((cmd.line + 1, cmd.line + n));
                }
                self.log(cmd, LogEntry::success(format!("Errors of the next {n} line(s) are muted")));
                Ok(())
            }
            CommandInfo::System(SystemOp::SetLocal) => {
                let snapshot = (self.ctx.vars.store(VarScope::Local).clone(), self.ctx.return_value.clone());
                let frame = self.ctx.frames.last_mut().ok_or_else(|| RuntimeError::msg("no active section"))?;
                frame.saved_locals.push(snapshot);
                self.log(cmd, LogEntry::success("Local variables saved"));
                Ok(())
            }
            CommandInfo::System(SystemOp::EndLocal) => {
                let saved = self.ctx.frames.last_mut().and_then(|f| f.saved_locals.pop());
                let (locals, return_value) = saved.ok_or(RuntimeError::UnmatchedEndLocal)?;
                self.ctx.vars.replace_local(locals);
                self.ctx.return_value = return_value;
                self.log(cmd, LogEntry::success("Local variables restored"));
                Ok(())
            }

            CommandInfo::Macro { name } => self.invoke_macro(cmd, name),

            CommandInfo::System(SystemOp::Other) | CommandInfo::Plain | CommandInfo::Batch(_) => {
                let result: ExecResult = self.executor.execute(cmd, &mut self.ctx)?;
                for entry in result.logs {
                    if entry.line > 0 {
                        self.set_line(entry.line);
                    }
                    self.log(cmd, entry);
                }
                match result.signal {
                    Some(HaltSignal::CommandHalt) => self.ctx.raise(HaltSignal::CommandHalt, BuildStatus::Halted),
                    Some(HaltSignal::ScriptHalt) => self.ctx.raise(HaltSignal::ScriptHalt, BuildStatus::Exited),
                    Some(signal) => self.ctx.halt = Some(signal),
                    None => {}
                }
                match result.failed {
                    Some(failure) => self.resume_batch(cmd, failure),
                    None => Ok(()),
                }
            }
        }
    }

    fn eval_condition(&self, cond: &BranchCondition) -> Result<bool, RuntimeError> {
        let operands = if cond.kind == CondKind::ExistVar {
            cond.operands.clone()
        } else {
            self.ctx.preprocess_all(&cond.operands)?
        };
        let view = CondView { ctx: &self.ctx, probe: self.probe };
        cond::evaluate(cond, &operands, &view)
    }

    fn expand_all(&self, args: &[String]) -> Result<Vec<String>, RuntimeError> {
        args.iter().map(|a| self.ctx.expand(a)).collect()
    }

    // ── Loops ─────────────────────────────────────────────────────────────────

    fn loop_signal(&mut self, signal: HaltSignal, what: &'static str) -> Result<(), RuntimeError> {
        if self.ctx.loops.is_empty() {
            return Err(RuntimeError::OutsideLoop(what));
        }
        self.ctx.halt = Some(signal);
        Ok(())
    }

    /// Iterate `frame`, calling `body` once per counter value.  The counter
    /// is re-read after each iteration, so `Set,#c` steers the loop.
    fn run_loop(
        &mut self,
        frame: LoopFrame,
        mut body: impl FnMut(&mut Self) -> Result<(), RuntimeError>,
    ) -> Result<(), RuntimeError> {
        self.ctx.loops.push(frame);
        let result = loop {
            if !self.ctx.loops.last().is_some_and(LoopFrame::in_range) {
                break Ok(());
            }
            if let Err(e) = body(self) {
                break Err(e);
            }
            match self.ctx.halt {
                Some(HaltSignal::LoopBreak) => {
                    self.ctx.halt = None;
                    break Ok(());
                }
                Some(HaltSignal::LoopContinue) => self.ctx.halt = None,
                Some(_) => break Ok(()),
                None => {}
            }
            let advanced = self.ctx.loops.last_mut().is_some_and(|f| match f.counter.checked_add(f.step) {
                Some(next) => {
                    f.counter = next;
                    true
                }
                None => false,
            });
            if !advanced {
                break Ok(());
            }
        };
        self.ctx.loops.pop();
        result
    }

    fn exec_loop(
        &mut self,
        mode: LoopMode,
        script: &str,
        section: &str,
        start: &str,
        end: &str,
        params: &CallParams,
    ) -> Result<(), RuntimeError> {
        let start_s = self.ctx.preprocess(start)?;
        let end_s = self.ctx.preprocess(end)?;
        let letters = self.ctx.config.compat.allow_letter_loop_counters;
        let (mode, start_v, end_v) = match mode {
            LoopMode::Number => match (parse_int(&start_s), parse_int(&end_s)) {
                (Ok(a), Ok(b)) => (LoopMode::Number, a, b),
                (Err(e), _) | (_, Err(e)) if !letters => return Err(e),
                (Err(e), _) | (_, Err(e)) => match letter_range(&start_s, &end_s) {
                    Ok((a, b)) => (LoopMode::Letter, a, b),
                    Err(RuntimeError::InvalidLetter(_)) => return Err(e),
                    Err(other) => return Err(other),
                },
            },
            LoopMode::Letter => {
                let (a, b) = letter_range(&start_s, &end_s)?;
                (LoopMode::Letter, a, b)
            }
        };
        if start_v > end_v {
            return Err(RuntimeError::InvalidStep { start: start_s, end: end_s, step: "1".to_owned() });
        }
        let frame = LoopFrame { mode, counter: start_v, step: 1, end: end_v };
        self.run_loop(frame, |this| {
            let ins = this.expand_all(&params.ins)?;
            this.call_section(script, section, ins, &params.outs, false)
        })
    }

    // ── Section calls ─────────────────────────────────────────────────────────

    fn call_section(
        &mut self,
        script: &str,
        section: &str,
        ins: Vec<String>,
        outs: &[String],
        isolate: bool,
    ) -> Result<(), RuntimeError> {
        let target = self.resolve_script(&self.ctx.preprocess(script)?)?;
        let section = self.ctx.preprocess(section)?;
        let outs = outs
            .iter()
            .map(|o| trim_percent(o.trim()).map(str::to_owned).ok_or_else(|| RuntimeError::InvalidKey(o.clone())))
            .collect::<Result<Vec<_>, _>>()?;

        let body = match self.section_body(&target, &section) {
            Some(Ok(body)) => body,
            Some(Err(errors)) => {
                let first =
                    errors.into_iter().next().unwrap_or_else(|| ParseError::new(0, "unknown parse error", ""));
                return Err(RuntimeError::SectionParse { section, first });
            }
            None => return Err(RuntimeError::SectionNotFound { script: target.display_path(), section }),
        };

        if !isolate {
            return self.call_block(target, &section, ins, outs, false, &body);
        }

        let saved_vars = self.ctx.vars.replace_local(VarStore::new());
        let saved_macros = self.ctx.macros.replace_local(HashMap::new());
        let (vars, _) = target.declarations(VARIABLES_SECTION);
        for decl in vars {
            self.ctx.vars.set(VarScope::Local, &decl.key, decl.value);
        }
        let result = self.call_block(target, &section, ins, outs, false, &body);
        self.ctx.vars.replace_local(saved_vars);
        self.ctx.macros.replace_local(saved_macros);
        result
    }

    /// Find a script by the path a statement names.  The running script
    /// matches its own path; relative paths are tried against the running
    /// script's directory.
    fn resolve_script(&mut self, name: &str) -> Result<Arc<Script>, RuntimeError> {
        let name = name.trim();
        if let Some(current) = self.ctx.current_script() {
            if current.display_path().eq_ignore_ascii_case(name) {
                return Ok(Arc::clone(current));
            }
        }
        let direct = PathBuf::from(name);
        let path = match self.ctx.current_script() {
            Some(cur) if direct.is_relative() && !direct.exists() => cur.dir().join(&direct),
            _ => direct,
        };
        if let Some(script) = self.scripts.get(&path) {
            return Ok(Arc::clone(script));
        }
        let script = Arc::new(Script::load(&path).map_err(|_| RuntimeError::ScriptNotFound(name.to_owned()))?);
        self.scripts.insert(path, Arc::clone(&script));
        Ok(script)
    }

    // ── Macros ────────────────────────────────────────────────────────────────

    fn invoke_macro(&mut self, cmd: &Command, name: &str) -> Result<(), RuntimeError> {
        let entry = self.ctx.macros.get(name).cloned().ok_or_else(|| RuntimeError::UnknownMacro(name.to_owned()))?;
        let args = self.expand_all(&cmd.args)?;
        debug!(name, args = args.len(), "invoke macro");
        if let CommandInfo::Run { script, section, isolate, .. } = &entry.body.info {
            // The invocation arguments replace the body's own parameters.
            return self.call_section(script, section, args, &[], *isolate);
        }
        let script = self
            .ctx
            .current_script()
            .cloned()
            .ok_or_else(|| RuntimeError::msg(format!("macro [{name}] invoked outside a script")))?;
        self.call_block(script, name, args, Vec::new(), false, std::slice::from_ref(&entry.body))
    }

    fn set_macro(&mut self, cmd: &Command, name: &str, body: &str, scope: SetScope) -> Result<(), RuntimeError> {
        let macro_scope = match scope {
            SetScope::Local => MacroScope::Local,
            SetScope::Global | SetScope::Permanent => MacroScope::Global,
        };
        if body.trim().eq_ignore_ascii_case("NIL") {
            let removed = self.ctx.macros.remove(macro_scope, name);
            if scope == SetScope::Permanent {
                self.ctx.persist_line(name, None)?;
            }
            let entry = if removed {
                LogEntry::success(format!("Macro [{name}] deleted"))
            } else {
                LogEntry::ignore(format!("Macro [{name}] does not exist"))
            };
            self.log(cmd, entry);
            return Ok(());
        }
        let opts = self.ctx.parse_options();
        let entry = MacroEntry::parse(name, body, cmd.line, &opts).map_err(|e| RuntimeError::msg(e.message))?;
        self.ctx.macros.insert(macro_scope, entry);
        if scope == SetScope::Permanent {
            self.ctx.persist_line(name, Some(body))?;
        }
        self.log(cmd, LogEntry::success(format!("Macro [{name}] set to [{body}]")));
        Ok(())
    }

    /// Load the `%Var%=` and `Name=` lines of `section` into the given scopes.
    fn add_declarations(
        &mut self,
        cmd: &Command,
        script: &Script,
        section: &str,
        (var_scope, macro_scope): (VarScope, MacroScope),
    ) -> Result<(usize, usize), RuntimeError> {
        let (vars, macros) = script.declarations(section);
        let mut count = 0;
        for decl in &vars {
            if self.ctx.vars.is_fixed(&decl.key) && !self.ctx.config.compat.overridable_fixed_variables {
                self.log(cmd, LogEntry::warning(format!("Fixed variable [%{}%] cannot be overwritten", decl.key)));
                continue;
            }
            let value = self.ctx.expand(&decl.value)?;
            self.ctx.vars.set(var_scope, &decl.key, value);
            if var_scope == VarScope::Global {
                self.ctx.vars.unset(VarScope::Local, &decl.key);
            }
            count += 1;
        }
        let opts = self.ctx.parse_options();
        let errors = self.ctx.macros.load(macro_scope, &macros, &opts);
        let loaded = macros.len() - errors.len();
        for e in errors {
            self.log(cmd, LogEntry::warning(format!("Macro ignored: {e}")));
        }
        Ok((count, loaded))
    }
}

/// Parse every code section of `script` the way a run would, with the
/// macros the script declares, and return `(section, error)` pairs.
pub fn check_script(script: &Script, config: &Config) -> Vec<(String, ParseError)> {
    let base = ParseOptions { compat: config.compat, macro_lookup: None };
    let mut macros = MacroStore::new();
    let (_, var_macros) = script.declarations(VARIABLES_SECTION);
    let (_, api) = script.declarations(&config.macro_section);
    let mut errors: Vec<(String, ParseError)> = Vec::new();
    for (section, decls) in [(config.macro_section.as_str(), &api), (VARIABLES_SECTION, &var_macros)] {
        let bad = macros.load(MacroScope::Global, decls, &base);
        errors.extend(bad.into_iter().map(|e| (section.to_owned(), e)));
    }
    let known: &dyn Fn(&str) -> bool = &|n: &str| macros.contains(n);
    let opts = ParseOptions {
        compat: config.compat,
        macro_lookup: if script.can_define_macros() { None } else { Some(known) },
    };
    errors.extend(script.check(&config.macro_section, &opts));
    errors
}

// ── Helpers ───────────────────────────────────────────────────────────────────

fn parse_int(s: &str) -> Result<i64, RuntimeError> {
    let t = s.trim();
    let parsed = match t.strip_prefix("0x").or_else(|| t.strip_prefix("0X")) {
        Some(hex) => i64::from_str_radix(hex, 16).ok(),
        None => t.parse().ok(),
    };
    parsed.ok_or_else(|| RuntimeError::InvalidInteger(s.to_owned()))
}

fn parse_letter(s: &str) -> Result<char, RuntimeError> {
    let mut chars = s.trim().chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) if c.is_ascii_alphabetic() => Ok(c),
        _ => Err(RuntimeError::InvalidLetter(s.to_owned())),
    }
}

/// Bounds of a letter loop as character codes.  Both letters must share a
/// case, so the range never crosses the punctuation between `Z` and `a`.
fn letter_range(start: &str, end: &str) -> Result<(i64, i64), RuntimeError> {
    let (a, b) = (parse_letter(start)?, parse_letter(end)?);
    if a.is_ascii_uppercase() != b.is_ascii_uppercase() {
        return Err(RuntimeError::MixedLetterCase { start: a, end: b });
    }
    Ok((i64::from(u32::from(a)), i64::from(u32::from(b))))
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LookupError;
    use crate::fs_executor::{FsExecutor, FsProbe};

    /// Records every executed command; `Echo` logs its expanded argument.
    #[derive(Default)]
    struct Recorder {
        echoed: Vec<String>,
    }

    impl Executor for Recorder {
        fn execute(&mut self, cmd: &Command, ctx: &mut InterpreterContext) -> Result<ExecResult, RuntimeError> {
            match cmd.kind {
                crate::script::command::CommandKind::Echo => {
                    let text = ctx.preprocess(cmd.arg(0))?;
                    self.echoed.push(text.clone());
                    Ok(ExecResult::one(LogEntry::success(text)))
                }
                crate::script::command::CommandKind::Message => Err(RuntimeError::msg("boom")),
                _ => Err(RuntimeError::Unsupported(cmd.kind.to_string())),
            }
        }
    }

    struct NoProbe;

    impl ResourceProbe for NoProbe {
        fn file_exists(&self, _: &str) -> Result<bool, LookupError> {
            Ok(false)
        }
        fn dir_exists(&self, _: &str) -> Result<bool, LookupError> {
            Ok(false)
        }
        fn ini_section_exists(&self, _: &str, _: &str) -> Result<bool, LookupError> {
            Ok(false)
        }
    }

    fn run_with(config: Config, text: &str) -> (BuildReport, Vec<String>) {
        let mut rec = Recorder::default();
        let probe = NoProbe;
        let report = {
            let mut interp = Interpreter::new(config, &mut rec, &probe);
            interp.run_script(Script::parse("test.script", text)).expect("run")
        };
        (report, rec.echoed)
    }

    fn run(text: &str) -> (BuildReport, Vec<String>) {
        run_with(Config::default(), text)
    }

    #[test]
    fn leading_zeros_compare_numerically() {
        let (_, out) = run("[Process]\nSet,%A%,0012\nIf,%A%,Equal,12,Echo,yes\nElse,Echo,no\n");
        assert_eq!(out, vec!["yes"]);
    }

    #[test]
    fn for_range_counts_inclusive() {
        let (_, out) = run("[Process]\nForRange,1,3,1,Echo,#c\nForRange,3,1,-1,Echo,#c\n");
        assert_eq!(out, vec!["1", "2", "3", "3", "2", "1"]);
    }

    #[test]
    fn wrong_sign_step_is_an_error() {
        let (report, out) = run("[Process]\nForRange,1,3,-1,Echo,#c\n");
        assert!(out.is_empty());
        assert_eq!(report.status, BuildStatus::Failed);
    }

    #[test]
    fn nested_loops_see_innermost_counter() {
        let src = "[Process]\nForRange,1,2,1,Begin\nEcho,o#c\nForLetter,A,B,Echo,i#c\nEcho,o#c\nEnd\n";
        let (_, out) = run(src);
        assert_eq!(out, vec!["o1", "iA", "iB", "o1", "o2", "iA", "iB", "o2"]);
    }

    #[test]
    fn break_and_continue() {
        let src = "[Process]\nForRange,1,5,1,Begin\nIf,#c,Equal,2,Continue\nIf,#c,Equal,4,Break\nEcho,#c\nEnd\n";
        let (_, out) = run(src);
        assert_eq!(out, vec!["1", "3"]);
    }

    #[test]
    fn break_outside_loop_fails() {
        let (report, _) = run("[Process]\nBreak\n");
        assert_eq!(report.status, BuildStatus::Failed);
        assert!(report.with_state(LogState::Error).any(|l| l.message.contains("not running inside a loop")));
    }

    #[test]
    fn loop_calls_section_with_counter() {
        let src = "[Process]\nLoop,%ScriptFile%,Body,1,3,x\n[Body]\nEcho,#1#c\n";
        let (_, out) = run(src);
        assert_eq!(out, vec!["x1", "x2", "x3"]);
    }

    #[test]
    fn run_passes_params_and_return_value() {
        let src = "[Process]\nRun,%ScriptFile%,Sub,a,b\nEcho,#r\n[Sub]\nEcho,#1-#2-#a\nReturn,done\nEcho,unreachable\n";
        let (_, out) = run(src);
        assert_eq!(out, vec!["a-b-2", "done"]);
    }

    #[test]
    fn out_params_write_through() {
        let src = "[Process]\nRunEx,%ScriptFile%,Sub,In=5,Out=%R%\nEcho,%R%\n[Sub]\nSet,#o1,#1#1\n";
        let (_, out) = run(src);
        assert_eq!(out, vec!["55"]);
    }

    #[test]
    fn exit_stops_script_only() {
        let (report, out) = run("[Process]\nEcho,a\nExit,bye\nEcho,b\n");
        assert_eq!(out, vec!["a"]);
        assert_eq!(report.status, BuildStatus::Exited);
    }

    #[test]
    fn halt_stops_build() {
        let (report, out) = run("[Process]\nRun,%ScriptFile%,Sub\nEcho,after\n[Sub]\nHalt,stop\n");
        assert!(out.is_empty());
        assert_eq!(report.status, BuildStatus::Halted);
    }

    #[test]
    fn error_off_mutes_next_lines() {
        let src = "[Process]\nSystem,ErrorOff,2\nMessage,x\nMessage,y\nEcho,ok\n";
        let (report, out) = run(src);
        assert_eq!(out, vec!["ok"]);
        assert_eq!(report.with_state(LogState::Muted).count(), 2);
        assert_eq!(report.status, BuildStatus::Finished);
    }

    #[test]
    fn error_off_window_ends() {
        let (report, out) = run("[Process]\nSystem,ErrorOff\nMessage,x\nMessage,y\nEcho,never\n");
        assert!(out.is_empty());
        assert_eq!(report.with_state(LogState::Muted).count(), 1);
        assert_eq!(report.status, BuildStatus::Failed);
    }

    #[test]
    fn continue_on_error_when_configured() {
        let config = Config { stop_build_on_error: false, ..Config::default() };
        let (report, out) = run_with(config, "[Process]\nMessage,x\nEcho,next\n");
        assert_eq!(out, vec!["next"]);
        assert_eq!(report.with_state(LogState::Error).count(), 1);
    }

    #[test]
    fn set_local_restores() {
        let src = "[Process]\nSet,%A%,1\nSystem,SetLocal\nSet,%A%,2\nEcho,%A%\nSystem,EndLocal\nEcho,%A%\n";
        let (_, out) = run(src);
        assert_eq!(out, vec!["2", "1"]);
    }

    #[test]
    fn unmatched_end_local_is_an_error() {
        let (report, _) = run("[Process]\nSystem,EndLocal\n");
        assert!(report.with_state(LogState::Error).any(|l| l.message.contains("EndLocal")));
    }

    #[test]
    fn global_and_nil() {
        let src = "[Process]\nSet,%G%,1,GLOBAL\nSet,%G%,NIL\nIf,ExistVar,%G%,Echo,still\nElse,Echo,gone\n";
        let (_, out) = run(src);
        assert_eq!(out, vec!["gone"]);
    }

    #[test]
    fn fixed_variables_are_protected() {
        let (report, out) = run("[Process]\nSet,%ScriptFile%,x\nEcho,%ScriptFile%\n");
        assert_eq!(out, vec!["test.script"]);
        assert_eq!(report.with_state(LogState::Warning).count(), 1);
    }

    #[test]
    fn escapes_decode_once() {
        let (_, out) = run("[Process]\nSet,%A%,#$pB#$p\nSet,%B%,wrong\nEcho,%A%\n");
        assert_eq!(out, vec!["%B%"]);
    }

    #[test]
    fn local_macro_shadows_global() {
        let src = "[Variables]\nSay=Echo,global\n[Process]\nSay\nSetMacro,Say,\"Echo,local #1\"\nSay,x\nSetMacro,Say,NIL\nSay\n";
        let (_, out) = run(src);
        assert_eq!(out, vec!["global", "local x", "global"]);
    }

    #[test]
    fn macro_wrapping_run_gets_arguments() {
        let src = "[ApiVar]\nCall=Run,%ScriptFile%,Sub\n[Process]\nCall,one,two\n[Sub]\nEcho,#1+#2\n";
        let (_, out) = run(src);
        assert_eq!(out, vec!["one+two"]);
    }

    #[test]
    fn unknown_macro_without_definers_is_parse_error() {
        let mut rec = Recorder::default();
        let probe = NoProbe;
        let mut interp = Interpreter::new(Config::default(), &mut rec, &probe);
        let err = interp.run_script(Script::parse("t", "[Process]\nNoSuchThing,1\n")).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn missing_entry_section() {
        let mut rec = Recorder::default();
        let probe = NoProbe;
        let mut interp = Interpreter::new(Config::default(), &mut rec, &probe);
        let err = interp.run_script(Script::parse("t", "[Other]\nEcho,x\n")).unwrap_err();
        assert!(matches!(err, EngineError::MissingEntry { .. }));
    }

    #[test]
    fn cancellation_stops_before_next_statement() {
        let mut rec = Recorder::default();
        let probe = NoProbe;
        let mut interp = Interpreter::new(Config::default(), &mut rec, &probe);
        interp.cancel_handle().store(true, Ordering::Relaxed);
        let report = interp.run_script(Script::parse("t", "[Process]\nEcho,x\n")).unwrap();
        assert_eq!(report.status, BuildStatus::Cancelled);
        drop(interp);
        assert!(rec.echoed.is_empty());
    }

    #[test]
    fn loop_counter_override() {
        let config = Config {
            compat: CompatFlags { overridable_loop_counter: true, ..CompatFlags::default() },
            ..Config::default()
        };
        let (_, out) = run_with(config, "[Process]\nForRange,1,9,1,Begin\nEcho,#c\nIf,#c,Equal,1,Set,#c,8\nEnd\n");
        assert_eq!(out, vec!["1", "9"]);
        let (report, _) = run("[Process]\nForRange,1,3,1,Set,#c,8\n");
        assert_eq!(report.status, BuildStatus::Failed);
    }

    #[test]
    fn letter_loop_compat() {
        let src = "[Process]\nLoop,%ScriptFile%,Body,C,E\n[Body]\nEcho,#c\n";
        let (report, _) = run(src);
        assert_eq!(report.status, BuildStatus::Failed);
        let config = Config {
            compat: CompatFlags { allow_letter_loop_counters: true, ..CompatFlags::default() },
            ..Config::default()
        };
        let (_, out) = run_with(config, src);
        assert_eq!(out, vec!["C", "D", "E"]);
    }

    #[test]
    fn letter_loop_rejects_mixed_case() {
        let (report, out) = run("[Process]\nForLetter,A,z,Echo,#c\n");
        assert!(out.is_empty());
        assert!(report.with_state(LogState::Error).any(|l| l.message.contains("differ in case")));
    }

    #[test]
    fn for_range_stops_at_integer_bounds() {
        let (report, out) = run("[Process]\nForRange,9223372036854775806,9223372036854775807,2,Echo,#c\n");
        assert_eq!(out, vec!["9223372036854775806"]);
        assert_eq!(report.status, BuildStatus::Finished);
    }

    #[test]
    fn for_range_appends_counter() {
        let (_, out) = run("[Process]\nSet,%Dest%,0\nForRange,0,2,1,Set,%Dest%,%Dest%#c\nEcho,%Dest%\n");
        assert_eq!(out, vec!["0012"]);
    }

    #[test]
    fn exist_var_on_undefined_keeps_preset() {
        let (_, out) = run("[Process]\nSet,%Dest%,F\nIf,ExistVar,%Undefined%,Set,%Dest%,T\nEcho,%Dest%\n");
        assert_eq!(out, vec!["F"]);
    }

    #[test]
    fn end_local_restores_return_value() {
        let (_, out) = run("[Process]\nSet,#r,a\nSystem,SetLocal\nSet,#r,b\nSystem,EndLocal\nEcho,#r\n");
        assert_eq!(out, vec!["a"]);
    }

    #[test]
    fn section_entry_clears_return_value() {
        let (_, out) = run("[Process]\nSet,#r,stale\nRun,%ScriptFile%,Show\n[Show]\nEcho,[#r]\n");
        assert_eq!(out, vec!["[]"]);
    }

    fn run_ini_writes(config: Config, dir: &std::path::Path) -> (Vec<LogState>, String) {
        let ini = dir.join("c.ini");
        let src = format!(
            "[Process]\nIniWrite,{0},S,K1,1\nIniWrite,{0},S,K2,#c\nIniWrite,{0},S,K3,3\n",
            ini.display()
        );
        let mut exec = FsExecutor::new();
        let probe = FsProbe::default();
        let report = Interpreter::new(config, &mut exec, &probe)
            .run_script(Script::parse(dir.join("t.script"), &src))
            .expect("run");
        let states = report.logs.iter().map(|l| l.state).collect();
        (states, std::fs::read_to_string(&ini).unwrap_or_default())
    }

    #[test]
    fn failed_batch_member_matches_sequential_run() {
        for stop in [true, false] {
            let batched_dir = tempfile::tempdir().unwrap();
            let sequential_dir = tempfile::tempdir().unwrap();
            let base = Config { stop_build_on_error: stop, ..Config::default() };
            let batched = run_ini_writes(base.clone(), batched_dir.path());
            let sequential = run_ini_writes(Config { optimize_code: false, ..base }, sequential_dir.path());
            assert_eq!(batched, sequential);
            let expected = if stop { "[S]\nK1=1\n" } else { "[S]\nK1=1\nK3=3\n" };
            assert_eq!(batched.1, expected);
        }
    }

    #[test]
    fn check_knows_declared_macros() {
        let config = Config::default();
        let ok = Script::parse("t", "[ApiVar]\nGreet=Echo,hi\n[Process]\nGreet\n");
        assert!(check_script(&ok, &config).is_empty());
        let bad = Script::parse("t", "[Process]\nGreet\nIf,1,Equal,1\n");
        let errors = check_script(&bad, &config);
        assert_eq!(errors.len(), 2);
        assert!(errors.iter().all(|(section, _)| section == "Process"));
    }
}
