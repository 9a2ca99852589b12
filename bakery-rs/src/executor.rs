//! Seams between the interpreter and the outside world.
//!
//! The interpreter owns control flow, variables and macros.  Everything with
//! a side effect goes through an [`Executor`]; every existence check in an
//! `If` goes through a [`ResourceProbe`].

use std::fmt;

use crate::error::{LookupError, RuntimeError};
use crate::script::command::Command;
use crate::script::interp::{HaltSignal, InterpreterContext};

// ── Logs ──────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogState {
    Success,
    Info,
    /// Nothing to do (e.g. deleting a key that does not exist).
    Ignore,
    Warning,
    /// A destructive action went ahead without explicit confirmation.
    Overwrite,
    Error,
    /// An Error, Warning or Overwrite silenced by `System,ErrorOff`.
    Muted,
}

impl LogState {
    /// States an `ErrorOff` window silences.
    pub fn is_mutable(self) -> bool {
        matches!(self, LogState::Warning | LogState::Overwrite | LogState::Error)
    }
}

impl fmt::Display for LogState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LogState::Success => "Success",
            LogState::Info => "Info",
            LogState::Ignore => "Ignore",
            LogState::Warning => "Warning",
            LogState::Overwrite => "Overwrite",
            LogState::Error => "Error",
            LogState::Muted => "Muted",
        };
        f.write_str(s)
    }
}

/// One line of the build log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub state: LogState,
    pub message: String,
    /// Script line of the originating command (0 for engine messages).
    pub line: usize,
    /// Originating statement text.
    pub raw: String,
    /// Section call depth at the time of logging.
    pub depth: usize,
}

impl LogEntry {
    pub fn new(state: LogState, message: impl Into<String>) -> Self {
        LogEntry { state, message: message.into(), line: 0, raw: String::new(), depth: 0 }
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self::new(LogState::Success, message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(LogState::Warning, message)
    }

    pub fn ignore(message: impl Into<String>) -> Self {
        Self::new(LogState::Ignore, message)
    }

    /// Attach the originating command, unless already attached.
    pub fn at(mut self, cmd: &Command) -> Self {
        if self.line == 0 && self.raw.is_empty() {
            self.line = cmd.line;
            self.raw = cmd.raw.clone();
        }
        self
    }
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.state, self.message)?;
        if self.line > 0 {
            write!(f, " (line {}: {})", self.line, self.raw)?;
        }
        Ok(())
    }
}

// ── Executor ──────────────────────────────────────────────────────────────────

/// What an executor hands back for one command.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ExecResult {
    pub logs: Vec<LogEntry>,
    /// Set when the command itself asks to stop (e.g. a user aborting from a
    /// dialog).
    pub signal: Option<HaltSignal>,
    /// Set when a batch member failed.  The members before it took effect and
    /// their logs are in `logs`; the interpreter reports the error and runs
    /// the remaining members one by one.
    pub failed: Option<MemberFailure>,
}

/// The member of a batch that failed, by index into the batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberFailure {
    pub index: usize,
    pub error: RuntimeError,
}

impl ExecResult {
    pub fn logs(logs: Vec<LogEntry>) -> Self {
        ExecResult { logs, signal: None, failed: None }
    }

    pub fn partial(logs: Vec<LogEntry>, failed: Option<MemberFailure>) -> Self {
        ExecResult { logs, signal: None, failed }
    }

    pub fn one(entry: LogEntry) -> Self {
        Self::logs(vec![entry])
    }
}

/// Runs non-control commands.
///
/// Arguments arrive raw; use [`InterpreterContext::preprocess`] to expand
/// them and [`InterpreterContext::assign`] to write destination variables.
pub trait Executor {
    fn execute(&mut self, cmd: &Command, ctx: &mut InterpreterContext) -> Result<ExecResult, RuntimeError>;
}

// ── Resource probe ────────────────────────────────────────────────────────────

/// Registry hive named by the first operand of a registry condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegRoot {
    LocalMachine,
    CurrentUser,
    ClassesRoot,
    Users,
    CurrentConfig,
}

impl RegRoot {
    pub fn parse(s: &str) -> Result<Self, LookupError> {
        match s.trim().to_ascii_uppercase().as_str() {
            "HKLM" | "HKEY_LOCAL_MACHINE" => Ok(RegRoot::LocalMachine),
            "HKCU" | "HKEY_CURRENT_USER" => Ok(RegRoot::CurrentUser),
            "HKCR" | "HKEY_CLASSES_ROOT" => Ok(RegRoot::ClassesRoot),
            "HKU" | "HKEY_USERS" => Ok(RegRoot::Users),
            "HKCC" | "HKEY_CURRENT_CONFIG" => Ok(RegRoot::CurrentConfig),
            _ => Err(LookupError::InvalidRegistryRoot(s.to_owned())),
        }
    }
}

/// Answers existence questions asked by `If` conditions.
///
/// `Ok(false)` means "not found"; an `Err` means the question could not be
/// answered at all.  Hosts without a registry, archive library or network
/// keep the default methods.
pub trait ResourceProbe {
    fn file_exists(&self, path: &str) -> Result<bool, LookupError>;

    fn dir_exists(&self, path: &str) -> Result<bool, LookupError>;

    fn ini_section_exists(&self, file: &str, section: &str) -> Result<bool, LookupError>;

    fn registry_key_exists(&self, _root: RegRoot, _sub_key: &str) -> Result<bool, LookupError> {
        Err(LookupError::Unsupported("registry"))
    }

    fn registry_value_exists(&self, _root: RegRoot, _sub_key: &str, _value: &str) -> Result<bool, LookupError> {
        Err(LookupError::Unsupported("registry"))
    }

    fn registry_multi_contains(
        &self,
        _root: RegRoot,
        _sub_key: &str,
        _value: &str,
        _entry: &str,
    ) -> Result<bool, LookupError> {
        Err(LookupError::Unsupported("registry"))
    }

    fn archive_index_exists(&self, _archive: &str, _index: u32) -> Result<bool, LookupError> {
        Err(LookupError::Unsupported("archive"))
    }

    fn archive_entry_exists(&self, _archive: &str, _index: u32, _path: &str, _dir: bool) -> Result<bool, LookupError> {
        Err(LookupError::Unsupported("archive"))
    }

    fn archive_metadata_exists(&self, _archive: &str, _index: u32, _key: &str) -> Result<bool, LookupError> {
        Err(LookupError::Unsupported("archive"))
    }

    fn host_reachable(&self, _host: &str) -> Result<bool, LookupError> {
        Err(LookupError::Unsupported("network"))
    }

    fn online(&self) -> Result<bool, LookupError> {
        Err(LookupError::Unsupported("network"))
    }

    /// Ask the user a yes/no question.  Hosts without a user answer with the
    /// default, when one was given.
    fn question(&self, _message: &str, _timeout: Option<u64>, default: Option<bool>) -> Result<bool, LookupError> {
        default.ok_or(LookupError::Unsupported("interactive question"))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
