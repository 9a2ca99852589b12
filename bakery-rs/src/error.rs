//! Error taxonomy for the script engine.
//!
//! - [`ParseError`]: malformed statement text.  Always raised before any
//!   statement of the affected section runs.
//! - [`RuntimeError`]: a statement failed while running.  Becomes an `Error`
//!   log entry and halts the build unless an `ErrorOff` window mutes it.
//! - [`LookupError`]: a resource probe could not answer an existence query.
//! - [`EngineError`]: unrecoverable faults returned from the interpreter entry
//!   points.

use std::path::PathBuf;

use thiserror::Error;

/// A statement that could not be parsed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("line {line}: {message} [{raw}]")]
pub struct ParseError {
    /// 1-based line number in the script file (0 when parsed from a string
    /// without position information).
    pub line: usize,
    pub message: String,
    /// Raw statement text.
    pub raw: String,
}

impl ParseError {
    pub fn new(line: usize, message: impl Into<String>, raw: impl Into<String>) -> Self {
        ParseError { line, message: message.into(), raw: raw.into() }
    }
}

/// Failure of a resource existence probe.  Distinct from "not found", which
/// is a plain `false`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LookupError {
    #[error("{0} lookups are not supported by this host")]
    Unsupported(&'static str),

    #[error("invalid registry root key [{0}]")]
    InvalidRegistryRoot(String),

    #[error("lookup failed: {0}")]
    Failed(String),
}

/// A statement failed at runtime.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RuntimeError {
    #[error("variable expansion exceeded {0} iterations (circular reference?)")]
    ExpansionLimit(usize),

    #[error("[#c] is only valid inside a loop")]
    NoActiveLoop,

    #[error("{0} is not running inside a loop")]
    OutsideLoop(&'static str),

    #[error("argument [{0}] is not a valid integer")]
    InvalidInteger(String),

    #[error("argument [{0}] is not a valid drive letter")]
    InvalidLetter(String),

    #[error("letter loop bounds [{start}] and [{end}] differ in case")]
    MixedLetterCase { start: char, end: char },

    #[error("loop step [{step}] cannot reach [{end}] from [{start}]")]
    InvalidStep { start: String, end: String, step: String },

    #[error("script [{0}] does not exist")]
    ScriptNotFound(String),

    #[error("[{script}] does not have section [{section}]")]
    SectionNotFound { script: String, section: String },

    #[error("section [{section}] failed to parse: {first}")]
    SectionParse { section: String, first: ParseError },

    #[error("[System,EndLocal] requires a preceding [System,SetLocal]")]
    UnmatchedEndLocal,

    #[error("invalid command [{0}]")]
    UnknownMacro(String),

    #[error("[{0}] is not a valid variable key")]
    InvalidKey(String),

    #[error("invalid macro name [{0}]")]
    InvalidMacroName(String),

    #[error("[{0}] is not supported by this executor")]
    Unsupported(String),

    #[error("build cancelled")]
    Cancelled,

    #[error(transparent)]
    Lookup(#[from] LookupError),

    #[error("I/O error on [{path}]: {message}")]
    Io { path: String, message: String },

    #[error("{0}")]
    Message(String),
}

impl RuntimeError {
    pub fn io(path: impl AsRef<std::path::Path>, err: std::io::Error) -> Self {
        RuntimeError::Io { path: path.as_ref().display().to_string(), message: err.to_string() }
    }

    pub fn msg(message: impl Into<String>) -> Self {
        RuntimeError::Message(message.into())
    }
}

/// Unrecoverable interpreter faults.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("{path}: {} parse error(s), first at {}", .errors.len(), first_of(.errors))]
    Parse { path: String, errors: Vec<ParseError> },

    #[error("{path}: entry section [{section}] does not exist")]
    MissingEntry { path: String, section: String },

    #[error("cannot read [{}]: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl EngineError {
    /// Process exit code for the host binary.
    pub fn exit_code(&self) -> i32 {
        match self {
            EngineError::Parse { .. } => 2,
            EngineError::MissingEntry { .. } => 3,
            EngineError::Io { .. } => 4,
        }
    }
}

fn first_of(errors: &[ParseError]) -> String {
    errors.first().map(ToString::to_string).unwrap_or_default()
}

// ── Tests ─────────────────────────────────────────────────────────────────────
