//! Build-script language.
//!
//! A script is an INI-like file whose sections hold either data or code.  A
//! code section is a list of comma-separated statements:
//!
//! - Variables (`%Name%`), section parameters (`#1`..`#9`, `#a`, `#r`,
//!   `#c`, `#o1`..`#o9`) and escapes (`#$c`, `#$p`, …)
//! - Branching with `If` / `Else` and `Begin` … `End` blocks
//! - Section calls (`Run`, `RunEx`, `Exec`) and loops (`Loop`, `ForRange`,
//!   `ForLetter`)
//! - `Set`, `SetMacro`, `AddVariables` and the `System` control verbs
//! - User-defined macros from `[ApiVar]` and `[Variables]`
//!
//! Everything else is handed to an [`Executor`](crate::executor::Executor).
//!
//! # Quick start
//!
//! ```rust
//! use bakery::config::Config;
//! use bakery::fs_executor::{FsExecutor, FsProbe};
//! use bakery::script::{Interpreter, Script};
//!
//! let mut exec = FsExecutor::new();
//! let probe = FsProbe::default();
//! let mut interp = Interpreter::new(Config::default(), &mut exec, &probe);
//! let script = Script::parse("demo.script", "[Process]\nSet,%X%,6\nMessage,%X%\n");
//! let report = interp.run_script(script).unwrap();
//! assert!(report.messages().contains(&"6"));
//! ```

pub mod command;
pub mod cond;
pub mod escape;
pub mod expand;
pub mod interp;
pub mod lexer;
pub mod optimize;
pub mod source;
pub mod stmt;

// Re-exports for convenience.
pub use command::{Command, CommandInfo, CommandKind};
pub use expand::ExpandContext;
pub use interp::{check_script, BuildReport, BuildStatus, HaltSignal, Interpreter, InterpreterContext};
pub use source::Script;
