//! Parsed command model.
//!
//! Every statement parses into a [`Command`].  The set of keywords is closed:
//! [`CommandKind`] is generated from one table that also carries each kind's
//! positional arity and accepted trailing flags.  Any other well-formed
//! keyword is a macro invocation.

use std::fmt;

/// Positional arity meaning "no upper bound".
pub const VARIADIC: usize = usize::MAX;

/// A trailing modifier accepted by a command kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlagSpec {
    /// A bare word such as `NOWARN`.
    Word(&'static str),
    /// A `Key=Value` modifier such as `Delim=|`.
    Keyed(&'static str),
}

macro_rules! command_kinds {
    (
        typed { $( $kind:ident ($min:expr, $max:expr) [$($flag:expr),*] ),* $(,)? }
        batched { $( $op:ident => $base:ident ),* $(,)? }
    ) => {
        /// Every command kind the engine knows about.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum CommandKind {
            $( $kind, )*
            $( $op, )*
            /// Invocation of a user-defined macro.
            Macro,
        }

        impl CommandKind {
            /// Kinds that may be written in a script.
            pub const TYPED: &'static [CommandKind] = &[ $( CommandKind::$kind, )* ];

            pub fn name(self) -> &'static str {
                match self {
                    $( CommandKind::$kind => stringify!($kind), )*
                    $( CommandKind::$op => stringify!($op), )*
                    CommandKind::Macro => "Macro",
                }
            }

            /// Resolve a keyword, ignoring case.  Batched forms are not
            /// resolvable: typing one is a macro invocation.
            pub fn from_keyword(keyword: &str) -> Option<CommandKind> {
                Self::TYPED.iter().copied().find(|k| k.name().eq_ignore_ascii_case(keyword))
            }

            /// `(min, max)` positional arguments after trailing flags are removed.
            pub fn arity(self) -> (usize, usize) {
                match self {
                    $( CommandKind::$kind => ($min, $max), )*
                    _ => (0, VARIADIC),
                }
            }

            pub fn flag_specs(self) -> &'static [FlagSpec] {
                match self {
                    $( CommandKind::$kind => &[$($flag),*], )*
                    _ => &[],
                }
            }

            /// The batched form produced from a run of this kind, if any.
            pub fn batched(self) -> Option<CommandKind> {
                match self {
                    $( CommandKind::$base => Some(CommandKind::$op), )*
                    _ => None,
                }
            }

            /// The single-item kind a batched form was produced from.
            pub fn unbatched(self) -> Option<CommandKind> {
                match self {
                    $( CommandKind::$op => Some(CommandKind::$base), )*
                    _ => None,
                }
            }
        }
    };
}

use FlagSpec::{Keyed, Word};

command_kinds! {
    typed {
        // File
        FileCopy(2, 2) [Word("PRESERVE"), Word("NOWARN"), Word("NOREC")],
        FileDelete(1, 1) [Word("NOWARN"), Word("NOREC")],
        FileRename(2, 2) [],
        FileMove(2, 2) [],
        FileCreateBlank(1, 2) [Word("PRESERVE"), Word("NOWARN")],
        FileSize(2, 2) [],
        FileVersion(2, 2) [],
        DirCopy(2, 2) [],
        DirDelete(1, 1) [],
        DirMove(2, 2) [],
        DirMake(1, 1) [],
        DirSize(2, 2) [],
        PathMove(2, 2) [],
        // Registry
        RegHiveLoad(2, 2) [],
        RegHiveUnload(1, 1) [],
        RegRead(4, 4) [],
        RegWrite(4, VARIADIC) [Word("NOWARN")],
        RegWriteEx(5, VARIADIC) [Word("NOWARN")],
        RegDelete(2, 3) [],
        RegMulti(4, 6) [],
        RegImport(1, 1) [],
        RegExport(3, 3) [],
        RegCopy(4, 4) [Word("WILDCARD")],
        // Text
        TXTAddLine(3, 3) [],
        TXTReplace(3, 3) [],
        TXTDelLine(2, 2) [],
        TXTDelSpaces(1, 1) [],
        TXTDelEmptyLines(1, 1) [],
        // INI
        IniRead(4, 4) [Keyed("Default")],
        IniWrite(4, 4) [],
        IniDelete(3, 3) [],
        IniReadSection(3, 3) [Keyed("Delim")],
        IniAddSection(2, 2) [],
        IniDeleteSection(2, 2) [],
        IniWriteTextLine(3, 3) [Word("APPEND")],
        IniMerge(2, 2) [],
        IniCompact(1, 1) [],
        // Archive
        Compress(3, 3) [],
        Decompress(2, 2) [Keyed("Password")],
        Expand(2, 3) [Word("PRESERVE"), Word("NOWARN")],
        CopyOrExpand(2, 2) [Word("PRESERVE"), Word("NOWARN")],
        WimMount(4, 4) [],
        WimUnmount(1, 1) [Word("DISCARD"), Word("COMMIT")],
        WimInfo(3, 4) [Word("NOERR")],
        WimApply(3, 4) [Word("CHECK"), Word("NOACL"), Word("NOATTRIB")],
        WimExtract(4, 5) [Word("CHECK"), Word("NOACL"), Word("NOATTRIB")],
        WimCapture(3, VARIADIC) [Word("BOOT"), Word("NOACL"), Word("CHECK")],
        WimAppend(3, VARIADIC) [Word("BOOT"), Word("NOACL"), Word("CHECK")],
        WimDelete(2, 2) [Word("CHECK")],
        WimExport(3, VARIADIC) [Word("BOOT"), Word("CHECK")],
        // Network and hashing
        WebGet(2, 3) [Word("NOERR"), Keyed("TimeOut"), Keyed("Referer"), Keyed("UserAgent")],
        Hash(3, 3) [],
        // Interface
        Echo(1, 1) [Word("WARN")],
        EchoFile(1, 1) [Word("ENCODE")],
        Message(1, 3) [],
        Visible(2, 2) [Word("PERMANENT")],
        ReadInterface(4, 4) [],
        WriteInterface(4, 4) [],
        UserInput(3, VARIADIC) [],
        AddInterface(3, 3) [],
        // String, math and list
        StrFormat(2, VARIADIC) [],
        Math(2, VARIADIC) [],
        List(2, VARIADIC) [],
        // System
        System(1, VARIADIC) [],
        ShellExecute(2, 5) [],
        ShellExecuteEx(2, 4) [],
        ShellExecuteDelete(2, 5) [],
        // Branch
        Run(2, VARIADIC) [],
        RunEx(2, VARIADIC) [],
        Exec(2, VARIADIC) [],
        Loop(1, VARIADIC) [],
        LoopEx(4, VARIADIC) [],
        LoopLetter(4, VARIADIC) [],
        LoopLetterEx(4, VARIADIC) [],
        If(2, VARIADIC) [],
        Else(1, VARIADIC) [],
        Begin(0, 0) [],
        End(0, 0) [],
        ForRange(4, VARIADIC) [],
        ForLetter(3, VARIADIC) [],
        Break(0, 0) [],
        Continue(0, 0) [],
        // Control
        Set(2, 2) [Word("GLOBAL"), Word("PERMANENT")],
        SetMacro(2, 2) [Word("GLOBAL"), Word("PERMANENT")],
        AddVariables(2, 2) [Word("GLOBAL")],
        Exit(0, 1) [Word("NOWARN")],
        Halt(0, 1) [],
        Return(0, 1) [],
        Wait(1, 1) [],
        Beep(0, 1) [],
        GetParam(2, 2) [],
    }
    batched {
        TXTAddLineOp => TXTAddLine,
        TXTReplaceOp => TXTReplace,
        TXTDelLineOp => TXTDelLine,
        IniReadOp => IniRead,
        IniWriteOp => IniWrite,
        IniDeleteOp => IniDelete,
        IniReadSectionOp => IniReadSection,
        IniAddSectionOp => IniAddSection,
        IniDeleteSectionOp => IniDeleteSection,
        IniWriteTextLineOp => IniWriteTextLine,
        VisibleOp => Visible,
        ReadInterfaceOp => ReadInterface,
        WriteInterfaceOp => WriteInterface,
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ── Branch conditions ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CondKind {
    ExistFile,
    ExistDir,
    ExistSection,
    ExistRegSection,
    ExistRegSubKey,
    ExistRegKey,
    ExistRegValue,
    ExistRegMulti,
    ExistVar,
    ExistMacro,
    WimExistIndex,
    WimExistFile,
    WimExistDir,
    WimExistImageInfo,
    Ping,
    Online,
    Question,
    Equal,
    EqualX,
    Smaller,
    SmallerEqual,
    Bigger,
    BiggerEqual,
}

impl CondKind {
    /// Existence-style keywords with their operand counts.  `Question` is
    /// listed with its short form; the parser decides between 1 and 3.
    pub const EXISTENCE: &'static [(&'static str, CondKind, usize)] = &[
        ("ExistFile", CondKind::ExistFile, 1),
        ("ExistDir", CondKind::ExistDir, 1),
        ("ExistSection", CondKind::ExistSection, 2),
        ("ExistRegSection", CondKind::ExistRegSection, 2),
        ("ExistRegSubKey", CondKind::ExistRegSubKey, 2),
        ("ExistRegKey", CondKind::ExistRegKey, 3),
        ("ExistRegValue", CondKind::ExistRegValue, 3),
        ("ExistRegMulti", CondKind::ExistRegMulti, 4),
        ("ExistVar", CondKind::ExistVar, 1),
        ("ExistMacro", CondKind::ExistMacro, 1),
        ("WimExistIndex", CondKind::WimExistIndex, 2),
        ("WimExistFile", CondKind::WimExistFile, 3),
        ("WimExistDir", CondKind::WimExistDir, 3),
        ("WimExistImageInfo", CondKind::WimExistImageInfo, 3),
        ("Ping", CondKind::Ping, 1),
        ("Online", CondKind::Online, 0),
        ("Question", CondKind::Question, 1),
    ];

    /// Comparison operator spellings.  `NotEqual` / `!=` are handled by the
    /// parser as a negated `Equal`.
    pub const COMPARISON: &'static [(&'static str, CondKind)] = &[
        ("Equal", CondKind::Equal),
        ("==", CondKind::Equal),
        ("EqualX", CondKind::EqualX),
        ("===", CondKind::EqualX),
        ("Smaller", CondKind::Smaller),
        ("<", CondKind::Smaller),
        ("SmallerEqual", CondKind::SmallerEqual),
        ("<=", CondKind::SmallerEqual),
        ("Bigger", CondKind::Bigger),
        (">", CondKind::Bigger),
        ("BiggerEqual", CondKind::BiggerEqual),
        (">=", CondKind::BiggerEqual),
    ];

    pub fn existence(keyword: &str) -> Option<(CondKind, usize)> {
        Self::EXISTENCE
            .iter()
            .find(|(name, _, _)| name.eq_ignore_ascii_case(keyword))
            .map(|&(_, kind, n)| (kind, n))
    }

    pub fn comparison(op: &str) -> Option<CondKind> {
        Self::COMPARISON
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(op))
            .map(|&(_, kind)| kind)
    }

}

/// A parsed `If` condition.  Operands are raw; the interpreter expands them
/// (except for `ExistVar`) right before evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchCondition {
    pub kind: CondKind,
    /// Inverts the final result only.
    pub negate: bool,
    pub operands: Vec<String>,
}

impl BranchCondition {
    pub fn new(kind: CondKind, negate: bool, operands: Vec<String>) -> Self {
        BranchCondition { kind, negate, operands }
    }

    /// The same condition with `negate` flipped.
    pub fn negated(&self) -> Self {
        BranchCondition { negate: !self.negate, ..self.clone() }
    }
}

// ── Command payloads ──────────────────────────────────────────────────────────

/// Write target of `Set` and `SetMacro`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SetScope {
    #[default]
    Local,
    Global,
    Permanent,
}

/// Counter type of a loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopMode {
    Number,
    Letter,
}

/// Parameters of a section call: positional in-params, and for the `Ex`
/// forms the `Out=` destinations.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallParams {
    pub ins: Vec<String>,
    pub outs: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SystemOp {
    ErrorOff(Option<String>),
    SetLocal,
    EndLocal,
    /// Any other sub-command; left to the executor.
    Other,
}

/// Kind-specific parsed data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandInfo {
    /// A leaf command handed to the executor as-is.
    Plain,
    If {
        cond: BranchCondition,
        body: Vec<Command>,
        else_body: Option<Vec<Command>>,
    },
    /// Only present before block folding; folded into the preceding `If`.
    Else { body: Vec<Command> },
    Begin,
    End,
    ForRange { start: String, end: String, step: String, body: Vec<Command> },
    ForLetter { start: String, end: String, body: Vec<Command> },
    Break,
    Continue,
    /// `Run` / `RunEx` / `Exec`.
    Run { script: String, section: String, params: CallParams, isolate: bool },
    /// `Loop` family calling a section once per counter value.
    Loop {
        mode: LoopMode,
        script: String,
        section: String,
        start: String,
        end: String,
        params: CallParams,
    },
    /// Legacy `Loop,BREAK`.
    LoopBreak,
    Set { key: String, value: String, scope: SetScope },
    SetMacro { name: String, body: String, scope: SetScope },
    AddVariables { script: String, section: String, global: bool },
    Exit { message: Option<String>, nowarn: bool },
    Halt { message: Option<String> },
    Return { value: Option<String> },
    System(SystemOp),
    Macro { name: String },
    /// Members of a batched command, in source order.
    Batch(Vec<Command>),
}

/// A fully parsed statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub kind: CommandKind,
    /// Positional raw arguments, trailing flags removed.
    pub args: Vec<String>,
    /// Trailing flags as written, in source order.
    pub flags: Vec<String>,
    pub info: CommandInfo,
    /// 1-based script line, 0 for synthesized commands.
    pub line: usize,
    /// Statement text as written.
    pub raw: String,
}

impl Command {
    /// Returns `true` if the bare-word flag `name` was given.
    pub fn has_flag(&self, name: &str) -> bool {
        self.flags.iter().any(|f| f.eq_ignore_ascii_case(name))
    }

    /// Value of a `Key=Value` flag.
    pub fn flag_value(&self, key: &str) -> Option<&str> {
        self.flags.iter().find_map(|f| {
            let (k, v) = f.split_once('=')?;
            k.trim().eq_ignore_ascii_case(key).then_some(v)
        })
    }

    pub fn arg(&self, idx: usize) -> &str {
        self.args.get(idx).map(String::as_str).unwrap_or("")
    }

    /// Child statement lists, in execution order.
    pub fn blocks_mut(&mut self) -> Vec<&mut Vec<Command>> {
        match &mut self.info {
            CommandInfo::If { body, else_body, .. } => {
                let mut v = vec![body];
                if let Some(e) = else_body {
                    v.push(e);
                }
                v
            }
            CommandInfo::Else { body }
            | CommandInfo::ForRange { body, .. }
            | CommandInfo::ForLetter { body, .. } => vec![body],
            _ => Vec::new(),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keywords_resolve_case_insensitively() {
        assert_eq!(CommandKind::from_keyword("txtaddline"), Some(CommandKind::TXTAddLine));
        assert_eq!(CommandKind::from_keyword("IFFY"), None);
    }

    #[test]
    fn batched_forms_are_not_typeable() {
        assert_eq!(CommandKind::from_keyword("IniWriteOp"), None);
        assert_eq!(CommandKind::IniWrite.batched(), Some(CommandKind::IniWriteOp));
        assert_eq!(CommandKind::IniWriteOp.unbatched(), Some(CommandKind::IniWrite));
        assert_eq!(CommandKind::Echo.batched(), None);
    }

    #[test]
    fn arity_table() {
        assert_eq!(CommandKind::IniRead.arity(), (4, 4));
        assert_eq!(CommandKind::Run.arity(), (2, VARIADIC));
        assert_eq!(CommandKind::Macro.arity(), (0, VARIADIC));
    }

    #[test]
    fn condition_keywords() {
        assert_eq!(CondKind::existence("existvar"), Some((CondKind::ExistVar, 1)));
        assert_eq!(CondKind::existence("Equal"), None);
        assert_eq!(CondKind::comparison("=="), Some(CondKind::Equal));
        assert_eq!(CondKind::comparison("biggerequal"), Some(CondKind::BiggerEqual));
        assert_eq!(CondKind::comparison("NotEqual"), None);
    }

    #[test]
    fn flag_lookup() {
        let cmd = Command {
            kind: CommandKind::IniReadSection,
            args: vec![],
            flags: vec!["delim=|".into(), "NOWARN".into()],
            info: CommandInfo::Plain,
            line: 1,
            raw: String::new(),
        };
        assert_eq!(cmd.flag_value("Delim"), Some("|"));
        assert!(cmd.has_flag("nowarn"));
        assert!(!cmd.has_flag("PRESERVE"));
        assert_eq!(cmd.arg(3), "");
    }
}
