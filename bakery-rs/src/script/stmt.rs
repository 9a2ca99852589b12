//! Statement parser and block folding.
//!
//! A section body is turned into a [`Command`] tree in two passes:
//!
//! 1. Every logical line is parsed on its own.  Block headers (`If`, `Else`,
//!    `ForRange`, `ForLetter`) embed exactly one trailing statement, which may
//!    be `Begin`.
//! 2. [`BlockFolder`] walks the flat list, replaces an embedded `Begin` with
//!    the statements up to its matching `End`, and attaches each `Else` to
//!    the line-level `If` right before it.
//!
//! Errors are collected for the whole section so that nothing runs when any
//! line is malformed.

use crate::config::CompatFlags;
use crate::error::ParseError;
use crate::macros::is_macro_name;
use crate::var::{detect_key, trim_percent};

use super::command::{
    BranchCondition, CallParams, Command, CommandInfo, CommandKind, CondKind, FlagSpec, LoopMode,
    SetScope, SystemOp, VARIADIC,
};
use super::lexer::{logical_lines, split_statement};

/// Knobs that change how statements parse.
#[derive(Clone, Copy, Default)]
pub struct ParseOptions<'a> {
    pub compat: CompatFlags,
    /// Set only when no macro can be defined at runtime.  Unknown macro names
    /// are then rejected at parse time.
    pub macro_lookup: Option<&'a dyn Fn(&str) -> bool>,
}

// ── Entry points ──────────────────────────────────────────────────────────────

/// Parse the body lines of one section.
///
/// `lines` yields `(line_number, text)` pairs.
pub fn parse_section<'a>(
    lines: impl IntoIterator<Item = (usize, &'a str)>,
    opts: &ParseOptions<'_>,
) -> Result<Vec<Command>, Vec<ParseError>> {
    let (logical, mut errors) = logical_lines(lines);
    let mut flat = Vec::with_capacity(logical.len());
    for line in logical {
        match parse_statement(&line.text, line.line, opts) {
            Ok(cmd) => flat.push(cmd),
            Err(e) => errors.push(e),
        }
    }

    let mut folder = BlockFolder::new(flat);
    let block = folder.fold_block(None);
    errors.extend(folder.errors);

    if errors.is_empty() {
        Ok(block)
    } else {
        errors.sort_by_key(|e| e.line);
        Err(errors)
    }
}

/// Parse free-standing script text, numbering lines from 1.
pub fn parse_block(src: &str, opts: &ParseOptions<'_>) -> Result<Vec<Command>, Vec<ParseError>> {
    parse_section(src.lines().enumerate().map(|(i, l)| (i + 1, l)), opts)
}

/// Parse one logical line.  Embedded statements are parsed but not folded.
pub fn parse_statement(text: &str, line: usize, opts: &ParseOptions<'_>) -> Result<Command, ParseError> {
    let (keyword, args) = split_statement(text, line)?;
    parse_command(&keyword, args, line, text, opts)
}

/// Build a [`Command`] from an already split keyword and argument list.
pub fn parse_command(
    keyword: &str,
    args: Vec<String>,
    line: usize,
    raw: &str,
    opts: &ParseOptions<'_>,
) -> Result<Command, ParseError> {
    let err = |message: String| ParseError::new(line, message, raw);

    let Some(kind) = CommandKind::from_keyword(keyword) else {
        if let Some(known) = opts.macro_lookup {
            if !known(keyword) {
                return Err(err(format!("Invalid command [{keyword}]")));
            }
        }
        return Ok(Command {
            kind: CommandKind::Macro,
            args,
            flags: Vec::new(),
            info: CommandInfo::Macro { name: keyword.to_owned() },
            line,
            raw: raw.to_owned(),
        });
    };

    let (args, flags) = strip_flags(kind, args).map_err(&err)?;
    let (min, max) = kind.arity();
    if args.len() < min {
        return Err(err(format!("[{kind}] needs at least {min} argument(s), got {}", args.len())));
    }
    if max != VARIADIC && args.len() > max {
        return Err(err(format!("[{kind}] takes at most {max} argument(s), got {}", args.len())));
    }

    let info = parse_info(kind, &args, &flags, line, raw, opts).map_err(&err)?;
    Ok(Command { kind, args, flags, info, line, raw: raw.to_owned() })
}

// ── Per-kind shapes ───────────────────────────────────────────────────────────

fn parse_info(
    kind: CommandKind,
    args: &[String],
    flags: &[String],
    line: usize,
    raw: &str,
    opts: &ParseOptions<'_>,
) -> Result<CommandInfo, String> {
    let has = |name: &str| flags.iter().any(|f| f.eq_ignore_ascii_case(name));
    let embed = |rest: &[String]| -> Result<Vec<Command>, String> {
        let Some((keyword, tail)) = rest.split_first() else {
            return Err(format!("[{kind}] requires an embedded command"));
        };
        let inner = parse_command(keyword, tail.to_vec(), line, raw, opts).map_err(|e| e.message)?;
        if matches!(inner.info, CommandInfo::Else { .. } | CommandInfo::End) {
            return Err(format!("[{}] cannot be embedded in [{kind}]", inner.kind));
        }
        Ok(vec![inner])
    };

    let info = match kind {
        CommandKind::If => {
            let (cond, used) = parse_condition(args, &opts.compat)?;
            CommandInfo::If { cond, body: embed(&args[used..])?, else_body: None }
        }
        CommandKind::Else => CommandInfo::Else { body: embed(args)? },
        CommandKind::Begin => CommandInfo::Begin,
        CommandKind::End => CommandInfo::End,
        CommandKind::ForRange => CommandInfo::ForRange {
            start: args[0].clone(),
            end: args[1].clone(),
            step: args[2].clone(),
            body: embed(&args[3..])?,
        },
        CommandKind::ForLetter => CommandInfo::ForLetter {
            start: args[0].clone(),
            end: args[1].clone(),
            body: embed(&args[2..])?,
        },
        CommandKind::Break => CommandInfo::Break,
        CommandKind::Continue => CommandInfo::Continue,

        CommandKind::Run | CommandKind::Exec => CommandInfo::Run {
            script: args[0].clone(),
            section: args[1].clone(),
            params: CallParams { ins: args[2..].to_vec(), outs: Vec::new() },
            isolate: kind == CommandKind::Exec,
        },
        CommandKind::RunEx => CommandInfo::Run {
            script: args[0].clone(),
            section: args[1].clone(),
            params: parse_in_out(&args[2..])?,
            isolate: false,
        },
        CommandKind::Loop if args.len() == 1 => {
            if !args[0].eq_ignore_ascii_case("BREAK") {
                return Err(format!("[Loop] needs at least 4 arguments, got [{}]", args[0]));
            }
            CommandInfo::LoopBreak
        }
        CommandKind::Loop | CommandKind::LoopLetter | CommandKind::LoopEx | CommandKind::LoopLetterEx => {
            if args.len() < 4 {
                return Err(format!("[{kind}] needs at least 4 arguments"));
            }
            let mode = match kind {
                CommandKind::LoopLetter | CommandKind::LoopLetterEx => LoopMode::Letter,
                _ => LoopMode::Number,
            };
            let params = match kind {
                CommandKind::LoopEx | CommandKind::LoopLetterEx => parse_in_out(&args[4..])?,
                _ => CallParams { ins: args[4..].to_vec(), outs: Vec::new() },
            };
            CommandInfo::Loop {
                mode,
                script: args[0].clone(),
                section: args[1].clone(),
                start: args[2].clone(),
                end: args[3].clone(),
                params,
            }
        }

        CommandKind::Set => {
            if detect_key(&args[0]).is_none() {
                return Err(format!("[{}] is not a valid variable key", args[0]));
            }
            CommandInfo::Set { key: args[0].clone(), value: args[1].clone(), scope: set_scope(&has)? }
        }
        CommandKind::SetMacro => {
            if !is_macro_name(&args[0]) {
                return Err(format!("Invalid macro name [{}]", args[0]));
            }
            CommandInfo::SetMacro { name: args[0].clone(), body: args[1].clone(), scope: set_scope(&has)? }
        }
        CommandKind::AddVariables => CommandInfo::AddVariables {
            script: args[0].clone(),
            section: args[1].clone(),
            global: has("GLOBAL"),
        },
        CommandKind::Exit => CommandInfo::Exit { message: args.first().cloned(), nowarn: has("NOWARN") },
        CommandKind::Halt => CommandInfo::Halt { message: args.first().cloned() },
        CommandKind::Return => CommandInfo::Return { value: args.first().cloned() },
        CommandKind::System => {
            let op = match args[0].to_ascii_lowercase().as_str() {
                "erroroff" => {
                    if args.len() > 2 {
                        return Err("[System,ErrorOff] takes at most one argument".to_owned());
                    }
                    SystemOp::ErrorOff(args.get(1).cloned())
                }
                "setlocal" | "endlocal" if args.len() > 1 => {
                    return Err(format!("[System,{}] takes no arguments", args[0]));
                }
                "setlocal" => SystemOp::SetLocal,
                "endlocal" => SystemOp::EndLocal,
                _ => SystemOp::Other,
            };
            CommandInfo::System(op)
        }

        // Destination arguments must name a variable.
        CommandKind::IniRead | CommandKind::RegRead | CommandKind::ReadInterface => {
            require_var(&args[3])?;
            CommandInfo::Plain
        }
        CommandKind::IniReadSection => {
            require_var(&args[2])?;
            CommandInfo::Plain
        }
        CommandKind::FileSize | CommandKind::FileVersion | CommandKind::DirSize => {
            require_var(&args[1])?;
            CommandInfo::Plain
        }
        CommandKind::TXTAddLine => {
            check_add_line_mode(&args[2])?;
            CommandInfo::Plain
        }
        _ => CommandInfo::Plain,
    };
    Ok(info)
}

fn set_scope(has: &dyn Fn(&str) -> bool) -> Result<SetScope, String> {
    match (has("GLOBAL"), has("PERMANENT")) {
        (true, true) => Err("GLOBAL and PERMANENT cannot be combined".to_owned()),
        (true, false) => Ok(SetScope::Global),
        (false, true) => Ok(SetScope::Permanent),
        (false, false) => Ok(SetScope::Local),
    }
}

fn require_var(arg: &str) -> Result<(), String> {
    match detect_key(arg) {
        Some(_) => Ok(()),
        None => Err(format!("[{arg}] is not a valid destination variable")),
    }
}

fn check_add_line_mode(mode: &str) -> Result<(), String> {
    let ok = mode.eq_ignore_ascii_case("Append") || mode.eq_ignore_ascii_case("Prepend");
    // Modes computed at runtime are checked by the executor.
    if ok || mode.contains('%') || mode.contains('#') {
        Ok(())
    } else {
        Err(format!("Invalid TXTAddLine mode [{mode}]"))
    }
}

/// Split `In=` / `Out=` parameters of the `Ex` call forms.
fn parse_in_out(args: &[String]) -> Result<CallParams, String> {
    let mut params = CallParams::default();
    for arg in args {
        let (key, value) = arg
            .split_once('=')
            .ok_or_else(|| format!("Parameter [{arg}] must start with In= or Out="))?;
        if key.trim().eq_ignore_ascii_case("In") {
            params.ins.push(value.to_owned());
        } else if key.trim().eq_ignore_ascii_case("Out") {
            if trim_percent(value.trim()).is_none() {
                return Err(format!("Out parameter [{value}] must be a %Variable%"));
            }
            params.outs.push(value.trim().to_owned());
        } else {
            return Err(format!("Parameter [{arg}] must start with In= or Out="));
        }
    }
    if params.ins.len() > 9 || params.outs.len() > 9 {
        return Err("At most 9 In= and 9 Out= parameters are allowed".to_owned());
    }
    Ok(params)
}

// ── Trailing flags ────────────────────────────────────────────────────────────

fn match_flag(specs: &[FlagSpec], arg: &str) -> Option<FlagSpec> {
    specs.iter().copied().find(|spec| match spec {
        FlagSpec::Word(w) => arg.trim().eq_ignore_ascii_case(w),
        FlagSpec::Keyed(k) => arg.split_once('=').is_some_and(|(key, _)| key.trim().eq_ignore_ascii_case(k)),
    })
}

/// Pop recognised flags off the tail, never eating into required positionals.
fn strip_flags(kind: CommandKind, mut args: Vec<String>) -> Result<(Vec<String>, Vec<String>), String> {
    let specs = kind.flag_specs();
    if specs.is_empty() {
        return Ok((args, Vec::new()));
    }
    let (min, _) = kind.arity();
    let mut flags: Vec<String> = Vec::new();
    let mut seen: Vec<FlagSpec> = Vec::new();
    while args.len() > min {
        let Some(spec) = args.last().and_then(|a| match_flag(specs, a)) else { break };
        if seen.contains(&spec) {
            return Err(format!("Flag [{}] is duplicated", args[args.len() - 1]));
        }
        seen.push(spec);
        if let Some(flag) = args.pop() {
            flags.push(flag.trim().to_owned());
        }
    }
    flags.reverse();
    Ok((args, flags))
}

// ── Conditions ────────────────────────────────────────────────────────────────

/// Parse the condition part of an `If`.  Returns the condition and the index
/// of the first embedded-command token.
///
/// Existence keywords are matched before the `<a>,<op>,<b>` comparison form,
/// so `If,ExistMacro,Equal,Echo,X` checks for a macro named `Equal`.
pub fn parse_condition(args: &[String], compat: &CompatFlags) -> Result<(BranchCondition, usize), String> {
    const INCORRECT: &str = "Incorrect branch condition";

    let mut idx = 0;
    let mut negate = false;
    if args.first().is_some_and(|a| a.eq_ignore_ascii_case("Not")) {
        negate = true;
        idx = 1;
    }
    let word = args.get(idx).ok_or_else(|| INCORRECT.to_owned())?;

    let mut existence = CondKind::existence(word);
    if existence.is_none() && compat.legacy_branch_condition {
        let legacy = word
            .get(..3)
            .filter(|p| p.eq_ignore_ascii_case("Not"))
            .and_then(|_| CondKind::existence(&word[3..]));
        if legacy.is_some() {
            if negate {
                return Err(format!("[Not] cannot precede [{word}]"));
            }
            negate = true;
            existence = legacy;
        }
    }

    if let Some((kind, mut count)) = existence {
        if kind == CondKind::Question && args.get(idx + 2).is_some_and(|t| ends_with_digit(t)) {
            count = 3;
        }
        let first = idx + 1;
        let embed_at = first + count;
        if args.len() <= embed_at {
            return Err(format!("[{word}] needs {count} operand(s) and an embedded command"));
        }
        let operands = args[first..embed_at].to_vec();
        if kind == CondKind::ExistVar && trim_percent(operands[0].trim()).is_none() {
            return Err(format!("[ExistVar] operand [{}] is not a %Variable%", operands[0]));
        }
        return Ok((BranchCondition::new(kind, negate, operands), embed_at));
    }

    if args.len() <= idx + 3 {
        return Err(INCORRECT.to_owned());
    }
    let op = args[idx + 1].trim();
    let kind = if op.eq_ignore_ascii_case("NotEqual") || op == "!=" {
        if negate {
            return Err(format!("[Not] cannot be combined with [{op}]"));
        }
        negate = true;
        CondKind::Equal
    } else {
        CondKind::comparison(op).ok_or_else(|| INCORRECT.to_owned())?
    };
    let operands = vec![args[idx].clone(), args[idx + 2].clone()];
    Ok((BranchCondition::new(kind, negate, operands), idx + 3))
}

fn ends_with_digit(s: &str) -> bool {
    s.trim_end().chars().last().is_some_and(|c| c.is_ascii_digit())
}

// ── Block folding ─────────────────────────────────────────────────────────────

struct BlockFolder {
    stmts: std::iter::Peekable<std::vec::IntoIter<Command>>,
    errors: Vec<ParseError>,
}

impl BlockFolder {
    fn new(stmts: Vec<Command>) -> Self {
        BlockFolder { stmts: stmts.into_iter().peekable(), errors: Vec::new() }
    }

    /// Fold statements until the `End` closing `opener`, or the end of input
    /// when `opener` is `None`.
    fn fold_block(&mut self, opener: Option<&Command>) -> Vec<Command> {
        let mut out = Vec::new();
        while let Some(cmd) = self.stmts.next() {
            match cmd.info {
                CommandInfo::End if opener.is_some() => return out,
                CommandInfo::End => self.error(&cmd, "[End] without matching [Begin]"),
                CommandInfo::Else { .. } => self.error(&cmd, "[Else] must follow an [If]"),
                CommandInfo::Begin => {
                    self.error(&cmd, "[Begin] must be embedded in If, Else or a loop");
                    self.fold_block(Some(&cmd));
                }
                _ => {
                    let folded = self.fold_one(cmd, true);
                    out.push(folded);
                }
            }
        }
        if let Some(open) = opener {
            self.error(open, "[Begin] without matching [End]");
        }
        out
    }

    /// Fold one statement.  Only an `If` standing at line level, or heading
    /// an `Else,If` chain, takes the `Else` on the following line; an `If`
    /// embedded in another header never does.
    fn fold_one(&mut self, mut cmd: Command, takes_else: bool) -> Command {
        let info = std::mem::replace(&mut cmd.info, CommandInfo::Plain);
        cmd.info = match info {
            CommandInfo::If { cond, body, .. } => {
                let body = self.fold_embedded(body, false);
                let else_body = if takes_else {
                    self.stmts
                        .next_if(|next| matches!(next.info, CommandInfo::Else { .. }))
                        .map(|else_cmd| match else_cmd.info {
                            CommandInfo::Else { body } => body,
                            _ => Vec::new(),
                        })
                        .map(|eb| self.fold_embedded(eb, true))
                } else {
                    None
                };
                CommandInfo::If { cond, body, else_body }
            }
            CommandInfo::ForRange { start, end, step, body } => {
                CommandInfo::ForRange { start, end, step, body: self.fold_embedded(body, false) }
            }
            CommandInfo::ForLetter { start, end, body } => {
                CommandInfo::ForLetter { start, end, body: self.fold_embedded(body, false) }
            }
            other => other,
        };
        cmd
    }

    fn fold_embedded(&mut self, body: Vec<Command>, takes_else: bool) -> Vec<Command> {
        let Some(embed) = body.into_iter().next() else { return Vec::new() };
        if matches!(embed.info, CommandInfo::Begin) {
            self.fold_block(Some(&embed))
        } else {
            vec![self.fold_one(embed, takes_else)]
        }
    }

    fn error(&mut self, cmd: &Command, message: &str) {
        self.errors.push(ParseError::new(cmd.line, message, cmd.raw.clone()));
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(src: &str) -> Vec<Command> {
        parse_block(src, &ParseOptions::default()).unwrap_or_else(|e| panic!("parse failed: {e:?}"))
    }

    fn parse_err(src: &str) -> Vec<ParseError> {
        parse_block(src, &ParseOptions::default()).expect_err("expected a parse error")
    }

    fn cond_of(cmd: &Command) -> &BranchCondition {
        match &cmd.info {
            CommandInfo::If { cond, .. } => cond,
            other => panic!("not an If: {other:?}"),
        }
    }

    #[test]
    fn plain_command_keeps_args_and_line() {
        let cmds = parse("\n\nEcho,Hello World");
        assert_eq!(cmds.len(), 1);
        assert_eq!(cmds[0].kind, CommandKind::Echo);
        assert_eq!(cmds[0].args, vec!["Hello World"]);
        assert_eq!(cmds[0].line, 3);
    }

    #[test]
    fn unknown_keyword_is_a_macro() {
        let cmds = parse("MyMacro,a,b");
        assert_eq!(cmds[0].kind, CommandKind::Macro);
        assert_eq!(cmds[0].info, CommandInfo::Macro { name: "MyMacro".into() });
        assert_eq!(cmds[0].args, vec!["a", "b"]);
    }

    #[test]
    fn unknown_macro_rejected_when_lookup_is_strict() {
        let known = |name: &str| name == "Known";
        let opts = ParseOptions { macro_lookup: Some(&known), ..ParseOptions::default() };
        assert!(parse_block("Known,1", &opts).is_ok());
        let errs = parse_block("Unknown,1", &opts).unwrap_err();
        assert!(errs[0].message.contains("Invalid command"));
    }

    #[test]
    fn trailing_flags_any_order() {
        let cmds = parse("FileCopy,a,b,NOREC,preserve");
        assert_eq!(cmds[0].args, vec!["a", "b"]);
        assert!(cmds[0].has_flag("PRESERVE"));
        assert!(cmds[0].has_flag("NOREC"));
    }

    #[test]
    fn flags_never_eat_required_args() {
        let cmds = parse("Set,%A%,GLOBAL");
        assert_eq!(
            cmds[0].info,
            CommandInfo::Set { key: "%A%".into(), value: "GLOBAL".into(), scope: SetScope::Local }
        );
        let cmds = parse("Set,%A%,1,PERMANENT");
        assert!(matches!(cmds[0].info, CommandInfo::Set { scope: SetScope::Permanent, .. }));
    }

    #[test]
    fn duplicate_and_conflicting_flags() {
        assert!(parse_err("FileCopy,a,b,NOWARN,nowarn")[0].message.contains("duplicated"));
        assert!(parse_err("Set,%A%,1,GLOBAL,PERMANENT")[0].message.contains("combined"));
    }

    #[test]
    fn keyed_flags() {
        let cmds = parse("IniReadSection,a.ini,Sec,%Out%,Delim=|");
        assert_eq!(cmds[0].flag_value("delim"), Some("|"));
    }

    #[test]
    fn arity_errors_carry_line() {
        let errs = parse_err("Echo,ok\nIniWrite,a,b");
        assert_eq!(errs.len(), 1);
        assert_eq!(errs[0].line, 2);
    }

    #[test]
    fn destination_must_be_variable() {
        assert!(parse_err("IniRead,a.ini,S,K,NotAVar")[0].message.contains("destination"));
        assert!(parse_err("Set,Name,1")[0].message.contains("variable key"));
        parse("IniRead,a.ini,S,K,%Dest%");
    }

    #[test]
    fn if_with_inline_embed() {
        let cmds = parse("If,%A%,Equal,1,Echo,one");
        let CommandInfo::If { cond, body, else_body } = &cmds[0].info else { panic!() };
        assert_eq!(cond.kind, CondKind::Equal);
        assert_eq!(cond.operands, vec!["%A%", "1"]);
        assert_eq!(body.len(), 1);
        assert_eq!(body[0].kind, CommandKind::Echo);
        assert!(else_body.is_none());
    }

    #[test]
    fn if_begin_end_else_chain() {
        let src = "\
If,%A%,Equal,1,Begin
  Echo,one
  Echo,uno
End
Else,If,%A%,Equal,2,Echo,two
Else,Begin
  Echo,other
End
Echo,after";
        let cmds = parse(src);
        assert_eq!(cmds.len(), 2);
        let CommandInfo::If { body, else_body: Some(else_body), .. } = &cmds[0].info else { panic!() };
        assert_eq!(body.len(), 2);
        assert_eq!(else_body.len(), 1);
        let CommandInfo::If { else_body: Some(inner_else), .. } = &else_body[0].info else { panic!() };
        assert_eq!(inner_else[0].args, vec!["other"]);
        assert_eq!(cmds[1].args, vec!["after"]);
    }

    #[test]
    fn else_binds_to_the_line_level_if() {
        let cmds = parse("If,1,Equal,2,If,3,Equal,3,Echo,inner\nElse,Echo,else");
        assert_eq!(cmds.len(), 1);
        let CommandInfo::If { body, else_body: Some(else_body), .. } = &cmds[0].info else { panic!() };
        assert!(matches!(&body[0].info, CommandInfo::If { else_body: None, .. }));
        assert_eq!(else_body[0].args, vec!["else"]);
    }

    #[test]
    fn nested_begin_blocks() {
        let src = "ForRange,1,3,1,Begin\nIf,#c,Equal,2,Begin\nBreak\nEnd\nEcho,#c\nEnd";
        let cmds = parse(src);
        let CommandInfo::ForRange { body, .. } = &cmds[0].info else { panic!() };
        assert_eq!(body.len(), 2);
        assert!(matches!(body[0].info, CommandInfo::If { .. }));
    }

    #[test]
    fn block_errors() {
        assert!(parse_err("If,1,Equal,1,Begin\nEcho,x")[0].message.contains("without matching [End]"));
        assert!(parse_err("End")[0].message.contains("without matching [Begin]"));
        assert!(parse_err("Echo,x\nElse,Echo,y")[0].message.contains("must follow"));
        assert!(parse_err("If,1,Equal,1,Else,Echo,x")[0].message.contains("cannot be embedded"));
        assert!(parse_err("If,1,Equal,1,End")[0].message.contains("cannot be embedded"));
    }

    #[test]
    fn existence_beats_comparison() {
        let cmds = parse("If,ExistMacro,Equal,Echo,X");
        let cond = cond_of(&cmds[0]);
        assert_eq!(cond.kind, CondKind::ExistMacro);
        assert_eq!(cond.operands, vec!["Equal"]);
        let CommandInfo::If { body, .. } = &cmds[0].info else { panic!() };
        assert_eq!(body[0].kind, CommandKind::Echo);
        assert_eq!(body[0].args, vec!["X"]);
    }

    #[test]
    fn not_and_not_equal() {
        let c = parse("If,Not,ExistFile,a.txt,Echo,x");
        assert!(cond_of(&c[0]).negate);
        let c = parse("If,%A%,NotEqual,1,Echo,x");
        assert_eq!(cond_of(&c[0]).kind, CondKind::Equal);
        assert!(cond_of(&c[0]).negate);
        let c = parse("If,%A%,!=,1,Echo,x");
        assert!(cond_of(&c[0]).negate);
        assert!(parse_err("If,Not,%A%,NotEqual,1,Echo,x")[0].message.contains("cannot be combined"));
        assert!(parse_err("If,%A%,Like,1,Echo,x")[0].message.contains("Incorrect branch condition"));
    }

    #[test]
    fn legacy_not_exist_forms() {
        let modern = ParseOptions::default();
        // Without the flag `NotExistFile` is not a keyword and falls to the comparison form.
        assert!(parse_block("If,NotExistFile,a.txt,Echo,x", &modern).is_err());

        let compat = CompatFlags { legacy_branch_condition: true, ..CompatFlags::default() };
        let legacy = ParseOptions { compat, macro_lookup: None };
        let cmds = parse_block("If,NotExistFile,a.txt,Echo,x", &legacy).unwrap();
        assert_eq!(cond_of(&cmds[0]).kind, CondKind::ExistFile);
        assert!(cond_of(&cmds[0]).negate);
        let errs = parse_block("If,Not,NotExistDir,d,Echo,x", &legacy).unwrap_err();
        assert!(errs[0].message.contains("cannot precede"));
    }

    #[test]
    fn question_operand_count() {
        let c = parse("If,Question,Continue?,10,True,Echo,yes");
        assert_eq!(cond_of(&c[0]).operands, vec!["Continue?", "10", "True"]);
        let c = parse("If,Question,Continue?,Echo,yes");
        assert_eq!(cond_of(&c[0]).operands, vec!["Continue?"]);
    }

    #[test]
    fn exist_var_needs_variable_form() {
        parse("If,ExistVar,%Undefined%,Set,%Dest%,T");
        assert!(parse_err("If,ExistVar,Undefined,Echo,x")[0].message.contains("ExistVar"));
    }

    #[test]
    fn loop_shapes() {
        let c = parse("Loop,%ScriptFile%,Sec,1,3,p1");
        let CommandInfo::Loop { mode, params, .. } = &c[0].info else { panic!() };
        assert_eq!(*mode, LoopMode::Number);
        assert_eq!(params.ins, vec!["p1"]);
        assert_eq!(parse("Loop,BREAK")[0].info, CommandInfo::LoopBreak);
        assert!(parse_err("Loop,Other").len() == 1);

        let c = parse("LoopLetterEx,%ScriptFile%,Sec,C,E,In=x,Out=%R%");
        let CommandInfo::Loop { mode, params, .. } = &c[0].info else { panic!() };
        assert_eq!(*mode, LoopMode::Letter);
        assert_eq!(params.outs, vec!["%R%"]);
    }

    #[test]
    fn run_ex_params() {
        let c = parse("RunEx,%ScriptFile%,Sec,In=a,Out=%B%");
        let CommandInfo::Run { params, isolate, .. } = &c[0].info else { panic!() };
        assert_eq!(params.ins, vec!["a"]);
        assert_eq!(params.outs, vec!["%B%"]);
        assert!(!isolate);
        assert!(parse_err("RunEx,%ScriptFile%,Sec,x")[0].message.contains("In= or Out="));
        assert!(parse_err("RunEx,%ScriptFile%,Sec,Out=B")[0].message.contains("Out parameter"));
    }

    #[test]
    fn system_sub_commands() {
        assert_eq!(parse("System,ErrorOff,3")[0].info, CommandInfo::System(SystemOp::ErrorOff(Some("3".into()))));
        assert_eq!(parse("System,SetLocal")[0].info, CommandInfo::System(SystemOp::SetLocal));
        assert_eq!(parse("System,endlocal")[0].info, CommandInfo::System(SystemOp::EndLocal));
        assert_eq!(parse("System,RefreshInterface")[0].info, CommandInfo::System(SystemOp::Other));
    }

    #[test]
    fn set_macro_name_validation() {
        parse("SetMacro,My_Macro1,\"Echo,x\"");
        assert!(parse_err("SetMacro,Bad-Name,Echo")[0].message.contains("Invalid macro name"));
    }

    #[test]
    fn continuation_at_section_end_is_an_error() {
        assert!(parse_err("Echo,a,\\")[0].message.contains("continuation"));
    }
}
