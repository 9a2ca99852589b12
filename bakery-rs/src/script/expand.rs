//! Variable and section-parameter expansion.
//!
//! | Sequence    | Meaning                                                   |
//! |-------------|-----------------------------------------------------------|
//! | `%Name%`    | Variable `Name` (empty string when unset)                 |
//! | `#1` … `#9` | Section in-parameter                                      |
//! | `#a`        | Number of in-parameters                                   |
//! | `#o1` … `#o9` | Current value of the variable bound to an out-parameter |
//! | `#oa`       | Number of out-parameters                                  |
//! | `#r`        | Return register                                           |
//! | `#c`        | Innermost loop counter (error outside a loop)             |
//! | `##`        | Literal `#`, never expanded                               |
//!
//! Section parameters are replaced in one pass, then `%Name%` references are
//! replaced repeatedly until nothing changes.  A value that keeps producing
//! new references (`%A%` = `%B%`, `%B%` = `%A%`) hits the iteration cap and
//! becomes [`RuntimeError::ExpansionLimit`].  So does a result longer than
//! [`MAX_EXPANDED_LEN`], which stops self-doubling values (`%A%` =
//! `%A%%A%`) long before the pass cap would.
//!
//! [`preprocess`] additionally decodes escapes, which is what almost every
//! argument goes through before it reaches an executor.

use crate::config::CompatFlags;
use crate::error::RuntimeError;

use super::escape::unescape;

/// Callbacks the expander needs from the interpreter.
pub trait ExpandContext {
    /// Value of a stored variable, by bare name.
    fn var(&self, name: &str) -> Option<String>;

    /// In-parameter `n` (1-based).
    fn in_param(&self, _n: usize) -> Option<String> {
        None
    }

    fn in_param_count(&self) -> usize {
        0
    }

    /// Current value of the variable bound to out-parameter `n` (1-based).
    fn out_param(&self, _n: usize) -> Option<String> {
        None
    }

    fn out_param_count(&self) -> usize {
        0
    }

    fn return_value(&self) -> String {
        String::new()
    }

    /// Innermost loop counter, `None` outside any loop.
    fn loop_counter(&self) -> Option<String> {
        None
    }

    /// `true` while running the build's entry section, where a missing
    /// `#N` stays as the literal `##N`.
    fn at_entry_section(&self) -> bool {
        false
    }

    fn compat(&self) -> CompatFlags {
        CompatFlags::default()
    }

    fn expansion_limit(&self) -> usize {
        32
    }
}

/// Expand section parameters and variables.
pub fn expand(src: &str, ctx: &dyn ExpandContext) -> Result<String, RuntimeError> {
    let params = if src.contains('#') { expand_params(src, ctx)? } else { src.to_owned() };
    if params.contains('%') {
        expand_vars(&params, ctx)
    } else {
        Ok(params)
    }
}

/// [`expand`] followed by escape decoding.
pub fn preprocess(src: &str, ctx: &dyn ExpandContext) -> Result<String, RuntimeError> {
    Ok(unescape(&expand(src, ctx)?))
}

/// Expand every string of `args`.
pub fn preprocess_all(args: &[String], ctx: &dyn ExpandContext) -> Result<Vec<String>, RuntimeError> {
    args.iter().map(|a| preprocess(a, ctx)).collect()
}

// ── Section parameters ────────────────────────────────────────────────────────

/// Replace `#N`, `#a`, `#oN`, `#oa`, `#r` and `#c`.  `##` is copied through
/// untouched so the escape decoder can turn it into `#` later.
pub fn expand_params(src: &str, ctx: &dyn ExpandContext) -> Result<String, RuntimeError> {
    let extended = !ctx.compat().disable_extended_section_params;
    let chars: Vec<char> = src.chars().collect();
    let mut out = String::with_capacity(src.len());
    let mut i = 0;

    while i < chars.len() {
        if chars[i] != '#' {
            out.push(chars[i]);
            i += 1;
            continue;
        }
        let next = chars.get(i + 1).copied();
        match next {
            Some('#') => {
                out.push_str("##");
                i += 2;
            }
            Some(d @ '1'..='9') => {
                let n = d as usize - '0' as usize;
                match ctx.in_param(n) {
                    Some(v) => out.push_str(&v),
                    None if ctx.at_entry_section() => {
                        out.push_str("##");
                        out.push(d);
                    }
                    None => {}
                }
                i += 2;
            }
            Some('a' | 'A') if extended => {
                out.push_str(&ctx.in_param_count().to_string());
                i += 2;
            }
            Some('o' | 'O') if extended => match chars.get(i + 2).copied() {
                Some(d @ '1'..='9') => {
                    let n = d as usize - '0' as usize;
                    out.push_str(&ctx.out_param(n).unwrap_or_default());
                    i += 3;
                }
                Some('a' | 'A') => {
                    out.push_str(&ctx.out_param_count().to_string());
                    i += 3;
                }
                _ => {
                    out.push('#');
                    i += 1;
                }
            },
            Some('r' | 'R') if extended => {
                out.push_str(&ctx.return_value());
                i += 2;
            }
            Some('c' | 'C') => {
                out.push_str(&ctx.loop_counter().ok_or(RuntimeError::NoActiveLoop)?);
                i += 2;
            }
            _ => {
                out.push('#');
                i += 1;
            }
        }
    }
    Ok(out)
}

// ── Variables ─────────────────────────────────────────────────────────────────

/// Longest string a single expansion may produce, in bytes.
pub const MAX_EXPANDED_LEN: usize = 1 << 20;

/// Replace `%Name%` references until a pass changes nothing.
pub fn expand_vars(src: &str, ctx: &dyn ExpandContext) -> Result<String, RuntimeError> {
    let limit = ctx.expansion_limit();
    let mut current = src.to_owned();
    for _ in 0..limit {
        match substitute_once(&current, ctx, limit)? {
            Some(next) => current = next,
            None => return Ok(current),
        }
    }
    // One more look: the last allowed pass may have been the final one.
    match substitute_once(&current, ctx, limit)? {
        None => Ok(current),
        Some(_) => Err(RuntimeError::ExpansionLimit(limit)),
    }
}

/// One left-to-right substitution pass.  Returns `None` when `src` holds no
/// variable reference.
fn substitute_once(src: &str, ctx: &dyn ExpandContext, limit: usize) -> Result<Option<String>, RuntimeError> {
    let mut out = String::with_capacity(src.len());
    let mut rest = src;
    let mut changed = false;

    while let Some(open) = rest.find('%') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        match after.find('%') {
            Some(close) if close > 0 && !after[..close].contains(' ') => {
                let name = &after[..close];
                out.push_str(&ctx.var(name).unwrap_or_default());
                changed = true;
                rest = &after[close + 1..];
            }
            _ => {
                out.push('%');
                rest = after;
            }
        }
        if out.len() > MAX_EXPANDED_LEN {
            return Err(RuntimeError::ExpansionLimit(limit));
        }
    }
    out.push_str(rest);
    if out.len() > MAX_EXPANDED_LEN {
        return Err(RuntimeError::ExpansionLimit(limit));
    }
    Ok(changed.then_some(out))
}

/// Names referenced as `%Name%` in `src`, in order of appearance.
pub fn referenced_vars(src: &str) -> Vec<&str> {
    let mut names = Vec::new();
    let mut rest = src;
    while let Some(open) = rest.find('%') {
        let after = &rest[open + 1..];
        match after.find('%') {
            Some(close) if close > 0 && !after[..close].contains(' ') => {
                names.push(&after[..close]);
                rest = &after[close + 1..];
            }
            _ => rest = after,
        }
    }
    names
}

// ── Tests ─────────────────────────────────────────────────────────────────────
