//! Branch condition evaluation.
//!
//! Comparisons follow the legacy rules:
//!
//! - If both operands are integers (decimal, optionally signed, or `0x` hex)
//!   they compare numerically.
//! - Otherwise, if both are dotted versions (`11.1`, `5.0.2`) they compare
//!   component-wise with missing components treated as zero, so `5` equals
//!   `5.0` and `11.1` equals `11.1.0`.
//! - Anything else is text: only equality is defined (case-insensitive for
//!   `Equal`, exact for `EqualX`); `Smaller`/`Bigger` are always false.
//!
//! `negate` is applied to the final result only.

use std::cmp::Ordering;

use crate::config::parse_bool;
use crate::error::RuntimeError;
use crate::executor::{RegRoot, ResourceProbe};
use crate::var::trim_percent;

use super::command::{BranchCondition, CondKind};

/// Outcome of comparing two operands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareResult {
    Equal,
    Smaller,
    Bigger,
    /// Different and unordered (text operands).
    NotEqual,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Operand {
    Int(i128),
    Version(Vec<u64>),
    Text,
}

fn parse_int(s: &str) -> Option<i128> {
    let s = s.trim();
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        if hex.is_empty() || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return None;
        }
        return u64::from_str_radix(hex, 16).ok().map(i128::from);
    }
    let digits = s.strip_prefix(['+', '-']).unwrap_or(s);
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

fn parse_version(s: &str) -> Option<Vec<u64>> {
    s.trim()
        .split('.')
        .map(|part| {
            if part.is_empty() || !part.chars().all(|c| c.is_ascii_digit()) {
                None
            } else {
                part.parse().ok()
            }
        })
        .collect()
}

fn classify(s: &str) -> Operand {
    if let Some(n) = parse_int(s) {
        Operand::Int(n)
    } else if let Some(v) = parse_version(s) {
        Operand::Version(v)
    } else {
        Operand::Text
    }
}

fn ordering(o: Ordering) -> CompareResult {
    match o {
        Ordering::Less => CompareResult::Smaller,
        Ordering::Equal => CompareResult::Equal,
        Ordering::Greater => CompareResult::Bigger,
    }
}

fn compare_versions(a: &[u64], b: &[u64]) -> Ordering {
    let len = a.len().max(b.len());
    (0..len)
        .map(|i| a.get(i).copied().unwrap_or(0).cmp(&b.get(i).copied().unwrap_or(0)))
        .find(|o| o.is_ne())
        .unwrap_or(Ordering::Equal)
}

/// Numeric-or-version comparison; `None` when the operands are not both of
/// one comparable type.
fn compare_numeric(a: &str, b: &str) -> Option<CompareResult> {
    match (classify(a), classify(b)) {
        (Operand::Int(x), Operand::Int(y)) => Some(ordering(x.cmp(&y))),
        (Operand::Int(_), Operand::Version(_)) | (Operand::Version(_), Operand::Int(_)) => {
            // A plain decimal is also a one-component version.
            let (va, vb) = (parse_version(a)?, parse_version(b)?);
            Some(ordering(compare_versions(&va, &vb)))
        }
        (Operand::Version(x), Operand::Version(y)) => Some(ordering(compare_versions(&x, &y))),
        _ => None,
    }
}

/// Compare two expanded operands.
pub fn compare(a: &str, b: &str) -> CompareResult {
    compare_numeric(a, b).unwrap_or_else(|| {
        if a.to_lowercase() == b.to_lowercase() {
            CompareResult::Equal
        } else {
            CompareResult::NotEqual
        }
    })
}

/// Pure comparison predicate, before negation.
pub fn compare_matches(kind: CondKind, a: &str, b: &str) -> bool {
    match kind {
        CondKind::EqualX => match compare_numeric(a, b) {
            Some(r) => r == CompareResult::Equal,
            None => a == b,
        },
        _ => {
            let r = compare(a, b);
            match kind {
                CondKind::Equal => r == CompareResult::Equal,
                CondKind::Smaller => r == CompareResult::Smaller,
                CondKind::SmallerEqual => matches!(r, CompareResult::Smaller | CompareResult::Equal),
                CondKind::Bigger => r == CompareResult::Bigger,
                CondKind::BiggerEqual => matches!(r, CompareResult::Bigger | CompareResult::Equal),
                _ => false,
            }
        }
    }
}

// ── Evaluation ────────────────────────────────────────────────────────────────

/// What the evaluator needs besides the probe.
pub trait CondEnv {
    fn probe(&self) -> &dyn ResourceProbe;
    fn var_exists(&self, name: &str) -> bool;
    fn macro_exists(&self, name: &str) -> bool;
}

fn index_arg(s: &str) -> Result<u32, RuntimeError> {
    s.trim().parse().map_err(|_| RuntimeError::InvalidInteger(s.to_owned()))
}

/// Evaluate `cond` against already expanded `operands` (`ExistVar` gets its
/// raw operand).
pub fn evaluate(cond: &BranchCondition, operands: &[String], env: &dyn CondEnv) -> Result<bool, RuntimeError> {
    let op = |i: usize| operands.get(i).map(String::as_str).unwrap_or("");
    let probe = env.probe();

    let result = match cond.kind {
        CondKind::Equal
        | CondKind::EqualX
        | CondKind::Smaller
        | CondKind::SmallerEqual
        | CondKind::Bigger
        | CondKind::BiggerEqual => compare_matches(cond.kind, op(0), op(1)),

        CondKind::ExistFile => probe.file_exists(op(0))?,
        CondKind::ExistDir => probe.dir_exists(op(0))?,
        CondKind::ExistSection => probe.ini_section_exists(op(0), op(1))?,
        CondKind::ExistRegSection | CondKind::ExistRegSubKey => {
            probe.registry_key_exists(RegRoot::parse(op(0))?, op(1))?
        }
        CondKind::ExistRegKey | CondKind::ExistRegValue => {
            probe.registry_value_exists(RegRoot::parse(op(0))?, op(1), op(2))?
        }
        CondKind::ExistRegMulti => probe.registry_multi_contains(RegRoot::parse(op(0))?, op(1), op(2), op(3))?,
        CondKind::ExistVar => trim_percent(op(0).trim()).is_some_and(|name| env.var_exists(name)),
        CondKind::ExistMacro => env.macro_exists(op(0).trim()),
        CondKind::WimExistIndex => probe.archive_index_exists(op(0), index_arg(op(1))?)?,
        CondKind::WimExistFile => probe.archive_entry_exists(op(0), index_arg(op(1))?, op(2), false)?,
        CondKind::WimExistDir => probe.archive_entry_exists(op(0), index_arg(op(1))?, op(2), true)?,
        CondKind::WimExistImageInfo => probe.archive_metadata_exists(op(0), index_arg(op(1))?, op(2))?,
        CondKind::Ping => probe.host_reachable(op(0))?,
        CondKind::Online => probe.online()?,
        CondKind::Question => {
            let (timeout, default) = if operands.len() >= 3 {
                let digits: String = op(1).chars().filter(char::is_ascii_digit).collect();
                (digits.parse().ok(), parse_bool(op(2).trim()))
            } else {
                (None, None)
            };
            probe.question(op(0), timeout, default)?
        }
    };
    Ok(result != cond.negate)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
