//! Scoped variable tables.
//!
//! Script variables live in three stores: `Fixed` (host-provided, read-only to
//! scripts), `Local` (per section-call / per-script) and `Global` (one build).
//! `Permanent` is a write target only: it lands in `Global` and is additionally
//! persisted by the interpreter into the script's `[Variables]` section.
//!
//! Keys are case-insensitive, values are plain strings.

use std::collections::HashMap;

/// Case-insensitive key/value variable store.
///
/// The spelling used by the most recent `set` is kept for display.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct VarStore {
    vars: HashMap<String, (String, String)>,
}

impl VarStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set (or overwrite) a variable.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        self.vars.insert(name.to_lowercase(), (name, value.into()));
    }

    /// Get the string value of a variable.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars.get(&name.to_lowercase()).map(|(_, v)| v.as_str())
    }

    /// Get the value of a variable parsed as an integer.
    pub fn get_int(&self, name: &str) -> Option<i64> {
        self.get(name)?.trim().parse().ok()
    }

    /// Remove a variable.  Returns `true` if it existed.
    pub fn unset(&mut self, name: &str) -> bool {
        self.vars.remove(&name.to_lowercase()).is_some()
    }

    /// Returns `true` if the variable is set.
    pub fn contains(&self, name: &str) -> bool {
        self.vars.contains_key(&name.to_lowercase())
    }

    /// Iterate over `(name, value)` pairs in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.values().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    pub fn clear(&mut self) {
        self.vars.clear();
    }
}

// ── Scopes ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VarScope {
    Fixed,
    Local,
    Global,
    /// Global plus on-disk persistence.
    Permanent,
}

/// Default read order.
pub const FIXED_FIRST: [VarScope; 3] = [VarScope::Fixed, VarScope::Local, VarScope::Global];
/// Read order with `OverridableFixedVariables`.
pub const FIXED_LAST: [VarScope; 3] = [VarScope::Local, VarScope::Global, VarScope::Fixed];

/// The three variable stores of one interpreter run.
#[derive(Debug, Default, Clone)]
pub struct Variables {
    fixed: VarStore,
    local: VarStore,
    global: VarStore,
}

impl Variables {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store(&self, scope: VarScope) -> &VarStore {
        match scope {
            VarScope::Fixed => &self.fixed,
            VarScope::Local => &self.local,
            VarScope::Global | VarScope::Permanent => &self.global,
        }
    }

    pub fn store_mut(&mut self, scope: VarScope) -> &mut VarStore {
        match scope {
            VarScope::Fixed => &mut self.fixed,
            VarScope::Local => &mut self.local,
            VarScope::Global | VarScope::Permanent => &mut self.global,
        }
    }

    /// Look `name` up in the given scope order.
    pub fn get(&self, name: &str, order: &[VarScope]) -> Option<&str> {
        order.iter().find_map(|&scope| self.store(scope).get(name))
    }

    pub fn set(&mut self, scope: VarScope, name: &str, value: impl Into<String>) {
        self.store_mut(scope).set(name, value);
    }

    pub fn unset(&mut self, scope: VarScope, name: &str) -> bool {
        self.store_mut(scope).unset(name)
    }

    /// Returns `true` if any scope holds `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.fixed.contains(name) || self.local.contains(name) || self.global.contains(name)
    }

    pub fn is_fixed(&self, name: &str) -> bool {
        self.fixed.contains(name)
    }

    /// Swap the whole local table, returning the previous one.
    pub fn replace_local(&mut self, local: VarStore) -> VarStore {
        std::mem::replace(&mut self.local, local)
    }
}

// ── Key forms ─────────────────────────────────────────────────────────────────

/// The left-hand side of a `Set` statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VarKey {
    /// `%Name%`
    Var(String),
    /// `#1`..`#9`
    InParam(usize),
    /// `#o1`..`#o9`
    OutParam(usize),
    /// `#r`
    ReturnValue,
    /// `#c`
    LoopCounter,
}

/// Classify a raw destination string.
pub fn detect_key(raw: &str) -> Option<VarKey> {
    let s = raw.trim();
    if let Some(name) = trim_percent(s) {
        return Some(VarKey::Var(name.to_owned()));
    }
    let rest = s.strip_prefix('#')?;
    let bytes = rest.as_bytes();
    match bytes {
        [d @ b'1'..=b'9'] => Some(VarKey::InParam((d - b'0') as usize)),
        [b'o' | b'O', d @ b'1'..=b'9'] => Some(VarKey::OutParam((d - b'0') as usize)),
        [b'r' | b'R'] => Some(VarKey::ReturnValue),
        [b'c' | b'C'] => Some(VarKey::LoopCounter),
        _ => None,
    }
}

/// Strip the surrounding `%` from a well-formed variable reference.
pub fn trim_percent(s: &str) -> Option<&str> {
    let name = s.strip_prefix('%')?.strip_suffix('%')?;
    is_var_name(name).then_some(name)
}

/// Characters allowed between the `%` delimiters of a variable key.
pub fn is_var_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '#' | '(' | ')' | '.'))
}

/// One `Key=Value` line of a `[Variables]`-style section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Declaration {
    pub line: usize,
    pub key: String,
    pub value: String,
}

/// Split the body of a `[Variables]`-style section into `%Key%=Value`
/// variable lines (key without the `%`) and `Name=Command` macro lines.
///
/// Values are trimmed and one pair of surrounding double quotes is removed.
/// Lines without `=` and comment lines are skipped.
pub fn split_variable_lines<'a>(
    lines: impl IntoIterator<Item = (usize, &'a str)>,
) -> (Vec<Declaration>, Vec<Declaration>) {
    let mut vars = Vec::new();
    let mut macros = Vec::new();
    for (line, text) in lines {
        let text = text.trim();
        if text.is_empty() || text.starts_with(';') || text.starts_with('#') || text.starts_with("//") {
            continue;
        }
        let Some((key, value)) = text.split_once('=') else { continue };
        let key = key.trim();
        let value = strip_quotes(value.trim()).to_owned();
        if let Some(name) = trim_percent(key) {
            vars.push(Declaration { line, key: name.to_owned(), value });
        } else if !key.is_empty() {
            macros.push(Declaration { line, key: key.to_owned(), value });
        }
    }
    (vars, macros)
}

fn strip_quotes(s: &str) -> &str {
    if s.len() >= 2 && s.starts_with('"') && s.ends_with('"') {
        &s[1..s.len() - 1]
    } else {
        s
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
