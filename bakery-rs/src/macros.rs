//! Script macros.
//!
//! A macro is a named single statement.  Global macros come from a script's
//! macro section (default `[ApiVar]`) and the non-`%` keys of its
//! `[Variables]` section; local macros are added at runtime by `SetMacro`
//! and `AddVariables`.  Lookup is local first, so a local definition shadows
//! a global one of the same name.  Names are case-sensitive.

use std::collections::HashMap;

use crate::error::ParseError;
use crate::script::command::Command;
use crate::script::stmt::{parse_section, ParseOptions};
use crate::var::Declaration;

/// Returns `true` if `name` is usable as a macro name.
pub fn is_macro_name(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MacroScope {
    Global,
    Local,
}

/// A defined macro.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MacroEntry {
    pub name: String,
    /// Body as written, kept for persisting.
    pub source: String,
    pub body: Command,
}

impl MacroEntry {
    /// Parse `source` into a macro.  The body must be exactly one statement
    /// (which may be a folded `If`/`Begin` block on one line).
    pub fn parse(name: &str, source: &str, line: usize, opts: &ParseOptions<'_>) -> Result<Self, ParseError> {
        if !is_macro_name(name) {
            return Err(ParseError::new(line, format!("Invalid macro name [{name}]"), source));
        }
        let mut cmds = parse_section([(line, source)], opts).map_err(|mut errs| errs.remove(0))?;
        if cmds.len() != 1 {
            return Err(ParseError::new(line, format!("Macro [{name}] must hold one statement"), source));
        }
        Ok(MacroEntry { name: name.to_owned(), source: source.to_owned(), body: cmds.remove(0) })
    }
}

/// Global and local macro tables.
#[derive(Debug, Default, Clone)]
pub struct MacroStore {
    global: HashMap<String, MacroEntry>,
    local: HashMap<String, MacroEntry>,
}

impl MacroStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a macro.
    pub fn insert(&mut self, scope: MacroScope, entry: MacroEntry) {
        self.table_mut(scope).insert(entry.name.clone(), entry);
    }

    /// Remove a macro from one scope.  Returns `true` if it existed.
    pub fn remove(&mut self, scope: MacroScope, name: &str) -> bool {
        self.table_mut(scope).remove(name).is_some()
    }

    /// Resolve `name`, local first.
    pub fn get(&self, name: &str) -> Option<&MacroEntry> {
        self.local.get(name).or_else(|| self.global.get(name))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn scope_of(&self, name: &str) -> Option<MacroScope> {
        if self.local.contains_key(name) {
            Some(MacroScope::Local)
        } else if self.global.contains_key(name) {
            Some(MacroScope::Global)
        } else {
            None
        }
    }

    pub fn len(&self) -> usize {
        self.global.len() + self.local.len()
    }

    pub fn is_empty(&self) -> bool {
        self.global.is_empty() && self.local.is_empty()
    }

    /// Swap the whole local table, returning the previous one.
    pub fn replace_local(&mut self, local: HashMap<String, MacroEntry>) -> HashMap<String, MacroEntry> {
        std::mem::replace(&mut self.local, local)
    }

    pub fn clear_local(&mut self) {
        self.local.clear();
    }

    /// Define every `Name=Command` declaration in `scope`.  Malformed entries
    /// are skipped and returned.
    pub fn load(&mut self, scope: MacroScope, decls: &[Declaration], opts: &ParseOptions<'_>) -> Vec<ParseError> {
        let mut errors = Vec::new();
        for decl in decls {
            match MacroEntry::parse(&decl.key, &decl.value, decl.line, opts) {
                Ok(entry) => self.insert(scope, entry),
                Err(e) => errors.push(e),
            }
        }
        errors
    }

    /// Sorted names of all macros, for diagnostics.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.global.keys().chain(self.local.keys()).map(String::as_str).collect();
        names.sort_unstable();
        names.dedup();
        names
    }

    fn table_mut(&mut self, scope: MacroScope) -> &mut HashMap<String, MacroEntry> {
        match scope {
            MacroScope::Global => &mut self.global,
            MacroScope::Local => &mut self.local,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::command::CommandKind;

    fn entry(name: &str, body: &str) -> MacroEntry {
        MacroEntry::parse(name, body, 1, &ParseOptions::default()).expect("macro parse")
    }

    #[test]
    fn names() {
        assert!(is_macro_name("Echo_2"));
        assert!(!is_macro_name(""));
        assert!(!is_macro_name("a-b"));
        assert!(!is_macro_name("%A%"));
    }

    #[test]
    fn local_shadows_global() {
        let mut store = MacroStore::new();
        store.insert(MacroScope::Global, entry("M", "Echo,global"));
        store.insert(MacroScope::Local, entry("M", "Echo,local"));
        assert_eq!(store.get("M").map(|m| m.body.args[0].as_str()), Some("local"));
        assert_eq!(store.scope_of("M"), Some(MacroScope::Local));
        assert!(store.remove(MacroScope::Local, "M"));
        assert_eq!(store.get("M").map(|m| m.body.args[0].as_str()), Some("global"));
    }

    #[test]
    fn names_are_case_sensitive() {
        let mut store = MacroStore::new();
        store.insert(MacroScope::Global, entry("Copy", "Echo,x"));
        assert!(store.contains("Copy"));
        assert!(!store.contains("copy"));
    }

    #[test]
    fn redefinition_overwrites() {
        let mut store = MacroStore::new();
        store.insert(MacroScope::Global, entry("A", "Echo,1"));
        store.insert(MacroScope::Global, entry("A", "Echo,2"));
        assert_eq!(store.len(), 1);
        assert_eq!(store.get("A").map(|m| m.source.as_str()), Some("Echo,2"));
    }

    #[test]
    fn body_is_parsed_and_folded() {
        let m = entry("Check", "If,#1,Equal,1,Echo,one");
        assert_eq!(m.body.kind, CommandKind::If);
        let err = MacroEntry::parse("Open", "If,#1,Equal,1,Begin", 4, &ParseOptions::default()).unwrap_err();
        assert_eq!(err.line, 4);
    }

    #[test]
    fn load_reports_bad_entries() {
        let decls = vec![
            Declaration { line: 1, key: "Good".into(), value: "Echo,hi".into() },
            Declaration { line: 2, key: "Bad".into(), value: "IniWrite,x".into() },
            Declaration { line: 3, key: "bad-name".into(), value: "Echo,x".into() },
        ];
        let mut store = MacroStore::new();
        let errs = store.load(MacroScope::Global, &decls, &ParseOptions::default());
        assert_eq!(errs.iter().map(|e| e.line).collect::<Vec<_>>(), vec![2, 3]);
        assert_eq!(store.names(), vec!["Good"]);
    }

    #[test]
    fn replace_local_isolates() {
        let mut store = MacroStore::new();
        store.insert(MacroScope::Local, entry("L", "Echo,x"));
        let saved = store.replace_local(HashMap::new());
        assert!(!store.contains("L"));
        store.replace_local(saved);
        assert!(store.contains("L"));
    }
}
