//! `bakery.ini` settings loader.
//!
//! The settings file is a plain INI document with two recognised sections:
//!
//! | Section | Keys |
//! |---------|------|
//! | `[Engine]` | `OptimizeCode`, `StopBuildOnError`, `ExpansionLimit`, `MacroSection`, `EntrySection` |
//! | `[Compat]` | one boolean per [`CompatFlags`] field, e.g. `OverridableLoopCounter=True` |
//!
//! Lines starting with `;` or `#` are comments.  Unknown sections are skipped;
//! unknown keys and malformed values inside the recognised sections are
//! reported as [`ConfigError`]s and otherwise ignored, so a damaged settings
//! file never prevents a build from starting.

use std::path::{Path, PathBuf};

// ── Public API ────────────────────────────────────────────────────────────────

/// A non-fatal error encountered while loading a settings file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigError {
    pub line: usize,
    pub message: String,
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "line {}: {}", self.line, self.message)
    }
}

impl std::error::Error for ConfigError {}

/// Legacy-compatibility toggles.  Every flag defaults to the modern behaviour.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompatFlags {
    /// `Loop` accepts single letters as bounds and behaves like `LoopLetter`.
    pub allow_letter_loop_counters: bool,
    /// `Set,#c,<value>` may overwrite the active loop counter.
    pub overridable_loop_counter: bool,
    /// Turns off `#a`, `#oN`, `#oa` and `#r` expansion.
    pub disable_extended_section_params: bool,
    /// `IniWrite` compacts the target file after writing.
    pub auto_compact_on_ini_write: bool,
    /// `DirCopy,<src>\*,<dest>` also copies the matching top-level files.
    pub legacy_dir_copy_wildcard_bug: bool,
    /// Local and global variables shadow fixed variables.
    pub overridable_fixed_variables: bool,
    /// Accept `NotExistFile`, `NotExistDir`, … branch conditions.
    pub legacy_branch_condition: bool,
}

/// Key names accepted in `[Compat]` and by `--compat`.
const COMPAT_KEYS: &[&str] = &[
    "AllowLetterLoopCounters",
    "OverridableLoopCounter",
    "DisableExtendedSectionParams",
    "AutoCompactOnIniWrite",
    "LegacyDirCopyWildcardBug",
    "OverridableFixedVariables",
    "LegacyBranchCondition",
];

impl CompatFlags {
    /// Set the flag named `key` (case-insensitive).
    pub fn set(&mut self, key: &str, value: bool) -> Result<(), String> {
        let slot = match key.to_ascii_lowercase().as_str() {
            "allowletterloopcounters" => &mut self.allow_letter_loop_counters,
            "overridableloopcounter" => &mut self.overridable_loop_counter,
            "disableextendedsectionparams" => &mut self.disable_extended_section_params,
            "autocompactoniniwrite" => &mut self.auto_compact_on_ini_write,
            "legacydircopywildcardbug" => &mut self.legacy_dir_copy_wildcard_bug,
            "overridablefixedvariables" => &mut self.overridable_fixed_variables,
            "legacybranchcondition" => &mut self.legacy_branch_condition,
            _ => {
                return Err(format!(
                    "unknown compat flag [{key}] (expected one of {})",
                    COMPAT_KEYS.join(", ")
                ))
            }
        };
        *slot = value;
        Ok(())
    }
}

/// Engine settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Run the batching pass over parsed sections.
    pub optimize_code: bool,
    /// An unmuted runtime error stops the whole build.
    pub stop_build_on_error: bool,
    /// Maximum `%Var%` expansion rounds before a circular reference is assumed.
    pub expansion_limit: usize,
    /// Section holding script-declared global macros.
    pub macro_section: String,
    /// Section run when a script is started.
    pub entry_section: String,
    pub compat: CompatFlags,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            optimize_code: true,
            stop_build_on_error: true,
            expansion_limit: 32,
            macro_section: "ApiVar".to_owned(),
            entry_section: "Process".to_owned(),
            compat: CompatFlags::default(),
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a settings string.
    ///
    /// Returns the config and a list of problems found on recognised lines.
    pub fn load_str(s: &str) -> (Self, Vec<ConfigError>) {
        let mut config = Config::new();
        let mut errors = Vec::new();
        let mut section = String::new();

        for (i, raw) in s.lines().enumerate() {
            let lineno = i + 1;
            let line = raw.trim();

            if line.is_empty() || line.starts_with(';') || line.starts_with('#') {
                continue;
            }

            if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
                section = name.trim().to_ascii_lowercase();
                continue;
            }

            let Some((key, value)) = line.split_once('=') else {
                if matches!(section.as_str(), "engine" | "compat") {
                    errors.push(ConfigError { line: lineno, message: format!("expected key=value, got [{line}]") });
                }
                continue;
            };
            let (key, value) = (key.trim(), value.trim());

            let result = match section.as_str() {
                "engine" => config.set_engine_key(key, value),
                "compat" => match parse_bool(value) {
                    Some(b) => config.compat.set(key, b),
                    None => Err(format!("[{value}] is not a boolean")),
                },
                _ => Ok(()), // other sections belong to other tools
            };
            if let Err(message) = result {
                errors.push(ConfigError { line: lineno, message });
            }
        }

        (config, errors)
    }

    /// Read and parse a settings file from disk.
    pub fn load_file(path: &Path) -> std::io::Result<(Self, Vec<ConfigError>)> {
        let s = std::fs::read_to_string(path)?;
        Ok(Self::load_str(&s))
    }

    /// Apply a `Key=Value` compat override from the command line.
    pub fn apply_compat_override(&mut self, spec: &str) -> Result<(), String> {
        let (key, value) = spec
            .split_once('=')
            .ok_or_else(|| format!("expected Key=Value, got [{spec}]"))?;
        let value = parse_bool(value.trim()).ok_or_else(|| format!("[{value}] is not a boolean"))?;
        self.compat.set(key.trim(), value)
    }

    fn set_engine_key(&mut self, key: &str, value: &str) -> Result<(), String> {
        match key.to_ascii_lowercase().as_str() {
            "optimizecode" => self.optimize_code = bool_value(value)?,
            "stopbuildonerror" => self.stop_build_on_error = bool_value(value)?,
            "expansionlimit" => {
                let n: usize = value
                    .parse()
                    .map_err(|_| format!("[{value}] is not a positive integer"))?;
                if n == 0 {
                    return Err("ExpansionLimit must be at least 1".to_owned());
                }
                self.expansion_limit = n;
            }
            "macrosection" => self.macro_section = value.to_owned(),
            "entrysection" => self.entry_section = value.to_owned(),
            _ => return Err(format!("unknown engine setting [{key}]")),
        }
        Ok(())
    }
}

// ── Helpers ───────────────────────────────────────────────────────────────────

/// Parse the boolean spellings used by legacy settings files.
pub fn parse_bool(s: &str) -> Option<bool> {
    match s.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn bool_value(s: &str) -> Result<bool, String> {
    parse_bool(s).ok_or_else(|| format!("[{s}] is not a boolean"))
}

/// Platform settings location, e.g. `~/.config/bakery/bakery.ini`.
pub fn default_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("org", "bakery", "bakery")
        .map(|dirs| dirs.config_dir().join("bakery.ini"))
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_modern() {
        let c = Config::new();
        assert!(c.optimize_code);
        assert!(c.stop_build_on_error);
        assert_eq!(c.expansion_limit, 32);
        assert_eq!(c.entry_section, "Process");
        assert_eq!(c.compat, CompatFlags::default());
    }

    #[test]
    fn load_engine_and_compat_sections() {
        let src = "\
; settings
[Engine]
OptimizeCode=False
ExpansionLimit=8
MacroSection=MyMacros

[compat]
OverridableLoopCounter=True
allowletterloopcounters=1
";
        let (c, errs) = Config::load_str(src);
        assert!(errs.is_empty(), "{errs:?}");
        assert!(!c.optimize_code);
        assert_eq!(c.expansion_limit, 8);
        assert_eq!(c.macro_section, "MyMacros");
        assert!(c.compat.overridable_loop_counter);
        assert!(c.compat.allow_letter_loop_counters);
        assert!(!c.compat.legacy_branch_condition);
    }

    #[test]
    fn bad_lines_are_reported_with_line_numbers() {
        let src = "[Compat]\nNoSuchFlag=True\nLegacyBranchCondition=maybe\n[Engine]\nExpansionLimit=0\n";
        let (c, errs) = Config::load_str(src);
        let lines: Vec<usize> = errs.iter().map(|e| e.line).collect();
        assert_eq!(lines, vec![2, 3, 5]);
        assert_eq!(c.expansion_limit, 32);
    }

    #[test]
    fn foreign_sections_are_ignored() {
        let (_, errs) = Config::load_str("[Window]\nWidth=800\njunk line\n");
        assert!(errs.is_empty());
    }

    #[test]
    fn compat_override() {
        let mut c = Config::new();
        c.apply_compat_override("AutoCompactOnIniWrite=true").unwrap();
        assert!(c.compat.auto_compact_on_ini_write);
        assert!(c.apply_compat_override("AutoCompactOnIniWrite").is_err());
        assert!(c.apply_compat_override("Bogus=true").is_err());
    }

    #[test]
    fn parse_bool_spellings() {
        assert_eq!(parse_bool("TRUE"), Some(true));
        assert_eq!(parse_bool("0"), Some(false));
        assert_eq!(parse_bool("2"), None);
    }
}
