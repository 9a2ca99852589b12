//! Script files: sections, their raw lines, and the parse cache.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use crate::error::{EngineError, ParseError};
use crate::var::{split_variable_lines, Declaration};

use super::command::Command;
use super::optimize::optimize;
use super::stmt::{parse_section, ParseOptions};

/// Sections that hold data rather than code.
const DATA_SECTIONS: &[&str] = &["Main", "Variables", "Interface", "InterfaceEncoded", "EncodedFolders", "AuthorEncoded"];

/// Keywords that can define macros at runtime.
const MACRO_DEFINERS: &[&str] = &["SetMacro", "AddVariables", "Exec"];

pub type ParsedSection = Result<Arc<Vec<Command>>, Vec<ParseError>>;

/// One `[Name]` block.
#[derive(Debug)]
pub struct Section {
    pub name: String,
    /// `(line number, text)` of every body line, blank lines included.
    pub lines: Vec<(usize, String)>,
    parsed: OnceLock<ParsedSection>,
}

impl Section {
    fn new(name: &str) -> Self {
        Section { name: name.to_owned(), lines: Vec::new(), parsed: OnceLock::new() }
    }

    pub fn line_refs(&self) -> impl Iterator<Item = (usize, &str)> {
        self.lines.iter().map(|(n, l)| (*n, l.as_str()))
    }

    /// Returns `true` if every non-comment line is a `Key=Value` pair.
    pub fn looks_like_data(&self) -> bool {
        self.line_refs().map(|(_, l)| l.trim()).filter(|l| !super::lexer::is_comment(l)).all(|l| {
            match (l.find('='), l.find(',')) {
                (Some(eq), Some(comma)) => eq < comma,
                (Some(_), None) => true,
                _ => false,
            }
        })
    }

    /// Parsed and (optionally) batched body.  The first call decides; later
    /// calls return the cached result regardless of `opts`.
    pub fn commands(&self, opts: &ParseOptions<'_>, optimize_code: bool) -> ParsedSection {
        self.parsed
            .get_or_init(|| {
                let cmds = parse_section(self.line_refs(), opts)?;
                Ok(Arc::new(if optimize_code { optimize(cmds) } else { cmds }))
            })
            .clone()
    }
}

/// A loaded script file.
#[derive(Debug)]
pub struct Script {
    pub path: PathBuf,
    sections: Vec<Section>,
    index: HashMap<String, usize>,
}

impl Script {
    /// Split `text` into sections.  Lines before the first header are
    /// ignored; a repeated header continues the earlier section.
    pub fn parse(path: impl Into<PathBuf>, text: &str) -> Self {
        let text = text.strip_prefix('\u{feff}').unwrap_or(text);
        let mut script = Script { path: path.into(), sections: Vec::new(), index: HashMap::new() };
        let mut current: Option<usize> = None;
        for (i, raw) in text.lines().enumerate() {
            let t = raw.trim();
            if let Some(name) = t.strip_prefix('[').and_then(|r| r.strip_suffix(']')) {
                let key = name.trim().to_lowercase();
                let idx = match script.index.get(&key) {
                    Some(&idx) => idx,
                    None => {
                        script.sections.push(Section::new(name.trim()));
                        script.index.insert(key, script.sections.len() - 1);
                        script.sections.len() - 1
                    }
                };
                current = Some(idx);
                continue;
            }
            if let Some(idx) = current {
                script.sections[idx].lines.push((i + 1, raw.to_owned()));
            }
        }
        script
    }

    pub fn load(path: &Path) -> Result<Self, EngineError> {
        let text =
            std::fs::read_to_string(path).map_err(|source| EngineError::Io { path: path.to_owned(), source })?;
        Ok(Self::parse(path, &text))
    }

    pub fn display_path(&self) -> String {
        self.path.display().to_string()
    }

    /// Directory holding the script, `.` when it has none.
    pub fn dir(&self) -> PathBuf {
        match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_owned(),
            _ => PathBuf::from("."),
        }
    }

    pub fn section(&self, name: &str) -> Option<&Section> {
        self.index.get(&name.trim().to_lowercase()).map(|&i| &self.sections[i])
    }

    pub fn sections(&self) -> impl Iterator<Item = &Section> {
        self.sections.iter()
    }

    /// `(variables, macros)` declared in `section`; empty if it is missing.
    pub fn declarations(&self, section: &str) -> (Vec<Declaration>, Vec<Declaration>) {
        match self.section(section) {
            Some(s) => split_variable_lines(s.line_refs()),
            None => (Vec::new(), Vec::new()),
        }
    }

    /// Returns `true` if any line could define a macro at runtime, in which
    /// case unknown macro names cannot be rejected at parse time.
    pub fn can_define_macros(&self) -> bool {
        self.sections.iter().flat_map(|s| s.lines.iter()).any(|(_, line)| {
            let keyword = line.trim().split(',').next().unwrap_or("").trim();
            MACRO_DEFINERS.iter().any(|k| k.eq_ignore_ascii_case(keyword))
        })
    }

    /// Sections holding code, for whole-script checks.
    pub fn code_sections<'s>(&'s self, macro_section: &'s str) -> impl Iterator<Item = &'s Section> + 's {
        self.sections.iter().filter(move |s| {
            let data = DATA_SECTIONS.iter().any(|d| d.eq_ignore_ascii_case(&s.name))
                || s.name.eq_ignore_ascii_case(macro_section)
                || s.name.to_ascii_lowercase().starts_with("encoded");
            !data && !s.looks_like_data()
        })
    }

    /// Parse every code section, collecting `(section, error)` pairs.
    pub fn check(&self, macro_section: &str, opts: &ParseOptions<'_>) -> Vec<(String, ParseError)> {
        let mut out = Vec::new();
        for section in self.code_sections(macro_section) {
            if let Err(errors) = parse_section(section.line_refs(), opts) {
                out.extend(errors.into_iter().map(|e| (section.name.clone(), e)));
            }
        }
        out
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
