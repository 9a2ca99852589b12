//! Line-preserving INI documents.
//!
//! Edits touch only the affected lines; comments, ordering and unknown lines
//! survive a load/modify/save cycle.  Section and key names compare
//! case-insensitively.  Saving writes a temporary file next to the target and
//! renames it over the original, so readers never observe a partial file.

use std::io::Write;
use std::path::Path;

/// Replace `path` with `bytes` via a temporary file in the same directory.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// An INI file held as its raw lines.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IniDocument {
    lines: Vec<String>,
    crlf: bool,
}

fn header_name(line: &str) -> Option<&str> {
    let t = line.trim();
    t.strip_prefix('[')?.strip_suffix(']').map(str::trim)
}

fn key_of(line: &str) -> Option<&str> {
    let t = line.trim_start();
    if t.starts_with(';') || t.starts_with('#') || t.starts_with("//") {
        return None;
    }
    t.split_once('=').map(|(k, _)| k.trim())
}

impl IniDocument {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parse(text: &str) -> Self {
        let text = text.strip_prefix('\u{feff}').unwrap_or(text);
        IniDocument { lines: text.lines().map(str::to_owned).collect(), crlf: text.contains("\r\n") }
    }

    /// Load `path`; a missing file yields an empty document.
    pub fn load(path: &Path) -> std::io::Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(text) => Ok(Self::parse(&text)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::new()),
            Err(e) => Err(e),
        }
    }

    /// Atomically replace `path` with this document.
    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        write_atomic(path, self.render().as_bytes())
    }

    pub fn render(&self) -> String {
        let nl = if self.crlf { "\r\n" } else { "\n" };
        let mut out = self.lines.join(nl);
        if !self.lines.is_empty() {
            out.push_str(nl);
        }
        out
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    // ── Sections ──────────────────────────────────────────────────────────────

    /// `(header index, end index)` of a section; the body is
    /// `header + 1 .. end`.
    fn section_range(&self, section: &str) -> Option<(usize, usize)> {
        let start = self
            .lines
            .iter()
            .position(|l| header_name(l).is_some_and(|n| n.eq_ignore_ascii_case(section)))?;
        let end = self.lines[start + 1..]
            .iter()
            .position(|l| header_name(l).is_some())
            .map_or(self.lines.len(), |off| start + 1 + off);
        Some((start, end))
    }

    pub fn section_names(&self) -> Vec<String> {
        self.lines.iter().filter_map(|l| header_name(l)).map(str::to_owned).collect()
    }

    pub fn has_section(&self, section: &str) -> bool {
        self.section_range(section).is_some()
    }

    /// Add an empty section.  Returns `false` if it already existed.
    pub fn add_section(&mut self, section: &str) -> bool {
        if self.has_section(section) {
            return false;
        }
        if self.lines.last().is_some_and(|l| !l.trim().is_empty()) {
            self.lines.push(String::new());
        }
        self.lines.push(format!("[{section}]"));
        true
    }

    /// Remove a section and its body.  Returns `false` if it did not exist.
    pub fn delete_section(&mut self, section: &str) -> bool {
        match self.section_range(section) {
            Some((start, end)) => {
                self.lines.drain(start..end);
                true
            }
            None => false,
        }
    }

    /// Non-blank body lines of a section, trimmed.
    pub fn section_lines(&self, section: &str) -> Option<Vec<String>> {
        let (start, end) = self.section_range(section)?;
        Some(
            self.lines[start + 1..end]
                .iter()
                .map(|l| l.trim())
                .filter(|l| !l.is_empty())
                .map(str::to_owned)
                .collect(),
        )
    }

    // ── Keys ──────────────────────────────────────────────────────────────────

    fn key_index(&self, section: &str, key: &str) -> Option<usize> {
        let (start, end) = self.section_range(section)?;
        (start + 1..end).find(|&i| key_of(&self.lines[i]).is_some_and(|k| k.eq_ignore_ascii_case(key)))
    }

    pub fn get(&self, section: &str, key: &str) -> Option<String> {
        let i = self.key_index(section, key)?;
        self.lines[i].split_once('=').map(|(_, v)| v.trim().to_owned())
    }

    /// Set `key` in `section`, creating both as needed.  Returns the previous
    /// value.
    pub fn set(&mut self, section: &str, key: &str, value: &str) -> Option<String> {
        let line = format!("{key}={value}");
        if let Some(i) = self.key_index(section, key) {
            let old = self.lines[i].split_once('=').map(|(_, v)| v.trim().to_owned());
            self.lines[i] = line;
            return old;
        }
        self.insert_into_section(section, line);
        None
    }

    /// Returns `true` if the key existed.
    pub fn delete(&mut self, section: &str, key: &str) -> bool {
        match self.key_index(section, key) {
            Some(i) => {
                self.lines.remove(i);
                true
            }
            None => false,
        }
    }

    /// Write a raw line into `section`.  Without `append` an identical line
    /// already present is left alone.
    pub fn write_text_line(&mut self, section: &str, text: &str, append: bool) {
        if !append {
            if let Some(body) = self.section_lines(section) {
                if body.iter().any(|l| l == text.trim()) {
                    return;
                }
            }
        }
        self.insert_into_section(section, text.to_owned());
    }

    /// Insert after the last non-blank body line of `section`.
    fn insert_into_section(&mut self, section: &str, line: String) {
        self.add_section(section);
        let Some((start, end)) = self.section_range(section) else { return };
        let mut at = end;
        while at > start + 1 && self.lines[at - 1].trim().is_empty() {
            at -= 1;
        }
        self.lines.insert(at, line);
    }

    // ── Whole-document operations ─────────────────────────────────────────────

    /// Trim every line, tighten `key = value` to `key=value`, drop blank
    /// lines and put exactly one blank line before each section after the
    /// first.
    pub fn compact(&mut self) {
        let mut out: Vec<String> = Vec::with_capacity(self.lines.len());
        for raw in &self.lines {
            let t = raw.trim();
            if t.is_empty() {
                continue;
            }
            if header_name(t).is_some() {
                if !out.is_empty() {
                    out.push(String::new());
                }
                out.push(t.to_owned());
            } else if let (Some(k), Some((_, v))) = (key_of(t), t.split_once('=')) {
                out.push(format!("{k}={}", v.trim()));
            } else {
                out.push(t.to_owned());
            }
        }
        self.lines = out;
    }

    /// Copy every section and key of `other` into this document, overwriting
    /// existing values.
    pub fn merge(&mut self, other: &IniDocument) {
        let mut section: Option<String> = None;
        for raw in &other.lines {
            if let Some(name) = header_name(raw) {
                self.add_section(name);
                section = Some(name.to_owned());
                continue;
            }
            let Some(sec) = section.as_deref() else { continue };
            if let (Some(k), Some((_, v))) = (key_of(raw), raw.split_once('=')) {
                self.set(sec, k, v.trim());
            } else if !raw.trim().is_empty() && key_of(raw).is_none() && !raw.trim_start().starts_with(';') {
                self.write_text_line(sec, raw.trim(), false);
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "; header comment\n[Main]\nTitle=Demo\n\n[Variables]\n%A%=1\nMacro=Echo,x\n";

    #[test]
    fn get_is_case_insensitive() {
        let doc = IniDocument::parse(SAMPLE);
        assert_eq!(doc.get("main", "TITLE").as_deref(), Some("Demo"));
        assert_eq!(doc.get("Variables", "%a%").as_deref(), Some("1"));
        assert_eq!(doc.get("Main", "Missing"), None);
        assert_eq!(doc.get("Nope", "Title"), None);
    }

    #[test]
    fn set_replaces_in_place_and_keeps_comments() {
        let mut doc = IniDocument::parse(SAMPLE);
        assert_eq!(doc.set("Main", "Title", "New").as_deref(), Some("Demo"));
        assert_eq!(doc.lines()[0], "; header comment");
        assert_eq!(doc.lines()[2], "Title=New");
    }

    #[test]
    fn set_appends_before_trailing_blank_lines() {
        let mut doc = IniDocument::parse(SAMPLE);
        doc.set("Main", "Author", "me");
        assert_eq!(doc.lines()[3], "Author=me");
        assert_eq!(doc.lines()[4], "");
        assert_eq!(doc.lines()[5], "[Variables]");
    }

    #[test]
    fn set_creates_missing_section() {
        let mut doc = IniDocument::parse(SAMPLE);
        doc.set("New", "K", "V");
        assert!(doc.render().ends_with("\n[New]\nK=V\n"));
    }

    #[test]
    fn delete_key_and_section() {
        let mut doc = IniDocument::parse(SAMPLE);
        assert!(doc.delete("Variables", "%A%"));
        assert!(!doc.delete("Variables", "%A%"));
        assert!(doc.delete_section("Main"));
        assert_eq!(doc.section_names(), vec!["Variables"]);
    }

    #[test]
    fn add_section_reports_existing() {
        let mut doc = IniDocument::parse(SAMPLE);
        assert!(!doc.add_section("MAIN"));
        assert!(doc.add_section("Other"));
        assert!(doc.has_section("other"));
    }

    #[test]
    fn section_lines_skip_blanks() {
        let doc = IniDocument::parse(SAMPLE);
        assert_eq!(doc.section_lines("Variables"), Some(vec!["%A%=1".to_owned(), "Macro=Echo,x".to_owned()]));
        assert_eq!(doc.section_lines("Missing"), None);
    }

    #[test]
    fn write_text_line_dedups_unless_append() {
        let mut doc = IniDocument::new();
        doc.write_text_line("S", "raw line", false);
        doc.write_text_line("S", "raw line", false);
        assert_eq!(doc.section_lines("S").map(|l| l.len()), Some(1));
        doc.write_text_line("S", "raw line", true);
        assert_eq!(doc.section_lines("S").map(|l| l.len()), Some(2));
    }

    #[test]
    fn compact_normalizes_layout() {
        let mut doc = IniDocument::parse("\n [A] \n k = v \n\n\n[B]\n  x=1\n");
        doc.compact();
        assert_eq!(doc.render(), "[A]\nk=v\n\n[B]\nx=1\n");
    }

    #[test]
    fn merge_overwrites_and_adds() {
        let mut doc = IniDocument::parse("[A]\nk=1\n");
        doc.merge(&IniDocument::parse("[A]\nk=2\nj=3\n[C]\n"));
        assert_eq!(doc.get("A", "k").as_deref(), Some("2"));
        assert_eq!(doc.get("A", "j").as_deref(), Some("3"));
        assert!(doc.has_section("C"));
    }

    #[test]
    fn crlf_is_preserved() {
        let doc = IniDocument::parse("[A]\r\nk=1\r\n");
        assert_eq!(doc.render(), "[A]\r\nk=1\r\n");
    }

    #[test]
    fn save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.ini");
        assert_eq!(IniDocument::load(&path).unwrap(), IniDocument::new());
        let mut doc = IniDocument::new();
        doc.set("S", "K", "V");
        doc.save(&path).unwrap();
        assert_eq!(IniDocument::load(&path).unwrap().get("S", "K").as_deref(), Some("V"));
    }
}
