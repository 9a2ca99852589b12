//! File-name wildcards.
//!
//! Scripts name files with DOS-style wildcards in the last path component
//! only: `*` matches any run of characters, `?` matches one.  Matching is
//! case-insensitive.  Patterns compile to a [`regex`] anchored at both ends.

use std::io;
use std::path::{Path, PathBuf};

use regex::{Regex, RegexBuilder};
use thiserror::Error;

#[derive(Error, Debug)]
#[error("invalid wildcard [{pattern}]: {source}")]
pub struct PatternError {
    pub pattern: String,
    #[source]
    pub source: regex::Error,
}

/// A compiled file-name wildcard.
#[derive(Debug, Clone)]
pub struct Wildcard {
    re: Regex,
}

impl Wildcard {
    pub fn new(pattern: &str) -> Result<Self, PatternError> {
        let mut src = String::with_capacity(pattern.len() + 8);
        src.push('^');
        for c in pattern.chars() {
            match c {
                '*' => src.push_str(".*"),
                '?' => src.push('.'),
                c => src.push_str(&regex::escape(c.encode_utf8(&mut [0; 4]))),
            }
        }
        src.push('$');
        let re = RegexBuilder::new(&src)
            .case_insensitive(true)
            .build()
            .map_err(|source| PatternError { pattern: pattern.to_owned(), source })?;
        Ok(Wildcard { re })
    }

    pub fn is_match(&self, name: &str) -> bool {
        self.re.is_match(name)
    }
}

/// Returns `true` if the string contains `*` or `?`.
pub fn has_wildcard(s: &str) -> bool {
    s.contains(['*', '?'])
}

/// Script paths use `\`; turn them into host paths.
pub fn native_path(s: &str) -> PathBuf {
    if cfg!(windows) {
        PathBuf::from(s)
    } else {
        PathBuf::from(s.replace('\\', "/"))
    }
}

/// Which directory entries [`matching_entries`] returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Dir,
    Any,
}

impl EntryKind {
    fn accepts(self, path: &Path) -> bool {
        match self {
            EntryKind::File => path.is_file(),
            EntryKind::Dir => path.is_dir(),
            EntryKind::Any => path.exists(),
        }
    }
}

/// Entries whose name matches the wildcard in the last component of
/// `pattern`, sorted.  A pattern without wildcards yields itself if it
/// exists.  A missing parent directory yields nothing.
pub fn matching_entries(pattern: &str, kind: EntryKind) -> io::Result<Vec<PathBuf>> {
    let path = native_path(pattern);
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    if !has_wildcard(name) {
        return Ok(if kind.accepts(&path) { vec![path] } else { Vec::new() });
    }
    let wildcard = Wildcard::new(name).map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_owned(),
        _ => PathBuf::from("."),
    };
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut out = Vec::new();
    for entry in std::fs::read_dir(&dir)? {
        let entry = entry?;
        let matched = entry.file_name().to_str().is_some_and(|n| wildcard.is_match(n));
        if matched && kind.accepts(&entry.path()) {
            out.push(entry.path());
        }
    }
    out.sort();
    Ok(out)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
