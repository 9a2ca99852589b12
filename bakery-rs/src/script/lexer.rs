//! Line-level lexing: comments, `,\` continuations and argument splitting.
//!
//! A statement is `Keyword[,Arg1,Arg2,…]`.  Arguments are split on top-level
//! commas.  A field that begins with `"` is quoted: commas inside it are
//! literal, `""` stands for one `"`, and only whitespace may follow the
//! closing quote.  Unquoted fields are trimmed.

use crate::error::ParseError;

/// One logical statement line, possibly joined from several physical lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogicalLine {
    /// 1-based line number of the first physical line.
    pub line: usize,
    pub text: String,
}

/// Returns `true` for lines the parser ignores entirely.
pub fn is_comment(line: &str) -> bool {
    matches!(line.trim_start().chars().next(), None | Some('/' | '#' | ';'))
}

/// Join `,\` continuations and drop blank and comment lines.
///
/// `lines` yields `(line_number, text)` pairs.  A continuation left open at
/// the end of the input is reported as an error; everything else is kept.
pub fn logical_lines<'a>(
    lines: impl IntoIterator<Item = (usize, &'a str)>,
) -> (Vec<LogicalLine>, Vec<ParseError>) {
    let mut out = Vec::new();
    let mut pending: Option<LogicalLine> = None;

    for (lineno, raw) in lines {
        let trimmed = raw.trim();
        if pending.is_none() && is_comment(trimmed) {
            continue;
        }
        let (piece, continues) = match trimmed.strip_suffix('\\') {
            Some(head) if head.trim_end().ends_with(',') => (head.trim_end(), true),
            _ => (trimmed, false),
        };
        let current = pending.get_or_insert_with(|| LogicalLine { line: lineno, text: String::new() });
        current.text.push_str(piece);
        if !continues {
            out.extend(pending.take());
        }
    }

    let mut errors = Vec::new();
    if let Some(open) = pending {
        errors.push(ParseError::new(open.line, "Line continuation at end of section", open.text));
    }
    (out, errors)
}

/// Split a statement into its keyword and raw argument list.
pub fn split_statement(text: &str, line: usize) -> Result<(String, Vec<String>), ParseError> {
    let err = |message: &str| ParseError::new(line, message, text);

    let (keyword, rest) = match text.split_once(',') {
        Some((k, r)) => (k.trim(), Some(r)),
        None => (text.trim(), None),
    };
    if keyword.is_empty() || !keyword.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(err("Invalid command keyword"));
    }
    let args = match rest {
        Some(r) => split_args(r).map_err(|m| err(&m))?,
        None => Vec::new(),
    };
    Ok((keyword.to_owned(), args))
}

/// Split the text after the keyword into arguments.
pub fn split_args(src: &str) -> Result<Vec<String>, String> {
    if src.chars().filter(|&c| c == '"').count() % 2 != 0 {
        return Err("Unbalanced double quotes".to_owned());
    }

    let chars: Vec<char> = src.chars().collect();
    let mut args = Vec::new();
    let mut i = 0;
    loop {
        while i < chars.len() && chars[i].is_whitespace() {
            i += 1;
        }
        if i < chars.len() && chars[i] == '"' {
            let (field, next) = quoted_field(&chars, i + 1)?;
            args.push(field);
            i = next;
            while i < chars.len() && chars[i].is_whitespace() {
                i += 1;
            }
            match chars.get(i) {
                None => break,
                Some(',') => i += 1,
                Some(_) => return Err("Syntax error: text after closing quote".to_owned()),
            }
        } else {
            let start = i;
            let mut in_quote = false;
            while i < chars.len() && (in_quote || chars[i] != ',') {
                if chars[i] == '"' {
                    in_quote = !in_quote;
                }
                i += 1;
            }
            let field: String = chars[start..i].iter().collect();
            args.push(field.trim().to_owned());
            if i >= chars.len() {
                break;
            }
            i += 1;
        }
    }
    Ok(args)
}

/// Read a quoted field whose opening quote sits just before `start`.
/// Returns the unquoted text and the index after the closing quote.
fn quoted_field(chars: &[char], start: usize) -> Result<(String, usize), String> {
    let mut field = String::new();
    let mut i = start;
    while i < chars.len() {
        if chars[i] == '"' {
            if chars.get(i + 1) == Some(&'"') {
                field.push('"');
                i += 2;
                continue;
            }
            return Ok((field, i + 1));
        }
        field.push(chars[i]);
        i += 1;
    }
    Err("Unterminated double quote".to_owned())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
