//! Engine-reserved escape sequences.
//!
//! | Sequence | Result |
//! |----------|--------|
//! | `##`     | `#`    |
//! | `#$c`    | `,`    |
//! | `#$p`    | `%`    |
//! | `#$q`    | `"`    |
//! | `#$s`    | space  |
//! | `#$t`    | tab    |
//! | `#$x`    | CR LF  |
//!
//! Escape letters are case-insensitive.  Unknown `#$?` sequences are copied
//! through unchanged.  Decoding always runs after variable expansion.

/// Decode all escape sequences in `src`.
pub fn unescape(src: &str) -> String {
    if !src.contains('#') {
        return src.to_owned();
    }
    let mut out = String::with_capacity(src.len());
    let mut chars = src.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch != '#' {
            out.push(ch);
            continue;
        }
        match chars.peek().copied() {
            Some('#') => {
                chars.next();
                out.push('#');
            }
            Some('$') => {
                let mut ahead = chars.clone();
                ahead.next();
                match ahead.next().and_then(decode_letter) {
                    Some(decoded) => {
                        chars.next();
                        chars.next();
                        out.push_str(decoded);
                    }
                    None => out.push('#'),
                }
            }
            _ => out.push('#'),
        }
    }
    out
}

fn decode_letter(c: char) -> Option<&'static str> {
    match c.to_ascii_lowercase() {
        'c' => Some(","),
        'p' => Some("%"),
        'q' => Some("\""),
        's' => Some(" "),
        't' => Some("\t"),
        'x' => Some("\r\n"),
        _ => None,
    }
}

/// Encode `src` so that [`unescape`] returns it unchanged and it survives a
/// round trip through a script line.
pub fn escape(src: &str) -> String {
    let mut out = String::with_capacity(src.len());
    let mut chars = src.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '#' => out.push_str("##"),
            ',' => out.push_str("#$c"),
            '%' => out.push_str("#$p"),
            '"' => out.push_str("#$q"),
            '\t' => out.push_str("#$t"),
            '\r' if chars.peek() == Some(&'\n') => {
                chars.next();
                out.push_str("#$x");
            }
            _ => out.push(ch),
        }
    }
    out
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_every_sequence() {
        assert_eq!(unescape("a#$cb"), "a,b");
        assert_eq!(unescape("100#$p"), "100%");
        assert_eq!(unescape("#$qquoted#$q"), "\"quoted\"");
        assert_eq!(unescape("a#$sb#$tc"), "a b\tc");
        assert_eq!(unescape("l1#$xl2"), "l1\r\nl2");
        assert_eq!(unescape("##1"), "#1");
    }

    #[test]
    fn letters_are_case_insensitive() {
        assert_eq!(unescape("#$C#$P#$X"), ",%\r\n");
    }

    #[test]
    fn unknown_sequences_stay_literal() {
        assert_eq!(unescape("#$z"), "#$z");
        assert_eq!(unescape("#1"), "#1");
        assert_eq!(unescape("trailing #"), "trailing #");
        assert_eq!(unescape("#$"), "#$");
    }

    #[test]
    fn double_hash_protects_following_escape() {
        // `###$c` is an escaped `#` followed by an escaped comma.
        assert_eq!(unescape("###$c"), "#,");
        assert_eq!(unescape("##$c"), "#$c");
    }

    #[test]
    fn escape_round_trips() {
        for s in ["plain", "a,b", "50%", "say \"hi\"", "#1 ##", "l1\r\nl2\tx", "#$c"] {
            assert_eq!(unescape(&escape(s)), s, "round trip of {s:?}");
        }
    }
}
