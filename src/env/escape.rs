// ABOUTME: Quoting of variable values for env files sourced by shells and compose.
// ABOUTME: Literal values use single quotes; scalar values use double quotes and keep $VAR expansion.

/// Non-interpolating quoting for literal and multi-line values.
pub fn escape_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// Inverse of [`escape_literal`]. Returns `None` if `quoted` is not single-quoted.
pub fn unescape_literal(quoted: &str) -> Option<String> {
    let inner = quoted.strip_prefix('\'')?.strip_suffix('\'')?;
    Some(inner.replace(r"'\''", "'"))
}

/// Interpolating quoting for scalar values. `$` is left alone on purpose
/// so the host expands references to other variables.
pub fn escape_scalar(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        match c {
            '\\' => out.push_str(r"\\"),
            '"' => out.push_str("\\\""),
            '`' => out.push_str("\\`"),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

/// Inverse of [`escape_scalar`].
pub fn unescape_scalar(quoted: &str) -> Option<String> {
    let inner = quoted.strip_prefix('"')?.strip_suffix('"')?;
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some(next @ ('\\' | '"' | '`')) => out.push(next),
                Some(other) => {
                    out.push('\\');
                    out.push(other);
                }
                None => return None,
            }
        } else {
            out.push(c);
        }
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_keeps_dollar_signs_inert() {
        assert_eq!(escape_literal("a$b"), "'a$b'");
        assert_eq!(unescape_literal("'a$b'").as_deref(), Some("a$b"));
    }

    #[test]
    fn literal_handles_single_quotes() {
        let escaped = escape_literal("don't");
        assert_eq!(escaped, r"'don'\''t'");
        assert_eq!(unescape_literal(&escaped).as_deref(), Some("don't"));
    }

    #[test]
    fn scalar_escapes_quotes_and_backslashes() {
        let escaped = escape_scalar(r#"say "hi" \o/"#);
        assert_eq!(escaped, r#""say \"hi\" \\o/""#);
        assert_eq!(
            unescape_scalar(&escaped).as_deref(),
            Some(r#"say "hi" \o/"#)
        );
    }

    #[test]
    fn unquoted_input_is_rejected() {
        assert!(unescape_literal("plain").is_none());
        assert!(unescape_scalar("plain").is_none());
    }
}
