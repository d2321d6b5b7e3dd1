//! Escaping for Graphviz DOT labels.

/// Escapes a string for use inside a double-quoted DOT label.
///
/// Quotes, backslashes and record-label delimiters are escaped, newlines become the
/// DOT `\n` sequence and carriage returns are dropped.
#[must_use]
pub fn escape_dot(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => {}
            '<' | '>' | '{' | '}' | '|' => {
                out.push('\\');
                out.push(c);
            }
            _ => out.push(c),
        }
    }
    out
}
