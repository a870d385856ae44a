//! POSIX shell quoting for remote command lines.
//!
//! The SSH client binary hands the remote side a single string which the
//! login shell re-splits, so every argv element must be quoted before it
//! crosses the wire. Single-quote style: everything between `'...'` is
//! literal, and an embedded `'` becomes `'\''`.

/// Quote one word for a POSIX shell.
///
/// Words made of safe characters pass through untouched to keep logged
/// command lines readable.
pub fn quote(word: &str) -> String {
    if !word.is_empty() && word.bytes().all(is_safe_byte) {
        return word.to_owned();
    }
    let mut out = String::with_capacity(word.len() + 2);
    out.push('\'');
    for ch in word.chars() {
        if ch == '\'' {
            out.push_str("'\\''");
        } else {
            out.push(ch);
        }
    }
    out.push('\'');
    out
}

/// Join argv into a single quoted command line.
pub fn join(argv: &[String]) -> String {
    argv.iter()
        .map(|w| quote(w))
        .collect::<Vec<_>>()
        .join(" ")
}

fn is_safe_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.' | b'/' | b':' | b'=' | b'@' | b',' | b'+' | b'%')
}
