use std::borrow::Cow;

/// Strip HTML markup from user-controlled item text.
///
/// Removes everything from a `<` through the next `>`, including the
/// delimiters; a trailing unterminated `<...` is dropped to the end of the
/// string. Text outside tags is preserved byte-for-byte, entities included,
/// which makes the operation idempotent.
///
/// Returns `Cow::Borrowed` when the input contains no `<` (the common case
/// for plain-text feeds) — a single byte scan with no allocation.
pub fn strip_html(s: &str) -> Cow<'_, str> {
    if !s.as_bytes().contains(&b'<') {
        return Cow::Borrowed(s);
    }

    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(open) = rest.find('<') {
        out.push_str(&rest[..open]);
        match rest[open..].find('>') {
            Some(close) => rest = &rest[open + close + 1..],
            // Unterminated tag: drop the remainder.
            None => return Cow::Owned(out),
        }
    }
    out.push_str(rest);
    Cow::Owned(out)
}
