//! UTF-8 safe string helpers.

/// Truncate `s` to at most `max_bytes`, backing off to a char boundary.
pub fn truncate_str(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    &s[..s.floor_char_boundary(max_bytes)]
}

/// Like [`truncate_str`] but appends `...` when anything was cut.
pub fn truncate_with_ellipsis(s: &str, max_bytes: usize) -> String {
    let cut = truncate_str(s, max_bytes);
    if cut.len() < s.len() {
        format!("{}...", cut)
    } else {
        cut.to_string()
    }
}
