//! Input hygiene for free-text search terms.
//!
//! Every query is parameterized, so the only thing left to guard is the `LIKE`
//! pattern language itself: `%`, `_` and `\` typed by a user must match literally.

/// Longest search term that is honored; longer input is truncated.
pub const MAX_SEARCH_LEN: usize = 100;

/// Trims a search term, drops it when blank and caps its length.
pub fn normalize_search(input: Option<&str>) -> Option<String> {
    let trimmed = input?.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(trimmed.chars().take(MAX_SEARCH_LEN).collect())
}

/// Escapes `LIKE` metacharacters (default escape character `\`).
pub fn escape_like(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// `%term%` with the term escaped, ready to bind to an `ILIKE`.
pub fn contains_pattern(term: &str) -> String {
    format!("%{}%", escape_like(term))
}
