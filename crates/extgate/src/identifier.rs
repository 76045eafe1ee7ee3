//! Normalization of user-supplied extension identifiers.
//!
//! Identifiers are either a full extension name (`publisher.extension`) or a
//! bare publisher name. Users often decorate publisher entries as
//! `publisher.*` or `publisher.`; that decoration carries no meaning and is
//! removed here. Case is preserved: comparisons are case-insensitive at
//! evaluation time only.

/// Normalize a raw identifier.
///
/// Trims whitespace, strips every trailing `*`, then strips one trailing `.`,
/// repeating until the value stops changing. Returns `None` when nothing is
/// left, so the caller can discard the entry.
///
/// ```
/// use extgate::normalize;
///
/// assert_eq!(normalize(" ms-python.* ").as_deref(), Some("ms-python"));
/// assert_eq!(normalize("   "), None);
/// ```
pub fn normalize(raw: &str) -> Option<String> {
    let mut current = raw;
    loop {
        let trimmed = current.trim().trim_end_matches('*');
        let next = trimmed.strip_suffix('.').unwrap_or(trimmed);
        if next == current {
            break;
        }
        current = next;
    }

    if current.is_empty() {
        None
    } else {
        Some(current.to_string())
    }
}

/// Normalize every element of a list, dropping entries that normalize to nothing.
pub fn normalize_all<I, S>(raw: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    raw.into_iter()
        .filter_map(|s| normalize(s.as_ref()))
        .collect()
}
