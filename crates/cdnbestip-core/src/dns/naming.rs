//! Prefix-indexed record names: `{prefix}{N}.{domain}`, N starting at 1

/// Name of the record at 1-based `index`
pub fn indexed_name(prefix: &str, index: usize, domain: &str) -> String {
    format!("{}{}.{}", prefix, index, domain)
}

/// The N in `{prefix}{N}.{domain}`, if `name` has exactly that shape
///
/// Matching is anchored and ASCII case-insensitive. N must be a positive
/// integer without leading zeros, so `cf1` never matches `cf10` and `cf01`
/// matches nothing.
pub fn prefix_index(name: &str, prefix: &str, domain: &str) -> Option<usize> {
    let name = name.trim_end_matches('.').to_ascii_lowercase();
    let suffix = format!(".{}", domain.trim_end_matches('.').to_ascii_lowercase());
    let prefix = prefix.to_ascii_lowercase();

    let digits = name.strip_suffix(&suffix)?.strip_prefix(&prefix)?;
    if digits.is_empty() || digits.starts_with('0') || !digits.bytes().all(|b| b.is_ascii_digit())
    {
        return None;
    }
    digits.parse().ok()
}
