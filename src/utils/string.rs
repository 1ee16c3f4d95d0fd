//! String utilities
//!
//! Helpers for keeping credentials out of logs.

/// Safely truncate a string at a character boundary
///
/// # Example
/// ```
/// use request_gateway::utils::truncate_str;
///
/// assert_eq!(truncate_str("Hello, World!", 5), "Hello");
/// assert_eq!(truncate_str("Hi", 5), "Hi");
/// ```
pub fn truncate_str(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Render a bearer credential for logging (first 8 chars + `...`).
///
/// Short values are fully masked since a prefix would reveal most of them.
pub fn redact_token(token: &str) -> String {
    if token.chars().count() > 12 {
        format!("{}...", truncate_str(token, 8))
    } else {
        "***".to_string()
    }
}
