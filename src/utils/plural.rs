//! Pluralization for status lines.

/// Format count with noun, handling pluralization
///
/// - `plural_count(0, "block")` -> `"0 blocks"`
/// - `plural_count(1, "block")` -> `"1 block"`
/// - `plural_count(12, "block")` -> `"12 blocks"`
#[inline]
pub fn plural_count(count: usize, noun: &str) -> String {
    let suffix = if count == 1 { "" } else { "s" };
    format!("{count} {noun}{suffix}")
}
