//! Case-insensitive matching of possibly-abbreviated switch keywords.

/// Match `arg` against `keyword`, accepting any abbreviation of at least
/// `min_chars` characters.
///
/// Only `arg` is case-folded; `keyword` must already be lower case. An
/// argument longer than the keyword never matches.
///
/// # Example
///
/// ```ignore
/// assert!(keymatch("ROT", "rotate", 2));
/// assert!(!keymatch("r", "rotate", 2));
/// ```
pub fn keymatch(arg: &str, keyword: &str, min_chars: usize) -> bool {
    let mut keyword = keyword.bytes();
    let mut matched = 0;

    for ca in arg.bytes() {
        let Some(ck) = keyword.next() else {
            // arg longer than keyword
            return false;
        };
        if ca.to_ascii_lowercase() != ck {
            return false;
        }
        matched += 1;
    }

    matched >= min_chars
}


// ============================================================================
// Property-Based Tests
// ============================================================================
