//! Wildcard patterns as used by file enumeration and file-list sweeps.

use regex::{Regex, RegexBuilder};

/// Compile a `*`/`?` wildcard into an anchored, case-insensitive regex.
/// An empty wildcard matches everything.
///
/// # Errors
///
/// Returns the regex error if the pattern exceeds the compiled size limit.
pub fn wildcard_regex(wildcard: &str) -> Result<Regex, regex::Error> {
    if wildcard.is_empty() {
        return Regex::new(".*");
    }

    let mut pattern = String::with_capacity(wildcard.len() + 8);
    pattern.push('^');
    let mut literal = [0u8; 4];
    for c in wildcard.chars() {
        match c {
            '*' => pattern.push_str(".*"),
            '?' => pattern.push('.'),
            c => pattern.push_str(&regex::escape(c.encode_utf8(&mut literal))),
        }
    }
    pattern.push('$');

    RegexBuilder::new(&pattern).case_insensitive(true).build()
}
