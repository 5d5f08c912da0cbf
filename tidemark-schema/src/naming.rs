//! Column name rewriting.
//!
//! Catalog column names must match `[A-Za-z0-9_]+`. Serialized field names
//! are rewritten the same way the event writer rewrites JSON keys, so the
//! table and the data agree.

use once_cell::sync::Lazy;
use regex::Regex;

/// Characters with a readable replacement, applied before the generic pass.
const SYMBOL_REPLACEMENTS: &[(char, &str)] = &[
    ('@', "at_sign_"),
    (',', "comma"),
    ('`', "backtick"),
    ('\'', "apostrophe"),
];

static INVALID_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^A-Za-z0-9_]").expect("Invalid column name regex"));

/// Rewrite a serialized field name into a catalog-safe column name.
pub fn rewrite_field_name(name: &str) -> String {
    let mut rewritten = String::with_capacity(name.len());
    for ch in name.trim().chars() {
        match SYMBOL_REPLACEMENTS.iter().find(|(symbol, _)| *symbol == ch) {
            Some((_, replacement)) => rewritten.push_str(replacement),
            None => rewritten.push(ch),
        }
    }
    INVALID_CHARS.replace_all(&rewritten, "_").into_owned()
}
