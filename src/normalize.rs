//! String normalization for artist/track cache keys.
//!
//! CRITICAL: The output of `normalize` is the cache key. Any change here
//! invalidates every existing cache file. Run tests after changes.

use once_cell::sync::Lazy;
use regex::Regex;

/// Trailing featured-artist clause: "(feat ...)" or "(feat. ...)", non-greedy
/// to the first closing paren.
static FEAT_CLAUSE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\s*\(feat\.?.*?\)").unwrap());

/// Bracketed tags like "[Remix]", "[Live]", "[2011 Remaster]".
static BRACKET_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s*\[.*?\]").unwrap());

/// Everything outside lowercase letters, digits, and space.
static NON_ALPHANUMERIC: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-z0-9 ]").unwrap());

/// Regex to collapse runs of whitespace into a single space.
static MULTI_SPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Any parenthetical or bracketed remainder. Used by the resolver's
/// stripped-track query variant, not by `normalize` itself.
pub static PARENTHETICAL: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s*\(.*?\)|\[.*?\]").unwrap());

/// Normalize a raw artist or track string into its canonical comparison form.
///
/// Steps, in order: lowercase, drop a "(feat ...)" clause, drop bracketed
/// tags, strip every character outside `[a-z0-9 ]`, collapse whitespace,
/// trim. Total and idempotent.
pub fn normalize(raw: &str) -> String {
    let lowered = raw.to_lowercase();
    let result = FEAT_CLAUSE.replace_all(&lowered, "");
    let result = BRACKET_TAG.replace_all(&result, "");
    let result = NON_ALPHANUMERIC.replace_all(&result, "");
    let result = MULTI_SPACE.replace_all(&result, " ");
    result.trim().to_string()
}
