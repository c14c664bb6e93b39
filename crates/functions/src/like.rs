//! `LIKE` pattern lowering (§4.2): `%` becomes `.*`, `_` becomes `.`, regex
//! metacharacters are escaped. A pattern of the form `%…%` with no `_` and
//! no escaped characters lowers to a plain substring search instead of a
//! compiled regex, since that is the overwhelming common case
//! (`WHERE col LIKE '%foo%'`) and a `find` over bytes is far cheaper than a
//! regex match.

use std::sync::Arc;

use regex::Regex;

use crucible_errors::Result;

use crate::regex_cache::RegexCache;

/// What a lowered `LIKE` pattern evaluates to.
#[derive(Debug, Clone)]
pub enum LoweredLike {
    /// `%...%` with no wildcards or escapes inside: plain substring search.
    Substring(String),
    /// Anything else: a compiled regex anchored to the whole string.
    Regex(Arc<Regex>),
}

/// Lowers a `LIKE` pattern, consulting `cache` for the regex case.
pub fn lower(cache: &RegexCache, pattern: &str, case_insensitive: bool) -> Result<LoweredLike> {
    if let Some(needle) = as_plain_substring(pattern) {
        return Ok(LoweredLike::Substring(needle));
    }
    let regex_source = to_regex(pattern);
    let regex = cache.get(&regex_source, case_insensitive)?;
    Ok(LoweredLike::Regex(regex))
}

pub fn is_match(lowered: &LoweredLike, haystack: &str) -> bool {
    match lowered {
        LoweredLike::Substring(needle) => haystack.contains(needle.as_str()),
        LoweredLike::Regex(regex) => regex.is_match(haystack),
    }
}

/// Recognizes `%foo%` where `foo` has no `_`, no `%`, and no backslash
/// escape, in which case the whole pattern is equivalent to substring
/// search for `foo`.
fn as_plain_substring(pattern: &str) -> Option<String> {
    let inner = pattern.strip_prefix('%')?.strip_suffix('%')?;
    if inner.is_empty() {
        return None;
    }
    if inner.contains(['_', '%', '\\']) {
        return None;
    }
    Some(inner.to_string())
}

/// Translates a `LIKE` pattern into an anchored regex: `%` -> `.*`,
/// `_` -> `.`, `\X` -> literal `X`, everything else is regex-escaped.
fn to_regex(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len() * 2 + 2);
    out.push('^');
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        match c {
            '%' => out.push_str(".*"),
            '_' => out.push('.'),
            '\\' => {
                if let Some(escaped) = chars.next() {
                    out.push_str(&regex::escape(&escaped.to_string()));
                } else {
                    out.push_str(&regex::escape("\\"));
                }
            }
            other => out.push_str(&regex::escape(&other.to_string())),
        }
    }
    out.push('$');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_wildcard_pattern_lowers_to_substring_search() {
        let cache = RegexCache::new();
        let lowered = lower(&cache, "%foo%", false).unwrap();
        assert!(matches!(lowered, LoweredLike::Substring(ref s) if s == "foo"));
        assert!(cache.is_empty(), "substring fast path must not touch the regex cache");
    }

    #[test]
    fn pattern_with_underscore_requires_a_regex() {
        let cache = RegexCache::new();
        let lowered = lower(&cache, "%fo_%", false).unwrap();
        assert!(matches!(lowered, LoweredLike::Regex(_)));
        assert!(is_match(&lowered, "xxfoyyy"));
        assert!(!is_match(&lowered, "xxfyyy"));
    }

    #[test]
    fn metacharacters_in_the_pattern_are_escaped() {
        let cache = RegexCache::new();
        let lowered = lower(&cache, "a.b*c", false).unwrap();
        assert!(is_match(&lowered, "a.b*c"));
        assert!(!is_match(&lowered, "axbyyc"));
    }

    #[test]
    fn underscore_matches_exactly_one_character() {
        let cache = RegexCache::new();
        let lowered = lower(&cache, "a_c", false).unwrap();
        assert!(is_match(&lowered, "abc"));
        assert!(!is_match(&lowered, "ac"));
        assert!(!is_match(&lowered, "abbc"));
    }

    #[test]
    fn percent_anywhere_matches_any_run() {
        let cache = RegexCache::new();
        let lowered = lower(&cache, "a%c", false).unwrap();
        assert!(is_match(&lowered, "abbbbc"));
        assert!(is_match(&lowered, "ac"));
        assert!(!is_match(&lowered, "abbbbd"));
    }
}
