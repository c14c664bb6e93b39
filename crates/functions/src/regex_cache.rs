//! Process-wide regex cache (§4.2): compiled patterns are expensive enough
//! that every `LIKE`/`match` evaluation shares one cache keyed by
//! `(pattern, case_insensitive)`. Each entry is a small pool of compiled
//! `Regex` clones so concurrent matchers never block on recompilation or on
//! each other — `Regex::is_match`/`find` already take `&self`, so the pool
//! exists purely to bound how many distinct `Regex` values cheap-clone
//! references point at rather than to serialize access.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use regex::Regex;

use crucible_errors::{Code, Error, Result};

const POOL_SIZE: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    pattern: String,
    case_insensitive: bool,
}

struct CacheEntry {
    pool: Vec<Arc<Regex>>,
    next: usize,
}

/// A process-wide cache of compiled regexes, one map guarded by one mutex.
pub struct RegexCache {
    entries: Mutex<HashMap<CacheKey, CacheEntry>>,
}

impl RegexCache {
    pub fn new() -> Self {
        RegexCache {
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Returns a compiled regex for `pattern`, compiling and inserting a
    /// pool of `POOL_SIZE` clones on first use and round-robining through
    /// the pool on subsequent calls.
    pub fn get(&self, pattern: &str, case_insensitive: bool) -> Result<Arc<Regex>> {
        let key = CacheKey {
            pattern: pattern.to_string(),
            case_insensitive,
        };
        let mut entries = self.entries.lock();
        if let Some(entry) = entries.get_mut(&key) {
            let regex = entry.pool[entry.next % entry.pool.len()].clone();
            entry.next = entry.next.wrapping_add(1);
            return Ok(regex);
        }
        let compiled = compile(pattern, case_insensitive)?;
        let pool: Vec<Arc<Regex>> = (0..POOL_SIZE).map(|_| Arc::new(compiled.clone())).collect();
        let regex = pool[0].clone();
        entries.insert(
            key,
            CacheEntry {
                pool,
                next: 1,
            },
        );
        Ok(regex)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for RegexCache {
    fn default() -> Self {
        Self::new()
    }
}

fn compile(pattern: &str, case_insensitive: bool) -> Result<Regex> {
    let source = if case_insensitive {
        format!("(?i){pattern}")
    } else {
        pattern.to_string()
    };
    Regex::new(&source)
        .map_err(|e| Error::user(Code::SyntaxError, format!("invalid regex {pattern:?}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_lookups_reuse_the_cache_entry() {
        let cache = RegexCache::new();
        cache.get("a.*b", false).unwrap();
        cache.get("a.*b", false).unwrap();
        assert_eq!(cache.len(), 1, "same key should not recompile a second entry");
    }

    #[test]
    fn case_sensitivity_is_part_of_the_key() {
        let cache = RegexCache::new();
        cache.get("abc", false).unwrap();
        cache.get("abc", true).unwrap();
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn invalid_pattern_is_a_syntax_error() {
        let cache = RegexCache::new();
        let err = cache.get("(unterminated", false).unwrap_err();
        assert_eq!(err.code(), Code::SyntaxError.as_i32());
    }

    #[test]
    fn pool_round_robins_across_repeated_gets() {
        let cache = RegexCache::new();
        let first = cache.get("x", false).unwrap();
        let mut saw_other = false;
        for _ in 0..POOL_SIZE + 1 {
            if !Arc::ptr_eq(&first, &cache.get("x", false).unwrap()) {
                saw_other = true;
            }
        }
        assert!(saw_other, "round robin should eventually return a different pool slot");
    }
}
