use std::collections::HashMap;

use tracing::trace;

use crate::glob::{Glob, GlobOptions};

/// The operation whose outcome is memoized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheOp {
    /// Plain glob match of a frame or exception field.
    GlobMatch,
    /// Path-like match of a frame's path or package.
    PathLikeMatch,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    op: CacheOp,
    pattern: String,
    options: GlobOptions,
    value: String,
}

/// Memoizes glob evaluations for one matching pass.
///
/// Entries are keyed by value, never by compiled-object identity, so two
/// matchers sharing a pattern share their results. Create one cache per event
/// (or per batch handled by a single worker) and drop it afterwards.
#[derive(Debug, Default)]
pub struct MatchCache {
    entries: HashMap<CacheKey, bool>,
    hits: usize,
    misses: usize,
}

impl MatchCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached outcome of matching `value` against `glob`, computing
    /// it on first use.
    pub fn glob_match(&mut self, op: CacheOp, glob: &Glob, value: &str) -> bool {
        let key = CacheKey {
            op,
            pattern: glob.pattern().to_owned(),
            options: glob.options(),
            value: value.to_owned(),
        };
        if let Some(&matched) = self.entries.get(&key) {
            self.hits += 1;
            trace!(?op, pattern = glob.pattern(), value, "match cache hit");
            return matched;
        }

        self.misses += 1;
        let matched = glob.is_match(value);
        trace!(?op, pattern = glob.pattern(), value, matched, "match cache miss");
        self.entries.insert(key, matched);
        matched
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn hits(&self) -> usize {
        self.hits
    }

    pub fn misses(&self) -> usize {
        self.misses
    }

    /// Forget every entry, readying the cache for an unrelated pass.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.hits = 0;
        self.misses = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repeated_lookups_hit() {
        let glob = Glob::new("*.py", GlobOptions::new());
        let mut cache = MatchCache::new();

        assert!(cache.glob_match(CacheOp::GlobMatch, &glob, "foo/bar.py"));
        assert!(cache.glob_match(CacheOp::GlobMatch, &glob, "foo/bar.py"));
        assert!(!cache.glob_match(CacheOp::GlobMatch, &glob, "foo/bar.pyc"));

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.hits(), 1);
        assert_eq!(cache.misses(), 2);
    }

    #[test]
    fn test_keys_include_op_and_options() {
        let plain = Glob::new("foo", GlobOptions::new());
        let folded = Glob::new("foo", GlobOptions::new().ignorecase(true));
        let mut cache = MatchCache::new();

        assert!(!cache.glob_match(CacheOp::GlobMatch, &plain, "FOO"));
        assert!(cache.glob_match(CacheOp::GlobMatch, &folded, "FOO"));
        assert!(!cache.glob_match(CacheOp::PathLikeMatch, &plain, "FOO"));
        assert_eq!(cache.len(), 3);
        assert_eq!(cache.hits(), 0);
    }

    #[test]
    fn test_equal_patterns_share_entries() {
        let a = Glob::new("src/*", GlobOptions::new());
        let b = Glob::new("src/*", GlobOptions::new());
        let mut cache = MatchCache::new();

        cache.glob_match(CacheOp::GlobMatch, &a, "src/main.rs");
        cache.glob_match(CacheOp::GlobMatch, &b, "src/main.rs");
        assert_eq!(cache.hits(), 1);
    }

    #[test]
    fn test_clear() {
        let glob = Glob::new("*", GlobOptions::new());
        let mut cache = MatchCache::new();
        cache.glob_match(CacheOp::GlobMatch, &glob, "x");
        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.misses(), 0);
    }
}
