use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

use tracing::debug;

use crate::error::EnhancerError;

use super::matchers::{FrameMatch, MatchField};

type InstanceKey = (MatchField, String, bool);

/// Compilation cache for [`FrameMatch`] instances, shared by every rule of a
/// rule set. Each (field, pattern, negated) triple is compiled once and the
/// same instance is handed out afterwards. Safe to populate from several
/// threads; instances are never mutated after insertion.
#[derive(Debug, Default)]
pub struct MatcherRegistry {
    instances: RwLock<HashMap<InstanceKey, Arc<FrameMatch>>>,
}

impl MatcherRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up or compile the matcher for a key such as `path` or
    /// `stack.function`.
    pub fn frame_match(
        &self,
        key: &str,
        pattern: &str,
        negated: bool,
    ) -> Result<Arc<FrameMatch>, EnhancerError> {
        let field = MatchField::from_key(key).ok_or_else(|| EnhancerError::UnknownMatcher {
            key: key.to_owned(),
        })?;
        Ok(self.get_or_compile(field, pattern, negated))
    }

    pub fn get_or_compile(&self, field: MatchField, pattern: &str, negated: bool) -> Arc<FrameMatch> {
        let key = (field, pattern.to_owned(), negated);
        if let Some(instance) = self.instances.read().expect("valid lock").get(&key) {
            return Arc::clone(instance);
        }

        // Another thread may have compiled the same key since we released the
        // read lock, so the entry is re-checked under the write lock
        let mut instances = self.instances.write().expect("valid lock");
        let instance = instances.entry(key).or_insert_with(|| {
            debug!(%field, pattern, negated, "compiling frame matcher");
            Arc::new(FrameMatch::new(field, pattern, negated))
        });
        Arc::clone(instance)
    }

    pub fn len(&self) -> usize {
        self.instances.read().expect("valid lock").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;

    #[test]
    fn test_identical_keys_share_an_instance() {
        let registry = MatcherRegistry::new();
        let a = registry.frame_match("function", "main", false).unwrap();
        let b = registry.frame_match("function", "main", false).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(registry.len(), 1);

        let negated = registry.frame_match("function", "main", true).unwrap();
        let other = registry.frame_match("module", "main", false).unwrap();
        assert!(!Arc::ptr_eq(&a, &negated));
        assert!(!Arc::ptr_eq(&a, &other));
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn test_aliases_share_an_instance() {
        let registry = MatcherRegistry::new();
        let short = registry.frame_match("path", "**/foo.py", false).unwrap();
        let alias = registry.frame_match("stack.abs_path", "**/foo.py", false).unwrap();
        assert!(Arc::ptr_eq(&short, &alias));
    }

    #[test]
    fn test_unknown_key() {
        let registry = MatcherRegistry::new();
        assert_eq!(
            registry.frame_match("nope", "x", false).unwrap_err(),
            EnhancerError::UnknownMatcher { key: "nope".into() }
        );
        assert!(registry.is_empty());
    }

    #[test]
    fn test_oversized_pattern_keeps_registry_usable() {
        let registry = MatcherRegistry::new();
        let pattern = "?".repeat(40_000);
        registry.frame_match("function", &pattern, false).unwrap();
        registry.frame_match("function", "main", false).unwrap();
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_concurrent_registration() {
        let registry = Arc::new(MatcherRegistry::new());
        let handles = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                thread::spawn(move || registry.get_or_compile(MatchField::Module, "app.*", false))
            })
            .collect::<Vec<_>>();
        let instances = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .collect::<Vec<_>>();

        assert_eq!(registry.len(), 1);
        assert!(instances.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
    }
}
