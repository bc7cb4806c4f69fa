use std::{
    borrow::Cow,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, RwLock,
    },
};

use crate::types::Secret;

pub const REDACTED: &str = "***";

/// The set of secret values known to the current run.
///
/// Shared between the [`KeyValueStore`](super::KeyValueStore) that receives secrets and
/// the log writers that must never emit them.
#[derive(Clone, Default)]
pub struct SecretRegistry {
    secrets: Arc<RwLock<Vec<Secret>>>,
    scrubbed: Arc<AtomicUsize>,
}

impl SecretRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, secret: &Secret) {
        if secret.is_empty() {
            return;
        }
        let mut secrets = self.secrets.write().unwrap_or_else(|e| e.into_inner());
        if !secrets.iter().any(|known| known == secret) {
            secrets.push(secret.clone());
            // Longest first, so a secret that contains another one is masked as a whole.
            secrets.sort_by_key(|known| std::cmp::Reverse(known.as_str().len()));
        }
    }

    /// Replace every occurrence of a registered secret in `text` with [`REDACTED`].
    pub fn redact<'a>(&self, text: &'a str) -> Cow<'a, str> {
        let secrets = self.secrets.read().unwrap_or_else(|e| e.into_inner());
        let mut text = Cow::Borrowed(text);
        for secret in secrets.iter() {
            if text.contains(secret.as_str()) {
                text = Cow::Owned(text.replace(secret.as_str(), REDACTED));
            }
        }
        text
    }

    /// Like [`redact`](Self::redact), but counts the hit. Used by the log writers.
    pub fn scrub<'a>(&self, text: &'a str) -> Cow<'a, str> {
        let redacted = self.redact(text);
        if let Cow::Owned(_) = redacted {
            self.scrubbed.fetch_add(1, Ordering::Relaxed);
        }
        redacted
    }

    /// How many log records had to be scrubbed so far.
    pub fn scrubbed_count(&self) -> usize {
        self.scrubbed.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;

    #[test]
    fn test_redact() {
        let registry = SecretRegistry::new();
        registry.register(&Secret::from("pass"));
        registry.register(&Secret::from("password1"));
        registry.register(&Secret::from(""));

        assert_eq!(registry.redact("nothing here"), "nothing here");
        assert_eq!(registry.redact("user:password1"), "user:***");
        assert_eq!(registry.redact("pass pass"), "*** ***");
        assert_eq!(registry.redact("a pass b"), "a *** b");
    }

    #[test]
    fn test_scrub_counts() {
        let registry = SecretRegistry::new();
        registry.register(&Secret::from("s3cr3t"));

        assert_eq!(registry.scrub("clean line"), "clean line");
        assert_eq!(registry.scrubbed_count(), 0);
        assert_eq!(registry.scrub("leaked s3cr3t"), "leaked ***");
        assert_eq!(registry.scrubbed_count(), 1);
    }

    #[test]
    fn test_clones_share_state() {
        let registry = SecretRegistry::new();
        let shared = registry.clone();
        registry.register(&Secret::from("abc123"));
        assert_eq!(shared.redact("xabc123x"), "x***x");
    }
}
