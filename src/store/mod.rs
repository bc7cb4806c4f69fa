pub mod secret;
pub mod substitute;

use std::{borrow::Cow, collections::BTreeMap, fmt::Debug};

use thiserror::Error;

use crate::types::Secret;

pub use secret::SecretRegistry;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("`{0}` is not a valid variable name")]
    InvalidKey(String),

    #[error("variable `{0}` holds a secret and cannot be overwritten")]
    SecretOverwrite(String),

    #[error("secret variable `{0}` is already set")]
    SecretAlreadySet(String),

    #[error("secret variable `{0}` may only be referenced from a step input")]
    SecretReference(String),
}

enum Value {
    Plain(String),
    Secret(Secret),
}

impl Value {
    fn as_str(&self) -> &str {
        match self {
            Value::Plain(value) => value,
            Value::Secret(secret) => secret.as_str(),
        }
    }
}

/// The variables shared between the steps of one run.
///
/// Values are written by configuration loading and by output capture, and read by
/// placeholder substitution. Entries are never removed. Secret entries are write-once
/// and are registered with the [`SecretRegistry`] so log sinks can mask them.
#[derive(Default)]
pub struct KeyValueStore {
    values: BTreeMap<String, Value>,
    registry: SecretRegistry,
}

impl KeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_registry(registry: SecretRegistry) -> Self {
        Self {
            values: BTreeMap::new(),
            registry,
        }
    }

    pub fn registry(&self) -> &SecretRegistry {
        &self.registry
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) -> Result<(), StoreError> {
        let key = key.into();
        if !substitute::is_identifier(&key) {
            return Err(StoreError::InvalidKey(key));
        }
        if self.is_secret(&key) {
            return Err(StoreError::SecretOverwrite(key));
        }
        self.values.insert(key, Value::Plain(value.into()));
        Ok(())
    }

    pub fn insert_secret(&mut self, key: impl Into<String>, secret: Secret) -> Result<(), StoreError> {
        let key = key.into();
        if !substitute::is_identifier(&key) {
            return Err(StoreError::InvalidKey(key));
        }
        if self.is_secret(&key) {
            return Err(StoreError::SecretAlreadySet(key));
        }
        self.registry.register(&secret);
        self.values.insert(key, Value::Secret(secret));
        Ok(())
    }

    /// The value of a plain (non secret) variable.
    pub fn get(&self, key: &str) -> Option<&str> {
        match self.values.get(key) {
            Some(Value::Plain(value)) => Some(value),
            _ => None,
        }
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn is_secret(&self, key: &str) -> bool {
        matches!(self.values.get(key), Some(Value::Secret(_)))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    /// Substitute every placeholder, secrets included. Only meant for text that is
    /// never displayed; see [`substitute_secret`](Self::substitute_secret).
    pub fn substitute(&self, text: &str) -> String {
        substitute::substitute(text, |key| self.values.get(key).map(Value::as_str))
    }

    /// Substitute text that will be displayed or logged. Fails if any placeholder refers
    /// to a secret.
    pub fn substitute_public(&self, text: &str) -> Result<String, StoreError> {
        if let Some(key) = substitute::placeholders(text)
            .into_iter()
            .find(|key| self.is_secret(key))
        {
            return Err(StoreError::SecretReference(key.to_owned()));
        }
        Ok(substitute::substitute(text, |key| self.get(key)))
    }

    pub fn substitute_secret(&self, text: &str) -> Secret {
        Secret::from(self.substitute(text))
    }

    pub fn redact<'a>(&self, text: &'a str) -> Cow<'a, str> {
        self.registry.redact(text)
    }
}

impl Debug for KeyValueStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map()
            .entries(self.values.iter().map(|(key, value)| {
                let shown = match value {
                    Value::Plain(value) => value.as_str(),
                    Value::Secret(_) => secret::REDACTED,
                };
                (key, shown)
            }))
            .finish()
    }
}

#[cfg(test)]
pub mod tests {
    use anyhow::Result;

    use super::*;

    #[test]
    fn test_set_and_get() -> Result<()> {
        let mut store = KeyValueStore::new();
        store.set("NAME", "usb0")?;
        assert_eq!(store.get("NAME"), Some("usb0"));
        assert_eq!(store.get("OTHER"), None);
        assert_eq!(store.substitute("Formatting {NAME}"), "Formatting usb0");

        store.set("NAME", "usb1")?;
        assert_eq!(store.get("NAME"), Some("usb1"));

        assert_eq!(
            store.set("not-an-ident", "x"),
            Err(StoreError::InvalidKey("not-an-ident".into()))
        );
        Ok(())
    }

    #[test]
    fn test_secret_is_write_once() -> Result<()> {
        let mut store = KeyValueStore::new();
        store.insert_secret("USER_PASS", Secret::from("hunter2"))?;

        assert_eq!(
            store.insert_secret("USER_PASS", Secret::from("other")),
            Err(StoreError::SecretAlreadySet("USER_PASS".into()))
        );
        assert_eq!(
            store.set("USER_PASS", "plain"),
            Err(StoreError::SecretOverwrite("USER_PASS".into()))
        );
        assert!(store.is_secret("USER_PASS"));
        assert!(store.contains_key("USER_PASS"));
        assert_eq!(store.get("USER_PASS"), None);
        Ok(())
    }

    #[test]
    fn test_secret_substitution_rules() -> Result<()> {
        let mut store = KeyValueStore::new();
        store.set("USER_NAME", "alice")?;
        store.insert_secret("USER_PASS", Secret::from("hunter2"))?;

        assert_eq!(
            store.substitute_public("chpasswd for {USER_NAME}")?,
            "chpasswd for alice"
        );
        assert_eq!(
            store.substitute_public("echo {USER_PASS}"),
            Err(StoreError::SecretReference("USER_PASS".into()))
        );
        assert_eq!(
            store.substitute_secret("{USER_NAME}:{USER_PASS}\n").as_str(),
            "alice:hunter2\n"
        );
        assert_eq!(store.redact("got hunter2 back"), "got *** back");
        Ok(())
    }

    #[test]
    fn test_debug_masks_secrets() -> Result<()> {
        let mut store = KeyValueStore::new();
        store.set("DEVICE", "/dev/sdb")?;
        store.insert_secret("USER_PASS", Secret::from("hunter2"))?;

        let printed = format!("{store:?}");
        assert!(printed.contains("/dev/sdb"));
        assert!(!printed.contains("hunter2"));
        Ok(())
    }

    #[test]
    fn test_shared_registry() -> Result<()> {
        let registry = SecretRegistry::new();
        let mut store = KeyValueStore::with_registry(registry.clone());
        store.insert_secret("USER_PASS", Secret::from("hunter2"))?;
        assert_eq!(registry.redact("pass=hunter2"), "pass=***");
        Ok(())
    }
}
