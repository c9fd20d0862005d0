//! Keyed handler registry with an explicit `new → register* → freeze → use`
//! lifecycle.
//!
//! Registries are plain values owned by whoever builds the engine, so each
//! test can construct its own without sharing state.

use std::collections::HashMap;

use thiserror::Error;

/// Misuse of a [`Registry`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("{category} registry is frozen; cannot register {key}")]
    Frozen { category: &'static str, key: String },

    #[error("{category} type {key} is already registered")]
    Duplicate { category: &'static str, key: String },

    #[error("{category} registry used before freeze")]
    NotFrozen { category: &'static str },

    #[error("no {category} handler registered for {key}")]
    Unknown { category: &'static str, key: String },
}

#[derive(Debug)]
pub struct Registry<H> {
    category: &'static str,
    entries: HashMap<String, H>,
    frozen: bool,
}

impl<H> Registry<H> {
    /// `category` names what is registered ("command", "query") in errors.
    pub fn new(category: &'static str) -> Self {
        Self {
            category,
            entries: HashMap::new(),
            frozen: false,
        }
    }

    pub fn register(&mut self, key: impl Into<String>, handler: H) -> Result<(), RegistryError> {
        let key = key.into();
        if self.frozen {
            return Err(RegistryError::Frozen {
                category: self.category,
                key,
            });
        }
        if self.entries.contains_key(&key) {
            return Err(RegistryError::Duplicate {
                category: self.category,
                key,
            });
        }
        self.entries.insert(key, handler);
        Ok(())
    }

    /// Closes the registry for registration. Idempotent.
    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Looks up the handler for `key`. Only valid once frozen.
    pub fn get(&self, key: &str) -> Result<&H, RegistryError> {
        if !self.frozen {
            return Err(RegistryError::NotFrozen {
                category: self.category,
            });
        }
        self.entries.get(key).ok_or_else(|| RegistryError::Unknown {
            category: self.category,
            key: key.to_string(),
        })
    }

    /// Registered keys, sorted.
    pub fn keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.entries.keys().map(String::as_str).collect();
        keys.sort_unstable();
        keys
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
