// src/sys/secrets.rs

use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// StoredSecret wraps credentials like the Hyper_ secret key or the registry
/// password.
///
/// 1. It cannot be accidentally logged (`{:?}` prints `[REDACTED alloc::string::String]`).
/// 2. When the struct goes out of scope the heap buffer is zeroized.
///
/// Unlike a bare [`Secret<String>`] it serializes to its plaintext, because the
/// persisted settings record has to carry the value for the host.
#[derive(Clone)]
pub struct StoredSecret(Secret<String>);

impl StoredSecret {
    pub fn new(raw: String) -> Self {
        Self(Secret::new(raw))
    }

    pub fn is_empty(&self) -> bool {
        self.0.expose_secret().is_empty()
    }

    /// Exposes the plaintext for the duration of `action` only.
    pub fn use_secret<F, R>(&self, action: F) -> R
    where
        F: FnOnce(&str) -> R,
    {
        action(self.0.expose_secret())
    }
}

impl Default for StoredSecret {
    fn default() -> Self {
        Self::new(String::new())
    }
}

impl From<String> for StoredSecret {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<&str> for StoredSecret {
    fn from(value: &str) -> Self {
        Self::new(value.to_string())
    }
}

impl ExposeSecret<String> for StoredSecret {
    fn expose_secret(&self) -> &String {
        self.0.expose_secret()
    }
}

impl Serialize for StoredSecret {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.0.expose_secret())
    }
}

impl<'de> Deserialize<'de> for StoredSecret {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::new(raw))
    }
}

impl fmt::Debug for StoredSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
