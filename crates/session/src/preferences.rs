//! Read-only preference lookups
//!
//! Persistence lives with the front-end; the core only asks for typed flags.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// String key/value bag supplied by the front-end
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Preferences {
    values: BTreeMap<String, String>,
}

impl Preferences {
    /// Skip the privileged path and always generate a script
    pub const FORCE_SCRIPT_ONLY: &'static str = "force_script_only";
    /// Generate a script when the executor is reachable but unprivileged
    pub const SCRIPT_FALLBACK: &'static str = "script_fallback";
    /// Select the installed image for the next boot
    pub const FINALIZE_ACTIVATE: &'static str = "finalize_activate";

    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Boolean lookup; missing or unparsable values yield `default`
    #[must_use]
    pub fn flag(&self, key: &str, default: bool) -> bool {
        match self.get(key).map(|v| v.trim().to_ascii_lowercase()).as_deref() {
            Some("true" | "1" | "yes" | "on") => true,
            Some("false" | "0" | "no" | "off") => false,
            Some(other) => {
                tracing::debug!(key, value = other, "ignoring unparsable preference flag");
                default
            }
            None => default,
        }
    }

    #[must_use]
    pub fn force_script_only(&self) -> bool {
        self.flag(Self::FORCE_SCRIPT_ONLY, false)
    }

    #[must_use]
    pub fn script_fallback(&self) -> bool {
        self.flag(Self::SCRIPT_FALLBACK, false)
    }

    #[must_use]
    pub fn finalize_activate(&self) -> bool {
        self.flag(Self::FINALIZE_ACTIVATE, true)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Preferences {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self {
            values: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let prefs = Preferences::new();
        assert!(!prefs.force_script_only());
        assert!(!prefs.script_fallback());
        assert!(prefs.finalize_activate());
    }

    #[test]
    fn flag_parsing() {
        let prefs: Preferences = [
            ("force_script_only", "YES"),
            ("finalize_activate", "0"),
            ("script_fallback", "maybe"),
        ]
        .into_iter()
        .collect();
        assert!(prefs.force_script_only());
        assert!(!prefs.finalize_activate());
        assert!(!prefs.script_fallback());
    }
}
