//! Permits and manifests.
//!
//! A [`Permit`] is plain data: the names a behavior may consume and produce in
//! a promise space, the external resources it is granted, and nested namespaces
//! that follow the same shape. A [`Manifest`] maps behavior names to permits and
//! describes one bootstrap run.
//!
//! The on-disk shape is a nested table whose leaves are `true`, `false` or a
//! string tag (a tag counts as `true`):
//!
//! ```toml
//! [makeClientBanks]
//! consume = { loadVat = true, client = true, bridgeManager = true }
//! produce = { bankManager = "bank" }
//! home = { produce = { bank = "bank" } }
//! ```
//!
//! Tables under `consume` and `produce` list space names. Any other table is a
//! nested namespace, and any other truthy leaf is a resource grant. Keys nobody
//! supplies a resource for are carried along and simply never match.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;

const CONSUME: &str = "consume";
const PRODUCE: &str = "produce";

/// A single node of the raw permit tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PermitValue {
    Flag(bool),
    Tag(String),
    Table(BTreeMap<String, PermitValue>),
}

impl PermitValue {
    fn is_truthy(&self) -> bool {
        match self {
            PermitValue::Flag(flag) => *flag,
            PermitValue::Tag(_) | PermitValue::Table(_) => true,
        }
    }
}

/// Normalized permit for one behavior, or one namespace within it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    from = "BTreeMap<String, PermitValue>",
    into = "BTreeMap<String, PermitValue>"
)]
pub struct Permit {
    consume: BTreeSet<String>,
    produce: BTreeSet<String>,
    grants: BTreeSet<String>,
    namespaces: BTreeMap<String, Permit>,
}

impl Permit {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn consume(mut self, name: impl Into<String>) -> Self {
        self.consume.insert(name.into());
        self
    }

    pub fn produce(mut self, name: impl Into<String>) -> Self {
        self.produce.insert(name.into());
        self
    }

    pub fn grant(mut self, name: impl Into<String>) -> Self {
        self.grants.insert(name.into());
        self
    }

    pub fn namespace(mut self, name: impl Into<String>, permit: Permit) -> Self {
        self.namespaces.insert(name.into(), permit);
        self
    }

    #[must_use]
    pub fn may_consume(&self, name: &str) -> bool {
        self.consume.contains(name)
    }

    #[must_use]
    pub fn may_produce(&self, name: &str) -> bool {
        self.produce.contains(name)
    }

    #[must_use]
    pub fn is_granted(&self, name: &str) -> bool {
        self.grants.contains(name)
    }

    #[must_use]
    pub fn nested(&self, name: &str) -> Option<&Permit> {
        self.namespaces.get(name)
    }

    pub fn consume_names(&self) -> impl Iterator<Item = &str> {
        self.consume.iter().map(String::as_str)
    }

    pub fn produce_names(&self) -> impl Iterator<Item = &str> {
        self.produce.iter().map(String::as_str)
    }

    pub fn grant_names(&self) -> impl Iterator<Item = &str> {
        self.grants.iter().map(String::as_str)
    }

    pub fn namespaces(&self) -> impl Iterator<Item = (&str, &Permit)> {
        self.namespaces.iter().map(|(k, v)| (k.as_str(), v))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.consume.is_empty()
            && self.produce.is_empty()
            && self.grants.is_empty()
            && self.namespaces.is_empty()
    }
}

fn truthy_keys(table: &BTreeMap<String, PermitValue>) -> BTreeSet<String> {
    table
        .iter()
        .filter(|(_, value)| value.is_truthy())
        .map(|(key, _)| key.clone())
        .collect()
}

impl From<BTreeMap<String, PermitValue>> for Permit {
    fn from(raw: BTreeMap<String, PermitValue>) -> Self {
        let mut permit = Permit::new();
        for (key, value) in raw {
            match (key.as_str(), value) {
                (CONSUME, PermitValue::Table(table)) => permit.consume = truthy_keys(&table),
                (PRODUCE, PermitValue::Table(table)) => permit.produce = truthy_keys(&table),
                // A bare `consume = true` names nothing.
                (CONSUME | PRODUCE, _) => {}
                (_, PermitValue::Table(table)) => {
                    permit.namespaces.insert(key, Permit::from(table));
                }
                (_, leaf) if leaf.is_truthy() => {
                    permit.grants.insert(key);
                }
                _ => {}
            }
        }
        permit
    }
}

impl From<Permit> for BTreeMap<String, PermitValue> {
    fn from(permit: Permit) -> Self {
        fn flags(names: BTreeSet<String>) -> PermitValue {
            PermitValue::Table(
                names
                    .into_iter()
                    .map(|name| (name, PermitValue::Flag(true)))
                    .collect(),
            )
        }

        let mut raw = BTreeMap::new();
        if !permit.consume.is_empty() {
            raw.insert(CONSUME.to_string(), flags(permit.consume));
        }
        if !permit.produce.is_empty() {
            raw.insert(PRODUCE.to_string(), flags(permit.produce));
        }
        for grant in permit.grants {
            raw.insert(grant, PermitValue::Flag(true));
        }
        for (name, nested) in permit.namespaces {
            raw.insert(name, PermitValue::Table(nested.into()));
        }
        raw
    }
}

// ============================================================================
// Manifest
// ============================================================================

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("invalid manifest: {0}")]
    Parse(#[from] toml::de::Error),
}

/// The full mapping from behavior name to permit for one bootstrap run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Manifest(BTreeMap<String, Permit>);

impl Manifest {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_toml(source: &str) -> Result<Self, ManifestError> {
        Ok(toml::from_str(source)?)
    }

    /// Builder-style entry insert.
    pub fn with(mut self, behavior: impl Into<String>, permit: Permit) -> Self {
        self.0.insert(behavior.into(), permit);
        self
    }

    /// Overlay `other` on this manifest; entries of `other` replace same-named ones.
    #[must_use]
    pub fn extended(mut self, other: Manifest) -> Self {
        self.0.extend(other.0);
        self
    }

    /// This manifest with `behavior` left out.
    #[must_use]
    pub fn without(mut self, behavior: &str) -> Self {
        self.0.remove(behavior);
        self
    }

    #[must_use]
    pub fn get(&self, behavior: &str) -> Option<&Permit> {
        self.0.get(behavior)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Permit)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn behavior_names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

// ============================================================================
// Violations
// ============================================================================

/// What an attenuated view was asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessKind {
    Consume,
    Produce,
    Namespace,
    Resource,
}

impl AccessKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            AccessKind::Consume => "consume",
            AccessKind::Produce => "produce",
            AccessKind::Namespace => "enter namespace",
            AccessKind::Resource => "use resource",
        }
    }
}

/// A behavior reached for a name outside its permit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermitViolation {
    pub behavior: String,
    /// Namespace path from the behavior's root view, empty at the root.
    pub path: Vec<String>,
    pub access: AccessKind,
    pub name: String,
}

impl PermitViolation {
    /// Dotted name including the namespace path, e.g. `home.bank`.
    #[must_use]
    pub fn qualified_name(&self) -> String {
        let mut parts = self.path.clone();
        parts.push(self.name.clone());
        parts.join(".")
    }
}

impl std::fmt::Display for PermitViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "behavior '{}' is not permitted to {} '{}'",
            self.behavior,
            self.access.as_str(),
            self.qualified_name()
        )
    }
}

impl std::error::Error for PermitViolation {}
