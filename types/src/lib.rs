//! Core data types for Keystone.
//!
//! This crate contains pure data with no IO, no async, and minimal dependencies:
//! opaque capability values and bundles, permits and manifests, deployment roles,
//! and bridge wire messages. Everything here can be used from any layer.

// Pedantic lint configuration - these are intentional design choices
#![allow(clippy::missing_errors_doc)] // Result-returning functions are self-explanatory
#![allow(clippy::missing_panics_doc)] // Panics are documented in assertions

mod bridge;
mod permit;
mod role;

pub use bridge::{BridgeMessage, ProvisionRequest};
pub use permit::{AccessKind, Manifest, ManifestError, Permit, PermitValue, PermitViolation};
pub use role::{Role, RoleError};

use std::any::{Any, type_name};
use std::collections::BTreeMap;
use std::collections::btree_map;
use std::sync::Arc;
use thiserror::Error;

// ============================================================================
// Capability
// ============================================================================

/// An opaque, shareable capability value.
///
/// Everything that flows through a promise space, a name hub, or a client
/// bundle is a `Capability`: service handles, registries, static data. Cloning
/// is cheap and preserves identity, so two clones are [`Capability::same`].
#[derive(Clone)]
pub struct Capability {
    value: Arc<dyn Any + Send + Sync>,
    type_name: &'static str,
}

/// A capability held a different type than the caller asked for.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("capability holds {actual}, expected {expected}")]
pub struct CapabilityTypeError {
    pub expected: &'static str,
    pub actual: &'static str,
}

impl Capability {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self {
            value: Arc::new(value),
            type_name: type_name::<T>(),
        }
    }

    /// Name of the concrete type stored in this capability.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    #[must_use]
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.value.downcast_ref::<T>()
    }

    /// Clone the stored value out as `T`.
    pub fn downcast<T: Any + Clone>(&self) -> Result<T, CapabilityTypeError> {
        self.downcast_ref::<T>()
            .cloned()
            .ok_or(CapabilityTypeError {
                expected: type_name::<T>(),
                actual: self.type_name,
            })
    }

    #[must_use]
    pub fn is<T: Any>(&self) -> bool {
        self.value.is::<T>()
    }

    /// Identity comparison: true when both handles point at the same value.
    #[must_use]
    pub fn same(&self, other: &Capability) -> bool {
        Arc::ptr_eq(&self.value, &other.value)
    }
}

impl std::fmt::Debug for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Capability({})", self.type_name)
    }
}

// ============================================================================
// Bundle
// ============================================================================

/// A named set of capabilities, as handed to an external consumer.
///
/// Keys are kept sorted so that bundles compare and print deterministically.
#[derive(Debug, Clone, Default)]
pub struct Bundle(BTreeMap<String, Capability>);

impl Bundle {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: Capability) -> Self {
        self.0.insert(key.into(), value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Capability) -> Option<Capability> {
        self.0.insert(key.into(), value)
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Capability> {
        self.0.get(key)
    }

    /// Look up `key` and downcast it. `None` when the key is absent or the type differs.
    #[must_use]
    pub fn get_as<T: Any + Clone>(&self, key: &str) -> Option<T> {
        self.0.get(key).and_then(|cap| cap.downcast::<T>().ok())
    }

    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Shallow merge: every key of `other` overwrites the same key here.
    pub fn merge(&mut self, other: Bundle) {
        self.0.extend(other.0);
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, Capability> {
        self.0.iter()
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

impl<K: Into<String>> FromIterator<(K, Capability)> for Bundle {
    fn from_iter<I: IntoIterator<Item = (K, Capability)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

impl IntoIterator for Bundle {
    type Item = (String, Capability);
    type IntoIter = btree_map::IntoIter<String, Capability>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a Bundle {
    type Item = (&'a String, &'a Capability);
    type IntoIter = btree_map::Iter<'a, String, Capability>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
