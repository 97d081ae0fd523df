//! Name hubs: read-only hierarchical lookup paired with a write-capable admin.
//!
//! A [`NameHub`] and its [`NameAdmin`] share one backing map. Handing out the
//! hub grants lookup only; updates need the admin. Hubs nest by storing a hub
//! as the value of an entry, which is how the root registry groups entries
//! by kind and how per-address hubs hang off `namesByAddress`.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard};

use keystone_types::Capability;
use thiserror::Error;

/// Kinds registered in the root registry.
pub const ROOT_KINDS: [&str; 5] = ["issuer", "brand", "installation", "instance", "uiConfig"];

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum NameHubError {
    #[error("name '{}' not found", .path.join("."))]
    NotFound { path: Vec<String> },
    #[error("'{}' is not a name hub", .path.join("."))]
    NotAHub { path: Vec<String> },
    #[error("no admin for kind '{kind}'")]
    UnknownKind { kind: String },
}

type Entries = Arc<RwLock<BTreeMap<String, Capability>>>;

/// Create a hub and its admin over a fresh, empty map.
#[must_use]
pub fn make_name_hub_kit() -> (NameHub, NameAdmin) {
    let entries = Entries::default();
    (
        NameHub {
            entries: Arc::clone(&entries),
        },
        NameAdmin { entries },
    )
}

/// Read side of a name hub.
#[derive(Clone)]
pub struct NameHub {
    entries: Entries,
}

impl NameHub {
    /// Look up `petname` in the nested hub registered under `kind`.
    pub fn lookup(&self, kind: &str, petname: &str) -> Result<Capability, NameHubError> {
        self.lookup_path(&[kind, petname])
    }

    /// Walk nested hubs. Every step but the last must land on a [`NameHub`].
    ///
    /// An empty path yields this hub itself.
    pub fn lookup_path(&self, path: &[&str]) -> Result<Capability, NameHubError> {
        let Some((last, parents)) = path.split_last() else {
            return Ok(Capability::new(self.clone()));
        };
        let mut hub = self.clone();
        for (depth, key) in parents.iter().enumerate() {
            let value = hub.get(key).ok_or_else(|| not_found(&path[..=depth]))?;
            hub = value
                .downcast::<NameHub>()
                .map_err(|_| NameHubError::NotAHub {
                    path: owned(&path[..=depth]),
                })?;
        }
        hub.get(last).ok_or_else(|| not_found(path))
    }

    #[must_use]
    pub fn has(&self, kind: &str, petname: &str) -> bool {
        self.lookup(kind, petname).is_ok()
    }

    /// Single-level lookup.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Capability> {
        self.read().get(key).cloned()
    }

    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.read().keys().cloned().collect()
    }

    #[must_use]
    pub fn entries(&self) -> Vec<(String, Capability)> {
        self.read()
            .iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }

    fn read(&self) -> RwLockReadGuard<'_, BTreeMap<String, Capability>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for NameHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("NameHub").field(&self.keys()).finish()
    }
}

fn owned(path: &[&str]) -> Vec<String> {
    path.iter().map(ToString::to_string).collect()
}

fn not_found(path: &[&str]) -> NameHubError {
    NameHubError::NotFound { path: owned(path) }
}

/// Write side of a name hub.
#[derive(Clone)]
pub struct NameAdmin {
    entries: Entries,
}

impl NameAdmin {
    /// Set `key`, replacing any previous value.
    pub fn update(&self, key: &str, value: Capability) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value);
    }

    pub fn delete(&self, key: &str) -> Result<(), NameHubError> {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key)
            .map(drop)
            .ok_or_else(|| not_found(&[key]))
    }
}

impl std::fmt::Debug for NameAdmin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NameAdmin").finish_non_exhaustive()
    }
}

// ============================================================================
// Root registry
// ============================================================================

/// Admins for each kind of the root registry.
#[derive(Debug, Clone, Default)]
pub struct NameAdmins {
    admins: BTreeMap<String, NameAdmin>,
}

impl NameAdmins {
    pub fn get(&self, kind: &str) -> Result<&NameAdmin, NameHubError> {
        self.admins.get(kind).ok_or_else(|| NameHubError::UnknownKind {
            kind: kind.to_string(),
        })
    }

    /// Admins for several kinds, in the order asked.
    pub fn collect(&self, kinds: &[&str]) -> Result<Vec<NameAdmin>, NameHubError> {
        kinds.iter().map(|kind| self.get(kind).cloned()).collect()
    }

    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.admins.keys().map(String::as_str)
    }
}

/// The root registry (`agoricNames`) with one nested kit per kind.
#[derive(Debug, Clone)]
pub struct RootNames {
    pub agoric_names: NameHub,
    pub agoric_names_admin: NameAdmin,
    pub name_admins: NameAdmins,
}

#[must_use]
pub fn make_root_names() -> RootNames {
    let (agoric_names, agoric_names_admin) = make_name_hub_kit();
    let mut name_admins = NameAdmins::default();
    for kind in ROOT_KINDS {
        let (hub, admin) = make_name_hub_kit();
        agoric_names_admin.update(kind, Capability::new(hub));
        name_admins.admins.insert(kind.to_string(), admin);
    }
    RootNames {
        agoric_names,
        agoric_names_admin,
        name_admins,
    }
}

// ============================================================================
// Per-address hubs
// ============================================================================

/// Admin of one address's hub, which also knows the address it serves.
#[derive(Debug, Clone)]
pub struct MyAddressNameAdmin {
    admin: NameAdmin,
    address: String,
}

impl MyAddressNameAdmin {
    #[must_use]
    pub fn my_address(&self) -> &str {
        &self.address
    }

    pub fn update(&self, key: &str, value: Capability) {
        self.admin.update(key, value);
    }

    pub fn delete(&self, key: &str) -> Result<(), NameHubError> {
        self.admin.delete(key)
    }
}

/// `namesByAddress`, with a hub created the first time each address is seen.
#[derive(Debug, Clone)]
pub struct AddressNames {
    names_by_address: NameHub,
    names_by_address_admin: NameAdmin,
    created: Arc<Mutex<BTreeMap<String, MyAddressNameAdmin>>>,
}

impl AddressNames {
    pub fn new() -> Self {
        let (names_by_address, names_by_address_admin) = make_name_hub_kit();
        Self {
            names_by_address,
            names_by_address_admin,
            created: Arc::default(),
        }
    }

    #[must_use]
    pub fn hub(&self) -> &NameHub {
        &self.names_by_address
    }

    #[must_use]
    pub fn admin(&self) -> &NameAdmin {
        &self.names_by_address_admin
    }

    /// The admin for `address`, registering a new hub on first use.
    pub fn for_address(&self, address: &str) -> MyAddressNameAdmin {
        let mut created = self.created.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = created.get(address) {
            return existing.clone();
        }
        let (hub, admin) = make_name_hub_kit();
        self.names_by_address_admin
            .update(address, Capability::new(hub));
        let my_admin = MyAddressNameAdmin {
            admin,
            address: address.to_string(),
        };
        created.insert(address.to_string(), my_admin.clone());
        tracing::debug!(address, "address name hub created");
        my_admin
    }
}

impl Default for AddressNames {
    fn default() -> Self {
        Self::new()
    }
}
