//! Attenuation: building a behavior's restricted view of the power tree.
//!
//! The [`PowerTree`] is everything the host holds for one run: the promise
//! space, external resources (vat roots, devices, parameters) and nested
//! namespaces of the same shape. [`attenuate`] walks a [`Permit`] against the
//! tree and returns [`Powers`] exposing exactly the permitted names, with each
//! consume and produce handle bound up front. Reaching for anything else
//! fails with a [`PermitViolation`].

use std::any::Any;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError, Weak};

use keystone_space::{Consumer, Producer, PromiseSpace};
use keystone_types::{AccessKind, Capability, Permit, PermitViolation};

use crate::error::BehaviorError;

struct PowerNode {
    space: Arc<PromiseSpace>,
    resources: Mutex<BTreeMap<String, Capability>>,
    children: Mutex<BTreeMap<String, PowerTree>>,
}

/// One node of the host's power tree. Clones share the node.
#[derive(Clone)]
pub struct PowerTree {
    node: Arc<PowerNode>,
}

impl PowerTree {
    /// A tree rooted at a fresh promise space.
    #[must_use]
    pub fn new() -> Self {
        Self::with_space(Arc::new(PromiseSpace::new()))
    }

    #[must_use]
    pub fn with_space(space: Arc<PromiseSpace>) -> Self {
        Self {
            node: Arc::new(PowerNode {
                space,
                resources: Mutex::default(),
                children: Mutex::default(),
            }),
        }
    }

    #[must_use]
    pub fn space(&self) -> &Arc<PromiseSpace> {
        &self.node.space
    }

    /// Supply a resource at this level, replacing any previous one.
    pub fn insert_resource(&self, name: &str, value: Capability) {
        self.node
            .resources
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string(), value);
    }

    #[must_use]
    pub fn resource(&self, name: &str) -> Option<Capability> {
        self.node
            .resources
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    /// The child namespace `name`, created with its own space on first use.
    #[must_use]
    pub fn namespace(&self, name: &str) -> PowerTree {
        let mut children = self
            .node
            .children
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        children.entry(name.to_string()).or_default().clone()
    }

    /// A handle that does not keep this node alive.
    #[must_use]
    pub fn downgrade(&self) -> WeakPowerTree {
        WeakPowerTree {
            node: Arc::downgrade(&self.node),
        }
    }
}

/// Non-owning handle to a [`PowerTree`], for capabilities stored inside it.
#[derive(Clone)]
pub struct WeakPowerTree {
    node: Weak<PowerNode>,
}

impl WeakPowerTree {
    #[must_use]
    pub fn upgrade(&self) -> Option<PowerTree> {
        self.node.upgrade().map(|node| PowerTree { node })
    }
}

impl Default for PowerTree {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for PowerTree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let resources: Vec<String> = self
            .node
            .resources
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        let children: Vec<String> = self
            .node
            .children
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        f.debug_struct("PowerTree")
            .field("space", &self.node.space)
            .field("resources", &resources)
            .field("namespaces", &children)
            .finish()
    }
}

/// The restricted view a behavior runs with.
#[derive(Clone)]
pub struct Powers {
    behavior: Arc<str>,
    path: Vec<String>,
    consume: BTreeMap<String, Consumer>,
    produce: BTreeMap<String, Producer>,
    resources: BTreeMap<String, Option<Capability>>,
    namespaces: BTreeMap<String, Powers>,
}

/// Restrict `tree` to what `permit` allows `behavior` to touch.
#[must_use]
pub fn attenuate(behavior: &str, permit: &Permit, tree: &PowerTree) -> Powers {
    attenuate_at(Arc::from(behavior), Vec::new(), permit, tree)
}

fn attenuate_at(
    behavior: Arc<str>,
    path: Vec<String>,
    permit: &Permit,
    tree: &PowerTree,
) -> Powers {
    let space = tree.space();
    let consume = permit
        .consume_names()
        .map(|name| (name.to_string(), space.consume(name)))
        .collect();
    let produce = permit
        .produce_names()
        .map(|name| (name.to_string(), space.produce(name)))
        .collect();
    let resources = permit
        .grant_names()
        .map(|name| (name.to_string(), tree.resource(name)))
        .collect();
    let namespaces = permit
        .namespaces()
        .map(|(name, nested)| {
            let mut nested_path = path.clone();
            nested_path.push(name.to_string());
            let view = attenuate_at(
                Arc::clone(&behavior),
                nested_path,
                nested,
                &tree.namespace(name),
            );
            (name.to_string(), view)
        })
        .collect();
    Powers {
        behavior,
        path,
        consume,
        produce,
        resources,
        namespaces,
    }
}

impl Powers {
    #[must_use]
    pub fn behavior(&self) -> &str {
        &self.behavior
    }

    fn violation(&self, access: AccessKind, name: &str) -> PermitViolation {
        PermitViolation {
            behavior: self.behavior.to_string(),
            path: self.path.clone(),
            access,
            name: name.to_string(),
        }
    }

    pub fn consume(&self, name: &str) -> Result<Consumer, PermitViolation> {
        self.consume
            .get(name)
            .cloned()
            .ok_or_else(|| self.violation(AccessKind::Consume, name))
    }

    /// Await `name` and downcast the value.
    pub async fn consume_as<T: Any + Clone>(&self, name: &str) -> Result<T, BehaviorError> {
        let value = self.consume(name)?.await?;
        Ok(value.downcast::<T>()?)
    }

    pub fn produce(&self, name: &str) -> Result<Producer, PermitViolation> {
        self.produce
            .get(name)
            .cloned()
            .ok_or_else(|| self.violation(AccessKind::Produce, name))
    }

    pub fn namespace(&self, name: &str) -> Result<&Powers, PermitViolation> {
        self.namespaces
            .get(name)
            .ok_or_else(|| self.violation(AccessKind::Namespace, name))
    }

    /// A granted resource. `Ok(None)` when granted but the host supplied none.
    pub fn resource(&self, name: &str) -> Result<Option<Capability>, PermitViolation> {
        self.resources
            .get(name)
            .cloned()
            .ok_or_else(|| self.violation(AccessKind::Resource, name))
    }

    pub fn resource_as<T: Any + Clone>(&self, name: &str) -> Result<Option<T>, BehaviorError> {
        match self.resource(name)? {
            Some(value) => Ok(Some(value.downcast::<T>()?)),
            None => Ok(None),
        }
    }

    pub fn consume_keys(&self) -> impl Iterator<Item = &str> {
        self.consume.keys().map(String::as_str)
    }

    pub fn produce_keys(&self) -> impl Iterator<Item = &str> {
        self.produce.keys().map(String::as_str)
    }

    pub fn namespace_keys(&self) -> impl Iterator<Item = &str> {
        self.namespaces.keys().map(String::as_str)
    }

    pub fn resource_keys(&self) -> impl Iterator<Item = &str> {
        self.resources.keys().map(String::as_str)
    }
}

impl std::fmt::Debug for Powers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Powers")
            .field("behavior", &self.behavior)
            .field("path", &self.path)
            .field("consume", &self.consume.keys().collect::<Vec<_>>())
            .field("produce", &self.produce.keys().collect::<Vec<_>>())
            .field("resources", &self.resources.keys().collect::<Vec<_>>())
            .field("namespaces", &self.namespaces)
            .finish()
    }
}
