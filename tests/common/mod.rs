//! Shared test utilities and fixtures
//!
//! A [`Host`] is one power tree wired to loopback collaborators, ready to run
//! a role's built-in manifest.

#![allow(dead_code)]

use std::any::Any;

use keystone_engine::loopback::Loopback;
use keystone_engine::{
    BootstrapError, BootstrapReport, Bundle, Manifest, PowerTree, PromiseSpace, Role, Sequencer,
    builtin_registry, install_parameters, manifest_for,
};
use serde_json::Value;

pub struct Host {
    pub role: Role,
    pub loopback: Loopback,
    pub sequencer: Sequencer,
}

impl Host {
    pub fn new(role: Role, loopback: Loopback) -> Self {
        Self::with_parameters(role, loopback, Vec::new())
    }

    pub fn with_parameters(
        role: Role,
        loopback: Loopback,
        parameters: Vec<(&str, Value)>,
    ) -> Self {
        let tree = PowerTree::new();
        loopback.install(&tree);
        install_parameters(
            &tree,
            parameters
                .into_iter()
                .map(|(name, value)| (name.to_string(), value)),
        );
        let sequencer = Sequencer::new(builtin_registry(role).unwrap(), tree);
        Self {
            role,
            loopback,
            sequencer,
        }
    }

    pub fn tree(&self) -> &PowerTree {
        self.sequencer.tree()
    }

    pub async fn run(&self) -> Result<BootstrapReport, BootstrapError> {
        self.sequencer.run(&manifest_for(self.role).unwrap()).await
    }

    /// A settled root-space value, downcast.
    pub fn settled<T: Any + Clone>(&self, name: &str) -> T {
        settled_in(self.tree().space(), name)
    }
}

/// Run a role's manifest to completion against fresh loopback collaborators.
pub async fn bootstrapped(role: Role) -> Host {
    let host = Host::new(role, Loopback::new());
    host.run().await.unwrap();
    host
}

pub fn settled_in<T: Any + Clone>(space: &PromiseSpace, name: &str) -> T {
    space
        .consume(name)
        .peek()
        .unwrap_or_else(|| panic!("'{name}' never settled"))
        .unwrap()
        .downcast::<T>()
        .unwrap()
}

/// A role's built-in manifest with one behavior left out.
pub fn manifest_without(role: Role, behavior: &str) -> Manifest {
    manifest_for(role).unwrap().without(behavior)
}

/// Bundle keys, in order.
pub fn sorted_keys(bundle: &Bundle) -> Vec<&str> {
    bundle.keys().collect()
}
