//! Bootstrap engine for Keystone.
//!
//! A bootstrap is a set of named behaviors, each run with only the powers its
//! [`Permit`](keystone_types::Permit) grants. Behaviors start together and
//! order themselves by waiting on names in a shared promise space.
//!
//! - [`attenuate`]: the power tree and per-behavior attenuated views
//! - [`sequencer`]: the behavior registry and the run loop
//! - [`behaviors`]: the built-in chain and simulation behaviors
//! - [`names`], [`client`], [`bridge`]: services those behaviors build
//! - [`vats`]: the collaborator traits the host supplies
//! - [`loopback`]: in-process collaborators for hosts without a real chain

#![allow(clippy::missing_errors_doc)]

pub mod attenuate;
pub mod behaviors;
pub mod bridge;
pub mod client;
pub mod error;
pub mod loopback;
pub mod names;
pub mod sequencer;
pub mod vats;

pub use attenuate::{PowerTree, Powers, WeakPowerTree, attenuate};
pub use behaviors::{PARAMETERS, builtin_registry, install_parameters, manifest_for};
pub use bridge::{BridgeError, BridgeHandler, BridgeManager};
pub use client::{ClientCreator, ClientFacet, ClientManager, Configuration, LiveBundle};
pub use error::{BehaviorError, BootstrapError};
pub use names::{NameAdmin, NameHub, NameHubError};
pub use sequencer::{
    Behavior, BehaviorOutcome, BehaviorRegistry, BehaviorRunner, BootstrapReport, RUN_BEHAVIORS,
    RunId, Sequencer, behavior_fn, run_behaviors,
};
pub use vats::VatError;

pub use keystone_space::{Consumer, PromiseSpace, Producer, SpaceError};
pub use keystone_types::{Bundle, Capability, Manifest, Permit, PermitViolation, Role};
