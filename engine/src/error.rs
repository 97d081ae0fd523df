//! Error types shared by the engine modules.

use std::time::Duration;

use keystone_space::SpaceError;
use keystone_types::{CapabilityTypeError, PermitViolation};
use thiserror::Error;

use crate::bridge::BridgeError;
use crate::names::NameHubError;
use crate::vats::VatError;

/// Why a single behavior failed.
///
/// Every engine error converts into this with `?`, so behavior bodies read
/// straight through. Permit violations and double resolutions are fatal to
/// the whole run; nothing in the engine catches them.
#[derive(Debug, Error)]
pub enum BehaviorError {
    #[error(transparent)]
    Permit(#[from] PermitViolation),
    #[error(transparent)]
    Space(#[from] SpaceError),
    #[error(transparent)]
    Names(#[from] NameHubError),
    #[error(transparent)]
    Capability(#[from] CapabilityTypeError),
    #[error(transparent)]
    Bridge(#[from] BridgeError),
    #[error(transparent)]
    Vat(#[from] VatError),
    #[error("resource '{name}' was granted but not supplied")]
    MissingResource { name: String },
    #[error("parameter '{name}' is invalid: {message}")]
    InvalidParameter { name: String, message: String },
    #[error("address '{address}' was already provisioned")]
    AlreadyProvisioned { address: String },
    #[error("nested run failed: {0}")]
    NestedRun(Box<BootstrapError>),
}

impl From<BootstrapError> for BehaviorError {
    fn from(err: BootstrapError) -> Self {
        BehaviorError::NestedRun(Box::new(err))
    }
}

/// Why a bootstrap run failed.
#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("Unknown behavior: {name}")]
    UnknownBehavior { name: String },
    #[error("Duplicate behavior registered: {name}")]
    DuplicateBehavior { name: String },
    #[error("behavior '{behavior}' failed: {source}")]
    BehaviorFailed {
        behavior: String,
        #[source]
        source: BehaviorError,
    },
    #[error("bootstrap did not finish within {limit:?}; still waiting on: {}", .pending.join(", "))]
    TimedOut {
        limit: Duration,
        pending: Vec<String>,
    },
    #[error("the power tree behind this runner has been released")]
    TreeReleased,
}

impl BootstrapError {
    /// Name of the behavior that failed, when the run got that far.
    #[must_use]
    pub fn behavior(&self) -> Option<&str> {
        match self {
            BootstrapError::BehaviorFailed { behavior, .. } => Some(behavior),
            BootstrapError::UnknownBehavior { .. }
            | BootstrapError::DuplicateBehavior { .. }
            | BootstrapError::TimedOut { .. }
            | BootstrapError::TreeReleased => None,
        }
    }
}
