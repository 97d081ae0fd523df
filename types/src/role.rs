//! Deployment roles.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Which manifest variant a process runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Role {
    /// Production chain bootstrap.
    #[default]
    Chain,
    /// Simulated chain: the production set plus fixed demo identities.
    SimChain,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RoleError {
    #[error("role was not recognized: {value:?} (expected one of: chain, sim-chain)")]
    Unrecognized { value: String },
}

impl Role {
    pub const ALL: [Role; 2] = [Role::Chain, Role::SimChain];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Chain => "chain",
            Role::SimChain => "sim-chain",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = RoleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "chain" => Ok(Role::Chain),
            "sim-chain" => Ok(Role::SimChain),
            _ => Err(RoleError::Unrecognized {
                value: s.to_string(),
            }),
        }
    }
}

impl TryFrom<String> for Role {
    type Error = RoleError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Role> for String {
    fn from(role: Role) -> Self {
        role.as_str().to_string()
    }
}
