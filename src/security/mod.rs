//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Registration:
//!     route/sse/ws registered with Option<RoleSet>
//!     → routing table rejects roles when no evaluator is installed
//!
//! Dispatch:
//!     matched endpoint + Context
//!     → access_control.rs (AccessEvaluator::evaluate)
//!     → Granted: run endpoint
//!     → Denied: answer with the evaluator's status
//! ```
//!
//! # Design Decisions
//! - Roles are opaque names; evaluation policy belongs to the evaluator
//! - When an evaluator is installed it sees every endpoint, not only
//!   endpoints that carry roles

pub mod access_control;

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

pub use access_control::{Access, AccessEvaluator, HeaderRoleEvaluator};

/// A named role an endpoint can be restricted to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Role(String);

impl Role {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Role {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// Set of roles permitted on an endpoint.
pub type RoleSet = HashSet<Role>;

/// Build a [`RoleSet`] from role names.
pub fn roles<I, R>(names: I) -> RoleSet
where
    I: IntoIterator<Item = R>,
    R: Into<Role>,
{
    names.into_iter().map(Into::into).collect()
}
