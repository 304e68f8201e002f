//! Voter based access control.
//!
//! Every store operation is checked against an ordered list of [`Voter`]s.
//! A single `Deny` wins, otherwise at least one `Allow` is needed. The
//! unrestricted principal skips the voters entirely; it can only be built
//! inside this crate.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{
    error::StoreError,
    model::{Resource, ResourceId},
};

/// Operation being authorised.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    View,
    Insert,
    Update,
    Delete,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Action::View => "view",
            Action::Insert => "insert",
            Action::Update => "update",
            Action::Delete => "delete",
        };
        f.write_str(s)
    }
}

/// Opinion of a single voter.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Allow,
    Deny,
    Abstain,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Identity {
    Anonymous,
    User(ResourceId),
    Unrestricted,
}

/// The identity an operation runs as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Principal(Identity);

impl Principal {
    pub fn anonymous() -> Self {
        Self(Identity::Anonymous)
    }

    pub fn user(id: ResourceId) -> Self {
        Self(Identity::User(id))
    }

    /// System identity that bypasses all voters.
    pub(crate) fn unrestricted() -> Self {
        Self(Identity::Unrestricted)
    }

    pub fn user_id(&self) -> Option<ResourceId> {
        match self.0 {
            Identity::User(id) => Some(id),
            _ => None,
        }
    }

    pub fn is_anonymous(&self) -> bool {
        self.0 == Identity::Anonymous
    }

    pub fn is_unrestricted(&self) -> bool {
        self.0 == Identity::Unrestricted
    }
}

/// A policy function contributing to an authorisation decision.
pub trait Voter: Send + Sync {
    fn decide(&self, action: Action, actor: &Principal, target: &Resource) -> Decision;
}

/// Base policy: anyone may view, owners may change what they own.
///
/// A user owns the resources it created and its own person resource.
pub struct OwnerVoter;

impl Voter for OwnerVoter {
    fn decide(&self, action: Action, actor: &Principal, target: &Resource) -> Decision {
        if action == Action::View {
            return Decision::Allow;
        }
        match actor.user_id() {
            Some(uid) if uid == target.id || target.creator_id == Some(uid) => Decision::Allow,
            _ => Decision::Abstain,
        }
    }
}

/// Ordered collection of voters.
#[derive(Default)]
pub struct AccessControl {
    voters: Vec<Box<dyn Voter>>,
}

impl AccessControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, voter: Box<dyn Voter>) {
        self.voters.push(voter);
    }

    /// Aggregate the voters' opinions; `Deny` short-circuits.
    pub fn decide(&self, action: Action, actor: &Principal, target: &Resource) -> Decision {
        if actor.is_unrestricted() {
            return Decision::Allow;
        }
        let mut allowed = false;
        for voter in &self.voters {
            match voter.decide(action, actor, target) {
                Decision::Deny => return Decision::Deny,
                Decision::Allow => allowed = true,
                Decision::Abstain => {}
            }
        }
        if allowed {
            Decision::Allow
        } else {
            Decision::Deny
        }
    }

    pub fn check(
        &self,
        action: Action,
        actor: &Principal,
        target: &Resource,
    ) -> Result<(), StoreError> {
        match self.decide(action, actor, target) {
            Decision::Allow => Ok(()),
            _ => Err(StoreError::AccessDenied {
                action,
                id: target.id,
            }),
        }
    }

    /// Inserting needs a logged in (or system) actor.
    pub fn check_insert(&self, actor: &Principal) -> Result<(), StoreError> {
        if actor.is_anonymous() {
            return Err(StoreError::InsertDenied);
        }
        Ok(())
    }
}
