//! Owner / proposed owner / operations role table.
//!
//! Both the ledger and the sale engine embed a [`Roles`] table and consult it
//! for owner-only and owner-or-operations checks. Ownership moves in two
//! steps: the owner proposes a successor, the successor accepts.

use serde::Serialize;
use thiserror::Error;

use tally_shared::AccountId;

use crate::error::ErrorKind;

/// Errors raised by role checks and role changes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoleError {
    /// Caller is not the owner.
    #[error("Account {0} is not the owner")]
    NotOwner(AccountId),

    /// Caller is neither the owner nor the operations delegate.
    #[error("Account {0} is neither the owner nor the operations delegate")]
    NotOwnerOrOperations(AccountId),

    /// Caller is not the proposed owner.
    #[error("Account {0} is not the proposed owner")]
    NotProposedOwner(AccountId),

    /// The account cannot take the requested role.
    #[error("Account {0} cannot take this role")]
    InvalidTarget(AccountId),
}

impl RoleError {
    /// Returns the error code for reports.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::NotOwner(_) | Self::NotOwnerOrOperations(_) | Self::NotProposedOwner(_) => {
                "UNAUTHORIZED"
            }
            Self::InvalidTarget(_) => "INVALID_TARGET",
        }
    }

    /// Returns the error classification.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidTarget(_) => ErrorKind::Input,
            _ => ErrorKind::Authorization,
        }
    }
}

/// Role changes, recorded in the log of the component that owns the table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "role_event", rename_all = "snake_case")]
pub enum RoleEvent {
    /// The operations delegate changed (`None` clears it).
    OperationsUpdated {
        /// New operations delegate.
        operations: Option<AccountId>,
    },
    /// The owner proposed a successor.
    OwnershipTransferInitiated {
        /// Proposed successor.
        proposed_owner: AccountId,
    },
    /// The proposed successor accepted ownership.
    OwnershipTransferCompleted {
        /// New owner.
        owner: AccountId,
    },
}

/// Role table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Roles {
    owner: AccountId,
    proposed_owner: Option<AccountId>,
    operations: Option<AccountId>,
}

impl Roles {
    /// Creates a table owned by `owner` with no delegate.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTarget` if `owner` is the null identifier.
    pub fn new(owner: AccountId) -> Result<Self, RoleError> {
        if owner.is_zero() {
            return Err(RoleError::InvalidTarget(owner));
        }
        Ok(Self {
            owner,
            proposed_owner: None,
            operations: None,
        })
    }

    /// Current owner.
    #[must_use]
    pub const fn owner(&self) -> AccountId {
        self.owner
    }

    /// Pending ownership proposal.
    #[must_use]
    pub const fn proposed_owner(&self) -> Option<AccountId> {
        self.proposed_owner
    }

    /// Current operations delegate.
    #[must_use]
    pub const fn operations(&self) -> Option<AccountId> {
        self.operations
    }

    /// Returns true if `account` is the owner.
    #[must_use]
    pub fn is_owner(&self, account: AccountId) -> bool {
        account == self.owner
    }

    /// Returns true if `account` is the owner or the operations delegate.
    #[must_use]
    pub fn is_owner_or_operations(&self, account: AccountId) -> bool {
        self.is_owner(account) || self.operations == Some(account)
    }

    /// Fails unless `caller` is the owner.
    pub fn require_owner(&self, caller: AccountId) -> Result<(), RoleError> {
        if self.is_owner(caller) {
            Ok(())
        } else {
            Err(RoleError::NotOwner(caller))
        }
    }

    /// Fails unless `caller` is the owner or the operations delegate.
    pub fn require_owner_or_operations(&self, caller: AccountId) -> Result<(), RoleError> {
        if self.is_owner_or_operations(caller) {
            Ok(())
        } else {
            Err(RoleError::NotOwnerOrOperations(caller))
        }
    }

    /// Replaces the operations delegate. Passing the null identifier clears it.
    ///
    /// The owner and a pending proposed owner cannot be delegated, so the
    /// owner and the delegate stay distinct across a handover.
    pub fn set_operations(
        &mut self,
        caller: AccountId,
        operations: AccountId,
    ) -> Result<RoleEvent, RoleError> {
        self.require_owner(caller)?;
        if self.is_owner(operations) || self.proposed_owner == Some(operations) {
            return Err(RoleError::InvalidTarget(operations));
        }
        self.operations = (!operations.is_zero()).then_some(operations);
        Ok(RoleEvent::OperationsUpdated {
            operations: self.operations,
        })
    }

    /// Proposes a new owner. The current owner stays in charge until the
    /// proposal is accepted.
    pub fn propose_owner(
        &mut self,
        caller: AccountId,
        proposed: AccountId,
    ) -> Result<RoleEvent, RoleError> {
        self.require_owner(caller)?;
        if proposed.is_zero() || self.is_owner(proposed) || self.operations == Some(proposed) {
            return Err(RoleError::InvalidTarget(proposed));
        }
        self.proposed_owner = Some(proposed);
        Ok(RoleEvent::OwnershipTransferInitiated {
            proposed_owner: proposed,
        })
    }

    /// Completes a pending ownership transfer.
    pub fn accept_ownership(&mut self, caller: AccountId) -> Result<RoleEvent, RoleError> {
        if self.proposed_owner != Some(caller) {
            return Err(RoleError::NotProposedOwner(caller));
        }
        self.owner = caller;
        self.proposed_owner = None;
        Ok(RoleEvent::OwnershipTransferCompleted { owner: caller })
    }
}
