use serde::{Deserialize, Serialize};

use custody_ledger::{BatchRecord, LedgerEntry, Operation, OperationKind};
use custody_types::{BatchId, IdempotencyKey, MetadataRef, PartyId};

use crate::error::Rejection;

/// Who may request a transition on an existing batch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Authorization {
    /// Any identified caller.
    Anyone,
    /// Only the batch's current owner.
    CurrentOwner,
    /// Only the designated recipient of the pending transfer.
    PendingOwner,
}

impl Authorization {
    /// Check `initiator` against `record`.
    pub fn check(&self, record: &BatchRecord, initiator: &PartyId) -> Result<(), Rejection> {
        match self {
            Self::Anyone => Ok(()),
            Self::CurrentOwner if record.owner == *initiator => Ok(()),
            Self::CurrentOwner => Err(Rejection::NotOwner {
                batch_id: record.id.clone(),
                initiator: initiator.clone(),
            }),
            Self::PendingOwner => match &record.pending_owner {
                None => Err(Rejection::NoPendingTransfer(record.id.clone())),
                Some(pending) if pending == initiator => Ok(()),
                Some(_) => Err(Rejection::NotDesignatedRecipient {
                    batch_id: record.id.clone(),
                    initiator: initiator.clone(),
                }),
            },
        }
    }
}

/// A requested custody transition, before it is checked against state.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Transition {
    Register { metadata_ref: MetadataRef },
    InitiateTransfer { to: PartyId },
    AcceptTransfer,
    ReportViolation { details: String },
}

impl Transition {
    pub fn kind(&self) -> OperationKind {
        match self {
            Self::Register { .. } => OperationKind::Register,
            Self::InitiateTransfer { .. } => OperationKind::InitiateTransfer,
            Self::AcceptTransfer => OperationKind::AcceptTransfer,
            Self::ReportViolation { .. } => OperationKind::ReportViolation,
        }
    }

    /// Authorization rule for transitions on an existing batch.
    pub fn authorization(&self) -> Authorization {
        match self {
            Self::Register { .. } | Self::ReportViolation { .. } => Authorization::Anyone,
            Self::InitiateTransfer { .. } => Authorization::CurrentOwner,
            Self::AcceptTransfer => Authorization::PendingOwner,
        }
    }

    /// Reject malformed arguments before any store access.
    pub fn validate_input(
        &self,
        batch_id: &BatchId,
        initiator: &PartyId,
        key: Option<&IdempotencyKey>,
    ) -> Result<(), Rejection> {
        if batch_id.is_blank() {
            return Err(blank("batch_id"));
        }
        if initiator.is_blank() {
            return Err(blank("initiator"));
        }
        if key.is_some_and(IdempotencyKey::is_blank) {
            return Err(blank("idempotency_key"));
        }
        match self {
            Self::Register { metadata_ref } if metadata_ref.is_blank() => Err(blank("metadata_ref")),
            Self::InitiateTransfer { to } if to.is_blank() => Err(blank("to")),
            Self::ReportViolation { details } if details.trim().is_empty() => Err(blank("details")),
            _ => Ok(()),
        }
    }

    /// Decide the operation to commit given the batch's current record.
    ///
    /// Existence is checked first, then authorization, then the remaining
    /// state preconditions.
    pub fn plan(
        &self,
        batch_id: &BatchId,
        record: Option<&BatchRecord>,
        initiator: &PartyId,
    ) -> Result<Operation, Rejection> {
        if let Self::Register { metadata_ref } = self {
            if record.is_some() {
                return Err(Rejection::AlreadyExists(batch_id.clone()));
            }
            return Ok(Operation::Register {
                metadata_ref: metadata_ref.clone(),
            });
        }

        let record = record.ok_or_else(|| Rejection::NotFound(batch_id.clone()))?;
        self.authorization().check(record, initiator)?;

        match self {
            Self::Register { .. } => Err(Rejection::AlreadyExists(batch_id.clone())),
            Self::InitiateTransfer { to } => {
                if let Some(pending) = &record.pending_owner {
                    return Err(Rejection::TransferAlreadyPending {
                        batch_id: batch_id.clone(),
                        pending_owner: pending.clone(),
                    });
                }
                if *to == record.owner {
                    return Err(Rejection::InvalidInput(
                        "cannot transfer custody to the current owner".into(),
                    ));
                }
                Ok(Operation::InitiateTransfer {
                    from: record.owner.clone(),
                    to: to.clone(),
                })
            }
            Self::AcceptTransfer => Ok(Operation::AcceptTransfer {
                from: record.owner.clone(),
                to: initiator.clone(),
            }),
            Self::ReportViolation { details } => Ok(Operation::ReportViolation {
                details: details.clone(),
            }),
        }
    }

    /// Whether `entry` records this transition requested by `initiator`.
    ///
    /// Used to decide if a write carrying an already-recorded idempotency
    /// key is a resend of that write or a different one.
    pub fn replays(&self, entry: &LedgerEntry, initiator: &PartyId) -> bool {
        if entry.initiator != *initiator {
            return false;
        }
        match (self, &entry.operation) {
            (Self::Register { metadata_ref }, Operation::Register { metadata_ref: stored }) => {
                metadata_ref == stored
            }
            (Self::InitiateTransfer { to }, Operation::InitiateTransfer { to: stored, .. }) => {
                to == stored
            }
            (Self::AcceptTransfer, Operation::AcceptTransfer { to, .. }) => to == initiator,
            (Self::ReportViolation { details }, Operation::ReportViolation { details: stored }) => {
                details == stored
            }
            _ => false,
        }
    }
}

fn blank(field: &str) -> Rejection {
    Rejection::InvalidInput(format!("{field} must not be blank"))
}
