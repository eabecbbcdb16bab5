use serde::{Deserialize, Serialize};

use custody_types::BatchId;

use crate::chain;
use crate::records::{BatchRecord, LedgerEntry};

/// Result of validating a batch's entry stream.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrityReport {
    pub batch_id: BatchId,
    pub entry_count: u64,
    pub hash_chain_valid: bool,
    pub sequence_monotonic: bool,
    pub fold_consistent: bool,
    pub issues: Vec<IntegrityIssue>,
}

impl IntegrityReport {
    /// Returns `true` if all checks passed.
    pub fn is_valid(&self) -> bool {
        self.issues.is_empty()
    }
}

/// A specific integrity problem found during validation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrityIssue {
    pub seq: u64,
    pub kind: IssueKind,
    pub description: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    ForeignEntry,
    SequenceGap,
    HashChainBreak,
    HashMismatch,
    InvalidTransition,
}

/// Entry stream validator.
pub struct ChainValidator;

impl ChainValidator {
    /// Check sequence numbering, hash links, entry hashes, and that the
    /// stream folds into a record.
    pub fn validate(batch_id: &BatchId, entries: &[LedgerEntry]) -> IntegrityReport {
        let mut issues = Vec::new();
        let mut hash_chain_valid = true;
        let mut sequence_monotonic = true;

        for (index, entry) in entries.iter().enumerate() {
            if entry.batch_id != *batch_id {
                issues.push(IntegrityIssue {
                    seq: entry.seq,
                    kind: IssueKind::ForeignEntry,
                    description: format!("entry belongs to {}", entry.batch_id),
                });
            }

            let expected_seq = (index + 1) as u64;
            if entry.seq != expected_seq {
                sequence_monotonic = false;
                issues.push(IntegrityIssue {
                    seq: entry.seq,
                    kind: IssueKind::SequenceGap,
                    description: format!("expected seq {expected_seq}, got {}", entry.seq),
                });
            }

            let expected_prev = index.checked_sub(1).map(|i| entries[i].entry_hash);
            if entry.prev_hash != expected_prev {
                hash_chain_valid = false;
                issues.push(IntegrityIssue {
                    seq: entry.seq,
                    kind: IssueKind::HashChainBreak,
                    description: "previous hash link mismatch".into(),
                });
            }

            match chain::entry_hash(entry) {
                Ok(hash) if hash == entry.entry_hash => {}
                Ok(_) => {
                    hash_chain_valid = false;
                    issues.push(IntegrityIssue {
                        seq: entry.seq,
                        kind: IssueKind::HashMismatch,
                        description: "entry hash does not match content".into(),
                    });
                }
                Err(e) => {
                    hash_chain_valid = false;
                    issues.push(IntegrityIssue {
                        seq: entry.seq,
                        kind: IssueKind::HashMismatch,
                        description: e.to_string(),
                    });
                }
            }
        }

        let fold_consistent = match BatchRecord::fold(entries) {
            Ok(_) => true,
            Err(e) => {
                issues.push(IntegrityIssue {
                    seq: 0,
                    kind: IssueKind::InvalidTransition,
                    description: e.to_string(),
                });
                false
            }
        };

        IntegrityReport {
            batch_id: batch_id.clone(),
            entry_count: entries.len() as u64,
            hash_chain_valid,
            sequence_monotonic,
            fold_consistent,
            issues,
        }
    }
}
