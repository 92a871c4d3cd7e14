//! Transition proofs and their native replay.
//!
//! A [`TransactionProof`] lets a third party check that one transfer moved the
//! ledger from `root_before` to `root_after` without seeing any other account:
//! the pre-state of both parties is opened against the old root, the
//! post-state is derived from it and the transfer, and the new root is rebuilt
//! from the old paths with only those two leaves replaced.

use halo2curves_axiom::bn256::Fr;
use serde::{Deserialize, Serialize};
use snasma_common::serde_fr;
use thiserror::Error;

use crate::account::AccountSnapshot;
use crate::config::LedgerConfig;
use crate::merkle::{self, MerklePath};
use crate::signature::{self, SignatureError};
use crate::transaction::{EncodingError, SignedTransaction, NONCE_BITS, TRANSFER_DOMAIN};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VerificationError {
    #[error("{path} path has depth {actual}, expected {expected}")]
    PathDepth {
        path: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("{path} path opens index {actual}, transaction names {expected}")]
    PathIndex {
        path: &'static str,
        expected: u32,
        actual: u32,
    },

    #[error("{path} path does not reach the committed root")]
    RootMismatch { path: &'static str },

    #[error("sender signature: {0}")]
    Signature(#[from] SignatureError),

    #[error("transaction cannot be encoded: {0}")]
    Encoding(#[from] EncodingError),

    #[error("signed nonce {signed} differs from sender nonce {expected}")]
    NonceMismatch { signed: u32, expected: u32 },

    #[error("sender balance {balance} cannot cover {amount}")]
    InsufficientBalance { balance: u32, amount: u32 },

    #[error("receiver balance {balance} cannot accept {amount}")]
    BalanceOverflow { balance: u32, amount: u32 },

    #[error("sender nonce {0} is exhausted")]
    NonceExhausted(u32),

    #[error("self-transfer carries different sender and receiver snapshots")]
    SelfTransferMismatch,

    /// The new root differs from the old one in more than the two leaves.
    #[error("{path} path does not follow from the pre-transfer paths")]
    UnrelatedLeafChanged { path: &'static str },
}

/// Evidence for one applied transfer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionProof {
    pub stx: SignedTransaction,

    #[serde(with = "serde_fr")]
    pub root_before: Fr,

    #[serde(with = "serde_fr")]
    pub root_after: Fr,

    /// Sender before the transfer.
    pub state_from: AccountSnapshot,

    /// Receiver before the transfer. Equal to `state_from` for a
    /// self-transfer.
    pub state_to: AccountSnapshot,

    pub before_from: MerklePath,
    pub before_to: MerklePath,
    pub after_from: MerklePath,
    pub after_to: MerklePath,
}

impl TransactionProof {
    /// Sender and receiver as they must look after the transfer.
    pub fn post_states(&self) -> (AccountSnapshot, AccountSnapshot) {
        let amount = self.stx.tx.amount;
        let mut from = self.state_from;
        from.nonce = from.nonce.wrapping_add(1);
        if self.stx.tx.from == self.stx.tx.to {
            return (from, from);
        }
        from.balance = from.balance.wrapping_sub(amount);
        let mut to = self.state_to;
        to.balance = to.balance.wrapping_add(amount);
        (from, to)
    }

    /// Full replay: signature, nonce, balances and all four paths.
    pub fn verify(&self, depth: usize) -> Result<(), VerificationError> {
        self.verify_with(&LedgerConfig::with_depth(depth))
    }

    /// Replay under `config`, skipping the signature or nonce checks when the
    /// ledger that produced the proof skipped them.
    pub fn verify_with(&self, config: &LedgerConfig) -> Result<(), VerificationError> {
        let tx = &self.stx.tx;
        let self_transfer = tx.from == tx.to;

        for (name, path, index) in [
            ("before_from", &self.before_from, tx.from),
            ("before_to", &self.before_to, tx.to),
            ("after_from", &self.after_from, tx.from),
            ("after_to", &self.after_to, tx.to),
        ] {
            if path.depth() != config.tree_depth {
                return Err(VerificationError::PathDepth {
                    path: name,
                    expected: config.tree_depth,
                    actual: path.depth(),
                });
            }
            if path.index != index {
                return Err(VerificationError::PathIndex {
                    path: name,
                    expected: index,
                    actual: path.index,
                });
            }
        }

        if self_transfer && self.state_from != self.state_to {
            return Err(VerificationError::SelfTransferMismatch);
        }

        let message = tx.message(self.stx.nonce)?;
        if config.verify_signatures {
            signature::try_verify(
                &self.state_from.public_key,
                TRANSFER_DOMAIN,
                &message,
                &self.stx.sig,
            )?;
        }
        if config.enforce_nonce && self.stx.nonce != self.state_from.nonce {
            return Err(VerificationError::NonceMismatch {
                signed: self.stx.nonce,
                expected: self.state_from.nonce,
            });
        }
        if self.state_from.balance < tx.amount {
            return Err(VerificationError::InsufficientBalance {
                balance: self.state_from.balance,
                amount: tx.amount,
            });
        }
        if !self_transfer && self.state_to.balance.checked_add(tx.amount).is_none() {
            return Err(VerificationError::BalanceOverflow {
                balance: self.state_to.balance,
                amount: tx.amount,
            });
        }
        if u64::from(self.state_from.nonce) + 1 >= 1u64 << NONCE_BITS {
            return Err(VerificationError::NonceExhausted(self.state_from.nonce));
        }

        let (post_from, post_to) = self.post_states();
        for (name, path, leaf, root) in [
            ("before_from", &self.before_from, self.state_from.commitment(), self.root_before),
            ("before_to", &self.before_to, self.state_to.commitment(), self.root_before),
            ("after_from", &self.after_from, post_from.commitment(), self.root_after),
            ("after_to", &self.after_to, post_to.commitment(), self.root_after),
        ] {
            if !path.verify(leaf, root) {
                return Err(VerificationError::RootMismatch { path: name });
            }
        }

        let (root_after, after_from, after_to) = merkle::update_pair(
            &self.before_from,
            post_from.commitment(),
            &self.before_to,
            post_to.commitment(),
        );
        if self.after_from != after_from {
            return Err(VerificationError::UnrelatedLeafChanged { path: "after_from" });
        }
        if self.after_to != after_to || self.root_after != root_after {
            return Err(VerificationError::UnrelatedLeafChanged { path: "after_to" });
        }
        Ok(())
    }
}

/// Replay `proof` against a tree of depth `depth` with every check enabled.
pub fn verify_transaction_proof(proof: &TransactionProof, depth: usize) -> Result<(), VerificationError> {
    proof.verify(depth)
}
