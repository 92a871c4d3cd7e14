//! Ledger configuration.

use std::env;

use serde::{Deserialize, Serialize};

use crate::error::LedgerError;
use crate::transaction::INDEX_BITS;

pub const DEFAULT_TREE_DEPTH: usize = 24;

/// Upper bound on the tree depth: every leaf index must fit the 24-bit index
/// field of the transfer encoding.
pub const MAX_LEDGER_DEPTH: usize = INDEX_BITS as usize;

/// Ledger settings, fixed at construction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Merkle tree depth; the ledger holds at most `2^tree_depth` accounts.
    #[serde(default = "default_tree_depth")]
    pub tree_depth: usize,

    /// Reject transfers whose signature does not verify against the
    /// sender's registered key.
    #[serde(default = "default_true")]
    pub verify_signatures: bool,

    /// Reject transfers signed at a nonce other than the sender's current one.
    #[serde(default = "default_true")]
    pub enforce_nonce: bool,
}

fn default_tree_depth() -> usize {
    DEFAULT_TREE_DEPTH
}

fn default_true() -> bool {
    true
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            tree_depth: default_tree_depth(),
            verify_signatures: true,
            enforce_nonce: true,
        }
    }
}

impl LedgerConfig {
    /// Defaults with a different tree depth. Mostly useful in tests, where
    /// shallow trees keep hashing cheap.
    pub fn with_depth(tree_depth: usize) -> Self {
        Self {
            tree_depth,
            ..Self::default()
        }
    }

    /// Neither signatures nor nonces are checked; any well-formed transfer
    /// between existing accounts with sufficient balance is applied.
    pub fn unchecked(tree_depth: usize) -> Self {
        Self {
            tree_depth,
            verify_signatures: false,
            enforce_nonce: false,
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self, LedgerError> {
        serde_json::from_str(json).map_err(|err| LedgerError::InvalidConfig(err.to_string()))
    }

    /// Apply `SNASMA_TREE_DEPTH`, `SNASMA_VERIFY_SIGNATURES` and
    /// `SNASMA_ENFORCE_NONCE` from the process environment.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|key| env::var(key).ok())
    }

    /// Apply overrides from an arbitrary key lookup. Unparseable values are
    /// ignored.
    pub fn with_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(depth) = lookup("SNASMA_TREE_DEPTH").and_then(|s| s.parse().ok()) {
            self.tree_depth = depth;
        }
        if let Some(flag) = lookup("SNASMA_VERIFY_SIGNATURES") {
            self.verify_signatures = parse_flag(&flag);
        }
        if let Some(flag) = lookup("SNASMA_ENFORCE_NONCE") {
            self.enforce_nonce = parse_flag(&flag);
        }
        self
    }

    pub fn validate(&self) -> Result<(), LedgerError> {
        if self.tree_depth == 0 || self.tree_depth > MAX_LEDGER_DEPTH {
            return Err(LedgerError::InvalidConfig(format!(
                "tree_depth {} is outside 1..={}",
                self.tree_depth, MAX_LEDGER_DEPTH
            )));
        }
        Ok(())
    }

    pub fn capacity(&self) -> u64 {
        1u64 << self.tree_depth
    }
}

fn parse_flag(value: &str) -> bool {
    value.to_lowercase() != "false" && value != "0"
}
