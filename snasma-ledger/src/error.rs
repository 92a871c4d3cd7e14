//! Error types for the account ledger.

use std::fmt;

use thiserror::Error;

use crate::merkle::TreeError;
use crate::signature::PublicKey;
use crate::transaction::EncodingError;

/// How a caller referred to an account that could not be resolved.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AccountRef {
    Index(u32),
    Key(PublicKey),
}

impl fmt::Display for AccountRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccountRef::Index(index) => write!(f, "index {index}"),
            AccountRef::Key(key) => write!(f, "key {key}"),
        }
    }
}

/// Error type for ledger operations.
///
/// Every variant is raised before any account or tree mutation, so a failed
/// call leaves the ledger exactly as it was.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// The public key is already registered.
    #[error("public key {0} is already registered")]
    DuplicateKey(PublicKey),

    /// The public key is not a point on the curve.
    #[error("public key {0} is not a valid curve point")]
    InvalidPublicKey(PublicKey),

    /// No account matches the given index or key.
    #[error("account not found: {0}")]
    NotFound(AccountRef),

    /// Sender cannot cover the transfer amount.
    #[error("account {index} has balance {balance}, cannot transfer {amount}")]
    InsufficientBalance { index: u32, balance: u32, amount: u32 },

    /// Signature does not verify against the sender's registered key.
    #[error("invalid signature for sender {index}")]
    InvalidSignature { index: u32 },

    /// Signed nonce differs from the sender's current nonce.
    #[error("nonce mismatch for sender {index}: signed {signed}, expected {expected}")]
    NonceMismatch { index: u32, signed: u32, expected: u32 },

    /// Receiver balance would exceed the balance width.
    #[error("receiver {index} balance {balance} cannot accept {amount}")]
    BalanceOverflow { index: u32, balance: u32, amount: u32 },

    /// Sender nonce would leave the encodable range.
    #[error("sender {index} nonce {nonce} is exhausted")]
    NonceExhausted { index: u32, nonce: u32 },

    #[error("tree error: {0}")]
    Tree(#[from] TreeError),

    #[error("encoding error: {0}")]
    Encoding(#[from] EncodingError),

    /// Configuration rejected by [`crate::LedgerConfig::validate`].
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    /// A ledger snapshot could not be restored.
    #[error("corrupt snapshot: {0}")]
    CorruptSnapshot(String),
}

impl LedgerError {
    /// Short machine-readable tag, used as a structured log field.
    pub fn kind(&self) -> &'static str {
        match self {
            LedgerError::DuplicateKey(_) => "duplicate_key",
            LedgerError::InvalidPublicKey(_) => "invalid_public_key",
            LedgerError::NotFound(_) => "not_found",
            LedgerError::InsufficientBalance { .. } => "insufficient_balance",
            LedgerError::InvalidSignature { .. } => "invalid_signature",
            LedgerError::NonceMismatch { .. } => "nonce_mismatch",
            LedgerError::BalanceOverflow { .. } => "balance_overflow",
            LedgerError::NonceExhausted { .. } => "nonce_exhausted",
            LedgerError::Tree(_) => "tree",
            LedgerError::Encoding(_) => "encoding",
            LedgerError::InvalidConfig(_) => "invalid_config",
            LedgerError::CorruptSnapshot(_) => "corrupt_snapshot",
        }
    }
}

pub type Result<T> = std::result::Result<T, LedgerError>;
