//! SNASMA account ledger.
//!
//! A fixed-capacity set of accounts, each committed as a Poseidon leaf of a
//! fixed-depth Merkle tree, mutated only by signed transfers. Applying a
//! transfer yields a [`TransactionProof`] that an outside party can replay
//! against the tree roots before and after the transfer.
//!
//! ```text
//! Ledger::create_account ──► Account ──► Ledger::build_transaction ──► Transaction
//!                                                                          │ sign(nonce, sk)
//!                                                                          ▼
//!            TransactionProof ◄── Ledger::apply_transaction ◄── SignedTransaction
//! ```

pub mod account;
pub mod config;
pub mod error;
pub mod ledger;
pub mod merkle;
pub mod proof;
pub mod shared;
pub mod signature;
pub mod transaction;

pub use account::{account_commitment, Account, AccountSnapshot};
pub use config::LedgerConfig;
pub use error::{AccountRef, LedgerError, Result};
pub use ledger::{Ledger, LedgerSnapshot};
pub use merkle::{MerklePath, MerkleTree, TreeError};
pub use proof::{verify_transaction_proof, TransactionProof, VerificationError};
pub use shared::SharedLedger;
pub use signature::{CurvePoint, Domain, PublicKey, SecretKey, Signature, SignatureError};
pub use transaction::{
    decode_message, encode_message, EncodingError, SignedTransaction, Transaction,
    MESSAGE_ENCODING_VERSION, MESSAGE_LEN, TRANSFER_DOMAIN,
};
