//! Account records and their leaf commitments.

use halo2curves_axiom::bn256::Fr;
use serde::{Deserialize, Serialize};
use snasma_common::poseidon_hash;

use crate::signature::PublicKey;

/// A registered account.
///
/// Only the ledger constructs accounts, and only after the leaf has been
/// appended, so `index` is always the account's tree position.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub public_key: PublicKey,
    pub balance: u32,
    /// Count of transfers sent from this account.
    pub nonce: u32,
    pub index: u32,
}

impl Account {
    pub fn snapshot(&self) -> AccountSnapshot {
        AccountSnapshot {
            public_key: self.public_key,
            balance: self.balance,
            nonce: self.nonce,
        }
    }

    /// Leaf value stored at `index`.
    pub fn commitment(&self) -> Fr {
        account_commitment(&self.public_key, self.balance, self.nonce)
    }
}

/// The committed part of an account at one point in time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountSnapshot {
    pub public_key: PublicKey,
    pub balance: u32,
    pub nonce: u32,
}

impl AccountSnapshot {
    pub fn commitment(&self) -> Fr {
        account_commitment(&self.public_key, self.balance, self.nonce)
    }
}

/// `Poseidon(pk.x, pk.y, balance, nonce)`, coordinates reduced into `Fr`.
pub fn account_commitment(public_key: &PublicKey, balance: u32, nonce: u32) -> Fr {
    let [x, y] = public_key.field_elements();
    poseidon_hash(&[x, y, Fr::from(u64::from(balance)), Fr::from(u64::from(nonce))])
}
