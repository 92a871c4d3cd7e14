//! The account ledger: registration, lookup and transfer application.

use std::collections::HashMap;

use halo2curves_axiom::bn256::Fr;
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::account::{account_commitment, Account};
use crate::config::LedgerConfig;
use crate::error::{AccountRef, LedgerError, Result};
use crate::merkle::{MerkleTree, TreeError};
use crate::proof::TransactionProof;
use crate::signature::{PublicKey, SecretKey};
use crate::transaction::{EncodingError, SignedTransaction, Transaction, NONCE_BITS};

/// Accounts committed into a fixed-depth Merkle tree.
///
/// The tree leaf at position `i` is always the commitment of `accounts[i]`.
#[derive(Clone, Debug)]
pub struct Ledger {
    config: LedgerConfig,
    accounts: Vec<Account>,
    by_key: HashMap<PublicKey, u32>,
    tree: MerkleTree,
}

/// Serializable ledger contents. The tree is rebuilt on restore.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    pub config: LedgerConfig,
    pub accounts: Vec<Account>,
}

impl Ledger {
    pub fn new(config: LedgerConfig) -> Result<Self> {
        config.validate()?;
        let tree = MerkleTree::new(config.tree_depth)?;
        Ok(Self {
            config,
            accounts: Vec::new(),
            by_key: HashMap::new(),
            tree,
        })
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub fn root(&self) -> Fr {
        self.tree.root()
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    pub fn accounts(&self) -> &[Account] {
        &self.accounts
    }

    pub fn tree(&self) -> &MerkleTree {
        &self.tree
    }

    /// Register `public_key` with an initial balance and nonce.
    ///
    /// The key must be a point on the curve and the nonce must fit the
    /// message encoding.
    pub fn create_account(&mut self, public_key: PublicKey, balance: u32, nonce: u32) -> Result<Account> {
        if public_key.to_point().is_err() {
            return Err(LedgerError::InvalidPublicKey(public_key));
        }
        if nonce >> NONCE_BITS != 0 {
            return Err(EncodingError::NonceOutOfRange(nonce).into());
        }
        if self.by_key.contains_key(&public_key) {
            return Err(LedgerError::DuplicateKey(public_key));
        }
        let leaf = account_commitment(&public_key, balance, nonce);
        let index = self.tree.append(leaf)?;
        let account = Account {
            public_key,
            balance,
            nonce,
            index,
        };
        self.by_key.insert(public_key, index);
        self.accounts.push(account.clone());
        debug!(index, balance, nonce, "account created");
        Ok(account)
    }

    /// Generate a fresh key pair and register it with nonce 0.
    pub fn new_account<R: RngCore + CryptoRng>(
        &mut self,
        balance: u32,
        rng: &mut R,
    ) -> Result<(SecretKey, Account)> {
        let secret_key = SecretKey::random(rng);
        let account = self.create_account(secret_key.public_key(), balance, 0)?;
        Ok((secret_key, account))
    }

    pub fn by_index(&self, index: u32) -> Result<&Account> {
        self.accounts
            .get(index as usize)
            .ok_or(LedgerError::NotFound(AccountRef::Index(index)))
    }

    pub fn by_key(&self, public_key: &PublicKey) -> Result<&Account> {
        let index = self
            .by_key
            .get(public_key)
            .copied()
            .ok_or(LedgerError::NotFound(AccountRef::Key(*public_key)))?;
        self.by_index(index)
    }

    /// Current state of `account`, which may be a stale copy.
    pub fn identity(&self, account: &Account) -> Result<&Account> {
        self.by_index(account.index)
    }

    /// Transfer between two registered accounts. Balance is not checked here.
    pub fn build_transaction(&self, from: &Account, to: &Account, amount: u32) -> Result<Transaction> {
        let from = self.identity(from)?;
        let to = self.identity(to)?;
        Ok(Transaction::new(from.index, to.index, amount))
    }

    /// Validate and apply a signed transfer.
    ///
    /// All checks run before the first mutation, so an error leaves every
    /// account and the tree untouched. On success the returned proof opens
    /// both parties against the roots before and after the transfer.
    pub fn apply_transaction(&mut self, stx: &SignedTransaction) -> Result<TransactionProof> {
        match self.check_transaction(stx) {
            Ok(()) => {}
            Err(err) => {
                warn!(
                    from = stx.tx.from,
                    to = stx.tx.to,
                    amount = stx.tx.amount,
                    nonce = stx.nonce,
                    reason = err.kind(),
                    "transaction rejected"
                );
                return Err(err);
            }
        }

        let tx = stx.tx;
        let from = tx.from as usize;
        let to = tx.to as usize;

        let root_before = self.tree.root();
        let state_from = self.accounts[from].snapshot();
        let state_to = self.accounts[to].snapshot();
        let before_from = self.tree.proof(tx.from)?;
        let before_to = self.tree.proof(tx.to)?;

        self.accounts[from].nonce += 1;
        if from != to {
            self.accounts[from].balance -= tx.amount;
            self.accounts[to].balance += tx.amount;
        }

        self.tree.update(tx.from, self.accounts[from].commitment())?;
        self.tree.update(tx.to, self.accounts[to].commitment())?;

        let proof = TransactionProof {
            stx: *stx,
            root_before,
            root_after: self.tree.root(),
            state_from,
            state_to,
            before_from,
            before_to,
            after_from: self.tree.proof(tx.from)?,
            after_to: self.tree.proof(tx.to)?,
        };
        info!(
            from = tx.from,
            to = tx.to,
            amount = tx.amount,
            nonce = stx.nonce,
            "transaction applied"
        );
        Ok(proof)
    }

    fn check_transaction(&self, stx: &SignedTransaction) -> Result<()> {
        let tx = &stx.tx;
        let sender = self.by_index(tx.from)?;
        let receiver = self.by_index(tx.to)?;

        // Surface encoding problems as such rather than as a bad signature.
        tx.message(stx.nonce)?;
        if self.config.verify_signatures && !stx.verify(&sender.public_key) {
            return Err(LedgerError::InvalidSignature { index: sender.index });
        }
        if self.config.enforce_nonce && stx.nonce != sender.nonce {
            return Err(LedgerError::NonceMismatch {
                index: sender.index,
                signed: stx.nonce,
                expected: sender.nonce,
            });
        }
        if sender.balance < tx.amount {
            return Err(LedgerError::InsufficientBalance {
                index: sender.index,
                balance: sender.balance,
                amount: tx.amount,
            });
        }
        if tx.from != tx.to && receiver.balance.checked_add(tx.amount).is_none() {
            return Err(LedgerError::BalanceOverflow {
                index: receiver.index,
                balance: receiver.balance,
                amount: tx.amount,
            });
        }
        if u64::from(sender.nonce) + 1 >= 1u64 << NONCE_BITS {
            return Err(LedgerError::NonceExhausted {
                index: sender.index,
                nonce: sender.nonce,
            });
        }
        Ok(())
    }

    /// Re-derive every leaf from the account list, replacing the tree.
    pub(crate) fn rebuild_tree(&mut self) -> Result<()> {
        let mut tree = MerkleTree::new(self.config.tree_depth)?;
        for account in &self.accounts {
            tree.append(account.commitment())?;
        }
        self.tree = tree;
        Ok(())
    }

    pub fn snapshot(&self) -> LedgerSnapshot {
        LedgerSnapshot {
            config: self.config.clone(),
            accounts: self.accounts.clone(),
        }
    }

    /// Rebuild a ledger, re-deriving every leaf and the key index.
    pub fn restore(snapshot: LedgerSnapshot) -> Result<Self> {
        let mut ledger = Self::new(snapshot.config)?;
        for (position, account) in snapshot.accounts.into_iter().enumerate() {
            if account.index as usize != position {
                return Err(LedgerError::CorruptSnapshot(format!(
                    "account at position {position} claims index {}",
                    account.index
                )));
            }
            ledger
                .create_account(account.public_key, account.balance, account.nonce)
                .map_err(|err| match err {
                    LedgerError::Tree(TreeError::Full { .. })
                    | LedgerError::DuplicateKey(_)
                    | LedgerError::InvalidPublicKey(_)
                    | LedgerError::Encoding(_) => LedgerError::CorruptSnapshot(err.to_string()),
                    other => other,
                })?;
        }
        Ok(ledger)
    }
}
