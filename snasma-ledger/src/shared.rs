//! Thread-safe handle over a [`Ledger`].

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use halo2curves_axiom::bn256::Fr;
use rand::{CryptoRng, RngCore};
use tracing::warn;

use crate::account::Account;
use crate::error::Result;
use crate::ledger::{Ledger, LedgerSnapshot};
use crate::proof::TransactionProof;
use crate::signature::{PublicKey, SecretKey};
use crate::transaction::SignedTransaction;

/// Cloneable handle sharing one ledger between threads.
///
/// Mutations hold the write lock for their whole check, snapshot, mutate,
/// snapshot sequence, so concurrent transfers are applied one at a time and
/// every proof reflects a single consistent transition. Lookups take the read
/// lock and hand back owned copies.
#[derive(Clone, Debug)]
pub struct SharedLedger {
    inner: Arc<RwLock<Ledger>>,
}

impl SharedLedger {
    pub fn new(ledger: Ledger) -> Self {
        Self {
            inner: Arc::new(RwLock::new(ledger)),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Ledger> {
        if self.inner.is_poisoned() {
            drop(self.write());
        }
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    // A holder that panicked between writing accounts and updating the tree
    // leaves the two out of step, so the tree is rebuilt before the lock is
    // handed out again.
    fn write(&self) -> RwLockWriteGuard<'_, Ledger> {
        match self.inner.write() {
            Ok(guard) => guard,
            Err(poisoned) => {
                let mut guard = poisoned.into_inner();
                match guard.rebuild_tree() {
                    Ok(()) => warn!(accounts = guard.len(), "ledger lock poisoned, tree rebuilt"),
                    Err(err) => warn!(reason = err.kind(), "ledger lock poisoned, tree rebuild failed"),
                }
                self.inner.clear_poison();
                guard
            }
        }
    }

    pub fn create_account(&self, public_key: PublicKey, balance: u32, nonce: u32) -> Result<Account> {
        self.write().create_account(public_key, balance, nonce)
    }

    pub fn new_account<R: RngCore + CryptoRng>(&self, balance: u32, rng: &mut R) -> Result<(SecretKey, Account)> {
        self.write().new_account(balance, rng)
    }

    pub fn apply_transaction(&self, stx: &SignedTransaction) -> Result<TransactionProof> {
        self.write().apply_transaction(stx)
    }

    pub fn by_index(&self, index: u32) -> Result<Account> {
        self.read().by_index(index).cloned()
    }

    pub fn by_key(&self, public_key: &PublicKey) -> Result<Account> {
        self.read().by_key(public_key).cloned()
    }

    pub fn root(&self) -> Fr {
        self.read().root()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    pub fn snapshot(&self) -> LedgerSnapshot {
        self.read().snapshot()
    }

    /// Run `f` against a consistent view of the ledger.
    pub fn with_ledger<T>(&self, f: impl FnOnce(&Ledger) -> T) -> T {
        f(&self.read())
    }
}
