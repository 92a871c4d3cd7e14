//! Balance conservation and nonce monotonicity over random transfer
//! sequences.

use proptest::prelude::*;
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use snasma_ledger::{Ledger, LedgerConfig, LedgerError, SecretKey};

const ACCOUNTS: usize = 4;

#[derive(Debug, Clone)]
struct Transfer {
    from: usize,
    to: usize,
    amount: u32,
}

fn arb_transfer() -> impl Strategy<Value = Transfer> {
    (0..ACCOUNTS, 0..ACCOUNTS, 0u32..400).prop_map(|(from, to, amount)| Transfer { from, to, amount })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn transfers_conserve_balance(
        balances in prop::collection::vec(0u32..1_000, ACCOUNTS),
        transfers in prop::collection::vec(arb_transfer(), 1..8),
    ) {
        let mut ledger = Ledger::new(LedgerConfig::with_depth(3)).unwrap();
        let mut rng = ChaCha20Rng::seed_from_u64(7);
        let keys: Vec<SecretKey> = balances
            .iter()
            .map(|balance| ledger.new_account(*balance, &mut rng).unwrap().0)
            .collect();
        let total: u64 = balances.iter().map(|b| u64::from(*b)).sum();

        for transfer in &transfers {
            let from = ledger.by_index(transfer.from as u32).unwrap().clone();
            let to = ledger.by_index(transfer.to as u32).unwrap().clone();
            let root_before = ledger.root();
            let stx = ledger
                .build_transaction(&from, &to, transfer.amount)
                .unwrap()
                .sign(from.nonce, &keys[transfer.from])
                .unwrap();

            match ledger.apply_transaction(&stx) {
                Ok(proof) => {
                    prop_assert!(from.balance >= transfer.amount);
                    prop_assert!(proof.verify(3).is_ok());
                    let sender = ledger.by_index(from.index).unwrap();
                    let receiver = ledger.by_index(to.index).unwrap();
                    prop_assert_eq!(sender.nonce, from.nonce + 1);
                    if from.index == to.index {
                        prop_assert_eq!(sender.balance, from.balance);
                    } else {
                        prop_assert_eq!(sender.balance, from.balance - transfer.amount);
                        prop_assert_eq!(receiver.balance, to.balance + transfer.amount);
                        prop_assert_eq!(receiver.nonce, to.nonce);
                    }
                }
                Err(LedgerError::InsufficientBalance { .. }) => {
                    prop_assert!(from.balance < transfer.amount);
                    prop_assert_eq!(ledger.root(), root_before);
                }
                Err(other) => prop_assert!(false, "unexpected error: {}", other),
            }

            let sum: u64 = ledger.accounts().iter().map(|a| u64::from(a.balance)).sum();
            prop_assert_eq!(sum, total);
        }
    }
}
