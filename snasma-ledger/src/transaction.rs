//! Transfer transactions and their canonical signing encoding.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::signature::{self, Domain, PublicKey, SecretKey, Signature};

/// Version of the message layout below. Bound into [`TRANSFER_DOMAIN`] so a
/// signature over one layout never verifies under another.
pub const MESSAGE_ENCODING_VERSION: u32 = 1;

pub const INDEX_BITS: u32 = 24;
pub const AMOUNT_BITS: u32 = 32;
pub const NONCE_BITS: u32 = 24;

/// `from || to || amount || nonce`, 104 bits with no padding.
pub const MESSAGE_LEN: usize = ((2 * INDEX_BITS + AMOUNT_BITS + NONCE_BITS) / 8) as usize;

pub const TRANSFER_DOMAIN: Domain = Domain(MESSAGE_ENCODING_VERSION as u64);

const INDEX_BYTES: usize = (INDEX_BITS / 8) as usize;
const AMOUNT_BYTES: usize = (AMOUNT_BITS / 8) as usize;
const NONCE_BYTES: usize = (NONCE_BITS / 8) as usize;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EncodingError {
    #[error("{field} index {value} does not fit in 24 bits")]
    IndexOutOfRange { field: &'static str, value: u32 },

    #[error("nonce {0} does not fit in 24 bits")]
    NonceOutOfRange(u32),
}

/// Unsigned transfer between two existing accounts.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Transaction {
    pub from: u32,
    pub to: u32,
    pub amount: u32,
}

impl fmt::Display for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.from, self.to, self.amount)
    }
}

impl Transaction {
    pub fn new(from: u32, to: u32, amount: u32) -> Self {
        Self { from, to, amount }
    }

    /// Canonical message for this transfer at sender nonce `nonce`.
    pub fn message(&self, nonce: u32) -> Result<[u8; MESSAGE_LEN], EncodingError> {
        encode_message(self, nonce)
    }

    pub fn sign(&self, nonce: u32, secret_key: &SecretKey) -> Result<SignedTransaction, EncodingError> {
        let message = self.message(nonce)?;
        Ok(SignedTransaction {
            tx: *self,
            nonce,
            sig: secret_key.sign(TRANSFER_DOMAIN, &message),
        })
    }
}

/// A transfer together with the sender nonce it was signed at.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedTransaction {
    pub tx: Transaction,
    pub nonce: u32,
    pub sig: Signature,
}

impl SignedTransaction {
    /// Re-derive the canonical message and check the signature against
    /// `public_key`. Unencodable transactions never verify.
    pub fn verify(&self, public_key: &PublicKey) -> bool {
        match self.tx.message(self.nonce) {
            Ok(message) => signature::verify(public_key, TRANSFER_DOMAIN, &message, &self.sig),
            Err(_) => false,
        }
    }
}

/// Pack a transfer into its version-1 message.
///
/// Each field is written little-endian, least significant bit first, in the
/// order from, to, amount, nonce. Since every width is a whole number of
/// bytes this is the low bytes of each value's little-endian form.
pub fn encode_message(tx: &Transaction, nonce: u32) -> Result<[u8; MESSAGE_LEN], EncodingError> {
    check_index("from", tx.from)?;
    check_index("to", tx.to)?;
    if nonce >> NONCE_BITS != 0 {
        return Err(EncodingError::NonceOutOfRange(nonce));
    }

    let mut out = [0u8; MESSAGE_LEN];
    let mut offset = 0;
    for (value, width) in [
        (tx.from, INDEX_BYTES),
        (tx.to, INDEX_BYTES),
        (tx.amount, AMOUNT_BYTES),
        (nonce, NONCE_BYTES),
    ] {
        out[offset..offset + width].copy_from_slice(&value.to_le_bytes()[..width]);
        offset += width;
    }
    Ok(out)
}

/// Inverse of [`encode_message`]. Every 13-byte string decodes.
pub fn decode_message(message: &[u8; MESSAGE_LEN]) -> (Transaction, u32) {
    let mut fields = [0u32; 4];
    let mut offset = 0;
    for (slot, width) in fields
        .iter_mut()
        .zip([INDEX_BYTES, INDEX_BYTES, AMOUNT_BYTES, NONCE_BYTES])
    {
        let mut le = [0u8; 4];
        le[..width].copy_from_slice(&message[offset..offset + width]);
        *slot = u32::from_le_bytes(le);
        offset += width;
    }
    let [from, to, amount, nonce] = fields;
    (Transaction { from, to, amount }, nonce)
}

fn check_index(field: &'static str, value: u32) -> Result<(), EncodingError> {
    if value >> INDEX_BITS != 0 {
        return Err(EncodingError::IndexOutOfRange { field, value });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    #[test]
    fn layout_is_little_endian_per_field() {
        let tx = Transaction::new(0x010203, 0x040506, 0x0708090a);
        let message = encode_message(&tx, 0x0b0c0d).unwrap();
        assert_eq!(MESSAGE_LEN, 13);
        assert_eq!(
            message,
            [0x03, 0x02, 0x01, 0x06, 0x05, 0x04, 0x0a, 0x09, 0x08, 0x07, 0x0d, 0x0c, 0x0b]
        );
        assert_eq!(decode_message(&message), (tx, 0x0b0c0d));
    }

    #[test]
    fn out_of_range_fields_are_rejected() {
        let too_big = 1 << INDEX_BITS;
        assert_eq!(
            encode_message(&Transaction::new(too_big, 0, 1), 0),
            Err(EncodingError::IndexOutOfRange {
                field: "from",
                value: too_big
            })
        );
        assert_eq!(
            encode_message(&Transaction::new(0, too_big, 1), 0),
            Err(EncodingError::IndexOutOfRange {
                field: "to",
                value: too_big
            })
        );
        assert_eq!(
            encode_message(&Transaction::new(0, 1, u32::MAX), 1 << NONCE_BITS),
            Err(EncodingError::NonceOutOfRange(1 << NONCE_BITS))
        );
        assert!(encode_message(&Transaction::new(too_big - 1, 0, u32::MAX), (1 << NONCE_BITS) - 1).is_ok());
    }

    #[test]
    fn signed_transaction_binds_every_field() {
        let sk = SecretKey::random(&mut ChaCha20Rng::seed_from_u64(11));
        let pk = sk.public_key();
        let stx = Transaction::new(3, 4, 200).sign(5, &sk).unwrap();
        assert!(stx.verify(&pk));

        let mut tampered = stx;
        tampered.tx.amount ^= 1;
        assert!(!tampered.verify(&pk));

        let mut tampered = stx;
        tampered.tx.to ^= 1;
        assert!(!tampered.verify(&pk));

        let mut tampered = stx;
        tampered.nonce ^= 1;
        assert!(!tampered.verify(&pk));

        let mut tampered = stx;
        tampered.nonce = 1 << NONCE_BITS;
        assert!(!tampered.verify(&pk));
    }

    #[test]
    fn display_is_from_to_amount() {
        assert_eq!(Transaction::new(1, 2, 30).to_string(), "1 2 30");
    }
}
