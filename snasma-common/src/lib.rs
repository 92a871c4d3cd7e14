//! Shared primitives for the SNASMA ledger crates.
//!
//! Anything that has to agree bit-for-bit between the ledger, the signature
//! scheme and an external verifier lives here: the Poseidon instance, the
//! byte/field conversions and the serde encoding of field elements.

use anyhow::{anyhow, ensure, Context, Result};
use halo2curves_axiom::{
    bn256::Fr,
    ff::{Field, PrimeField},
};
use once_cell::sync::Lazy;
use poseidon_primitives::poseidon::primitives::{ConstantLength, Hash as PoseidonHash, Spec};

pub const POSEIDON_T: usize = 6;
pub const POSEIDON_RATE: usize = 5;
pub const POSEIDON_FULL_ROUNDS: usize = 8;
pub const POSEIDON_PARTIAL_ROUNDS: usize = 57;

type PoseidonConstants = (
    Vec<[Fr; POSEIDON_T]>,
    [[Fr; POSEIDON_T]; POSEIDON_T],
    [[Fr; POSEIDON_T]; POSEIDON_T],
);

static POSEIDON_CONSTANTS: Lazy<PoseidonConstants> =
    Lazy::new(<GrainSpec as Spec<Fr, POSEIDON_T, POSEIDON_RATE>>::constants);

/// Poseidon over bn256 `Fr`: width 6, rate 5, x^5 S-box, 8 full and 57
/// partial rounds.
///
/// Round constants and MDS matrices are generated from the Grain LFSR once per
/// process and shared by every hash invocation.
#[derive(Debug)]
pub struct LedgerPoseidonSpec;

impl Spec<Fr, POSEIDON_T, POSEIDON_RATE> for LedgerPoseidonSpec {
    fn full_rounds() -> usize {
        POSEIDON_FULL_ROUNDS
    }

    fn partial_rounds() -> usize {
        POSEIDON_PARTIAL_ROUNDS
    }

    fn sbox(val: Fr) -> Fr {
        val.pow_vartime([5])
    }

    fn secure_mds() -> usize {
        0
    }

    fn constants() -> PoseidonConstants {
        POSEIDON_CONSTANTS.clone()
    }
}

/// Same parameters as [`LedgerPoseidonSpec`], regenerating constants per call.
#[derive(Debug)]
struct GrainSpec;

impl Spec<Fr, POSEIDON_T, POSEIDON_RATE> for GrainSpec {
    fn full_rounds() -> usize {
        POSEIDON_FULL_ROUNDS
    }

    fn partial_rounds() -> usize {
        POSEIDON_PARTIAL_ROUNDS
    }

    fn sbox(val: Fr) -> Fr {
        val.pow_vartime([5])
    }

    fn secure_mds() -> usize {
        0
    }
}

/// Fixed-arity Poseidon hash. This is the leaf-commitment and node
/// compression function of the ledger.
pub fn poseidon_hash<const L: usize>(values: &[Fr; L]) -> Fr {
    PoseidonHash::<Fr, LedgerPoseidonSpec, ConstantLength<L>, POSEIDON_T, POSEIDON_RATE>::init()
        .hash(*values)
}

/// Two-to-one compression used for interior Merkle nodes.
pub fn hash_pair(left: &Fr, right: &Fr) -> Fr {
    poseidon_hash(&[*left, *right])
}

pub fn fr_from_bytes(bytes: &[u8; 32]) -> Result<Fr> {
    Option::<Fr>::from(Fr::from_bytes(bytes)).ok_or_else(|| anyhow!("invalid bn256 scalar encoding"))
}

pub fn fr_to_bytes(fr: &Fr) -> [u8; 32] {
    let repr = fr.to_repr();
    let mut bytes = [0u8; 32];
    bytes.copy_from_slice(repr.as_ref());
    bytes
}

pub fn reduce_be_bytes_to_fr(bytes: &[u8; 32]) -> Fr {
    reduce_be_bytes(bytes)
}

/// Interpret `bytes` as a big-endian integer and reduce it into `F`.
///
/// Accepts any length, so wide inputs (e.g. 64 bytes of hash output) reduce
/// with negligible bias.
pub fn reduce_be_bytes<F: PrimeField>(bytes: &[u8]) -> F {
    let base = F::from(256);
    bytes
        .iter()
        .fold(F::ZERO, |acc, byte| acc * base + F::from(*byte as u64))
}

/// Canonical big-endian encoding of a 256-bit prime field element.
pub fn field_to_be_bytes<F: PrimeField>(value: &F) -> [u8; 32] {
    let repr = value.to_repr();
    let mut bytes = [0u8; 32];
    for (dst, src) in bytes.iter_mut().rev().zip(repr.as_ref().iter()) {
        *dst = *src;
    }
    bytes
}

/// Strict inverse of [`field_to_be_bytes`]: values at or above the modulus
/// are rejected instead of reduced.
pub fn field_from_be_bytes<F: PrimeField>(bytes: &[u8; 32]) -> Option<F> {
    let mut repr = F::Repr::default();
    let slot = repr.as_mut();
    if slot.len() != bytes.len() {
        return None;
    }
    for (dst, src) in slot.iter_mut().zip(bytes.iter().rev()) {
        *dst = *src;
    }
    F::from_repr(repr).into()
}

/// `0x`-prefixed hex of the little-endian representation (halo2's `to_repr`).
pub fn fr_to_hex(fr: &Fr) -> String {
    format!("0x{}", hex::encode(fr_to_bytes(fr)))
}

pub fn fr_from_hex(value: &str) -> Result<Fr> {
    let bytes = bytes32_from_hex(value).context("invalid field element hex")?;
    Option::<Fr>::from(Fr::from_repr(bytes)).ok_or_else(|| anyhow!("field element is not canonical"))
}

pub fn bytes32_to_hex(bytes: &[u8; 32]) -> String {
    format!("0x{}", hex::encode(bytes))
}

pub fn bytes32_from_hex(value: &str) -> Result<[u8; 32]> {
    let hex_str = value.strip_prefix("0x").unwrap_or(value);
    ensure!(
        hex_str.len() == 64,
        "expected 64 hex chars, got {}",
        hex_str.len()
    );
    let mut bytes = [0u8; 32];
    hex::decode_to_slice(hex_str, &mut bytes)?;
    Ok(bytes)
}

/// Serde module for `Fr` as 32-byte hex (little-endian, matching `to_repr`).
pub mod serde_fr {
    use halo2curves_axiom::bn256::Fr;
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(fr: &Fr, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&super::fr_to_hex(fr))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Fr, D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded = String::deserialize(deserializer)?;
        super::fr_from_hex(&encoded).map_err(de::Error::custom)
    }
}

/// Serde module for `Vec<Fr>` as a list of hex strings.
pub mod serde_fr_vec {
    use halo2curves_axiom::bn256::Fr;
    use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(values: &[Fr], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let encoded: Vec<String> = values.iter().map(super::fr_to_hex).collect();
        encoded.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<Fr>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded = Vec::<String>::deserialize(deserializer)?;
        encoded
            .iter()
            .map(|value| super::fr_from_hex(value).map_err(de::Error::custom))
            .collect()
    }
}

/// Serde module for raw 32-byte values (curve coordinates, scalars) as hex.
pub mod serde_bytes32 {
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &[u8; 32], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&super::bytes32_to_hex(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<[u8; 32], D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded = String::deserialize(deserializer)?;
        super::bytes32_from_hex(&encoded).map_err(de::Error::custom)
    }
}
