//! Schnorr signatures over secp256k1 with a Poseidon challenge.
//!
//! - Nonce: `r = blake3_xof(domain || sk || msg) mod n`, deterministic per
//!   key and message.
//! - Challenge: `e = Poseidon(domain, R.x, R.y, A.x, A.y, M)` over bn256 `Fr`,
//!   reinterpreted as a secp256k1 scalar. `M` folds the message bytes into a
//!   single field element.
//! - Response: `s = r + e * sk`. Verification checks `s*G == R + e*A`.
//!
//! Public keys and nonce points travel as big-endian affine coordinates, so
//! they can be checked against any other secp256k1 implementation.

use std::fmt;

use ff::Field;
use group::{prime::PrimeCurveAffine, Curve, Group};
use halo2curves_axiom::{
    bn256::Fr,
    secp256k1::{Fp, Fq, Secp256k1, Secp256k1Affine},
    CurveAffine, CurveAffineExt,
};
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use snasma_common::{
    bytes32_to_hex, field_from_be_bytes, field_to_be_bytes, poseidon_hash, reduce_be_bytes,
    reduce_be_bytes_to_fr, serde_bytes32,
};
use thiserror::Error;

/// blake3 key-derivation context for deterministic signing nonces.
const NONCE_CONTEXT: &str = "snasma-ledger 2024 schnorr-secp256k1 signing nonce";

/// Message bytes absorbed per Poseidon step; 31 bytes always fit below the
/// bn256 scalar modulus.
const MESSAGE_CHUNK: usize = 31;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SignatureError {
    /// The public key is not a point on secp256k1, or is the identity.
    #[error("public key is not a valid secp256k1 point")]
    InvalidPublicKey,

    /// The signature nonce point is not a valid secp256k1 point.
    #[error("signature point is not a valid secp256k1 point")]
    InvalidPoint,

    /// A scalar is zero or not below the group order.
    #[error("scalar is not a canonical non-zero secp256k1 scalar")]
    InvalidScalar,

    /// All inputs are well formed but the verification equation fails.
    #[error("signature does not verify")]
    Rejected,
}

/// Domain separation tag bound into every signature challenge.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Domain(pub u64);

impl Domain {
    /// Arbitrary byte strings with no ledger meaning.
    pub const RAW: Domain = Domain(0);
}

/// Affine secp256k1 point as big-endian coordinates.
///
/// The all-zero encoding stands for the identity and never parses back into a
/// usable key.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CurvePoint {
    #[serde(with = "serde_bytes32")]
    pub x: [u8; 32],
    #[serde(with = "serde_bytes32")]
    pub y: [u8; 32],
}

/// An account's public key. Unique across the ledger.
pub type PublicKey = CurvePoint;

impl CurvePoint {
    pub fn from_point(point: &Secp256k1Affine) -> Self {
        // The identity is stored as (0, 0).
        let (x, y) = point.into_coordinates();
        Self {
            x: field_to_be_bytes(&x),
            y: field_to_be_bytes(&y),
        }
    }

    /// Parse into a curve point, rejecting non-canonical coordinates,
    /// off-curve points and the identity.
    pub fn to_point(&self) -> Result<Secp256k1Affine, SignatureError> {
        let x = field_from_be_bytes::<Fp>(&self.x).ok_or(SignatureError::InvalidPoint)?;
        let y = field_from_be_bytes::<Fp>(&self.y).ok_or(SignatureError::InvalidPoint)?;
        let point: Secp256k1Affine =
            Option::<Secp256k1Affine>::from(Secp256k1Affine::from_xy(x, y)).ok_or(SignatureError::InvalidPoint)?;
        if bool::from(point.is_identity()) {
            return Err(SignatureError::InvalidPoint);
        }
        Ok(point)
    }

    /// Coordinates reduced into bn256 `Fr`, as absorbed by Poseidon.
    pub fn field_elements(&self) -> [Fr; 2] {
        [reduce_be_bytes_to_fr(&self.x), reduce_be_bytes_to_fr(&self.y)]
    }
}

impl fmt::Debug for CurvePoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CurvePoint")
            .field("x", &bytes32_to_hex(&self.x))
            .field("y", &bytes32_to_hex(&self.y))
            .finish()
    }
}

impl fmt::Display for CurvePoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // x alone identifies the key up to sign; enough for logs and errors.
        write!(f, "{}", bytes32_to_hex(&self.x))
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    /// Nonce point `R`.
    pub r: CurvePoint,
    /// Response scalar `s`, big-endian.
    #[serde(with = "serde_bytes32")]
    pub s: [u8; 32],
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signature")
            .field("r", &self.r)
            .field("s", &bytes32_to_hex(&self.s))
            .finish()
    }
}

/// A secp256k1 signing key.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretKey(Fq);

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretKey(..)")
    }
}

impl SecretKey {
    pub fn random<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        loop {
            let scalar = Fq::random(&mut *rng);
            if !bool::from(scalar.is_zero()) {
                return Self(scalar);
            }
        }
    }

    pub fn from_be_bytes(bytes: &[u8; 32]) -> Result<Self, SignatureError> {
        let scalar = field_from_be_bytes::<Fq>(bytes).ok_or(SignatureError::InvalidScalar)?;
        if bool::from(scalar.is_zero()) {
            return Err(SignatureError::InvalidScalar);
        }
        Ok(Self(scalar))
    }

    pub fn to_be_bytes(&self) -> [u8; 32] {
        field_to_be_bytes(&self.0)
    }

    pub fn public_key(&self) -> PublicKey {
        CurvePoint::from_point(&(Secp256k1::generator() * self.0).to_affine())
    }

    /// Deterministically sign `message` under `domain`.
    pub fn sign(&self, domain: Domain, message: &[u8]) -> Signature {
        let public_key = self.public_key();
        let nonce = self.derive_nonce(domain, message);
        let nonce_point = CurvePoint::from_point(&(Secp256k1::generator() * nonce).to_affine());
        let e = challenge(domain, &nonce_point, &public_key, message);
        let s = nonce + e * self.0;
        Signature {
            r: nonce_point,
            s: field_to_be_bytes(&s),
        }
    }

    fn derive_nonce(&self, domain: Domain, message: &[u8]) -> Fq {
        let mut hasher = blake3::Hasher::new_derive_key(NONCE_CONTEXT);
        hasher.update(&domain.0.to_le_bytes());
        hasher.update(&self.to_be_bytes());
        hasher.update(message);
        let mut wide = [0u8; 64];
        hasher.finalize_xof().fill(&mut wide);
        reduce_be_bytes::<Fq>(&wide)
    }
}

/// Fold arbitrary bytes into one `Fr`, length-prefixed so that trailing zero
/// bytes change the result.
pub fn message_to_fr(message: &[u8]) -> Fr {
    message
        .chunks(MESSAGE_CHUNK)
        .fold(Fr::from(message.len() as u64), |acc, chunk| {
            poseidon_hash(&[acc, reduce_be_bytes::<Fr>(chunk)])
        })
}

fn challenge(domain: Domain, nonce_point: &CurvePoint, public_key: &PublicKey, message: &[u8]) -> Fq {
    let [rx, ry] = nonce_point.field_elements();
    let [ax, ay] = public_key.field_elements();
    let e = poseidon_hash(&[Fr::from(domain.0), rx, ry, ax, ay, message_to_fr(message)]);
    reduce_be_bytes::<Fq>(&field_to_be_bytes(&e))
}

/// Check `signature` on `message`, reporting which input was malformed.
pub fn try_verify(
    public_key: &PublicKey,
    domain: Domain,
    message: &[u8],
    signature: &Signature,
) -> Result<(), SignatureError> {
    let a = public_key
        .to_point()
        .map_err(|_| SignatureError::InvalidPublicKey)?;
    let r = signature.r.to_point()?;
    let s = field_from_be_bytes::<Fq>(&signature.s).ok_or(SignatureError::InvalidScalar)?;
    let e = challenge(domain, &signature.r, public_key, message);

    let lhs = Secp256k1::generator() * s;
    let rhs = r.to_curve() + a * e;
    if lhs.to_affine() == rhs.to_affine() {
        Ok(())
    } else {
        Err(SignatureError::Rejected)
    }
}

pub fn verify(public_key: &PublicKey, domain: Domain, message: &[u8], signature: &Signature) -> bool {
    try_verify(public_key, domain, message, signature).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    fn key(seed: u64) -> SecretKey {
        SecretKey::random(&mut ChaCha20Rng::seed_from_u64(seed))
    }

    #[test]
    fn sign_and_verify() {
        let sk = key(1);
        let pk = sk.public_key();
        let sig = sk.sign(Domain::RAW, b"abc");
        assert!(verify(&pk, Domain::RAW, b"abc", &sig));
    }

    #[test]
    fn signing_is_deterministic() {
        let sk = key(2);
        assert_eq!(sk.sign(Domain::RAW, b"abc"), sk.sign(Domain::RAW, b"abc"));
        assert_ne!(
            sk.sign(Domain::RAW, b"abc").r,
            sk.sign(Domain::RAW, b"abd").r
        );
    }

    #[test]
    fn rejects_other_message_domain_or_key() {
        let sk = key(3);
        let pk = sk.public_key();
        let sig = sk.sign(Domain(7), b"transfer");

        assert_eq!(
            try_verify(&pk, Domain(7), b"transfeR", &sig),
            Err(SignatureError::Rejected)
        );
        assert_eq!(
            try_verify(&pk, Domain(8), b"transfer", &sig),
            Err(SignatureError::Rejected)
        );
        let other = key(4).public_key();
        assert_eq!(
            try_verify(&other, Domain(7), b"transfer", &sig),
            Err(SignatureError::Rejected)
        );
    }

    #[test]
    fn rejects_tampered_scalar() {
        let sk = key(5);
        let pk = sk.public_key();
        let mut sig = sk.sign(Domain::RAW, b"abc");
        sig.s[31] ^= 1;
        assert!(!verify(&pk, Domain::RAW, b"abc", &sig));
    }

    #[test]
    fn rejects_malformed_points() {
        let sk = key(6);
        let pk = sk.public_key();
        let sig = sk.sign(Domain::RAW, b"abc");

        let mut off_curve = pk;
        off_curve.y[31] ^= 1;
        assert_eq!(
            try_verify(&off_curve, Domain::RAW, b"abc", &sig),
            Err(SignatureError::InvalidPublicKey)
        );

        let identity = CurvePoint {
            x: [0u8; 32],
            y: [0u8; 32],
        };
        assert_eq!(
            try_verify(&identity, Domain::RAW, b"abc", &sig),
            Err(SignatureError::InvalidPublicKey)
        );

        let mut bad_r = sig;
        bad_r.r = identity;
        assert_eq!(
            try_verify(&pk, Domain::RAW, b"abc", &bad_r),
            Err(SignatureError::InvalidPoint)
        );
    }

    #[test]
    fn secret_key_bytes_round_trip() {
        let sk = key(7);
        let restored = SecretKey::from_be_bytes(&sk.to_be_bytes()).unwrap();
        assert_eq!(restored.public_key(), sk.public_key());
        assert_eq!(
            SecretKey::from_be_bytes(&[0u8; 32]),
            Err(SignatureError::InvalidScalar)
        );
        assert_eq!(
            SecretKey::from_be_bytes(&[0xff; 32]),
            Err(SignatureError::InvalidScalar)
        );
    }

    #[test]
    fn message_fold_is_length_sensitive() {
        assert_ne!(message_to_fr(b""), message_to_fr(&[0u8]));
        assert_ne!(message_to_fr(&[0u8; 31]), message_to_fr(&[0u8; 32]));
    }

    #[test]
    fn public_key_serde_uses_hex() {
        let pk = key(8).public_key();
        let json = serde_json::to_string(&pk).unwrap();
        assert!(json.contains("\"x\":\"0x"));
        let restored: PublicKey = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, pk);
    }
}
