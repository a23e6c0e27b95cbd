//! Ed25519 signing and verification over canonical node bodies.
//!
//! | Primitive | Algorithm      | Wire form        |
//! |-----------|----------------|------------------|
//! | Key       | Ed25519 (32 B) | 64 lowercase hex |
//! | Signature | Ed25519 (64 B) | 128 lowercase hex|
//!
//! The engine only consumes [`SignatureVerifier::verify`] and the [`Signer`]
//! capability. Key lifecycle, storage and rotation belong to the caller.

use ed25519_dalek::{Signer as _, SigningKey, VerifyingKey};
use taskweave_types::{PublicKey, Signature};

use crate::error::CasError;

/// Something that can sign canonical node bodies.
pub trait Signer: Send + Sync {
    /// The key that verifies this signer's output.
    fn public_key(&self) -> PublicKey;

    /// Sign the canonical body bytes.
    fn sign(&self, body: &[u8]) -> Signature;
}

/// In-process Ed25519 signer.
pub struct Ed25519Signer {
    key: SigningKey,
}

impl Ed25519Signer {
    /// Build from 32 secret-key bytes.
    pub fn from_secret_bytes(secret: &[u8; 32]) -> Self {
        Self {
            key: SigningKey::from_bytes(secret),
        }
    }

    /// Build from 64 lowercase hex characters.
    pub fn from_secret_hex(secret: &str) -> Result<Self, CasError> {
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(secret.trim(), &mut bytes)
            .map_err(|e| CasError::InvalidSecretKey(e.to_string()))?;
        Ok(Self::from_secret_bytes(&bytes))
    }

    /// Fresh key from the OS CSPRNG.
    pub fn generate() -> Self {
        use rand::RngCore;
        let mut secret = [0u8; 32];
        rand::rngs::OsRng.fill_bytes(&mut secret);
        Self::from_secret_bytes(&secret)
    }

    /// Secret key as hex, for handing to the caller's key store.
    pub fn secret_hex(&self) -> String {
        hex::encode(self.key.to_bytes())
    }
}

impl Signer for Ed25519Signer {
    fn public_key(&self) -> PublicKey {
        PublicKey::from_bytes(self.key.verifying_key().as_bytes())
    }

    fn sign(&self, body: &[u8]) -> Signature {
        Signature::from_bytes(&self.key.sign(body).to_bytes())
    }
}

impl std::fmt::Debug for Ed25519Signer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Ed25519Signer({})", self.public_key().short())
    }
}

/// Pure, side-effect-free signature check.
pub struct SignatureVerifier;

impl SignatureVerifier {
    /// `true` only for a well-formed key and signature that verify strictly
    /// over `body`. Every malformed input is simply `false`.
    pub fn verify(body: &[u8], signature: &Signature, public_key: &PublicKey) -> bool {
        let Some(key_bytes) = public_key.to_bytes() else {
            return false;
        };
        let Some(sig_bytes) = signature.to_bytes() else {
            return false;
        };
        let Ok(key) = VerifyingKey::from_bytes(&key_bytes) else {
            return false;
        };
        let sig = ed25519_dalek::Signature::from_bytes(&sig_bytes);
        key.verify_strict(body, &sig).is_ok()
    }
}

// ============================================================================
// Tests
// ============================================================================
