//! Typed identifiers for nodes, tasks, identities, and key material.
//!
//! All wire identifiers are strings. The newtypes deserialize leniently
//! (`#[serde(transparent)]`) so that a malformed value still decodes into a
//! [`Node`](crate::Node) and can be rejected by the validator with a typed
//! reason instead of failing at the JSON layer. The `is_well_formed()` checks
//! are the single source of truth for the encoding rules.
//!
//! | Type          | Wire form                                  |
//! |---------------|--------------------------------------------|
//! | [`NodeId`]    | `blake3:` + 64 lowercase hex               |
//! | [`TaskId`]    | 1..=128 of `[A-Za-z0-9._:-]`               |
//! | [`PublicKey`] | 64 lowercase hex (Ed25519, 32 bytes)       |
//! | [`IdentityId`]| first 16 hex chars of the public key       |
//! | [`Signature`] | 128 lowercase hex (Ed25519, 64 bytes)      |
//! | [`DeviceId`]  | 1..=64 printable ASCII                     |

use std::fmt;

use serde::{Deserialize, Serialize};

/// Digest scheme tag carried by every node id.
pub const DIGEST_SCHEME: &str = "blake3";

/// Hex characters in a digest (32-byte BLAKE3 output).
pub const DIGEST_HEX_LEN: usize = 64;

/// Hex characters in a public key (32-byte Ed25519 key).
pub const PUBLIC_KEY_HEX_LEN: usize = 64;

/// Hex characters in a signature (64-byte Ed25519 signature).
pub const SIGNATURE_HEX_LEN: usize = 128;

/// Length of the identity prefix taken from the public key.
pub const IDENTITY_ID_LEN: usize = 16;

/// Maximum length of a task id.
pub const MAX_TASK_ID_LEN: usize = 128;

/// Maximum length of a device id.
pub const MAX_DEVICE_ID_LEN: usize = 64;

/// True when every byte is `[0-9a-f]`. Uppercase is an encoding violation.
pub fn is_lower_hex(s: &str) -> bool {
    s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

// ── Shared behavior ─────────────────────────────────────────────────────────

macro_rules! impl_string_id {
    ($T:ident, $name:literal) => {
        impl $T {
            /// Wrap a raw string without checking it.
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn into_string(self) -> String {
                self.0
            }
        }

        impl From<&str> for $T {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl From<String> for $T {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl fmt::Display for $T {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl fmt::Debug for $T {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", $name, self.short())
            }
        }
    };
}

/// Content address of a node: `blake3:<64 lowercase hex>`.
#[derive(Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

/// Stable identifier of the entity a node mutates.
#[derive(Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

/// Hex-encoded Ed25519 public key.
#[derive(Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PublicKey(String);

/// Deterministic prefix of a [`PublicKey`]; not an independent identifier.
#[derive(Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdentityId(String);

/// Hex-encoded Ed25519 signature over the canonical node body.
#[derive(Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Signature(String);

/// Device that authored a node.
#[derive(Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(String);

impl_string_id!(NodeId, "NodeId");
impl_string_id!(TaskId, "TaskId");
impl_string_id!(PublicKey, "PublicKey");
impl_string_id!(IdentityId, "IdentityId");
impl_string_id!(Signature, "Signature");
impl_string_id!(DeviceId, "DeviceId");

// ── NodeId ──────────────────────────────────────────────────────────────────

impl NodeId {
    /// Build an id from raw digest bytes.
    pub fn from_digest(digest: &[u8; 32]) -> Self {
        Self(format!("{DIGEST_SCHEME}:{}", hex::encode(digest)))
    }

    /// The hex portion after the scheme tag, if the tag is present.
    pub fn digest_hex(&self) -> Option<&str> {
        self.0
            .strip_prefix(DIGEST_SCHEME)
            .and_then(|rest| rest.strip_prefix(':'))
    }

    pub fn is_well_formed(&self) -> bool {
        match self.digest_hex() {
            Some(hex) => hex.len() == DIGEST_HEX_LEN && is_lower_hex(hex),
            None => false,
        }
    }

    /// First 8 digest characters, for logs.
    pub fn short(&self) -> &str {
        let hex = self.digest_hex().unwrap_or(&self.0);
        hex.get(..8).unwrap_or(hex)
    }
}

// ── TaskId ──────────────────────────────────────────────────────────────────

impl TaskId {
    pub fn is_well_formed(&self) -> bool {
        !self.0.is_empty()
            && self.0.len() <= MAX_TASK_ID_LEN
            && self
                .0
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'.' | b'_' | b':' | b'-'))
    }

    pub fn short(&self) -> &str {
        self.0.get(..12).unwrap_or(&self.0)
    }
}

// ── Keys and signatures ─────────────────────────────────────────────────────

impl PublicKey {
    /// Hex-encode 32 raw key bytes.
    pub fn from_bytes(bytes: &[u8; 32]) -> Self {
        Self(hex::encode(bytes))
    }

    pub fn is_well_formed(&self) -> bool {
        self.0.len() == PUBLIC_KEY_HEX_LEN && is_lower_hex(&self.0)
    }

    /// Decode to raw bytes. `None` for anything not well-formed.
    pub fn to_bytes(&self) -> Option<[u8; 32]> {
        if !self.is_well_formed() {
            return None;
        }
        let mut out = [0u8; 32];
        hex::decode_to_slice(&self.0, &mut out).ok()?;
        Some(out)
    }

    /// The identity this key binds to.
    pub fn identity(&self) -> IdentityId {
        IdentityId(self.0.get(..IDENTITY_ID_LEN).unwrap_or(&self.0).to_string())
    }

    pub fn short(&self) -> &str {
        self.0.get(..8).unwrap_or(&self.0)
    }
}

impl IdentityId {
    pub fn is_well_formed(&self) -> bool {
        self.0.len() == IDENTITY_ID_LEN && is_lower_hex(&self.0)
    }

    pub fn short(&self) -> &str {
        self.0.get(..8).unwrap_or(&self.0)
    }
}

impl Signature {
    pub fn from_bytes(bytes: &[u8; 64]) -> Self {
        Self(hex::encode(bytes))
    }

    pub fn is_well_formed(&self) -> bool {
        self.0.len() == SIGNATURE_HEX_LEN && is_lower_hex(&self.0)
    }

    pub fn to_bytes(&self) -> Option<[u8; 64]> {
        if !self.is_well_formed() {
            return None;
        }
        let mut out = [0u8; 64];
        hex::decode_to_slice(&self.0, &mut out).ok()?;
        Some(out)
    }

    pub fn short(&self) -> &str {
        self.0.get(..8).unwrap_or(&self.0)
    }
}

impl DeviceId {
    pub fn is_well_formed(&self) -> bool {
        !self.0.is_empty()
            && self.0.len() <= MAX_DEVICE_ID_LEN
            && self.0.bytes().all(|b| b.is_ascii_graphic())
    }

    pub fn short(&self) -> &str {
        self.0.get(..12).unwrap_or(&self.0)
    }
}

// ============================================================================
// Tests
// ============================================================================
