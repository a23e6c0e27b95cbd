//! Canonical encoding, content addressing and signatures for taskweave nodes.
//!
//! Every node id is `blake3:<hex>` of the node's canonical body (the node
//! with `id` and `signature` removed). The same canonical bytes are what an
//! Ed25519 signature covers, so re-addressing a node and verifying its
//! signature both start from [`canonical_body`].
//!
//! ```text
//! NodeDraft ──seal──▶ canonical_body ──blake3──▶ NodeId
//!                           └────────Signer──────▶ Signature
//! ```

mod address;
mod canonical;
mod error;
mod seal;
mod signing;

pub use address::{address, address_node, canonical_body, verify_address};
pub use canonical::{canonical_string, canonicalize};
pub use error::CasError;
pub use seal::seal;
pub use signing::{Ed25519Signer, SignatureVerifier, Signer};

/// Result type for CAS operations.
pub type Result<T> = std::result::Result<T, CasError>;
