//! Sealing a draft into a wire node: address, then optionally sign.

use taskweave_types::{Node, NodeDraft, NodeId};

use crate::address::{address, canonical_body};
use crate::error::CasError;
use crate::signing::Signer;

/// Turn a draft into an addressed node, signed when a signer is given.
///
/// The draft's author key should be the signer's key; a mismatch produces a
/// node that the validator rejects.
pub fn seal(draft: NodeDraft, signer: Option<&dyn Signer>) -> Result<Node, CasError> {
    let mut node = draft.into_node(NodeId::new(""), None);
    let body = canonical_body(&node)?;
    node.id = address(&body);
    node.signature = signer.map(|s| s.sign(&body));
    Ok(node)
}

// ============================================================================
// Tests
// ============================================================================
