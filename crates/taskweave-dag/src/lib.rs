//! The taskweave replay engine.
//!
//! Everything here is a pure function of its input: validate nodes, order
//! them, fold them into entity state, resolve merges, account for
//! tombstones, pick the current item and rank entities for display. No I/O,
//! no clocks read behind the caller's back, no shared state.
//!
//! # Pipeline
//!
//! ```text
//! nodes ─▶ NodeValidator ─▶ sort (OrderKey) ─▶ admission ─▶ DeletionTracker ─▶ materialize
//!              │                                   │
//!              └──────── ReplayReport ◀────────────┘
//! ```
//!
//! Ranking is called by the consumer on the reconstructed entities, never by
//! replay itself.

pub mod consensus;
pub mod dag;
pub mod deletion;
pub mod merge;
pub mod order;
pub mod rank;
pub mod replay;
pub mod validate;

#[cfg(test)]
mod fixtures;

pub use consensus::{HistoryEntry, current_item, history, open_items};
pub use dag::NodeDag;
pub use deletion::DeletionTracker;
pub use merge::{MergeInput, MergeOutcome, MergeSide, resolve};
pub use order::{next_clock, order_key, sort_nodes, sort_wire_nodes};
pub use rank::{Ranked, complexity_weight, priority_weight, rank, rank_entities, urgency};
pub use replay::{Reconstruction, Reconstructor, Rejection, ReplayReport, Stage, reconstruct};
pub use validate::{
    NodeValidator, Origin, RejectReason, ValidatedNode, ValidationLimits, ValidationOutcome,
};
