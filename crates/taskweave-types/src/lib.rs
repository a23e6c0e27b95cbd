//! Shared wire and snapshot types for taskweave.
//!
//! This is the leaf crate: typed ids, the wire [`Node`], per-action payload
//! records, and the reconstructed [`Entity`] snapshot. It has **no internal
//! taskweave dependencies** and performs no hashing, signing or validation;
//! those live in `taskweave-cas` and `taskweave-dag`.
//!
//! # Relationships
//!
//! ```text
//! Entity (TaskId)            ← derived by replay, never stored
//!     └── genesis Node (CREATE, no parents)
//!     └── Nodes (parents → DAG, content-addressed by NodeId)
//!           └── authored by Author (PublicKey → IdentityId prefix)
//!           └── payload: one record per Action
//!     └── Items (ItemId = id of the producing node)
//! ```

pub mod clock;
pub mod entity;
pub mod ids;
pub mod node;
pub mod payload;

pub use clock::{MILLIS_PER_DAY, WallClock};
pub use entity::{Entity, EntityStatus, FieldValue, Item, Metadata};
pub use ids::{DeviceId, IdentityId, NodeId, PublicKey, Signature, TaskId};
pub use node::{Action, Author, Node, NodeDraft, OrderKey, PROTOCOL_VERSION, ParentArity, Timestamp};
pub use payload::{
    CompleteItemPayload, CreateItemPayload, CreatePayload, DeletePayload, EXTENSION_FIELD,
    MarkerPayload, MergeField, MergePayload, MergeStrategy, NodePayload, RESERVED_FIELDS,
    SnoozePayload, UpdatePayload, WALL_CLOCK_FIELDS, reserved_field_in,
};
