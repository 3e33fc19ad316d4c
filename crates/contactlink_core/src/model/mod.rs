//! Domain model for contact fragments and identity clusters.
//!
//! # Responsibility
//! - Define the canonical contact record used by core business logic.
//!
//! # Invariants
//! - Every contact is identified by a stable store-assigned `ContactId`.
//! - Deletion is represented by soft-delete tombstones, not hard delete.

pub mod contact;
