//! Repository layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define the persistence contract identity resolution depends on.
//! - Isolate SQLite query details from service/business orchestration.
//!
//! # Invariants
//! - Repository writes enforce model validation before persistence.
//! - Repository APIs return semantic errors (`NotFound`) in addition to DB
//!   transport errors.

pub mod contact_repo;
