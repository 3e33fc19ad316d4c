//! Core identity reconciliation for contactlink.
//! This crate is the single source of truth for cluster invariants.

pub mod db;
pub mod identity;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use identity::elector::{plan_election, ElectionPlan, LinkChange, PlannedChange};
pub use identity::graph::{ClusterGraph, ClusterNode};
pub use identity::request::IdentifyRequest;
pub use identity::view::{format_view, ContactView, IdentifyResponse};
pub use identity::IdentifyError;
pub use logging::{default_log_level, init_logging, logging_status};
pub use model::contact::{
    Contact, ContactId, ContactValidationError, LinkPrecedence, LinkUpdate, NewContact,
};
pub use repo::contact_repo::{
    ContactFilter, ContactRepository, RepoError, RepoResult, SqliteContactRepository,
};
pub use service::identity_service::{identify_contact, IdentityService};

/// Minimal health-check API for linkage smoke checks.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
