//! Identity clustering and consolidation.
//!
//! # Responsibility
//! - Locate every contact transitively connected to a submitted identifier.
//! - Elect one primary per cluster and flatten merged clusters onto it.
//! - Record new identity fragments and render the consolidated view.
//!
//! # Invariants
//! - Exactly one primary per cluster, and it is the oldest member.
//! - Secondaries always point straight at the primary (no chains).
//! - A fully redundant submission never creates a contact.

use crate::model::contact::ContactId;
use crate::repo::contact_repo::RepoError;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod elector;
pub mod graph;
pub mod locator;
pub mod request;
pub mod upserter;
pub mod view;

/// Failure of one identify pass.
#[derive(Debug)]
pub enum IdentifyError {
    /// Neither email nor phone number was supplied.
    InvalidInput,
    /// A contact that must exist could not be re-fetched.
    NotFound(ContactId),
    /// A demotion/relink did not apply to its target contact.
    MergeFailure { contact_id: ContactId },
    /// The contact store failed.
    StoreUnavailable(RepoError),
}

impl IdentifyError {
    /// Whether the caller can fix the request and retry.
    pub fn is_user_correctable(&self) -> bool {
        matches!(self, Self::InvalidInput)
    }

    /// Stable code used in log events.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidInput => "invalid_input",
            Self::NotFound(_) => "contact_not_found",
            Self::MergeFailure { .. } => "merge_failed",
            Self::StoreUnavailable(_) => "store_unavailable",
        }
    }
}

impl Display for IdentifyError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidInput => {
                write!(f, "at least one of email or phone number must be provided")
            }
            Self::NotFound(id) => write!(f, "contact disappeared during identify: {id}"),
            Self::MergeFailure { contact_id } => {
                write!(f, "failed to relink contact {contact_id} during merge")
            }
            Self::StoreUnavailable(err) => write!(f, "contact store unavailable: {err}"),
        }
    }
}

impl Error for IdentifyError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::StoreUnavailable(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for IdentifyError {
    fn from(value: RepoError) -> Self {
        Self::StoreUnavailable(value)
    }
}

impl From<rusqlite::Error> for IdentifyError {
    fn from(value: rusqlite::Error) -> Self {
        Self::StoreUnavailable(value.into())
    }
}
