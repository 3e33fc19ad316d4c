//! Fragment upserter.
//!
//! # Responsibility
//! - Start a new cluster when no identity matched.
//! - Record exactly one new secondary when a submission brings information
//!   the cluster does not hold yet.
//!
//! # Invariants
//! - A submission whose email and phone are both already known anywhere in
//!   the cluster creates nothing.
//! - A new secondary carries only the identifiers that are new.

use super::locator::load_cluster;
use super::request::IdentifyRequest;
use super::IdentifyError;
use crate::model::contact::{ContactId, NewContact};
use crate::repo::contact_repo::ContactRepository;
use log::info;

/// Result of one upsert step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpsertOutcome {
    /// Primary of the cluster the submission belongs to.
    pub primary_id: ContactId,
    /// Contact created by this step, if any.
    pub created: Option<ContactId>,
}

/// Records the submission against `primary_id`, or as a new primary when
/// `primary_id` is `None`.
pub fn upsert<R: ContactRepository>(
    repo: &R,
    primary_id: Option<ContactId>,
    request: &IdentifyRequest,
) -> Result<UpsertOutcome, IdentifyError> {
    let email = request.email().map(str::to_string);
    let phone_number = request.phone_number().map(str::to_string);

    let Some(primary_id) = primary_id else {
        let created = repo.create_contact(&NewContact::primary(email, phone_number))?;
        info!(
            "event=fragment_upsert module=identity status=ok action=create_primary contact_id={}",
            created.id
        );
        return Ok(UpsertOutcome {
            primary_id: created.id,
            created: Some(created.id),
        });
    };

    let (primary, secondaries) = load_cluster(repo, primary_id)?;
    let cluster = || std::iter::once(&primary).chain(secondaries.iter());

    let new_email = email.filter(|value| {
        !cluster().any(|contact| contact.email.as_deref() == Some(value.as_str()))
    });
    let new_phone = phone_number.filter(|value| {
        !cluster().any(|contact| contact.phone_number.as_deref() == Some(value.as_str()))
    });

    if new_email.is_none() && new_phone.is_none() {
        return Ok(UpsertOutcome {
            primary_id,
            created: None,
        });
    }

    let created = repo.create_contact(&NewContact::secondary(primary_id, new_email, new_phone))?;
    info!(
        "event=fragment_upsert module=identity status=ok action=create_secondary primary_id={} contact_id={}",
        primary_id, created.id
    );
    Ok(UpsertOutcome {
        primary_id,
        created: Some(created.id),
    })
}
