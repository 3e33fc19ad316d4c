//! Cluster locator.
//!
//! # Responsibility
//! - Find every active contact connected to a submitted email or phone.
//! - Re-fetch one cluster (primary plus secondaries) by primary id.
//!
//! # Invariants
//! - `locate` returns closed clusters: when any member is present, all of
//!   its cluster-mates are present too.
//! - Results are de-duplicated and ordered by `created_at ASC, id ASC`.

use super::request::IdentifyRequest;
use super::IdentifyError;
use crate::model::contact::{Contact, ContactId, LinkPrecedence};
use crate::repo::contact_repo::{ContactFilter, ContactRepository, RepoResult};
use log::debug;
use std::collections::{BTreeMap, BTreeSet};

/// Returns every contact transitively connected to the request identifiers.
///
/// An empty result means no existing identity matches.
pub fn locate<R: ContactRepository>(
    repo: &R,
    request: &IdentifyRequest,
) -> RepoResult<Vec<Contact>> {
    let seed = repo.find_contacts(&ContactFilter::Identifiers {
        email: request.email().map(str::to_string),
        phone_number: request.phone_number().map(str::to_string),
    })?;
    if seed.is_empty() {
        return Ok(seed);
    }

    let linked_ids: BTreeSet<ContactId> = seed
        .iter()
        .filter_map(|contact| contact.linked_id)
        .collect();
    let upward = repo.find_contacts(&ContactFilter::IdIn {
        ids: linked_ids.iter().copied().collect(),
        precedence: Some(LinkPrecedence::Primary),
    })?;

    // Linked ids stay in the downward set even when their primary is gone,
    // so siblings of an orphaned secondary are still reached.
    let known_ids: BTreeSet<ContactId> = seed
        .iter()
        .chain(upward.iter())
        .map(|contact| contact.id)
        .chain(linked_ids)
        .collect();
    let downward = repo.find_contacts(&ContactFilter::LinkedIdIn {
        ids: known_ids.into_iter().collect(),
        precedence: Some(LinkPrecedence::Secondary),
    })?;

    debug!(
        "event=cluster_locate module=identity seed={} upward={} downward={}",
        seed.len(),
        upward.len(),
        downward.len()
    );

    let mut by_id: BTreeMap<ContactId, Contact> = BTreeMap::new();
    for contact in seed.into_iter().chain(upward).chain(downward) {
        by_id.entry(contact.id).or_insert(contact);
    }
    let mut contacts: Vec<Contact> = by_id.into_values().collect();
    contacts.sort_by_key(Contact::age_key);
    Ok(contacts)
}

/// Loads the primary and its secondaries (ascending id).
///
/// # Errors
/// - `NotFound` when `primary_id` is missing, deleted, or not a primary.
pub fn load_cluster<R: ContactRepository>(
    repo: &R,
    primary_id: ContactId,
) -> Result<(Contact, Vec<Contact>), IdentifyError> {
    let primary = repo
        .get_contact(primary_id)?
        .filter(Contact::is_primary)
        .ok_or(IdentifyError::NotFound(primary_id))?;

    let mut secondaries = repo.find_contacts(&ContactFilter::LinkedIdIn {
        ids: vec![primary_id],
        precedence: Some(LinkPrecedence::Secondary),
    })?;
    secondaries.sort_by_key(|contact| contact.id);

    Ok((primary, secondaries))
}
