//! Consolidated cluster view.

use crate::model::contact::{Contact, ContactId};
use serde::{Deserialize, Serialize};

/// Deduplicated identity of one cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactView {
    pub primary_contact_id: ContactId,
    /// Primary's email first, then secondaries by ascending id.
    pub emails: Vec<String>,
    /// Same ordering rule as `emails`.
    pub phone_numbers: Vec<String>,
    /// Ascending id order; never contains the primary.
    pub secondary_contact_ids: Vec<ContactId>,
}

/// Response envelope returned by identify callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentifyResponse {
    pub contact: ContactView,
}

/// Builds the view for a primary and its secondaries.
///
/// Pure and deterministic: input order of `secondaries` does not matter, and
/// the first occurrence of a duplicate value wins.
pub fn format_view(primary: &Contact, secondaries: &[Contact]) -> ContactView {
    let mut ordered: Vec<&Contact> = secondaries
        .iter()
        .filter(|contact| contact.id != primary.id)
        .collect();
    ordered.sort_by_key(|contact| contact.id);
    ordered.dedup_by_key(|contact| contact.id);

    let mut view = ContactView {
        primary_contact_id: primary.id,
        emails: Vec::new(),
        phone_numbers: Vec::new(),
        secondary_contact_ids: ordered.iter().map(|contact| contact.id).collect(),
    };

    for contact in std::iter::once(primary).chain(ordered) {
        push_unique(&mut view.emails, contact.email.as_deref());
        push_unique(&mut view.phone_numbers, contact.phone_number.as_deref());
    }

    view
}

fn push_unique(values: &mut Vec<String>, candidate: Option<&str>) {
    if let Some(candidate) = candidate {
        if !values.iter().any(|value| value == candidate) {
            values.push(candidate.to_string());
        }
    }
}
