//! Primary election and cluster merge.
//!
//! # Responsibility
//! - Decide which contact is the sole primary for a located contact set.
//! - Produce and apply the demotions/relinks that flatten merged clusters.
//!
//! # Invariants
//! - The elected primary is the oldest contact (`created_at`, then lowest id).
//! - After applying a plan no secondary points at another secondary.
//! - A single complete cluster is returned unchanged, with no writes.

use super::graph::ClusterGraph;
use super::IdentifyError;
use crate::model::contact::{Contact, ContactId, LinkUpdate};
use crate::repo::contact_repo::{ContactRepository, RepoError};
use log::{debug, info, warn};

/// One planned precedence/link change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkChange {
    /// A secondary becomes the cluster primary.
    Promote,
    /// A former primary becomes a secondary of the elected primary.
    Demote,
    /// A secondary is repointed at the elected primary.
    Relink { from: Option<ContactId> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlannedChange {
    pub contact_id: ContactId,
    pub change: LinkChange,
}

impl PlannedChange {
    fn update(&self, primary_id: ContactId) -> LinkUpdate {
        match self.change {
            LinkChange::Promote => LinkUpdate::promote(),
            LinkChange::Demote | LinkChange::Relink { .. } => LinkUpdate::link_to(primary_id),
        }
    }
}

/// Election outcome: the primary id and the writes needed to get there.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElectionPlan {
    pub primary_id: ContactId,
    pub changes: Vec<PlannedChange>,
}

impl ElectionPlan {
    pub fn is_noop(&self) -> bool {
        self.changes.is_empty()
    }

    fn count(&self, predicate: impl Fn(&LinkChange) -> bool) -> usize {
        self.changes
            .iter()
            .filter(|planned| predicate(&planned.change))
            .count()
    }
}

/// Plans primary election for a cluster graph. Pure; touches no storage.
///
/// Returns `None` for an empty graph.
pub fn plan_election(graph: &ClusterGraph) -> Option<ElectionPlan> {
    if let Some(primary) = graph.sole_primary() {
        return Some(ElectionPlan {
            primary_id: primary.id,
            changes: Vec::new(),
        });
    }

    let elected = graph.oldest()?;
    let mut changes = Vec::new();
    if !elected.is_primary() {
        changes.push(PlannedChange {
            contact_id: elected.id,
            change: LinkChange::Promote,
        });
    }

    let mut others: Vec<&Contact> = graph
        .contacts()
        .filter(|contact| contact.id != elected.id)
        .collect();
    others.sort_by_key(|contact| contact.id);

    for contact in others {
        let change = if contact.is_primary() {
            LinkChange::Demote
        } else if contact.linked_id != Some(elected.id) {
            LinkChange::Relink {
                from: contact.linked_id,
            }
        } else {
            continue;
        };
        changes.push(PlannedChange {
            contact_id: contact.id,
            change,
        });
    }

    Some(ElectionPlan {
        primary_id: elected.id,
        changes,
    })
}

/// Elects the primary for located contacts and writes the needed changes.
///
/// Returns `Ok(None)` when `contacts` is empty (no existing identity).
///
/// # Errors
/// - `MergeFailure` when a planned change matched no active contact.
/// - `StoreUnavailable` for any other repository failure.
///
/// Changes already written are not compensated here; callers wrap the pass
/// in a transaction.
pub fn elect<R: ContactRepository>(
    repo: &R,
    contacts: &[Contact],
) -> Result<Option<ContactId>, IdentifyError> {
    let graph = ClusterGraph::from_contacts(contacts);
    let Some(plan) = plan_election(&graph) else {
        return Ok(None);
    };
    if plan.is_noop() {
        return Ok(Some(plan.primary_id));
    }

    for planned in &plan.changes {
        let update = planned.update(plan.primary_id);
        repo.update_link(planned.contact_id, &update)
            .map_err(|err| match err {
                RepoError::NotFound(contact_id) => {
                    warn!(
                        "event=primary_elect module=identity status=error error_code=merge_failed primary_id={} contact_id={}",
                        plan.primary_id, contact_id
                    );
                    IdentifyError::MergeFailure { contact_id }
                }
                other => IdentifyError::StoreUnavailable(other),
            })?;
        if let LinkChange::Relink { from } = planned.change {
            debug!(
                "event=contact_relink module=identity contact_id={} from={} to={}",
                planned.contact_id,
                from.map_or_else(|| "none".to_string(), |id| id.to_string()),
                plan.primary_id
            );
        }
    }

    info!(
        "event=primary_elect module=identity status=ok primary_id={} clusters={} promoted={} demoted={} relinked={}",
        plan.primary_id,
        graph.cluster_count(),
        plan.count(|change| matches!(change, LinkChange::Promote)),
        plan.count(|change| matches!(change, LinkChange::Demote)),
        plan.count(|change| matches!(change, LinkChange::Relink { .. })),
    );

    Ok(Some(plan.primary_id))
}
