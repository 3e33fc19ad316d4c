//! In-memory cluster graph built once per identify pass.
//!
//! Flat contact rows are grouped by the primary they hang off, so election
//! can reason about whole clusters without further queries.

use crate::model::contact::{Contact, ContactId};
use std::collections::{BTreeMap, BTreeSet};

/// One cluster: its root id, the primary row when present, and its
/// secondaries in ascending id order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterNode {
    pub root: ContactId,
    pub primary: Option<Contact>,
    pub secondaries: Vec<Contact>,
}

impl ClusterNode {
    fn new(root: ContactId) -> Self {
        Self {
            root,
            primary: None,
            secondaries: Vec::new(),
        }
    }

    pub fn members(&self) -> impl Iterator<Item = &Contact> {
        self.primary.iter().chain(self.secondaries.iter())
    }
}

/// Contacts grouped into clusters keyed by root id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClusterGraph {
    clusters: BTreeMap<ContactId, ClusterNode>,
}

impl ClusterGraph {
    /// Groups contacts by cluster root. Duplicate ids are kept once.
    pub fn from_contacts<'a>(contacts: impl IntoIterator<Item = &'a Contact>) -> Self {
        let mut clusters: BTreeMap<ContactId, ClusterNode> = BTreeMap::new();
        let mut seen = BTreeSet::new();

        for contact in contacts {
            if !seen.insert(contact.id) {
                continue;
            }
            let root = contact.cluster_root();
            let node = clusters
                .entry(root)
                .or_insert_with(|| ClusterNode::new(root));
            if contact.is_primary() {
                node.primary = Some(contact.clone());
            } else {
                node.secondaries.push(contact.clone());
            }
        }

        for node in clusters.values_mut() {
            node.secondaries.sort_by_key(|contact| contact.id);
        }

        Self { clusters }
    }

    pub fn is_empty(&self) -> bool {
        self.clusters.is_empty()
    }

    pub fn cluster_count(&self) -> usize {
        self.clusters.len()
    }

    pub fn clusters(&self) -> impl Iterator<Item = &ClusterNode> {
        self.clusters.values()
    }

    pub fn contacts(&self) -> impl Iterator<Item = &Contact> {
        self.clusters.values().flat_map(|node| node.members())
    }

    pub fn len(&self) -> usize {
        self.contacts().count()
    }

    /// The primary of the only cluster, when the graph is one complete
    /// cluster whose primary row is present.
    pub fn sole_primary(&self) -> Option<&Contact> {
        if self.clusters.len() != 1 {
            return None;
        }
        self.clusters.values().next()?.primary.as_ref()
    }

    /// Oldest contact across every cluster (`created_at`, then lowest id).
    pub fn oldest(&self) -> Option<&Contact> {
        self.contacts().min_by_key(|contact| contact.age_key())
    }
}
