//! Cluster Loader
//!
//! Expands a raw match set to complete clusters so that merge detection
//! always reasons over whole clusters, never partial match sets. Because
//! secondaries point directly at their primary, one hop through
//! `find_cluster` per implicated primary reaches every member.

use idrec_common::{Contact, ContactTx, Result};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Union of the clusters touched by one observation
#[derive(Debug, Clone, Default)]
pub struct LoadedClusters {
    /// Distinct members, oldest first
    pub members: Vec<Contact>,
    /// Primary ids implicated by the raw matches
    pub primary_ids: BTreeSet<i64>,
}

impl LoadedClusters {
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Ids of loaded members that are themselves primary
    pub fn live_primary_ids(&self) -> BTreeSet<i64> {
        self.members
            .iter()
            .filter(|c| c.is_primary())
            .map(|c| c.id)
            .collect()
    }

    /// True unless the set is exactly one primary and its own secondaries
    ///
    /// Several primaries need merging; a secondary whose primary is not a
    /// live member (soft-deleted or dangling) needs relinking.
    pub fn needs_merge(&self) -> bool {
        let primaries = self.live_primary_ids();
        if primaries.len() != 1 {
            return !self.is_empty();
        }
        self.members
            .iter()
            .filter(|c| !c.is_primary())
            .any(|c| !c.linked_id.is_some_and(|id| primaries.contains(&id)))
    }
}

/// Load every cluster touched by `email` or `phone_number`
pub async fn load_clusters(
    tx: &mut dyn ContactTx,
    email: Option<&str>,
    phone_number: Option<&str>,
) -> Result<LoadedClusters> {
    let matches = tx.find_matching(email, phone_number).await?;
    let primary_ids: BTreeSet<i64> = matches.iter().map(Contact::primary_id).collect();

    // Matches stay in the set even if their primary is gone
    let mut members: BTreeMap<i64, Contact> = matches.into_iter().map(|c| (c.id, c)).collect();
    for primary_id in &primary_ids {
        for contact in tx.find_cluster(*primary_id).await? {
            members.insert(contact.id, contact);
        }
    }

    let mut members: Vec<Contact> = members.into_values().collect();
    members.sort_by_key(Contact::age_key);

    debug!(
        members = members.len(),
        primaries = primary_ids.len(),
        "Loaded clusters for observation"
    );

    Ok(LoadedClusters {
        members,
        primary_ids,
    })
}
