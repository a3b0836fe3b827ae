//! Merge Resolver
//!
//! Collapses every primary in a loaded set into one cluster. The oldest
//! primary by `(created_at, id)` survives; every other primary is demoted
//! under it and every secondary is pointed straight at it, so no
//! secondary-to-secondary chain is ever left behind.
//!
//! All writes go through the caller's unit of work: the merge commits or
//! rolls back as a whole with the rest of the request.

use idrec_common::{Contact, ContactTx, ContactUpdate, Error, Result};
use tracing::{info, warn};

/// What a merge changed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeOutcome {
    /// The surviving primary, as stored after the merge
    pub survivor: Contact,
    /// Former primaries now linked under the survivor
    pub demoted: Vec<i64>,
    /// Secondaries whose `linked_id` was rewritten to the survivor
    pub relinked: Vec<i64>,
}

/// The contact that must remain (or become) primary for `members`
///
/// Oldest primary wins. When no member is primary (its primary was
/// deleted), the oldest member is chosen instead.
pub fn pick_survivor(members: &[Contact]) -> Option<&Contact> {
    members
        .iter()
        .filter(|c| c.is_primary())
        .min_by_key(|c| c.age_key())
        .or_else(|| members.iter().min_by_key(|c| c.age_key()))
}

/// Rewrite link state so that `members` form one cluster
pub async fn resolve(tx: &mut dyn ContactTx, members: &[Contact]) -> Result<MergeOutcome> {
    let survivor = pick_survivor(members)
        .cloned()
        .ok_or_else(|| Error::Internal("Merge requested over an empty contact set".to_string()))?;

    let survivor = if survivor.is_primary() {
        survivor
    } else {
        warn!(
            contact_id = survivor.id,
            former_primary = ?survivor.linked_id,
            "Cluster has no live primary; promoting oldest member"
        );
        tx.update(survivor.id, ContactUpdate::promote()).await?
    };

    let mut demoted = Vec::new();
    let mut relinked = Vec::new();

    for contact in members.iter().filter(|c| c.id != survivor.id) {
        if contact.is_primary() {
            tx.update(contact.id, ContactUpdate::link_to(survivor.id))
                .await?;
            demoted.push(contact.id);
        } else if contact.linked_id != Some(survivor.id) {
            tx.update(contact.id, ContactUpdate::link_to(survivor.id))
                .await?;
            relinked.push(contact.id);
        }
    }

    info!(
        survivor = survivor.id,
        demoted = ?demoted,
        relinked = ?relinked,
        "Merged identity clusters"
    );

    Ok(MergeOutcome {
        survivor,
        demoted,
        relinked,
    })
}
