//! Reconciliation Engine
//!
//! Every operation runs as one unit of work against the injected contact
//! store and is bounded by the configured transaction timeout. A unit of work
//! that fails or times out is dropped uncommitted, so a merge is applied
//! entirely or not at all.

use idrec_common::{Contact, ContactStore, ContactUpdate, Error, NewContact, Result};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::loader::load_clusters;
use super::merge::{self, pick_survivor};
use super::view::ConsolidatedContact;

/// One contact observation; empty strings count as absent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observation {
    pub email: Option<String>,
    pub phone_number: Option<String>,
}

impl Observation {
    /// Fails `InvalidInput` unless at least one field is present
    pub fn new(email: Option<&str>, phone_number: Option<&str>) -> Result<Self> {
        let observation = Self {
            email: present(email),
            phone_number: present(phone_number),
        };
        if observation.email.is_none() && observation.phone_number.is_none() {
            return Err(Error::InvalidInput(
                "email or phoneNumber is required".to_string(),
            ));
        }
        Ok(observation)
    }

    pub fn email(&self) -> Option<&str> {
        self.email.as_deref()
    }

    pub fn phone_number(&self) -> Option<&str> {
        self.phone_number.as_deref()
    }

    /// Whether a supplied field is absent from every member of the cluster
    pub fn adds_fact_to(&self, members: &[Contact]) -> bool {
        let new_email = self
            .email()
            .is_some_and(|email| !members.iter().any(|c| c.email.as_deref() == Some(email)));
        let new_phone = self.phone_number().is_some_and(|phone| {
            !members
                .iter()
                .any(|c| c.phone_number.as_deref() == Some(phone))
        });
        new_email || new_phone
    }
}

fn present(value: Option<&str>) -> Option<String> {
    value.filter(|v| !v.is_empty()).map(str::to_string)
}

/// Identity reconciliation over an injected contact store
#[derive(Clone)]
pub struct IdentityEngine {
    store: Arc<dyn ContactStore>,
    transaction_timeout: Duration,
}

impl IdentityEngine {
    pub fn new(store: Arc<dyn ContactStore>, transaction_timeout: Duration) -> Self {
        Self {
            store,
            transaction_timeout,
        }
    }

    /// Resolve an observation to its identity cluster, creating, extending
    /// or merging clusters as needed
    pub async fn reconcile(
        &self,
        email: Option<&str>,
        phone_number: Option<&str>,
    ) -> Result<ConsolidatedContact> {
        let observation = Observation::new(email, phone_number)?;
        self.bounded("reconcile", self.reconcile_observation(&observation))
            .await
    }

    /// Read-only projection of the cluster containing `contact_id`
    pub async fn get_cluster(&self, contact_id: i64) -> Result<ConsolidatedContact> {
        self.bounded("get_cluster", self.cluster_of(contact_id)).await
    }

    /// Direct field correction on one row; no re-reconciliation
    pub async fn patch_fields(
        &self,
        contact_id: i64,
        email: Option<&str>,
        phone_number: Option<&str>,
    ) -> Result<Contact> {
        let observation = Observation::new(email, phone_number)?;
        self.bounded("patch_fields", self.patch_contact(contact_id, &observation))
            .await
    }

    /// Mark a contact deleted, promoting a successor if it was a primary
    pub async fn soft_delete(&self, contact_id: i64) -> Result<Contact> {
        self.bounded("soft_delete", self.delete_contact(contact_id))
            .await
    }

    async fn bounded<T, F>(&self, operation: &'static str, work: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match tokio::time::timeout(self.transaction_timeout, work).await {
            Ok(Err(e)) if e.is_retryable() => {
                warn!(operation, error = %e, "Storage failure");
                Err(e)
            }
            Ok(result) => result,
            Err(_) => {
                warn!(
                    operation,
                    timeout_ms = self.transaction_timeout.as_millis() as u64,
                    "Unit of work timed out"
                );
                Err(Error::Timeout(self.transaction_timeout))
            }
        }
    }

    async fn reconcile_observation(&self, observation: &Observation) -> Result<ConsolidatedContact> {
        let mut tx = self.store.begin().await?;
        let loaded = load_clusters(tx.as_mut(), observation.email(), observation.phone_number())
            .await?;

        if loaded.is_empty() {
            let primary = tx
                .create(NewContact::primary(
                    observation.email.clone(),
                    observation.phone_number.clone(),
                ))
                .await?;
            tx.commit().await?;

            info!(contact_id = primary.id, "Created primary contact for new identity");
            return Ok(ConsolidatedContact::singleton(&primary));
        }

        let merging = loaded.needs_merge();
        let (primary, mut members) = if merging {
            let mut lock_ids: Vec<i64> = loaded.primary_ids.iter().copied().collect();
            lock_ids.extend(loaded.live_primary_ids());
            tx.lock_primaries(&lock_ids).await?;

            let outcome = merge::resolve(tx.as_mut(), &loaded.members).await?;
            // Reload so the demoted primaries' former secondaries are included
            let members = tx.find_cluster(outcome.survivor.id).await?;
            (outcome.survivor, members)
        } else {
            let primary = loaded
                .members
                .iter()
                .find(|c| c.is_primary())
                .cloned()
                .ok_or_else(|| Error::Internal("Loaded cluster has no primary".to_string()))?;
            (primary, loaded.members)
        };

        if observation.adds_fact_to(&members) {
            if !merging {
                tx.lock_primaries(&[primary.id]).await?;
            }
            let secondary = tx
                .create(NewContact::secondary(
                    observation.email.clone(),
                    observation.phone_number.clone(),
                    primary.id,
                ))
                .await?;

            info!(
                contact_id = secondary.id,
                primary_id = primary.id,
                "Linked new secondary contact"
            );
            members.push(secondary);
        } else {
            debug!(primary_id = primary.id, "Observation carries no new fact");
        }

        tx.commit().await?;
        Ok(ConsolidatedContact::project(&primary, &members))
    }

    async fn cluster_of(&self, contact_id: i64) -> Result<ConsolidatedContact> {
        let mut tx = self.store.begin_read().await?;
        let contact = tx.get(contact_id).await?;
        let primary_id = contact.primary_id();
        let members = tx.find_cluster(primary_id).await?;
        tx.commit().await?;

        let primary = match members.iter().find(|c| c.id == primary_id) {
            Some(primary) => primary,
            None => {
                warn!(contact_id, primary_id, "Cluster primary is missing or deleted");
                pick_survivor(&members).unwrap_or(&contact)
            }
        };

        Ok(ConsolidatedContact::project(primary, &members))
    }

    async fn patch_contact(&self, contact_id: i64, observation: &Observation) -> Result<Contact> {
        let mut tx = self.store.begin().await?;
        let updated = tx
            .update(
                contact_id,
                ContactUpdate::fields(observation.email.clone(), observation.phone_number.clone()),
            )
            .await?;
        tx.commit().await?;

        info!(contact_id, "Patched contact fields");
        Ok(updated)
    }

    async fn delete_contact(&self, contact_id: i64) -> Result<Contact> {
        let mut tx = self.store.begin().await?;
        let contact = tx.get(contact_id).await?;
        tx.lock_primaries(&[contact.primary_id()]).await?;

        let deleted = tx.soft_delete(contact_id).await?;

        if deleted.is_primary() {
            let orphans = tx.find_cluster(deleted.id).await?;
            if !orphans.is_empty() {
                let outcome = merge::resolve(tx.as_mut(), &orphans).await?;
                info!(
                    deleted_id = deleted.id,
                    successor_id = outcome.survivor.id,
                    "Promoted successor for deleted primary"
                );
            }
        }

        tx.commit().await?;
        info!(contact_id, "Soft-deleted contact");
        Ok(deleted)
    }
}
