//! In-memory contact store
//!
//! Same contract as the SQLite store, for engine tests and local runs. A
//! unit of work holds the table lock for its whole lifetime and edits a
//! private copy that replaces the table on commit.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::models::{Contact, ContactUpdate, NewContact};
use super::{ContactStore, ContactTx};
use crate::time::{monotonic_after, now};
use crate::{Error, Result};

#[derive(Debug, Clone, Default)]
struct MemoryTable {
    rows: BTreeMap<i64, Contact>,
    next_id: i64,
    last_created: Option<DateTime<Utc>>,
    writes: u64,
}

impl MemoryTable {
    fn live(&self) -> impl Iterator<Item = &Contact> {
        self.rows.values().filter(|c| !c.is_deleted())
    }

    fn sorted(mut contacts: Vec<Contact>) -> Vec<Contact> {
        contacts.sort_by_key(Contact::age_key);
        contacts
    }

    fn live_mut(&mut self, id: i64) -> Result<&mut Contact> {
        match self.rows.get_mut(&id) {
            Some(contact) if !contact.is_deleted() => Ok(contact),
            _ => Err(Error::NotFound(id)),
        }
    }
}

/// Contact store kept entirely in process memory
#[derive(Clone, Default)]
pub struct InMemoryContactStore {
    table: Arc<Mutex<MemoryTable>>,
}

impl InMemoryContactStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-populated with fixture rows (ids and timestamps kept as given)
    pub fn with_contacts(contacts: Vec<Contact>) -> Self {
        let mut table = MemoryTable::default();
        for contact in contacts {
            table.next_id = table.next_id.max(contact.id);
            table.last_created = table.last_created.max(Some(contact.created_at));
            table.rows.insert(contact.id, contact);
        }
        Self {
            table: Arc::new(Mutex::new(table)),
        }
    }

    /// Every row, deleted ones included, ordered by id
    pub async fn snapshot(&self) -> Vec<Contact> {
        self.table.lock().await.rows.values().cloned().collect()
    }

    /// Number of committed row writes (creates, updates, deletes)
    pub async fn write_count(&self) -> u64 {
        self.table.lock().await.writes
    }
}

#[async_trait]
impl ContactStore for InMemoryContactStore {
    async fn begin(&self) -> Result<Box<dyn ContactTx>> {
        let guard = self.table.clone().lock_owned().await;
        let work = guard.clone();
        Ok(Box::new(InMemoryContactTx { guard, work }))
    }
}

struct InMemoryContactTx {
    guard: OwnedMutexGuard<MemoryTable>,
    work: MemoryTable,
}

#[async_trait]
impl ContactTx for InMemoryContactTx {
    async fn find_matching(
        &mut self,
        email: Option<&str>,
        phone_number: Option<&str>,
    ) -> Result<Vec<Contact>> {
        let matches = self
            .work
            .live()
            .filter(|c| {
                let email_hit = email.is_some() && c.email.as_deref() == email;
                let phone_hit = phone_number.is_some() && c.phone_number.as_deref() == phone_number;
                email_hit || phone_hit
            })
            .cloned()
            .collect();
        Ok(MemoryTable::sorted(matches))
    }

    async fn find_cluster(&mut self, primary_id: i64) -> Result<Vec<Contact>> {
        let members = self
            .work
            .live()
            .filter(|c| c.id == primary_id || c.linked_id == Some(primary_id))
            .cloned()
            .collect();
        Ok(MemoryTable::sorted(members))
    }

    async fn get(&mut self, id: i64) -> Result<Contact> {
        self.work.live_mut(id).map(|c| c.clone())
    }

    async fn lock_primaries(&mut self, _primary_ids: &[i64]) -> Result<()> {
        // The whole table is already held exclusively by this unit of work
        Ok(())
    }

    async fn create(&mut self, contact: NewContact) -> Result<Contact> {
        let created_at = monotonic_after(self.work.last_created);
        self.work.next_id += 1;
        self.work.last_created = Some(created_at);
        self.work.writes += 1;

        let row = Contact {
            id: self.work.next_id,
            email: contact.email,
            phone_number: contact.phone_number,
            linked_id: contact.link.linked_id(),
            link_precedence: contact.link.precedence(),
            created_at,
            updated_at: created_at,
            deleted_at: None,
        };
        self.work.rows.insert(row.id, row.clone());
        Ok(row)
    }

    async fn update(&mut self, id: i64, update: ContactUpdate) -> Result<Contact> {
        let contact = self.work.live_mut(id)?;
        update.apply(contact, now());
        let updated = contact.clone();
        self.work.writes += 1;
        Ok(updated)
    }

    async fn soft_delete(&mut self, id: i64) -> Result<Contact> {
        let contact = self.work.live_mut(id)?;
        let deleted_at = now();
        contact.deleted_at = Some(deleted_at);
        contact.updated_at = deleted_at;
        let deleted = contact.clone();
        self.work.writes += 1;
        Ok(deleted)
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let InMemoryContactTx { mut guard, work } = *self;
        *guard = work;
        Ok(())
    }
}
