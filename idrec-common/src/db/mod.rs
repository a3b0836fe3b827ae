//! Contact Store: durable record of contacts and their link state
//!
//! Pure data access, no business rules. Every read excludes soft-deleted
//! rows. All operations run inside a unit of work obtained from
//! [`ContactStore::begin`]; nothing is visible to other units of work until
//! [`ContactTx::commit`], and dropping an uncommitted unit rolls it back.

pub mod init;
pub mod memory;
pub mod models;
pub mod sqlite;

use async_trait::async_trait;

use crate::Result;
use models::{Contact, ContactUpdate, NewContact};

pub use init::{init_database, init_schema, StoreOptions};
pub use memory::InMemoryContactStore;
pub use sqlite::SqliteContactStore;

/// Handle to a contact store, injected into the engine at construction
#[async_trait]
pub trait ContactStore: Send + Sync {
    /// Open a unit of work that may write
    async fn begin(&self) -> Result<Box<dyn ContactTx>>;

    /// Open a unit of work that only reads
    ///
    /// Stores that distinguish readers from writers may avoid taking a write
    /// lock here.
    async fn begin_read(&self) -> Result<Box<dyn ContactTx>> {
        self.begin().await
    }
}

/// One unit of work against the contact store
///
/// Multi-row results are ordered by `created_at` ascending, then `id`.
#[async_trait]
pub trait ContactTx: Send {
    /// Contacts whose email equals `email` OR whose phone equals
    /// `phone_number`; an absent argument matches nothing
    async fn find_matching(
        &mut self,
        email: Option<&str>,
        phone_number: Option<&str>,
    ) -> Result<Vec<Contact>>;

    /// The contact `primary_id` plus every secondary linked to it
    async fn find_cluster(&mut self, primary_id: i64) -> Result<Vec<Contact>>;

    /// Fails `NotFound` for a missing or deleted contact
    async fn get(&mut self, id: i64) -> Result<Contact>;

    /// Exclusive write lock on each listed primary, taken in ascending id order
    async fn lock_primaries(&mut self, primary_ids: &[i64]) -> Result<()>;

    async fn create(&mut self, contact: NewContact) -> Result<Contact>;

    /// Fails `NotFound` for a missing or deleted contact
    async fn update(&mut self, id: i64, update: ContactUpdate) -> Result<Contact>;

    /// Marks the row deleted and returns it; fails `NotFound` when already
    /// deleted or missing
    async fn soft_delete(&mut self, id: i64) -> Result<Contact>;

    async fn commit(self: Box<Self>) -> Result<()>;
}

/// Lock order for a set of primary ids (ascending, no duplicates)
pub fn lock_order(primary_ids: &[i64]) -> Vec<i64> {
    let mut ids = primary_ids.to_vec();
    ids.sort_unstable();
    ids.dedup();
    ids
}
