//! SQLite-backed contact store

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqlitePoolOptions, SqliteRow};
use sqlx::{Row, Sqlite, SqlitePool, Transaction};
use std::path::Path;

use super::init::{init_database, init_schema, StoreOptions};
use super::models::{Contact, ContactUpdate, LinkPrecedence, NewContact};
use super::{lock_order, ContactStore, ContactTx};
use crate::time::{monotonic_after, now, to_storage};
use crate::{Error, Result};

const CONTACT_COLUMNS: &str = "id, email, phone_number, linked_id, link_precedence, \
                               created_at, updated_at, deleted_at";

/// Contact store over a SQLite connection pool
#[derive(Clone)]
pub struct SqliteContactStore {
    pool: SqlitePool,
}

impl SqliteContactStore {
    /// Open (creating if needed) the database file at `db_path`
    pub async fn open(db_path: &Path, options: &StoreOptions) -> Result<Self> {
        let pool = init_database(db_path, options).await?;
        Ok(Self { pool })
    }

    /// Private in-memory database
    ///
    /// Limited to one connection: every SQLite `:memory:` connection is a
    /// separate database.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;
        init_schema(&pool).await?;
        Ok(Self { pool })
    }

    /// Wrap an existing pool; the schema must already be initialized
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl ContactStore for SqliteContactStore {
    /// Takes the database write lock up front so a busy database is waited
    /// on for `busy_timeout` instead of failing at the first write
    async fn begin(&self) -> Result<Box<dyn ContactTx>> {
        let tx = self.pool.begin_with("BEGIN IMMEDIATE").await?;
        Ok(Box::new(SqliteContactTx { tx }))
    }

    async fn begin_read(&self) -> Result<Box<dyn ContactTx>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(SqliteContactTx { tx }))
    }
}

/// Unit of work over one SQLite transaction
///
/// Rolled back by sqlx when dropped without `commit`.
pub struct SqliteContactTx {
    tx: Transaction<'static, Sqlite>,
}

impl SqliteContactTx {
    /// Fetch a row regardless of its deleted state
    async fn fetch_any(&mut self, id: i64) -> Result<Option<Contact>> {
        let sql = format!("SELECT {} FROM contacts WHERE id = ?", CONTACT_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;

        row.as_ref().map(contact_from_row).transpose()
    }

    async fn latest_created_at(&mut self) -> Result<Option<DateTime<Utc>>> {
        let latest: Option<String> = sqlx::query_scalar("SELECT MAX(created_at) FROM contacts")
            .fetch_one(&mut *self.tx)
            .await?;

        latest.as_deref().map(parse_timestamp).transpose()
    }
}

#[async_trait]
impl ContactTx for SqliteContactTx {
    async fn find_matching(
        &mut self,
        email: Option<&str>,
        phone_number: Option<&str>,
    ) -> Result<Vec<Contact>> {
        if email.is_none() && phone_number.is_none() {
            return Ok(Vec::new());
        }

        // A NULL bind never compares equal, so an absent field matches nothing
        let sql = format!(
            r#"
            SELECT {}
            FROM contacts
            WHERE deleted_at IS NULL
              AND (email = ? OR phone_number = ?)
            ORDER BY created_at ASC, id ASC
            "#,
            CONTACT_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(email)
            .bind(phone_number)
            .fetch_all(&mut *self.tx)
            .await?;

        rows.iter().map(contact_from_row).collect()
    }

    async fn find_cluster(&mut self, primary_id: i64) -> Result<Vec<Contact>> {
        let sql = format!(
            r#"
            SELECT {}
            FROM contacts
            WHERE deleted_at IS NULL
              AND (id = ? OR linked_id = ?)
            ORDER BY created_at ASC, id ASC
            "#,
            CONTACT_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(primary_id)
            .bind(primary_id)
            .fetch_all(&mut *self.tx)
            .await?;

        rows.iter().map(contact_from_row).collect()
    }

    async fn get(&mut self, id: i64) -> Result<Contact> {
        match self.fetch_any(id).await? {
            Some(contact) if !contact.is_deleted() => Ok(contact),
            _ => Err(Error::NotFound(id)),
        }
    }

    async fn lock_primaries(&mut self, primary_ids: &[i64]) -> Result<()> {
        // The write lock is already held from BEGIN IMMEDIATE; touching each
        // primary in ascending order keeps the contract of other backends.
        for id in lock_order(primary_ids) {
            sqlx::query("UPDATE contacts SET updated_at = updated_at WHERE id = ?")
                .bind(id)
                .execute(&mut *self.tx)
                .await?;
        }
        Ok(())
    }

    async fn create(&mut self, contact: NewContact) -> Result<Contact> {
        let created_at = monotonic_after(self.latest_created_at().await?);
        let stamp = to_storage(&created_at);

        let result = sqlx::query(
            r#"
            INSERT INTO contacts (
                email, phone_number, linked_id, link_precedence,
                created_at, updated_at, deleted_at
            )
            VALUES (?, ?, ?, ?, ?, ?, NULL)
            "#,
        )
        .bind(&contact.email)
        .bind(&contact.phone_number)
        .bind(contact.link.linked_id())
        .bind(contact.link.precedence().as_str())
        .bind(&stamp)
        .bind(&stamp)
        .execute(&mut *self.tx)
        .await?;

        let id = result.last_insert_rowid();
        self.fetch_any(id)
            .await?
            .ok_or_else(|| Error::Internal(format!("Inserted contact {} not readable", id)))
    }

    async fn update(&mut self, id: i64, update: ContactUpdate) -> Result<Contact> {
        let mut contact = self.get(id).await?;
        update.apply(&mut contact, now());

        sqlx::query(
            r#"
            UPDATE contacts
            SET email = ?, phone_number = ?, linked_id = ?, link_precedence = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&contact.email)
        .bind(&contact.phone_number)
        .bind(contact.linked_id)
        .bind(contact.link_precedence.as_str())
        .bind(to_storage(&contact.updated_at))
        .bind(id)
        .execute(&mut *self.tx)
        .await?;

        Ok(contact)
    }

    async fn soft_delete(&mut self, id: i64) -> Result<Contact> {
        let mut contact = self.get(id).await?;
        let deleted_at = now();
        contact.deleted_at = Some(deleted_at);
        contact.updated_at = deleted_at;

        let stamp = to_storage(&deleted_at);
        sqlx::query("UPDATE contacts SET deleted_at = ?, updated_at = ? WHERE id = ?")
            .bind(&stamp)
            .bind(&stamp)
            .bind(id)
            .execute(&mut *self.tx)
            .await?;

        Ok(contact)
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let SqliteContactTx { tx } = *self;
        tx.commit().await?;
        Ok(())
    }
}

fn contact_from_row(row: &SqliteRow) -> Result<Contact> {
    let precedence: String = row.try_get("link_precedence")?;
    let created_at: String = row.try_get("created_at")?;
    let updated_at: String = row.try_get("updated_at")?;
    let deleted_at: Option<String> = row.try_get("deleted_at")?;

    Ok(Contact {
        id: row.try_get("id")?,
        email: row.try_get("email")?,
        phone_number: row.try_get("phone_number")?,
        linked_id: row.try_get("linked_id")?,
        link_precedence: precedence.parse::<LinkPrecedence>()?,
        created_at: parse_timestamp(&created_at)?,
        updated_at: parse_timestamp(&updated_at)?,
        deleted_at: deleted_at.as_deref().map(parse_timestamp).transpose()?,
    })
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| Error::Internal(format!("Bad timestamp {:?}: {}", value, e)))
}
