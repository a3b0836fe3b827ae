//! Reconciliation properties checked against the SQLite store

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use idrec_common::db::{SqliteContactStore, StoreOptions};
use idrec_common::{Contact, ContactStore, Error, LinkPrecedence};
use idrec_identify::IdentityEngine;

const TIMEOUT: Duration = Duration::from_secs(10);

async fn memory_engine() -> (IdentityEngine, SqliteContactStore) {
    let store = SqliteContactStore::in_memory().await.unwrap();
    let engine = IdentityEngine::new(Arc::new(store.clone()), TIMEOUT);
    (engine, store)
}

/// Every live row, deleted rows excluded
async fn live_rows(store: &SqliteContactStore) -> Vec<Contact> {
    let max_id: i64 = sqlx::query_scalar("SELECT COALESCE(MAX(id), 0) FROM contacts")
        .fetch_one(store.pool())
        .await
        .unwrap();
    let mut tx = store.begin_read().await.unwrap();
    let mut rows = Vec::new();
    for id in 1..=max_id {
        if let Ok(contact) = tx.get(id).await {
            rows.push(contact);
        }
    }
    rows
}

/// One primary per cluster, secondaries point straight at a live primary
fn assert_clusters_well_formed(rows: &[Contact]) {
    let by_id: HashMap<i64, &Contact> = rows.iter().map(|c| (c.id, c)).collect();
    for contact in rows {
        if contact.link_precedence == LinkPrecedence::Secondary {
            let primary = contact
                .linked_id
                .and_then(|id| by_id.get(&id))
                .unwrap_or_else(|| panic!("contact {} has no live primary", contact.id));
            assert!(primary.is_primary());
        } else {
            assert_eq!(contact.linked_id, None);
        }
    }
}

/// Engine over a WAL database file with several pooled connections
async fn file_engine(dir: &tempfile::TempDir) -> (IdentityEngine, SqliteContactStore) {
    let options = StoreOptions {
        busy_timeout: Duration::from_millis(5000),
        max_connections: 8,
    };
    let store = SqliteContactStore::open(&dir.path().join("identity.db"), &options)
        .await
        .unwrap();
    let engine = IdentityEngine::new(Arc::new(store.clone()), TIMEOUT);
    (engine, store)
}

#[tokio::test]
async fn test_both_fields_absent_always_invalid() {
    let (engine, _store) = memory_engine().await;
    assert!(matches!(
        engine.reconcile(None, None).await,
        Err(Error::InvalidInput(_))
    ));
}

#[tokio::test]
async fn test_repeat_observation_is_idempotent() {
    let (engine, store) = memory_engine().await;
    engine.reconcile(Some("a@x.com"), Some("111")).await.unwrap();
    engine.reconcile(Some("b@x.com"), Some("111")).await.unwrap();

    let before = live_rows(&store).await;
    let first = engine.reconcile(Some("b@x.com"), Some("111")).await.unwrap();
    let second = engine.reconcile(Some("b@x.com"), Some("111")).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(live_rows(&store).await, before, "no row may change");
}

#[tokio::test]
async fn test_merge_keeps_earliest_primary_and_relinks() {
    let (engine, store) = memory_engine().await;
    let p1 = engine.reconcile(Some("a@x.com"), None).await.unwrap();
    let p2 = engine.reconcile(None, Some("222")).await.unwrap();
    let s = engine.reconcile(Some("s@x.com"), Some("222")).await.unwrap();
    assert_eq!(s.primary_contact_id, p2.primary_contact_id);

    let merged = engine.reconcile(Some("a@x.com"), Some("222")).await.unwrap();

    assert_eq!(merged.primary_contact_id, p1.primary_contact_id);
    assert_eq!(merged.emails, vec!["a@x.com", "s@x.com"]);
    let rows = live_rows(&store).await;
    assert_eq!(rows.len(), 3);
    assert_eq!(rows.iter().filter(|c| c.is_primary()).count(), 1);
    assert_clusters_well_formed(&rows);
}

#[tokio::test]
async fn test_soft_delete_removes_from_matching() {
    let (engine, store) = memory_engine().await;
    let view = engine.reconcile(Some("a@x.com"), Some("111")).await.unwrap();

    engine.soft_delete(view.primary_contact_id).await.unwrap();

    assert!(matches!(
        engine.get_cluster(view.primary_contact_id).await,
        Err(Error::NotFound(_))
    ));
    let mut tx = store.begin().await.unwrap();
    assert!(tx
        .find_matching(Some("a@x.com"), Some("111"))
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_concurrent_new_identities_all_succeed() {
    let dir = tempfile::tempdir().unwrap();
    let (engine, store) = file_engine(&dir).await;

    let mut handles = Vec::new();
    for i in 0..64 {
        let engine = engine.clone();
        handles.push(tokio::spawn(async move {
            let email = format!("u{}@x.com", i);
            engine.reconcile(Some(email.as_str()), None).await
        }));
    }

    for handle in handles {
        let view = handle.await.unwrap().expect("fresh insert must not fail");
        assert!(view.secondary_contact_ids.is_empty());
    }
    let rows = live_rows(&store).await;
    assert_eq!(rows.len(), 64);
    assert!(rows.iter().all(|c| c.is_primary()));
}

#[tokio::test]
async fn test_concurrent_extends_of_distinct_clusters_all_succeed() {
    let dir = tempfile::tempdir().unwrap();
    let (engine, store) = file_engine(&dir).await;
    for i in 0..32 {
        let email = format!("u{}@x.com", i);
        engine.reconcile(Some(email.as_str()), None).await.unwrap();
    }

    let mut handles = Vec::new();
    for i in 0..32 {
        let engine = engine.clone();
        handles.push(tokio::spawn(async move {
            let email = format!("u{}@x.com", i);
            let phone = (1000 + i).to_string();
            engine.reconcile(Some(email.as_str()), Some(phone.as_str())).await
        }));
    }

    for handle in handles {
        let view = handle.await.unwrap().expect("extend must not fail");
        assert_eq!(view.secondary_contact_ids.len(), 1);
        assert_eq!(view.phone_numbers.len(), 1);
    }
    let rows = live_rows(&store).await;
    assert_eq!(rows.len(), 64);
    assert_eq!(rows.iter().filter(|c| c.is_primary()).count(), 32);
    assert_clusters_well_formed(&rows);
}

#[tokio::test]
async fn test_concurrent_merges_leave_one_primary() {
    let dir = tempfile::tempdir().unwrap();
    let (engine, store) = file_engine(&dir).await;

    engine.reconcile(Some("a@x.com"), None).await.unwrap();
    engine.reconcile(None, Some("222")).await.unwrap();
    engine.reconcile(Some("c@x.com"), Some("222")).await.unwrap();

    let mut handles = Vec::new();
    for _ in 0..8 {
        let engine = engine.clone();
        handles.push(tokio::spawn(async move {
            engine.reconcile(Some("a@x.com"), Some("222")).await
        }));
    }

    let mut views = Vec::new();
    for handle in handles {
        views.push(handle.await.unwrap().expect("merge must not fail"));
    }

    for view in &views {
        assert_eq!(view, &views[0]);
        assert_eq!(view.primary_contact_id, 1);
    }
    let rows = live_rows(&store).await;
    assert_eq!(rows.len(), 3, "merging must not create rows");
    assert_eq!(rows.iter().filter(|c| c.is_primary()).count(), 1);
    assert_clusters_well_formed(&rows);
}
