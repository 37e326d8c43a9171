//! Lease manager tests against the in-memory store.

use annotq::Error;
use annotq::lease::LeaseManager;
use annotq::model::*;
use annotq::store::Store;
use annotq::store::memory::MemoryStore;
use chrono::{TimeDelta, Utc};
use std::collections::HashSet;
use std::sync::Arc;

const LEASE: TimeDelta = TimeDelta::seconds(60);

fn annotation_by(unit: &Unit, user_id: &str) -> NewAnnotation {
    NewAnnotation {
        unit_id: unit.id,
        batch_id: unit.batch_id,
        user_id: user_id.to_string(),
        label: "hate".to_string(),
        categories: vec![],
        notes: String::new(),
    }
}

async fn setup(units: usize) -> (Arc<MemoryStore>, LeaseManager<MemoryStore>, Batch) {
    let store = Arc::new(MemoryStore::new());
    let batch = store.create_batch("lease-test", "").await.unwrap();
    let texts: Vec<String> = (0..units).map(|i| format!("comment {i}")).collect();
    store.append_units(batch.id, &texts).await.unwrap();
    let batch = store.get_batch(batch.id).await.unwrap().unwrap();
    let leases = LeaseManager::new(Arc::clone(&store), LEASE);
    (store, leases, batch)
}

// ---------------------------------------------------------------------------
// Exclusivity
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_claims_yield_distinct_units() {
    let (_store, leases, batch) = setup(24).await;
    let leases = Arc::new(leases);

    let mut handles = Vec::new();
    for i in 0..24 {
        let leases = Arc::clone(&leases);
        let batch_id = batch.id;
        handles.push(tokio::spawn(async move {
            let user = format!("user-{i}");
            leases.claim_next(batch_id, &user).await
        }));
    }

    let mut seen = HashSet::new();
    for handle in handles {
        let unit = handle
            .await
            .unwrap()
            .unwrap()
            .expect("every caller should get a unit");
        assert!(seen.insert(unit.id), "unit {} handed out twice", unit.id);
    }
    assert_eq!(seen.len(), 24);

    // Batch is now exhausted.
    assert!(leases.claim_next(batch.id, "late").await.unwrap().is_none());
}

#[tokio::test]
async fn claims_follow_original_index_order() {
    let (_store, leases, batch) = setup(3).await;
    let now = Utc::now();

    for expected in 0..3 {
        let unit = leases
            .claim_next_at(batch.id, "ann", now)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(unit.original_index, expected);
        assert_eq!(unit.state, UnitState::Claimed);
        assert_eq!(unit.assignee.as_deref(), Some("ann"));
        assert_eq!(unit.lease_expires_at, Some(now + LEASE));
    }
}

// ---------------------------------------------------------------------------
// Lease expiry
// ---------------------------------------------------------------------------

#[tokio::test]
async fn expired_lease_is_reclaimable_from_expiry_on() {
    let (store, leases, batch) = setup(1).await;
    let t0 = Utc::now();

    let first = leases
        .claim_next_at(batch.id, "alice", t0)
        .await
        .unwrap()
        .unwrap();

    // Not before T + D.
    let early = t0 + LEASE - TimeDelta::milliseconds(1);
    assert!(leases.claim_next_at(batch.id, "bob", early).await.unwrap().is_none());
    assert!(leases.claim_next_at(batch.id, "alice", early).await.unwrap().is_none());

    // At T + D, anyone.
    let stolen = leases
        .claim_next_at(batch.id, "bob", t0 + LEASE)
        .await
        .unwrap()
        .expect("expired claim should be reclaimable");
    assert_eq!(stolen.id, first.id);
    assert_eq!(stolen.assignee.as_deref(), Some("bob"));
    assert_eq!(stolen.lease_expires_at, Some(t0 + LEASE + LEASE));

    let stored = store.get_unit(first.id).await.unwrap().unwrap();
    assert_eq!(stored.assignee.as_deref(), Some("bob"));
}

#[tokio::test]
async fn held_claim_ends_with_the_lease() {
    let (_store, leases, batch) = setup(2).await;
    let t0 = Utc::now();

    let unit = leases
        .claim_next_at(batch.id, "ann", t0)
        .await
        .unwrap()
        .unwrap();

    let held = leases.held_claim_at(batch.id, "ann", t0).await.unwrap();
    assert_eq!(held.map(|u| u.id), Some(unit.id));
    assert!(leases.held_claim_at(batch.id, "bob", t0).await.unwrap().is_none());
    assert!(leases.held_claim_at(batch.id, "ann", t0 + LEASE).await.unwrap().is_none());
}

// ---------------------------------------------------------------------------
// Release
// ---------------------------------------------------------------------------

#[tokio::test]
async fn release_returns_unit_to_the_pool() {
    let (store, leases, batch) = setup(1).await;

    let unit = leases.claim_next(batch.id, "ann").await.unwrap().unwrap();
    assert!(leases.claim_next(batch.id, "bob").await.unwrap().is_none());

    assert!(leases.release(unit.id, "ann").await.unwrap());
    let stored = store.get_unit(unit.id).await.unwrap().unwrap();
    assert_eq!(stored.state, UnitState::Unassigned);
    assert_eq!(stored.assignee, None);
    assert_eq!(stored.lease_expires_at, None);

    let again = leases.claim_next(batch.id, "bob").await.unwrap().unwrap();
    assert_eq!(again.id, unit.id);
}

#[tokio::test]
async fn stale_release_never_reverts_another_users_claim() {
    let (store, leases, batch) = setup(1).await;
    let t0 = Utc::now();

    let unit = leases
        .claim_next_at(batch.id, "alice", t0)
        .await
        .unwrap()
        .unwrap();
    leases
        .claim_next_at(batch.id, "bob", t0 + LEASE)
        .await
        .unwrap()
        .unwrap();

    // Alice comes back and releases what she thinks is hers.
    assert!(!leases.release(unit.id, "alice").await.unwrap());

    let stored = store.get_unit(unit.id).await.unwrap().unwrap();
    assert_eq!(stored.state, UnitState::Claimed);
    assert_eq!(stored.assignee.as_deref(), Some("bob"));
}

#[tokio::test]
async fn annotated_units_are_never_claimed() {
    let (store, leases, batch) = setup(2).await;

    let first = leases.claim_next(batch.id, "ann").await.unwrap().unwrap();
    store
        .record_annotation(&annotation_by(&first, "ann"), Some(Utc::now()))
        .await
        .unwrap();

    // Far past any lease: the annotated unit stays terminal.
    let later = Utc::now() + LEASE * 10;
    let next = leases
        .claim_next_at(batch.id, "bob", later)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(next.original_index, 1);
    assert!(leases.claim_next_at(batch.id, "carol", Utc::now()).await.unwrap().is_none());
}

#[tokio::test]
async fn completing_a_claim_requires_holding_it() {
    let (store, leases, batch) = setup(1).await;
    let t0 = Utc::now();
    let unit = leases
        .claim_next_at(batch.id, "ann", t0)
        .await
        .unwrap()
        .unwrap();

    let intruder = store
        .record_annotation(&annotation_by(&unit, "bob"), Some(t0))
        .await;
    assert!(matches!(intruder, Err(Error::InvalidInput(_))));

    // Ann's own claim no longer counts once the lease has run out.
    let expired = store
        .record_annotation(&annotation_by(&unit, "ann"), Some(t0 + LEASE))
        .await;
    assert!(matches!(expired, Err(Error::InvalidInput(_))));

    let stored = store.get_unit(unit.id).await.unwrap().unwrap();
    assert_eq!(stored.state, UnitState::Claimed);
    assert_eq!(stored.assignee.as_deref(), Some("ann"));
    assert!(store.annotations_by_user("bob").await.unwrap().is_empty());
    assert!(store.annotations_by_user("ann").await.unwrap().is_empty());

    // Within the lease it closes, and a repeat by Ann is kept as a duplicate.
    store
        .record_annotation(&annotation_by(&unit, "ann"), Some(t0))
        .await
        .unwrap();
    store
        .record_annotation(&annotation_by(&unit, "ann"), Some(t0 + LEASE))
        .await
        .unwrap();
    let stored = store.get_unit(unit.id).await.unwrap().unwrap();
    assert_eq!(stored.state, UnitState::Annotated);
    assert_eq!(stored.lease_expires_at, None);
    assert_eq!(store.annotations_by_user("ann").await.unwrap().len(), 2);
}

#[tokio::test]
async fn blank_user_is_rejected_before_any_write() {
    let (store, leases, batch) = setup(1).await;

    let result = leases.claim_next(batch.id, "  ").await;
    assert!(matches!(result, Err(Error::InvalidInput(_))));

    let units = store.units_in_range(batch.id, 0, 0).await.unwrap();
    assert_eq!(units[0].state, UnitState::Unassigned);
}
