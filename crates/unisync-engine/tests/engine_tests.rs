//! Reconciliation Engine Tests
//!
//! End-to-end tests driving [`SyncEngine`] against the in-memory store:
//! - Idempotent create/update semantics and stats conservation
//! - Deduplication and the primary-enrollment invariant
//! - Expiration, renewal precedence and the cohort cascade
//! - Error classification, cancellation and the platform run lock

use chrono::{Duration, Utc};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use unisync_core::{
    EnrollmentStatus, InactiveReason, PersonStatus, PlatformKind, Product, RunStatus, RunTrigger,
    SourceRecord,
};
use unisync_engine::{
    EngineCollaborators, RunCallbacks, RunRequest, SyncEngine, SyncError, SyncRunConfig,
};
use unisync_store_memory::{MemoryReportSink, MemoryStore, RecordingNotifier};

struct Harness {
    store: Arc<MemoryStore>,
    sink: Arc<MemoryReportSink>,
    notifier: Arc<RecordingNotifier>,
    engine: Arc<SyncEngine>,
}

fn harness_with_config(config: SyncRunConfig) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let sink = Arc::new(MemoryReportSink::new());
    let notifier = Arc::new(RecordingNotifier::new());

    let collaborators = EngineCollaborators {
        persons: store.clone(),
        enrollments: store.clone(),
        products: store.clone(),
        cohorts: store.clone(),
        report_sink: sink.clone(),
        notifier: notifier.clone(),
    };
    Harness {
        store,
        sink,
        notifier,
        engine: Arc::new(SyncEngine::with_config(collaborators, config)),
    }
}

fn harness() -> Harness {
    harness_with_config(SyncRunConfig {
        batch_size: 2,
        batch_pause_ms: 0,
        ..Default::default()
    })
}

async fn seed_lms_product(h: &Harness) -> Product {
    let product = Product::new("lms-rust", "Advanced Rust", PlatformKind::Lms)
        .with_group_id("g-rust");
    h.store.seed_product(product.clone()).await;
    product
}

async fn seed_community_product(h: &Harness) -> Product {
    let product = Product::new("community-annual", "Member Hub Annual", PlatformKind::Community)
        .with_group_id("space-1");
    h.store.seed_product(product.clone()).await;
    product
}

fn lms_request(records: Vec<SourceRecord>) -> RunRequest {
    RunRequest::new(PlatformKind::Lms, RunTrigger::Manual, records)
}

fn community_request(records: Vec<SourceRecord>) -> RunRequest {
    RunRequest::new(PlatformKind::Community, RunTrigger::Scheduled, records)
}

// =============================================================================
// Insert / update / unchanged semantics
// =============================================================================

#[tokio::test]
async fn test_fresh_insert_against_empty_store() {
    let h = harness();
    seed_lms_product(&h).await;

    let records = vec![SourceRecord::builder("new@x.com", PlatformKind::Lms)
        .display_name("New")
        .group_hint("g-rust")
        .build()];
    let result = h.engine.run(lms_request(records)).await.unwrap();

    assert!(result.success);
    assert_eq!(result.status, RunStatus::Success);
    assert_eq!(result.stats.total, 1);
    assert_eq!(result.stats.inserted, 1);
    assert_eq!(result.stats.updated, 0);
    assert_eq!(result.stats.unchanged, 0);
    assert_eq!(result.stats.skipped, 0);
    assert_eq!(result.stats.errors, 0);

    let person = h.store.person_by_email("new@x.com").await.unwrap();
    assert_eq!(person.display_name.as_deref(), Some("New"));
    assert_eq!(h.store.enrollments_of(person.id).await.len(), 1);
}

#[tokio::test]
async fn test_rerun_with_identical_input_is_unchanged() {
    let h = harness();
    seed_lms_product(&h).await;

    let records = vec![SourceRecord::builder("new@x.com", PlatformKind::Lms)
        .display_name("New")
        .group_hint("g-rust")
        .enrolled_at(Utc::now() - Duration::days(10))
        .progress_percentage(25.0)
        .build()];

    let first = h.engine.run(lms_request(records.clone())).await.unwrap();
    assert_eq!(first.stats.inserted, 1);

    let second = h.engine.run(lms_request(records)).await.unwrap();
    assert_eq!(second.stats.total, 1);
    assert_eq!(second.stats.inserted, 0);
    assert_eq!(second.stats.updated, 0);
    assert_eq!(second.stats.unchanged, 1);
    assert!(second.stats.is_consistent());
}

#[tokio::test]
async fn test_field_change_classifies_updated() {
    let h = harness();
    seed_lms_product(&h).await;

    let base = SourceRecord::builder("a@x.com", PlatformKind::Lms)
        .group_hint("g-rust")
        .progress_percentage(10.0)
        .build();
    h.engine.run(lms_request(vec![base])).await.unwrap();

    let progressed = SourceRecord::builder("a@x.com", PlatformKind::Lms)
        .group_hint("g-rust")
        .progress_percentage(60.0)
        .build();
    let result = h.engine.run(lms_request(vec![progressed])).await.unwrap();

    assert_eq!(result.stats.updated, 1);
    assert_eq!(result.stats.inserted, 0);

    let person = h.store.person_by_email("a@x.com").await.unwrap();
    let enrollment = &h.store.enrollments_of(person.id).await[0];
    assert_eq!(enrollment.progress.percentage, Some(60.0));
}

#[tokio::test]
async fn test_identity_uniqueness_across_runs_and_casing() {
    let h = harness();
    seed_lms_product(&h).await;

    for email in ["alice@x.com", "  ALICE@X.com ", "Alice@x.Com"] {
        let records = vec![SourceRecord::builder(email, PlatformKind::Lms)
            .group_hint("g-rust")
            .build()];
        h.engine.run(lms_request(records)).await.unwrap();
    }

    let persons = h.store.all_persons().await;
    assert_eq!(persons.len(), 1);
    assert_eq!(persons[0].email, "alice@x.com");
}

// =============================================================================
// Stats conservation and error classification
// =============================================================================

#[tokio::test]
async fn test_stats_conservation_with_mixed_outcomes() {
    let h = harness();
    seed_lms_product(&h).await;

    let records = vec![
        SourceRecord::builder("good@x.com", PlatformKind::Lms)
            .group_hint("g-rust")
            .build(),
        // No email: validation error.
        SourceRecord::builder("   ", PlatformKind::Lms).build(),
        // Commerce has no products: unresolvable, skipped.
        SourceRecord::builder("shop@x.com", PlatformKind::Commerce).build(),
    ];
    let result = h.engine.run(lms_request(records)).await.unwrap();

    assert_eq!(result.stats.total, 3);
    assert_eq!(result.stats.inserted, 1);
    assert_eq!(result.stats.errors, 1);
    assert_eq!(result.stats.skipped, 1);
    assert!(result.stats.is_consistent());
    assert_eq!(result.status, RunStatus::Partial);
    assert!(!result.success);
    assert_eq!(result.errors.len(), 1);
}

#[tokio::test]
async fn test_single_bad_item_fails_run() {
    let h = harness();
    seed_lms_product(&h).await;

    let records = vec![SourceRecord::builder("", PlatformKind::Lms).build()];
    let result = h.engine.run(lms_request(records)).await.unwrap();

    assert_eq!(result.status, RunStatus::Failed);
    assert_eq!(result.stats.errors, 1);
    assert!(!result.success);

    let run = h.sink.run(result.run_id).await.unwrap();
    assert_eq!(run.status, RunStatus::Failed);
    assert_eq!(run.errors.len(), 1);
}

#[tokio::test]
async fn test_unresolved_product_is_warning_not_error() {
    let h = harness();
    // No community products seeded.

    let records = vec![SourceRecord::builder("a@x.com", PlatformKind::Community).build()];
    let result = h.engine.run(community_request(records)).await.unwrap();

    assert_eq!(result.stats.skipped, 1);
    assert_eq!(result.stats.errors, 0);
    assert_eq!(result.status, RunStatus::Success);
    assert!(result
        .warnings
        .iter()
        .any(|w| w.message.contains("No product matched")));
}

#[tokio::test]
async fn test_fallback_resolution_records_warning() {
    let h = harness();
    seed_lms_product(&h).await;

    let records = vec![SourceRecord::builder("a@x.com", PlatformKind::Lms)
        .group_hint("unknown-group-id")
        .build()];
    let result = h.engine.run(lms_request(records)).await.unwrap();

    assert_eq!(result.stats.inserted, 1);
    assert!(result
        .warnings
        .iter()
        .any(|w| w.message.contains("Ambiguous product resolution")));
}

// =============================================================================
// Deduplication and the primary invariant
// =============================================================================

#[tokio::test]
async fn test_dedup_elects_most_recent_enrollment_primary() {
    let h = harness();
    let old_product = Product::new("lms-go", "Go Fundamentals", PlatformKind::Lms)
        .with_group_id("g-go");
    h.store.seed_product(old_product).await;
    seed_lms_product(&h).await;

    let records = vec![
        SourceRecord::builder("a@x.com", PlatformKind::Lms)
            .group_hint("g-go")
            .enrolled_at(Utc::now() - Duration::days(90))
            .build(),
        SourceRecord::builder("a@x.com", PlatformKind::Lms)
            .group_hint("g-rust")
            .enrolled_at(Utc::now() - Duration::days(5))
            .build(),
    ];
    let result = h.engine.run(lms_request(records)).await.unwrap();
    assert_eq!(result.stats.inserted, 2);

    let person = h.store.person_by_email("a@x.com").await.unwrap();
    let enrollments = h.store.enrollments_of(person.id).await;
    assert_eq!(enrollments.len(), 2);

    let primaries: Vec<_> = enrollments.iter().filter(|e| e.is_primary).collect();
    assert_eq!(primaries.len(), 1);
    // The 5-days-ago enrollment carries primacy.
    assert!(primaries[0].enrolled_at.unwrap() > Utc::now() - Duration::days(30));
}

#[tokio::test]
async fn test_newer_enrollment_demotes_older_primary_across_runs() {
    let h = harness();
    let go = Product::new("lms-go", "Go Fundamentals", PlatformKind::Lms).with_group_id("g-go");
    h.store.seed_product(go.clone()).await;
    let rust = seed_lms_product(&h).await;

    let first = vec![SourceRecord::builder("a@x.com", PlatformKind::Lms)
        .group_hint("g-go")
        .enrolled_at(Utc::now() - Duration::days(90))
        .build()];
    h.engine.run(lms_request(first)).await.unwrap();

    let second = vec![SourceRecord::builder("a@x.com", PlatformKind::Lms)
        .group_hint("g-rust")
        .enrolled_at(Utc::now() - Duration::days(1))
        .build()];
    h.engine.run(lms_request(second)).await.unwrap();

    let person = h.store.person_by_email("a@x.com").await.unwrap();
    let enrollments = h.store.enrollments_of(person.id).await;
    let primaries: Vec<_> = enrollments.iter().filter(|e| e.is_primary).collect();
    assert_eq!(primaries.len(), 1);
    assert_eq!(primaries[0].product_id, rust.id);
    assert!(enrollments
        .iter()
        .find(|e| e.product_id == go.id)
        .is_some_and(|e| !e.is_primary));
}

// =============================================================================
// Expiration, renewal and the cohort cascade
// =============================================================================

#[tokio::test]
async fn test_expiration_after_window() {
    let h = harness();
    seed_community_product(&h).await;

    let records = vec![
        SourceRecord::builder("stale@x.com", PlatformKind::Community)
            .group_hint("space-1")
            .purchased_at(Utc::now() - Duration::days(400))
            .build(),
        SourceRecord::builder("fresh@x.com", PlatformKind::Community)
            .group_hint("space-1")
            .purchased_at(Utc::now() - Duration::days(300))
            .build(),
    ];
    let result = h.engine.run(community_request(records.clone())).await.unwrap();
    assert_eq!(result.stats.inserted, 2);

    let stale = h.store.person_by_email("stale@x.com").await.unwrap();
    assert_eq!(stale.status, PersonStatus::Inactive);
    let enrollment = &h.store.enrollments_of(stale.id).await[0];
    assert_eq!(enrollment.status, EnrollmentStatus::Inactive);
    assert_eq!(enrollment.inactive_reason, Some(InactiveReason::Expired));

    let fresh = h.store.person_by_email("fresh@x.com").await.unwrap();
    assert_eq!(fresh.status, PersonStatus::Active);

    // Re-running changes nothing and does not re-deactivate.
    let second = h.engine.run(community_request(records)).await.unwrap();
    assert_eq!(second.stats.unchanged, 2);
    assert_eq!(second.stats.updated, 0);
}

#[tokio::test]
async fn test_renewal_takes_precedence_and_reactivates() {
    let h = harness();
    seed_community_product(&h).await;

    let initial = vec![SourceRecord::builder("renewed@x.com", PlatformKind::Community)
        .group_hint("space-1")
        .external_id("member-77")
        .purchased_at(Utc::now() - Duration::days(40))
        .build()];
    h.engine.run(community_request(initial)).await.unwrap();

    h.store
        .deactivate_person_manually("renewed@x.com", "ops@team", "chargeback")
        .await
        .unwrap();

    let renewal = vec![SourceRecord::builder("renewed@x.com", PlatformKind::Community)
        .group_hint("space-1")
        .external_id("member-77")
        .purchased_at(Utc::now())
        .build()];
    let result = h.engine.run(community_request(renewal)).await.unwrap();
    assert_eq!(result.stats.updated, 1);
    assert_eq!(result.status, RunStatus::Success);

    let person = h.store.person_by_email("renewed@x.com").await.unwrap();
    assert_eq!(person.status, PersonStatus::Active);
    assert!(!person.deactivation.is_manually_deactivated);
    assert_eq!(person.deactivation.reason.as_deref(), Some("renewal_detected"));
    assert!(person.deactivation.reactivated_at.is_some());

    let enrollments = h.store.enrollments_of(person.id).await;
    assert!(enrollments.iter().all(|e| e.is_active()));

    let calls = h.notifier.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0], ("member-77".to_string(), "renewal_detected".to_string()));
}

#[tokio::test]
async fn test_failed_access_restoration_is_warning_only() {
    let h = harness();
    seed_community_product(&h).await;

    let initial = vec![SourceRecord::builder("renewed@x.com", PlatformKind::Community)
        .group_hint("space-1")
        .external_id("member-77")
        .purchased_at(Utc::now() - Duration::days(40))
        .build()];
    h.engine.run(community_request(initial)).await.unwrap();
    h.store
        .deactivate_person_manually("renewed@x.com", "ops@team", "chargeback")
        .await
        .unwrap();
    h.notifier.set_failing(true);

    let renewal = vec![SourceRecord::builder("renewed@x.com", PlatformKind::Community)
        .group_hint("space-1")
        .external_id("member-77")
        .purchased_at(Utc::now())
        .build()];
    let result = h.engine.run(community_request(renewal)).await.unwrap();

    assert_eq!(result.status, RunStatus::Success);
    assert_eq!(result.stats.errors, 0);
    assert!(result
        .warnings
        .iter()
        .any(|w| w.message.contains("Access restoration failed")));

    // The person still ends up reactivated.
    let person = h.store.person_by_email("renewed@x.com").await.unwrap();
    assert_eq!(person.status, PersonStatus::Active);
}

#[tokio::test]
async fn test_cohort_cascade_deactivates_emptied_cohort() {
    let h = harness();
    seed_community_product(&h).await;

    let records = vec![
        // Sole member of c-solo, expired.
        SourceRecord::builder("solo@x.com", PlatformKind::Community)
            .group_hint("space-1")
            .cohort("c-solo", "Solo Cohort")
            .purchased_at(Utc::now() - Duration::days(500))
            .build(),
        // One of two members of c-pair, expired.
        SourceRecord::builder("leaver@x.com", PlatformKind::Community)
            .group_hint("space-1")
            .cohort("c-pair", "Pair Cohort")
            .purchased_at(Utc::now() - Duration::days(500))
            .build(),
        // The remaining member of c-pair, current.
        SourceRecord::builder("stayer@x.com", PlatformKind::Community)
            .group_hint("space-1")
            .cohort("c-pair", "Pair Cohort")
            .purchased_at(Utc::now() - Duration::days(30))
            .build(),
    ];
    let result = h.engine.run(community_request(records)).await.unwrap();
    assert_eq!(result.stats.inserted, 3);

    let solo = h
        .store
        .cohort_by_external_id(PlatformKind::Community, "c-solo")
        .await
        .unwrap();
    assert!(!solo.is_active);

    let pair = h
        .store
        .cohort_by_external_id(PlatformKind::Community, "c-pair")
        .await
        .unwrap();
    assert!(pair.is_active);
    assert_eq!(pair.active_members, 1);
}

// =============================================================================
// Run lifecycle: snapshots, callbacks, cancellation, locking
// =============================================================================

#[tokio::test]
async fn test_snapshots_bracket_the_run() {
    let h = harness();
    seed_lms_product(&h).await;

    let records = vec![SourceRecord::builder("a@x.com", PlatformKind::Lms)
        .group_hint("g-rust")
        .build()];
    let result = h.engine.run(lms_request(records)).await.unwrap();

    let run = h.sink.run(result.run_id).await.unwrap();
    let before = run.snapshot_before.unwrap();
    let after = run.snapshot_after.unwrap();
    assert_eq!(before.persons, 0);
    assert_eq!(before.active_enrollments, 0);
    assert_eq!(after.persons, 1);
    assert_eq!(after.active_enrollments, 1);
    assert!(!run.logs.is_empty());
}

#[tokio::test]
async fn test_callbacks_fire() {
    let h = harness();
    seed_lms_product(&h).await;

    let progress_calls = Arc::new(AtomicU32::new(0));
    let error_calls = Arc::new(AtomicU32::new(0));
    let warning_calls = Arc::new(AtomicU32::new(0));

    let callbacks = RunCallbacks {
        on_progress: Some({
            let calls = progress_calls.clone();
            Arc::new(move |_, _| {
                calls.fetch_add(1, Ordering::SeqCst);
            })
        }),
        on_error: Some({
            let calls = error_calls.clone();
            Arc::new(move |_| {
                calls.fetch_add(1, Ordering::SeqCst);
            })
        }),
        on_warning: Some({
            let calls = warning_calls.clone();
            Arc::new(move |_| {
                calls.fetch_add(1, Ordering::SeqCst);
            })
        }),
    };

    let records = vec![
        SourceRecord::builder("good@x.com", PlatformKind::Lms)
            .group_hint("g-rust")
            .build(),
        SourceRecord::builder("", PlatformKind::Lms).build(),
        SourceRecord::builder("shop@x.com", PlatformKind::Commerce).build(),
    ];
    let request = lms_request(records).callbacks(callbacks);
    h.engine.run(request).await.unwrap();

    // Three items, batch size two: two batches.
    assert_eq!(progress_calls.load(Ordering::SeqCst), 2);
    assert_eq!(error_calls.load(Ordering::SeqCst), 1);
    assert_eq!(warning_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_cancellation_seals_run_failed() {
    let h = harness();
    seed_lms_product(&h).await;

    let cancel = CancellationToken::new();
    cancel.cancel();

    let records = vec![SourceRecord::builder("a@x.com", PlatformKind::Lms)
        .group_hint("g-rust")
        .build()];
    let request = lms_request(records).cancel_token(cancel);
    let err = h.engine.run(request).await.unwrap_err();
    assert!(err.is_cancelled());

    let runs = h.sink.all_runs().await;
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].status, RunStatus::Failed);
    assert!(runs[0]
        .errors
        .iter()
        .any(|e| e.message.contains("cancelled")));

    // Nothing was written before the first item.
    assert!(h.store.all_persons().await.is_empty());
}

#[tokio::test]
async fn test_overlapping_same_platform_run_rejected() {
    let h = harness_with_config(SyncRunConfig {
        batch_size: 1,
        batch_pause_ms: 200,
        ..Default::default()
    });
    seed_lms_product(&h).await;

    let slow_records: Vec<_> = (0..4)
        .map(|i| {
            SourceRecord::builder(format!("user{i}@x.com"), PlatformKind::Lms)
                .group_hint("g-rust")
                .build()
        })
        .collect();

    let engine = h.engine.clone();
    let slow = tokio::spawn(async move { engine.run(lms_request(slow_records)).await });

    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    let err = h
        .engine
        .run(lms_request(vec![SourceRecord::builder("late@x.com", PlatformKind::Lms)
            .group_hint("g-rust")
            .build()]))
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::AlreadyRunning { .. }));

    let result = slow.await.unwrap().unwrap();
    assert_eq!(result.stats.inserted, 4);

    // The permit is released once the run completes.
    let result = h
        .engine
        .run(lms_request(vec![SourceRecord::builder("late@x.com", PlatformKind::Lms)
            .group_hint("g-rust")
            .build()]))
        .await
        .unwrap();
    assert_eq!(result.stats.inserted, 1);
}

#[tokio::test]
async fn test_runs_of_different_platforms_do_not_contend() {
    let h = harness();
    seed_lms_product(&h).await;
    seed_community_product(&h).await;

    let lms = h.engine.run(lms_request(vec![SourceRecord::builder(
        "a@x.com",
        PlatformKind::Lms,
    )
    .group_hint("g-rust")
    .build()]));
    let community = h.engine.run(community_request(vec![SourceRecord::builder(
        "b@x.com",
        PlatformKind::Community,
    )
    .group_hint("space-1")
    .build()]));

    let (lms, community) = tokio::join!(lms, community);
    assert!(lms.unwrap().success);
    assert!(community.unwrap().success);
}
