//! Reconciliation engine orchestrator.
//!
//! Consumes deduplicated source records batch by batch, item by item,
//! strictly sequentially: find-or-create is race-free without store
//! locking, and the resolver cache and deactivation queue need no
//! synchronization. Every repository call is a suspension point; the
//! engine never starts the next item until the current one resolves.

use chrono::Utc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::instrument;

use unisync_core::{
    AccessNotifier, CohortMembership, CohortRepository, Enrollment, EnrollmentPatch,
    EnrollmentRepository, ItemOutcome, NewEnrollment, NewPerson, PersonRepository,
    ProductRepository, RunError, RunId, RunMeta, RunReportSink, RunStats, RunStatus, RunWarning,
    SnapshotPhase, StoreSnapshot,
};

use crate::config::{RunRequest, SyncRunConfig};
use crate::dedup::{dedupe, DedupedRecord};
use crate::engagement::{self, EngagementInput};
use crate::error::{SyncError, SyncResult};
use crate::lifecycle::{self, DeactivationQueue};
use crate::lock::PlatformRunLock;
use crate::report::RunRecorder;
use crate::resolver::ProductResolver;
use crate::diff;

/// The collaborator handles the engine runs against.
#[derive(Clone)]
pub struct EngineCollaborators {
    /// Canonical person store.
    pub persons: Arc<dyn PersonRepository>,
    /// Enrollment store.
    pub enrollments: Arc<dyn EnrollmentRepository>,
    /// Read-only product catalog.
    pub products: Arc<dyn ProductRepository>,
    /// Cohort store.
    pub cohorts: Arc<dyn CohortRepository>,
    /// Run report sink.
    pub report_sink: Arc<dyn RunReportSink>,
    /// Best-effort access restoration.
    pub notifier: Arc<dyn AccessNotifier>,
}

/// Aggregate result of one run, returned to the caller. Item-scoped
/// failures surface here, not as errors: inspect `stats` and `errors`.
#[derive(Debug, Clone)]
pub struct RunResult {
    /// Whether the run completed with zero item errors.
    pub success: bool,
    /// The sealed run's id.
    pub run_id: RunId,
    /// Terminal status.
    pub status: RunStatus,
    /// Aggregate counts.
    pub stats: RunStats,
    /// Wall-clock duration.
    pub duration_seconds: f64,
    /// Item-scoped errors, in processing order.
    pub errors: Vec<RunError>,
    /// Warnings, in processing order.
    pub warnings: Vec<RunWarning>,
}

/// The reconciliation engine. One instance serves any number of
/// sequential or cross-platform concurrent runs; the per-platform lock
/// rejects overlapping runs of the same platform.
pub struct SyncEngine {
    persons: Arc<dyn PersonRepository>,
    enrollments: Arc<dyn EnrollmentRepository>,
    cohorts: Arc<dyn CohortRepository>,
    report_sink: Arc<dyn RunReportSink>,
    notifier: Arc<dyn AccessNotifier>,
    resolver: ProductResolver,
    lock: PlatformRunLock,
    config: SyncRunConfig,
}

impl SyncEngine {
    /// Create an engine with default configuration.
    #[must_use]
    pub fn new(collaborators: EngineCollaborators) -> Self {
        Self::with_config(collaborators, SyncRunConfig::default())
    }

    /// Create an engine with custom configuration.
    #[must_use]
    pub fn with_config(collaborators: EngineCollaborators, config: SyncRunConfig) -> Self {
        let resolver = ProductResolver::new(collaborators.products.clone(), &config.resolver);
        Self {
            persons: collaborators.persons,
            enrollments: collaborators.enrollments,
            cohorts: collaborators.cohorts,
            report_sink: collaborators.report_sink,
            notifier: collaborators.notifier,
            resolver,
            lock: PlatformRunLock::new(),
            config,
        }
    }

    /// The product resolver, for administrative cache control.
    #[must_use]
    pub fn resolver(&self) -> &ProductResolver {
        &self.resolver
    }

    /// Engine configuration.
    #[must_use]
    pub fn config(&self) -> &SyncRunConfig {
        &self.config
    }

    /// Reconcile one batch of source records into the canonical stores.
    ///
    /// Opens a run report, deduplicates the input, processes it in
    /// sequential batches, applies the deferred expiration pass and
    /// seals the report. Item-scoped failures are swallowed into the
    /// report; only run-scoped failures (opening/sealing the report,
    /// snapshot capture, the expiration pass, cancellation) return
    /// `Err`, after a best-effort `Failed` seal.
    #[instrument(skip(self, request), fields(platform = %request.platform, trigger = %request.trigger))]
    pub async fn run(&self, request: RunRequest) -> SyncResult<RunResult> {
        let started = Instant::now();

        let _permit = self
            .lock
            .try_acquire(request.platform)
            .ok_or(SyncError::AlreadyRunning {
                platform: request.platform,
            })?;

        let meta = RunMeta {
            platform: request.platform,
            trigger: request.trigger,
            started_at: Utc::now(),
        };
        let mut recorder = RunRecorder::open(
            self.report_sink.clone(),
            meta,
            request.callbacks.clone(),
        )
        .await?;

        if let Err(e) = self.execute(&mut recorder, &request).await {
            let _ = recorder.error(None, e.to_string()).await;
            let _ = recorder.seal(RunStatus::Failed).await;
            return Err(e);
        }

        let stats = recorder.stats();
        let status = RunStatus::from_outcome_counts(stats.errors, stats.total);
        recorder.seal(status).await?;

        let run_id = recorder.run_id();
        let (errors, warnings) = recorder.into_entries();
        Ok(RunResult {
            success: status == RunStatus::Success,
            run_id,
            status,
            stats,
            duration_seconds: started.elapsed().as_secs_f64(),
            errors,
            warnings,
        })
    }

    /// Everything between opening and sealing the report.
    async fn execute(
        &self,
        recorder: &mut RunRecorder,
        request: &RunRequest,
    ) -> SyncResult<()> {
        recorder
            .snapshot(SnapshotPhase::Before, self.capture_snapshot().await?)
            .await?;

        let product_count = self.resolver.refresh().await?;
        recorder
            .log(format!("Catalog refreshed: {product_count} active products"))
            .await?;

        let items = dedupe(request.records.clone());
        let total = items.len() as u32;
        recorder
            .log(format!(
                "Processing {total} records for platform {}{}",
                request.platform,
                if request.full_sync { " (full sync)" } else { "" }
            ))
            .await?;

        let mut queue = DeactivationQueue::new();
        let batch_size = self.config.batch_size.max(1);

        for (batch_index, batch) in items.chunks(batch_size).enumerate() {
            if batch_index > 0 && self.config.batch_pause_ms > 0 {
                tokio::time::sleep(Duration::from_millis(self.config.batch_pause_ms)).await;
            }

            for item in batch {
                if request.cancel.is_cancelled() {
                    return Err(SyncError::Cancelled {
                        run_id: recorder.run_id(),
                    });
                }

                let outcome = match self.process_item(item, recorder, &mut queue).await {
                    Ok(outcome) => outcome,
                    Err(e) if e.is_item_scoped() => {
                        let email = item.record.normalized_email();
                        let email = (!email.is_empty()).then_some(email);
                        recorder.error(email, e.to_string()).await?;
                        ItemOutcome::Errored
                    }
                    Err(e) => return Err(e),
                };
                recorder.record_outcome(outcome);
            }

            recorder.flush_stats().await?;
            recorder.progress(recorder.stats().total, total);
        }

        if request.platform.capabilities().purchase_expiration {
            let summary = lifecycle::apply_expirations(
                &mut queue,
                &self.persons,
                &self.enrollments,
                &self.cohorts,
                Utc::now(),
            )
            .await?;
            if summary.persons_deactivated > 0 {
                recorder
                    .log(format!(
                        "Expiration pass: {} persons and {} enrollments deactivated, \
                         {} cohorts updated, {} cohorts deactivated",
                        summary.persons_deactivated,
                        summary.enrollments_deactivated,
                        summary.cohorts_updated,
                        summary.cohorts_deactivated,
                    ))
                    .await?;
            }
        }

        recorder
            .snapshot(SnapshotPhase::After, self.capture_snapshot().await?)
            .await?;
        Ok(())
    }

    /// Process one deduplicated record. Returns the item's
    /// classification; any `Err` is caught by the caller and classified
    /// `errored` when item-scoped.
    async fn process_item(
        &self,
        item: &DedupedRecord,
        recorder: &mut RunRecorder,
        queue: &mut DeactivationQueue,
    ) -> SyncResult<ItemOutcome> {
        let record = &item.record;
        let now = Utc::now();

        let email = record.normalized_email();
        if email.is_empty() {
            return Err(SyncError::validation(
                record.email.clone(),
                "record has no email",
            ));
        }

        let mut inserted = false;
        let mut changed = false;

        let mut person = match self.persons.find_by_email(&email).await? {
            Some(person) => person,
            None => {
                inserted = true;
                self.persons
                    .create(NewPerson {
                        email: email.clone(),
                        display_name: record.display_name.clone(),
                        platform_link: None,
                    })
                    .await?
            }
        };

        let patch = diff::diff_person(&person, record, now);
        if !patch.is_empty() {
            person = self.persons.update(person.id, patch).await?;
            changed = true;
        }

        let resolution = self.resolver.resolve(record);
        if resolution.is_fallback() {
            recorder
                .warning(
                    Some(email.clone()),
                    format!(
                        "Ambiguous product resolution on {}; using platform default",
                        record.platform
                    ),
                )
                .await?;
        }
        let Some(product_id) = resolution.product_id() else {
            recorder
                .warning(Some(email.clone()), "No product matched; item skipped")
                .await?;
            return Ok(ItemOutcome::Skipped);
        };

        let mut membership = None;
        if let Some(ref cohort_external_id) = record.cohort_id {
            let name = record
                .cohort_name
                .clone()
                .unwrap_or_else(|| cohort_external_id.clone());
            let cohort = self
                .cohorts
                .find_or_create(cohort_external_id, &name, record.platform)
                .await?;
            membership = Some(CohortMembership {
                cohort_id: cohort.id,
                joined_at: record.enrolled_at.unwrap_or(now),
                left_at: None,
            });
        }

        let desired_primary = record.primary_hint.unwrap_or(item.is_primary);
        let mut enrollment = match self
            .enrollments
            .find_by_person_and_product(person.id, product_id)
            .await?
        {
            Some(enrollment) => enrollment,
            None => {
                inserted = true;
                self.enrollments
                    .create(NewEnrollment {
                        person_id: person.id,
                        product_id,
                        platform: record.platform,
                        external_id: record.external_enrollment_id.clone(),
                        enrolled_at: record.enrolled_at,
                        is_primary: desired_primary,
                    })
                    .await?
            }
        };

        if record.platform.capabilities().multiple_enrollments && enrollment.is_primary {
            changed |= self.enforce_single_primary(&mut enrollment).await?;
        }

        let metrics = engagement::calculate(&EngagementInput {
            person: &person,
            record,
            cohort_joined_at: membership.as_ref().map(|m| m.joined_at),
            now,
        });
        let patch = diff::diff_enrollment(&enrollment, record, &metrics, membership.as_ref());
        if !patch.is_empty() {
            enrollment = self.enrollments.update(enrollment.id, patch).await?;
            changed = true;
        }

        let purchase_date = metrics.purchase_date.or(record.purchased_at);
        let renewal = lifecycle::check_renewal(
            &person,
            record,
            purchase_date,
            &self.persons,
            &self.enrollments,
            &self.notifier,
            now,
        )
        .await?;
        if renewal.fired {
            changed = true;
            recorder
                .log(format!(
                    "Renewal detected for {email}; {} enrollments reactivated",
                    renewal.enrollments_reactivated
                ))
                .await?;
            if let Some(failure) = renewal.notify_failure {
                recorder
                    .warning(
                        Some(email.clone()),
                        format!("Access restoration failed: {failure}"),
                    )
                    .await?;
            }
        } else if record.platform.capabilities().purchase_expiration {
            if let Some(purchase) = purchase_date {
                if enrollment.is_active() && lifecycle::expiration_due(now, purchase) {
                    queue.propose(person.id, email.clone());
                }
            }
        }

        Ok(if inserted {
            ItemOutcome::Inserted
        } else if changed {
            ItemOutcome::Updated
        } else {
            ItemOutcome::Unchanged
        })
    }

    /// Keep at most one primary enrollment per person on the platform:
    /// when another enrollment is already primary, the older of the two
    /// is demoted. Returns whether this item's enrollment changed.
    async fn enforce_single_primary(&self, enrollment: &mut Enrollment) -> SyncResult<bool> {
        let siblings = self.enrollments.find_by_person(enrollment.person_id).await?;
        let mut changed = false;

        for other in siblings {
            if other.id == enrollment.id
                || other.platform != enrollment.platform
                || !other.is_primary
            {
                continue;
            }
            // Missing dates compare oldest, matching the dedup rule.
            if other.enrolled_at < enrollment.enrolled_at {
                self.enrollments
                    .update(
                        other.id,
                        EnrollmentPatch {
                            is_primary: Some(false),
                            ..Default::default()
                        },
                    )
                    .await?;
            } else {
                *enrollment = self
                    .enrollments
                    .update(
                        enrollment.id,
                        EnrollmentPatch {
                            is_primary: Some(false),
                            ..Default::default()
                        },
                    )
                    .await?;
                changed = true;
                break;
            }
        }
        Ok(changed)
    }

    /// Aggregate store counts for the before/after snapshots.
    async fn capture_snapshot(&self) -> SyncResult<StoreSnapshot> {
        Ok(StoreSnapshot {
            persons: self.persons.count().await?,
            active_enrollments: self.enrollments.count_active().await?,
        })
    }
}
