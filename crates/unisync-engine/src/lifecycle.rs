//! Expiration and renewal state machine.
//!
//! Two-phase by construction: while items are processed, renewals are
//! applied immediately and expirations are only *proposed* into a
//! run-scoped queue; after the last batch, [`apply_expirations`] applies
//! the queue in one pass and recomputes the touched cohorts. Renewal
//! takes precedence over expiration for the same item in the same pass.

use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, warn};

use unisync_core::{
    AccessNotifier, CohortId, CohortRepository, Deactivation, EnrollmentRepository,
    EnrollmentStatus, InactiveReason, Person, PersonId, PersonPatch, PersonRepository,
    PersonStatus, SourceRecord,
};

use crate::error::SyncResult;

/// Days after purchase beyond which an enrollment auto-deactivates.
pub const EXPIRATION_WINDOW_DAYS: i64 = 380;

/// Whether a manually deactivated person has renewed: the purchase must
/// be strictly later than the deactivation.
#[must_use]
pub fn renewal_due(person: &Person, purchase_date: Option<DateTime<Utc>>) -> bool {
    if !person.deactivation.is_manually_deactivated {
        return false;
    }
    let Some(purchase) = purchase_date else {
        return false;
    };
    match person.deactivation.deactivated_at {
        Some(deactivated_at) => purchase > deactivated_at,
        // No deactivation timestamp to compare against; any purchase
        // observed afterwards counts as a renewal.
        None => true,
    }
}

/// Whether a purchase has aged past the expiration window.
#[must_use]
pub fn expiration_due(now: DateTime<Utc>, purchase_date: DateTime<Utc>) -> bool {
    (now - purchase_date).num_days() > EXPIRATION_WINDOW_DAYS
}

/// One proposed deactivation.
#[derive(Debug, Clone)]
pub struct QueuedDeactivation {
    /// The person to deactivate.
    pub person_id: PersonId,
    /// Normalized email, for report entries.
    pub email: String,
}

/// Run-scoped accumulator of proposed deactivations. Cleared at run
/// start; deduplicated by person so one person appearing in several
/// batches is deactivated once.
#[derive(Debug, Default)]
pub struct DeactivationQueue {
    entries: Vec<QueuedDeactivation>,
    seen: HashSet<PersonId>,
}

impl DeactivationQueue {
    /// Create an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Propose a person for deactivation. Repeated proposals are
    /// collapsed.
    pub fn propose(&mut self, person_id: PersonId, email: impl Into<String>) {
        if self.seen.insert(person_id) {
            self.entries.push(QueuedDeactivation {
                person_id,
                email: email.into(),
            });
        }
    }

    /// Number of distinct persons queued.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the queue is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drain the queued proposals.
    pub fn drain(&mut self) -> Vec<QueuedDeactivation> {
        self.seen.clear();
        std::mem::take(&mut self.entries)
    }
}

/// What a renewal check did.
#[derive(Debug, Clone, Default)]
pub struct RenewalOutcome {
    /// A renewal was detected and applied.
    pub fired: bool,
    /// Enrollments flipped back to active.
    pub enrollments_reactivated: u64,
    /// Failure message of the best-effort access restoration, if it
    /// failed.
    pub notify_failure: Option<String>,
}

/// Phase 1, per item: reactivate a manually deactivated person whose
/// record carries a purchase postdating the deactivation. Clears the
/// manual flag, flips every enrollment back to active and fires the
/// best-effort access restoration.
pub async fn check_renewal(
    person: &Person,
    record: &SourceRecord,
    purchase_date: Option<DateTime<Utc>>,
    persons: &Arc<dyn PersonRepository>,
    enrollments: &Arc<dyn EnrollmentRepository>,
    notifier: &Arc<dyn AccessNotifier>,
    now: DateTime<Utc>,
) -> SyncResult<RenewalOutcome> {
    if !renewal_due(person, purchase_date) {
        return Ok(RenewalOutcome::default());
    }

    let deactivation = Deactivation {
        is_manually_deactivated: false,
        deactivated_at: person.deactivation.deactivated_at,
        deactivated_by: person.deactivation.deactivated_by.clone(),
        reason: Some("renewal_detected".to_string()),
        reactivated_at: Some(now),
    };
    persons
        .update(
            person.id,
            PersonPatch {
                status: Some(PersonStatus::Active),
                deactivation: Some(deactivation),
                ..Default::default()
            },
        )
        .await?;

    let reactivated = enrollments
        .update_status_by_person(person.id, EnrollmentStatus::Active, None)
        .await?;

    info!(
        person_id = %person.id,
        email = %person.email,
        enrollments = reactivated,
        "Renewal detected, person reactivated"
    );

    let mut notify_failure = None;
    if let Some(external_id) = person
        .platform_link(record.platform)
        .and_then(|l| l.external_id.as_deref())
    {
        if let Err(e) = notifier.restore_access(external_id, "renewal_detected").await {
            warn!(
                person_id = %person.id,
                error = %e,
                "Access restoration failed; continuing"
            );
            notify_failure = Some(e.to_string());
        }
    }

    Ok(RenewalOutcome {
        fired: true,
        enrollments_reactivated: reactivated,
        notify_failure,
    })
}

/// Result of the batch-end expiration pass.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExpirationSummary {
    /// Persons deactivated by this pass.
    pub persons_deactivated: u32,
    /// Enrollments deactivated by this pass.
    pub enrollments_deactivated: u64,
    /// Cohorts whose member counts were refreshed.
    pub cohorts_updated: u32,
    /// Cohorts deactivated because no active members remain.
    pub cohorts_deactivated: u32,
}

/// Phase 2, batch end: apply every queued deactivation once, then
/// recount the touched cohorts and deactivate the emptied ones. Persons
/// already inactive are skipped, so re-running a pass that changed
/// nothing changes nothing.
pub async fn apply_expirations(
    queue: &mut DeactivationQueue,
    persons: &Arc<dyn PersonRepository>,
    enrollments: &Arc<dyn EnrollmentRepository>,
    cohorts: &Arc<dyn CohortRepository>,
    now: DateTime<Utc>,
) -> SyncResult<ExpirationSummary> {
    let mut summary = ExpirationSummary::default();
    let mut touched_cohorts: HashSet<CohortId> = HashSet::new();

    for queued in queue.drain() {
        let Some(person) = persons.find_by_email(&queued.email).await? else {
            continue;
        };
        if person.status == PersonStatus::Inactive {
            continue;
        }

        for enrollment in enrollments.find_by_person(person.id).await? {
            if !enrollment.is_active() {
                continue;
            }
            for membership in &enrollment.cohort_memberships {
                if membership.left_at.is_none() {
                    touched_cohorts.insert(membership.cohort_id);
                }
            }
        }

        let deactivated = enrollments
            .update_status_by_person(
                person.id,
                EnrollmentStatus::Inactive,
                Some(InactiveReason::Expired),
            )
            .await?;
        persons
            .update(
                person.id,
                PersonPatch {
                    status: Some(PersonStatus::Inactive),
                    ..Default::default()
                },
            )
            .await?;

        summary.persons_deactivated += 1;
        summary.enrollments_deactivated += deactivated;
        info!(
            person_id = %person.id,
            email = %person.email,
            enrollments = deactivated,
            "Enrollment expired, person deactivated"
        );
    }

    for cohort_id in touched_cohorts {
        let remaining = cohorts.count_active_members(cohort_id).await?;
        if remaining == 0 {
            cohorts.deactivate(cohort_id).await?;
            summary.cohorts_deactivated += 1;
            info!(cohort_id = %cohort_id, "Cohort emptied, deactivated");
        } else {
            cohorts.set_member_count(cohort_id, remaining).await?;
            summary.cohorts_updated += 1;
        }
    }

    Ok(summary)
}
