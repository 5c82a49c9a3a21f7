//! Engagement metric calculation.
//!
//! Pure functions mapping a (person, record, enrollment context) to
//! recency metrics. One strategy per platform kind, registered in a
//! table; adding a platform means adding one entry. Metrics are
//! recomputed on every sync pass because "now" moves daily, and the
//! nightly metrics refresher reuses the same calculator.

use chrono::{DateTime, Utc};

use unisync_core::{Engagement, Person, PlatformKind, SourceRecord};

/// Everything a strategy may consult. The person carries already-merged
/// platform links.
#[derive(Debug, Clone, Copy)]
pub struct EngagementInput<'a> {
    /// The canonical person, merged with the current record.
    pub person: &'a Person,
    /// The source record being processed.
    pub record: &'a SourceRecord,
    /// Cohort join date, where the record carries a cohort.
    pub cohort_joined_at: Option<DateTime<Utc>>,
    /// Reference time for recency arithmetic.
    pub now: DateTime<Utc>,
}

type StrategyFn = fn(&EngagementInput<'_>) -> Engagement;

/// Per-platform strategy table.
fn strategy_for(kind: PlatformKind) -> Option<StrategyFn> {
    const STRATEGIES: &[(PlatformKind, StrategyFn)] = &[
        (PlatformKind::Lms, lms_engagement),
        (PlatformKind::Community, community_engagement),
    ];
    STRATEGIES
        .iter()
        .find(|(k, _)| *k == kind)
        .map(|(_, f)| *f)
}

/// Compute engagement metrics for one record. Platforms without a
/// registered strategy yield empty recency metrics, not an error.
#[must_use]
pub fn calculate(input: &EngagementInput<'_>) -> Engagement {
    let mut engagement = match strategy_for(input.record.platform) {
        Some(strategy) => strategy(input),
        None => Engagement::default(),
    };

    engagement.score = input.record.engagement_score;
    engagement.purchase_value = input.record.purchase_value;
    engagement.purchase_date = purchase_date(input.record);
    engagement
}

/// Whole days between a past instant and now. Negative differences
/// clamp to zero.
fn days_since(now: DateTime<Utc>, then: DateTime<Utc>) -> i64 {
    (now - then).num_days().max(0)
}

/// Purchase date through the platform's field priority chain.
fn purchase_date(record: &SourceRecord) -> Option<DateTime<Utc>> {
    match record.platform {
        // Login-tracked platforms report purchases directly.
        PlatformKind::Lms => record.purchased_at,
        // Community and commerce memberships fall back to the
        // enrollment date when no purchase date is reported.
        PlatformKind::Community | PlatformKind::Commerce => {
            record.purchased_at.or(record.enrolled_at)
        }
    }
}

/// Login-tracked platforms: recency of logins.
fn lms_engagement(input: &EngagementInput<'_>) -> Engagement {
    let link = input.person.platform_link(PlatformKind::Lms);

    let last_login = input
        .record
        .last_login_at
        .or_else(|| link.and_then(|l| l.last_login_at));

    Engagement {
        days_since_last_login: last_login.map(|at| days_since(input.now, at)),
        total_logins: link
            .and_then(|l| l.total_logins)
            .or(input.record.total_logins),
        ..Default::default()
    }
}

/// Action-tracked platforms: recency of member actions plus tenure.
fn community_engagement(input: &EngagementInput<'_>) -> Engagement {
    let link = input.person.platform_link(PlatformKind::Community);

    let last_action = input
        .record
        .last_action_at
        .or_else(|| link.and_then(|l| l.last_action_at));

    // Tenure basis: cohort join date, then platform join date, then
    // person creation date.
    let enrolled_basis = input
        .cohort_joined_at
        .or_else(|| link.and_then(|l| l.joined_at))
        .unwrap_or(input.person.created_at);

    Engagement {
        days_since_last_action: last_action.map(|at| days_since(input.now, at)),
        days_since_enrollment: Some(days_since(input.now, enrolled_basis)),
        actions_last_week: input.record.actions_last_week,
        actions_last_month: input.record.actions_last_month,
        ..Default::default()
    }
}
