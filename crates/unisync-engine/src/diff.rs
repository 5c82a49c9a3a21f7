//! Field diffing.
//!
//! Change detection is first-class: these functions compare stored state
//! with the incoming record and produce typed patches containing only
//! the changed subset. An empty patch is what classifies an item as
//! `unchanged`, so every merge rule lives here and nowhere else.

use chrono::{DateTime, Utc};

use unisync_core::{
    CohortMembership, Engagement, Enrollment, EnrollmentPatch, Person, PersonPatch, PlatformLink,
    Progress, SourceRecord,
};

/// Diff a person against an incoming record. Last write wins per field;
/// fields the record does not carry are left untouched.
#[must_use]
pub fn diff_person(person: &Person, record: &SourceRecord, now: DateTime<Utc>) -> PersonPatch {
    let mut patch = PersonPatch::default();

    if let Some(ref name) = record.display_name {
        if person.display_name.as_deref() != Some(name.as_str()) {
            patch.display_name = Some(name.clone());
        }
    }

    let existing = person.platform_link(record.platform);
    let merged = merge_platform_link(existing, record, now);
    let changed = match existing {
        Some(link) => !platform_link_data_eq(link, &merged),
        None => true,
    };
    if changed {
        let mut link = merged;
        link.last_synced_at = now;
        patch.platform_link = Some(link);
    }

    patch
}

/// Merge the record's platform fields onto the existing link. The
/// sync timestamp is preserved so equality means "no data changed".
fn merge_platform_link(
    existing: Option<&PlatformLink>,
    record: &SourceRecord,
    now: DateTime<Utc>,
) -> PlatformLink {
    let mut link = existing
        .cloned()
        .unwrap_or_else(|| PlatformLink::new(record.platform, now));

    if record.external_id.is_some() {
        link.external_id = record.external_id.clone();
    }
    if record.total_logins.is_some() {
        link.total_logins = record.total_logins;
    }
    if record.last_login_at.is_some() {
        link.last_login_at = record.last_login_at;
    }
    if record.last_action_at.is_some() {
        link.last_action_at = record.last_action_at;
    }
    if link.joined_at.is_none() {
        link.joined_at = record.enrolled_at;
    }
    link
}

/// Compare platform links ignoring the sync timestamp.
fn platform_link_data_eq(a: &PlatformLink, b: &PlatformLink) -> bool {
    a.platform == b.platform
        && a.external_id == b.external_id
        && a.total_logins == b.total_logins
        && a.last_login_at == b.last_login_at
        && a.last_action_at == b.last_action_at
        && a.joined_at == b.joined_at
}

/// Diff an enrollment against an incoming record and freshly computed
/// engagement metrics.
#[must_use]
pub fn diff_enrollment(
    enrollment: &Enrollment,
    record: &SourceRecord,
    engagement: &Engagement,
    membership: Option<&CohortMembership>,
) -> EnrollmentPatch {
    let mut patch = EnrollmentPatch::default();

    if let Some(ref external_id) = record.external_enrollment_id {
        if enrollment.external_id.as_deref() != Some(external_id.as_str()) {
            patch.external_id = Some(external_id.clone());
        }
    }

    if let Some(enrolled_at) = record.enrolled_at {
        if enrollment.enrolled_at != Some(enrolled_at) {
            patch.enrolled_at = Some(enrolled_at);
        }
    }

    let merged_progress = merge_progress(&enrollment.progress, record);
    if merged_progress != enrollment.progress {
        patch.progress = Some(merged_progress);
    }

    if *engagement != enrollment.engagement {
        patch.engagement = Some(engagement.clone());
    }

    if let Some(m) = membership {
        if enrollment.cohort_membership(m.cohort_id) != Some(m) {
            patch.cohort_membership = Some(m.clone());
        }
    }

    patch
}

/// Merge the record's progress fields onto the existing progress.
fn merge_progress(existing: &Progress, record: &SourceRecord) -> Progress {
    let mut progress = existing.clone();
    if record.progress_percentage.is_some() {
        progress.percentage = record.progress_percentage;
    }
    if let Some(activity) = record.last_action_at.or(record.last_login_at) {
        progress.last_activity_at = Some(activity);
    }
    progress
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use unisync_core::{
        Deactivation, EnrollmentId, EnrollmentStatus, PersonId, PersonStatus, PlatformKind,
        ProductId,
    };

    fn person_with_link(record: &SourceRecord, now: DateTime<Utc>) -> Person {
        let mut person = Person {
            id: PersonId::new(),
            email: record.normalized_email(),
            display_name: record.display_name.clone(),
            status: PersonStatus::Active,
            platform_links: vec![],
            deactivation: Deactivation::default(),
            created_at: now,
            updated_at: now,
        };
        person.apply_patch(diff_person(&person, record, now), now);
        person
    }

    fn enrollment_for(record: &SourceRecord, now: DateTime<Utc>) -> Enrollment {
        Enrollment {
            id: EnrollmentId::new(),
            person_id: PersonId::new(),
            product_id: ProductId::new(),
            platform: record.platform,
            external_id: record.external_enrollment_id.clone(),
            status: EnrollmentStatus::Active,
            inactive_reason: None,
            enrolled_at: record.enrolled_at,
            progress: Progress::default(),
            engagement: Engagement::default(),
            is_primary: true,
            cohort_memberships: vec![],
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_person_diff_is_empty_after_merge() {
        let now = Utc::now();
        let record = SourceRecord::builder("a@x.com", PlatformKind::Lms)
            .display_name("Alice")
            .external_id("ext-1")
            .total_logins(7)
            .last_login_at(now - Duration::days(2))
            .build();

        let person = person_with_link(&record, now);
        let patch = diff_person(&person, &record, now);
        assert!(patch.is_empty(), "re-diffing identical data must be empty");
    }

    #[test]
    fn test_person_diff_detects_new_login() {
        let now = Utc::now();
        let record = SourceRecord::builder("a@x.com", PlatformKind::Lms)
            .last_login_at(now - Duration::days(10))
            .build();
        let person = person_with_link(&record, now);

        let newer = SourceRecord::builder("a@x.com", PlatformKind::Lms)
            .last_login_at(now - Duration::days(1))
            .build();
        let patch = diff_person(&person, &newer, now);
        assert!(patch.platform_link.is_some());
        assert!(patch.display_name.is_none());
    }

    #[test]
    fn test_person_diff_display_name_last_write_wins() {
        let now = Utc::now();
        let record = SourceRecord::builder("a@x.com", PlatformKind::Lms)
            .display_name("Alice")
            .build();
        let person = person_with_link(&record, now);

        let renamed = SourceRecord::builder("a@x.com", PlatformKind::Lms)
            .display_name("Alice Cooper")
            .build();
        let patch = diff_person(&person, &renamed, now);
        assert_eq!(patch.display_name.as_deref(), Some("Alice Cooper"));
    }

    #[test]
    fn test_person_diff_absent_name_keeps_existing() {
        let now = Utc::now();
        let record = SourceRecord::builder("a@x.com", PlatformKind::Lms)
            .display_name("Alice")
            .build();
        let person = person_with_link(&record, now);

        let nameless = SourceRecord::builder("a@x.com", PlatformKind::Lms).build();
        let patch = diff_person(&person, &nameless, now);
        assert!(patch.display_name.is_none());
    }

    #[test]
    fn test_enrollment_diff_is_empty_when_identical() {
        let now = Utc::now();
        let record = SourceRecord::builder("a@x.com", PlatformKind::Lms)
            .enrolled_at(now - Duration::days(30))
            .build();
        let enrollment = enrollment_for(&record, now);

        let patch = diff_enrollment(&enrollment, &record, &enrollment.engagement, None);
        assert!(patch.is_empty());
    }

    #[test]
    fn test_enrollment_diff_progress_change() {
        let now = Utc::now();
        let record = SourceRecord::builder("a@x.com", PlatformKind::Lms)
            .progress_percentage(40.0)
            .build();
        let enrollment = enrollment_for(&SourceRecord::builder("a@x.com", PlatformKind::Lms).build(), now);

        let patch = diff_enrollment(&enrollment, &record, &enrollment.engagement, None);
        let progress = patch.progress.expect("progress should change");
        assert_eq!(progress.percentage, Some(40.0));
    }

    #[test]
    fn test_enrollment_diff_engagement_change() {
        let now = Utc::now();
        let record = SourceRecord::builder("a@x.com", PlatformKind::Lms).build();
        let enrollment = enrollment_for(&record, now);

        let engagement = Engagement {
            days_since_last_login: Some(4),
            ..Default::default()
        };
        let patch = diff_enrollment(&enrollment, &record, &engagement, None);
        assert_eq!(
            patch.engagement.unwrap().days_since_last_login,
            Some(4)
        );
    }

    #[test]
    fn test_enrollment_diff_membership_upsert_once() {
        let now = Utc::now();
        let record = SourceRecord::builder("a@x.com", PlatformKind::Community).build();
        let mut enrollment = enrollment_for(&record, now);

        let membership = CohortMembership {
            cohort_id: unisync_core::CohortId::new(),
            joined_at: now,
            left_at: None,
        };
        let patch = diff_enrollment(
            &enrollment,
            &record,
            &enrollment.engagement,
            Some(&membership),
        );
        assert!(patch.cohort_membership.is_some());

        enrollment.apply_patch(patch, now);
        let patch = diff_enrollment(
            &enrollment,
            &record,
            &enrollment.engagement,
            Some(&membership),
        );
        assert!(patch.is_empty(), "same membership must not re-patch");
    }
}
