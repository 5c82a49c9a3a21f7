//! Intra-run deduplication.
//!
//! One platform fetch can return several records for the same person
//! (one per offering). Deduplication groups records by normalized email
//! and elects exactly one primary per group, by enrollment recency. It
//! sees only the current fetch result, never previously persisted
//! enrollments.

use std::collections::HashMap;

use unisync_core::SourceRecord;

/// A source record annotated with its primacy within the run.
#[derive(Debug, Clone)]
pub struct DedupedRecord {
    /// The underlying record.
    pub record: SourceRecord,
    /// Elected canonical record for its person within this run.
    pub is_primary: bool,
    /// Part of a group of two or more records for the same person.
    pub is_duplicate: bool,
}

/// Group records by normalized email and annotate primacy.
///
/// Singleton groups are primary and not duplicates. Larger groups are
/// sorted descending by `enrolled_at` (missing dates last); the most
/// recent is primary. Ties keep stable input order, so the election is
/// deterministic for identical input order and timestamps; equal
/// timestamps fall back to whichever record arrived first.
#[must_use]
pub fn dedupe(records: Vec<SourceRecord>) -> Vec<DedupedRecord> {
    let mut groups: Vec<Vec<SourceRecord>> = Vec::new();
    let mut index_by_email: HashMap<String, usize> = HashMap::new();

    for record in records {
        let email = record.normalized_email();
        match index_by_email.get(&email) {
            Some(&i) => groups[i].push(record),
            None => {
                index_by_email.insert(email, groups.len());
                groups.push(vec![record]);
            }
        }
    }

    let mut out = Vec::new();
    for mut group in groups {
        if group.len() == 1 {
            if let Some(record) = group.pop() {
                out.push(DedupedRecord {
                    record,
                    is_primary: true,
                    is_duplicate: false,
                });
            }
            continue;
        }

        // Stable sort: equal or missing dates keep input order.
        group.sort_by(|a, b| b.enrolled_at.cmp(&a.enrolled_at));
        for (i, record) in group.into_iter().enumerate() {
            out.push(DedupedRecord {
                record,
                is_primary: i == 0,
                is_duplicate: true,
            });
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use unisync_core::PlatformKind;

    fn record(email: &str, enrolled_days_ago: Option<i64>) -> SourceRecord {
        let mut builder = SourceRecord::builder(email, PlatformKind::Lms);
        if let Some(days) = enrolled_days_ago {
            builder = builder.enrolled_at(Utc::now() - Duration::days(days));
        }
        builder.build()
    }

    #[test]
    fn test_singleton_is_primary_not_duplicate() {
        let out = dedupe(vec![record("a@x.com", Some(1))]);
        assert_eq!(out.len(), 1);
        assert!(out[0].is_primary);
        assert!(!out[0].is_duplicate);
    }

    #[test]
    fn test_most_recent_enrollment_wins() {
        let out = dedupe(vec![
            record("a@x.com", Some(30)),
            record("a@x.com", Some(5)),
            record("b@x.com", None),
        ]);
        assert_eq!(out.len(), 3);

        let group: Vec<_> = out
            .iter()
            .filter(|r| r.record.normalized_email() == "a@x.com")
            .collect();
        assert_eq!(group.len(), 2);
        assert!(group[0].is_primary);
        assert!(group[0].is_duplicate);
        assert!(group[1].is_duplicate);
        assert!(!group[1].is_primary);
        // The 5-days-ago enrollment is more recent.
        assert!(group[0].record.enrolled_at > group[1].record.enrolled_at);
    }

    #[test]
    fn test_missing_dates_sort_last() {
        let out = dedupe(vec![record("a@x.com", None), record("a@x.com", Some(100))]);
        assert!(out[0].record.enrolled_at.is_some());
        assert!(out[0].is_primary);
        assert!(out[1].record.enrolled_at.is_none());
    }

    #[test]
    fn test_case_insensitive_grouping() {
        let out = dedupe(vec![
            record("Alice@X.com", Some(1)),
            record("alice@x.com ", Some(2)),
        ]);
        assert_eq!(out.len(), 2);
        assert!(out.iter().all(|r| r.is_duplicate));
        assert_eq!(out.iter().filter(|r| r.is_primary).count(), 1);
    }

    #[test]
    fn test_tie_keeps_input_order() {
        let at = Utc::now();
        let mut first = record("a@x.com", None);
        first.enrolled_at = Some(at);
        first.external_id = Some("first".to_string());
        let mut second = record("a@x.com", None);
        second.enrolled_at = Some(at);
        second.external_id = Some("second".to_string());

        let out = dedupe(vec![first, second]);
        assert!(out[0].is_primary);
        assert_eq!(out[0].record.external_id.as_deref(), Some("first"));
    }

    #[test]
    fn test_exactly_one_primary_per_group() {
        let out = dedupe(vec![
            record("a@x.com", Some(3)),
            record("a@x.com", Some(2)),
            record("a@x.com", Some(1)),
            record("a@x.com", None),
        ]);
        assert_eq!(out.iter().filter(|r| r.is_primary).count(), 1);
        assert_eq!(out.len(), 4);
    }
}
