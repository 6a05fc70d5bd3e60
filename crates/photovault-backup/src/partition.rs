//! Deduplication and calendar-month grouping

use std::collections::{BTreeMap, HashSet};

use chrono::Local;
use photovault_core::domain::{Group, GroupKey, MediaEntry};
use tracing::warn;

/// Entries kept and dropped by [`deduplicate`]
#[derive(Debug, Clone, Default)]
pub struct Deduplicated {
    /// First occurrence of every identity, in input order
    pub kept: Vec<MediaEntry>,
    /// Later occurrences of an identity already kept
    pub duplicates: Vec<MediaEntry>,
}

/// Drops entries whose identity (timestamp to the second, base filename)
/// was already seen earlier in `entries`
pub fn deduplicate(entries: Vec<MediaEntry>) -> Deduplicated {
    let mut seen = HashSet::new();
    let mut result = Deduplicated::default();

    for entry in entries {
        if seen.insert(entry.identity_key()) {
            result.kept.push(entry);
        } else {
            warn!(path = %entry.path().display(), "Duplicate file, skipping");
            result.duplicates.push(entry);
        }
    }
    result
}

/// Calendar month of an entry on the local calendar
pub fn group_key_of(entry: &MediaEntry) -> GroupKey {
    GroupKey::from_datetime(&entry.resolved_at().with_timezone(&Local))
}

/// Partitions entries into disjoint month groups, oldest month first
///
/// Member order within a group follows input order.
pub fn group_by_month(entries: Vec<MediaEntry>) -> BTreeMap<GroupKey, Group> {
    let mut buckets: BTreeMap<GroupKey, Vec<MediaEntry>> = BTreeMap::new();
    for entry in entries {
        buckets.entry(group_key_of(&entry)).or_default().push(entry);
    }
    buckets
        .into_iter()
        .map(|(key, members)| (key, Group::new(key, members)))
        .collect()
}

/// [`deduplicate`] followed by [`group_by_month`]
pub fn partition(entries: Vec<MediaEntry>) -> BTreeMap<GroupKey, Group> {
    group_by_month(deduplicate(entries).kept)
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, TimeZone, Utc};
    use photovault_core::domain::TimestampSource;

    use super::*;

    /// Mid-month noon so the local calendar month matches in every zone
    fn at(year: i32, month: u32, day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(year, month, day, 12, 0, 0).unwrap()
    }

    fn entry(path: &str, ts: DateTime<Utc>) -> MediaEntry {
        MediaEntry::new(path, ts, TimestampSource::Captured, 1)
    }

    #[test]
    fn same_second_and_name_in_different_dirs_is_a_duplicate() {
        let ts = at(2024, 3, 15);
        let result = deduplicate(vec![
            entry("/lib/a/IMG_1.jpg", ts),
            entry("/lib/b/IMG_1.jpg", ts + chrono::Duration::milliseconds(400)),
            entry("/lib/b/IMG_2.jpg", ts),
        ]);

        assert_eq!(result.kept.len(), 2);
        assert_eq!(result.kept[0].path().to_str(), Some("/lib/a/IMG_1.jpg"));
        assert_eq!(result.duplicates.len(), 1);
        assert_eq!(result.duplicates[0].path().to_str(), Some("/lib/b/IMG_1.jpg"));
    }

    #[test]
    fn different_second_is_not_a_duplicate() {
        let ts = at(2024, 3, 15);
        let result = deduplicate(vec![
            entry("/lib/a/IMG_1.jpg", ts),
            entry("/lib/b/IMG_1.jpg", ts + chrono::Duration::seconds(1)),
        ]);
        assert_eq!(result.kept.len(), 2);
        assert!(result.duplicates.is_empty());
    }

    #[test]
    fn grouping_is_total_and_disjoint() {
        let input = vec![
            entry("/lib/1.jpg", at(2024, 3, 10)),
            entry("/lib/2.jpg", at(2024, 4, 10)),
            entry("/lib/3.jpg", at(2023, 12, 14)),
            entry("/lib/4.jpg", at(2024, 3, 20)),
            entry("/lib/5.jpg", at(2024, 4, 11)),
        ];
        let groups = group_by_month(input.clone());

        let keys: Vec<String> = groups.keys().map(|k| k.to_string()).collect();
        assert_eq!(keys, vec!["2023-12", "2024-03", "2024-04"]);

        let mut members: Vec<MediaEntry> = groups
            .values()
            .flat_map(|g| g.members().iter().cloned())
            .collect();
        assert_eq!(members.len(), input.len());
        members.sort_by(|a, b| a.path().cmp(b.path()));
        assert_eq!(members, input);

        let march = &groups[&"2024-03".parse().unwrap()];
        assert_eq!(march.len(), 2);
        assert_eq!(march.members()[0].path().to_str(), Some("/lib/1.jpg"));
    }

    #[test]
    fn partition_drops_duplicates_before_grouping() {
        let ts = at(2024, 3, 15);
        let groups = partition(vec![
            entry("/lib/a/IMG_1.jpg", ts),
            entry("/lib/b/IMG_1.jpg", ts),
        ]);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups.values().next().unwrap().len(), 1);
    }

    #[test]
    fn empty_input_yields_no_groups() {
        assert!(partition(Vec::new()).is_empty());
    }
}
