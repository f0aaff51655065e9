//! Search and sort over the table, without touching the stored order.

use std::cmp::Ordering;

use crate::entry::{FieldValue, LogEntry};

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    /// Smallest first.
    Ascending,
    /// Largest first.
    Descending,
}

/// The active sort, if any.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SortConfig {
    /// Sorted column key and direction; `None` keeps stored order.
    pub sort: Option<(String, SortDirection)>,
}

impl SortConfig {
    /// Sort by `key` in `direction`.
    #[must_use]
    pub fn by(key: impl Into<String>, direction: SortDirection) -> Self {
        Self {
            sort: Some((key.into(), direction)),
        }
    }

    /// Advance the sort after a click on `key`'s header.
    ///
    /// A new column sorts ascending; the same column cycles ascending,
    /// descending, then unsorted.
    pub fn cycle(&mut self, key: &str) {
        self.sort = match self.sort.take() {
            Some((current, SortDirection::Ascending)) if current == key => {
                Some((current, SortDirection::Descending))
            }
            Some((current, SortDirection::Descending)) if current == key => None,
            _ => Some((key.to_string(), SortDirection::Ascending)),
        };
    }
}

/// Whether any of the entry's values contains `term`, case-insensitively.
#[must_use]
pub fn matches(entry: &LogEntry, term: &str) -> bool {
    let needle = term.to_lowercase();
    let text_fields = [
        &entry.id,
        &entry.date,
        &entry.aircraft_type,
        &entry.registration,
        &entry.route_from,
        &entry.route_to,
        &entry.remarks,
        &entry.signature,
    ];
    text_fields
        .into_iter()
        .chain(entry.batch_id.as_ref())
        .any(|s| s.to_lowercase().contains(&needle))
        || entry
            .numeric_values()
            .any(|(_, n)| n.to_string().contains(&needle))
        || entry
            .custom
            .values()
            .any(|v| v.to_string().to_lowercase().contains(&needle))
}

fn compare(a: Option<FieldValue>, b: Option<FieldValue>) -> Ordering {
    match (a, b) {
        (Some(FieldValue::Number(x)), Some(FieldValue::Number(y))) => {
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Some(x), Some(y)) => x.to_string().to_lowercase().cmp(&y.to_string().to_lowercase()),
        _ => Ordering::Equal,
    }
}

/// Entries matching `search` (all when empty), ordered by `sort`.
///
/// Numbers compare numerically, everything else as lowercase text. Rows
/// missing the sort field keep their relative position.
#[must_use]
pub fn filter_and_sort<'a>(entries: &'a [LogEntry], search: &str, sort: &SortConfig) -> Vec<&'a LogEntry> {
    let mut rows: Vec<&LogEntry> = if search.is_empty() {
        entries.iter().collect()
    } else {
        entries.iter().filter(|e| matches(e, search)).collect()
    };

    if let Some((key, direction)) = &sort.sort {
        rows.sort_by(|a, b| {
            let ordering = compare(a.field(key), b.field(key));
            match direction {
                SortDirection::Ascending => ordering,
                SortDirection::Descending => ordering.reverse(),
            }
        });
    }
    rows
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: &str, registration: &str, total: f64) -> LogEntry {
        let mut e = LogEntry::blank(id, None, "2024-01-01");
        e.registration = registration.to_string();
        e.total_time = total;
        e
    }

    fn ids(rows: &[&LogEntry]) -> Vec<String> {
        rows.iter().map(|e| e.id.clone()).collect()
    }

    #[test]
    fn test_sort_cycle() {
        let mut sort = SortConfig::default();
        sort.cycle("pic");
        assert_eq!(sort, SortConfig::by("pic", SortDirection::Ascending));
        sort.cycle("pic");
        assert_eq!(sort, SortConfig::by("pic", SortDirection::Descending));
        sort.cycle("pic");
        assert_eq!(sort, SortConfig::default());

        sort.cycle("pic");
        sort.cycle("date");
        assert_eq!(sort, SortConfig::by("date", SortDirection::Ascending));
    }

    #[test]
    fn test_search_is_case_insensitive() {
        let entries = vec![entry("a", "N123AB", 1.0), entry("b", "N999", 2.0)];
        let rows = filter_and_sort(&entries, "n123ab", &SortConfig::default());
        assert_eq!(ids(&rows), vec!["a"]);
    }

    #[test]
    fn test_search_matches_numbers_and_custom_fields() {
        let mut tagged = entry("a", "N1", 1.7);
        tagged
            .custom
            .insert("instructor".to_string(), FieldValue::Text("Ortiz".to_string()));
        let entries = vec![tagged, entry("b", "N2", 2.0)];

        assert_eq!(ids(&filter_and_sort(&entries, "1.7", &SortConfig::default())), vec!["a"]);
        assert_eq!(ids(&filter_and_sort(&entries, "ortiz", &SortConfig::default())), vec!["a"]);
        assert_eq!(filter_and_sort(&entries, "", &SortConfig::default()).len(), 2);
    }

    #[test]
    fn test_sort_numeric_and_text() {
        let entries = vec![
            entry("a", "n200", 10.0),
            entry("b", "N100", 2.0),
            entry("c", "N300", 1.0),
        ];

        let by_total = SortConfig::by("totalTime", SortDirection::Ascending);
        assert_eq!(ids(&filter_and_sort(&entries, "", &by_total)), vec!["c", "b", "a"]);

        let by_reg = SortConfig::by("registration", SortDirection::Descending);
        assert_eq!(ids(&filter_and_sort(&entries, "", &by_reg)), vec!["c", "a", "b"]);
    }

    #[test]
    fn test_missing_sort_field_keeps_order() {
        let entries = vec![entry("a", "x", 1.0), entry("b", "y", 2.0)];
        let sort = SortConfig::by("tail", SortDirection::Ascending);
        assert_eq!(ids(&filter_and_sort(&entries, "", &sort)), vec!["a", "b"]);
    }
}
