//! Batch subtotals and carry-forward totals.
//!
//! Entries are grouped into contiguous runs sharing a batch id (one
//! extraction pass is one logbook page). Each batch gets a subtotal over every
//! numeric field, an amount forward from everything before it, and a total to
//! date. Everything here is derived; nothing mutates entries.

use std::collections::BTreeMap;
use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::columns::{ColumnDefinition, LANDINGS_KEY};
use crate::entry::{LogEntry, NumericField};

/// Sums keyed by numeric field key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Totals {
    values: BTreeMap<String, f64>,
}

impl Totals {
    /// Sum of every numeric value across `entries`.
    #[must_use]
    pub fn of(entries: &[LogEntry]) -> Self {
        let mut totals = Self::default();
        for entry in entries {
            for (key, value) in entry.numeric_values() {
                *totals.values.entry(key.to_string()).or_insert(0.0) += value;
            }
        }
        totals
    }

    /// Amount for `key`, 0 when absent.
    #[must_use]
    pub fn get(&self, key: &str) -> f64 {
        self.values.get(key).copied().unwrap_or(0.0)
    }

    /// Set the amount for `key`.
    pub fn set(&mut self, key: impl Into<String>, value: f64) {
        self.values.insert(key.into(), value);
    }

    /// Key-wise sum of two totals.
    #[must_use]
    pub fn plus(&self, other: &Self) -> Self {
        let mut sum = self.clone();
        for (key, value) in &other.values {
            *sum.values.entry(key.clone()).or_insert(0.0) += value;
        }
        sum
    }

    /// Keys with a recorded amount, in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.values.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// Whether no amounts are recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Render the amount shown in a column's totals cell.
    ///
    /// The landings column shows day and night counts separately as `D/N`,
    /// rounded to whole landings; other numeric columns use one decimal
    /// place.
    #[must_use]
    pub fn display(&self, column_key: &str) -> String {
        if column_key == LANDINGS_KEY {
            format!(
                "{:.0}/{:.0}",
                self.get(NumericField::LdgDay.key()),
                self.get(NumericField::LdgNight.key())
            )
        } else {
            format!("{:.1}", self.get(column_key))
        }
    }
}

/// Amounts forwarded from earlier logbook pages.
///
/// Seeds the first batch only and changes only by explicit edit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CarryForwardLedger(Totals);

impl CarryForwardLedger {
    /// Forwarded amount for `key`, 0 when never set.
    #[must_use]
    pub fn get(&self, key: &str) -> f64 {
        self.0.get(key)
    }

    /// Set the forwarded amount for `key`.
    pub fn set(&mut self, key: impl Into<String>, value: f64) {
        self.0.set(key, value);
    }

    /// The forwarded amounts as totals.
    #[must_use]
    pub fn totals(&self) -> &Totals {
        &self.0
    }
}

impl<K: Into<String>> FromIterator<(K, f64)> for CarryForwardLedger {
    fn from_iter<I: IntoIterator<Item = (K, f64)>>(iter: I) -> Self {
        let mut ledger = Self::default();
        for (key, value) in iter {
            ledger.set(key, value);
        }
        ledger
    }
}

/// Index ranges of contiguous runs of equal batch id.
#[must_use]
pub fn group_batches(entries: &[LogEntry]) -> Vec<Range<usize>> {
    let mut ranges: Vec<Range<usize>> = Vec::new();
    for (i, entry) in entries.iter().enumerate() {
        match ranges.last_mut() {
            Some(last) if entries[last.start].batch_id == entry.batch_id => last.end = i + 1,
            _ => ranges.push(i..i + 1),
        }
    }
    ranges
}

/// Aggregates for one batch.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchSummary {
    /// Position of this batch among all batches.
    pub index: usize,
    /// The shared batch id.
    pub batch_id: Option<String>,
    /// Entry indices covered.
    pub range: Range<usize>,
    /// Sum of this batch's entries.
    pub subtotal: Totals,
    /// Amount carried in from earlier batches (or the base ledger).
    pub forward: Totals,
    /// `subtotal + forward`.
    pub to_date: Totals,
}

impl BatchSummary {
    /// Whether the amount-forward row may be edited. Only the first batch's
    /// forward amounts come from the editable base ledger.
    #[must_use]
    pub fn forward_editable(&self) -> bool {
        self.index == 0
    }

    /// Number of entries in the batch.
    #[must_use]
    pub fn len(&self) -> usize {
        self.range.len()
    }

    /// Whether the batch covers no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.range.is_empty()
    }
}

/// Compute batch summaries for `entries` seeded with `base`.
#[must_use]
pub fn compute(entries: &[LogEntry], base: &CarryForwardLedger) -> Vec<BatchSummary> {
    let mut forward = base.totals().clone();
    group_batches(entries)
        .into_iter()
        .enumerate()
        .map(|(index, range)| {
            let subtotal = Totals::of(&entries[range.clone()]);
            let to_date = subtotal.plus(&forward);
            let carried = std::mem::replace(&mut forward, to_date.clone());
            BatchSummary {
                index,
                batch_id: entries[range.start].batch_id.clone(),
                range,
                subtotal,
                forward: carried,
                to_date,
            }
        })
        .collect()
}

/// One row of a rendered totals block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TotalsRow {
    /// Row label.
    pub label: &'static str,
    /// Cells aligned with the given columns; `None` for non-numeric columns.
    pub cells: Vec<Option<String>>,
}

/// Render the subtotal, amount-forward and total-to-date rows for a batch
/// against the visible columns.
#[must_use]
pub fn totals_rows<'a, I>(summary: &BatchSummary, columns: I) -> [TotalsRow; 3]
where
    I: IntoIterator<Item = &'a ColumnDefinition> + Clone,
{
    let row = |label: &'static str, totals: &Totals| TotalsRow {
        label,
        cells: columns
            .clone()
            .into_iter()
            .map(|c| c.is_numeric().then(|| totals.display(&c.key)))
            .collect(),
    };
    [
        row("Total This Page", &summary.subtotal),
        row("Amount Forward", &summary.forward),
        row("Total To Date", &summary.to_date),
    ]
}

/// Headline figures for a collection of entries.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PageSummary {
    /// Number of entries.
    pub entries: usize,
    /// Sum of total flight time.
    pub total_time: f64,
    /// Sum of pilot-in-command time.
    pub pic: f64,
    /// Sum of night time.
    pub night: f64,
    /// Day plus night landings.
    pub landings: f64,
}

impl PageSummary {
    /// Summarize `entries`.
    #[must_use]
    pub fn of(entries: &[LogEntry]) -> Self {
        entries.iter().fold(
            Self {
                entries: entries.len(),
                ..Self::default()
            },
            |acc, e| Self {
                total_time: acc.total_time + e.total_time,
                pic: acc.pic + e.pic,
                night: acc.night + e.night,
                landings: acc.landings + e.landings(),
                ..acc
            },
        )
    }
}
