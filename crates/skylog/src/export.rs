//! CSV export of the visible table.

use std::io::Write;

use csv::{QuoteStyle, WriterBuilder};

use crate::columns::{ColumnDefinition, LANDINGS_KEY, ROUTE_KEY};
use crate::entry::LogEntry;
use crate::error::Result;

/// The exported text of one cell.
///
/// The route column renders `FROM-TO` and the landings column renders
/// `D:<day> N:<night>`; other fields use their plain value, empty when the
/// entry does not carry the field.
#[must_use]
pub fn cell(entry: &LogEntry, column: &ColumnDefinition) -> String {
    match column.key.as_str() {
        ROUTE_KEY => format!("{}-{}", entry.route_from, entry.route_to),
        LANDINGS_KEY => format!("D:{} N:{}", entry.ldg_day, entry.ldg_night),
        key => entry.field(key).map(|v| v.to_string()).unwrap_or_default(),
    }
}

/// Write a header of column labels, then one record per entry, with every
/// field quoted.
///
/// # Errors
///
/// Returns an error if writing fails.
pub fn write_csv<'a, W, I>(writer: W, columns: I, entries: &[LogEntry]) -> Result<()>
where
    W: Write,
    I: IntoIterator<Item = &'a ColumnDefinition>,
{
    let columns: Vec<&ColumnDefinition> = columns.into_iter().collect();
    let mut wtr = WriterBuilder::new()
        .quote_style(QuoteStyle::Always)
        .from_writer(writer);

    wtr.write_record(columns.iter().map(|c| c.label.as_str()))?;
    for entry in entries {
        wtr.write_record(columns.iter().map(|c| cell(entry, c)))?;
    }
    wtr.flush()?;
    Ok(())
}

/// Render the table as a CSV string.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn to_csv<'a, I>(columns: I, entries: &[LogEntry]) -> Result<String>
where
    I: IntoIterator<Item = &'a ColumnDefinition>,
{
    let mut buf = Vec::new();
    write_csv(&mut buf, columns, entries)?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::columns::{ColumnSet, ColumnType};
    use crate::entry::FieldValue;

    fn column(key: &str, label: &str) -> ColumnDefinition {
        ColumnDefinition::custom(key, label, ColumnType::Text)
    }

    #[test]
    fn test_embedded_quotes_doubled() {
        let mut entry = LogEntry::blank("a", None, "2024-01-01");
        entry.remarks = r#"He said "go""#.to_string();

        let csv = to_csv(&[column("remarks", "Remarks")], &[entry]).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], r#""Remarks""#);
        assert_eq!(lines[1], r#""He said ""go""""#);
    }

    #[test]
    fn test_composite_columns() {
        let mut entry = LogEntry::blank("a", None, "2024-01-01");
        entry.route_from = "KSMO".to_string();
        entry.route_to = "KLAX".to_string();
        entry.ldg_day = 2.0;
        entry.ldg_night = 1.0;

        let set = ColumnSet::default();
        let route = set.get(ROUTE_KEY).unwrap();
        let landings = set.get(LANDINGS_KEY).unwrap();
        assert_eq!(cell(&entry, route), "KSMO-KLAX");
        assert_eq!(cell(&entry, landings), "D:2 N:1");
    }

    #[test]
    fn test_numbers_and_missing_custom_fields() {
        let mut entry = LogEntry::blank("a", None, "2024-01-01");
        entry.total_time = 1.5;
        entry.custom.insert("ifr".to_string(), FieldValue::Bool(true));

        let total = ColumnDefinition::custom("totalTime", "Total", ColumnType::Number);
        assert_eq!(cell(&entry, &total), "1.5");
        assert_eq!(cell(&entry, &column("ifr", "IFR")), "true");
        assert_eq!(cell(&entry, &column("tail", "Tail")), "");
    }

    #[test]
    fn test_only_given_columns_exported() {
        let mut set = ColumnSet::default();
        set.toggle("signature").unwrap();
        let entries = vec![
            LogEntry::blank("a", None, "2024-01-01"),
            LogEntry::blank("b", None, "2024-01-02"),
        ];

        let csv = to_csv(set.visible(), &entries).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert!(!csv.contains("Signature/Cert"));
        assert!(lines[0].starts_with(r#""Date","Make & Model""#));
        assert!(csv.contains(r#""2024-01-02""#));
    }

    #[test]
    fn test_every_field_quoted() {
        let entry = LogEntry::blank("a", None, "2024-01-01");
        let csv = to_csv(&[column("date", "Date"), column("remarks", "Remarks")], &[entry]).unwrap();
        assert_eq!(csv, "\"Date\",\"Remarks\"\n\"2024-01-01\",\"\"\n");
    }
}
