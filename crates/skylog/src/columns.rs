//! Column schema for logbook tables.
//!
//! The active schema decides which fields are shown, exported and sent to
//! the extraction service. Built-in columns can be hidden but never removed;
//! custom columns can be added, removed, or suggested by format recognition.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::entry::is_fixed_key;
use crate::error::{Error, Result};

/// Key of the composite departure/arrival column.
pub const ROUTE_KEY: &str = "route";

/// Key of the composite day/night landings column.
pub const LANDINGS_KEY: &str = "ldgSub";

/// Prefix of keys for columns suggested by format recognition.
const RECOGNIZED_PREFIX: &str = "ai_";

/// The data type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    /// Free text.
    #[default]
    Text,
    /// A numeric amount that participates in totals.
    Number,
    /// A yes/no flag.
    Boolean,
    /// A clock or duration value kept as text.
    Time,
}

impl std::fmt::Display for ColumnType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text => write!(f, "text"),
            Self::Number => write!(f, "number"),
            Self::Boolean => write!(f, "boolean"),
            Self::Time => write!(f, "time"),
        }
    }
}

impl std::str::FromStr for ColumnType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "number" => Ok(Self::Number),
            "boolean" => Ok(Self::Boolean),
            "time" => Ok(Self::Time),
            other => Err(Error::InvalidFieldValue {
                field: "type".to_string(),
                value: other.to_string(),
            }),
        }
    }
}

/// One column of the logbook table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnDefinition {
    /// Stable identifier; the field key in each entry.
    pub key: String,
    /// Display label.
    pub label: String,
    /// Whether the column is shown and exported.
    pub visible: bool,
    /// Whether the column was added by the user (and may be removed).
    pub is_custom: bool,
    /// The column's data type.
    #[serde(rename = "type", default)]
    pub column_type: ColumnType,
}

impl ColumnDefinition {
    fn builtin(key: &str, label: &str, column_type: ColumnType) -> Self {
        Self {
            key: key.to_string(),
            label: label.to_string(),
            visible: true,
            is_custom: false,
            column_type,
        }
    }

    /// Create a visible custom column.
    #[must_use]
    pub fn custom(key: impl Into<String>, label: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            key: key.into(),
            label: label.into(),
            visible: true,
            is_custom: true,
            column_type,
        }
    }

    /// Whether this column participates in numeric totals.
    #[must_use]
    pub fn is_numeric(&self) -> bool {
        self.column_type == ColumnType::Number
    }
}

/// The standard column layout of a rotorcraft logbook page.
#[must_use]
pub fn default_columns() -> Vec<ColumnDefinition> {
    use ColumnType::{Number, Text};
    vec![
        ColumnDefinition::builtin("date", "Date", Text),
        ColumnDefinition::builtin("aircraftType", "Make & Model", Text),
        ColumnDefinition::builtin("registration", "Ident #", Text),
        ColumnDefinition::builtin(ROUTE_KEY, "Departure/Arrival", Text),
        ColumnDefinition::builtin("rotorcraft", "Rotorcraft", Number),
        ColumnDefinition::builtin("solo", "Solo", Number),
        ColumnDefinition::builtin("dualReceived", "Dual", Number),
        ColumnDefinition::builtin("pic", "PIC", Number),
        ColumnDefinition::builtin("sic", "SIC", Number),
        ColumnDefinition::builtin("cfi", "Instructor", Number),
        ColumnDefinition::builtin("groundTrainer", "Ground", Number),
        ColumnDefinition::builtin("day", "Day", Number),
        ColumnDefinition::builtin("night", "Night", Number),
        ColumnDefinition::builtin("crossCountry", "X-Country", Number),
        ColumnDefinition::builtin("actualInstrument", "Actual Inst", Number),
        ColumnDefinition::builtin("simulatedInstrument", "Sim Inst", Number),
        ColumnDefinition::builtin("instrApp", "NO.\nINSTR.\nAPPR.", Number),
        ColumnDefinition::builtin(LANDINGS_KEY, "No LDG (D/N)", Number),
        ColumnDefinition::builtin("totalTime", "Total Dur.", Number),
        ColumnDefinition::builtin("remarks", "Remarks", Text),
        ColumnDefinition::builtin("signature", "Signature/Cert", Text),
    ]
}

fn whitespace() -> &'static Regex {
    static WHITESPACE: OnceLock<Regex> = OnceLock::new();
    WHITESPACE.get_or_init(|| Regex::new(r"\s+").expect("static regex is valid"))
}

/// Derive a column key from a display label: lowercased, with whitespace
/// runs collapsed to `_`.
#[must_use]
pub fn column_key(label: &str) -> String {
    whitespace()
        .replace_all(&label.to_lowercase(), "_")
        .into_owned()
}

/// A column suggested by the format-recognition collaborator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormatSuggestion {
    /// Detected header text.
    #[serde(default)]
    pub label: Option<String>,
    /// Suggested data type.
    #[serde(rename = "type", default)]
    pub column_type: Option<ColumnType>,
}

/// An ordered column schema with unique keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ColumnSet {
    columns: Vec<ColumnDefinition>,
}

impl Default for ColumnSet {
    fn default() -> Self {
        Self {
            columns: default_columns(),
        }
    }
}

impl From<Vec<ColumnDefinition>> for ColumnSet {
    fn from(columns: Vec<ColumnDefinition>) -> Self {
        Self { columns }
    }
}

impl ColumnSet {
    /// All columns in display order.
    #[must_use]
    pub fn all(&self) -> &[ColumnDefinition] {
        &self.columns
    }

    /// Columns currently shown.
    pub fn visible(&self) -> impl Iterator<Item = &ColumnDefinition> + Clone {
        self.columns.iter().filter(|c| c.visible)
    }

    /// Look up a column by key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&ColumnDefinition> {
        self.columns.iter().find(|c| c.key == key)
    }

    /// Number of columns.
    #[must_use]
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Whether the schema has no columns.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Flip a column's visibility. Returns the new visibility.
    ///
    /// # Errors
    ///
    /// Returns an error if no column has the given key.
    pub fn toggle(&mut self, key: &str) -> Result<bool> {
        let column = self
            .columns
            .iter_mut()
            .find(|c| c.key == key)
            .ok_or_else(|| Error::UnknownColumn {
                key: key.to_string(),
            })?;
        column.visible = !column.visible;
        Ok(column.visible)
    }

    /// Append a custom column whose key is derived from `label`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateColumn`] if the derived key is taken, or
    /// [`Error::ReservedColumnKey`] if it names a fixed entry field such as
    /// `id`; the schema is left unchanged.
    pub fn add_custom(&mut self, label: &str, column_type: ColumnType) -> Result<ColumnDefinition> {
        let label = label.trim();
        let key = column_key(label);
        if key.is_empty() || self.get(&key).is_some() {
            return Err(Error::DuplicateColumn { key });
        }
        if is_fixed_key(&key) {
            return Err(Error::ReservedColumnKey { key });
        }
        let column = ColumnDefinition::custom(key, label, column_type);
        debug!(key = %column.key, "Added custom column");
        self.columns.push(column.clone());
        Ok(column)
    }

    /// Remove a custom column, returning it.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is unknown or names a built-in column.
    pub fn remove_custom(&mut self, key: &str) -> Result<ColumnDefinition> {
        let index = self
            .columns
            .iter()
            .position(|c| c.key == key)
            .ok_or_else(|| Error::UnknownColumn {
                key: key.to_string(),
            })?;
        if !self.columns[index].is_custom {
            return Err(Error::ColumnNotRemovable {
                key: key.to_string(),
            });
        }
        Ok(self.columns.remove(index))
    }

    /// Build a schema from format-recognition suggestions.
    ///
    /// Every suggestion becomes a visible custom column keyed `ai_<label>`;
    /// unlabeled suggestions fall back to their position. Later duplicates of
    /// a key are dropped so keys stay unique.
    #[must_use]
    pub fn from_suggestions(suggestions: &[FormatSuggestion]) -> Self {
        let mut columns: Vec<ColumnDefinition> = Vec::with_capacity(suggestions.len());
        for (i, suggestion) in suggestions.iter().enumerate() {
            let label = suggestion
                .label
                .as_deref()
                .map(str::trim)
                .filter(|l| !l.is_empty());
            let key = match label {
                Some(l) => format!("{RECOGNIZED_PREFIX}{}", column_key(l)),
                None => format!("{RECOGNIZED_PREFIX}{i}"),
            };
            if is_fixed_key(&key) || columns.iter().any(|c| c.key == key) {
                debug!(key = %key, "Dropping duplicate recognized column");
                continue;
            }
            let label = label.map_or_else(|| format!("Col {}", i + 1), str::to_string);
            columns.push(ColumnDefinition::custom(
                key,
                label,
                suggestion.column_type.unwrap_or_default(),
            ));
        }
        Self { columns }
    }
}
