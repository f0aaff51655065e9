//! Core logbook record types for skylog.
//!
//! A [`LogEntry`] is one row of a pilot logbook page: a fixed set of
//! descriptive and numeric fields plus an ordered map of typed values for
//! custom columns.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};

use crate::columns::ColumnType;
use crate::error::{Error, Result};

/// Batch id given to entries created by hand rather than by an extraction.
pub const MANUAL_BATCH_ID: &str = "manual";

/// Serialized keys of the fixed non-numeric fields of a [`LogEntry`].
pub const FIXED_TEXT_KEYS: [&str; 9] = [
    "id",
    "batchId",
    "date",
    "aircraftType",
    "registration",
    "routeFrom",
    "routeTo",
    "remarks",
    "signature",
];

/// Whether `key` names a fixed field of [`LogEntry`].
///
/// Custom values share the serialized object with the fixed fields, so a
/// custom key must never be one of these.
#[must_use]
pub fn is_fixed_key(key: &str) -> bool {
    FIXED_TEXT_KEYS.contains(&key) || NumericField::from_key(key).is_some()
}

/// A typed value stored in a custom column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    /// A boolean flag.
    Bool(bool),
    /// A numeric amount.
    Number(f64),
    /// Free text (also used for `time` columns).
    Text(String),
    /// An explicitly empty value.
    Empty,
}

impl FieldValue {
    /// The numeric value, if this is a number.
    #[must_use]
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// The blank value a new column of the given type starts with.
    #[must_use]
    pub fn default_for(column_type: ColumnType) -> Self {
        match column_type {
            ColumnType::Number => Self::Number(0.0),
            ColumnType::Boolean => Self::Bool(false),
            ColumnType::Text | ColumnType::Time => Self::Text(String::new()),
        }
    }

    /// Parse user input for a column of the given type.
    ///
    /// # Errors
    ///
    /// Returns an error if the input is not valid for the column type.
    pub fn parse(field: &str, raw: &str, column_type: ColumnType) -> Result<Self> {
        let invalid = || Error::InvalidFieldValue {
            field: field.to_string(),
            value: raw.to_string(),
        };
        match column_type {
            ColumnType::Number => {
                let trimmed = raw.trim();
                if trimmed.is_empty() {
                    return Ok(Self::Number(0.0));
                }
                trimmed
                    .parse::<f64>()
                    .ok()
                    .filter(|n| n.is_finite())
                    .map(Self::Number)
                    .ok_or_else(invalid)
            }
            ColumnType::Boolean => match raw.trim().to_ascii_lowercase().as_str() {
                "true" | "yes" | "y" | "1" | "x" => Ok(Self::Bool(true)),
                "false" | "no" | "n" | "0" | "" => Ok(Self::Bool(false)),
                _ => Err(invalid()),
            },
            ColumnType::Text | ColumnType::Time => Ok(Self::Text(raw.to_string())),
        }
    }
}

impl std::fmt::Display for FieldValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
            Self::Empty => Ok(()),
        }
    }
}

/// The fixed numeric categories of a logbook row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NumericField {
    /// Rotorcraft time.
    Rotorcraft,
    /// Solo time.
    Solo,
    /// Dual instruction received.
    DualReceived,
    /// Pilot in command.
    Pic,
    /// Second in command.
    Sic,
    /// Time as flight instructor.
    Cfi,
    /// Ground trainer time.
    GroundTrainer,
    /// Day time.
    Day,
    /// Night time.
    Night,
    /// Cross-country time.
    CrossCountry,
    /// Actual instrument time.
    ActualInstrument,
    /// Simulated instrument time.
    SimulatedInstrument,
    /// Number of instrument approaches.
    InstrApp,
    /// Day landings.
    LdgDay,
    /// Night landings.
    LdgNight,
    /// Total duration of flight.
    TotalTime,
}

impl NumericField {
    /// Every numeric field in logbook column order.
    pub const ALL: [Self; 16] = [
        Self::Rotorcraft,
        Self::Solo,
        Self::DualReceived,
        Self::Pic,
        Self::Sic,
        Self::Cfi,
        Self::GroundTrainer,
        Self::Day,
        Self::Night,
        Self::CrossCountry,
        Self::ActualInstrument,
        Self::SimulatedInstrument,
        Self::InstrApp,
        Self::LdgDay,
        Self::LdgNight,
        Self::TotalTime,
    ];

    /// The serialized field key.
    #[must_use]
    pub const fn key(self) -> &'static str {
        match self {
            Self::Rotorcraft => "rotorcraft",
            Self::Solo => "solo",
            Self::DualReceived => "dualReceived",
            Self::Pic => "pic",
            Self::Sic => "sic",
            Self::Cfi => "cfi",
            Self::GroundTrainer => "groundTrainer",
            Self::Day => "day",
            Self::Night => "night",
            Self::CrossCountry => "crossCountry",
            Self::ActualInstrument => "actualInstrument",
            Self::SimulatedInstrument => "simulatedInstrument",
            Self::InstrApp => "instrApp",
            Self::LdgDay => "ldgDay",
            Self::LdgNight => "ldgNight",
            Self::TotalTime => "totalTime",
        }
    }

    /// Look up a numeric field by its serialized key.
    #[must_use]
    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.key() == key)
    }
}

impl std::fmt::Display for NumericField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.key())
    }
}

/// One row of a logbook page.
///
/// Serialized with camelCase keys; custom column values are flattened
/// alongside the fixed fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LogEntry {
    /// Unique identifier within the working collection.
    pub id: String,
    /// The extraction pass (or `manual`) that produced this row.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch_id: Option<String>,
    /// Date of the flight as written in the logbook.
    pub date: String,
    /// Aircraft make and model.
    pub aircraft_type: String,
    /// Aircraft identification.
    pub registration: String,
    /// Departure identifier.
    pub route_from: String,
    /// Arrival identifier.
    pub route_to: String,
    /// Rotorcraft time.
    #[serde(deserialize_with = "lenient_number")]
    pub rotorcraft: f64,
    /// Solo time.
    #[serde(deserialize_with = "lenient_number")]
    pub solo: f64,
    /// Dual instruction received.
    #[serde(deserialize_with = "lenient_number")]
    pub dual_received: f64,
    /// Pilot-in-command time.
    #[serde(deserialize_with = "lenient_number")]
    pub pic: f64,
    /// Second-in-command time.
    #[serde(deserialize_with = "lenient_number")]
    pub sic: f64,
    /// Time given as instructor.
    #[serde(deserialize_with = "lenient_number")]
    pub cfi: f64,
    /// Ground trainer time.
    #[serde(deserialize_with = "lenient_number")]
    pub ground_trainer: f64,
    /// Day time.
    #[serde(deserialize_with = "lenient_number")]
    pub day: f64,
    /// Night time.
    #[serde(deserialize_with = "lenient_number")]
    pub night: f64,
    /// Cross-country time.
    #[serde(deserialize_with = "lenient_number")]
    pub cross_country: f64,
    /// Actual instrument time.
    #[serde(deserialize_with = "lenient_number")]
    pub actual_instrument: f64,
    /// Simulated instrument time.
    #[serde(deserialize_with = "lenient_number")]
    pub simulated_instrument: f64,
    /// Instrument approaches flown.
    #[serde(deserialize_with = "lenient_number")]
    pub instr_app: f64,
    /// Day landings.
    #[serde(deserialize_with = "lenient_number")]
    pub ldg_day: f64,
    /// Night landings.
    #[serde(deserialize_with = "lenient_number")]
    pub ldg_night: f64,
    /// Total duration of flight.
    #[serde(deserialize_with = "lenient_number")]
    pub total_time: f64,
    /// Free-text remarks.
    pub remarks: String,
    /// Signature or certificate text.
    pub signature: String,
    /// Values of custom columns, keyed by column key.
    #[serde(flatten)]
    pub custom: BTreeMap<String, FieldValue>,
}

/// Accepts numbers, numeric strings and `null`; anything unusable becomes 0.
fn lenient_number<'de, D>(deserializer: D) -> std::result::Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let n = match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    Ok(n.filter(|n| n.is_finite()).unwrap_or(0.0))
}

impl LogEntry {
    /// Create an empty row.
    #[must_use]
    pub fn blank(id: impl Into<String>, batch_id: Option<String>, date: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            batch_id,
            date: date.into(),
            ..Self::default()
        }
    }

    /// Value of a fixed numeric field.
    #[must_use]
    pub fn number(&self, field: NumericField) -> f64 {
        match field {
            NumericField::Rotorcraft => self.rotorcraft,
            NumericField::Solo => self.solo,
            NumericField::DualReceived => self.dual_received,
            NumericField::Pic => self.pic,
            NumericField::Sic => self.sic,
            NumericField::Cfi => self.cfi,
            NumericField::GroundTrainer => self.ground_trainer,
            NumericField::Day => self.day,
            NumericField::Night => self.night,
            NumericField::CrossCountry => self.cross_country,
            NumericField::ActualInstrument => self.actual_instrument,
            NumericField::SimulatedInstrument => self.simulated_instrument,
            NumericField::InstrApp => self.instr_app,
            NumericField::LdgDay => self.ldg_day,
            NumericField::LdgNight => self.ldg_night,
            NumericField::TotalTime => self.total_time,
        }
    }

    /// Set a fixed numeric field.
    pub fn set_number(&mut self, field: NumericField, value: f64) {
        let slot = match field {
            NumericField::Rotorcraft => &mut self.rotorcraft,
            NumericField::Solo => &mut self.solo,
            NumericField::DualReceived => &mut self.dual_received,
            NumericField::Pic => &mut self.pic,
            NumericField::Sic => &mut self.sic,
            NumericField::Cfi => &mut self.cfi,
            NumericField::GroundTrainer => &mut self.ground_trainer,
            NumericField::Day => &mut self.day,
            NumericField::Night => &mut self.night,
            NumericField::CrossCountry => &mut self.cross_country,
            NumericField::ActualInstrument => &mut self.actual_instrument,
            NumericField::SimulatedInstrument => &mut self.simulated_instrument,
            NumericField::InstrApp => &mut self.instr_app,
            NumericField::LdgDay => &mut self.ldg_day,
            NumericField::LdgNight => &mut self.ldg_night,
            NumericField::TotalTime => &mut self.total_time,
        };
        *slot = value;
    }

    /// Every numeric value carried by this row: the fixed categories first,
    /// then numeric custom fields in key order.
    pub fn numeric_values(&self) -> impl Iterator<Item = (&str, f64)> + '_ {
        NumericField::ALL
            .into_iter()
            .map(|f| (f.key(), self.number(f)))
            .chain(
                self.custom
                    .iter()
                    .filter_map(|(k, v)| v.as_number().map(|n| (k.as_str(), n))),
            )
    }

    /// Numeric value of any field by key, 0 when absent or not a number.
    #[must_use]
    pub fn numeric(&self, key: &str) -> f64 {
        if let Some(field) = NumericField::from_key(key) {
            return self.number(field);
        }
        self.custom.get(key).and_then(FieldValue::as_number).unwrap_or(0.0)
    }

    /// Value of any field by key, or `None` when the row does not carry it.
    #[must_use]
    pub fn field(&self, key: &str) -> Option<FieldValue> {
        if let Some(field) = NumericField::from_key(key) {
            return Some(FieldValue::Number(self.number(field)));
        }
        let text = match key {
            "id" => &self.id,
            "date" => &self.date,
            "aircraftType" => &self.aircraft_type,
            "registration" => &self.registration,
            "routeFrom" => &self.route_from,
            "routeTo" => &self.route_to,
            "remarks" => &self.remarks,
            "signature" => &self.signature,
            "batchId" => return self.batch_id.clone().map(FieldValue::Text),
            _ => return self.custom.get(key).cloned(),
        };
        Some(FieldValue::Text(text.clone()))
    }

    /// Set a field by key from a typed value.
    ///
    /// Fixed text fields take the value's display form; fixed numeric fields
    /// require a number. `batchId` is cleared by an empty value. Other keys
    /// are stored as custom values.
    ///
    /// # Errors
    ///
    /// Returns an error if a fixed numeric field is given a non-number, or
    /// the key is `id`.
    pub fn set_field(&mut self, key: &str, value: FieldValue) -> Result<()> {
        if let Some(field) = NumericField::from_key(key) {
            let n = match &value {
                FieldValue::Number(n) => *n,
                FieldValue::Empty => 0.0,
                other => {
                    return Err(Error::InvalidFieldValue {
                        field: key.to_string(),
                        value: other.to_string(),
                    })
                }
            };
            self.set_number(field, n);
            return Ok(());
        }
        let slot = match key {
            "date" => &mut self.date,
            "aircraftType" => &mut self.aircraft_type,
            "registration" => &mut self.registration,
            "routeFrom" => &mut self.route_from,
            "routeTo" => &mut self.route_to,
            "remarks" => &mut self.remarks,
            "signature" => &mut self.signature,
            "batchId" => {
                self.batch_id = Some(value.to_string()).filter(|b| !b.is_empty());
                return Ok(());
            }
            "id" => {
                return Err(Error::InvalidFieldValue {
                    field: key.to_string(),
                    value: value.to_string(),
                })
            }
            _ => {
                self.custom.insert(key.to_string(), value);
                return Ok(());
            }
        };
        *slot = value.to_string();
        Ok(())
    }

    /// Total landings, day plus night.
    #[must_use]
    pub fn landings(&self) -> f64 {
        self.ldg_day + self.ldg_night
    }
}
