//! The AI vision collaborator.
//!
//! An [`Extractor`] turns a photographed logbook page into rows, or
//! recognizes the page's column layout. Responses are JSON arrays; the
//! parsers here turn them into typed values the same way for every
//! collaborator. [`ReplayExtractor`] answers from recorded responses.

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::columns::{ColumnDefinition, ColumnType, FormatSuggestion};
use crate::entry::LogEntry;
use crate::error::{Error, Result};

/// A photographed logbook page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageImage {
    bytes: Vec<u8>,
}

impl PageImage {
    /// Wrap JPEG bytes.
    #[must_use]
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    /// Read a JPEG file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::from_bytes(std::fs::read(path)?))
    }

    /// The image bytes.
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Whether the image has no content.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Everything the collaborator needs to extract rows from a page.
#[derive(Debug, Clone)]
pub struct ExtractionRequest {
    /// The page photo.
    pub image: PageImage,
    /// Columns currently shown; the collaborator extracts these.
    pub columns: Vec<ColumnDefinition>,
    /// Year assumed for dates written without one.
    pub year: String,
}

impl ExtractionRequest {
    /// One line per requested column, `Label (type)`, as described to the
    /// collaborator.
    #[must_use]
    pub fn column_descriptions(&self) -> String {
        self.columns
            .iter()
            .map(|c| format!("{} ({})", c.label, c.column_type))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// An AI vision service that reads logbook pages.
///
/// Calls are not cancellable once issued. Failures carry no partial result.
#[async_trait]
pub trait Extractor: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &str;

    /// Extract the rows of a page.
    ///
    /// Returned rows carry fresh ids but no batch id.
    async fn extract(&self, request: &ExtractionRequest) -> Result<Vec<LogEntry>>;

    /// Suggest the column layout of a page.
    async fn recognize_format(&self, image: &PageImage) -> Result<Vec<FormatSuggestion>>;
}

/// Parse an extraction response: a JSON array of row objects.
///
/// Each row gets the id `entry-<ms>-<index>`. Values that are neither
/// scalars nor null are dropped.
///
/// # Errors
///
/// Returns an extraction error if the response is not a non-empty array of
/// objects.
pub fn parse_rows(response: &str, now: DateTime<Utc>) -> Result<Vec<LogEntry>> {
    let rows = parse_array(response, "No data extracted from image")?;
    let ms = now.timestamp_millis();

    rows.into_iter()
        .enumerate()
        .map(|(index, row)| {
            let Value::Object(fields) = row else {
                return Err(Error::extraction(format!("row {index} is not an object")));
            };
            let mut entry: LogEntry = serde_json::from_value(Value::Object(scalar_fields(fields)))
                .map_err(|e| Error::extraction(format!("row {index}: {e}")))?;
            entry.id = format!("entry-{ms}-{index}");
            entry.batch_id = None;
            Ok(entry)
        })
        .collect()
}

fn scalar_fields(fields: Map<String, Value>) -> Map<String, Value> {
    fields
        .into_iter()
        .filter(|(key, value)| {
            let keep = !matches!(value, Value::Array(_) | Value::Object(_));
            if !keep {
                warn!(field = %key, "Dropping non-scalar extracted value");
            }
            keep
        })
        .collect()
}

/// Parse a format-recognition response: a JSON array of `{label, type}`.
///
/// Missing labels stay `None`; unknown types are treated as unspecified.
///
/// # Errors
///
/// Returns an extraction error if the response is not a non-empty array.
pub fn parse_format(response: &str) -> Result<Vec<FormatSuggestion>> {
    let items = parse_array(response, "Could not detect logbook structure")?;
    Ok(items
        .iter()
        .map(|item| FormatSuggestion {
            label: item
                .get("label")
                .and_then(Value::as_str)
                .map(str::to_string),
            column_type: item
                .get("type")
                .and_then(Value::as_str)
                .and_then(|t| t.parse::<ColumnType>().ok()),
        })
        .collect())
}

fn parse_array(response: &str, empty_message: &str) -> Result<Vec<Value>> {
    let text = response.trim();
    if text.is_empty() {
        return Err(Error::extraction(empty_message));
    }
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Array(items)) if items.is_empty() => Err(Error::extraction(empty_message)),
        Ok(Value::Array(items)) => Ok(items),
        Ok(_) => Err(Error::extraction("response is not a JSON array")),
        Err(e) => Err(Error::extraction(format!("malformed response: {e}"))),
    }
}

/// An [`Extractor`] that answers with recorded responses.
#[derive(Debug, Clone, Default)]
pub struct ReplayExtractor {
    rows: Option<String>,
    format: Option<String>,
}

impl ReplayExtractor {
    /// A replayer with no recorded responses; every call fails.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer extractions with `response`.
    #[must_use]
    pub fn with_rows(mut self, response: impl Into<String>) -> Self {
        self.rows = Some(response.into());
        self
    }

    /// Answer format recognition with `response`.
    #[must_use]
    pub fn with_format(mut self, response: impl Into<String>) -> Self {
        self.format = Some(response.into());
        self
    }

    /// Load recorded responses from files.
    ///
    /// # Errors
    ///
    /// Returns an error if a given file cannot be read.
    pub fn from_files(rows: Option<&Path>, format: Option<&Path>) -> Result<Self> {
        let read = |path: Option<&Path>| -> Result<Option<String>> {
            path.map(std::fs::read_to_string)
                .transpose()
                .map_err(Error::from)
        };
        Ok(Self {
            rows: read(rows)?,
            format: read(format)?,
        })
    }

    fn missing(what: &str) -> Error {
        Error::extraction(format!("no recorded {what} response"))
    }
}

#[async_trait]
impl Extractor for ReplayExtractor {
    fn name(&self) -> &str {
        "replay"
    }

    async fn extract(&self, request: &ExtractionRequest) -> Result<Vec<LogEntry>> {
        let response = self.rows.as_deref().ok_or_else(|| Self::missing("extraction"))?;
        debug!(
            columns = request.columns.len(),
            year = %request.year,
            "Replaying extraction"
        );
        parse_rows(response, Utc::now())
    }

    async fn recognize_format(&self, _image: &PageImage) -> Result<Vec<FormatSuggestion>> {
        let response = self.format.as_deref().ok_or_else(|| Self::missing("format"))?;
        parse_format(response)
    }
}
