//! Fact rows and their composite identity

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use super::attributes::Attributes;
use crate::utils::time::parse_date;

/// Columns forming the natural key of a fact
pub const IDENTITY_COLUMNS: [&str; 5] = [
    "region_id",
    "date",
    "metric_name",
    "data_source",
    "attributes",
];

/// Natural key used before sources could attach attribute documents
pub const LEGACY_IDENTITY_COLUMNS: [&str; 3] = ["region_id", "date", "metric_name"];

/// Name given to the identity constraint of a freshly created fact table
pub fn identity_constraint_name(table: &str) -> String {
    format!("{}_identity_key", table)
}

/// Owned copy of [`IDENTITY_COLUMNS`]
pub fn identity_columns() -> Vec<String> {
    IDENTITY_COLUMNS.iter().map(|c| c.to_string()).collect()
}

/// What happens when an incoming row's identity already exists
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictPolicy {
    /// Existing row wins; the new row is dropped and counted
    #[default]
    Ignore,
    /// New `metric_value` overwrites the existing row
    Replace,
}

impl fmt::Display for ConflictPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ignore => write!(f, "ignore"),
            Self::Replace => write!(f, "replace"),
        }
    }
}

impl FromStr for ConflictPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ignore" => Ok(Self::Ignore),
            "replace" => Ok(Self::Replace),
            _ => Err(format!(
                "Invalid conflict policy '{}'. Valid options: ignore, replace",
                s
            )),
        }
    }
}

/// The 5-tuple that is unique across the whole fact table
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FactIdentity {
    pub region_id: String,
    pub date: NaiveDate,
    pub metric_name: String,
    pub data_source: String,
    pub attributes: Attributes,
}

impl fmt::Display for FactIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({}, {}, {}, {}, {})",
            self.region_id, self.date, self.metric_name, self.data_source, self.attributes
        )
    }
}

/// One validated observation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactRow {
    pub region_id: String,
    pub date: NaiveDate,
    pub metric_name: String,
    pub data_source: String,
    /// `None` only when the source explicitly reports "no data"
    pub metric_value: Option<f64>,
    #[serde(default)]
    pub attributes: Attributes,
}

impl FactRow {
    pub fn new(
        region_id: impl Into<String>,
        date: NaiveDate,
        metric_name: impl Into<String>,
        data_source: impl Into<String>,
        metric_value: Option<f64>,
    ) -> Self {
        Self {
            region_id: region_id.into(),
            date,
            metric_name: metric_name.into(),
            data_source: data_source.into(),
            metric_value,
            attributes: Attributes::default(),
        }
    }

    pub fn with_attributes(mut self, attributes: Attributes) -> Self {
        self.attributes = attributes;
        self
    }

    pub fn identity(&self) -> FactIdentity {
        FactIdentity {
            region_id: self.region_id.clone(),
            date: self.date,
            metric_name: self.metric_name.clone(),
            data_source: self.data_source.clone(),
            attributes: self.attributes.clone(),
        }
    }

    /// Text form of a column value as the unique index sees it.
    ///
    /// `None` means SQL NULL (or a column this row does not carry); NULLs
    /// never collide under a unique constraint.
    pub fn column_value(&self, column: &str) -> Option<String> {
        match column {
            "region_id" => Some(self.region_id.clone()),
            "date" => Some(self.date.to_string()),
            "metric_name" => Some(self.metric_name.clone()),
            "data_source" => Some(self.data_source.clone()),
            "metric_value" => self.metric_value.map(|v| v.to_string()),
            "attributes" => Some(self.attributes.canonical()),
            _ => None,
        }
    }
}

/// An observation as delivered by an ingestion collaborator, before validation
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct IncomingFact {
    pub region_id: Option<String>,
    pub date: Option<String>,
    pub metric_name: Option<String>,
    pub data_source: Option<String>,
    pub metric_value: Option<f64>,
    #[serde(default)]
    pub attributes: JsonValue,
}

impl IncomingFact {
    /// Validate into a [`FactRow`], naming the offending field on failure.
    ///
    /// `default_source` fills `data_source` for single-source jobs.
    pub fn validate(self, default_source: Option<&str>) -> Result<FactRow, String> {
        let region_id = required("region_id", self.region_id)?;
        let date_text = required("date", self.date)?;
        let metric_name = required("metric_name", self.metric_name)?;
        let data_source = required(
            "data_source",
            self.data_source.or_else(|| default_source.map(str::to_string)),
        )?;

        let date = parse_date(&date_text)
            .ok_or_else(|| format!("invalid date '{}', expected YYYY-MM-DD", date_text))?;

        if let Some(v) = self.metric_value
            && !v.is_finite()
        {
            return Err(format!("metric_value must be finite, got {}", v));
        }

        let attributes = Attributes::from_json(self.attributes)?;

        Ok(FactRow {
            region_id,
            date,
            metric_name,
            data_source,
            metric_value: self.metric_value,
            attributes,
        })
    }
}

fn required(field: &str, value: Option<String>) -> Result<String, String> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v.trim().to_string()),
        _ => Err(format!("missing {}", field)),
    }
}
