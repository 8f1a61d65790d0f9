use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use arrow::array::ArrayRef;
use arrow::datatypes::SchemaRef;
use arrow::record_batch::RecordBatch;
use arrow::util::pretty::pretty_format_batches;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::LoadError;

// ---------------------------------------------------------------------------
// LoadMode – how much of the dataset a load materializes
// ---------------------------------------------------------------------------

/// The three load strategies for the property dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadMode {
    /// Fixed column allow-list, every row.
    Essential,
    /// Same allow-list, only rows whose neighborhood is in the filter keys.
    #[serde(alias = "neighborhood-filtered")]
    Neighborhood,
    /// Every column, every row. Guarded.
    Full,
}

impl LoadMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoadMode::Essential => "essential",
            LoadMode::Neighborhood => "neighborhood",
            LoadMode::Full => "full",
        }
    }
}

impl fmt::Display for LoadMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LoadMode {
    type Err = LoadError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "essential" => Ok(LoadMode::Essential),
            "neighborhood" | "neighborhood-filtered" => Ok(LoadMode::Neighborhood),
            "full" => Ok(LoadMode::Full),
            other => Err(LoadError::InvalidRequest(format!("unknown load mode '{other}'"))),
        }
    }
}

// ---------------------------------------------------------------------------
// LoadRequest – one call's worth of parameters
// ---------------------------------------------------------------------------

/// Parameters of a single load. Built per call, never stored.
///
/// Filter keys are neighborhood names. They are trimmed and upper-cased on the
/// way in, since the registry spells them `CENTRO`, `SAVASSI`, ...; blank keys
/// are dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadRequest {
    pub mode: LoadMode,
    pub filter_keys: Vec<String>,
    pub requested_columns: Option<BTreeSet<String>>,
}

impl LoadRequest {
    pub fn new<I, S>(mode: LoadMode, filter_keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let filter_keys = filter_keys
            .into_iter()
            .filter_map(|k| normalize_key(k.as_ref()))
            .collect();
        Self {
            mode,
            filter_keys,
            requested_columns: None,
        }
    }

    pub fn essential() -> Self {
        Self::new(LoadMode::Essential, Vec::<String>::new())
    }

    pub fn full() -> Self {
        Self::new(LoadMode::Full, Vec::<String>::new())
    }

    pub fn neighborhood<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::new(LoadMode::Neighborhood, keys)
    }

    /// Narrow the mode's projection to the given columns.
    pub fn with_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.requested_columns = Some(columns.into_iter().map(Into::into).collect());
        self
    }

    /// Check the request's own invariants (independent of any source).
    pub fn validate(&self) -> Result<(), LoadError> {
        if self.mode == LoadMode::Neighborhood && self.filter_keys.is_empty() {
            return Err(LoadError::InvalidRequest(
                "neighborhood mode needs at least one neighborhood".into(),
            ));
        }
        if let Some(cols) = &self.requested_columns {
            if cols.is_empty() {
                return Err(LoadError::InvalidRequest(
                    "requested column set is empty".into(),
                ));
            }
        }
        Ok(())
    }

    /// Distinct filter keys in sorted order.
    pub fn sorted_keys(&self) -> BTreeSet<String> {
        self.filter_keys.iter().cloned().collect()
    }

    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::of(self)
    }
}

pub(crate) fn normalize_key(raw: &str) -> Option<String> {
    let key = raw.trim();
    if key.is_empty() {
        None
    } else {
        Some(key.to_uppercase())
    }
}

// ---------------------------------------------------------------------------
// Fingerprint – cache key derived from a request
// ---------------------------------------------------------------------------

/// Deterministic cache key. JSON-encoded so no key or column name can collide
/// with a separator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Filter keys only count in neighborhood mode; the other modes ignore them.
    pub fn of(request: &LoadRequest) -> Self {
        let keys: Vec<String> = match request.mode {
            LoadMode::Neighborhood => request.sorted_keys().into_iter().collect(),
            LoadMode::Essential | LoadMode::Full => Vec::new(),
        };
        let value = json!({
            "mode": request.mode.as_str(),
            "keys": keys,
            "columns": request.requested_columns,
        });
        Fingerprint(value.to_string())
    }

    /// Key for lookups that are not table loads (distinct-value lists).
    pub fn derived(kind: &str, column: &str, keys: &BTreeSet<String>) -> Self {
        let value = json!({
            "derived": kind,
            "column": column,
            "keys": keys,
        });
        Fingerprint(value.to_string())
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Table – the materialized result of a load
// ---------------------------------------------------------------------------

/// A loaded slice of the dataset. Cloning only bumps Arrow reference counts.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    batch: RecordBatch,
}

impl Table {
    pub fn new(batch: RecordBatch) -> Self {
        Self { batch }
    }

    pub fn batch(&self) -> &RecordBatch {
        &self.batch
    }

    pub fn schema(&self) -> SchemaRef {
        self.batch.schema()
    }

    pub fn num_rows(&self) -> usize {
        self.batch.num_rows()
    }

    pub fn num_columns(&self) -> usize {
        self.batch.num_columns()
    }

    pub fn is_empty(&self) -> bool {
        self.batch.num_rows() == 0
    }

    pub fn column_names(&self) -> Vec<String> {
        self.batch
            .schema()
            .fields()
            .iter()
            .map(|f| f.name().clone())
            .collect()
    }

    pub fn column(&self, name: &str) -> Option<&ArrayRef> {
        self.batch.column_by_name(name)
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match pretty_format_batches(std::slice::from_ref(&self.batch)) {
            Ok(rendered) => write!(f, "{rendered}"),
            Err(e) => write!(f, "<table not printable: {e}>"),
        }
    }
}

// ---------------------------------------------------------------------------
// DatasetSummary – headline numbers for the whole source
// ---------------------------------------------------------------------------

/// How many neighborhoods a summary lists.
pub const SUMMARY_TOP_NEIGHBORHOODS: usize = 20;

/// Statistic columns absent from the source count as zero / empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DatasetSummary {
    pub total_rows: usize,
    pub total_columns: usize,
    /// Distinct property ids.
    pub unique_properties: usize,
    /// Distinct owner documents.
    pub unique_owners: usize,
    /// Rows per construction type, count descending then name ascending.
    pub property_types: Vec<(String, usize)>,
    /// Most populated neighborhoods, same order.
    pub neighborhoods: Vec<(String, usize)>,
}
