use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use arrow::array::{ArrayRef, StringBuilder};
use arrow::compute::{concat_batches, filter_record_batch};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use arrow::error::ArrowError;
use arrow::record_batch::{RecordBatch, RecordBatchReader};
use parquet::arrow::ProjectionMask;
use parquet::arrow::arrow_reader::{
    ArrowPredicate, ArrowPredicateFn, ParquetRecordBatchReaderBuilder, RowFilter,
};

use super::filter::KeyFilter;
use crate::error::LoadError;

// ---------------------------------------------------------------------------
// Read plan and the storage seam
// ---------------------------------------------------------------------------

/// What a single read should materialize.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReadPlan {
    /// Columns to return, in this order. `None` returns every column.
    pub columns: Option<Vec<String>>,
    /// Row predicate evaluated before rows are materialized.
    pub filter: Option<KeyFilter>,
}

/// A tabular store able to project columns and push a row predicate down.
///
/// Implementations must not mutate the underlying data.
pub trait TableSource: Send + Sync {
    /// Short human-readable origin, used in logs.
    fn describe(&self) -> String;

    fn schema(&self) -> Result<SchemaRef, LoadError>;

    fn read(&self, plan: &ReadPlan) -> Result<RecordBatch, LoadError>;
}

impl<T: TableSource + ?Sized> TableSource for Box<T> {
    fn describe(&self) -> String {
        (**self).describe()
    }

    fn schema(&self) -> Result<SchemaRef, LoadError> {
        (**self).schema()
    }

    fn read(&self, plan: &ReadPlan) -> Result<RecordBatch, LoadError> {
        (**self).read(plan)
    }
}

impl<T: TableSource + ?Sized> TableSource for Arc<T> {
    fn describe(&self) -> String {
        (**self).describe()
    }

    fn schema(&self) -> Result<SchemaRef, LoadError> {
        (**self).schema()
    }

    fn read(&self, plan: &ReadPlan) -> Result<RecordBatch, LoadError> {
        (**self).read(plan)
    }
}

/// Open a dataset file.  Dispatch by extension.
///
/// Supported formats:
/// * `.parquet` – projection and row filter are pushed into the reader (recommended)
/// * `.csv`     – header row; every column read as text
pub fn open_source(path: &Path) -> Result<Box<dyn TableSource>, LoadError> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    match ext.as_str() {
        "parquet" | "pq" => Ok(Box::new(ParquetSource::new(path))),
        "csv" => Ok(Box::new(CsvSource::new(path))),
        other => Err(LoadError::InvalidRequest(format!(
            "unsupported file extension: .{other}"
        ))),
    }
}

/// Reorder (and narrow) a batch to exactly `columns`.
pub(crate) fn select_columns(batch: &RecordBatch, columns: &[String]) -> Result<RecordBatch, ArrowError> {
    let schema = batch.schema();
    let indices = columns
        .iter()
        .map(|c| schema.index_of(c))
        .collect::<Result<Vec<_>, _>>()?;
    batch.project(&indices)
}

// ---------------------------------------------------------------------------
// Parquet source
// ---------------------------------------------------------------------------

/// Parquet file on disk, as written by pandas `df.to_parquet()` or polars.
///
/// Only the projected column chunks are decoded, and the key predicate runs
/// on the filter column before the other columns of a row are decoded.
#[derive(Debug, Clone)]
pub struct ParquetSource {
    path: PathBuf,
}

impl ParquetSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn open(&self) -> Result<ParquetRecordBatchReaderBuilder<File>> {
        let file = File::open(&self.path)
            .with_context(|| format!("opening parquet file {}", self.path.display()))?;
        ParquetRecordBatchReaderBuilder::try_new(file).context("reading parquet metadata")
    }

    fn read_batches(&self, plan: &ReadPlan) -> Result<RecordBatch> {
        let mut builder = self.open()?;
        let file_schema = builder.schema().clone();

        if let Some(columns) = &plan.columns {
            let indices = columns
                .iter()
                .map(|c| {
                    file_schema
                        .index_of(c)
                        .with_context(|| format!("parquet file missing '{c}' column"))
                })
                .collect::<Result<Vec<_>>>()?;
            let mask = ProjectionMask::roots(builder.parquet_schema(), indices);
            builder = builder.with_projection(mask);
        }

        if let Some(filter) = &plan.filter {
            let idx = file_schema
                .index_of(&filter.column)
                .with_context(|| format!("parquet file missing '{}' column", filter.column))?;
            let mask = ProjectionMask::roots(builder.parquet_schema(), [idx]);
            let key_filter = filter.clone();
            let predicate = ArrowPredicateFn::new(mask, move |batch: RecordBatch| {
                key_filter.mask(batch.column(0).as_ref())
            });
            let predicates: Vec<Box<dyn ArrowPredicate>> = vec![Box::new(predicate)];
            builder = builder.with_row_filter(RowFilter::new(predicates));
        }

        let reader = builder.build().context("building parquet reader")?;
        let out_schema = reader.schema();
        let batches = reader
            .collect::<Result<Vec<_>, ArrowError>>()
            .context("reading parquet record batch")?;
        let batch = concat_batches(&out_schema, &batches).context("concatenating record batches")?;

        match &plan.columns {
            Some(columns) => select_columns(&batch, columns).context("ordering projected columns"),
            None => Ok(batch),
        }
    }
}

impl TableSource for ParquetSource {
    fn describe(&self) -> String {
        format!("parquet:{}", self.path.display())
    }

    fn schema(&self) -> Result<SchemaRef, LoadError> {
        self.open()
            .map(|builder| builder.schema().clone())
            .map_err(LoadError::upstream)
    }

    fn read(&self, plan: &ReadPlan) -> Result<RecordBatch, LoadError> {
        self.read_batches(plan).map_err(LoadError::upstream)
    }
}

// ---------------------------------------------------------------------------
// CSV source
// ---------------------------------------------------------------------------

/// CSV layout: header row with column names, one property per record.
/// Every column is exposed as nullable UTF-8; empty cells are null.
///
/// Records are streamed and the predicate is checked before a row is copied
/// into the output builders, so unmatched rows are never materialized.
#[derive(Debug, Clone)]
pub struct CsvSource {
    path: PathBuf,
}

impl CsvSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn reader(&self) -> Result<csv::Reader<File>> {
        csv::Reader::from_path(&self.path)
            .with_context(|| format!("opening CSV {}", self.path.display()))
    }

    fn headers(reader: &mut csv::Reader<File>) -> Result<Vec<String>> {
        Ok(reader
            .headers()
            .context("reading CSV headers")?
            .iter()
            .map(|h| h.trim().to_string())
            .collect())
    }

    fn read_records(&self, plan: &ReadPlan) -> Result<RecordBatch> {
        let mut reader = self.reader()?;
        let headers = Self::headers(&mut reader)?;

        let position = |name: &str| {
            headers
                .iter()
                .position(|h| h == name)
                .with_context(|| format!("CSV missing '{name}' column"))
        };

        let selected: Vec<(usize, String)> = match &plan.columns {
            Some(columns) => columns
                .iter()
                .map(|c| Ok((position(c)?, c.clone())))
                .collect::<Result<_>>()?,
            None => headers.iter().cloned().enumerate().collect(),
        };
        if selected.is_empty() {
            bail!("CSV read selected no columns");
        }
        let filter = match &plan.filter {
            Some(f) => Some((position(&f.column)?, f)),
            None => None,
        };

        let mut builders: Vec<StringBuilder> =
            selected.iter().map(|_| StringBuilder::new()).collect();

        for (row_no, result) in reader.records().enumerate() {
            let record = result.with_context(|| format!("CSV row {row_no}"))?;

            if let Some((idx, f)) = filter {
                if !f.matches(record.get(idx).unwrap_or("")) {
                    continue;
                }
            }

            for ((col_idx, _), builder) in selected.iter().zip(builders.iter_mut()) {
                match record.get(*col_idx) {
                    Some(value) if !value.is_empty() => builder.append_value(value),
                    _ => builder.append_null(),
                }
            }
        }

        let schema = Arc::new(utf8_schema(selected.iter().map(|(_, name)| name.as_str())));
        let arrays: Vec<ArrayRef> = builders
            .iter_mut()
            .map(|b| Arc::new(b.finish()) as ArrayRef)
            .collect();
        RecordBatch::try_new(schema, arrays).context("assembling CSV record batch")
    }
}

fn utf8_schema<'a>(names: impl Iterator<Item = &'a str>) -> Schema {
    Schema::new(
        names
            .map(|n| Field::new(n, DataType::Utf8, true))
            .collect::<Vec<_>>(),
    )
}

impl TableSource for CsvSource {
    fn describe(&self) -> String {
        format!("csv:{}", self.path.display())
    }

    fn schema(&self) -> Result<SchemaRef, LoadError> {
        let headers = self
            .reader()
            .and_then(|mut r| Self::headers(&mut r))
            .map_err(LoadError::upstream)?;
        Ok(Arc::new(utf8_schema(headers.iter().map(String::as_str))))
    }

    fn read(&self, plan: &ReadPlan) -> Result<RecordBatch, LoadError> {
        self.read_records(plan).map_err(LoadError::upstream)
    }
}

// ---------------------------------------------------------------------------
// In-memory source
// ---------------------------------------------------------------------------

/// A single Arrow batch already in memory (e.g. handed over by another
/// component). Filtering and projection run with Arrow compute kernels.
#[derive(Debug, Clone)]
pub struct MemorySource {
    batch: RecordBatch,
}

impl MemorySource {
    pub fn new(batch: RecordBatch) -> Self {
        Self { batch }
    }

    fn read_batch(&self, plan: &ReadPlan) -> Result<RecordBatch> {
        let mut batch = self.batch.clone();
        if let Some(filter) = &plan.filter {
            let column = batch
                .column_by_name(&filter.column)
                .with_context(|| format!("batch missing '{}' column", filter.column))?;
            let mask = filter.mask(column.as_ref()).context("evaluating row filter")?;
            batch = filter_record_batch(&batch, &mask).context("filtering batch")?;
        }
        match &plan.columns {
            Some(columns) => select_columns(&batch, columns).context("projecting batch"),
            None => Ok(batch),
        }
    }
}

impl TableSource for MemorySource {
    fn describe(&self) -> String {
        format!("memory:{} rows", self.batch.num_rows())
    }

    fn schema(&self) -> Result<SchemaRef, LoadError> {
        Ok(self.batch.schema())
    }

    fn read(&self, plan: &ReadPlan) -> Result<RecordBatch, LoadError> {
        self.read_batch(plan).map_err(LoadError::upstream)
    }
}
