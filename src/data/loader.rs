use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use arrow::array::{Array, AsArray, StringArray};
use arrow::compute::cast;
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use arrow::error::ArrowError;
use arrow::record_batch::RecordBatch;
use log::{debug, info, warn};

use super::filter::{KeyFilter, document_digits};
use super::model::{
    DatasetSummary, Fingerprint, LoadMode, LoadRequest, SUMMARY_TOP_NEIGHBORHOODS, Table,
    normalize_key,
};
use super::schema::{
    ColumnProjectionSpec, DOCUMENT_COLUMN, PROPERTY_ID_COLUMN, PROPERTY_TYPE_COLUMN,
};
use super::source::{ReadPlan, TableSource};
use crate::cache::{CacheStats, ResultCache};
use crate::clock::Clock;
use crate::config::LoaderConfig;
use crate::error::LoadError;
use crate::guard::EnvironmentGuard;

// ---------------------------------------------------------------------------
// DatasetLoader
// ---------------------------------------------------------------------------

/// Mode-aware, cached access to the property dataset behind a [`TableSource`].
///
/// Share it between threads with an `Arc`; identical concurrent loads run
/// the source read once.
pub struct DatasetLoader<S> {
    source: S,
    cache: ResultCache,
    guard: EnvironmentGuard,
    ttl: Duration,
    retry_backoff: Duration,
    neighborhood_column: String,
}

impl<S: TableSource> DatasetLoader<S> {
    pub fn new(source: S, config: &LoaderConfig) -> Self {
        Self::with_cache(source, config, ResultCache::new(config.cache_capacity))
    }

    /// Same as [`DatasetLoader::new`] but expiring entries against `clock`.
    pub fn with_clock(source: S, config: &LoaderConfig, clock: Arc<dyn Clock>) -> Self {
        Self::with_cache(
            source,
            config,
            ResultCache::with_clock(config.cache_capacity, clock),
        )
    }

    fn with_cache(source: S, config: &LoaderConfig, cache: ResultCache) -> Self {
        Self {
            source,
            cache,
            guard: EnvironmentGuard::new(config.execution_context),
            ttl: config.cache_ttl(),
            retry_backoff: config.retry_backoff(),
            neighborhood_column: config.neighborhood_column.clone(),
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Load a slice of the dataset.
    ///
    /// The guard runs before anything else, so a refused `full` load never
    /// reaches the cache or the source.
    pub fn load(&self, request: &LoadRequest) -> Result<Table, LoadError> {
        request.validate()?;
        self.guard.check(request.mode)?;
        let fingerprint = request.fingerprint();
        self.cache
            .get_or_compute(&fingerprint, self.ttl, || self.fetch(request))
    }

    /// String-typed entry point: `load_named("neighborhood", ["CENTRO"])`.
    pub fn load_named<I, K>(&self, mode: &str, filter_keys: I) -> Result<Table, LoadError>
    where
        I: IntoIterator<Item = K>,
        K: AsRef<str>,
    {
        let mode: LoadMode = mode.parse()?;
        self.load(&LoadRequest::new(mode, filter_keys))
    }

    /// Column names and types of the underlying source.
    pub fn schema(&self) -> Result<SchemaRef, LoadError> {
        self.with_retry("schema", || self.source.schema())
    }

    /// Sorted distinct neighborhoods present in the source.
    pub fn neighborhoods(&self) -> Result<Vec<String>, LoadError> {
        let column = self.neighborhood_column.clone();
        self.column_values(&column, Vec::<String>::new())
    }

    /// Sorted distinct non-empty values of `column`, restricted to the given
    /// neighborhoods when any are passed.
    pub fn column_values<I, K>(&self, column: &str, neighborhoods: I) -> Result<Vec<String>, LoadError>
    where
        I: IntoIterator<Item = K>,
        K: AsRef<str>,
    {
        let keys = LoadRequest::neighborhood(neighborhoods).sorted_keys();
        let fingerprint = Fingerprint::derived("distinct", column, &keys);
        let table = self.cache.get_or_compute(&fingerprint, self.ttl, || {
            self.fetch_distinct(column, &keys)
        })?;
        Ok(table
            .batch()
            .column(0)
            .as_string::<i32>()
            .iter()
            .flatten()
            .map(str::to_string)
            .collect())
    }

    /// Every property owned by one document holder, essential columns only.
    ///
    /// `document` may be formatted (`017.564.611-34`) or bare; only its digits
    /// are compared. No match is an empty table.
    pub fn properties_for_document(&self, document: &str) -> Result<Table, LoadError> {
        let digits = document_digits(document);
        if digits.is_empty() {
            return Err(LoadError::InvalidRequest(format!(
                "document '{document}' contains no digits"
            )));
        }
        let fingerprint =
            Fingerprint::derived("document", DOCUMENT_COLUMN, &BTreeSet::from([digits.clone()]));
        self.cache
            .get_or_compute(&fingerprint, self.ttl, || self.fetch_document(&digits))
    }

    /// Headline numbers for the whole source, from one projected read.
    pub fn summary(&self) -> Result<DatasetSummary, LoadError> {
        let schema = self.schema()?;
        self.require_columns(&schema, [self.neighborhood_column.as_str()])?;

        let mut columns = vec![self.neighborhood_column.clone()];
        for stat in [PROPERTY_ID_COLUMN, DOCUMENT_COLUMN, PROPERTY_TYPE_COLUMN] {
            if stat != self.neighborhood_column && schema.index_of(stat).is_ok() {
                columns.push(stat.to_string());
            }
        }
        let plan = ReadPlan {
            columns: Some(columns),
            filter: None,
        };
        let batch = self.with_retry("summary read", || self.source.read(&plan))?;

        let mut neighborhoods = ranked(&batch, &self.neighborhood_column, normalize_key)?;
        neighborhoods.truncate(SUMMARY_TOP_NEIGHBORHOODS);
        let property_types = ranked(&batch, PROPERTY_TYPE_COLUMN, trimmed)?;
        let unique_properties = distinct_count(&batch, PROPERTY_ID_COLUMN, trimmed)?;
        let unique_owners = distinct_count(&batch, DOCUMENT_COLUMN, |v| {
            Some(document_digits(v)).filter(|d| !d.is_empty())
        })?;

        Ok(DatasetSummary {
            total_rows: batch.num_rows(),
            total_columns: schema.fields().len(),
            unique_properties,
            unique_owners,
            property_types,
            neighborhoods,
        })
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
        info!("dataset cache cleared");
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    // -- miss path --

    fn fetch(&self, request: &LoadRequest) -> Result<Table, LoadError> {
        let started = Instant::now();
        let schema = self.schema()?;

        let projection = ColumnProjectionSpec::for_mode(request.mode);
        projection.validate(&schema)?;
        let columns = projection.resolve(&schema, request.requested_columns.as_ref())?;

        let filter = match request.mode {
            LoadMode::Neighborhood => {
                self.require_columns(&schema, [self.neighborhood_column.as_str()])?;
                Some(KeyFilter::new(
                    self.neighborhood_column.as_str(),
                    request.sorted_keys(),
                ))
            }
            LoadMode::Essential | LoadMode::Full => None,
        };

        let plan = ReadPlan { columns, filter };
        debug!("{} load plan against {}: {plan:?}", request.mode, self.source.describe());
        let batch = self.with_retry("read", || self.source.read(&plan))?;
        let table = Table::new(batch);

        info!(
            "{} load from {}: {} rows x {} columns in {:?}",
            request.mode,
            self.source.describe(),
            table.num_rows(),
            table.num_columns(),
            started.elapsed()
        );
        Ok(table)
    }

    fn fetch_document(&self, digits: &str) -> Result<Table, LoadError> {
        let started = Instant::now();
        let schema = self.schema()?;

        let projection = ColumnProjectionSpec::for_mode(LoadMode::Essential);
        projection.validate(&schema)?;
        let plan = ReadPlan {
            columns: projection.resolve(&schema, None)?,
            filter: Some(KeyFilter::document(DOCUMENT_COLUMN, digits)),
        };
        let batch = self.with_retry("document read", || self.source.read(&plan))?;
        let table = Table::new(batch);

        info!(
            "document lookup against {}: {} properties in {:?}",
            self.source.describe(),
            table.num_rows(),
            started.elapsed()
        );
        Ok(table)
    }

    fn fetch_distinct(&self, column: &str, keys: &BTreeSet<String>) -> Result<Table, LoadError> {
        let schema = self.schema()?;
        self.require_columns(&schema, [column])?;
        let filter = if keys.is_empty() {
            None
        } else {
            self.require_columns(&schema, [self.neighborhood_column.as_str()])?;
            Some(KeyFilter::new(self.neighborhood_column.as_str(), keys.clone()))
        };
        let plan = ReadPlan {
            columns: Some(vec![column.to_string()]),
            filter,
        };
        let batch = self.with_retry("distinct read", || self.source.read(&plan))?;

        // neighborhood names are compared case-insensitively, so list them that way
        let normalize: fn(&str) -> Option<String> = if column == self.neighborhood_column {
            normalize_key
        } else {
            trimmed
        };
        let strings = as_utf8(batch.column(0).as_ref()).map_err(arrow_failure)?;
        let distinct: BTreeSet<String> = strings.iter().flatten().filter_map(normalize).collect();
        debug!("{} distinct values in '{column}'", distinct.len());

        let values = StringArray::from_iter_values(distinct);
        let schema = Arc::new(Schema::new(vec![Field::new(column, DataType::Utf8, false)]));
        RecordBatch::try_new(schema, vec![Arc::new(values)])
            .map(Table::new)
            .map_err(arrow_failure)
    }

    fn require_columns<'a>(
        &self,
        schema: &Schema,
        columns: impl IntoIterator<Item = &'a str>,
    ) -> Result<(), LoadError> {
        let missing = super::schema::missing_columns(schema, columns);
        if missing.is_empty() {
            Ok(())
        } else {
            Err(LoadError::SchemaMismatch { missing })
        }
    }

    /// Run a source operation, retrying a reader failure once after the backoff.
    fn with_retry<T>(
        &self,
        what: &str,
        mut op: impl FnMut() -> Result<T, LoadError>,
    ) -> Result<T, LoadError> {
        match op() {
            Err(err) if err.is_retryable() => {
                warn!(
                    "{what} from {} failed ({err}); retrying in {:?}",
                    self.source.describe(),
                    self.retry_backoff
                );
                thread::sleep(self.retry_backoff);
                op()
            }
            other => other,
        }
    }
}

fn as_utf8(array: &dyn Array) -> Result<StringArray, ArrowError> {
    let utf8 = cast(array, &DataType::Utf8)?;
    Ok(utf8.as_string::<i32>().clone())
}

fn arrow_failure(err: ArrowError) -> LoadError {
    LoadError::UpstreamReadFailure(err.to_string())
}

fn trimmed(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

/// Normalized non-empty cells of `column`; nothing when the batch lacks it.
fn normalized_cells(
    batch: &RecordBatch,
    column: &str,
    normalize: impl Fn(&str) -> Option<String>,
) -> Result<Vec<String>, LoadError> {
    let Some(array) = batch.column_by_name(column) else {
        return Ok(Vec::new());
    };
    let strings = as_utf8(array.as_ref()).map_err(arrow_failure)?;
    Ok(strings.iter().flatten().filter_map(normalize).collect())
}

/// Value counts, count descending then value ascending.
fn ranked(
    batch: &RecordBatch,
    column: &str,
    normalize: impl Fn(&str) -> Option<String>,
) -> Result<Vec<(String, usize)>, LoadError> {
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for value in normalized_cells(batch, column, normalize)? {
        *counts.entry(value).or_default() += 1;
    }
    let mut ranked: Vec<(String, usize)> = counts.into_iter().collect();
    // BTreeMap order is by name, and the sort is stable
    ranked.sort_by(|a, b| b.1.cmp(&a.1));
    Ok(ranked)
}

fn distinct_count(
    batch: &RecordBatch,
    column: &str,
    normalize: impl Fn(&str) -> Option<String>,
) -> Result<usize, LoadError> {
    let cells = normalized_cells(batch, column, normalize)?;
    Ok(cells.into_iter().collect::<HashSet<_>>().len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::data::schema::ESSENTIAL_COLUMNS;
    use crate::data::source::MemorySource;
    use crate::guard::ExecutionContext;
    use arrow::array::{ArrayRef, Float64Array, Int64Array};
    use parking_lot::Mutex;
    use std::sync::Barrier;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Wraps a source, counting reads and failing the first `failures` of them.
    struct CountingSource {
        inner: MemorySource,
        reads: AtomicUsize,
        failures: Mutex<usize>,
        delay: Duration,
    }

    impl CountingSource {
        fn new(batch: RecordBatch) -> Self {
            Self {
                inner: MemorySource::new(batch),
                reads: AtomicUsize::new(0),
                failures: Mutex::new(0),
                delay: Duration::ZERO,
            }
        }

        fn failing(self, failures: usize) -> Self {
            *self.failures.lock() = failures;
            self
        }

        fn slow(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }

        fn reads(&self) -> usize {
            self.reads.load(Ordering::SeqCst)
        }
    }

    impl TableSource for CountingSource {
        fn describe(&self) -> String {
            "counting".into()
        }

        fn schema(&self) -> Result<SchemaRef, LoadError> {
            self.inner.schema()
        }

        fn read(&self, plan: &ReadPlan) -> Result<RecordBatch, LoadError> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            thread::sleep(self.delay);
            let mut failures = self.failures.lock();
            if *failures > 0 {
                *failures -= 1;
                return Err(LoadError::UpstreamReadFailure("connection reset".into()));
            }
            drop(failures);
            self.inner.read(plan)
        }
    }

    const NEIGHBORHOODS: [&str; 6] = ["CENTRO", "SAVASSI", "CENTRO", "LOURDES", "SAVASSI", "CENTRO"];

    /// Six properties, the twelve essential columns plus two extras.
    fn registry_batch(without: &[&str]) -> RecordBatch {
        let n = NEIGHBORHOODS.len();
        let mut fields = Vec::new();
        let mut arrays: Vec<ArrayRef> = Vec::new();
        let extras = ["NET VALOR", "ZONA"];
        for name in ESSENTIAL_COLUMNS.iter().chain(extras.iter()) {
            if without.contains(name) {
                continue;
            }
            let array: ArrayRef = match *name {
                "BAIRRO" => Arc::new(StringArray::from(NEIGHBORHOODS.to_vec())),
                "AREA TERRENO" | "NET VALOR" => {
                    Arc::new(Float64Array::from((0..n).map(|i| 100.0 + i as f64).collect::<Vec<_>>()))
                }
                "ANO CONSTRUCAO" => {
                    Arc::new(Int64Array::from((0..n).map(|i| 1980 + i as i64).collect::<Vec<_>>()))
                }
                "TIPO CONSTRUTIVO" => Arc::new(StringArray::from(vec![
                    "CASA", "APARTAMENTO", "LOTE", "CASA", "CASA", "CASA",
                ])),
                // three owners, spelled the ways the export mixes them
                "DOCUMENTO PROPRIETARIO" => Arc::new(StringArray::from(vec![
                    "017.564.611-34",
                    "01756461134",
                    "17564611634",
                    "17564611634.0",
                    "009.467.896-06",
                    "017.564.611-34",
                ])),
                other => Arc::new(StringArray::from(
                    (0..n).map(|i| format!("{other} {i}")).collect::<Vec<_>>(),
                )),
            };
            fields.push(Field::new(*name, array.data_type().clone(), true));
            arrays.push(array);
        }
        RecordBatch::try_new(Arc::new(Schema::new(fields)), arrays).unwrap()
    }

    fn config(context: ExecutionContext) -> LoaderConfig {
        LoaderConfig {
            execution_context: context,
            retry_backoff_ms: 0,
            ..LoaderConfig::default()
        }
    }

    fn loader(source: CountingSource) -> DatasetLoader<CountingSource> {
        DatasetLoader::new(source, &config(ExecutionContext::Constrained))
    }

    #[test]
    fn essential_returns_the_allow_list_in_order() {
        let loader = loader(CountingSource::new(registry_batch(&[])));
        let table = loader.load(&LoadRequest::essential()).unwrap();
        assert_eq!(table.num_rows(), 6);
        assert_eq!(table.column_names(), ESSENTIAL_COLUMNS.map(String::from).to_vec());
    }

    #[test]
    fn essential_ignores_filter_keys() {
        let loader = loader(CountingSource::new(registry_batch(&[])));
        let table = loader
            .load(&LoadRequest::new(LoadMode::Essential, ["CENTRO"]))
            .unwrap();
        assert_eq!(table.num_rows(), 6);
        assert!(table.num_columns() <= 12);
    }

    #[test]
    fn essential_fails_on_schema_drift_without_reading() {
        let loader = loader(CountingSource::new(registry_batch(&["GEOMETRY"])));
        assert_eq!(
            loader.load(&LoadRequest::essential()),
            Err(LoadError::SchemaMismatch {
                missing: vec!["GEOMETRY".into()]
            })
        );
        assert_eq!(loader.source().reads(), 0);
    }

    #[test]
    fn neighborhood_returns_only_matching_rows() {
        let loader = loader(CountingSource::new(registry_batch(&[])));
        let table = loader.load(&LoadRequest::neighborhood(["CENTRO"])).unwrap();
        assert_eq!(table.num_rows(), 3);
        assert_eq!(table.num_columns(), 12);
        let bairros = table.column("BAIRRO").unwrap().as_string::<i32>();
        assert!(bairros.iter().all(|b| b == Some("CENTRO")));
    }

    #[test]
    fn unknown_neighborhood_is_an_empty_table_not_an_error() {
        let loader = loader(CountingSource::new(registry_batch(&[])));
        let table = loader.load(&LoadRequest::neighborhood(["NONEXISTENT"])).unwrap();
        assert!(table.is_empty());
        assert_eq!(table.num_columns(), 12);
    }

    #[test]
    fn neighborhood_without_keys_is_rejected() {
        let loader = loader(CountingSource::new(registry_batch(&[])));
        assert!(matches!(
            loader.load(&LoadRequest::neighborhood(Vec::<String>::new())),
            Err(LoadError::InvalidRequest(_))
        ));
        assert_eq!(loader.source().reads(), 0);
    }

    #[test]
    fn full_is_refused_in_constrained_context_without_reading() {
        let loader = loader(CountingSource::new(registry_batch(&[])));
        assert!(matches!(
            loader.load(&LoadRequest::full()),
            Err(LoadError::ModeDisallowed { mode: LoadMode::Full, .. })
        ));
        assert_eq!(loader.source().reads(), 0);
        assert_eq!(loader.cache_stats().misses, 0);
    }

    #[test]
    fn full_returns_every_column_when_relaxed() {
        let loader = DatasetLoader::new(
            CountingSource::new(registry_batch(&[])),
            &config(ExecutionContext::Relaxed),
        );
        let table = loader.load(&LoadRequest::full()).unwrap();
        assert_eq!(table.num_columns(), 14);
        assert_eq!(table.num_rows(), 6);

        let narrowed = loader
            .load(&LoadRequest::full().with_columns(["ZONA", "BAIRRO"]))
            .unwrap();
        assert_eq!(narrowed.column_names(), vec!["BAIRRO", "ZONA"]);
    }

    #[test]
    fn requested_columns_narrow_the_projection() {
        let loader = loader(CountingSource::new(registry_batch(&[])));
        let table = loader
            .load(&LoadRequest::neighborhood(["SAVASSI"]).with_columns(["ENDERECO", "BAIRRO"]))
            .unwrap();
        assert_eq!(table.column_names(), vec!["BAIRRO", "ENDERECO"]);
        assert_eq!(table.num_rows(), 2);

        assert!(matches!(
            loader.load(&LoadRequest::essential().with_columns(["NET VALOR"])),
            Err(LoadError::InvalidRequest(_))
        ));
    }

    #[test]
    fn repeated_load_within_ttl_reads_once() {
        let loader = loader(CountingSource::new(registry_batch(&[])));
        let first = loader.load(&LoadRequest::neighborhood(["CENTRO", "LOURDES"])).unwrap();
        let second = loader.load(&LoadRequest::neighborhood(["lourdes", "centro"])).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.num_rows(), 4);
        assert_eq!(loader.source().reads(), 1);
    }

    #[test]
    fn load_after_ttl_reads_again() {
        let clock = Arc::new(ManualClock::new());
        let loader = DatasetLoader::with_clock(
            CountingSource::new(registry_batch(&[])),
            &config(ExecutionContext::Constrained),
            clock.clone(),
        );
        loader.load(&LoadRequest::essential()).unwrap();
        clock.advance(Duration::from_secs(3600));
        loader.load(&LoadRequest::essential()).unwrap();
        assert_eq!(loader.source().reads(), 2);
    }

    #[test]
    fn upstream_failure_is_retried_once() {
        let loader = loader(CountingSource::new(registry_batch(&[])).failing(1));
        let table = loader.load(&LoadRequest::essential()).unwrap();
        assert_eq!(table.num_rows(), 6);
        assert_eq!(loader.source().reads(), 2);
    }

    #[test]
    fn persistent_failure_is_surfaced_and_not_cached() {
        let loader = loader(CountingSource::new(registry_batch(&[])).failing(2));
        assert_eq!(
            loader.load(&LoadRequest::essential()),
            Err(LoadError::UpstreamReadFailure("connection reset".into()))
        );
        assert_eq!(loader.source().reads(), 2);

        loader.load(&LoadRequest::essential()).unwrap();
        assert_eq!(loader.source().reads(), 3);
    }

    #[test]
    fn concurrent_identical_loads_read_once() {
        let source = CountingSource::new(registry_batch(&[])).slow(Duration::from_millis(50));
        let loader = Arc::new(loader(source));
        let barrier = Arc::new(Barrier::new(6));

        let handles: Vec<_> = (0..6)
            .map(|i| {
                let loader = Arc::clone(&loader);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    // alternate key order; same fingerprint
                    let keys = if i % 2 == 0 { ["CENTRO", "SAVASSI"] } else { ["SAVASSI", "CENTRO"] };
                    loader.load(&LoadRequest::neighborhood(keys))
                })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.join().unwrap().unwrap().num_rows(), 5);
        }
        assert_eq!(loader.source().reads(), 1);
    }

    #[test]
    fn load_named_parses_the_mode() {
        let loader = loader(CountingSource::new(registry_batch(&[])));
        let table = loader.load_named("neighborhood-filtered", ["centro"]).unwrap();
        assert_eq!(table.num_rows(), 3);
        assert!(matches!(
            loader.load_named("everything", ["centro"]),
            Err(LoadError::InvalidRequest(_))
        ));
    }

    #[test]
    fn neighborhoods_are_distinct_and_sorted() {
        let loader = loader(CountingSource::new(registry_batch(&[])));
        assert_eq!(loader.neighborhoods().unwrap(), vec!["CENTRO", "LOURDES", "SAVASSI"]);
        loader.neighborhoods().unwrap();
        assert_eq!(loader.source().reads(), 1);
    }

    #[test]
    fn column_values_respect_neighborhood_filter() {
        let loader = loader(CountingSource::new(registry_batch(&[])));
        assert_eq!(
            loader.column_values("TIPO CONSTRUTIVO", ["CENTRO"]).unwrap(),
            vec!["CASA", "LOTE"]
        );
        assert_eq!(
            loader.column_values("TIPO CONSTRUTIVO", Vec::<String>::new()).unwrap(),
            vec!["APARTAMENTO", "CASA", "LOTE"]
        );
        assert!(matches!(
            loader.column_values("LATITUDE", ["CENTRO"]),
            Err(LoadError::SchemaMismatch { .. })
        ));
    }

    #[test]
    fn summary_ranks_neighborhoods() {
        let loader = loader(CountingSource::new(registry_batch(&[])));
        let summary = loader.summary().unwrap();
        assert_eq!(summary.total_rows, 6);
        assert_eq!(summary.total_columns, 14);
        assert_eq!(summary.unique_properties, 6);
        assert_eq!(summary.unique_owners, 3);
        assert_eq!(
            summary.property_types,
            vec![
                ("CASA".to_string(), 4),
                ("APARTAMENTO".to_string(), 1),
                ("LOTE".to_string(), 1)
            ]
        );
        assert_eq!(
            summary.neighborhoods,
            vec![
                ("CENTRO".to_string(), 3),
                ("SAVASSI".to_string(), 2),
                ("LOURDES".to_string(), 1)
            ]
        );
    }

    #[test]
    fn neighborhood_spellings_fold_like_the_filter() {
        let bairros: ArrayRef = Arc::new(StringArray::from(vec!["centro", " CENTRO", "Savassi"]));
        let batch = RecordBatch::try_new(
            Arc::new(Schema::new(vec![Field::new("BAIRRO", DataType::Utf8, true)])),
            vec![bairros],
        )
        .unwrap();
        let loader = loader(CountingSource::new(batch));

        assert_eq!(loader.neighborhoods().unwrap(), vec!["CENTRO", "SAVASSI"]);
        let summary = loader.summary().unwrap();
        assert_eq!(
            summary.neighborhoods,
            vec![("CENTRO".to_string(), 2), ("SAVASSI".to_string(), 1)]
        );
        // statistic columns absent from the source count as nothing
        assert_eq!(summary.unique_owners, 0);
        assert!(summary.property_types.is_empty());
    }

    #[test]
    fn formatted_document_finds_every_spelling_of_it() {
        let loader = loader(CountingSource::new(registry_batch(&[])));
        let table = loader.properties_for_document("017.564.611-34").unwrap();
        assert_eq!(table.num_rows(), 3);
        assert_eq!(table.column_names(), ESSENTIAL_COLUMNS.map(String::from).to_vec());
        let addresses = table.column("ENDERECO").unwrap().as_string::<i32>();
        let got: Vec<&str> = addresses.iter().flatten().collect();
        assert_eq!(got, vec!["ENDERECO 0", "ENDERECO 1", "ENDERECO 5"]);

        // same digits, same cache entry
        loader.properties_for_document("01756461134").unwrap();
        assert_eq!(loader.source().reads(), 1);
    }

    #[test]
    fn float_typed_document_drops_the_trailing_zero() {
        let loader = loader(CountingSource::new(registry_batch(&[])));
        let table = loader.properties_for_document("17564611634.0").unwrap();
        assert_eq!(table.num_rows(), 2);
        // the leading zero keeps 017... apart from 17...
        let docs = table.column("DOCUMENTO PROPRIETARIO").unwrap().as_string::<i32>();
        assert!(docs.iter().flatten().all(|d| document_digits(d) == "17564611634"));
    }

    #[test]
    fn unknown_document_is_an_empty_table() {
        let loader = loader(CountingSource::new(registry_batch(&[])));
        let table = loader.properties_for_document("999.999.999-99").unwrap();
        assert!(table.is_empty());
        assert_eq!(table.num_columns(), 12);

        assert!(matches!(
            loader.properties_for_document("n/a"),
            Err(LoadError::InvalidRequest(_))
        ));
    }

    #[test]
    fn document_lookup_checks_the_essential_columns() {
        let loader = loader(CountingSource::new(registry_batch(&["GEOMETRY"])));
        assert_eq!(
            loader.properties_for_document("009.467.896-06"),
            Err(LoadError::SchemaMismatch {
                missing: vec!["GEOMETRY".into()]
            })
        );
        assert_eq!(loader.source().reads(), 0);
    }

    #[test]
    fn clear_cache_forces_a_fresh_read() {
        let loader = loader(CountingSource::new(registry_batch(&[])));
        loader.load(&LoadRequest::essential()).unwrap();
        loader.clear_cache();
        loader.load(&LoadRequest::essential()).unwrap();
        assert_eq!(loader.source().reads(), 2);
        assert_eq!(loader.cache_stats().size, 1);
    }
}
