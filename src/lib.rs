//! Mode-aware loader for the property registry dataset.
//!
//! ```no_run
//! use megaset::{DatasetLoader, LoadRequest, LoaderConfig, open_source};
//!
//! let source = open_source("mega_data_set.parquet".as_ref())?;
//! let loader = DatasetLoader::new(source, &LoaderConfig::default());
//! let centro = loader.load(&LoadRequest::neighborhood(["CENTRO"]))?;
//! println!("{centro}");
//! # Ok::<(), megaset::LoadError>(())
//! ```

pub mod cache;
pub mod clock;
pub mod config;
pub mod data;
pub mod error;
pub mod guard;

pub use cache::{CacheStats, ResultCache};
pub use config::LoaderConfig;
pub use data::loader::DatasetLoader;
pub use data::model::{DatasetSummary, Fingerprint, LoadMode, LoadRequest, Table};
pub use data::source::{CsvSource, MemorySource, ParquetSource, ReadPlan, TableSource, open_source};
pub use error::LoadError;
pub use guard::{EnvironmentGuard, ExecutionContext};
