//! Data layer: request types, projection, sources, and the loader.
//!
//! Architecture:
//! ```text
//!   LoadRequest (mode, neighborhoods, columns)
//!        │
//!        ▼
//!   ┌──────────────┐
//!   │ DatasetLoader │  guard → cache → projection + row filter
//!   └──────────────┘
//!        │  ReadPlan
//!        ▼
//!   ┌─────────────┐
//!   │ TableSource  │  .parquet / .csv / in-memory batch
//!   └─────────────┘
//!        │
//!        ▼
//!      Table (Arrow RecordBatch)
//! ```

pub mod filter;
pub mod loader;
pub mod model;
pub mod schema;
pub mod source;
