//! Synthetic load driver for a relational store.
//!
//! Generates fact rows, submits them in transactional batches, runs
//! update/retention maintenance against a plain or day-partitioned table and
//! times point lookups. Everything runs sequentially over one [`Store`]
//! connection.
//!
//! Binaries:
//! - `db_job_bench`: insert / update / retention maintenance job
//! - `partition_bench`: day partition create / fill / expire cycle
//! - `query_bench`: timed point lookups
//! - `kv_bench`: key/value insert and select latency sweep

pub mod config;
pub mod constants;
pub mod error;
pub mod generator;
pub mod ident;
pub mod job;
pub mod kv;
pub mod partition;
pub mod query;
pub mod record;
pub mod report;
pub mod retention;
pub mod store;
pub mod submit;
pub mod update;

pub use error::{Error, Result};
pub use ident::Ident;
pub use record::{Payload, Record};
pub use store::Store;
