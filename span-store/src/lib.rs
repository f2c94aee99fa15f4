//! Postgres storage for distributed traces.
//!
//! [`store::Store`] exposes the read, write and dependency capabilities a
//! transport needs. Below it, [`codec`] turns span fields into their stored
//! forms and [`database`] holds one function per SQL statement.
//! [`background_tasks`] carries the retention cleaner and the metric sampler.

pub mod admin;
pub mod background_tasks;
pub mod codec;
pub mod config;
pub mod database;
pub mod logging;
pub mod metrics;
pub mod store;

pub use store::{DependencyReader, SpanReader, SpanWriter, Store, StoreError};
