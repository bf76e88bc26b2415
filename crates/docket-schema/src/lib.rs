//! Aggregates, persistence, and query specifications for `docket`.
//!
//! This crate has no knowledge of workers or polling; it models the two
//! aggregates (`Task`, `Schedule`) and the repository layer that persists
//! them with optimistic concurrency. See the `docket` crate for the
//! services and background workers built on top.

pub mod db;
pub mod mapper;
pub mod repository;
pub mod retry_policy;
pub mod schedule;
pub mod specification;
pub mod task;

pub use retry_policy::RetryPolicy;
pub use schedule::Schedule;
pub use task::Task;
