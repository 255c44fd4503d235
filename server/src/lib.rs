//! MetricStore warehouse core
//!
//! Keeps a range-partitioned fact table of economic and housing metrics
//! evolvable without downtime: idempotent migration batches, yearly
//! partition provisioning, identity key propagation across partitions, and
//! policy-driven fact ingestion.

mod app;
pub mod core;
pub mod data;
pub mod domain;
pub mod utils;
