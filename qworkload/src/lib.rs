//! Statement workloads for the QUIC SQL test harness.
//!
//! A [`Workload`] maps a request index to one [`Statement`]. [`Workload::requests`] turns it
//! into a lazy [`Requests`] sequence, so callers decide how many requests to pull.

use thiserror::Error;

pub mod statement;
pub mod workload;

pub use statement::Statement;
pub use workload::{Mix, Request, Requests, Workload};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorkloadError {
    #[error("invalid table name `{0}`")]
    InvalidTable(String),
    #[error("invalid key prefix `{0}`")]
    InvalidKeyPrefix(String),
    #[error("unknown workload mix `{0}`, expected one of alternate, insert-only, select-only")]
    UnknownMix(String),
}
