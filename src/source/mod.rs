//! Status sources: where raw readings for a target come from.

mod mysql;

pub use mysql::*;

use std::future::Future;
use std::time::Duration;
use thiserror::Error;

use crate::metrics::RawReading;
use crate::targets::Target;

/// Errors while polling one target. None of these are fatal.
#[derive(Error, Debug, Clone)]
pub enum QueryError {
    #[error("cannot connect to {target}: {message}")]
    Connection { target: String, message: String },
    #[error("{query} failed on {target}: {message}")]
    Query {
        target: String,
        query: &'static str,
        message: String,
    },
    #[error("polling {target} timed out after {timeout:?}")]
    Timeout { target: String, timeout: Duration },
}

/// Status counters and configuration variables from one poll.
#[derive(Debug, Clone, Default)]
pub struct Readings {
    pub status: RawReading,
    pub variables: RawReading,
}

/// Fetches raw readings for a target.
pub trait StatusSource: Send + Sync + 'static {
    fn fetch(&self, target: &Target) -> impl Future<Output = Result<Readings, QueryError>> + Send;
}
