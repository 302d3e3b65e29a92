//! Replays a build manifest against the live site.
//!
//! Every endpoint is requested once by a bounded pool of workers and its
//! status and body digest compared with what the build recorded. Mismatches
//! and transport errors become failing [`CheckResult`]s; only problems with
//! the monitor itself (bad manifest, unreadable body) are [`MonitorError`]s.

use thiserror::Error;

mod probe;
mod report;
mod scheduler;

pub use probe::{CheckContext, CheckResult};
pub use report::Report;
pub use scheduler::{MAX_PARALLEL, Monitor, MonitorOptions};

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("invalid parallelism {0}: expected 1 to {max} workers", max = scheduler::MAX_PARALLEL)]
    Parallelism(usize),
    #[error("cannot build http client: {0}")]
    Client(#[source] reqwest::Error),
    #[error("invalid method {method:?} for {url}")]
    InvalidMethod { method: String, url: String },
    #[error("invalid url {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("cannot read response body url={url}: {}", probe::error_chain(source))]
    Body {
        url: String,
        source: reqwest::Error,
    },
    #[error("check worker failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
}
