//! Record source boundary and feed snapshot
//!
//! The reconciliation engine only ever sees the `RecordSource` trait and
//! the normalized records it yields. Vendor feed clients (GeoRSS, GeoJSON,
//! service-specific REST APIs) are adapted behind this boundary, and all
//! vendor exception translation happens there: a source returns an error
//! value, it never panics into the engine.

mod snapshot;
pub mod testing;

use async_trait::async_trait;
use geofeed_core::ExternalRecord;
use thiserror::Error;

pub use snapshot::FeedSnapshot;

/// Outcome of a successful poll
#[derive(Debug, Clone, PartialEq)]
pub enum FeedFetch {
    /// The feed reported its full current record set; an empty vector is a
    /// confirmed "zero current events", not a failure.
    Records(Vec<ExternalRecord>),
    /// The fetch succeeded but the feed declined to report anything new.
    /// Nothing can be concluded about the current record set.
    NoData,
}

/// Errors a record source can surface
#[derive(Debug, Clone, Error)]
pub enum SourceError {
    #[error("network error: {0}")]
    Network(String),

    #[error("upstream returned HTTP status {0}")]
    Status(u16),

    #[error("malformed upstream payload: {0}")]
    Malformed(String),
}

/// A pollable external list-valued data source
///
/// Implementations perform network I/O in `fetch`; it is the single
/// designed suspension point of a reconciliation tick.
#[async_trait]
pub trait RecordSource: Send + Sync {
    async fn fetch(&self) -> Result<FeedFetch, SourceError>;
}

#[async_trait]
impl<S: RecordSource + ?Sized> RecordSource for std::sync::Arc<S> {
    async fn fetch(&self) -> Result<FeedFetch, SourceError> {
        (**self).fetch().await
    }
}
