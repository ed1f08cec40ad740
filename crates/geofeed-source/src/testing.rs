//! Scripted record source for tests

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use geofeed_core::ExternalRecord;

use crate::{FeedFetch, RecordSource, SourceError};

/// A record source that replays a scripted sequence of poll results
///
/// Each call to `fetch` pops the next scripted response. Once the script is
/// exhausted, further fetches return `NoData` so a running scheduler loop
/// stays harmless.
#[derive(Default)]
pub struct MockRecordSource {
    script: Mutex<VecDeque<Result<FeedFetch, SourceError>>>,
    fetch_count: AtomicUsize,
}

impl MockRecordSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a successful fetch with the given records
    pub fn push_records(&self, records: Vec<ExternalRecord>) {
        self.push(Ok(FeedFetch::Records(records)));
    }

    /// Queue a successful fetch that reported nothing
    pub fn push_no_data(&self) {
        self.push(Ok(FeedFetch::NoData));
    }

    /// Queue a failed fetch
    pub fn push_error(&self, error: SourceError) {
        self.push(Err(error));
    }

    fn push(&self, response: Result<FeedFetch, SourceError>) {
        self.script
            .lock()
            .expect("script lock poisoned")
            .push_back(response);
    }

    /// How many times `fetch` has been called
    pub fn fetch_count(&self) -> usize {
        self.fetch_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RecordSource for MockRecordSource {
    async fn fetch(&self) -> Result<FeedFetch, SourceError> {
        self.fetch_count.fetch_add(1, Ordering::SeqCst);
        self.script
            .lock()
            .expect("script lock poisoned")
            .pop_front()
            .unwrap_or(Ok(FeedFetch::NoData))
    }
}
