//! Per-crawl state

use crate::crawler::gate::RequestGate;
use crate::rules::Listing;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// State owned by a single `crawl` call
///
/// Holds the cancellation token, the identities of every listing admitted
/// so far, and the request gate shared by the tasks of the detail phase.
/// Nothing here outlives the crawl.
#[derive(Debug)]
pub struct CrawlSession {
    cancel: CancellationToken,
    seen: HashSet<String>,
    gate: Arc<RequestGate>,
    started_at: DateTime<Utc>,
    started: Instant,
}

impl CrawlSession {
    pub fn new(cancel: CancellationToken, request_interval: Duration) -> Self {
        Self {
            cancel,
            seen: HashSet::new(),
            gate: Arc::new(RequestGate::new(request_interval)),
            started_at: Utc::now(),
            started: Instant::now(),
        }
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Records a listing's identity; `false` if it was already admitted
    pub fn admit(&mut self, listing: &Listing) -> bool {
        self.seen.insert(listing.key())
    }

    pub fn seen_count(&self) -> usize {
        self.seen.len()
    }

    pub fn gate(&self) -> &Arc<RequestGate> {
        &self.gate
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}
