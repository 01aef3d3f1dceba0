//! Offset-based pagination against rate-limited ISS endpoints.
//!
//! A [`Paginator`] walks a [`PageSource`] one page at a time until the upstream runs dry, a
//! partial page arrives, the safety ceiling is reached, a transport error occurs, or the run is
//! cancelled. Whatever was accumulated is always returned, together with a completion flag so
//! callers can tell "no more data exists" apart from "more data may exist".

use crate::error::MoexError;
use async_trait::async_trait;
use fnv::FnvHashSet;
use serde::{Deserialize, Serialize};
use std::{future::Future, hash::Hash, marker::PhantomData, time::Duration};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Batch size, safety ceiling and politeness delay for one family of endpoints.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Deserialize, Serialize)]
pub struct PageConfig {
    /// Records requested per page (`limit` query parameter).
    pub batch_size: usize,
    /// Hard upper bound on accumulated records for one run.
    pub ceiling: usize,
    /// Fixed delay between consecutive page requests.
    pub delay: Duration,
}

impl PageConfig {
    /// AlgoPack stock trade statistics.
    pub const STOCK_STATS: Self = Self::new(100, 5_000, Duration::from_millis(100));

    /// FUTOI position data.
    pub const FUTOI: Self = Self::new(100, 10_000, Duration::from_millis(50));

    /// Futures price candles.
    pub const CANDLES: Self = Self::new(500, 50_000, Duration::from_millis(50));

    pub const fn new(batch_size: usize, ceiling: usize, delay: Duration) -> Self {
        Self {
            batch_size: if batch_size == 0 { 1 } else { batch_size },
            ceiling,
            delay,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_ceiling(mut self, ceiling: usize) -> Self {
        self.ceiling = ceiling;
        self
    }
}

/// Last observed request state of a [`PageSource`], returned alongside data instead of being
/// stashed in ambient global state.
#[derive(Clone, Eq, PartialEq, Debug, Default, Deserialize, Serialize)]
pub struct Diagnostics {
    pub status: Option<u16>,
    pub url: Option<String>,
    pub error: Option<String>,
}

impl Diagnostics {
    /// Combine diagnostics of two concurrent fetches, preferring whichever recorded an error.
    pub fn or_failed(self, other: Self) -> Self {
        if self.error.is_none() && other.error.is_some() {
            other
        } else {
            self
        }
    }
}

/// Records accumulated by a running [`Paginator`] and its estimate of the total.
///
/// While pages keep arriving the estimate is one more batch than was fetched; a run that ends
/// cleanly reports `estimated == fetched`.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Default, Deserialize, Serialize)]
pub struct Progress {
    pub fetched: usize,
    pub estimated: usize,
}

/// Upstream endpoint that can be read page by page.
#[async_trait]
pub trait PageSource {
    type Item: Send;

    /// Fetch up to `limit` records starting at `offset`.
    async fn fetch_page(
        &mut self,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<Self::Item>, MoexError>;

    /// Diagnostics of the most recent request.
    fn diagnostics(&self) -> Diagnostics {
        Diagnostics::default()
    }
}

/// [`PageSource`] backed by a `(offset, limit) -> Future` closure.
pub struct PageFn<F, Item> {
    fetch: F,
    phantom: PhantomData<fn() -> Item>,
}

/// Wrap a `(offset, limit) -> Future<Output = Result<Vec<Item>, MoexError>>` closure as a
/// [`PageSource`].
pub fn page_fn<F, Fut, Item>(fetch: F) -> PageFn<F, Item>
where
    F: FnMut(usize, usize) -> Fut,
    Fut: Future<Output = Result<Vec<Item>, MoexError>>,
{
    PageFn {
        fetch,
        phantom: PhantomData,
    }
}

#[async_trait]
impl<F, Fut, Item> PageSource for PageFn<F, Item>
where
    F: FnMut(usize, usize) -> Fut + Send,
    Fut: Future<Output = Result<Vec<Item>, MoexError>> + Send,
    Item: Send,
{
    type Item = Item;

    async fn fetch_page(&mut self, offset: usize, limit: usize) -> Result<Vec<Item>, MoexError> {
        (self.fetch)(offset, limit).await
    }
}

/// Transient cursor state of one paginated run.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct PaginationCursor {
    pub offset: usize,
    pub fetched: usize,
    pub ceiling: usize,
    pub batch_size: usize,
}

impl PaginationCursor {
    fn new(config: &PageConfig) -> Self {
        Self {
            offset: 0,
            fetched: 0,
            ceiling: config.ceiling,
            batch_size: config.batch_size,
        }
    }

    fn advance(&mut self, received: usize) {
        self.offset += self.batch_size;
        self.fetched += received;
    }

    fn at_ceiling(&self) -> bool {
        self.fetched >= self.ceiling
    }
}

/// Why a paginated run stopped.
#[derive(Clone, Eq, PartialEq, Debug)]
pub enum StopReason {
    /// A page came back empty.
    Exhausted,
    /// A page came back with fewer records than requested.
    PartialPage,
    /// The safety ceiling was reached; more data may exist upstream.
    Truncated,
    /// A page request failed; records from earlier pages are kept.
    Failed(MoexError),
    /// The caller cancelled the run.
    Cancelled,
}

impl StopReason {
    pub fn is_complete(&self) -> bool {
        matches!(self, StopReason::Exhausted | StopReason::PartialPage)
    }
}

/// Output of a [`Paginator`] run.
#[derive(Clone, PartialEq, Debug)]
pub struct Paginated<T> {
    pub items: Vec<T>,
    /// `true` only if upstream signalled the end of data.
    pub completed: bool,
    pub stop: StopReason,
    /// Number of page requests that returned successfully.
    pub pages: usize,
    pub diagnostics: Diagnostics,
}

impl<T> Paginated<T> {
    pub fn map_items<U, F>(self, f: F) -> Paginated<U>
    where
        F: FnOnce(Vec<T>) -> Vec<U>,
    {
        Paginated {
            items: f(self.items),
            completed: self.completed,
            stop: self.stop,
            pages: self.pages,
            diagnostics: self.diagnostics,
        }
    }
}

/// Sequential offset paginator; one page is in flight at a time.
#[derive(Debug)]
pub struct Paginator {
    config: PageConfig,
    cancel: Option<watch::Receiver<bool>>,
    progress: Option<watch::Sender<Progress>>,
}

impl Paginator {
    pub fn new(config: PageConfig) -> Self {
        Self {
            config,
            cancel: None,
            progress: None,
        }
    }

    /// Publish [`Progress`] after every accepted page.
    pub fn with_progress(mut self, progress: watch::Sender<Progress>) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Stop issuing page requests once `cancel` observes `true`.
    pub fn with_cancel(mut self, cancel: watch::Receiver<bool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn config(&self) -> &PageConfig {
        &self.config
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|cancel| *cancel.borrow())
    }

    fn report(&self, fetched: usize, estimated: usize) {
        if let Some(progress) = &self.progress {
            progress.send_replace(Progress { fetched, estimated });
        }
    }

    /// Walk `source` to completion.
    pub async fn run<S>(&self, source: &mut S) -> Paginated<S::Item>
    where
        S: PageSource + Send,
    {
        let mut cursor = PaginationCursor::new(&self.config);
        let mut items = Vec::new();
        let mut pages = 0;

        let stop = loop {
            if self.is_cancelled() {
                debug!(offset = cursor.offset, "pagination cancelled");
                break StopReason::Cancelled;
            }

            if cursor.at_ceiling() {
                break StopReason::Truncated;
            }

            debug!(
                page = pages + 1,
                offset = cursor.offset,
                limit = cursor.batch_size,
                "fetching page"
            );

            let batch = match source.fetch_page(cursor.offset, cursor.batch_size).await {
                Ok(batch) => batch,
                Err(error) => {
                    error!(
                        %error,
                        offset = cursor.offset,
                        fetched = cursor.fetched,
                        "page request failed, returning partial data"
                    );
                    break StopReason::Failed(error);
                }
            };

            pages += 1;
            let received = batch.len();

            if received == 0 {
                break StopReason::Exhausted;
            }

            items.extend(batch);
            cursor.advance(received);

            if items.len() > cursor.ceiling {
                items.truncate(cursor.ceiling);
                break StopReason::Truncated;
            }

            self.report(items.len(), items.len() + cursor.batch_size);

            if received < cursor.batch_size {
                break StopReason::PartialPage;
            }

            if cursor.at_ceiling() {
                break StopReason::Truncated;
            }

            if !self.config.delay.is_zero() {
                tokio::time::sleep(self.config.delay).await;
            }
        };

        if stop == StopReason::Truncated {
            warn!(
                ceiling = cursor.ceiling,
                fetched = items.len(),
                "reached pagination safety ceiling, more data may exist upstream"
            );
        }

        let completed = stop.is_complete();
        if completed && !items.is_empty() {
            self.report(items.len(), items.len());
        }
        info!(records = items.len(), pages, completed, ?stop, "pagination finished");

        Paginated {
            items,
            completed,
            stop,
            pages,
            diagnostics: source.diagnostics(),
        }
    }

    /// Walk `source` to completion, keeping only the first record seen for each `key`.
    pub async fn run_dedup<S, K, F>(&self, source: &mut S, key: F) -> Paginated<S::Item>
    where
        S: PageSource + Send,
        K: Eq + Hash,
        F: Fn(&S::Item) -> K,
    {
        self.run(source)
            .await
            .map_items(|items| dedup_first_seen(items, key))
    }
}

/// Keep the first occurrence of every `key`, preserving first-seen order.
pub fn dedup_first_seen<T, K, F>(items: Vec<T>, key: F) -> Vec<T>
where
    K: Eq + Hash,
    F: Fn(&T) -> K,
{
    let before = items.len();
    let mut seen = FnvHashSet::default();
    let unique: Vec<T> = items
        .into_iter()
        .filter(|item| seen.insert(key(item)))
        .collect();

    if unique.len() < before {
        debug!(
            duplicates = before - unique.len(),
            unique = unique.len(),
            "dropped duplicate records"
        );
    }

    unique
}
