//! Pipeline entry points over the ISS HTTP API.
//!
//! Every entry point returns its data inside a [`Fetched`] so callers can tell "no data exists"
//! (`completed = true`, empty data) from "partial data" after truncation, cancellation or a
//! transport failure (`completed = false`). Only caller misuse, such as an empty ticker, is
//! reported as an `Err`, and it is reported before any request is issued.

use crate::{
    error::MoexError,
    iss::try_decode_first_block,
    merge::{MergedPoint, OhlcBar, merge},
    paginate::{Diagnostics, PageConfig, PageSource, Paginated, Paginator, Progress},
    position::{
        FlowSummary, FutoiRow, RawPositionRecord, records_from_rows, reconcile, smart_money_flow,
    },
    ticker::{TickerNormalizer, Underlying},
};
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::marker::PhantomData;
use tokio::sync::watch;
use tracing::{info, warn};

/// [`MoexConfig`] and environment variable names.
pub mod config;

/// Wire and domain models of the stock and contract endpoints.
pub mod model;

/// [`IssTransport`] abstraction and its `reqwest` implementation.
pub mod transport;

pub use config::MoexConfig;
pub use model::{
    ActiveFuture, CandleInterval, DateRange, OrderBookStat, SecurityRow, StockRecord,
    StockSecurity, date_range,
};
pub use transport::{HttpTransport, IssResponse, IssTransport};

const STOCK_STATS_PATH: &str = "/iss/datashop/algopack/eq/tradestats.json";
const ORDER_BOOK_STATS_PATH: &str = "/iss/datashop/algopack/eq/obstats.json";
const ACTIVE_FUTURES_PATH: &str = "/iss/engines/futures/markets/forts/boards/RFUD/securities.json";
const TQBR_SECURITIES_PATH: &str = "/iss/engines/stock/markets/shares/boards/tqbr/securities.json";

/// Calendar days covered by [`MoexClient::get_stock_history`] when no range is given.
pub const STOCK_HISTORY_DAYS: u64 = 5;

/// TQBR main market board group.
const BOARD_GROUP_TQBR: &str = "57";

/// Data returned by a pipeline entry point, with its completion flag and request diagnostics.
#[derive(Clone, PartialEq, Debug, Deserialize, Serialize)]
pub struct Fetched<T> {
    pub data: T,
    /// `false` if upstream may hold more data than was returned.
    pub completed: bool,
    pub diagnostics: Diagnostics,
}

impl<T> Fetched<T> {
    pub fn map<U, F>(self, f: F) -> Fetched<U>
    where
        F: FnOnce(T) -> U,
    {
        Fetched {
            data: f(self.data),
            completed: self.completed,
            diagnostics: self.diagnostics,
        }
    }
}

impl<T> From<Paginated<T>> for Fetched<Vec<T>> {
    fn from(value: Paginated<T>) -> Self {
        Self {
            data: value.items,
            completed: value.completed,
            diagnostics: value.diagnostics,
        }
    }
}

/// Paginated ISS endpoint decoded into `Item` records.
struct IssPages<'a, T, Item> {
    transport: &'a T,
    path: String,
    params: Vec<(&'static str, String)>,
    blocks: &'static [&'static str],
    diagnostics: Diagnostics,
    phantom: PhantomData<fn() -> Item>,
}

impl<'a, T, Item> IssPages<'a, T, Item> {
    fn new(
        transport: &'a T,
        path: impl Into<String>,
        params: Vec<(&'static str, String)>,
        blocks: &'static [&'static str],
    ) -> Self {
        Self {
            transport,
            path: path.into(),
            params,
            blocks,
            diagnostics: Diagnostics::default(),
            phantom: PhantomData,
        }
    }
}

#[async_trait]
impl<'a, T, Item> PageSource for IssPages<'a, T, Item>
where
    T: IssTransport,
    Item: DeserializeOwned + Send,
{
    type Item = Item;

    async fn fetch_page(&mut self, offset: usize, limit: usize) -> Result<Vec<Item>, MoexError> {
        let mut params = self.params.clone();
        params.push(("start", offset.to_string()));
        params.push(("limit", limit.to_string()));

        match self.transport.get(&self.path, &params).await {
            Ok(response) => {
                let records = try_decode_first_block(&response.body, self.blocks);
                self.diagnostics = Diagnostics {
                    status: Some(response.status),
                    url: Some(response.url),
                    error: records.as_ref().err().map(|error| error.to_string()),
                };
                records
            }
            Err(error) => {
                self.diagnostics = diagnostics_of(&error, &self.path);
                Err(error)
            }
        }
    }

    fn diagnostics(&self) -> Diagnostics {
        self.diagnostics.clone()
    }
}

fn diagnostics_of(error: &MoexError, path: &str) -> Diagnostics {
    Diagnostics {
        status: error.status(),
        url: Some(error.url().unwrap_or(path).to_string()),
        error: Some(error.to_string()),
    }
}

fn require_ticker(ticker: &str) -> Result<&str, MoexError> {
    match ticker.trim() {
        "" => Err(MoexError::MissingTicker),
        ticker => Ok(ticker),
    }
}

/// Moscow Exchange ISS client exposing the aggregation pipeline.
#[derive(Debug)]
pub struct MoexClient<T = HttpTransport> {
    transport: T,
    config: MoexConfig,
    normalizer: TickerNormalizer,
    cancel: Option<watch::Receiver<bool>>,
}

impl MoexClient<HttpTransport> {
    /// Construct a client over HTTPS.
    pub fn new(config: MoexConfig) -> Result<Self, MoexError> {
        let transport = HttpTransport::new(&config)?;
        Ok(Self::with_transport(transport, config))
    }

    /// Construct a client over HTTPS configured from the environment.
    pub fn from_env() -> Result<Self, MoexError> {
        Self::new(MoexConfig::from_env())
    }
}

impl<T> MoexClient<T>
where
    T: IssTransport,
{
    pub fn with_transport(transport: T, config: MoexConfig) -> Self {
        Self {
            transport,
            config,
            normalizer: TickerNormalizer::default(),
            cancel: None,
        }
    }

    /// Replace the ticker root lookup table.
    pub fn with_normalizer(mut self, normalizer: TickerNormalizer) -> Self {
        self.normalizer = normalizer;
        self
    }

    /// Stop issuing page requests once `cancel` observes `true`.
    pub fn with_cancel(mut self, cancel: watch::Receiver<bool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn config(&self) -> &MoexConfig {
        &self.config
    }

    pub fn normalizer(&self) -> &TickerNormalizer {
        &self.normalizer
    }

    /// Resolve a contract ticker to its underlying asset code.
    pub fn underlying(&self, ticker: &str) -> Result<Underlying, MoexError> {
        require_ticker(ticker).map(|ticker| self.normalizer.normalize(ticker))
    }

    fn paginator(&self, config: PageConfig) -> Paginator {
        let paginator = Paginator::new(config);
        match &self.cancel {
            Some(cancel) => paginator.with_cancel(cancel.clone()),
            None => paginator,
        }
    }

    /// Single unpaginated request decoded from the first populated of `blocks`.
    async fn fetch_block<Item>(
        &self,
        path: &str,
        params: &[(&str, String)],
        blocks: &[&str],
    ) -> Fetched<Vec<Item>>
    where
        Item: DeserializeOwned,
    {
        let result = match self.transport.get(path, params).await {
            Ok(response) => try_decode_first_block(&response.body, blocks)
                .map(|records| (records, response.status, response.url))
                .map_err(|error| (error, Some(response.status))),
            Err(error) => {
                let status = error.status();
                Err((error, status))
            }
        };

        match result {
            Ok((data, status, url)) => Fetched {
                data,
                completed: true,
                diagnostics: Diagnostics {
                    status: Some(status),
                    url: Some(url),
                    error: None,
                },
            },
            Err((error, status)) => {
                warn!(%error, path, "ISS request failed");
                Fetched {
                    data: Vec::new(),
                    completed: false,
                    diagnostics: Diagnostics {
                        status,
                        ..diagnostics_of(&error, path)
                    },
                }
            }
        }
    }

    /// All TQBR trade statistics for `date`, deduplicated by `(secid, tradedate, tradetime)`.
    pub async fn get_stock_stats(&self, date: NaiveDate) -> Fetched<Vec<StockRecord>> {
        self.stock_stats(date, None).await
    }

    /// [`Self::get_stock_stats`], publishing [`Progress`] after every page.
    pub async fn get_stock_stats_with_progress(
        &self,
        date: NaiveDate,
        progress: watch::Sender<Progress>,
    ) -> Fetched<Vec<StockRecord>> {
        self.stock_stats(date, Some(progress)).await
    }

    async fn stock_stats(
        &self,
        date: NaiveDate,
        progress: Option<watch::Sender<Progress>>,
    ) -> Fetched<Vec<StockRecord>> {
        let mut source = IssPages::<_, StockRecord>::new(
            &self.transport,
            STOCK_STATS_PATH,
            vec![
                ("date", model::iss_date(date)),
                ("board_group_id", BOARD_GROUP_TQBR.to_string()),
            ],
            &["tradestats", "data"],
        );

        let paginator = self.paginator(self.config.stock_pages);
        let paginator = match progress {
            Some(progress) => paginator.with_progress(progress),
            None => paginator,
        };
        let fetched = Fetched::from(paginator.run_dedup(&mut source, StockRecord::key).await);

        info!(
            %date,
            records = fetched.data.len(),
            completed = fetched.completed,
            "fetched stock stats"
        );
        fetched
    }

    /// Trade statistics history of one stock over `range`, or the last
    /// [`STOCK_HISTORY_DAYS`] days when `range` is `None`.
    pub async fn get_stock_history(
        &self,
        ticker: &str,
        range: Option<DateRange>,
    ) -> Result<Fetched<Vec<StockRecord>>, MoexError> {
        let ticker = require_ticker(ticker)?;
        let range = range.unwrap_or_else(|| date_range(STOCK_HISTORY_DAYS));

        let mut source = IssPages::<_, StockRecord>::new(
            &self.transport,
            STOCK_STATS_PATH,
            vec![
                ("secid", ticker.to_string()),
                ("from", model::iss_date(range.from)),
                ("till", model::iss_date(range.till)),
            ],
            &["tradestats", "data"],
        );

        let fetched = Fetched::from(
            self.paginator(self.config.stock_pages)
                .run_dedup(&mut source, StockRecord::key)
                .await,
        );

        info!(
            ticker,
            %range,
            records = fetched.data.len(),
            completed = fetched.completed,
            "fetched stock history"
        );
        if fetched.data.is_empty() {
            warn!(
                ticker,
                %range,
                "no trade statistics, check the ticker is on TQBR and the range has trading days"
            );
        }

        Ok(fetched)
    }

    /// Order book statistics of TQBR stocks for `date`, at most `limit` records.
    pub async fn get_order_book_stats(
        &self,
        date: NaiveDate,
        limit: usize,
    ) -> Fetched<Vec<OrderBookStat>> {
        let mut source = IssPages::<_, OrderBookStat>::new(
            &self.transport,
            ORDER_BOOK_STATS_PATH,
            vec![("date", model::iss_date(date))],
            &["obstats", "data"],
        );

        let fetched = Fetched::from(
            self.paginator(self.config.stock_pages.with_ceiling(limit))
                .run_dedup(&mut source, OrderBookStat::key)
                .await,
        );

        info!(
            %date,
            records = fetched.data.len(),
            completed = fetched.completed,
            "fetched order book stats"
        );
        if fetched.data.is_empty() {
            warn!(%date, "no order book stats, check the date has trading data");
        }
        fetched
    }

    /// Securities listed on the TQBR board with their previous session prices.
    pub async fn get_realtime_stocks(&self, limit: usize) -> Fetched<Vec<StockSecurity>> {
        let fetched = self
            .fetch_block::<StockSecurity>(
                TQBR_SECURITIES_PATH,
                &[("limit", limit.to_string())],
                &["securities"],
            )
            .await;

        info!(securities = fetched.data.len(), "fetched TQBR securities");
        fetched
    }

    /// All FUTOI position records of the underlying of `ticker` between `from` and `till`.
    pub async fn get_futures_open_interest(
        &self,
        ticker: &str,
        from: NaiveDate,
        till: NaiveDate,
    ) -> Result<Fetched<Vec<RawPositionRecord>>, MoexError> {
        let underlying = self.underlying(ticker)?;

        let mut source = IssPages::<_, FutoiRow>::new(
            &self.transport,
            format!("/iss/analyticalproducts/futoi/securities/{underlying}.json"),
            vec![("from", model::iss_date(from)), ("till", model::iss_date(till))],
            &["futoi"],
        );

        let fetched = Fetched::from(self.paginator(self.config.futoi_pages).run(&mut source).await)
            .map(records_from_rows);

        info!(
            ticker,
            %underlying,
            guessed = underlying.is_guess(),
            records = fetched.data.len(),
            completed = fetched.completed,
            "fetched FUTOI records"
        );
        if fetched.data.is_empty() {
            warn!(
                ticker,
                %underlying,
                %from,
                %till,
                "no FUTOI records, check the underlying code and that the range has trading days"
            );
        }

        Ok(fetched)
    }

    /// Contracts listed on the RFUD board that carry both a `SECID` and a `SHORTNAME`.
    pub async fn get_active_futures(&self) -> Fetched<Vec<ActiveFuture>> {
        let fetched = self
            .fetch_block::<SecurityRow>(ACTIVE_FUTURES_PATH, &[], &["securities"])
            .await
            .map(|rows| {
                rows.into_iter()
                    .filter_map(ActiveFuture::from_row)
                    .collect::<Vec<_>>()
            });

        info!(contracts = fetched.data.len(), "fetched active futures");
        fetched
    }

    /// Listed contract on `underlying` with the earliest last delivery date.
    pub async fn nearest_contract(&self, underlying: &str) -> Fetched<Option<ActiveFuture>> {
        self.get_active_futures()
            .await
            .map(|futures| model::nearest_on(&futures, underlying).cloned())
    }

    /// Price candles of the nearest contract on the underlying of `ticker`, in ascending period
    /// start order.
    pub async fn get_futures_candles(
        &self,
        ticker: &str,
        from: NaiveDate,
        till: NaiveDate,
        interval: CandleInterval,
    ) -> Result<Fetched<Vec<OhlcBar>>, MoexError> {
        let underlying = self.underlying(ticker)?;

        let contract = self.nearest_contract(underlying.as_str()).await;
        let Some(future) = contract.data else {
            let error = MoexError::UnknownUnderlying(underlying.to_string());
            warn!(ticker, %underlying, "no active contract found");
            return Ok(Fetched {
                data: Vec::new(),
                completed: false,
                diagnostics: contract.diagnostics.or_failed(Diagnostics {
                    error: Some(error.to_string()),
                    ..Diagnostics::default()
                }),
            });
        };

        info!(
            ticker,
            contract = %future.secid,
            expires = ?future.last_delivery_date,
            %interval,
            "using nearest contract for candles"
        );

        let mut source = IssPages::<_, OhlcBar>::new(
            &self.transport,
            format!(
                "/iss/engines/futures/markets/forts/boards/RFUD/securities/{}/candles.json",
                future.secid
            ),
            vec![
                ("from", model::iss_date(from)),
                ("till", model::iss_date(till)),
                ("interval", interval.as_param().to_string()),
            ],
            &["candles"],
        );

        let mut fetched =
            Fetched::from(self.paginator(self.config.candle_pages).run(&mut source).await);
        fetched.data.sort_by(|a, b| a.begin.cmp(&b.begin));

        info!(
            contract = %future.secid,
            candles = fetched.data.len(),
            completed = fetched.completed,
            "fetched futures candles"
        );
        Ok(fetched)
    }

    /// Flow summary of `records`; no request is issued.
    pub fn get_smart_money_flow(&self, records: &[RawPositionRecord]) -> Vec<FlowSummary> {
        smart_money_flow(records)
    }

    /// Reconciled FUTOI snapshots of the last `days` days joined with hourly candles.
    ///
    /// Positions and candles are fetched concurrently; the result is complete only if both
    /// fetches are.
    pub async fn get_merged_candles(
        &self,
        ticker: &str,
        days: u64,
    ) -> Result<Fetched<Vec<MergedPoint>>, MoexError> {
        let ticker = require_ticker(ticker)?;
        let range = date_range(days);

        let (positions, bars) = futures::join!(
            self.get_futures_open_interest(ticker, range.from, range.till),
            self.get_futures_candles(ticker, range.from, range.till, CandleInterval::Hour1),
        );
        let (positions, bars) = (positions?, bars?);

        let points = merge(reconcile(&positions.data), &bars.data);

        info!(ticker, %range, points = points.len(), "merged candles");
        Ok(Fetched {
            data: points,
            completed: positions.completed && bars.completed,
            diagnostics: positions.diagnostics.or_failed(bars.diagnostics),
        })
    }
}
