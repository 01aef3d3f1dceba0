//! # MOEX Data
//! Ingestion and aggregation of Moscow Exchange ISS market data:
//! * Paginated, rate-limited reads of AlgoPack trade and order book statistics, FUTOI position
//!   data and futures candles, always returned with a completion flag and request diagnostics.
//! * Reconciliation of per trader class FUTOI rows into per timestamp position snapshots.
//! * Best-effort hourly join of positions with price bars.
//! * Divergence, relative volume and chart axis signals over the merged series.
//!
//! ## Example
//! ```rust,no_run
//! use moex_data::{MoexClient, MoexConfig, signal::divergence};
//!
//! # async fn run() -> Result<(), moex_data::MoexError> {
//! let client = MoexClient::new(MoexConfig::from_env())?;
//!
//! let merged = client.get_merged_candles("SiH6", 14).await?;
//! if !merged.completed {
//!     println!("partial data: {:?}", merged.diagnostics);
//! }
//! println!("{}", divergence(&merged.data));
//! # Ok(())
//! # }
//! ```

/// All errors generated in `moex-data`.
pub mod error;

/// ISS columnar block decoding and flexible numeric deserializers.
pub mod iss;

/// Offset [`Paginator`](paginate::Paginator) with safety ceilings, politeness delay and
/// cancellation.
pub mod paginate;

/// Contract ticker to underlying asset code resolution.
pub mod ticker;

/// FUTOI position records, per timestamp snapshots and the smart money flow summary.
pub mod position;

/// Hour bucket join of position snapshots with price bars.
pub mod merge;

/// Divergence, relative volume and axis domain signals.
pub mod signal;

/// HTTP transport, configuration and pipeline entry points.
pub mod client;

pub use client::{
    ActiveFuture, CandleInterval, DateRange, Fetched, HttpTransport, IssResponse, IssTransport,
    MoexClient, MoexConfig, OrderBookStat, StockRecord, StockSecurity, date_range,
};
pub use error::MoexError;
pub use merge::{MergedPoint, OhlcBar, merge};
pub use paginate::{
    Diagnostics, PageConfig, PageSource, Paginated, Paginator, Progress, StopReason,
};
pub use position::{
    ClassPosition, FlowSummary, PositionSnapshot, RawPositionRecord, TraderClass, reconcile,
    smart_money_flow,
};
pub use signal::DivergenceLabel;
pub use ticker::{TickerNormalizer, Underlying};

