use crate::iss::{de_flex_f64, de_flex_opt_f64};
use chrono::{Days, NaiveDate, Utc};
use derive_more::Display;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

/// AlgoPack `tradestats` row for one stock over one aggregation period.
///
/// See docs: <https://moexalgo.github.io/api/rest/#tradestats>
#[derive(Clone, PartialEq, Debug, Deserialize, Serialize)]
pub struct StockRecord {
    pub secid: SmolStr,
    pub tradedate: SmolStr,
    pub tradetime: SmolStr,
    #[serde(default, deserialize_with = "de_flex_opt_f64")]
    pub pr_open: Option<f64>,
    #[serde(default, deserialize_with = "de_flex_opt_f64")]
    pub pr_high: Option<f64>,
    #[serde(default, deserialize_with = "de_flex_opt_f64")]
    pub pr_low: Option<f64>,
    #[serde(default, deserialize_with = "de_flex_opt_f64")]
    pub pr_close: Option<f64>,
    #[serde(default, deserialize_with = "de_flex_opt_f64")]
    pub pr_vwap: Option<f64>,
    #[serde(default, deserialize_with = "de_flex_opt_f64")]
    pub pr_change: Option<f64>,
    /// Volume in lots.
    #[serde(deserialize_with = "de_flex_f64")]
    pub vol: f64,
    /// Value in roubles.
    #[serde(deserialize_with = "de_flex_f64")]
    pub val: f64,
    #[serde(default, deserialize_with = "de_flex_opt_f64")]
    pub vol_b: Option<f64>,
    #[serde(default, deserialize_with = "de_flex_opt_f64")]
    pub vol_s: Option<f64>,
    #[serde(default, deserialize_with = "de_flex_opt_f64")]
    pub val_b: Option<f64>,
    #[serde(default, deserialize_with = "de_flex_opt_f64")]
    pub val_s: Option<f64>,
    /// Aggressive buy/sell imbalance.
    #[serde(default, deserialize_with = "de_flex_opt_f64")]
    pub disb: Option<f64>,
    #[serde(default, deserialize_with = "de_flex_opt_f64")]
    pub trades: Option<f64>,
}

impl StockRecord {
    /// Natural key used to drop records repeated across pages.
    pub fn key(&self) -> (SmolStr, SmolStr, SmolStr) {
        (
            self.secid.clone(),
            self.tradedate.clone(),
            self.tradetime.clone(),
        )
    }
}

/// AlgoPack `obstats` row: order book shape of one stock over one aggregation period.
///
/// See docs: <https://moexalgo.github.io/api/rest/#obstats>
#[derive(Clone, PartialEq, Debug, Deserialize, Serialize)]
pub struct OrderBookStat {
    pub secid: SmolStr,
    pub tradedate: SmolStr,
    pub tradetime: SmolStr,
    /// Best bid/offer spread in basis points.
    #[serde(default, deserialize_with = "de_flex_opt_f64")]
    pub spread_bbo: Option<f64>,
    #[serde(default, deserialize_with = "de_flex_opt_f64")]
    pub spread_lv10: Option<f64>,
    #[serde(default, deserialize_with = "de_flex_opt_f64")]
    pub spread_1mio: Option<f64>,
    #[serde(default, deserialize_with = "de_flex_opt_f64")]
    pub levels_b: Option<f64>,
    #[serde(default, deserialize_with = "de_flex_opt_f64")]
    pub levels_s: Option<f64>,
    #[serde(default, deserialize_with = "de_flex_opt_f64")]
    pub vol_b: Option<f64>,
    #[serde(default, deserialize_with = "de_flex_opt_f64")]
    pub vol_s: Option<f64>,
    #[serde(default, deserialize_with = "de_flex_opt_f64")]
    pub val_b: Option<f64>,
    #[serde(default, deserialize_with = "de_flex_opt_f64")]
    pub val_s: Option<f64>,
    #[serde(default, deserialize_with = "de_flex_opt_f64")]
    pub imbalance_vol_bbo: Option<f64>,
    #[serde(default, deserialize_with = "de_flex_opt_f64")]
    pub imbalance_val_bbo: Option<f64>,
    #[serde(default, deserialize_with = "de_flex_opt_f64")]
    pub imbalance_vol: Option<f64>,
    #[serde(default, deserialize_with = "de_flex_opt_f64")]
    pub imbalance_val: Option<f64>,
    #[serde(default, deserialize_with = "de_flex_opt_f64")]
    pub vwap_b: Option<f64>,
    #[serde(default, deserialize_with = "de_flex_opt_f64")]
    pub vwap_s: Option<f64>,
}

impl OrderBookStat {
    pub fn key(&self) -> (SmolStr, SmolStr, SmolStr) {
        (
            self.secid.clone(),
            self.tradedate.clone(),
            self.tradetime.clone(),
        )
    }
}

/// TQBR board `securities` row: reference data and previous session prices of a listed stock.
#[derive(Clone, PartialEq, Debug, Deserialize, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub struct StockSecurity {
    pub secid: SmolStr,
    #[serde(default)]
    pub boardid: Option<SmolStr>,
    #[serde(default)]
    pub shortname: Option<String>,
    #[serde(default)]
    pub secname: Option<String>,
    #[serde(default)]
    pub isin: Option<SmolStr>,
    #[serde(default, deserialize_with = "de_flex_opt_f64")]
    pub prevprice: Option<f64>,
    #[serde(default, deserialize_with = "de_flex_opt_f64")]
    pub prevwaprice: Option<f64>,
    #[serde(default, deserialize_with = "de_flex_opt_f64")]
    pub lotsize: Option<f64>,
    #[serde(default, deserialize_with = "de_flex_opt_f64")]
    pub issuesize: Option<f64>,
    /// `A` while the security is tradeable.
    #[serde(default)]
    pub status: Option<SmolStr>,
}

/// RFUD board `securities` row as published by ISS.
#[derive(Clone, PartialEq, Debug, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub struct SecurityRow {
    #[serde(default)]
    pub secid: Option<String>,
    #[serde(default)]
    pub shortname: Option<String>,
    #[serde(default)]
    pub assetcode: Option<String>,
    #[serde(default)]
    pub lasttradedate: Option<String>,
    #[serde(default)]
    pub lastdeldate: Option<String>,
    #[serde(default, deserialize_with = "de_flex_opt_f64")]
    pub prevopenposition: Option<f64>,
}

/// Futures contract currently listed on the RFUD board.
#[derive(Clone, PartialEq, Debug, Deserialize, Serialize)]
pub struct ActiveFuture {
    pub secid: SmolStr,
    pub short_name: String,
    pub asset_code: Option<SmolStr>,
    /// Last trading day, `YYYY-MM-DD`.
    pub last_trade_date: Option<SmolStr>,
    /// Last delivery day, `YYYY-MM-DD`.
    pub last_delivery_date: Option<SmolStr>,
    /// Open interest at the end of the previous session, in contracts.
    pub prev_open_position: Option<f64>,
}

impl ActiveFuture {
    /// Convert a [`SecurityRow`], rejecting rows without a `SECID` or `SHORTNAME`.
    pub fn from_row(row: SecurityRow) -> Option<Self> {
        let non_empty = |value: Option<String>| value.filter(|value| !value.trim().is_empty());

        Some(Self {
            secid: SmolStr::new(non_empty(row.secid)?),
            short_name: non_empty(row.shortname)?,
            asset_code: non_empty(row.assetcode).map(SmolStr::new),
            last_trade_date: non_empty(row.lasttradedate).map(SmolStr::new),
            last_delivery_date: non_empty(row.lastdeldate).map(SmolStr::new),
            prev_open_position: row.prevopenposition,
        })
    }

    /// `true` if this contract is written on `underlying`.
    pub fn is_on(&self, underlying: &str) -> bool {
        self.asset_code.as_deref() == Some(underlying) || self.secid.starts_with(underlying)
    }
}

/// Contract on `underlying` with the earliest last delivery date.
///
/// Contracts without a delivery date sort after every dated contract; ties keep listing order.
pub fn nearest_on<'a>(futures: &'a [ActiveFuture], underlying: &str) -> Option<&'a ActiveFuture> {
    futures
        .iter()
        .filter(|future| future.is_on(underlying))
        .sorted_by(|a, b| match (&a.last_delivery_date, &b.last_delivery_date) {
            (Some(a), Some(b)) => a.cmp(b),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => std::cmp::Ordering::Equal,
        })
        .next()
}

/// Candle aggregation period accepted by the ISS `candles` endpoint.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Default, Display, Deserialize, Serialize)]
pub enum CandleInterval {
    #[display("1m")]
    Minute1,
    #[display("10m")]
    Minute10,
    #[default]
    #[display("1h")]
    Hour1,
    #[display("1d")]
    Day1,
    #[display("1w")]
    Week1,
    #[display("1M")]
    Month1,
    #[display("1Q")]
    Quarter1,
}

impl CandleInterval {
    /// Value of the ISS `interval` query parameter.
    pub fn as_param(&self) -> u32 {
        match self {
            CandleInterval::Minute1 => 1,
            CandleInterval::Minute10 => 10,
            CandleInterval::Hour1 => 60,
            CandleInterval::Day1 => 24,
            CandleInterval::Week1 => 7,
            CandleInterval::Month1 => 31,
            CandleInterval::Quarter1 => 4,
        }
    }
}

/// Inclusive `from`/`till` trade date range.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Display, Deserialize, Serialize)]
#[display("{from}..={till}")]
pub struct DateRange {
    pub from: NaiveDate,
    pub till: NaiveDate,
}

impl DateRange {
    /// `days` calendar days back from `till`.
    pub fn ending(till: NaiveDate, days: u64) -> Self {
        Self {
            from: till.checked_sub_days(Days::new(days)).unwrap_or(NaiveDate::MIN),
            till,
        }
    }
}

/// `days` calendar days back from today (UTC).
pub fn date_range(days: u64) -> DateRange {
    DateRange::ending(Utc::now().date_naive(), days)
}

/// ISS query date format.
pub fn iss_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}
