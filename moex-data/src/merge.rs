//! Best-effort join of FUTOI snapshots with an independently paginated price series.
//!
//! Bars are matched on the hour-of-day of their period start (string sliced, not parsed) and on
//! the trade date appearing in that period start. This only holds while both series cover the
//! same trading calendar at hourly granularity; snapshots outside the bar series, sub-hourly bars
//! and daylight-saving shifts simply leave the snapshot unpriced.

use crate::{
    iss::{de_flex_f64, de_flex_opt_f64},
    position::{PositionSnapshot, TraderClass},
};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// One OHLC price bar from the ISS `candles` block.
#[derive(Clone, PartialEq, PartialOrd, Debug, Deserialize, Serialize)]
pub struct OhlcBar {
    /// Period start, eg/ `"2026-02-03 10:00:00"`.
    pub begin: String,
    /// Period end, when reported.
    #[serde(default)]
    pub end: Option<String>,
    #[serde(deserialize_with = "de_flex_f64")]
    pub open: f64,
    #[serde(deserialize_with = "de_flex_f64")]
    pub high: f64,
    #[serde(deserialize_with = "de_flex_f64")]
    pub low: f64,
    #[serde(deserialize_with = "de_flex_f64")]
    pub close: f64,
    #[serde(deserialize_with = "de_flex_f64")]
    pub volume: f64,
    /// Traded value in roubles, when reported.
    #[serde(default, deserialize_with = "de_flex_opt_f64")]
    pub value: Option<f64>,
}

impl OhlcBar {
    /// Two digit hour of the period start.
    pub fn begin_hour(&self) -> Option<&str> {
        self.begin.get(11..13)
    }

    /// Period start parsed as a naive exchange-local timestamp.
    pub fn begin_time(&self) -> Option<NaiveDateTime> {
        ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"]
            .iter()
            .find_map(|format| NaiveDateTime::parse_from_str(&self.begin, format).ok())
    }

    fn matches(&self, snapshot: &PositionSnapshot) -> bool {
        let Some(snapshot_hour) = snapshot.trade_time.get(0..2) else {
            return false;
        };

        self.begin_hour() == Some(snapshot_hour)
            && self.begin.contains(snapshot.trade_date.as_str())
    }
}

/// A [`PositionSnapshot`] with the price bar that shares its hour, if one was found.
#[derive(Clone, PartialEq, Debug, Deserialize, Serialize)]
pub struct MergedPoint {
    pub snapshot: PositionSnapshot,
    pub bar: Option<OhlcBar>,
}

impl MergedPoint {
    /// Close price of the matched bar.
    pub fn price(&self) -> Option<f64> {
        self.close()
    }

    pub fn open(&self) -> Option<f64> {
        self.bar.as_ref().map(|bar| bar.open)
    }

    pub fn high(&self) -> Option<f64> {
        self.bar.as_ref().map(|bar| bar.high)
    }

    pub fn low(&self) -> Option<f64> {
        self.bar.as_ref().map(|bar| bar.low)
    }

    pub fn close(&self) -> Option<f64> {
        self.bar.as_ref().map(|bar| bar.close)
    }

    pub fn volume(&self) -> Option<f64> {
        self.bar.as_ref().map(|bar| bar.volume)
    }

    /// Net position of `class`, absent if that class did not report.
    pub fn net(&self, class: TraderClass) -> Option<i64> {
        self.snapshot.class(class).map(|position| position.net)
    }

    pub fn is_priced(&self) -> bool {
        self.bar.is_some()
    }
}

/// Counts describing how much of a merged series carries price data.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Default, Deserialize, Serialize)]
pub struct MergeStats {
    pub total: usize,
    pub priced: usize,
}

impl MergeStats {
    pub fn of(points: &[MergedPoint]) -> Self {
        Self {
            total: points.len(),
            priced: points.iter().filter(|point| point.is_priced()).count(),
        }
    }
}

/// Attach the first bar matching each snapshot's date and hour.
pub fn merge(snapshots: Vec<PositionSnapshot>, bars: &[OhlcBar]) -> Vec<MergedPoint> {
    let points: Vec<MergedPoint> = snapshots
        .into_iter()
        .map(|snapshot| {
            let bar = bars.iter().find(|bar| bar.matches(&snapshot)).cloned();
            MergedPoint { snapshot, bar }
        })
        .collect();

    let stats = MergeStats::of(&points);
    info!(
        points = stats.total,
        priced = stats.priced,
        bars = bars.len(),
        "merged FUTOI snapshots with price bars"
    );
    if stats.total > 0 && stats.priced == 0 {
        warn!("no price bar matched any FUTOI timestamp");
    }

    points
}

/// Points that carry price data.
pub fn priced_points(points: &[MergedPoint]) -> impl Iterator<Item = &MergedPoint> {
    points.iter().filter(|point| point.is_priced())
}

/// Mean close over priced points; unpriced points are skipped rather than counted as zero.
pub fn mean_close(points: &[MergedPoint]) -> Option<f64> {
    let (sum, count) = points
        .iter()
        .filter_map(MergedPoint::close)
        .fold((0.0, 0usize), |(sum, count), close| (sum + close, count + 1));

    (count > 0).then(|| sum / count as f64)
}

/// Total volume over priced points.
pub fn total_volume(points: &[MergedPoint]) -> f64 {
    points.iter().filter_map(MergedPoint::volume).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::position::ClassPosition;

    fn snapshot(date: &str, time: &str) -> PositionSnapshot {
        PositionSnapshot::new(date, time)
            .with_class(TraderClass::Institutional, ClassPosition::default())
            .with_class(TraderClass::Retail, ClassPosition::default())
    }

    fn bar(begin: &str, close: f64) -> OhlcBar {
        OhlcBar {
            begin: begin.to_string(),
            end: None,
            open: close - 1.0,
            high: close + 1.0,
            low: close - 2.0,
            close,
            volume: 10.0,
            value: None,
        }
    }

    #[test]
    fn test_merge_matches_on_date_and_hour() {
        let snapshots = vec![
            snapshot("2026-02-03", "10:00:00"),
            snapshot("2026-02-03", "11:00:00"),
        ];
        let bars = vec![
            bar("2026-02-02 10:00:00", 1.0),
            bar("2026-02-03 11:00:00", 3.0),
            bar("2026-02-03 10:00:00", 2.0),
        ];

        let actual = merge(snapshots, &bars);

        assert_eq!(actual[0].price(), Some(2.0));
        assert_eq!(actual[0].open(), Some(1.0));
        assert_eq!(actual[1].price(), Some(3.0));
        assert_eq!(actual[1].volume(), Some(10.0));
    }

    #[test]
    fn test_merge_first_match_wins() {
        let bars = vec![bar("2026-02-03 10:00:00", 2.0), bar("2026-02-03 10:30:00", 5.0)];

        let actual = merge(vec![snapshot("2026-02-03", "10:45:00")], &bars);

        assert_eq!(actual[0].price(), Some(2.0));
    }

    #[test]
    fn test_merge_unmatched_price_is_absent() {
        let bars = vec![bar("2026-02-03 10:00:00", 2.0)];

        let actual = merge(vec![snapshot("2026-02-04", "10:00:00")], &bars);

        assert!(!actual[0].is_priced());
        assert_eq!(actual[0].price(), None);
        assert_eq!(actual[0].open(), None);
        assert_eq!(actual[0].high(), None);
        assert_eq!(actual[0].low(), None);
        assert_eq!(actual[0].volume(), None);
    }

    #[test]
    fn test_aggregates_skip_unpriced_points() {
        let snapshots = vec![
            snapshot("2026-02-03", "10:00:00"),
            snapshot("2026-02-03", "11:00:00"),
            snapshot("2026-02-03", "12:00:00"),
        ];
        let bars = vec![bar("2026-02-03 10:00:00", 100.0), bar("2026-02-03 12:00:00", 200.0)];

        let actual = merge(snapshots, &bars);

        assert_eq!(MergeStats::of(&actual), MergeStats { total: 3, priced: 2 });
        assert_eq!(mean_close(&actual), Some(150.0));
        assert_eq!(total_volume(&actual), 20.0);
        assert_eq!(priced_points(&actual).count(), 2);
        assert_eq!(mean_close(&actual[1..2]), None);
    }

    #[test]
    fn test_ohlc_bar_begin_time_formats() {
        assert!(bar("2026-02-03 10:00:00", 1.0).begin_time().is_some());
        assert!(bar("2026-02-03T10:00:00", 1.0).begin_time().is_some());
        assert!(bar("garbage", 1.0).begin_time().is_none());
        assert_eq!(bar("bad", 1.0).begin_hour(), None);
    }
}
