use crate::merge::OhlcBar;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use derive_more::Display;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Minimum number of valid trailing days required for a ratio.
pub const MIN_TRAILING_DAYS: usize = 3;

/// Relative volume reading.
#[derive(Copy, Clone, PartialEq, Debug, Deserialize, Serialize)]
pub enum Rvol {
    Ratio {
        /// `today / baseline × 100`
        percent: f64,
        /// Mean volume-to-now over the valid trailing days.
        baseline: f64,
        today: f64,
    },
    InsufficientData {
        valid_days: usize,
    },
}

impl Rvol {
    pub fn percent(&self) -> Option<f64> {
        match self {
            Rvol::Ratio { percent, .. } => Some(*percent),
            Rvol::InsufficientData { .. } => None,
        }
    }

    pub fn level(&self) -> Option<RvolLevel> {
        self.percent().map(RvolLevel::from_percent)
    }
}

/// Coarse classification of a relative volume ratio.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Display, Deserialize, Serialize)]
pub enum RvolLevel {
    /// Above 120 % of the baseline.
    #[display("elevated")]
    Elevated,
    #[display("normal")]
    Normal,
    /// Below 80 % of the baseline.
    #[display("depressed")]
    Depressed,
}

impl RvolLevel {
    pub fn from_percent(percent: f64) -> Self {
        if percent > 120.0 {
            RvolLevel::Elevated
        } else if percent < 80.0 {
            RvolLevel::Depressed
        } else {
            RvolLevel::Normal
        }
    }
}

/// Session start and number of trailing days used for like-for-like partial day comparison.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Deserialize, Serialize)]
pub struct SessionWindow {
    pub session_start: NaiveTime,
    pub lookback_days: usize,
}

impl Default for SessionWindow {
    fn default() -> Self {
        Self {
            // FORTS main session opens at 10:00 MSK
            session_start: NaiveTime::from_hms_opt(10, 0, 0).unwrap_or(NaiveTime::MIN),
            lookback_days: 10,
        }
    }
}

/// `today ÷ mean(trailing) × 100`, requiring at least [`MIN_TRAILING_DAYS`] finite positive
/// trailing volumes.
pub fn relative_volume(today: f64, trailing: &[f64]) -> Rvol {
    let valid: Vec<f64> = trailing
        .iter()
        .copied()
        .filter(|volume| volume.is_finite() && *volume > 0.0)
        .collect();

    if valid.len() < MIN_TRAILING_DAYS {
        return Rvol::InsufficientData {
            valid_days: valid.len(),
        };
    }

    let baseline = valid.iter().sum::<f64>() / valid.len() as f64;
    let today = if today.is_finite() { today.max(0.0) } else { 0.0 };

    Rvol::Ratio {
        percent: today / baseline * 100.0,
        baseline,
        today,
    }
}

/// Per trade date volume of bars starting within `[session_start, cutoff]`.
///
/// Bars with non-positive volume or close, or with an unparseable period start, are ignored.
pub fn volumes_to_cutoff(
    bars: &[OhlcBar],
    session_start: NaiveTime,
    cutoff: NaiveTime,
) -> BTreeMap<NaiveDate, f64> {
    let mut volumes = BTreeMap::new();

    for bar in bars {
        let Some(begin) = bar.begin_time() else {
            continue;
        };
        if begin.time() < session_start || begin.time() > cutoff {
            continue;
        }
        if !(bar.volume.is_finite() && bar.volume > 0.0 && bar.close > 0.0) {
            continue;
        }
        *volumes.entry(begin.date()).or_insert(0.0) += bar.volume;
    }

    volumes
}

/// Relative volume of `now`'s partial session against the most recent prior sessions cut at the
/// same wall-clock time.
pub fn relative_volume_at(bars: &[OhlcBar], now: NaiveDateTime, window: &SessionWindow) -> Rvol {
    let volumes = volumes_to_cutoff(bars, window.session_start, now.time());
    let today = volumes.get(&now.date()).copied().unwrap_or(0.0);
    let trailing: Vec<f64> = volumes
        .range(..now.date())
        .rev()
        .take(window.lookback_days)
        .map(|(_, volume)| *volume)
        .collect();

    relative_volume(today, &trailing)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bar(begin: &str, volume: f64) -> OhlcBar {
        OhlcBar {
            begin: begin.to_string(),
            end: None,
            open: 100.0,
            high: 101.0,
            low: 99.0,
            close: 100.0,
            volume,
            value: None,
        }
    }

    fn at(raw: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").unwrap()
    }

    #[test]
    fn test_relative_volume() {
        struct TestCase {
            today: f64,
            trailing: Vec<f64>,
            expected: Option<f64>,
        }

        let tests = vec![
            TestCase {
                // TC0: 300 against a mean of 200
                today: 300.0,
                trailing: vec![100.0, 200.0, 300.0],
                expected: Some(150.0),
            },
            TestCase {
                // TC1: two trailing days is not enough
                today: 300.0,
                trailing: vec![100.0, 200.0],
                expected: None,
            },
            TestCase {
                // TC2: invalid trailing days do not count towards the minimum
                today: 300.0,
                trailing: vec![100.0, 0.0, f64::NAN, 200.0],
                expected: None,
            },
            TestCase {
                // TC3: invalid trailing days are excluded from the mean
                today: 100.0,
                trailing: vec![100.0, 0.0, 100.0, 100.0],
                expected: Some(100.0),
            },
            TestCase {
                // TC4: nothing traded yet today
                today: 0.0,
                trailing: vec![100.0, 100.0, 100.0],
                expected: Some(0.0),
            },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            let actual = relative_volume(test.today, &test.trailing).percent();
            match (actual, test.expected) {
                (Some(actual), Some(expected)) => {
                    assert!((actual - expected).abs() < 1e-9, "TC{} failed", index)
                }
                (actual, expected) => assert_eq!(actual, expected, "TC{} failed", index),
            }
        }
    }

    #[test]
    fn test_insufficient_data_reports_valid_days() {
        assert_eq!(
            relative_volume(10.0, &[5.0, -1.0]),
            Rvol::InsufficientData { valid_days: 1 }
        );
    }

    #[test]
    fn test_rvol_level() {
        assert_eq!(RvolLevel::from_percent(150.0), RvolLevel::Elevated);
        assert_eq!(RvolLevel::from_percent(120.0), RvolLevel::Normal);
        assert_eq!(RvolLevel::from_percent(79.9), RvolLevel::Depressed);
        assert_eq!(
            relative_volume(300.0, &[100.0, 200.0, 300.0]).level(),
            Some(RvolLevel::Elevated)
        );
    }

    #[test]
    fn test_volumes_to_cutoff_restricts_to_session_window() {
        let bars = vec![
            bar("2026-02-02 09:00:00", 1_000.0),
            bar("2026-02-02 10:00:00", 10.0),
            bar("2026-02-02 11:00:00", 20.0),
            bar("2026-02-02 12:00:00", 40.0),
            bar("2026-02-03 10:00:00", 5.0),
            bar("2026-02-03 10:00:00", 0.0),
        ];

        let actual = volumes_to_cutoff(
            &bars,
            SessionWindow::default().session_start,
            NaiveTime::from_hms_opt(11, 30, 0).unwrap(),
        );

        let day = |raw: &str| NaiveDate::parse_from_str(raw, "%Y-%m-%d").unwrap();
        assert_eq!(actual.get(&day("2026-02-02")), Some(&30.0));
        assert_eq!(actual.get(&day("2026-02-03")), Some(&5.0));
    }

    #[test]
    fn test_relative_volume_at_compares_like_for_like() {
        let mut bars = Vec::new();
        for (date, morning) in [
            ("2026-02-02", 100.0),
            ("2026-02-03", 200.0),
            ("2026-02-04", 300.0),
        ] {
            bars.push(bar(&format!("{date} 10:00:00"), morning));
            // after the cutoff, must not count
            bars.push(bar(&format!("{date} 15:00:00"), 10_000.0));
        }
        bars.push(bar("2026-02-05 10:00:00", 300.0));

        let actual =
            relative_volume_at(&bars, at("2026-02-05 11:00:00"), &SessionWindow::default());

        assert_eq!(actual.percent(), Some(150.0));
    }

    #[test]
    fn test_relative_volume_at_respects_lookback() {
        let mut bars: Vec<OhlcBar> = (1..=5)
            .map(|day| bar(&format!("2026-02-0{day} 10:00:00"), 100.0 * day as f64))
            .collect();
        bars.push(bar("2026-02-06 10:00:00", 400.0));

        let window = SessionWindow {
            lookback_days: 3,
            ..SessionWindow::default()
        };
        let actual = relative_volume_at(&bars, at("2026-02-06 12:00:00"), &window);

        // mean of days 3, 4, 5 = 400
        assert_eq!(actual.percent(), Some(100.0));
    }
}
