use crate::{merge::MergedPoint, position::TraderClass};
use derive_more::Display;
use serde::{Deserialize, Serialize};

/// Number of trailing points the divergence window spans.
pub const DIVERGENCE_WINDOW: usize = 10;

/// Relationship between price direction and institutional net positioning.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Default, Display, Deserialize, Serialize)]
pub enum DivergenceLabel {
    /// Price fell while institutional net rose.
    #[display("BULLISH")]
    Bullish,
    /// Price rose while institutional net did not.
    #[display("BEARISH")]
    Bearish,
    /// Price and institutional net moved the same way.
    #[display("CONVERGENCE")]
    Convergence,
    /// Not enough data to classify.
    #[default]
    #[display("NONE")]
    Unknown,
}

/// Classify the last [`DIVERGENCE_WINDOW`] points by comparing the first and last point's close
/// price and institutional net.
///
/// Fewer points than the window, or a missing price or institutional net at either edge of the
/// window, yields [`DivergenceLabel::Unknown`].
pub fn divergence(points: &[MergedPoint]) -> DivergenceLabel {
    if points.len() < DIVERGENCE_WINDOW {
        return DivergenceLabel::Unknown;
    }

    let window = &points[points.len() - DIVERGENCE_WINDOW..];
    let (Some(first), Some(last)) = (window.first(), window.last()) else {
        return DivergenceLabel::Unknown;
    };

    let edges = (
        first.price(),
        last.price(),
        first.net(TraderClass::Institutional),
        last.net(TraderClass::Institutional),
    );
    let (Some(price_start), Some(price_end), Some(net_start), Some(net_end)) = edges else {
        return DivergenceLabel::Unknown;
    };

    let price_up = price_end > price_start;
    let net_up = net_end > net_start;

    match (price_up, net_up) {
        (true, false) => DivergenceLabel::Bearish,
        (false, true) => DivergenceLabel::Bullish,
        _ => DivergenceLabel::Convergence,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        merge::OhlcBar,
        position::{ClassPosition, PositionSnapshot},
    };

    fn point(price: Option<f64>, institutional_net: Option<i64>) -> MergedPoint {
        let mut snapshot = PositionSnapshot::new("2026-02-03", "10:00:00").with_class(
            TraderClass::Retail,
            ClassPosition::default(),
        );
        if let Some(net) = institutional_net {
            snapshot = snapshot.with_class(
                TraderClass::Institutional,
                ClassPosition {
                    long: net.max(0),
                    short: (-net).max(0),
                    net,
                    ..ClassPosition::default()
                },
            );
        }

        MergedPoint {
            snapshot,
            bar: price.map(|close| OhlcBar {
                begin: "2026-02-03 10:00:00".to_string(),
                end: None,
                open: close,
                high: close,
                low: close,
                close,
                volume: 1.0,
                value: None,
            }),
        }
    }

    fn series(
        prices: impl Fn(usize) -> f64,
        nets: impl Fn(usize) -> i64,
        len: usize,
    ) -> Vec<MergedPoint> {
        (0..len)
            .map(|index| point(Some(prices(index)), Some(nets(index))))
            .collect()
    }

    #[test]
    fn test_divergence() {
        struct TestCase {
            input: Vec<MergedPoint>,
            expected: DivergenceLabel,
        }

        let tests = vec![
            TestCase {
                // TC0: price strictly up, institutional net strictly down
                input: series(|i| 100.0 + i as f64, |i| 1_000 - i as i64, 10),
                expected: DivergenceLabel::Bearish,
            },
            TestCase {
                // TC1: price strictly down, institutional net strictly up
                input: series(|i| 100.0 - i as f64, |i| 1_000 + i as i64, 10),
                expected: DivergenceLabel::Bullish,
            },
            TestCase {
                // TC2: both up
                input: series(|i| 100.0 + i as f64, |i| 1_000 + i as i64, 10),
                expected: DivergenceLabel::Convergence,
            },
            TestCase {
                // TC3: both down
                input: series(|i| 100.0 - i as f64, |i| 1_000 - i as i64, 10),
                expected: DivergenceLabel::Convergence,
            },
            TestCase {
                // TC4: price up, institutional net flat
                input: series(|i| 100.0 + i as f64, |_| 1_000, 10),
                expected: DivergenceLabel::Bearish,
            },
            TestCase {
                // TC5: fewer points than the window
                input: series(|i| 100.0 + i as f64, |i| 1_000 - i as i64, 9),
                expected: DivergenceLabel::Unknown,
            },
            TestCase {
                // TC6: only the trailing window counts
                input: series(
                    |i| if i < 5 { 500.0 } else { 100.0 + i as f64 },
                    |i| 1_000 - i as i64,
                    15,
                ),
                expected: DivergenceLabel::Bearish,
            },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            assert_eq!(divergence(&test.input), test.expected, "TC{} failed", index);
        }
    }

    #[test]
    fn test_divergence_unknown_when_window_edge_is_unpriced() {
        let mut points = series(|i| 100.0 + i as f64, |i| 1_000 - i as i64, 10);
        points[9] = point(None, Some(0));

        assert_eq!(divergence(&points), DivergenceLabel::Unknown);
    }

    #[test]
    fn test_divergence_unknown_when_institutional_class_absent() {
        let mut points = series(|i| 100.0 + i as f64, |i| 1_000 - i as i64, 10);
        points[0] = point(Some(50.0), None);

        assert_eq!(divergence(&points), DivergenceLabel::Unknown);
    }

    #[test]
    fn test_divergence_label_display() {
        assert_eq!(DivergenceLabel::Bearish.to_string(), "BEARISH");
        assert_eq!(DivergenceLabel::Unknown.to_string(), "NONE");
    }
}
