use crate::{merge::MergedPoint, position::TraderClass};
use derive_more::Display;
use serde::{Deserialize, Serialize};

/// Axis domain used when no visible series carries a value.
pub const DEFAULT_DOMAIN: (f64, f64) = (0.0, 100.0);

/// Fraction of the value range added below the minimum and above the maximum.
const PADDING: f64 = 0.05;

/// Padded `(min, max)` over every finite value of every visible series.
///
/// A flat series (range zero) yields `(v, v)`.
pub fn axis_domain<'a, I>(visible: I) -> (f64, f64)
where
    I: IntoIterator<Item = &'a [f64]>,
{
    let bounds = visible
        .into_iter()
        .flatten()
        .copied()
        .filter(|value| value.is_finite())
        .fold(None, |bounds: Option<(f64, f64)>, value| match bounds {
            None => Some((value, value)),
            Some((min, max)) => Some((min.min(value), max.max(value))),
        });

    let Some((min, max)) = bounds else {
        return DEFAULT_DOMAIN;
    };

    let pad = (max - min) * PADDING;
    (min - pad, max + pad)
}

/// Position series that can be plotted against a merged series.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Display, Deserialize, Serialize)]
pub enum PositionSeries {
    #[display("{_0}_long")]
    Long(TraderClass),
    #[display("{_0}_short")]
    Short(TraderClass),
    #[display("{_0}_net")]
    Net(TraderClass),
}

impl PositionSeries {
    pub fn class(&self) -> TraderClass {
        match self {
            PositionSeries::Long(class)
            | PositionSeries::Short(class)
            | PositionSeries::Net(class) => *class,
        }
    }

    /// Value of this series at `point`, absent if the class did not report.
    pub fn value(&self, point: &MergedPoint) -> Option<f64> {
        let position = point.snapshot.class(self.class())?;
        let value = match self {
            PositionSeries::Long(_) => position.long,
            PositionSeries::Short(_) => position.short,
            PositionSeries::Net(_) => position.net,
        };
        Some(value as f64)
    }
}

/// [`axis_domain`] over the `visible` position series of `points`.
pub fn position_axis_domain(points: &[MergedPoint], visible: &[PositionSeries]) -> (f64, f64) {
    let series: Vec<Vec<f64>> = visible
        .iter()
        .map(|series| points.iter().filter_map(|point| series.value(point)).collect())
        .collect();

    axis_domain(series.iter().map(Vec::as_slice))
}
