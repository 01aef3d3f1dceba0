//! Signals derived from reconciled and merged series.
//!
//! Every signal is recomputed from its inputs on each call; nothing is persisted.

/// Price versus institutional positioning divergence over a trailing window.
pub mod divergence;

/// Relative volume of today's partial session against a trailing baseline.
pub mod rvol;

/// Padded value range for chart axes.
pub mod domain;

pub use divergence::{DIVERGENCE_WINDOW, DivergenceLabel, divergence};
pub use domain::{DEFAULT_DOMAIN, PositionSeries, axis_domain, position_axis_domain};
pub use rvol::{
    MIN_TRAILING_DAYS, Rvol, RvolLevel, SessionWindow, relative_volume, relative_volume_at,
    volumes_to_cutoff,
};
