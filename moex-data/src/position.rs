//! FUTOI position reconciliation.
//!
//! The exchange publishes open interest split by trader class, one row per class per timestamp.
//! This module joins those rows into one [`PositionSnapshot`] per timestamp, keeping a class that
//! never reported explicitly absent so downstream signal maths never sees fabricated zeros.

use crate::iss::{de_flex_i64, de_flex_opt_f64};
use derive_more::Display;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::{collections::HashMap, str::FromStr};
use tracing::{debug, info};

/// Reporting category used to split FUTOI position data.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Display, Deserialize, Serialize)]
pub enum TraderClass {
    /// Legal entities, tagged `YUR` upstream.
    #[display("YUR")]
    Institutional,
    /// Private individuals, tagged `FIZ` upstream.
    #[display("FIZ")]
    Retail,
}

impl FromStr for TraderClass {
    type Err = String;

    fn from_str(tag: &str) -> Result<Self, Self::Err> {
        match tag.trim() {
            tag if tag.eq_ignore_ascii_case("YUR") => Ok(TraderClass::Institutional),
            tag if tag.eq_ignore_ascii_case("FIZ") => Ok(TraderClass::Retail),
            other => Err(format!("unknown trader class tag: {other}")),
        }
    }
}

/// FUTOI row as published in the ISS `futoi` block.
///
/// See docs: <https://moexalgo.github.io/api/rest/#futoi>
#[derive(Clone, PartialEq, Debug, Deserialize, Serialize)]
pub struct FutoiRow {
    #[serde(default)]
    pub sess_id: Option<i64>,
    #[serde(default)]
    pub seqnum: Option<i64>,
    pub tradedate: String,
    pub tradetime: String,
    pub ticker: String,
    pub clgroup: String,
    #[serde(default, deserialize_with = "de_flex_opt_f64")]
    pub pos: Option<f64>,
    #[serde(deserialize_with = "de_flex_i64")]
    pub pos_long: i64,
    #[serde(deserialize_with = "de_flex_i64")]
    pub pos_short: i64,
    #[serde(deserialize_with = "de_flex_i64")]
    pub pos_long_num: i64,
    #[serde(deserialize_with = "de_flex_i64")]
    pub pos_short_num: i64,
    #[serde(default)]
    pub systime: Option<String>,
}

/// One trader-class snapshot at one instant.
#[derive(Clone, Eq, PartialEq, Hash, Debug, Deserialize, Serialize)]
pub struct RawPositionRecord {
    pub trade_date: SmolStr,
    pub trade_time: SmolStr,
    pub ticker: SmolStr,
    pub class: TraderClass,
    pub long: i64,
    pub short: i64,
    pub long_participants: i64,
    pub short_participants: i64,
}

impl TryFrom<FutoiRow> for RawPositionRecord {
    type Error = String;

    fn try_from(row: FutoiRow) -> Result<Self, Self::Error> {
        Ok(Self {
            class: row.clgroup.parse()?,
            trade_date: SmolStr::new(row.tradedate),
            trade_time: SmolStr::new(row.tradetime),
            ticker: SmolStr::new(row.ticker),
            long: row.pos_long,
            short: row.pos_short,
            long_participants: row.pos_long_num,
            short_participants: row.pos_short_num,
        })
    }
}

/// Convert wire rows to records, skipping rows with an unrecognised trader class.
pub fn records_from_rows(rows: Vec<FutoiRow>) -> Vec<RawPositionRecord> {
    rows.into_iter()
        .filter_map(|row| match RawPositionRecord::try_from(row) {
            Ok(record) => Some(record),
            Err(error) => {
                debug!(%error, "skipping FUTOI row");
                None
            }
        })
        .collect()
}

/// Aggregate position of one trader class at one instant.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Default, Deserialize, Serialize)]
pub struct ClassPosition {
    pub long: i64,
    pub short: i64,
    /// `long - short`
    pub net: i64,
    pub long_participants: i64,
    pub short_participants: i64,
}

impl ClassPosition {
    pub fn participants(&self) -> i64 {
        self.long_participants + self.short_participants
    }

    pub fn open_interest(&self) -> i64 {
        self.long + self.short
    }
}

impl From<&RawPositionRecord> for ClassPosition {
    fn from(record: &RawPositionRecord) -> Self {
        Self {
            long: record.long,
            short: record.short,
            net: record.long - record.short,
            long_participants: record.long_participants,
            short_participants: record.short_participants,
        }
    }
}

/// Positions of both trader classes at one `(date, time)`.
#[derive(Clone, Eq, PartialEq, Hash, Debug, Deserialize, Serialize)]
pub struct PositionSnapshot {
    pub trade_date: SmolStr,
    pub trade_time: SmolStr,
    pub institutional: Option<ClassPosition>,
    pub retail: Option<ClassPosition>,
}

impl PositionSnapshot {
    pub fn new(trade_date: impl Into<SmolStr>, trade_time: impl Into<SmolStr>) -> Self {
        Self {
            trade_date: trade_date.into(),
            trade_time: trade_time.into(),
            institutional: None,
            retail: None,
        }
    }

    pub fn with_class(mut self, class: TraderClass, position: ClassPosition) -> Self {
        *self.slot_mut(class) = Some(position);
        self
    }

    pub fn class(&self, class: TraderClass) -> Option<&ClassPosition> {
        match class {
            TraderClass::Institutional => self.institutional.as_ref(),
            TraderClass::Retail => self.retail.as_ref(),
        }
    }

    fn slot_mut(&mut self, class: TraderClass) -> &mut Option<ClassPosition> {
        match class {
            TraderClass::Institutional => &mut self.institutional,
            TraderClass::Retail => &mut self.retail,
        }
    }

    /// `true` once both trader classes have reported.
    pub fn is_complete(&self) -> bool {
        self.institutional.is_some() && self.retail.is_some()
    }

    /// `Σ(long + short)` over both classes; absent until the snapshot is complete.
    pub fn total_open_interest(&self) -> Option<i64> {
        Some(self.institutional?.open_interest() + self.retail?.open_interest())
    }

    /// Participant count over both classes; absent until the snapshot is complete.
    pub fn total_participants(&self) -> Option<i64> {
        Some(self.institutional?.participants() + self.retail?.participants())
    }

    /// `"<date> <time>"` key as displayed by the dashboard.
    pub fn timestamp(&self) -> String {
        format!("{} {}", self.trade_date, self.trade_time)
    }
}

/// Group records by `(date, time)` in ascending order, keeping classes that never reported
/// absent. A later record for the same class and timestamp replaces an earlier one.
pub fn group_snapshots(records: &[RawPositionRecord]) -> Vec<PositionSnapshot> {
    let mut grouped: HashMap<(&str, &str), PositionSnapshot> = HashMap::new();

    for record in records {
        let snapshot = grouped
            .entry((record.trade_date.as_str(), record.trade_time.as_str()))
            .or_insert_with(|| {
                PositionSnapshot::new(record.trade_date.clone(), record.trade_time.clone())
            });
        *snapshot.slot_mut(record.class) = Some(ClassPosition::from(record));
    }

    grouped
        .into_values()
        .sorted_by(|a, b| {
            a.trade_date
                .cmp(&b.trade_date)
                .then_with(|| a.trade_time.cmp(&b.trade_time))
        })
        .collect()
}

/// Reconcile raw records into complete per-timestamp snapshots.
///
/// Timestamps at which only one trader class reported are dropped.
pub fn reconcile(records: &[RawPositionRecord]) -> Vec<PositionSnapshot> {
    let grouped = group_snapshots(records);
    let groups = grouped.len();
    let snapshots: Vec<_> = grouped
        .into_iter()
        .filter(PositionSnapshot::is_complete)
        .collect();

    info!(
        records = records.len(),
        groups,
        complete = snapshots.len(),
        "reconciled FUTOI records"
    );
    snapshots
}

/// Long/short positions of both classes plus the smart money divergence flag.
#[derive(Clone, Eq, PartialEq, Hash, Debug, Deserialize, Serialize)]
pub struct FlowSummary {
    pub timestamp: String,
    pub institutional_long: i64,
    pub institutional_short: i64,
    pub retail_long: i64,
    pub retail_short: i64,
    /// Institutional longs increased while retail longs decreased since the previous summary.
    pub divergence: bool,
}

/// Build the smart money flow series from raw records.
pub fn smart_money_flow(records: &[RawPositionRecord]) -> Vec<FlowSummary> {
    let mut flows: Vec<FlowSummary> = Vec::new();

    for snapshot in reconcile(records) {
        let (Some(institutional), Some(retail)) = (snapshot.institutional, snapshot.retail) else {
            continue;
        };

        let divergence = flows.last().is_some_and(|prev| {
            institutional.long > prev.institutional_long && retail.long < prev.retail_long
        });

        flows.push(FlowSummary {
            timestamp: snapshot.timestamp(),
            institutional_long: institutional.long,
            institutional_short: institutional.short,
            retail_long: retail.long,
            retail_short: retail.short,
            divergence,
        });
    }

    flows
}
