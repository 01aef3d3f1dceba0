//! Decoding of the ISS columnar wire format.
//!
//! Every ISS endpoint answers with one or more named blocks shaped as
//! `{ "<block>": { "columns": [..], "data": [[..], ..] } }`. Blocks may be legitimately absent
//! when a query has no rows, so an absent or malformed block decodes to zero rows rather than an
//! error.

use crate::error::MoexError;
use serde::{Deserialize, Deserializer, de::DeserializeOwned};
use serde_json::{Map, Value};
use tracing::{debug, warn};

/// One decoded ISS row, keyed by column name. Values are passed through exactly as received.
pub type IssRow = Map<String, Value>;

/// Raw ISS block before it is zipped into rows.
#[derive(Clone, PartialEq, Debug, Deserialize)]
pub struct IssBlock {
    pub columns: Vec<String>,
    pub data: Vec<Vec<Value>>,
}

impl IssBlock {
    /// Extract the block named `name` from an ISS response, if present and well formed.
    pub fn from_response(response: &Value, name: &str) -> Option<Self> {
        let Some(raw) = response.get(name) else {
            let available = response
                .as_object()
                .map(|blocks| blocks.keys().cloned().collect::<Vec<_>>())
                .unwrap_or_default();
            warn!(block = name, ?available, "ISS block not found in response");
            return None;
        };

        let block = match Self::deserialize(raw) {
            Ok(block) => block,
            Err(error) => {
                warn!(block = name, %error, "ISS block is missing columns or data");
                return None;
            }
        };

        if let Some(row) = block
            .data
            .iter()
            .position(|row| row.len() != block.columns.len())
        {
            warn!(
                block = name,
                row,
                columns = block.columns.len(),
                "ISS block row width does not match column count"
            );
            return None;
        }

        Some(block)
    }

    /// Zip the column names onto every row, preserving row order.
    pub fn into_rows(self) -> Vec<IssRow> {
        let Self { columns, data } = self;
        data.into_iter()
            .map(|row| columns.iter().cloned().zip(row).collect())
            .collect()
    }
}

/// Decode the block named `block` into keyed rows.
///
/// Returns an empty vector when the block is absent or malformed.
pub fn decode_rows(response: &Value, block: &str) -> Vec<IssRow> {
    let rows = IssBlock::from_response(response, block)
        .map(IssBlock::into_rows)
        .unwrap_or_default();

    debug!(block, rows = rows.len(), "decoded ISS block");
    rows
}

/// Decode the block named `block` into schema-validated records.
///
/// Decoding fails closed: if any row does not match `T` the whole block decodes to an empty
/// vector, so a partially populated result never escapes.
pub fn decode_block<T>(response: &Value, block: &str) -> Vec<T>
where
    T: DeserializeOwned,
{
    let rows = decode_rows(response, block);
    let total = rows.len();

    rows.into_iter()
        .enumerate()
        .map(|(index, row)| {
            serde_json::from_value::<T>(Value::Object(row)).map_err(|error| (index, error))
        })
        .collect::<Result<Vec<T>, _>>()
        .unwrap_or_else(|(row, error)| {
            warn!(block, row, total, %error, "ISS row failed schema validation, dropping block");
            Vec::new()
        })
}

/// Decode the first of `blocks` that yields any records.
///
/// Some AlgoPack endpoints answer under a block named after the endpoint, others under a generic
/// `data` block.
pub fn decode_first_block<T>(response: &Value, blocks: &[&str]) -> Vec<T>
where
    T: DeserializeOwned,
{
    blocks
        .iter()
        .map(|block| decode_block::<T>(response, block))
        .find(|records| !records.is_empty())
        .unwrap_or_default()
}

/// Decode the first of `blocks` that carries any rows, failing if one of those rows does not
/// match `T`.
///
/// Unlike [`decode_first_block`], rows that are present but fail schema validation are an error
/// rather than zero records, so a paginated walk never mistakes them for the end of data. Absent
/// and malformed blocks still decode to zero records.
pub fn try_decode_first_block<T>(response: &Value, blocks: &[&str]) -> Result<Vec<T>, MoexError>
where
    T: DeserializeOwned,
{
    let Some((block, rows)) = blocks
        .iter()
        .map(|block| (*block, decode_rows(response, block)))
        .find(|(_, rows)| !rows.is_empty())
    else {
        return Ok(Vec::new());
    };

    let total = rows.len();
    rows.into_iter()
        .enumerate()
        .map(|(index, row)| {
            serde_json::from_value::<T>(Value::Object(row)).map_err(|error| {
                warn!(block, row = index, total, %error, "ISS row failed schema validation");
                MoexError::Decode(format!("{block} row {index}: {error}"))
            })
        })
        .collect()
}

/// Deserialize a number or a numeric string as an `f64`.
pub fn de_flex_f64<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    de_flex_opt_f64(deserializer)?
        .ok_or_else(|| serde::de::Error::custom("expected a number, found null"))
}

/// Deserialize an optional number, numeric string, empty string or null as an `Option<f64>`.
pub fn de_flex_opt_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(None),
        Value::Number(number) => Ok(number.as_f64()),
        Value::String(raw) if raw.trim().is_empty() => Ok(None),
        Value::String(raw) => raw
            .trim()
            .parse::<f64>()
            .map(Some)
            .map_err(serde::de::Error::custom),
        other => Err(serde::de::Error::custom(format!(
            "expected a number, found {other}"
        ))),
    }
}

/// Deserialize an integral number or numeric string as an `i64`.
///
/// ISS occasionally reports integral quantities as floats (eg/ `100.0`).
pub fn de_flex_i64<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = de_flex_f64(deserializer)?;
    if value.fract() != 0.0 || !value.is_finite() {
        return Err(serde::de::Error::custom(format!(
            "expected an integer, found {value}"
        )));
    }
    Ok(value as i64)
}
