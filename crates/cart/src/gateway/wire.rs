//! Wire records and their conversion to core cart types.
//!
//! [`CartLineRecord`] is the only type shaped like the backend JSON. Older
//! backend revisions used different field names (`cartItemId`, `id`, `name`,
//! `price`, `source`, `imageUrl`); they are accepted as aliases here and go
//! no further.

use std::num::NonZeroU32;

use atelier_core::{
    CartLine, CartSnapshot, LineId, SnapshotError, SourceKind, TargetId, UnitPrice,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

/// Reasons a cart record is rejected.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RecordError {
    /// Quantity is zero, negative or too large.
    #[error("line {line_id} has invalid quantity {quantity}")]
    InvalidQuantity {
        /// Offending line.
        line_id: String,
        /// Quantity as sent by the backend.
        quantity: i64,
    },
    /// Price is negative.
    #[error("line {line_id} has negative price {price}")]
    NegativePrice {
        /// Offending line.
        line_id: String,
        /// Price as sent by the backend.
        price: Decimal,
    },
    /// A required id is empty.
    #[error("line has an empty {0}")]
    EmptyId(&'static str),
    /// Records break a cart-wide invariant.
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
}

/// One cart line as sent by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLineRecord {
    #[serde(alias = "cartItemId", deserialize_with = "string_or_number")]
    pub line_id: String,
    #[serde(alias = "id", deserialize_with = "string_or_number")]
    pub target_id: String,
    #[serde(alias = "source")]
    pub source_kind: SourceKind,
    #[serde(alias = "name", default)]
    pub display_name: String,
    #[serde(alias = "price")]
    pub unit_price: Decimal,
    #[serde(alias = "imageUrl", default, skip_serializing_if = "Option::is_none")]
    pub image_ref: Option<String>,
    pub quantity: i64,
}

impl TryFrom<CartLineRecord> for CartLine {
    type Error = RecordError;

    fn try_from(record: CartLineRecord) -> Result<Self, Self::Error> {
        if record.line_id.is_empty() {
            return Err(RecordError::EmptyId("line id"));
        }
        if record.target_id.is_empty() {
            return Err(RecordError::EmptyId("target id"));
        }

        let quantity = u32::try_from(record.quantity)
            .ok()
            .and_then(NonZeroU32::new)
            .ok_or_else(|| RecordError::InvalidQuantity {
                line_id: record.line_id.clone(),
                quantity: record.quantity,
            })?;

        let unit_price =
            UnitPrice::new(record.unit_price).map_err(|_| RecordError::NegativePrice {
                line_id: record.line_id.clone(),
                price: record.unit_price,
            })?;

        Ok(Self {
            line_id: LineId::new(record.line_id),
            target_id: TargetId::new(record.target_id),
            source: record.source_kind,
            display_name: record.display_name,
            unit_price,
            image_ref: record.image_ref.filter(|url| !url.is_empty()),
            quantity,
        })
    }
}

impl From<&CartLine> for CartLineRecord {
    fn from(line: &CartLine) -> Self {
        Self {
            line_id: line.line_id.to_string(),
            target_id: line.target_id.to_string(),
            source_kind: line.source,
            display_name: line.display_name.clone(),
            unit_price: line.unit_price.amount(),
            image_ref: line.image_ref.clone(),
            quantity: i64::from(line.quantity.get()),
        }
    }
}

/// Convert a full fetch response. Any invalid record rejects the whole cart.
///
/// # Errors
///
/// Returns [`RecordError`] for the first invalid record or a duplicate line.
pub fn into_snapshot(records: Vec<CartLineRecord>) -> Result<CartSnapshot, RecordError> {
    let lines = records
        .into_iter()
        .map(CartLine::try_from)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(CartSnapshot::from_lines(lines)?)
}

/// Accept ids sent either as JSON strings or numbers.
fn string_or_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number id, got {other}"
        ))),
    }
}
