use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use super::errors::{MalformedMessage, ValidationError};
use super::value_objects::{Delivery, Item, Payment};

// ============================================================================
// Order Aggregate
// ============================================================================
//
// One purchase, keyed by `order_uid`. The identity never changes; the rest of
// the aggregate is replaced wholesale on every re-ingestion (last write wins).
//
// ============================================================================

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Order {
    pub order_uid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub track_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivery: Option<Delivery>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment: Option<Payment>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub items: Vec<Item>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub internal_signature: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivery_service: Option<String>,
    #[serde(rename = "shardkey", default, skip_serializing_if = "Option::is_none")]
    pub shard_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sm_id: Option<i64>,
    pub date_created: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oof_shard: Option<String>,
}

impl Order {
    /// Minimal order carrying only the required fields.
    pub fn new(order_uid: impl Into<String>, date_created: DateTime<Utc>) -> Self {
        Self {
            order_uid: order_uid.into(),
            track_number: None,
            entry: None,
            delivery: None,
            payment: None,
            items: Vec::new(),
            locale: None,
            internal_signature: None,
            customer_id: None,
            delivery_service: None,
            shard_key: None,
            sm_id: None,
            date_created: date_created.trunc_subsecs(6),
            oof_shard: None,
        }
    }

    /// Decode a feed payload into a validated, storage-normalized order.
    pub fn from_payload(payload: &[u8]) -> Result<Self, MalformedMessage> {
        let mut order: Order = serde_json::from_slice(payload)?;

        order.validate().map_err(|source| MalformedMessage::Invalid {
            order_uid: order.order_uid.clone(),
            source,
        })?;

        order.normalize();
        Ok(order)
    }

    /// Bring the order to the precision Postgres keeps (microseconds), so a
    /// cached copy equals the one read back from the store.
    pub fn normalize(&mut self) {
        self.date_created = self.date_created.trunc_subsecs(6);
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.order_uid.trim().is_empty() {
            return Err(ValidationError::BlankOrderUid);
        }

        if let Some(payment) = &self.payment {
            payment.validate()?;
        }

        for (index, item) in self.items.iter().enumerate() {
            item.validate(index)?;
        }

        Ok(())
    }
}

/// Producers that marshal an empty list as `null` still mean "no items".
fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<Item>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<Item>>::deserialize(deserializer)?.unwrap_or_default())
}

// ============================================================================
// Unit Tests
// ============================================================================
