use serde::{Deserialize, Serialize};

use super::errors::ValidationError;

// ============================================================================
// Order Value Objects
// ============================================================================

/// Recipient block of an order. All-or-nothing: when present on the wire,
/// every field must be there.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Delivery {
    pub name: String,
    pub phone: String,
    pub zip: String,
    pub city: String,
    pub address: String,
    pub region: String,
    pub email: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct Payment {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<i64>,
    /// Unix seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_dt: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bank: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivery_cost: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub goods_total: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_fee: Option<i64>,
}

impl Payment {
    pub(crate) fn validate(&self) -> Result<(), ValidationError> {
        let amounts = [
            ("payment.amount", self.amount),
            ("payment.delivery_cost", self.delivery_cost),
            ("payment.goods_total", self.goods_total),
            ("payment.custom_fee", self.custom_fee),
        ];

        for (field, value) in amounts {
            if let Some(value) = value {
                if value < 0 {
                    return Err(ValidationError::NegativeAmount { field, value });
                }
            }
        }

        Ok(())
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct Item {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chrt_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub track_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Discount in percent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sale: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_price: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nm_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brand: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<i32>,
}

impl Item {
    pub(crate) fn validate(&self, index: usize) -> Result<(), ValidationError> {
        for (field, value) in [("price", self.price), ("total_price", self.total_price)] {
            if let Some(value) = value {
                if value < 0 {
                    return Err(ValidationError::NegativeItemAmount { index, field, value });
                }
            }
        }

        if let Some(sale) = self.sale {
            if !(0..=100).contains(&sale) {
                return Err(ValidationError::SaleOutOfRange { index, sale });
            }
        }

        Ok(())
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
