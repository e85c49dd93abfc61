// ============================================================================
// Order Validation Errors
// ============================================================================

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("order_uid must not be blank")]
    BlankOrderUid,

    #[error("{field} must not be negative, got {value}")]
    NegativeAmount { field: &'static str, value: i64 },

    #[error("items[{index}].{field} must not be negative, got {value}")]
    NegativeItemAmount {
        index: usize,
        field: &'static str,
        value: i64,
    },

    #[error("items[{index}].sale must be within 0..=100, got {sale}")]
    SaleOutOfRange { index: usize, sale: i32 },
}

/// A payload that can never be ingested, no matter how often it is redelivered.
#[derive(Debug, thiserror::Error)]
pub enum MalformedMessage {
    #[error("payload is not a valid order document: {0}")]
    Undecodable(#[from] serde_json::Error),

    #[error("order {order_uid:?} failed validation: {source}")]
    Invalid {
        order_uid: String,
        #[source]
        source: ValidationError,
    },
}
