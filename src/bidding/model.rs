use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// An accepted bid. Created exactly once, atomically with the owning
/// auction's price update, and never mutated afterward.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Bid {
    pub id: i64,
    pub auction_id: i64,
    pub bidder_id: i64,
    pub amount: Decimal,
    pub idempotency_key: String,
    pub created_at: DateTime<Utc>,
}

/// Wire-side bid submission body.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaceBidRequest {
    pub amount: Decimal,
    pub idempotency_key: String,
}

// region:    --- Tests


// endregion: --- Tests
