use crate::bidding::model::Bid;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Event published to an auction's topic after a bid commits.
///
/// Wire form: `{"type":"bid_placed","payload":{"bid":{...},"currentPrice":...}}`.
/// Produced once per accepted bid, never on an idempotent replay.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum AuctionEvent {
    BidPlaced(BidPlacedPayload),
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct BidPlacedPayload {
    pub bid: Bid,
    #[serde(rename = "currentPrice")]
    pub current_price: Decimal,
}

// region:    --- Tests


// endregion: --- Tests
