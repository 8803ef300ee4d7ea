/// Event fanout: one topic per auction, one event per accepted bid.
// region:    --- Imports
use crate::auction::events::{AuctionEvent, BidPlacedPayload};
use crate::bidding::model::Bid;
use crate::error::Error;
use crate::message_broker::KafkaProducer;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::info;

// endregion: --- Imports

// region:    --- Topics

/// Regex subscription matching every auction's bid topic.
pub const BID_TOPIC_PATTERN: &str = "^auction\\..*\\.bids$";

/// Topic carrying one auction's accepted bids: `auction.<id>.bids`.
pub fn bid_topic(auction_id: i64) -> String {
    format!("auction.{}.bids", auction_id)
}

/// Inverse of [`bid_topic`]. None for topics outside the scheme.
pub fn parse_bid_topic(topic: &str) -> Option<i64> {
    topic
        .strip_prefix("auction.")?
        .strip_suffix(".bids")?
        .parse()
        .ok()
}

// endregion: --- Topics

// region:    --- Publisher

/// Publishes accepted bids to their auction's topic.
///
/// Fire-and-forget from the bid path's perspective: the bid is already
/// committed when this runs, and a publish failure must never surface as a
/// bid-placement error. Callers log the `Transport` failure and move on.
pub struct BidEventPublisher {
    producer: Arc<KafkaProducer>,
}

impl BidEventPublisher {
    pub fn new(producer: Arc<KafkaProducer>) -> Self {
        Self { producer }
    }

    pub async fn publish(
        &self,
        auction_id: i64,
        bid: &Bid,
        current_price: Decimal,
    ) -> Result<(), Error> {
        let event = AuctionEvent::BidPlaced(BidPlacedPayload {
            bid: bid.clone(),
            current_price,
        });
        let payload = serde_json::to_string(&event).map_err(|e| Error::Transport(e.to_string()))?;

        self.producer
            .send_message(&bid_topic(auction_id), &bid.id.to_string(), &payload)
            .await
            .map_err(Error::Transport)?;

        info!(
            "{:<12} --> published bid {} to {}",
            "Fanout",
            bid.id,
            bid_topic(auction_id)
        );
        Ok(())
    }
}

// endregion: --- Publisher

// region:    --- Tests


// endregion: --- Tests
