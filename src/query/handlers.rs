// region:    --- Imports
use super::queries;
use crate::auction::model::Auction;
use crate::bidding::model::Bid;
use crate::database::DatabaseManager;
use crate::error::Error;
use rust_decimal::Decimal;
use sqlx::Row;
use tracing::info;

// endregion: --- Imports

// region:    --- Query Handlers

/// List every auction.
pub async fn list_auctions(db_manager: &DatabaseManager) -> Result<Vec<Auction>, Error> {
    info!("{:<12} --> list auctions", "Query");
    db_manager
        .transaction(|tx| {
            Box::pin(async move {
                let auctions = sqlx::query_as::<_, Auction>(queries::LIST_AUCTIONS)
                    .fetch_all(&mut **tx)
                    .await?;
                Ok(auctions)
            })
        })
        .await
}

/// Fetch one auction.
pub async fn get_auction(
    db_manager: &DatabaseManager,
    auction_id: i64,
) -> Result<Option<Auction>, Error> {
    info!("{:<12} --> get auction id: {}", "Query", auction_id);
    db_manager
        .transaction(|tx| {
            Box::pin(async move {
                let auction = sqlx::query_as::<_, Auction>(queries::GET_AUCTION)
                    .bind(auction_id)
                    .fetch_optional(&mut **tx)
                    .await?;
                Ok(auction)
            })
        })
        .await
}

/// Bid history for one auction, newest first.
pub async fn get_bid_history(
    db_manager: &DatabaseManager,
    auction_id: i64,
) -> Result<Vec<Bid>, Error> {
    info!("{:<12} --> bid history id: {}", "Query", auction_id);
    db_manager
        .transaction(|tx| {
            Box::pin(async move {
                let bids = sqlx::query_as::<_, Bid>(queries::GET_BID_HISTORY)
                    .bind(auction_id)
                    .fetch_all(&mut **tx)
                    .await?;
                Ok(bids)
            })
        })
        .await
}

/// Highest accepted bid amount, None when no bids exist yet.
pub async fn get_highest_bid(
    db_manager: &DatabaseManager,
    auction_id: i64,
) -> Result<Option<Decimal>, Error> {
    info!("{:<12} --> highest bid id: {}", "Query", auction_id);
    db_manager
        .transaction(|tx| {
            Box::pin(async move {
                let result = sqlx::query(queries::GET_HIGHEST_BID)
                    .bind(auction_id)
                    .fetch_one(&mut **tx)
                    .await?;

                Ok(result.get("highest_bid"))
            })
        })
        .await
}

// endregion: --- Query Handlers
