/// Auction lifecycle commands.
/// 1. Create (DRAFT)
/// 2. Open (DRAFT -> OPEN)
/// 3. Close (-> CLOSED, idempotent)
// region:    --- Imports
use crate::auction::model::{Auction, AuctionStatus};
use crate::database::DatabaseManager;
use crate::error::Error;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;

// endregion: --- Imports

// region:    --- Commands

/// Auction creation command. Validated at the boundary before it reaches
/// the store.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CreateAuctionCommand {
    pub title: String,
    pub description: Option<String>,
    pub starting_price: Decimal,
    pub end_time: DateTime<Utc>,
}

const INSERT_AUCTION: &str = r#"
    INSERT INTO auctions (title, description, status, starting_price, current_price, end_time, created_by)
    VALUES ($1, $2, 'DRAFT', $3, $3, $4, $5)
    RETURNING id, title, description, status, starting_price, current_price, end_time, created_by, created_at, updated_at
"#;

const SELECT_AUCTION_FOR_UPDATE: &str = r#"
    SELECT id, title, description, status, starting_price, current_price, end_time, created_by, created_at, updated_at
    FROM auctions
    WHERE id = $1
    FOR UPDATE
"#;

const SET_STATUS: &str = r#"
    UPDATE auctions SET status = $1, updated_at = now()
    WHERE id = $2
    RETURNING id, title, description, status, starting_price, current_price, end_time, created_by, created_at, updated_at
"#;

/// 1. Create a DRAFT auction with `current_price = starting_price`.
pub async fn handle_create_auction(
    db_manager: &DatabaseManager,
    cmd: CreateAuctionCommand,
    created_by: i64,
) -> Result<Auction, Error> {
    info!(
        "{:<12} --> create auction requested: {:?}",
        "Lifecycle", cmd
    );

    if cmd.title.trim().is_empty() {
        return Err(Error::Validation("title is required".to_string()));
    }
    if cmd.starting_price < Decimal::ZERO {
        return Err(Error::Validation(
            "starting_price must be non-negative".to_string(),
        ));
    }

    db_manager
        .transaction(|tx| {
            Box::pin(async move {
                let auction = sqlx::query_as::<_, Auction>(INSERT_AUCTION)
                    .bind(&cmd.title)
                    .bind(&cmd.description)
                    .bind(cmd.starting_price)
                    .bind(cmd.end_time)
                    .bind(created_by)
                    .fetch_one(&mut **tx)
                    .await?;
                Ok(auction)
            })
        })
        .await
}

/// 2. Open a DRAFT auction.
///
/// The row lock is held across validation and write, and `now` is read
/// inside the same transaction so the expiry decision cannot drift from
/// the store's clock.
pub async fn handle_open_auction(db_manager: &DatabaseManager, id: i64) -> Result<Auction, Error> {
    info!("{:<12} --> open auction id: {}", "Lifecycle", id);

    db_manager
        .transaction(|tx| {
            Box::pin(async move {
                let auction = sqlx::query_as::<_, Auction>(SELECT_AUCTION_FOR_UPDATE)
                    .bind(id)
                    .fetch_optional(&mut **tx)
                    .await?
                    .ok_or(Error::NotFound)?;

                let now: DateTime<Utc> = sqlx::query_scalar("SELECT now()")
                    .fetch_one(&mut **tx)
                    .await?;

                if auction.status != AuctionStatus::Draft {
                    return Err(Error::InvalidState(auction.status.to_string()));
                }
                if auction.end_time <= now {
                    return Err(Error::Expired);
                }

                let opened = sqlx::query_as::<_, Auction>(SET_STATUS)
                    .bind(AuctionStatus::Open)
                    .bind(id)
                    .fetch_one(&mut **tx)
                    .await?;
                Ok(opened)
            })
        })
        .await
}

/// 3. Close an auction. Re-closing a CLOSED auction returns it unchanged.
pub async fn handle_close_auction(db_manager: &DatabaseManager, id: i64) -> Result<Auction, Error> {
    info!("{:<12} --> close auction id: {}", "Lifecycle", id);

    db_manager
        .transaction(|tx| {
            Box::pin(async move {
                let auction = sqlx::query_as::<_, Auction>(SELECT_AUCTION_FOR_UPDATE)
                    .bind(id)
                    .fetch_optional(&mut **tx)
                    .await?
                    .ok_or(Error::NotFound)?;

                if auction.status == AuctionStatus::Closed {
                    return Ok(auction);
                }

                let closed = sqlx::query_as::<_, Auction>(SET_STATUS)
                    .bind(AuctionStatus::Closed)
                    .bind(id)
                    .fetch_one(&mut **tx)
                    .await?;
                Ok(closed)
            })
        })
        .await
}

// endregion: --- Commands
