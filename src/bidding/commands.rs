/// Bid acceptance engine.
///
/// A submitted bid is validated and committed against the auction's current
/// state inside one transaction holding an exclusive lock on the auction
/// row. Duplicate retries are de-duplicated by idempotency key.
// region:    --- Imports
use crate::auction::model::{Auction, AuctionStatus};
use crate::bidding::model::Bid;
use crate::database::DatabaseManager;
use crate::error::Error;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

// endregion: --- Imports

// region:    --- Commands

/// Bid submission command, assembled at the boundary from the
/// authenticated caller, the path and the request body.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PlaceBidCommand {
    pub auction_id: i64,
    pub bidder_id: i64,
    pub amount: Decimal,
    pub idempotency_key: String,
}

/// Outcome of a bid submission.
///
/// `replayed` is true when the idempotency key matched an earlier accepted
/// bid; in that case `bid` is the original row and `current_price` is the
/// auction's price at replay time, which may exceed the bid's own amount.
/// Callers publish a BidEvent only for non-replayed outcomes.
#[derive(Debug, Clone)]
pub struct PlacedBid {
    pub bid: Bid,
    pub current_price: Decimal,
    pub replayed: bool,
}

// Bound wait for the auction row lock. A submission that cannot lock in
// time fails with the retryable `Timeout` instead of queueing forever.
const SET_LOCK_TIMEOUT: &str = "SET LOCAL lock_timeout = '5s'";

// Retries cover the narrow window where a duplicate key races its original
// past both idempotency lookups; the next attempt resolves via replay.
const MAX_RETRIES: u32 = 3;

const FIND_EXISTING_BID: &str = r#"
    SELECT id, auction_id, bidder_id, amount, idempotency_key, created_at
    FROM bids
    WHERE auction_id = $1 AND bidder_id = $2 AND idempotency_key = $3
"#;

const GET_CURRENT_PRICE: &str = "SELECT current_price FROM auctions WHERE id = $1";

const SELECT_AUCTION_FOR_UPDATE: &str = r#"
    SELECT id, title, description, status, starting_price, current_price, end_time, created_by, created_at, updated_at
    FROM auctions
    WHERE id = $1
    FOR UPDATE
"#;

const INSERT_BID: &str = r#"
    INSERT INTO bids (auction_id, bidder_id, amount, idempotency_key)
    VALUES ($1, $2, $3, $4)
    RETURNING id, auction_id, bidder_id, amount, idempotency_key, created_at
"#;

const UPDATE_CURRENT_PRICE: &str =
    "UPDATE auctions SET current_price = $1, updated_at = now() WHERE id = $2";

/// Validate and commit a single bid.
pub async fn handle_place_bid(
    db_manager: &DatabaseManager,
    cmd: PlaceBidCommand,
) -> Result<PlacedBid, Error> {
    info!("{:<12} --> place bid requested: {:?}", "Command", cmd);

    let mut attempts = 0;
    loop {
        let attempt_cmd = cmd.clone();
        let result = db_manager
            .transaction(|tx| Box::pin(async move { place_bid_in_tx(tx, attempt_cmd).await }))
            .await;

        match result {
            Err(Error::Database(e)) if is_lock_timeout(&e) => {
                warn!(
                    "{:<12} --> lock wait exceeded on auction {}",
                    "Command", cmd.auction_id
                );
                return Err(Error::Timeout);
            }
            Err(Error::Database(e)) if is_idempotency_conflict(&e) && attempts < MAX_RETRIES => {
                warn!(
                    "{:<12} --> idempotency key race on auction {}, retrying",
                    "Command", cmd.auction_id
                );
                attempts += 1;
                continue;
            }
            other => return other,
        }
    }
}

async fn place_bid_in_tx(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    cmd: PlaceBidCommand,
) -> Result<PlacedBid, Error> {
    sqlx::query(SET_LOCK_TIMEOUT).execute(&mut **tx).await?;

    // Idempotency first, before any lock escalation: a duplicate retry
    // must not wait on contention it has no use for, and must short-circuit
    // before the monotonic-price check (the original bid may no longer be
    // the highest).
    if let Some(existing) = find_existing_bid(tx, &cmd).await? {
        let current_price: Decimal = sqlx::query_scalar(GET_CURRENT_PRICE)
            .bind(cmd.auction_id)
            .fetch_optional(&mut **tx)
            .await?
            .ok_or(Error::NotFound)?;
        info!(
            "{:<12} --> replayed bid {} on auction {}",
            "Command", existing.id, cmd.auction_id
        );
        return Ok(PlacedBid {
            bid: existing,
            current_price,
            replayed: true,
        });
    }

    let auction = sqlx::query_as::<_, Auction>(SELECT_AUCTION_FOR_UPDATE)
        .bind(cmd.auction_id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or(Error::NotFound)?;

    // Re-check under the lock: a duplicate that raced its original past the
    // first lookup resolves to the committed row here instead of failing
    // the price check against its own amount.
    if let Some(existing) = find_existing_bid(tx, &cmd).await? {
        return Ok(PlacedBid {
            bid: existing,
            current_price: auction.current_price,
            replayed: true,
        });
    }

    let now: DateTime<Utc> = sqlx::query_scalar("SELECT now()")
        .fetch_one(&mut **tx)
        .await?;

    if auction.status != AuctionStatus::Open {
        return Err(Error::InvalidState(auction.status.to_string()));
    }
    if now >= auction.end_time {
        return Err(Error::Expired);
    }
    if cmd.amount <= auction.current_price {
        return Err(Error::TooLow {
            current_price: auction.current_price,
        });
    }
    if cmd.amount <= Decimal::ZERO {
        return Err(Error::NonPositive);
    }

    let bid = sqlx::query_as::<_, Bid>(INSERT_BID)
        .bind(cmd.auction_id)
        .bind(cmd.bidder_id)
        .bind(cmd.amount)
        .bind(&cmd.idempotency_key)
        .fetch_one(&mut **tx)
        .await?;

    sqlx::query(UPDATE_CURRENT_PRICE)
        .bind(cmd.amount)
        .bind(cmd.auction_id)
        .execute(&mut **tx)
        .await?;

    info!(
        "{:<12} --> bid {} accepted on auction {} at {}",
        "Command", bid.id, cmd.auction_id, cmd.amount
    );

    Ok(PlacedBid {
        bid,
        current_price: cmd.amount,
        replayed: false,
    })
}

async fn find_existing_bid(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    cmd: &PlaceBidCommand,
) -> Result<Option<Bid>, sqlx::Error> {
    sqlx::query_as::<_, Bid>(FIND_EXISTING_BID)
        .bind(cmd.auction_id)
        .bind(cmd.bidder_id)
        .bind(&cmd.idempotency_key)
        .fetch_optional(&mut **tx)
        .await
}

// SQLSTATE 55P03: lock_not_available (lock_timeout expired).
fn is_lock_timeout(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .and_then(|db| db.code())
        .is_some_and(|code| code == "55P03")
}

// SQLSTATE 23505: unique_violation on the idempotency constraint.
fn is_idempotency_conflict(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .is_some_and(|db| db.code().is_some_and(|code| code == "23505"))
}

// endregion: --- Commands
