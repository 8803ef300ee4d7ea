// region:    --- Imports
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

// endregion: --- Imports

// region:    --- Auction Status

/// Lifecycle state of an auction. Transitions only move forward:
/// DRAFT -> OPEN -> CLOSED, and CLOSED is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum AuctionStatus {
    Draft,
    Open,
    Closed,
}

impl AuctionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuctionStatus::Draft => "DRAFT",
            AuctionStatus::Open => "OPEN",
            AuctionStatus::Closed => "CLOSED",
        }
    }
}

impl std::fmt::Display for AuctionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// endregion: --- Auction Status

// region:    --- Auction

/// One biddable lot. `current_price` starts at `starting_price` and is only
/// ever raised by an accepted bid while the auction is OPEN.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Auction {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub status: AuctionStatus,
    pub starting_price: Decimal,
    pub current_price: Decimal,
    pub end_time: DateTime<Utc>,
    pub created_by: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// endregion: --- Auction

// region:    --- Tests


// endregion: --- Tests
