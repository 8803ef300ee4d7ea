/// List every auction, newest first.
pub const LIST_AUCTIONS: &str = "SELECT id, title, description, status, starting_price, current_price, end_time, created_by, created_at, updated_at FROM auctions ORDER BY created_at DESC";

/// Fetch one auction.
pub const GET_AUCTION: &str = "SELECT id, title, description, status, starting_price, current_price, end_time, created_by, created_at, updated_at FROM auctions WHERE id = $1";

/// Bid history for one auction, newest first.
pub const GET_BID_HISTORY: &str = r#"
    SELECT id, auction_id, bidder_id, amount, idempotency_key, created_at
    FROM bids
    WHERE auction_id = $1
    ORDER BY created_at DESC
"#;

/// Highest accepted bid amount for one auction.
pub const GET_HIGHEST_BID: &str =
    "SELECT MAX(amount) as highest_bid FROM bids WHERE auction_id = $1";
