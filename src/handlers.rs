// region:    --- Imports
use crate::auction::lifecycle::{self, CreateAuctionCommand};
use crate::auction::model::Auction;
use crate::auth::{self, AuthKeys, AuthUser, Role};
use crate::bidding::commands::{self, PlaceBidCommand};
use crate::bidding::model::{Bid, PlaceBidRequest};
use crate::database::DatabaseManager;
use crate::error::Error;
use crate::fanout::{self, BidEventPublisher};
use crate::gateway::{self, SubscriptionRegistry};
use crate::message_broker::KafkaManager;
use crate::query;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{FromRef, Path, Query, State};
use axum::http::header::AUTHORIZATION;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::warn;

// endregion: --- Imports

// region:    --- App State

#[derive(Clone)]
pub struct AppState {
    pub db_manager: Arc<DatabaseManager>,
    pub kafka_manager: Arc<KafkaManager>,
    pub publisher: Arc<BidEventPublisher>,
    pub registry: Arc<SubscriptionRegistry>,
    pub auth_keys: AuthKeys,
}

impl FromRef<AppState> for AuthKeys {
    fn from_ref(state: &AppState) -> AuthKeys {
        state.auth_keys.clone()
    }
}

// endregion: --- App State

// region:    --- Command Handlers

/// Create a DRAFT auction. Admin only.
pub async fn handle_create_auction(
    State(state): State<AppState>,
    user: AuthUser,
    Json(cmd): Json<CreateAuctionCommand>,
) -> Result<impl IntoResponse, Error> {
    user.require_role(Role::Admin)?;
    let auction = lifecycle::handle_create_auction(&state.db_manager, cmd, user.id).await?;
    Ok((StatusCode::CREATED, Json(auction)))
}

/// Open a DRAFT auction for bidding. Admin only.
pub async fn handle_open_auction(
    State(state): State<AppState>,
    user: AuthUser,
    Path(auction_id): Path<i64>,
) -> Result<Json<Auction>, Error> {
    user.require_role(Role::Admin)?;
    let auction = lifecycle::handle_open_auction(&state.db_manager, auction_id).await?;

    // Best effort: have the bid topic exist before the first watcher
    // subscribes. The auction is open either way.
    if let Err(e) = state
        .kafka_manager
        .create_topic(&fanout::bid_topic(auction.id), 1, 1)
        .await
    {
        warn!("{:<12} --> bid topic creation failed: {}", "Handler", e);
    }

    Ok(Json(auction))
}

/// Close an auction. Idempotent. Admin only.
pub async fn handle_close_auction(
    State(state): State<AppState>,
    user: AuthUser,
    Path(auction_id): Path<i64>,
) -> Result<Json<Auction>, Error> {
    user.require_role(Role::Admin)?;
    let auction = lifecycle::handle_close_auction(&state.db_manager, auction_id).await?;
    Ok(Json(auction))
}

/// Submit a bid. Dealer only.
///
/// The BidEvent is published after the transaction commits; a publish
/// failure is logged and never turns an accepted bid into an error.
/// Idempotent replays return the original bid and publish nothing.
pub async fn handle_bid(
    State(state): State<AppState>,
    user: AuthUser,
    Path(auction_id): Path<i64>,
    Json(request): Json<PlaceBidRequest>,
) -> Result<impl IntoResponse, Error> {
    user.require_role(Role::Dealer)?;

    if request.idempotency_key.trim().is_empty() {
        return Err(Error::Validation("idempotencyKey is required".to_string()));
    }
    if request.amount <= Decimal::ZERO {
        return Err(Error::NonPositive);
    }

    let placed = commands::handle_place_bid(
        &state.db_manager,
        PlaceBidCommand {
            auction_id,
            bidder_id: user.id,
            amount: request.amount,
            idempotency_key: request.idempotency_key,
        },
    )
    .await?;

    if !placed.replayed {
        if let Err(e) = state
            .publisher
            .publish(auction_id, &placed.bid, placed.current_price)
            .await
        {
            warn!(
                "{:<12} --> event publish failed after commit: {}",
                "Handler", e
            );
        }
    }

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "bid": placed.bid,
            "currentPrice": placed.current_price,
        })),
    ))
}

// endregion: --- Command Handlers

// region:    --- Query Handlers

pub async fn handle_health() -> impl IntoResponse {
    Json(json!({"status": "ok"}))
}

/// List every auction.
pub async fn handle_list_auctions(
    State(state): State<AppState>,
) -> Result<Json<Vec<Auction>>, Error> {
    let auctions = query::handlers::list_auctions(&state.db_manager).await?;
    Ok(Json(auctions))
}

/// Fetch one auction.
pub async fn handle_get_auction(
    State(state): State<AppState>,
    Path(auction_id): Path<i64>,
) -> Result<Json<Auction>, Error> {
    let auction = query::handlers::get_auction(&state.db_manager, auction_id)
        .await?
        .ok_or(Error::NotFound)?;
    Ok(Json(auction))
}

/// Highest accepted bid amount, null when no bids exist yet.
pub async fn handle_get_highest_bid(
    State(state): State<AppState>,
    Path(auction_id): Path<i64>,
) -> Result<Json<Option<Decimal>>, Error> {
    let highest = query::handlers::get_highest_bid(&state.db_manager, auction_id).await?;
    Ok(Json(highest))
}

/// Bid history for one auction, newest first.
pub async fn handle_get_auction_bids(
    State(state): State<AppState>,
    Path(auction_id): Path<i64>,
) -> Result<Json<Vec<Bid>>, Error> {
    let bids = query::handlers::get_bid_history(&state.db_manager, auction_id).await?;
    Ok(Json(bids))
}

// endregion: --- Query Handlers

// region:    --- Realtime Gateway

#[derive(Debug, Deserialize)]
pub struct WsParams {
    token: Option<String>,
}

/// Websocket handshake. The watcher is authenticated before the upgrade;
/// an unauthenticated connection never reaches the subscription registry.
pub async fn handle_ws(
    State(state): State<AppState>,
    Query(params): Query<WsParams>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Result<Response, Error> {
    let token = params
        .token
        .or_else(|| {
            headers
                .get(AUTHORIZATION)
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.strip_prefix("Bearer "))
                .map(|token| token.to_string())
        })
        .ok_or_else(|| Error::Unauthorized("Missing token".to_string()))?;

    let watcher = auth::verify_token(&state.auth_keys, &token)?;
    let registry = Arc::clone(&state.registry);

    Ok(ws.on_upgrade(move |socket| gateway::client_session(socket, registry, watcher)))
}

// endregion: --- Realtime Gateway
