//! End-to-end tests against a running service.
//!
//! These need the full stack (Postgres, Kafka, the service itself) and are
//! therefore ignored by default:
//!
//! ```sh
//! RECREATE_DB=1 cargo run &
//! cargo test -- --ignored
//! ```

use bidding_service::auth::{self, AuthKeys, AuthUser, Role};
use chrono::{Duration, Utc};
use reqwest::{Client, StatusCode};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use tracing::info;

/// Tracing setup for tests that want to watch the storm.
fn init_tracing() {
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .without_time()
        .with_target(false)
        .with_test_writer()
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

fn base_url() -> String {
    std::env::var("BASE_URL").unwrap_or_else(|_| "http://localhost:4000".to_string())
}

fn keys() -> AuthKeys {
    let secret =
        std::env::var("JWT_SECRET").unwrap_or_else(|_| "dev_jwt_secret_change_me".to_string());
    AuthKeys::new(&secret)
}

fn admin_token() -> String {
    auth::sign_token(
        &keys(),
        &AuthUser {
            id: 1,
            role: Role::Admin,
            email: "admin@example.com".to_string(),
        },
    )
    .expect("sign admin token")
}

fn dealer_token(id: i64) -> String {
    auth::sign_token(
        &keys(),
        &AuthUser {
            id,
            role: Role::Dealer,
            email: format!("dealer{}@example.com", id),
        },
    )
    .expect("sign dealer token")
}

fn decimal(value: &Value) -> Decimal {
    serde_json::from_value(value.clone()).expect("decimal field")
}

/// Create a DRAFT auction and return its id.
async fn create_auction(client: &Client, starting_price: Decimal, end_in: Duration) -> i64 {
    let response = client
        .post(format!("{}/auctions", base_url()))
        .bearer_auth(admin_token())
        .json(&json!({
            "title": "Lot 1962 roadster",
            "description": "Integration test lot",
            "starting_price": starting_price,
            "end_time": Utc::now() + end_in,
        }))
        .send()
        .await
        .expect("create auction request");
    assert_eq!(response.status(), StatusCode::CREATED);
    let auction: Value = response.json().await.expect("auction body");
    assert_eq!(auction["status"], "DRAFT");
    auction["id"].as_i64().expect("auction id")
}

async fn open_auction(client: &Client, auction_id: i64) -> (StatusCode, Value) {
    let response = client
        .post(format!("{}/auctions/{}/open", base_url(), auction_id))
        .bearer_auth(admin_token())
        .send()
        .await
        .expect("open auction request");
    let status = response.status();
    let body: Value = response.json().await.expect("open body");
    (status, body)
}

async fn close_auction(client: &Client, auction_id: i64) -> (StatusCode, Value) {
    let response = client
        .post(format!("{}/auctions/{}/close", base_url(), auction_id))
        .bearer_auth(admin_token())
        .send()
        .await
        .expect("close auction request");
    let status = response.status();
    let body: Value = response.json().await.expect("close body");
    (status, body)
}

async fn place_bid(
    client: &Client,
    auction_id: i64,
    dealer_id: i64,
    amount: Decimal,
    key: &str,
) -> (StatusCode, Value) {
    let response = client
        .post(format!("{}/auctions/{}/bids", base_url(), auction_id))
        .bearer_auth(dealer_token(dealer_id))
        .json(&json!({ "amount": amount, "idempotencyKey": key }))
        .send()
        .await
        .expect("place bid request");
    let status = response.status();
    let body: Value = response.json().await.expect("bid body");
    (status, body)
}

async fn get_auction(client: &Client, auction_id: i64) -> Value {
    let response = client
        .get(format!("{}/auctions/{}", base_url(), auction_id))
        .send()
        .await
        .expect("get auction request");
    assert_eq!(response.status(), StatusCode::OK);
    response.json().await.expect("auction body")
}

async fn get_bids(client: &Client, auction_id: i64) -> Vec<Value> {
    let response = client
        .get(format!("{}/auctions/{}/bids", base_url(), auction_id))
        .send()
        .await
        .expect("get bids request");
    assert_eq!(response.status(), StatusCode::OK);
    response.json().await.expect("bids body")
}

/// Bid, replay the same key, then underbid with a fresh key.
#[tokio::test]
#[ignore = "requires the full stack: Postgres, Kafka and a running service"]
async fn test_bid_replay_scenario() {
    let client = Client::new();
    let auction_id = create_auction(&client, dec!(100), Duration::hours(2)).await;
    let (status, _) = open_auction(&client, auction_id).await;
    assert_eq!(status, StatusCode::OK);

    // First submission is accepted at 150.
    let (status, first) = place_bid(&client, auction_id, 7, dec!(150), "k1").await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(decimal(&first["bid"]["amount"]), dec!(150));
    assert_eq!(decimal(&first["currentPrice"]), dec!(150));

    // Retrying the same key returns the identical bid, not a second one.
    let (status, replay) = place_bid(&client, auction_id, 7, dec!(150), "k1").await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(replay["bid"]["id"], first["bid"]["id"]);
    assert_eq!(decimal(&replay["currentPrice"]), dec!(150));

    // A lower amount under a fresh key is rejected.
    let (status, rejected) = place_bid(&client, auction_id, 7, dec!(140), "k2").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(rejected["code"], "TOO_LOW");

    // Exactly one bid was persisted.
    let bids = get_bids(&client, auction_id).await;
    assert_eq!(bids.len(), 1);
    assert_eq!(decimal(&get_auction(&client, auction_id).await["current_price"]), dec!(150));
}

/// Equal to current price fails, one unit above succeeds.
#[tokio::test]
#[ignore = "requires the full stack: Postgres, Kafka and a running service"]
async fn test_rejection_boundary() {
    let client = Client::new();
    let auction_id = create_auction(&client, dec!(100), Duration::hours(2)).await;
    let (status, _) = open_auction(&client, auction_id).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = place_bid(&client, auction_id, 3, dec!(100), "boundary-equal").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "TOO_LOW");
    assert_eq!(decimal(&body["current_price"]), dec!(100));

    let (status, body) = place_bid(&client, auction_id, 3, dec!(101), "boundary-above").await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(decimal(&body["currentPrice"]), dec!(101));
}

/// DRAFT -> OPEN -> CLOSED only moves forward; close is idempotent.
#[tokio::test]
#[ignore = "requires the full stack: Postgres, Kafka and a running service"]
async fn test_lifecycle_monotonic() {
    let client = Client::new();
    let auction_id = create_auction(&client, dec!(100), Duration::hours(2)).await;

    // No bidding while DRAFT.
    let (status, body) = place_bid(&client, auction_id, 3, dec!(150), "draft-bid").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_STATE");

    let (status, body) = open_auction(&client, auction_id).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "OPEN");

    // Re-opening an OPEN auction is rejected.
    let (status, body) = open_auction(&client, auction_id).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_STATE");

    let (status, body) = close_auction(&client, auction_id).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "CLOSED");

    // Closing again succeeds and returns the unchanged auction.
    let (status, body) = close_auction(&client, auction_id).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "CLOSED");
    assert_eq!(body["id"].as_i64(), Some(auction_id));

    // CLOSED is terminal for bids too.
    let (status, body) = place_bid(&client, auction_id, 3, dec!(150), "closed-bid").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_STATE");
}

/// Opening an auction whose deadline already passed fails.
#[tokio::test]
#[ignore = "requires the full stack: Postgres, Kafka and a running service"]
async fn test_open_expired_auction() {
    let client = Client::new();
    let auction_id = create_auction(&client, dec!(100), Duration::hours(-1)).await;

    let (status, body) = open_auction(&client, auction_id).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "EXPIRED");
}

/// Role and token gates on the write surface.
#[tokio::test]
#[ignore = "requires the full stack: Postgres, Kafka and a running service"]
async fn test_auth_gates() {
    let client = Client::new();
    let auction_id = create_auction(&client, dec!(100), Duration::hours(2)).await;
    let (status, _) = open_auction(&client, auction_id).await;
    assert_eq!(status, StatusCode::OK);

    // No token.
    let response = client
        .post(format!("{}/auctions/{}/bids", base_url(), auction_id))
        .json(&json!({ "amount": 150, "idempotencyKey": "no-token" }))
        .send()
        .await
        .expect("request");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // Admins do not bid.
    let response = client
        .post(format!("{}/auctions/{}/bids", base_url(), auction_id))
        .bearer_auth(admin_token())
        .json(&json!({ "amount": 150, "idempotencyKey": "admin-bid" }))
        .send()
        .await
        .expect("request");
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    // Dealers do not manage lifecycle.
    let response = client
        .post(format!("{}/auctions/{}/close", base_url(), auction_id))
        .bearer_auth(dealer_token(3))
        .send()
        .await
        .expect("request");
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

/// N concurrent bidders on one auction: every accepted bid lands, the final
/// price is the maximum submitted amount, and amounts are strictly
/// increasing in commit order.
#[tokio::test]
#[ignore = "requires the full stack: Postgres, Kafka and a running service"]
async fn test_concurrent_bidding() {
    init_tracing();

    let client = Client::new();
    let starting_price = dec!(10000);
    let auction_id = create_auction(&client, starting_price, Duration::hours(2)).await;
    let (status, _) = open_auction(&client, auction_id).await;
    assert_eq!(status, StatusCode::OK);

    let mut handles = vec![];
    for i in 1..=50i64 {
        let amount = starting_price + Decimal::from(i * 100);
        let handle = tokio::spawn(async move {
            let client = Client::new();
            place_bid(&client, auction_id, i, amount, &format!("storm-{}", i)).await
        });
        handles.push(handle);
    }

    let mut accepted = 0usize;
    let mut rejected = 0usize;
    for handle in handles {
        let (status, body) = handle.await.expect("bid task");
        match status {
            StatusCode::CREATED => accepted += 1,
            StatusCode::BAD_REQUEST => {
                assert_eq!(body["code"], "TOO_LOW", "unexpected rejection: {:?}", body);
                rejected += 1;
            }
            other => panic!("unexpected status {}: {:?}", other, body),
        }
    }
    info!("accepted: {}, rejected: {}", accepted, rejected);
    assert_eq!(accepted + rejected, 50);
    assert!(accepted >= 1);

    // The highest submitted amount always wins.
    let auction = get_auction(&client, auction_id).await;
    assert_eq!(
        decimal(&auction["current_price"]),
        starting_price + Decimal::from(5000)
    );

    // One persisted bid per acceptance, strictly increasing in commit order
    // (history is served newest first).
    let bids = get_bids(&client, auction_id).await;
    assert_eq!(bids.len(), accepted);
    let amounts: Vec<Decimal> = bids.iter().map(|bid| decimal(&bid["amount"])).collect();
    for pair in amounts.windows(2) {
        assert!(pair[0] > pair[1], "bid amounts not monotonic: {:?}", amounts);
    }
}
