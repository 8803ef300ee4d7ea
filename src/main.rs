// region:    --- Imports
use axum::routing::{get, post};
use axum::Router;
use bidding_service::auth::AuthKeys;
use bidding_service::config::Config;
use bidding_service::database::DatabaseManager;
use bidding_service::fanout::BidEventPublisher;
use bidding_service::gateway::{self, SubscriptionRegistry};
use bidding_service::handlers::{self, AppState};
use bidding_service::message_broker::KafkaManager;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

// endregion: --- Imports

// region:    --- Main

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .without_time()
        .with_target(false)
        .init();

    let config = Config::from_env()?;

    let db_manager = Arc::new(DatabaseManager::new(&config.database_url).await?);
    if config.recreate_db {
        db_manager.recreate_database().await?;
    } else {
        db_manager.initialize_database().await?;
    }
    info!("{:<12} --> database ready", "Main");

    let kafka_manager = Arc::new(KafkaManager::new(
        &config.kafka_brokers,
        &config.kafka_group_id,
    ));
    if let Err(e) = kafka_manager.initialize().await {
        error!("{:<12} --> Kafka initialization failed: {:?}", "Main", e);
        return Err(e.into());
    }
    info!("{:<12} --> Kafka ready", "Main");

    // Relay published BidEvents to subscribed watchers.
    let registry = Arc::new(SubscriptionRegistry::new());
    {
        let consumer = kafka_manager.get_consumer();
        let registry = Arc::clone(&registry);
        tokio::spawn(async move {
            gateway::run_relay(consumer, registry).await;
        });
    }

    let state = AppState {
        db_manager,
        publisher: Arc::new(BidEventPublisher::new(kafka_manager.get_producer())),
        kafka_manager,
        registry,
        auth_keys: AuthKeys::new(&config.jwt_secret),
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let routes_all = Router::new()
        .route("/health", get(handlers::handle_health))
        .route(
            "/auctions",
            get(handlers::handle_list_auctions).post(handlers::handle_create_auction),
        )
        .route("/auctions/:id", get(handlers::handle_get_auction))
        .route(
            "/auctions/:id/highest-bid",
            get(handlers::handle_get_highest_bid),
        )
        .route("/auctions/:id/open", post(handlers::handle_open_auction))
        .route("/auctions/:id/close", post(handlers::handle_close_auction))
        .route(
            "/auctions/:id/bids",
            get(handlers::handle_get_auction_bids).post(handlers::handle_bid),
        )
        .route("/ws", get(handlers::handle_ws))
        .layer(cors)
        .with_state(state);

    let listener = TcpListener::bind(("0.0.0.0", config.port)).await?;
    info!(
        "{:<12} --> Web Server: Listening on {}",
        "Main",
        listener.local_addr()?
    );

    if let Err(err) = axum::serve(listener, routes_all.into_make_service()).await {
        error!("{:<12} --> Server error: {}", "Main", err);
    }
    Ok(())
}

// endregion: --- Main
