// region:    --- Imports
use tracing::warn;

// endregion: --- Imports

// region:    --- Config

/// Runtime configuration, read once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_url: String,
    pub kafka_brokers: String,
    pub kafka_group_id: String,
    pub jwt_secret: String,
    /// Drop and recreate the schema on startup. Dev/test only.
    pub recreate_db: bool,
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        let database_url = std::env::var("DATABASE_URL")
            .map_err(|_| "DATABASE_URL must be set".to_string())?;

        let port = match std::env::var("PORT") {
            Ok(raw) => raw
                .parse::<u16>()
                .map_err(|_| format!("PORT is not a valid port number: {}", raw))?,
            Err(_) => 4000,
        };

        let jwt_secret = std::env::var("JWT_SECRET").unwrap_or_else(|_| {
            warn!(
                "{:<12} --> JWT_SECRET not set, using insecure dev default",
                "Config"
            );
            "dev_jwt_secret_change_me".to_string()
        });

        Ok(Self {
            port,
            database_url,
            kafka_brokers: std::env::var("KAFKA_BROKERS")
                .unwrap_or_else(|_| "localhost:9092".to_string()),
            kafka_group_id: std::env::var("KAFKA_GROUP_ID")
                .unwrap_or_else(|_| "bid-events-relay".to_string()),
            jwt_secret,
            recreate_db: std::env::var("RECREATE_DB")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
        })
    }
}

// endregion: --- Config
