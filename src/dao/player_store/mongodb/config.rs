use std::time::Duration;

use mongodb::options::ClientOptions;

use super::{
    connection::ConnectRetry,
    error::{MongoDaoError, MongoResult},
};

const DEFAULT_DB: &str = "player_sync";
const APP_NAME: &str = "player-sync";
const SERVER_SELECTION_TIMEOUT: Duration = Duration::from_secs(2);

/// Where the player collection lives and how hard to try reaching it.
#[derive(Clone)]
pub struct MongoConfig {
    /// Driver options parsed from the connection URI.
    pub options: ClientOptions,
    /// Database holding the `players` collection.
    pub database_name: String,
    /// Backoff while the server does not answer yet.
    pub connect_retry: ConnectRetry,
}

impl MongoConfig {
    /// Parse the URI and validate the database name.
    pub async fn from_uri(uri: &str, db_name: Option<&str>) -> MongoResult<Self> {
        let database_name = db_name.unwrap_or(DEFAULT_DB).to_owned();
        validate_database_name(&database_name)?;

        let mut options =
            ClientOptions::parse(uri)
                .await
                .map_err(|source| MongoDaoError::InvalidUri {
                    uri: uri.to_owned(),
                    source,
                })?;
        options.app_name.get_or_insert_with(|| APP_NAME.to_owned());
        // A down server must surface as a storage failure quickly, the supervisor retries.
        options
            .server_selection_timeout
            .get_or_insert(SERVER_SELECTION_TIMEOUT);

        Ok(Self {
            options,
            database_name,
            connect_retry: ConnectRetry::default(),
        })
    }

    /// Read `MONGO_URI` (required), `MONGO_DB` and `MONGO_CONNECT_ATTEMPTS`.
    pub async fn from_env() -> MongoResult<Self> {
        let uri = std::env::var("MONGO_URI")
            .map_err(|_| MongoDaoError::MissingEnvVar { var: "MONGO_URI" })?;
        let db = std::env::var("MONGO_DB").ok();
        let mut config = Self::from_uri(&uri, db.as_deref()).await?;

        if let Ok(raw) = std::env::var("MONGO_CONNECT_ATTEMPTS") {
            config.connect_retry.attempts = raw
                .parse::<u32>()
                .ok()
                .filter(|attempts| *attempts > 0)
                .ok_or(MongoDaoError::InvalidEnvVar {
                    var: "MONGO_CONNECT_ATTEMPTS",
                    value: raw,
                })?;
        }
        Ok(config)
    }
}

fn validate_database_name(name: &str) -> MongoResult<()> {
    let invalid = |reason| MongoDaoError::InvalidDatabaseName {
        name: name.to_owned(),
        reason,
    };
    if name.is_empty() {
        return Err(invalid("empty"));
    }
    if name.len() >= 64 {
        return Err(invalid("64 bytes or longer"));
    }
    if name.chars().any(|c| "/\\. \"$*<>:|?".contains(c) || c == '\0') {
        return Err(invalid("contains a character MongoDB rejects"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn uri_defaults_tag_the_client_as_player_sync() {
        let config = MongoConfig::from_uri("mongodb://localhost:27017", None)
            .await
            .unwrap();
        assert_eq!(config.database_name, "player_sync");
        assert_eq!(config.options.app_name.as_deref(), Some("player-sync"));
        assert_eq!(
            config.options.server_selection_timeout,
            Some(SERVER_SELECTION_TIMEOUT)
        );
        assert_eq!(config.connect_retry, ConnectRetry::default());
    }

    #[tokio::test]
    async fn explicit_uri_settings_win() {
        let config = MongoConfig::from_uri(
            "mongodb://localhost:27017/?appName=lobby&serverSelectionTimeoutMS=500",
            Some("players"),
        )
        .await
        .unwrap();
        assert_eq!(config.options.app_name.as_deref(), Some("lobby"));
        assert_eq!(
            config.options.server_selection_timeout,
            Some(Duration::from_millis(500))
        );
    }

    #[tokio::test]
    async fn bad_database_names_are_rejected_before_connecting() {
        let long = "p".repeat(64);
        for bad in ["", "player.sync", "player sync", "a/b", long.as_str()] {
            let err = MongoConfig::from_uri("mongodb://localhost:27017", Some(bad))
                .await
                .err()
                .unwrap();
            assert!(
                matches!(err, MongoDaoError::InvalidDatabaseName { .. }),
                "{bad:?} should be rejected"
            );
        }
    }
}
