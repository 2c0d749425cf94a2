use mongodb::error::Error as MongoError;
use thiserror::Error;
use uuid::Uuid;

/// Result alias for the MongoDB player store.
pub type MongoResult<T> = std::result::Result<T, MongoDaoError>;

/// Failures of the MongoDB player store.
#[derive(Debug, Error)]
pub enum MongoDaoError {
    /// Required environment variable is missing.
    #[error("missing MongoDB environment variable `{var}`")]
    MissingEnvVar {
        /// Variable name.
        var: &'static str,
    },
    /// Environment variable is set to something unusable.
    #[error("invalid value `{value}` for MongoDB environment variable `{var}`")]
    InvalidEnvVar {
        /// Variable name.
        var: &'static str,
        /// Raw value found in the environment.
        value: String,
    },
    /// Player database name breaks MongoDB naming rules.
    #[error("invalid MongoDB player database name `{name}`: {reason}")]
    InvalidDatabaseName {
        /// Name as configured.
        name: String,
        /// Broken rule.
        reason: &'static str,
    },
    /// Connection URI could not be parsed.
    #[error("failed to parse MongoDB connection URI `{uri}`")]
    InvalidUri {
        /// URI as configured.
        uri: String,
        /// Driver parse error.
        #[source]
        source: MongoError,
    },
    /// Client options were rejected by the driver.
    #[error("failed to build MongoDB client from options")]
    ClientConstruction {
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// Player database never answered while the node was starting or reconnecting.
    #[error("player database did not answer a ping after {attempts} attempt(s)")]
    InitialPing {
        /// Pings sent.
        attempts: u32,
        /// Last ping failure.
        #[source]
        source: MongoError,
    },
    /// Periodic health ping failed.
    #[error("MongoDB ping health check failed")]
    HealthPing {
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// Name index could not be created.
    #[error("failed to ensure index `{index}` on collection `{collection}`")]
    EnsureIndex {
        /// Collection name.
        collection: &'static str,
        /// Indexed field.
        index: &'static str,
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// Record write failed.
    #[error("failed to save player record `{id}`")]
    SaveRecord {
        /// Player identity.
        id: Uuid,
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// Record read failed.
    #[error("failed to load player record `{id}`")]
    LoadRecord {
        /// Player identity.
        id: Uuid,
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// Case-insensitive name query failed.
    #[error("failed to look up player named `{name}`")]
    LookupName {
        /// Name as typed by the operator.
        name: String,
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// A snapshot section could not be turned into BSON.
    #[error("failed to encode {field} of player record `{id}`")]
    Encode {
        /// Player identity.
        id: Uuid,
        /// Snapshot section.
        field: &'static str,
        /// BSON serializer error.
        #[source]
        source: mongodb::bson::error::Error,
    },
}
