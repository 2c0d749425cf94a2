mod config;
mod connection;
mod error;
mod models;
/// Store implementation.
pub mod store;

pub use config::MongoConfig;
pub use connection::ConnectRetry;
pub use error::MongoDaoError;
pub use store::MongoPlayerStore;

use crate::dao::storage::StorageError;

impl From<MongoDaoError> for StorageError {
    fn from(err: MongoDaoError) -> Self {
        StorageError::unavailable(err.to_string(), err)
    }
}
