//! Failures of the CouchDB player store.

use reqwest::StatusCode;
use thiserror::Error;

/// Result alias for the CouchDB player store.
pub type CouchResult<T> = Result<T, CouchDaoError>;

/// Everything that can go wrong between the node and the player database.
#[derive(Debug, Error)]
pub enum CouchDaoError {
    /// Required environment variable is missing.
    #[error("missing CouchDB environment variable `{var}`")]
    MissingEnvVar {
        /// Variable name.
        var: &'static str,
    },
    /// Environment variable is set to something unusable.
    #[error("invalid value `{value}` for CouchDB environment variable `{var}`")]
    InvalidEnvVar {
        /// Variable name.
        var: &'static str,
        /// Raw value found in the environment.
        value: String,
    },
    /// Only one of `COUCH_USERNAME` and `COUCH_PASSWORD` is set.
    #[error("COUCH_USERNAME and COUCH_PASSWORD must be set together")]
    IncompleteCredentials,
    /// Server URL lacks an http(s) scheme.
    #[error("CouchDB URL `{url}` must start with http:// or https://")]
    InvalidBaseUrl {
        /// URL as configured.
        url: String,
    },
    /// Player database name breaks CouchDB naming rules.
    #[error("invalid CouchDB player database name `{name}`: {reason}")]
    InvalidDatabaseName {
        /// Name as configured.
        name: String,
        /// Broken rule.
        reason: &'static str,
    },
    /// TLS or proxy setup prevented building the HTTP client.
    #[error("failed to build CouchDB HTTP client")]
    HttpClient {
        /// Underlying failure.
        #[source]
        source: reqwest::Error,
    },
    /// The player database could not be reached.
    #[error("failed to reach CouchDB player database `{database}`")]
    DatabaseUnreachable {
        /// Database name.
        database: String,
        /// Underlying failure.
        #[source]
        source: reqwest::Error,
    },
    /// The player database is missing and could not be created.
    #[error("failed to create CouchDB player database `{database}`")]
    DatabaseCreation {
        /// Database name.
        database: String,
        /// Underlying failure.
        #[source]
        source: reqwest::Error,
    },
    /// Unexpected status while checking or creating the player database.
    #[error("CouchDB answered {status} for player database `{database}`")]
    DatabaseRejected {
        /// Database name.
        database: String,
        /// Status CouchDB answered with.
        status: StatusCode,
    },
    /// A player document or view request never got an answer.
    #[error("failed to send CouchDB request for `{path}`")]
    Unreachable {
        /// Document or view path, relative to the database.
        path: String,
        /// Underlying failure.
        #[source]
        source: reqwest::Error,
    },
    /// The stored `_rev` moved between our read and our write.
    #[error("player document `{path}` was written by another node in the meantime")]
    RevisionConflict {
        /// Player document id.
        path: String,
    },
    /// Unexpected status for a document or view request.
    #[error("CouchDB answered {status} for `{path}`")]
    DocumentRejected {
        /// Document or view path, relative to the database.
        path: String,
        /// Status CouchDB answered with.
        status: StatusCode,
    },
    /// Body was not JSON.
    #[error("malformed CouchDB response for `{path}`")]
    MalformedResponse {
        /// Document or view path, relative to the database.
        path: String,
        /// Underlying failure.
        #[source]
        source: reqwest::Error,
    },
    /// JSON did not match the player document layout.
    #[error("CouchDB document at `{path}` is not a player record")]
    MalformedDocument {
        /// Document or view path, relative to the database.
        path: String,
        /// Underlying failure.
        #[source]
        source: serde_json::Error,
    },
    /// Document id does not follow the `player::<uuid>` layout.
    #[error("`{doc_id}` is not a player document id")]
    ForeignDocument {
        /// Offending id.
        doc_id: String,
    },
}

impl CouchDaoError {
    /// True when retrying the same write after a fresh read can succeed.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::RevisionConflict { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_player_database() {
        let err = CouchDaoError::InvalidDatabaseName {
            name: "Players".into(),
            reason: "must start with a lowercase letter",
        };
        assert_eq!(
            err.to_string(),
            "invalid CouchDB player database name `Players`: must start with a lowercase letter"
        );
        let conflict = CouchDaoError::RevisionConflict {
            path: "player::1".into(),
        };
        assert!(conflict.is_conflict());
        assert!(!CouchDaoError::IncompleteCredentials.is_conflict());
    }
}
