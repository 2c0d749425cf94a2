//! Connection settings for the CouchDB player store.

use std::{fmt, time::Duration};

use super::error::{CouchDaoError, CouchResult};

const DEFAULT_DATABASE: &str = "player_sync";
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Where the player documents live and how to reach them.
#[derive(Debug, Clone)]
pub struct CouchConfig {
    /// Server root, without the database segment.
    pub base_url: String,
    /// Database holding one `player::<uuid>` document per player.
    pub database: String,
    /// Basic-auth pair, when the server requires one.
    pub credentials: Option<CouchCredentials>,
    /// Upper bound for a single HTTP round trip.
    pub request_timeout: Duration,
}

/// Basic-auth pair. The password never shows up in `Debug` output.
#[derive(Clone)]
pub struct CouchCredentials {
    /// CouchDB user name.
    pub username: String,
    /// CouchDB password.
    pub password: String,
}

impl fmt::Debug for CouchCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CouchCredentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

impl CouchConfig {
    /// Validate the server URL and the player database name.
    pub fn new(base_url: impl Into<String>, database: impl Into<String>) -> CouchResult<Self> {
        let base_url = base_url.into();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(CouchDaoError::InvalidBaseUrl { url: base_url });
        }
        let database = database.into();
        validate_database_name(&database)?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_owned(),
            database,
            credentials: None,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        })
    }

    /// Attach basic-auth credentials.
    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.credentials = Some(CouchCredentials {
            username: username.into(),
            password: password.into(),
        });
        self
    }

    /// Override the per-request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Read `COUCH_BASE_URL` (required), `COUCH_DB` (defaults to `player_sync`),
    /// `COUCH_USERNAME`/`COUCH_PASSWORD` (both or neither) and `COUCH_TIMEOUT_MS`.
    pub fn from_env() -> CouchResult<Self> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> CouchResult<Self> {
        let base_url = lookup("COUCH_BASE_URL").ok_or(CouchDaoError::MissingEnvVar {
            var: "COUCH_BASE_URL",
        })?;
        let database = lookup("COUCH_DB").unwrap_or_else(|| DEFAULT_DATABASE.to_owned());
        let mut config = Self::new(base_url, database)?;

        match (lookup("COUCH_USERNAME"), lookup("COUCH_PASSWORD")) {
            (Some(username), Some(password)) => {
                config = config.with_credentials(username, password);
            }
            (None, None) => {}
            _ => return Err(CouchDaoError::IncompleteCredentials),
        }

        if let Some(raw) = lookup("COUCH_TIMEOUT_MS") {
            let millis = raw
                .parse::<u64>()
                .ok()
                .filter(|millis| *millis > 0)
                .ok_or(CouchDaoError::InvalidEnvVar {
                    var: "COUCH_TIMEOUT_MS",
                    value: raw,
                })?;
            config = config.with_request_timeout(Duration::from_millis(millis));
        }

        Ok(config)
    }
}

/// CouchDB database names start with a lowercase letter and only use
/// `a-z`, `0-9` and `_$()+-/`.
fn validate_database_name(name: &str) -> CouchResult<()> {
    let invalid = |reason| CouchDaoError::InvalidDatabaseName {
        name: name.to_owned(),
        reason,
    };

    let first = name.chars().next().ok_or_else(|| invalid("empty"))?;
    if !first.is_ascii_lowercase() {
        return Err(invalid("must start with a lowercase letter"));
    }
    if name.len() > 238 {
        return Err(invalid("longer than 238 characters"));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || "_$()+-/".contains(c))
    {
        return Err(invalid("contains a character CouchDB rejects"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |var: &str| vars.get(var).cloned()
    }

    #[test]
    fn database_defaults_to_player_sync() {
        let config = CouchConfig::from_lookup(lookup(&[("COUCH_BASE_URL", "http://couch:5984/")]))
            .unwrap();
        assert_eq!(config.base_url, "http://couch:5984");
        assert_eq!(config.database, "player_sync");
        assert!(config.credentials.is_none());
        assert_eq!(config.request_timeout, DEFAULT_REQUEST_TIMEOUT);
    }

    #[test]
    fn database_names_follow_couch_rules() {
        for ok in ["players", "player_sync", "eu-west/players", "p1$(x)+y"] {
            assert!(validate_database_name(ok).is_ok(), "{ok} should be accepted");
        }
        for bad in ["", "Players", "_users", "1players", "players.eu", "joueurs é"] {
            assert!(
                matches!(
                    validate_database_name(bad),
                    Err(CouchDaoError::InvalidDatabaseName { .. })
                ),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn half_configured_credentials_are_rejected() {
        let err = CouchConfig::from_lookup(lookup(&[
            ("COUCH_BASE_URL", "http://couch:5984"),
            ("COUCH_USERNAME", "sync"),
        ]))
        .unwrap_err();
        assert!(matches!(err, CouchDaoError::IncompleteCredentials));
    }

    #[test]
    fn credentials_and_timeout_are_read() {
        let config = CouchConfig::from_lookup(lookup(&[
            ("COUCH_BASE_URL", "https://couch"),
            ("COUCH_DB", "players"),
            ("COUCH_USERNAME", "sync"),
            ("COUCH_PASSWORD", "hunter2"),
            ("COUCH_TIMEOUT_MS", "1500"),
        ]))
        .unwrap();
        let credentials = config.credentials.clone().unwrap();
        assert_eq!(credentials.username, "sync");
        assert_eq!(config.request_timeout, Duration::from_millis(1500));
        assert!(!format!("{config:?}").contains("hunter2"));
    }

    #[test]
    fn bad_url_and_timeout_are_rejected() {
        assert!(matches!(
            CouchConfig::new("couch:5984", "players"),
            Err(CouchDaoError::InvalidBaseUrl { .. })
        ));
        let err = CouchConfig::from_lookup(lookup(&[
            ("COUCH_BASE_URL", "http://couch"),
            ("COUCH_TIMEOUT_MS", "0"),
        ]))
        .unwrap_err();
        assert!(matches!(
            err,
            CouchDaoError::InvalidEnvVar {
                var: "COUCH_TIMEOUT_MS",
                ..
            }
        ));
    }
}
