use std::{iter, time::Duration};

use mongodb::{Client, Database, bson::doc};
use tokio::time::sleep;
use tracing::{info, warn};

use super::{
    config::MongoConfig,
    error::{MongoDaoError, MongoResult},
};

/// Backoff applied while the player database does not answer pings yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectRetry {
    /// Pings sent before giving up, the first one included.
    pub attempts: u32,
    /// Pause after the first failed ping.
    pub initial_delay: Duration,
    /// Ceiling for the doubling pause.
    pub max_delay: Duration,
}

impl Default for ConnectRetry {
    fn default() -> Self {
        Self {
            attempts: 10,
            initial_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl ConnectRetry {
    /// Pauses between consecutive pings: one fewer than `attempts`.
    pub fn delays(&self) -> impl Iterator<Item = Duration> {
        let max_delay = self.max_delay;
        iter::successors(Some(self.initial_delay.min(max_delay)), move |delay| {
            Some((*delay * 2).min(max_delay))
        })
        .take(self.attempts.saturating_sub(1) as usize)
    }
}

pub async fn ping(database: &Database) -> Result<(), mongodb::error::Error> {
    database.run_command(doc! { "ping": 1 }).await.map(drop)
}

/// Open the player database and wait until it answers a ping.
pub async fn establish_connection(config: &MongoConfig) -> MongoResult<Database> {
    let client = Client::with_options(config.options.clone())
        .map_err(|source| MongoDaoError::ClientConstruction { source })?;
    let database = client.database(&config.database_name);

    let mut delays = config.connect_retry.delays();
    let mut attempts = 0;
    loop {
        attempts += 1;
        match ping(&database).await {
            Ok(()) => {
                if attempts > 1 {
                    info!(attempts, database = %config.database_name, "player database reachable");
                }
                return Ok(database);
            }
            Err(source) => match delays.next() {
                Some(delay) => {
                    warn!(
                        attempt = attempts,
                        retry_in_ms = delay.as_millis() as u64,
                        error = %source,
                        "player database not reachable yet"
                    );
                    sleep(delay).await;
                }
                None => return Err(MongoDaoError::InitialPing { attempts, source }),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delays_double_up_to_the_ceiling() {
        let retry = ConnectRetry {
            attempts: 6,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(5),
        };
        let delays: Vec<u64> = retry.delays().map(|d| d.as_secs()).collect();
        assert_eq!(delays, vec![1, 2, 4, 5, 5]);
    }

    #[test]
    fn a_single_attempt_never_waits() {
        let retry = ConnectRetry {
            attempts: 1,
            ..ConnectRetry::default()
        };
        assert_eq!(retry.delays().count(), 0);
        assert_eq!(ConnectRetry::default().delays().count(), 9);
    }
}
