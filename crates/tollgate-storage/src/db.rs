use std::time::Duration;

use sea_orm::{ConnectOptions, Database, DatabaseConnection, DbErr};

const CONNECT_ATTEMPTS: u32 = 5;
const INITIAL_BACKOFF: Duration = Duration::from_millis(500);

/// Connects with the default retry policy. The returned handle is owned by
/// the caller and passed down explicitly; this crate keeps no global
/// connection state.
pub async fn connect_with_backoff(options: ConnectOptions) -> Result<DatabaseConnection, DbErr> {
    connect_with_policy(options, CONNECT_ATTEMPTS, INITIAL_BACKOFF).await
}

/// Retries the initial connection with exponential backoff. Databases often
/// come up after the service in orchestrated deployments.
pub async fn connect_with_policy(
    options: ConnectOptions,
    attempts: u32,
    initial_backoff: Duration,
) -> Result<DatabaseConnection, DbErr> {
    let mut delay = initial_backoff;
    let mut last_err = None;
    for attempt in 1..=attempts {
        match Database::connect(options.clone()).await {
            Ok(connection) => return Ok(connection),
            Err(err) => {
                tracing::warn!(error = %err, attempt, "db connect failed");
                last_err = Some(err);
            }
        }
        if attempt < attempts {
            tokio::time::sleep(delay).await;
            delay *= 2;
        }
    }
    Err(last_err.unwrap_or_else(|| DbErr::Custom("no connect attempt was made".to_string())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn connects_on_first_attempt() {
        let db = connect_with_policy(
            ConnectOptions::new("sqlite::memory:"),
            3,
            Duration::from_millis(1),
        )
        .await;
        assert!(db.is_ok());
    }

    #[tokio::test]
    async fn gives_up_after_exhausting_attempts() {
        let result = connect_with_policy(
            ConnectOptions::new("notadb://nowhere"),
            2,
            Duration::from_millis(1),
        )
        .await;
        assert!(result.is_err());
    }
}
