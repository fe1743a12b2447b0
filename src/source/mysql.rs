//! MySQL status source.

use sqlx::mysql::{MySqlConnectOptions, MySqlConnection};
use sqlx::Connection;

use super::{QueryError, Readings, StatusSource};
use crate::metrics::RawReading;
use crate::targets::Target;

const STATUS_QUERY: &str = "SHOW GLOBAL STATUS";
const VARIABLES_QUERY: &str = "SHOW GLOBAL VARIABLES";

/// Reads `SHOW GLOBAL STATUS` and `SHOW GLOBAL VARIABLES` over a fresh
/// connection per poll.
#[derive(Debug, Clone, Default)]
pub struct MySqlSource;

impl MySqlSource {
    pub fn new() -> Self {
        Self
    }
}

fn connect_options(target: &Target) -> MySqlConnectOptions {
    let mut options = MySqlConnectOptions::new()
        .host(&target.host)
        .port(target.port)
        .username(&target.username);
    if !target.password.is_empty() {
        options = options.password(&target.password);
    }
    options
}

async fn show(
    conn: &mut MySqlConnection,
    target: &Target,
    query: &'static str,
) -> Result<RawReading, QueryError> {
    let rows: Vec<(String, Option<String>)> = sqlx::query_as(query)
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| QueryError::Query {
            target: target.name.clone(),
            query,
            message: e.to_string(),
        })?;

    Ok(rows
        .into_iter()
        .filter_map(|(name, value)| value.map(|v| (name, v)))
        .collect())
}

impl StatusSource for MySqlSource {
    async fn fetch(&self, target: &Target) -> Result<Readings, QueryError> {
        let mut conn = MySqlConnection::connect_with(&connect_options(target))
            .await
            .map_err(|e| QueryError::Connection {
                target: target.name.clone(),
                message: e.to_string(),
            })?;

        let result = async {
            let status = show(&mut conn, target, STATUS_QUERY).await?;
            let variables = show(&mut conn, target, VARIABLES_QUERY).await?;
            Ok::<_, QueryError>(Readings { status, variables })
        }
        .await;

        if let Err(e) = conn.close().await {
            tracing::debug!("Closing connection to {} failed: {}", target.name, e);
        }

        result
    }
}
