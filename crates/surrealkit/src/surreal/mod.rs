//! SurrealDB collaborators.
//!
//! The migration engine talks to a database only through the
//! [`QueryExecutor`] and [`Importer`] traits. [`SurrealCli`] implements both by
//! driving the `surreal` binary, and [`EphemeralServer`] runs a throwaway
//! in-memory instance for snapshotting.

mod cli;
mod server;

pub use cli::SurrealCli;
pub use server::{free_port, EphemeralServer};

use std::future::Future;
use std::path::Path;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tracing::warn;

use crate::config::RetryPolicy;
use crate::error::{MigrateError, Result};

/// Runs queries against one database.
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    /// Executes `query` and returns the result of its first statement.
    async fn execute(&self, query: &str) -> Result<serde_json::Value>;
}

/// Loads statement files into one database.
#[async_trait]
pub trait Importer: Send + Sync {
    /// Checks that `file` parses, without touching the database.
    async fn validate(&self, file: &Path) -> Result<()>;

    /// Imports every statement of `file`.
    async fn import(&self, file: &Path) -> Result<()>;

    /// Validates `file`, then imports it. Nothing is imported if validation fails.
    async fn validate_and_import(&self, file: &Path) -> Result<()> {
        self.validate(file).await?;
        self.import(file).await
    }
}

/// Executes `query` and deserializes its first result.
pub async fn query_as<T, Q>(executor: &Q, query: &str) -> Result<T>
where
    T: DeserializeOwned,
    Q: QueryExecutor + ?Sized,
{
    let value = executor.execute(query).await?;
    Ok(serde_json::from_value(value)?)
}

/// Probes until `is_ready` reports success, sleeping with backoff in between.
///
/// Errors from the probe itself (e.g. a missing binary) are not retried.
pub async fn wait_until_ready<F, Fut>(policy: &RetryPolicy, endpoint: &str, mut is_ready: F) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool>>,
{
    for attempt in 0..policy.max_attempts {
        tokio::time::sleep(policy.delay_for(attempt)).await;
        if is_ready().await? {
            return Ok(());
        }
        warn!(endpoint, attempt = attempt + 1, "Retrying connection...");
    }

    Err(MigrateError::Connection {
        endpoint: endpoint.to_string(),
        attempts: policy.max_attempts,
    })
}

/// Quotes a table name for use in a statement when it is not a plain identifier.
#[must_use]
pub fn escape_ident(name: &str) -> String {
    if !name.is_empty() && name.chars().all(|c| c.is_alphanumeric() || c == '_') {
        name.to_string()
    } else {
        format!("`{}`", name.replace('`', "\\`"))
    }
}
