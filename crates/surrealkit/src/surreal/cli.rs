//! Client that drives the `surreal` binary.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info};

use super::{wait_until_ready, Importer, QueryExecutor};
use crate::config::{ConnectionConfig, RetryPolicy};
use crate::error::{MigrateError, Result};

/// Talks to one SurrealDB endpoint through the `surreal` command-line tool.
#[derive(Debug, Clone)]
pub struct SurrealCli {
    binary: PathBuf,
    connection: ConnectionConfig,
}

impl SurrealCli {
    /// Creates a client for `connection` using the given `surreal` binary.
    pub fn new(binary: impl Into<PathBuf>, connection: ConnectionConfig) -> Self {
        Self {
            binary: binary.into(),
            connection,
        }
    }

    /// Returns the connection settings.
    #[must_use]
    pub fn connection(&self) -> &ConnectionConfig {
        &self.connection
    }

    /// Waits until the endpoint accepts connections.
    pub async fn connect(&self, retry: &RetryPolicy) -> Result<()> {
        info!(endpoint = %self.connection.endpoint, "Connecting to database");
        wait_until_ready(retry, &self.connection.endpoint, || self.is_ready()).await
    }

    /// Returns true if the endpoint answers a readiness probe.
    pub async fn is_ready(&self) -> Result<bool> {
        let mut cmd = self.command("is-ready");
        cmd.args(["--endpoint", self.connection.endpoint.as_str()]);
        let output = self.run(cmd, None).await?;
        Ok(output.status.success())
    }

    /// Creates the configured namespace and database if they do not exist.
    pub async fn define_namespace_and_database(&self) -> Result<()> {
        self.execute(&format!(
            "DEFINE NAMESPACE IF NOT EXISTS {}",
            self.connection.namespace
        ))
        .await?;
        self.execute(&format!(
            "DEFINE DATABASE IF NOT EXISTS {}",
            self.connection.database
        ))
        .await?;
        Ok(())
    }

    fn command(&self, subcommand: &str) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.arg(subcommand);
        cmd
    }

    fn connection_args(&self, cmd: &mut Command) {
        let c = &self.connection;
        cmd.args(["--endpoint", c.endpoint.as_str()])
            .args(["--namespace", c.namespace.as_str()])
            .args(["--database", c.database.as_str()])
            .args(["--user", c.user.as_str()])
            .args(["--pass", c.password.as_str()]);
    }

    async fn run(&self, mut cmd: Command, stdin: Option<&str>) -> Result<Output> {
        cmd.stdin(if stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| self.spawn_error(&e))?;
        if let Some(input) = stdin {
            if let Some(mut pipe) = child.stdin.take() {
                pipe.write_all(input.as_bytes()).await?;
            }
        }
        Ok(child.wait_with_output().await?)
    }

    fn spawn_error(&self, err: &std::io::Error) -> MigrateError {
        let message = match err.kind() {
            ErrorKind::NotFound => "program not found, make sure SurrealDB is installed".to_string(),
            _ => err.to_string(),
        };
        MigrateError::Command {
            program: self.binary.display().to_string(),
            message,
        }
    }
}

/// Stderr of a failed command, falling back to stdout.
fn failure_message(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    if stderr.trim().is_empty() {
        String::from_utf8_lossy(&output.stdout).trim().to_string()
    } else {
        stderr.trim().to_string()
    }
}

/// Extracts the first statement result from `surreal sql --json` output.
fn first_result(stdout: &str) -> Option<serde_json::Value> {
    match serde_json::from_str::<serde_json::Value>(stdout.trim()).ok()? {
        serde_json::Value::Array(mut results) if !results.is_empty() => Some(results.swap_remove(0)),
        serde_json::Value::Array(_) => Some(serde_json::Value::Null),
        other => Some(other),
    }
}

#[async_trait]
impl QueryExecutor for SurrealCli {
    async fn execute(&self, query: &str) -> Result<serde_json::Value> {
        debug!(query, "Sending query");
        let mut cmd = self.command("sql");
        cmd.args(["--json", "--hide-welcome"]);
        self.connection_args(&mut cmd);

        let output = self.run(cmd, Some(query)).await?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        if !output.status.success() {
            return Err(MigrateError::Query {
                query: query.to_string(),
                message: failure_message(&output),
            });
        }

        // Errors are reported as plain text rather than JSON.
        first_result(&stdout).ok_or_else(|| MigrateError::Query {
            query: query.to_string(),
            message: stdout.trim().to_string(),
        })
    }
}

#[async_trait]
impl Importer for SurrealCli {
    async fn validate(&self, file: &Path) -> Result<()> {
        info!(file = %file.display(), "Validating");
        let mut cmd = self.command("validate");
        cmd.arg(file);

        let output = self.run(cmd, None).await?;
        if output.status.success() {
            Ok(())
        } else {
            Err(MigrateError::Import {
                file: file.to_path_buf(),
                message: failure_message(&output),
            })
        }
    }

    async fn import(&self, file: &Path) -> Result<()> {
        info!(file = %file.display(), "Importing");
        let mut cmd = self.command("import");
        self.connection_args(&mut cmd);
        cmd.arg(file);

        let output = self.run(cmd, None).await?;
        if output.status.success() {
            Ok(())
        } else {
            Err(MigrateError::Import {
                file: file.to_path_buf(),
                message: failure_message(&output),
            })
        }
    }
}
