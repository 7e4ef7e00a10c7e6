//! Project layout and connection settings.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::info;

use crate::error::Result;

/// Default project directory, relative to the working directory.
pub const DEFAULT_ROOT: &str = "surreal";

/// Extension shared by schema and migration files.
pub const SURQL_EXTENSION: &str = "surql";

/// Namespace used inside ephemeral snapshot instances.
pub const EPHEMERAL_NAMESPACE: &str = "surrealkit";

/// Database used inside ephemeral snapshot instances.
pub const EPHEMERAL_DATABASE: &str = "migrations";

/// Where schema and migration files live.
#[derive(Debug, Clone)]
pub struct ProjectLayout {
    root: PathBuf,
}

impl ProjectLayout {
    /// Creates a layout rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Project directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory of declarative schema files.
    #[must_use]
    pub fn schema_dir(&self) -> PathBuf {
        self.root.join("schema")
    }

    /// Directory of ordered migration files.
    #[must_use]
    pub fn migrations_dir(&self) -> PathBuf {
        self.root.join("migrations")
    }

    /// Creates the project, schema and migrations directories if missing.
    pub fn ensure_dirs(&self) -> Result<()> {
        if !self.root.exists() {
            std::fs::create_dir_all(&self.root)?;
            info!(path = %self.root.display(), "Created surreal directory");
        }
        std::fs::create_dir_all(self.schema_dir())?;
        std::fs::create_dir_all(self.migrations_dir())?;
        Ok(())
    }
}

impl Default for ProjectLayout {
    fn default() -> Self {
        Self::new(DEFAULT_ROOT)
    }
}

/// How to reach a database.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// HTTP endpoint, always with a scheme.
    pub endpoint: String,
    /// Namespace to use.
    pub namespace: String,
    /// Database to use.
    pub database: String,
    /// User name.
    pub user: String,
    /// Password.
    pub password: String,
}

impl ConnectionConfig {
    /// Creates a connection config; `http://` is assumed when the endpoint has no scheme.
    pub fn new(
        endpoint: &str,
        namespace: impl Into<String>,
        database: impl Into<String>,
        user: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        let endpoint = if endpoint.contains("://") {
            endpoint.to_string()
        } else {
            format!("http://{endpoint}")
        };

        Self {
            endpoint,
            namespace: namespace.into(),
            database: database.into(),
            user: user.into(),
            password: password.into(),
        }
    }

    /// Connection to an in-memory instance listening on `port`.
    #[must_use]
    pub fn ephemeral(port: u16) -> Self {
        Self::new(
            &format!("127.0.0.1:{port}"),
            EPHEMERAL_NAMESPACE,
            EPHEMERAL_DATABASE,
            "root",
            "root",
        )
    }
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("endpoint", &self.endpoint)
            .field("namespace", &self.namespace)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"***")
            .finish()
    }
}

/// Bounded exponential backoff used while waiting for a database to come up.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Number of readiness probes before giving up.
    pub max_attempts: u32,
    /// Wait before the first probe.
    pub initial_delay: Duration,
    /// Multiplier applied to the wait after each failed probe.
    pub backoff_factor: f64,
}

impl RetryPolicy {
    /// Creates a policy.
    #[must_use]
    pub const fn new(max_attempts: u32, initial_delay: Duration, backoff_factor: f64) -> Self {
        Self {
            max_attempts,
            initial_delay,
            backoff_factor,
        }
    }

    /// Wait before the given zero-based attempt.
    ///
    /// Saturates instead of overflowing; a factor that would make the wait
    /// negative or undefined keeps the initial delay.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let secs = self.initial_delay.as_secs_f64() * self.backoff_factor.powi(exponent);
        match Duration::try_from_secs_f64(secs) {
            Ok(delay) => delay,
            Err(_) if secs > 0.0 => Duration::MAX,
            Err(_) => self.initial_delay,
        }
    }
}

/// Loads a `.env` file into the environment: `path` if given, otherwise
/// the first `.env` found from the working directory upwards.
///
/// Returns false when there is no such file. Variables that are already set
/// keep their value.
pub fn load_env_file(path: Option<&Path>) -> bool {
    let loaded = match path {
        Some(path) => dotenvy::from_path(path),
        None => dotenvy::dotenv().map(|_| ()),
    };
    loaded.is_ok()
}

/// Parses a backoff factor given on the command line.
///
/// Waits must never shrink, so the factor has to be finite and at least 1.
pub fn parse_backoff_factor(value: &str) -> std::result::Result<f64, String> {
    let factor: f64 = value
        .parse()
        .map_err(|e| format!("'{value}' is not a number: {e}"))?;
    if factor.is_finite() && factor >= 1.0 {
        Ok(factor)
    } else {
        Err(format!("'{value}' must be a finite number of at least 1"))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(10, Duration::from_millis(200), 1.5)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let layout = ProjectLayout::new(dir.path().join("surreal"));

        layout.ensure_dirs().unwrap();
        assert!(layout.schema_dir().is_dir());
        assert!(layout.migrations_dir().is_dir());

        // Idempotent
        layout.ensure_dirs().unwrap();
    }

    #[test]
    fn test_endpoint_scheme() {
        let config = ConnectionConfig::new("db.example.com:8000", "ns", "db", "u", "p");
        assert_eq!(config.endpoint, "http://db.example.com:8000");

        let config = ConnectionConfig::new("https://db.example.com", "ns", "db", "u", "p");
        assert_eq!(config.endpoint, "https://db.example.com");

        let config = ConnectionConfig::ephemeral(8123);
        assert_eq!(config.endpoint, "http://127.0.0.1:8123");
        assert_eq!(config.namespace, EPHEMERAL_NAMESPACE);
    }

    #[test]
    fn test_debug_hides_password() {
        let config = ConnectionConfig::new("localhost:8000", "ns", "db", "root", "hunter2");
        let debug = format!("{config:?}");
        assert!(!debug.contains("hunter2"));
    }

    #[test]
    fn test_retry_delays() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(0), Duration::from_millis(200));
        assert_eq!(policy.delay_for(1), Duration::from_millis(300));
        assert_eq!(policy.delay_for(2), Duration::from_millis(450));
    }

    #[test]
    fn test_retry_delays_never_panic() {
        let negative = RetryPolicy::new(10, Duration::from_millis(200), -1.5);
        assert_eq!(negative.delay_for(1), Duration::from_millis(200));

        let undefined = RetryPolicy::new(10, Duration::from_millis(200), f64::NAN);
        assert_eq!(undefined.delay_for(1), Duration::from_millis(200));

        let huge = RetryPolicy::new(10, Duration::from_millis(200), f64::MAX);
        assert_eq!(huge.delay_for(3), Duration::MAX);
    }

    #[test]
    fn test_load_env_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env");
        std::fs::write(
            &path,
            "SURREALKIT_TEST_ENDPOINT=db.example.com:8000\nSURREALKIT_TEST_PRESET=from-file\n",
        )
        .unwrap();
        std::env::set_var("SURREALKIT_TEST_PRESET", "from-env");

        assert!(load_env_file(Some(&path)));
        assert_eq!(
            std::env::var("SURREALKIT_TEST_ENDPOINT").unwrap(),
            "db.example.com:8000"
        );
        assert_eq!(std::env::var("SURREALKIT_TEST_PRESET").unwrap(), "from-env");

        assert!(!load_env_file(Some(&dir.path().join("missing.env"))));
    }

    #[test]
    fn test_parse_backoff_factor() {
        assert_eq!(parse_backoff_factor("1.5"), Ok(1.5));
        assert_eq!(parse_backoff_factor("1"), Ok(1.0));
        assert!(parse_backoff_factor("-1.5").is_err());
        assert!(parse_backoff_factor("0.5").is_err());
        assert!(parse_backoff_factor("NaN").is_err());
        assert!(parse_backoff_factor("inf").is_err());
        assert!(parse_backoff_factor("fast").is_err());
    }
}
