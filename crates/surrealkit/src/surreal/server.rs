//! Throwaway in-memory SurrealDB instances.

use std::collections::HashSet;
use std::io;
use std::net::TcpListener;
use std::path::Path;
use std::process::Stdio;
use std::sync::{Mutex, OnceLock, PoisonError};

use tokio::process::{Child, Command};
use tracing::debug;

use crate::config::ConnectionConfig;
use crate::error::{MigrateError, Result};

/// Attempts at finding a port not already handed out by this process.
const FREE_PORT_ATTEMPTS: usize = 16;

/// A `surreal start memory` process that lives exactly as long as this guard.
///
/// The process is killed when the guard is dropped, so early returns and
/// errors never leave an instance behind.
#[derive(Debug)]
pub struct EphemeralServer {
    child: Child,
    program: String,
    port: u16,
}

impl EphemeralServer {
    /// Starts an in-memory instance bound to `127.0.0.1:<port>`.
    pub fn start(binary: &Path, port: u16) -> Result<Self> {
        let bind = format!("127.0.0.1:{port}");
        let program = binary.display().to_string();
        debug!(bind = %bind, "Starting in-memory database");

        let child = Command::new(binary)
            .args(["start", "memory", "--bind", bind.as_str()])
            .args(["--no-banner", "--log", "error"])
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                release_port(port);
                MigrateError::Command {
                    program: program.clone(),
                    message: e.to_string(),
                }
            })?;

        Ok(Self {
            child,
            program,
            port,
        })
    }

    /// Port the instance listens on.
    #[must_use]
    pub const fn port(&self) -> u16 {
        self.port
    }

    /// Root connection to the instance's scratch namespace and database.
    #[must_use]
    pub fn connection(&self) -> ConnectionConfig {
        ConnectionConfig::ephemeral(self.port)
    }

    /// Fails if the process has already exited, e.g. because it could not bind.
    ///
    /// A readiness probe alone cannot tell this instance apart from another
    /// one answering on the same port.
    pub fn ensure_running(&mut self) -> Result<()> {
        match self.child.try_wait()? {
            None => Ok(()),
            Some(status) => Err(MigrateError::Command {
                program: self.program.clone(),
                message: format!("in-memory database on port {} exited: {status}", self.port),
            }),
        }
    }

    /// Stops the instance and waits for it to exit.
    pub async fn shutdown(mut self) -> Result<()> {
        debug!(port = self.port, "Stopping in-memory database");
        self.child.kill().await?;
        Ok(())
    }
}

impl Drop for EphemeralServer {
    fn drop(&mut self) {
        release_port(self.port);
    }
}

fn reserved_ports() -> &'static Mutex<HashSet<u16>> {
    static RESERVED: OnceLock<Mutex<HashSet<u16>>> = OnceLock::new();
    RESERVED.get_or_init(Mutex::default)
}

fn release_port(port: u16) {
    reserved_ports()
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .remove(&port);
}

/// Asks the OS for a currently unused local port.
///
/// A port is never handed out twice while an [`EphemeralServer`] started on
/// it is alive, so concurrent snapshots always get distinct instances.
pub fn free_port() -> Result<u16> {
    for _ in 0..FREE_PORT_ATTEMPTS {
        let listener = TcpListener::bind("127.0.0.1:0")?;
        let port = listener.local_addr()?.port();
        let mut reserved = reserved_ports()
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if reserved.insert(port) {
            return Ok(port);
        }
    }

    Err(io::Error::new(io::ErrorKind::AddrInUse, "no free local port").into())
}
