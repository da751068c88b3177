//! Launching a dispatcher in a separate, detached process.
//!
//! The launcher describes what to serve with a [`BootstrapConfig`] and hands it to the
//! child program through the `NETFN_BOOTSTRAP` environment variable. The child owns a
//! catalog of functions compiled into it and serves the configured subset:
//!
//! ```rust,no_run
//! use netfn::{run_bootstrapped, Callable};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() {
//!     let add = Callable::from_sync("add", |args| {
//!         let a = args[0].as_value().and_then(|v| v.as_i64()).unwrap_or(0);
//!         let b = args[1].as_value().and_then(|v| v.as_i64()).unwrap_or(0);
//!         Ok(json!(a + b).into())
//!     });
//!     run_bootstrapped(vec![add]).await;
//! }
//! ```

use crate::error::{NetFnError, Result};
use crate::node::{Node, DEFAULT_HOST};
use crate::registry::{normalize, RegistrySource};
use crate::server::ServerHandle;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::{Child, Command};

/// Environment variable carrying the JSON-encoded [`BootstrapConfig`].
pub const BOOTSTRAP_ENV: &str = "NETFN_BOOTSTRAP";

fn default_host() -> String {
    DEFAULT_HOST.to_string()
}

/// What a bootstrapped process should serve, and where.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BootstrapConfig {
    pub port: u16,
    #[serde(default = "default_host")]
    pub host: String,
    /// Catalog entries to expose; all of them when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry_points: Option<Vec<String>>,
}

impl BootstrapConfig {
    pub fn new(port: u16) -> Self {
        Self {
            port,
            host: default_host(),
            entry_points: None,
        }
    }

    pub fn with_host(mut self, host: &str) -> Self {
        self.host = host.to_string();
        self
    }

    pub fn with_entry_points<S: Into<String>>(
        mut self,
        names: impl IntoIterator<Item = S>,
    ) -> Self {
        self.entry_points = Some(names.into_iter().map(Into::into).collect());
        self
    }

    /// Read the configuration passed by the launcher. `Ok(None)` when not bootstrapped.
    pub fn from_env() -> Result<Option<Self>> {
        match env::var(BOOTSTRAP_ENV) {
            Ok(raw) => Self::decode(&raw).map(Some),
            Err(env::VarError::NotPresent) => Ok(None),
            Err(e) => Err(NetFnError::BootstrapError(format!("{}: {}", BOOTSTRAP_ENV, e))),
        }
    }

    pub fn encode(&self) -> Result<String> {
        serde_json::to_string(self).map_err(NetFnError::from)
    }

    pub fn decode(raw: &str) -> Result<Self> {
        serde_json::from_str(raw)
            .map_err(|e| NetFnError::BootstrapError(format!("invalid {}: {}", BOOTSTRAP_ENV, e)))
    }
}

/// A program to launch as a detached server.
#[derive(Debug, Clone)]
pub struct LaunchSpec {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub config: BootstrapConfig,
}

impl LaunchSpec {
    pub fn new(program: impl Into<PathBuf>, config: BootstrapConfig) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            config,
        }
    }

    /// Relaunch the running executable.
    pub fn current_exe(config: BootstrapConfig) -> Result<Self> {
        Ok(Self::new(env::current_exe()?, config))
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<S: Into<String>>(mut self, args: impl IntoIterator<Item = S>) -> Self {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }
}

#[derive(Debug)]
pub enum BootstrapOutcome {
    Spawned(DetachedServer),
    /// Something already serves the port; nothing was launched.
    PortInUse,
}

/// A launched server process. Dropping the handle leaves the process running.
#[derive(Debug)]
pub struct DetachedServer {
    child: Child,
    pid: Option<u32>,
    port: u16,
    host: String,
}

impl DetachedServer {
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// Wait until the process accepts connections on its port.
    pub async fn wait_ready(&mut self, timeout: Duration) -> Result<()> {
        let start = std::time::Instant::now();
        loop {
            if let Some(status) = self.child.try_wait()? {
                return Err(NetFnError::BootstrapError(format!(
                    "server process exited before listening: {}",
                    status
                )));
            }
            if !crate::probe::probe_port(self.port, &self.host).await {
                return Ok(());
            }
            if start.elapsed() >= timeout {
                return Err(NetFnError::TimeoutError);
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }

    pub async fn kill(&mut self) -> Result<()> {
        self.child.kill().await?;
        Ok(())
    }
}

impl Node {
    /// Launch `spec` as a detached server unless its port is already taken.
    pub async fn bootstrap_detached(&self, spec: LaunchSpec) -> Result<BootstrapOutcome> {
        let BootstrapConfig { port, ref host, .. } = spec.config;
        if !self.probe_port(port, host).await {
            self.logger().port_unavailable(host, port);
            return Ok(BootstrapOutcome::PortInUse);
        }

        let child = Command::new(&spec.program)
            .args(&spec.args)
            .env(BOOTSTRAP_ENV, spec.config.encode()?)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| {
                NetFnError::BootstrapError(format!(
                    "failed to spawn {}: {}",
                    spec.program.display(),
                    e
                ))
            })?;

        let pid = child.id();
        self.logger()
            .process_spawn(&spec.program.display().to_string(), pid, port);

        Ok(BootstrapOutcome::Spawned(DetachedServer {
            child,
            pid,
            port,
            host: host.clone(),
        }))
    }

    /// Serve the part of `catalog` named by `config`.
    pub async fn serve_config(
        &self,
        catalog: impl Into<RegistrySource>,
        config: &BootstrapConfig,
    ) -> Result<ServerHandle> {
        let catalog = normalize(catalog);
        let registry = match &config.entry_points {
            Some(names) => catalog.restrict(names)?,
            None => catalog,
        };
        self.listen(registry, config.port, &config.host).await
    }

    /// Serve `catalog` as configured by the launcher through `NETFN_BOOTSTRAP`.
    pub async fn serve_bootstrapped(
        &self,
        catalog: impl Into<RegistrySource>,
    ) -> Result<ServerHandle> {
        let config = BootstrapConfig::from_env()?
            .ok_or_else(|| NetFnError::BootstrapError(format!("{} is not set", BOOTSTRAP_ENV)))?;
        self.serve_config(catalog, &config).await
    }
}

/// Entry point for a bootstrapped server program: serve until ctrl-c, exit with
/// status 1 on failure.
pub async fn run_bootstrapped(catalog: impl Into<RegistrySource>) {
    if let Err(e) = run_bootstrapped_inner(catalog.into()).await {
        tracing::error!(target: "netfn", error = %e, "bootstrapped server failed");
        std::process::exit(1);
    }
}

async fn run_bootstrapped_inner(catalog: RegistrySource) -> Result<()> {
    let node = Node::new();
    let server = node.serve_bootstrapped(catalog).await?;
    server.run_until_ctrl_c().await
}
