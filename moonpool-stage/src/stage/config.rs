//! Stage configuration.
//!
//! A [`StageConfig`] is built once, before the stage starts, and then shared
//! read-only (`Arc<StageConfig>`) with the pipeline and every step.
//!
//! # Example
//!
//! ```rust,ignore
//! let config = StageConfig::builder()
//!     .cluster_name(ClusterName::new("prod"))
//!     .node_mode(NodeMode::Client)
//!     .tick_rate(Duration::from_millis(250))
//!     .packages(["game.players"])
//!     .build()?;
//! ```

use std::future::Future;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use crate::error::ConfigError;
use crate::net::{ClusterName, InterfaceId, NodeIdentity, NodeMode};

/// Default maintenance tick.
pub const DEFAULT_TICK_RATE: Duration = Duration::from_millis(1000);

/// Default time a request waits for its response.
pub const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_secs(30);

/// Where a class of work runs.
///
/// An unbound pool spawns onto whatever runtime is current at spawn time;
/// [`Stage`](crate::Stage) binds unbound pools when it is built.
#[derive(Debug, Clone)]
pub struct ExecutionPool {
    name: String,
    handle: Option<Handle>,
}

impl ExecutionPool {
    /// A pool that follows the ambient runtime.
    pub fn ambient(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            handle: None,
        }
    }

    /// A pool pinned to a specific runtime.
    pub fn from_handle(name: impl Into<String>, handle: Handle) -> Self {
        Self {
            name: name.into(),
            handle: Some(handle),
        }
    }

    /// Pool name, used in logs.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// True when pinned to a runtime.
    pub fn is_bound(&self) -> bool {
        self.handle.is_some()
    }

    /// Pin an unbound pool to the current runtime.
    pub fn bind_current(&self) -> Result<Self, ConfigError> {
        if self.handle.is_some() {
            return Ok(self.clone());
        }
        let handle = Handle::try_current().map_err(|_| ConfigError::NoRuntime {
            pool: self.name.clone(),
        })?;
        Ok(Self::from_handle(self.name.clone(), handle))
    }

    /// Spawn `future` on this pool.
    pub fn spawn<F>(&self, future: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        match &self.handle {
            Some(handle) => handle.spawn(future),
            None => tokio::spawn(future),
        }
    }
}

/// Immutable settings of one stage (node).
#[derive(Debug, Clone)]
pub struct StageConfig {
    cluster_name: ClusterName,
    node_identity: NodeIdentity,
    node_mode: NodeMode,
    cpu_pool: ExecutionPool,
    io_pool: ExecutionPool,
    tick_rate: Duration,
    response_timeout: Duration,
    packages: Vec<String>,
}

impl StageConfig {
    /// Start building a configuration.
    pub fn builder() -> StageConfigBuilder {
        StageConfigBuilder::default()
    }

    /// Cluster this node belongs to.
    pub fn cluster_name(&self) -> &ClusterName {
        &self.cluster_name
    }

    /// This node's own address.
    pub fn node_identity(&self) -> &NodeIdentity {
        &self.node_identity
    }

    /// Whether this node hosts addressables.
    pub fn node_mode(&self) -> NodeMode {
        self.node_mode
    }

    /// Pool for dispatch and inbound traversals.
    pub fn cpu_pool(&self) -> &ExecutionPool {
        &self.cpu_pool
    }

    /// Pool for outbound traversals and transport work.
    pub fn io_pool(&self) -> &ExecutionPool {
        &self.io_pool
    }

    /// Period of maintenance work such as response timeout sweeps.
    pub fn tick_rate(&self) -> Duration {
        self.tick_rate
    }

    /// How long a request waits before failing with a timeout.
    pub fn response_timeout(&self) -> Duration {
        self.response_timeout
    }

    /// Packages searched for interface definitions. Empty means all.
    pub fn packages(&self) -> &[String] {
        &self.packages
    }

    /// True when `interface` falls inside the configured packages.
    pub fn in_scope(&self, interface: &InterfaceId) -> bool {
        self.packages.is_empty()
            || self
                .packages
                .iter()
                .any(|package| interface.is_in_package(package))
    }

    /// Same settings with both pools pinned to the current runtime.
    pub(crate) fn bind_pools(&self) -> Result<Self, ConfigError> {
        Ok(Self {
            cpu_pool: self.cpu_pool.bind_current()?,
            io_pool: self.io_pool.bind_current()?,
            ..self.clone()
        })
    }
}

impl Default for StageConfig {
    fn default() -> Self {
        StageConfigBuilder::default().into_config()
    }
}

/// Builder for [`StageConfig`].
#[derive(Debug, Clone, Default)]
pub struct StageConfigBuilder {
    cluster_name: Option<ClusterName>,
    node_identity: Option<NodeIdentity>,
    node_mode: NodeMode,
    cpu_pool: Option<ExecutionPool>,
    io_pool: Option<ExecutionPool>,
    tick_rate: Option<Duration>,
    response_timeout: Option<Duration>,
    packages: Vec<String>,
}

impl StageConfigBuilder {
    /// Set the cluster name.
    pub fn cluster_name(mut self, name: ClusterName) -> Self {
        self.cluster_name = Some(name);
        self
    }

    /// Set the node identity instead of generating one.
    pub fn node_identity(mut self, identity: NodeIdentity) -> Self {
        self.node_identity = Some(identity);
        self
    }

    /// Set the node mode.
    pub fn node_mode(mut self, mode: NodeMode) -> Self {
        self.node_mode = mode;
        self
    }

    /// Set the CPU pool.
    pub fn cpu_pool(mut self, pool: ExecutionPool) -> Self {
        self.cpu_pool = Some(pool);
        self
    }

    /// Set the IO pool.
    pub fn io_pool(mut self, pool: ExecutionPool) -> Self {
        self.io_pool = Some(pool);
        self
    }

    /// Set the maintenance tick.
    pub fn tick_rate(mut self, tick_rate: Duration) -> Self {
        self.tick_rate = Some(tick_rate);
        self
    }

    /// Set the response timeout.
    pub fn response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout = Some(timeout);
        self
    }

    /// Restrict interface registration to these packages.
    pub fn packages<I, S>(mut self, packages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.packages = packages.into_iter().map(Into::into).collect();
        self
    }

    /// Validate and build.
    pub fn build(self) -> Result<StageConfig, ConfigError> {
        let config = self.into_config();

        if config.cluster_name.as_str().is_empty() {
            return Err(ConfigError::EmptyClusterName);
        }
        if config.node_identity.as_str().is_empty() {
            return Err(ConfigError::EmptyNodeIdentity);
        }
        if config.tick_rate.is_zero() {
            return Err(ConfigError::ZeroTickRate);
        }
        if config.response_timeout.is_zero() {
            return Err(ConfigError::ZeroResponseTimeout);
        }
        Ok(config)
    }

    fn into_config(self) -> StageConfig {
        StageConfig {
            cluster_name: self.cluster_name.unwrap_or_default(),
            node_identity: self.node_identity.unwrap_or_else(NodeIdentity::random),
            node_mode: self.node_mode,
            cpu_pool: self
                .cpu_pool
                .unwrap_or_else(|| ExecutionPool::ambient("moonpool-cpu")),
            io_pool: self
                .io_pool
                .unwrap_or_else(|| ExecutionPool::ambient("moonpool-io")),
            tick_rate: self.tick_rate.unwrap_or(DEFAULT_TICK_RATE),
            response_timeout: self.response_timeout.unwrap_or(DEFAULT_RESPONSE_TIMEOUT),
            packages: self.packages,
        }
    }
}
