//! The capability-server manager: owns every connection, supervises its
//! lifecycle, and keeps the tool registry consistent with what is
//! actually reachable.
//!
//! On Ready, a connection's discovered tools are registered as
//! `<server>_<tool>` proxies; the moment it leaves Ready they are revoked
//! in one atomic registry operation, so the model is never offered a tool
//! its backing connection cannot serve. Reconnects back off exponentially
//! up to a ceiling; exhausting the retry budget closes the connection.

use crate::connection::{ConnectionState, McpConnection};
use crate::protocol::RemoteToolDescriptor;
use crate::proxy::McpProxyTool;
use chrono::Utc;
use roost_config::McpServerConfig;
use roost_core::event::{DomainEvent, EventBus};
use roost_core::tool::{Tool, ToolRegistry};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{info, warn};

const BACKOFF_BASE_SECS: u64 = 1;
const BACKOFF_CEILING_SECS: u64 = 60;

struct ManagedConnection {
    connection: Arc<McpConnection>,
    sensitive: bool,
    max_reconnects: u32,
}

/// Status snapshot for one server, for CLIs and diagnostics.
#[derive(Debug, Clone)]
pub struct ServerStatus {
    pub server: String,
    pub state: ConnectionState,
    pub tools: usize,
}

pub struct McpManager {
    registry: Arc<ToolRegistry>,
    events: Arc<EventBus>,
    connections: RwLock<Vec<ManagedConnection>>,
}

impl McpManager {
    pub fn new(registry: Arc<ToolRegistry>, events: Arc<EventBus>) -> Arc<Self> {
        Arc::new(Self {
            registry,
            events,
            connections: RwLock::new(Vec::new()),
        })
    }

    /// Create and supervise a connection per enabled config entry.
    pub async fn start(self: &Arc<Self>, configs: &[McpServerConfig]) {
        for config in configs.iter().filter(|c| c.enabled) {
            let sensitive = config.sensitive;
            let max_reconnects = config.max_reconnects;
            let connection = McpConnection::from_config(config.clone());
            self.attach(connection, sensitive, max_reconnects).await;
        }
    }

    /// Register a connection and spawn its supervisor.
    pub(crate) async fn attach(
        self: &Arc<Self>,
        connection: Arc<McpConnection>,
        sensitive: bool,
        max_reconnects: u32,
    ) {
        self.connections.write().await.push(ManagedConnection {
            connection: connection.clone(),
            sensitive,
            max_reconnects,
        });
        let manager = self.clone();
        tokio::spawn(async move {
            manager.supervise(connection, sensitive, max_reconnects).await;
        });
    }

    async fn supervise(
        self: Arc<Self>,
        connection: Arc<McpConnection>,
        sensitive: bool,
        max_reconnects: u32,
    ) {
        let server = connection.name().to_string();
        let mut attempts: u32 = 0;

        loop {
            match connection.connect().await {
                Ok(tools) => {
                    attempts = 0;
                    self.publish_tools(&connection, tools, sensitive);
                    self.publish_state(&server, ConnectionState::Ready);

                    // Park until the connection leaves Ready.
                    connection.wait_failure().await;

                    let revoked = self.registry.remove_provider(&server);
                    connection.set_state(ConnectionState::Degraded);
                    self.publish_state(&server, ConnectionState::Degraded);
                    warn!(server = %server, revoked, "Connection degraded, tools revoked");
                }
                Err(e) => {
                    connection.set_state(ConnectionState::Degraded);
                    self.publish_state(&server, ConnectionState::Degraded);
                    warn!(server = %server, error = %e, "Connect attempt failed");
                }
            }

            attempts += 1;
            if attempts > max_reconnects {
                self.registry.remove_provider(&server);
                connection.close().await;
                self.publish_state(&server, ConnectionState::Closed);
                warn!(server = %server, attempts, "Retry budget exhausted, connection closed");
                return;
            }

            let backoff = reconnect_backoff(attempts);
            info!(server = %server, attempt = attempts, delay_secs = backoff.as_secs(), "Reconnecting after backoff");
            tokio::time::sleep(backoff).await;
        }
    }

    fn publish_tools(
        &self,
        connection: &Arc<McpConnection>,
        tools: Vec<RemoteToolDescriptor>,
        sensitive: bool,
    ) {
        for descriptor in tools {
            let proxy = McpProxyTool::new(connection.clone(), descriptor, sensitive);
            let name = proxy.name().to_string();
            if let Err(e) = self.registry.register(Arc::new(proxy)) {
                // Collision with a local tool or another server; the first
                // registration stays active.
                warn!(tool = %name, error = %e, "Skipping conflicting remote tool");
            }
        }
    }

    fn publish_state(&self, server: &str, state: ConnectionState) {
        self.events.publish(DomainEvent::ConnectionStateChanged {
            server: server.to_string(),
            state: state.as_str().to_string(),
            timestamp: Utc::now(),
        });
    }

    /// Per-server status with the number of currently registered tools.
    pub async fn status(&self) -> Vec<ServerStatus> {
        let connections = self.connections.read().await;
        connections
            .iter()
            .map(|managed| {
                let server = managed.connection.name().to_string();
                let prefix = format!("{server}_");
                let tools = self
                    .registry
                    .names()
                    .iter()
                    .filter(|n| n.starts_with(&prefix))
                    .count();
                ServerStatus {
                    server,
                    state: managed.connection.state(),
                    tools,
                }
            })
            .collect()
    }

    /// Close every connection and revoke all remote tools.
    pub async fn shutdown(&self) {
        let connections = self.connections.read().await;
        for managed in connections.iter() {
            self.registry.remove_provider(managed.connection.name());
            managed.connection.close().await;
        }
    }
}

fn reconnect_backoff(attempt: u32) -> Duration {
    let exp = attempt.min(6).saturating_sub(1);
    Duration::from_secs((BACKOFF_BASE_SECS << exp).min(BACKOFF_CEILING_SECS))
}
