//! One connection to an external capability server.
//!
//! Lifecycle: Connecting → Ready (handshake + discovery succeeded) →
//! Degraded (transport failure, reconnect pending) → Closed (explicit
//! shutdown or retries exhausted). The current state is published on a
//! `watch` channel so the manager and status displays observe transitions
//! without polling.

use crate::protocol::{self, RemoteToolDescriptor, ToolListResponse};
use crate::transport::Transport;
use roost_config::McpServerConfig;
use roost_core::error::McpError;
use serde_json::{Value, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, Notify, watch};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Ready,
    Degraded,
    Closed,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Connecting => "connecting",
            ConnectionState::Ready => "ready",
            ConnectionState::Degraded => "degraded",
            ConnectionState::Closed => "closed",
        }
    }
}

enum TransportSource {
    /// Build a fresh transport from the config on every (re)connect.
    Config(Box<McpServerConfig>),
    /// A pre-built transport, consumed once (tests). Reconnects fail.
    Injected(Mutex<Option<Transport>>),
}

pub struct McpConnection {
    name: String,
    source: TransportSource,
    transport: Mutex<Option<Arc<Transport>>>,
    request_id: AtomicU64,
    request_timeout: Duration,
    state_tx: watch::Sender<ConnectionState>,
    /// Signalled when a call observes a transport failure; the supervisor
    /// listens here for HTTP connections that have no persistent link.
    failed: Notify,
}

impl McpConnection {
    pub fn from_config(config: McpServerConfig) -> Arc<Self> {
        let request_timeout = Duration::from_secs(config.request_timeout_secs);
        let (state_tx, _) = watch::channel(ConnectionState::Connecting);
        Arc::new(Self {
            name: config.name.clone(),
            source: TransportSource::Config(Box::new(config)),
            transport: Mutex::new(None),
            request_id: AtomicU64::new(1),
            request_timeout,
            state_tx,
            failed: Notify::new(),
        })
    }

    /// Build around an existing transport (tests drive a scripted server
    /// over in-process pipes).
    pub(crate) fn with_transport(
        name: impl Into<String>,
        transport: Transport,
        request_timeout: Duration,
    ) -> Arc<Self> {
        let (state_tx, _) = watch::channel(ConnectionState::Connecting);
        Arc::new(Self {
            name: name.into(),
            source: TransportSource::Injected(Mutex::new(Some(transport))),
            transport: Mutex::new(None),
            request_id: AtomicU64::new(1),
            request_timeout,
            state_tx,
            failed: Notify::new(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    pub(crate) fn set_state(&self, state: ConnectionState) {
        if *self.state_tx.borrow() != state {
            debug!(server = %self.name, state = state.as_str(), "Connection state change");
            self.state_tx.send_replace(state);
        }
    }

    /// Establish the transport, run the `initialize` handshake, and
    /// discover the server's tools. Leaves the connection Ready.
    pub async fn connect(&self) -> Result<Vec<RemoteToolDescriptor>, McpError> {
        self.set_state(ConnectionState::Connecting);

        let transport = match &self.source {
            TransportSource::Config(config) => {
                Transport::from_config(config, self.request_timeout)?
            }
            TransportSource::Injected(slot) => slot.lock().await.take().ok_or_else(|| {
                McpError::ConnectionLost("injected transport cannot reconnect".into())
            })?,
        };
        *self.transport.lock().await = Some(Arc::new(transport));

        self.send("initialize", protocol::initialize_params())
            .await
            .map_err(|e| McpError::HandshakeFailed(e.to_string()))?;

        let result = self.send("tools/list", json!({})).await?;
        let list: ToolListResponse = serde_json::from_value(result)
            .map_err(|e| McpError::Protocol(format!("tool list decode: {e}")))?;

        self.set_state(ConnectionState::Ready);
        info!(
            server = %self.name,
            tools = list.tools.len(),
            "Capability server ready"
        );
        Ok(list.tools)
    }

    /// Invoke one remote tool and flatten its result to text.
    ///
    /// A server-side or protocol error fails only this call. A transport
    /// failure additionally flags the connection for the supervisor.
    pub async fn call_tool(&self, tool: &str, arguments: Value) -> Result<String, McpError> {
        let params = json!({
            "name": tool,
            "arguments": arguments,
        });
        let result = match self.send("tools/call", params).await {
            Ok(result) => result,
            Err(e @ McpError::ConnectionLost(_)) => {
                self.flag_failure();
                return Err(e);
            }
            Err(e) => return Err(e),
        };

        let (text, is_error) = protocol::flatten_call_result(&result);
        if is_error {
            return Err(McpError::Server {
                code: 0,
                message: text,
            });
        }
        Ok(text)
    }

    async fn send(&self, method: &str, params: Value) -> Result<Value, McpError> {
        let transport = {
            let guard = self.transport.lock().await;
            guard
                .as_ref()
                .cloned()
                .ok_or_else(|| McpError::NotConnected(self.name.clone()))?
        };
        if !transport.is_alive() {
            self.flag_failure();
            return Err(McpError::ConnectionLost("transport is down".into()));
        }

        let id = self.request_id.fetch_add(1, Ordering::SeqCst);
        let body = protocol::request(id, method, params);
        let payload = transport
            .send_request(id, body, self.request_timeout)
            .await?;
        protocol::extract_result(payload)
    }

    fn flag_failure(&self) {
        self.failed.notify_waiters();
    }

    /// Resolve when the connection has left Ready: either the persistent
    /// transport link died or a call observed a transport failure.
    pub(crate) async fn wait_failure(&self) {
        let transport = {
            let guard = self.transport.lock().await;
            guard.as_ref().cloned()
        };
        match transport {
            Some(transport) => {
                tokio::select! {
                    _ = transport.wait_dead() => {}
                    _ = self.failed.notified() => {}
                }
            }
            None => self.failed.notified().await,
        }
    }

    /// Explicit shutdown: kill the transport and mark Closed.
    pub async fn close(&self) {
        if let Some(transport) = self.transport.lock().await.take() {
            transport.shutdown().await;
        }
        self.set_state(ConnectionState::Closed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{StdioTransport, read_frame, write_frame};
    use tokio::io::BufReader;

    /// Spawn a scripted MCP server over a duplex pipe and return a
    /// connection wired to it. The server answers `initialize`,
    /// `tools/list` (two tools), and echoes `tools/call` arguments.
    fn scripted_connection() -> Arc<McpConnection> {
        let (client_side, server_side) = tokio::io::duplex(16 * 1024);
        let (client_read, client_write) = tokio::io::split(client_side);
        let transport = Transport::Stdio(StdioTransport::from_io(
            Box::new(client_write),
            Box::new(client_read),
        ));

        let (server_read, mut server_write) = tokio::io::split(server_side);
        tokio::spawn(async move {
            let mut reader = BufReader::new(server_read);
            loop {
                let Ok(frame) = read_frame(&mut reader).await else {
                    return;
                };
                let id = protocol::response_id(&frame).unwrap_or(0);
                let method = frame["method"].as_str().unwrap_or("");
                let response = match method {
                    "initialize" => json!({
                        "jsonrpc": "2.0", "id": id,
                        "result": {"protocolVersion": "2024-11-05"}
                    }),
                    "tools/list" => json!({
                        "jsonrpc": "2.0", "id": id,
                        "result": {"tools": [
                            {"name": "search", "description": "Web search",
                             "inputSchema": {"type": "object", "properties": {"q": {"type": "string"}}, "required": ["q"]}},
                            {"name": "fetch", "description": "Fetch a URL"},
                        ]}
                    }),
                    "tools/call" => {
                        let echoed = frame["params"]["arguments"].to_string();
                        json!({
                            "jsonrpc": "2.0", "id": id,
                            "result": {"content": [{"type": "text", "text": echoed}]}
                        })
                    }
                    _ => json!({
                        "jsonrpc": "2.0", "id": id,
                        "error": {"code": -32601, "message": "method not found"}
                    }),
                };
                if write_frame(&mut server_write, &response).await.is_err() {
                    return;
                }
            }
        });

        McpConnection::with_transport("testsrv", transport, Duration::from_secs(5))
    }

    #[tokio::test]
    async fn connect_discovers_tools_and_becomes_ready() {
        let connection = scripted_connection();
        assert_eq!(connection.state(), ConnectionState::Connecting);

        let tools = connection.connect().await.unwrap();
        assert_eq!(connection.state(), ConnectionState::Ready);
        assert_eq!(tools.len(), 2);
        assert_eq!(tools[0].name, "search");
        assert_eq!(tools[1].name, "fetch");
    }

    #[tokio::test]
    async fn call_tool_roundtrips_arguments() {
        let connection = scripted_connection();
        connection.connect().await.unwrap();

        let text = connection
            .call_tool("search", json!({"q": "rust"}))
            .await
            .unwrap();
        assert!(text.contains("rust"));
    }

    #[tokio::test]
    async fn unknown_method_is_a_server_error_not_a_teardown() {
        let connection = scripted_connection();
        connection.connect().await.unwrap();

        let err = connection.send("bogus/method", json!({})).await.unwrap_err();
        assert!(matches!(err, McpError::Server { .. }));
        // The connection is still usable afterwards.
        assert_eq!(connection.state(), ConnectionState::Ready);
        connection.call_tool("search", json!({"q": "x"})).await.unwrap();
    }

    #[tokio::test]
    async fn call_before_connect_is_not_connected() {
        let connection = scripted_connection();
        let err = connection.call_tool("search", json!({})).await.unwrap_err();
        assert!(matches!(err, McpError::NotConnected(_)));
    }

    #[tokio::test]
    async fn close_marks_closed() {
        let connection = scripted_connection();
        connection.connect().await.unwrap();
        connection.close().await;
        assert_eq!(connection.state(), ConnectionState::Closed);
    }
}
