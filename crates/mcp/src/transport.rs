//! MCP transports: stdio subprocess (Content-Length framed) and HTTP POST.
//!
//! The stdio transport multiplexes concurrent requests over one pipe: a
//! dedicated reader task routes each incoming frame to the `oneshot`
//! registered under its correlation id, so one slow call never blocks an
//! unrelated one. Frames that fail to parse are logged and skipped — a
//! malformed payload fails only the invocation that was waiting for it
//! (by timeout), never the connection.

use crate::protocol;
use roost_config::McpServerConfig;
use roost_core::error::McpError;
use serde_json::Value;
use std::collections::HashMap;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{Mutex, oneshot, watch};
use tracing::{debug, trace, warn};

pub(crate) type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;
pub(crate) type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;

/// Write one Content-Length framed JSON message.
pub(crate) async fn write_frame<W: AsyncWrite + Unpin>(
    writer: &mut W,
    payload: &Value,
) -> Result<(), McpError> {
    let body = serde_json::to_vec(payload)
        .map_err(|e| McpError::Protocol(format!("frame encode: {e}")))?;
    let header = format!("Content-Length: {}\r\n\r\n", body.len());
    writer
        .write_all(header.as_bytes())
        .await
        .map_err(|e| McpError::ConnectionLost(format!("write header: {e}")))?;
    writer
        .write_all(&body)
        .await
        .map_err(|e| McpError::ConnectionLost(format!("write body: {e}")))?;
    writer
        .flush()
        .await
        .map_err(|e| McpError::ConnectionLost(format!("flush: {e}")))?;
    Ok(())
}

/// Read one Content-Length framed JSON message.
///
/// `ConnectionLost` on EOF or read failure; `Protocol` on a malformed
/// header or body (the stream itself is still usable afterwards only for
/// header errors — body errors consume the declared length first).
pub(crate) async fn read_frame<R: AsyncBufReadExt + Unpin>(
    reader: &mut R,
) -> Result<Value, McpError> {
    let mut content_length: Option<usize> = None;
    loop {
        let mut line = String::new();
        let read = reader
            .read_line(&mut line)
            .await
            .map_err(|e| McpError::ConnectionLost(format!("read header: {e}")))?;
        if read == 0 {
            return Err(McpError::ConnectionLost("stream closed".into()));
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            break;
        }
        if let Some(value) = trimmed.strip_prefix("Content-Length:") {
            content_length = value.trim().parse::<usize>().ok();
        }
    }

    let length =
        content_length.ok_or_else(|| McpError::Protocol("missing Content-Length".into()))?;
    let mut body = vec![0u8; length];
    reader
        .read_exact(&mut body)
        .await
        .map_err(|e| McpError::ConnectionLost(format!("read body: {e}")))?;

    serde_json::from_slice(&body).map_err(|e| McpError::Protocol(format!("frame decode: {e}")))
}

type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<Value>>>>;

/// Stdio transport over a spawned subprocess (or injected pipes in tests).
pub(crate) struct StdioTransport {
    writer: Mutex<BoxedWriter>,
    pending: PendingMap,
    dead_tx: watch::Sender<bool>,
    dead_rx: watch::Receiver<bool>,
    child: Mutex<Option<Child>>,
}

impl StdioTransport {
    /// Spawn the configured server process and start the reader task.
    pub(crate) fn spawn(config: &McpServerConfig) -> Result<Self, McpError> {
        let program = config
            .command
            .as_deref()
            .ok_or_else(|| McpError::HandshakeFailed("stdio transport needs a command".into()))?;

        let mut command = Command::new(program);
        command
            .args(&config.args)
            .envs(config.env.clone())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .kill_on_drop(true);

        let mut child = command
            .spawn()
            .map_err(|e| McpError::HandshakeFailed(format!("spawn {program}: {e}")))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| McpError::HandshakeFailed("no stdin pipe".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| McpError::HandshakeFailed("no stdout pipe".into()))?;

        Ok(Self::start(
            Box::new(stdin),
            Box::new(stdout),
            Some(child),
        ))
    }

    /// Build from raw pipes. Used by tests to run a scripted server over
    /// an in-process duplex stream.
    pub(crate) fn from_io(writer: BoxedWriter, reader: BoxedReader) -> Self {
        Self::start(writer, reader, None)
    }

    fn start(writer: BoxedWriter, reader: BoxedReader, child: Option<Child>) -> Self {
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let (dead_tx, dead_rx) = watch::channel(false);

        let reader_pending = pending.clone();
        let reader_dead = dead_tx.clone();
        tokio::spawn(async move {
            let mut reader = BufReader::new(reader);
            loop {
                match read_frame(&mut reader).await {
                    Ok(payload) => match protocol::response_id(&payload) {
                        Some(id) => {
                            let sender = reader_pending.lock().await.remove(&id);
                            match sender {
                                Some(tx) => {
                                    let _ = tx.send(payload);
                                }
                                None => {
                                    warn!(id, "Response for unknown correlation id, dropping");
                                }
                            }
                        }
                        None => {
                            // Server-initiated notification; we don't act on
                            // any yet.
                            trace!(?payload, "Ignoring server notification");
                        }
                    },
                    Err(McpError::Protocol(reason)) => {
                        // Malformed frame: skip it. The request waiting for
                        // it fails by timeout; the connection survives.
                        warn!(%reason, "Skipping malformed frame");
                    }
                    Err(e) => {
                        debug!(error = %e, "Stdio reader terminating");
                        break;
                    }
                }
            }
            let _ = reader_dead.send(true);
            // Wake every in-flight request with a closed channel.
            reader_pending.lock().await.clear();
        });

        Self {
            writer: Mutex::new(writer),
            pending,
            dead_tx,
            dead_rx,
            child: Mutex::new(child),
        }
    }

    pub(crate) fn is_alive(&self) -> bool {
        !*self.dead_rx.borrow()
    }

    /// Resolve when the reader task has terminated (process exit, EOF,
    /// broken pipe).
    pub(crate) async fn wait_dead(&self) {
        let mut rx = self.dead_rx.clone();
        while !*rx.borrow_and_update() {
            if rx.changed().await.is_err() {
                return;
            }
        }
    }

    pub(crate) async fn send_request(
        &self,
        id: u64,
        body: Value,
        timeout: Duration,
    ) -> Result<Value, McpError> {
        if !self.is_alive() {
            return Err(McpError::ConnectionLost("transport is down".into()));
        }

        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);

        {
            let mut writer = self.writer.lock().await;
            if let Err(e) = write_frame(&mut *writer, &body).await {
                self.pending.lock().await.remove(&id);
                let _ = self.dead_tx.send(true);
                return Err(e);
            }
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(payload)) => Ok(payload),
            Ok(Err(_)) => Err(McpError::ConnectionLost("transport closed mid-call".into())),
            Err(_) => {
                self.pending.lock().await.remove(&id);
                Err(McpError::Protocol(format!(
                    "request {id} timed out after {}s",
                    timeout.as_secs()
                )))
            }
        }
    }

    pub(crate) async fn shutdown(&self) {
        let _ = self.dead_tx.send(true);
        if let Some(mut child) = self.child.lock().await.take() {
            let _ = child.start_kill();
        }
    }
}

/// HTTP transport: one POST per request, correlation verified on the
/// response body.
pub(crate) struct HttpTransport {
    client: reqwest::Client,
    url: String,
    headers: HashMap<String, String>,
}

impl HttpTransport {
    pub(crate) fn new(config: &McpServerConfig, timeout: Duration) -> Result<Self, McpError> {
        let url = config
            .url
            .clone()
            .ok_or_else(|| McpError::HandshakeFailed("http transport needs a url".into()))?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| McpError::HandshakeFailed(format!("http client: {e}")))?;
        Ok(Self {
            client,
            url,
            headers: config.headers.clone(),
        })
    }

    pub(crate) async fn send_request(&self, id: u64, body: Value) -> Result<Value, McpError> {
        let mut request = self.client.post(&self.url).json(&body);
        for (key, value) in &self.headers {
            request = request.header(key, value);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                McpError::Protocol(format!("request {id} timed out"))
            } else {
                McpError::ConnectionLost(e.to_string())
            }
        })?;

        let status = response.status();
        let payload: Value = response
            .json()
            .await
            .map_err(|e| McpError::Protocol(format!("response decode: {e}")))?;

        if !status.is_success() {
            return Err(McpError::ConnectionLost(format!(
                "server returned HTTP {status}"
            )));
        }

        // Correlation mismatch is a protocol error for this call only.
        if protocol::response_id(&payload) != Some(id) {
            return Err(McpError::Protocol(format!(
                "correlation mismatch: expected id {id}"
            )));
        }

        Ok(payload)
    }
}

/// The transport a connection drives.
pub(crate) enum Transport {
    Stdio(StdioTransport),
    Http(HttpTransport),
}

impl Transport {
    pub(crate) fn from_config(
        config: &McpServerConfig,
        timeout: Duration,
    ) -> Result<Self, McpError> {
        match config.transport.as_str() {
            "stdio" => Ok(Transport::Stdio(StdioTransport::spawn(config)?)),
            "http" => Ok(Transport::Http(HttpTransport::new(config, timeout)?)),
            other => Err(McpError::HandshakeFailed(format!(
                "unknown transport '{other}'"
            ))),
        }
    }

    pub(crate) async fn send_request(
        &self,
        id: u64,
        body: Value,
        timeout: Duration,
    ) -> Result<Value, McpError> {
        match self {
            Transport::Stdio(t) => t.send_request(id, body, timeout).await,
            Transport::Http(t) => t.send_request(id, body).await,
        }
    }

    pub(crate) fn is_alive(&self) -> bool {
        match self {
            Transport::Stdio(t) => t.is_alive(),
            // HTTP has no persistent link; liveness shows up per-call.
            Transport::Http(_) => true,
        }
    }

    /// Resolve when the transport's persistent link drops. Pends forever
    /// for HTTP — failures there surface through calls instead.
    pub(crate) async fn wait_dead(&self) {
        match self {
            Transport::Stdio(t) => t.wait_dead().await,
            Transport::Http(_) => std::future::pending().await,
        }
    }

    pub(crate) async fn shutdown(&self) {
        if let Transport::Stdio(t) = self {
            t.shutdown().await;
        }
    }
}
