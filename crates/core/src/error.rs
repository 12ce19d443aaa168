//! Error types for the Roost domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error enum; the top-level `Error`
//! wraps them so `?` composes across crate boundaries.

use thiserror::Error;

/// The top-level error type for all Roost operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    #[error("Capability server error: {0}")]
    Mcp(#[from] McpError),

    #[error("Approval error: {0}")]
    Approval(#[from] ApprovalError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    /// The model endpoint could not be reached at all. Aborts the turn.
    #[error("Model unavailable: {0}")]
    Unavailable(String),

    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("Request timed out: {0}")]
    Timeout(String),
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    /// Arguments failed schema validation. Surfaced to the model as a
    /// failed tool result so it can retry with corrected arguments.
    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),

    #[error("Tool timed out: {tool_name} after {timeout_secs}s")]
    Timeout { tool_name: String, timeout_secs: u64 },

    #[error("Tool execution failed: {tool_name} — {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    /// A tool with this name is already registered. The newer registration
    /// is rejected; the existing tool stays active.
    #[error("Tool name already registered: {0}")]
    RegistrationConflict(String),
}

#[derive(Debug, Error)]
pub enum McpError {
    /// Malformed payload or correlation mismatch. Fails one invocation
    /// without tearing down the connection.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Transport failure. Moves the connection to Degraded and revokes
    /// its tool descriptors until it is Ready again.
    #[error("Connection lost: {0}")]
    ConnectionLost(String),

    #[error("Handshake failed: {0}")]
    HandshakeFailed(String),

    /// Application-level error reported by the server for one call.
    #[error("Server error {code}: {message}")]
    Server { code: i64, message: String },

    #[error("Server not connected: {0}")]
    NotConnected(String),
}

#[derive(Debug, Error)]
pub enum ApprovalError {
    #[error("Approval request expired: {0}")]
    Expired(String),

    #[error("Approval request already resolved: {0}")]
    AlreadyResolved(String),

    #[error("Unknown approval request: {0}")]
    UnknownRequest(String),
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Failed to open store: {0}")]
    Open(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("Channel not configured: {0}")]
    NotConfigured(String),

    #[error("Message delivery failed on {channel}: {reason}")]
    DeliveryFailed { channel: String, reason: String },

    #[error("Channel connection lost: {0}")]
    ConnectionLost(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_unavailable_displays_context() {
        let err = Error::Provider(ProviderError::Unavailable(
            "connection refused (os error 111)".into(),
        ));
        assert!(err.to_string().contains("Model unavailable"));
        assert!(err.to_string().contains("refused"));
    }

    #[test]
    fn registration_conflict_names_the_tool() {
        let err = Error::Tool(ToolError::RegistrationConflict("search".into()));
        assert!(err.to_string().contains("search"));
        assert!(err.to_string().contains("already registered"));
    }

    #[test]
    fn mcp_server_error_carries_code() {
        let err = McpError::Server {
            code: -32602,
            message: "invalid params".into(),
        };
        assert!(err.to_string().contains("-32602"));
    }
}
