//! Sandbox protocol: WebSocket message types exchanged between the gateway
//! and a remote sandbox node.
//!
//! A sandbox node is a per-project execution environment (container, VM, or
//! bare process host) that accepts shell commands on behalf of the run
//! coordinator's `get_or_start_sandbox` / `exec` / `stop` lifecycle. This
//! mirrors the exec/tool-request shape of a macOS sidecar connection, but
//! generalized to "one sandbox per project" rather than "one capability
//! provider per machine."

use serde::{Deserialize, Serialize};

/// Bumped whenever a breaking change is made to [`SandboxWsMessage`].
pub const PROTOCOL_VERSION: u32 = 1;

/// Max exec response payload size in bytes (4 MB). Sandboxes should
/// truncate stdout/stderr exceeding this and set `truncated = true`.
pub const MAX_EXEC_RESPONSE_BYTES: usize = 4 * 1024 * 1024;

/// WebSocket message envelope exchanged with a remote sandbox node.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SandboxWsMessage {
    /// Sandbox → Gateway: initial handshake, sent once the process/
    /// container is up and ready to accept commands.
    #[serde(rename = "sandbox_hello")]
    SandboxHello {
        sandbox_id: String,
        project_id: String,
        protocol_version: u32,
    },

    /// Gateway → Sandbox: handshake accepted.
    #[serde(rename = "gateway_welcome")]
    GatewayWelcome {
        session_id: String,
        gateway_version: String,
    },

    /// Gateway → Sandbox: run a shell command.
    #[serde(rename = "exec_request")]
    ExecRequest {
        request_id: String,
        command: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        workdir: Option<String>,
        timeout_sec: u64,
    },

    /// Sandbox → Gateway: command result.
    #[serde(rename = "exec_response")]
    ExecResponse {
        request_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        exit_code: Option<i32>,
        stdout: String,
        stderr: String,
        #[serde(default, skip_serializing_if = "std::ops::Not::not")]
        truncated: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },

    /// Gateway → Sandbox: tear down and exit. The sandbox should run its
    /// cleanup commands (if any were pushed ahead of this message) and
    /// acknowledge before the gateway closes the socket.
    #[serde(rename = "stop")]
    Stop {
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },

    /// Sandbox → Gateway: acknowledges `Stop`.
    #[serde(rename = "stop_ack")]
    StopAck,

    /// Bidirectional: heartbeat.
    #[serde(rename = "ping")]
    Ping { timestamp: i64 },

    /// Bidirectional: heartbeat response.
    #[serde(rename = "pong")]
    Pong { timestamp: i64 },
}

/// Error surfaced by the sandbox wire layer (connect failures, protocol
/// version mismatch, malformed frames) — distinct from a nonzero exit code,
/// which is a normal [`SandboxWsMessage::ExecResponse`].
#[derive(Debug, Clone, Serialize, Deserialize, thiserror::Error)]
pub enum ProtocolError {
    #[error("sandbox protocol version mismatch: node={node}, gateway={gateway}")]
    VersionMismatch { node: u32, gateway: u32 },
    #[error("malformed frame: {0}")]
    Malformed(String),
    #[error("unexpected message for current state")]
    UnexpectedMessage,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exec_request_round_trips() {
        let msg = SandboxWsMessage::ExecRequest {
            request_id: "r1".into(),
            command: "ls -la".into(),
            workdir: Some("/workspace".into()),
            timeout_sec: 60,
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"type\":\"exec_request\""));
        let back: SandboxWsMessage = serde_json::from_str(&json).unwrap();
        match back {
            SandboxWsMessage::ExecRequest { command, timeout_sec, .. } => {
                assert_eq!(command, "ls -la");
                assert_eq!(timeout_sec, 60);
            }
            other => panic!("unexpected variant: {other:?}"),
        }
    }

    #[test]
    fn hello_tag_matches_wire_contract() {
        let msg = SandboxWsMessage::SandboxHello {
            sandbox_id: "sbx-1".into(),
            project_id: "proj-1".into(),
            protocol_version: PROTOCOL_VERSION,
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "sandbox_hello");
        assert_eq!(json["protocol_version"], PROTOCOL_VERSION);
    }
}
