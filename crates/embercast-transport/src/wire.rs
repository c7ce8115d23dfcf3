//! Wire envelope for the signaling channel.
//!
//! # Lifecycle
//!
//! ```text
//! 1. sender  → connect { deviceName }
//! 2. receiver → connect_ack { senderID, statusText, accepted }
//! 3. sender  → keepalive / visibility / document_state / volume / message
//! 4. sender  → close (or the socket drops)
//! ```
//!
//! Frames are a 4-byte big-endian length followed by one JSON object.

use embercast_core::TransportError;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::debug;

/// Upper bound on a single frame body. Anything larger is a protocol error.
pub const MAX_FRAME_LEN: usize = 1_048_576;

// MARK: - FrameType

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FrameType {
    Connect,
    ConnectAck,
    Message,
    Keepalive,
    Visibility,
    /// Legacy duplicate of `visibility`, carrying a `"visible"`/`"hidden"`
    /// string instead of a flag. Both sources may fire for one transition.
    DocumentState,
    Volume,
    Close,
}

// MARK: - CastFrame

/// One signaling frame. A flat envelope with optional fields; which fields
/// are set depends on [`FrameType`].
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct CastFrame {
    #[serde(rename = "type")]
    pub frame_type: FrameType,
    #[serde(rename = "senderID", skip_serializing_if = "Option::is_none")]
    pub sender_id: Option<String>,
    #[serde(rename = "deviceName", skip_serializing_if = "Option::is_none")]
    pub device_name: Option<String>,
    #[serde(rename = "statusText", skip_serializing_if = "Option::is_none")]
    pub status_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accepted: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub visible: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub muted: Option<bool>,
    #[serde(rename = "timestampMs", skip_serializing_if = "Option::is_none")]
    pub timestamp_ms: Option<u64>,
}

impl CastFrame {
    fn bare(frame_type: FrameType) -> Self {
        Self {
            frame_type,
            sender_id: None,
            device_name: None,
            status_text: None,
            accepted: None,
            reason: None,
            namespace: None,
            payload: None,
            visible: None,
            state: None,
            level: None,
            muted: None,
            timestamp_ms: None,
        }
    }

    pub fn connect(device_name: &str) -> Self {
        Self {
            device_name: Some(device_name.to_owned()),
            ..Self::bare(FrameType::Connect)
        }
    }

    pub fn connect_ack(sender_id: &str, status_text: &str) -> Self {
        Self {
            sender_id: Some(sender_id.to_owned()),
            status_text: Some(status_text.to_owned()),
            accepted: Some(true),
            ..Self::bare(FrameType::ConnectAck)
        }
    }

    pub fn connect_rejected(reason: &str) -> Self {
        Self {
            accepted: Some(false),
            reason: Some(reason.to_owned()),
            ..Self::bare(FrameType::ConnectAck)
        }
    }

    pub fn message(namespace: &str, payload: impl Into<String>) -> Self {
        Self {
            namespace: Some(namespace.to_owned()),
            payload: Some(payload.into()),
            ..Self::bare(FrameType::Message)
        }
    }

    pub fn keepalive(timestamp_ms: u64) -> Self {
        Self {
            timestamp_ms: Some(timestamp_ms),
            ..Self::bare(FrameType::Keepalive)
        }
    }

    pub fn visibility(visible: bool) -> Self {
        Self {
            visible: Some(visible),
            ..Self::bare(FrameType::Visibility)
        }
    }

    pub fn document_state(state: &str) -> Self {
        Self {
            state: Some(state.to_owned()),
            ..Self::bare(FrameType::DocumentState)
        }
    }

    pub fn volume(level: f32, muted: bool) -> Self {
        Self {
            level: Some(level),
            muted: Some(muted),
            ..Self::bare(FrameType::Volume)
        }
    }

    pub fn close() -> Self {
        Self::bare(FrameType::Close)
    }
}

// MARK: - Framing

pub async fn write_frame(
    stream: &mut (impl AsyncWriteExt + Unpin),
    frame: &CastFrame,
) -> Result<(), TransportError> {
    let json = serde_json::to_vec(frame).map_err(|e| TransportError::SendFailed {
        reason: e.to_string(),
    })?;
    let len = json.len() as u32;
    stream
        .write_all(&len.to_be_bytes())
        .await
        .map_err(send_err)?;
    stream.write_all(&json).await.map_err(send_err)?;
    stream.flush().await.map_err(send_err)?;
    debug!("Sent {:?} ({} bytes)", frame.frame_type, json.len());
    Ok(())
}

pub async fn read_frame(
    stream: &mut (impl AsyncReadExt + Unpin),
) -> Result<CastFrame, TransportError> {
    let mut len_buf = [0u8; 4];
    stream.read_exact(&mut len_buf).await.map_err(recv_err)?;
    let len = u32::from_be_bytes(len_buf) as usize;
    if len > MAX_FRAME_LEN {
        return Err(TransportError::FrameTooLarge { len });
    }
    let mut body = vec![0u8; len];
    stream.read_exact(&mut body).await.map_err(recv_err)?;
    let frame: CastFrame =
        serde_json::from_slice(&body).map_err(|e| TransportError::ReceiveFailed {
            reason: e.to_string(),
        })?;
    debug!("Received {:?} ({} bytes)", frame.frame_type, len);
    Ok(frame)
}

fn send_err(e: std::io::Error) -> TransportError {
    TransportError::SendFailed {
        reason: e.to_string(),
    }
}

fn recv_err(e: std::io::Error) -> TransportError {
    if e.kind() == std::io::ErrorKind::UnexpectedEof {
        TransportError::ConnectionClosed
    } else {
        TransportError::ReceiveFailed {
            reason: e.to_string(),
        }
    }
}
