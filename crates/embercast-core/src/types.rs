use serde::{Deserialize, Serialize};

// MARK: - SenderId

/// Opaque identifier assigned to a connected sender.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SenderId(String);

impl SenderId {
    /// Generate a fresh id for a newly accepted sender connection.
    pub fn random() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SenderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for SenderId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

// MARK: - SenderInfo

/// A sender currently connected to this receiver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SenderInfo {
    pub id: SenderId,
    pub device_name: String,
    pub address: String,
}

impl SenderInfo {
    pub fn new(id: SenderId, device_name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            id,
            device_name: device_name.into(),
            address: address.into(),
        }
    }
}

// MARK: - VisibilityState

/// Whether the receiving surface is currently being shown.
///
/// The sole driver of playback-guard transitions. Parsing is fail-safe:
/// an absent or unrecognised report maps to `Hidden` so the guard errs
/// toward pausing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VisibilityState {
    Visible,
    Hidden,
}

impl VisibilityState {
    pub fn from_flag(visible: bool) -> Self {
        if visible { Self::Visible } else { Self::Hidden }
    }

    /// Fail-safe mapping for an optional wire flag.
    pub fn from_report(visible: Option<bool>) -> Self {
        Self::from_flag(visible.unwrap_or(false))
    }

    /// Fail-safe mapping for the legacy document-state string
    /// (`"visible"` / `"hidden"`). Anything unrecognised counts as hidden.
    pub fn from_document_state(state: Option<&str>) -> Self {
        Self::from_flag(state == Some("visible"))
    }

    pub fn is_visible(self) -> bool {
        matches!(self, Self::Visible)
    }
}

impl std::fmt::Display for VisibilityState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Visible => write!(f, "visible"),
            Self::Hidden => write!(f, "hidden"),
        }
    }
}

// MARK: - SystemVolume

/// System volume as reported by a sender.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SystemVolume {
    /// Level in `[0.0, 1.0]`.
    pub level: f32,
    pub muted: bool,
}

impl SystemVolume {
    pub fn new(level: f32, muted: bool) -> Self {
        Self {
            level: level.clamp(0.0, 1.0),
            muted,
        }
    }
}
