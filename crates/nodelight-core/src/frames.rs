//! JSON wire frames.
//!
//! Every frame is a JSON object discriminated by a `type` field. Field names
//! are camelCase and `color` is omitted when absent:
//!
//! ```json
//! {"type":"light_control","nodeId":"n1","command":"on","color":"#ff0000"}
//! {"type":"arduino_state","nodeId":"n1","state":"on"}
//! {"type":"request_states"}
//! {"type":"all_states","states":[{"type":"arduino_state","nodeId":"n1","state":"on"}]}
//! ```

use std::fmt;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::errors::FrameError;

/// Values of the `type` discriminant.
pub mod frame_type {
    /// Viewer → server → device light command.
    pub const LIGHT_CONTROL: &str = "light_control";
    /// Device → server → viewers state report.
    pub const ARDUINO_STATE: &str = "arduino_state";
    /// Viewer asks for the full state table.
    pub const REQUEST_STATES: &str = "request_states";
    /// Server reply carrying the full state table.
    pub const ALL_STATES: &str = "all_states";
}

/// Light behaviour, used both as a command and as an observed state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LightMode {
    /// Steady on.
    On,
    /// Off.
    Off,
    /// Blinking.
    Blink,
    /// Pulsing.
    Pulse,
}

impl LightMode {
    /// Wire spelling.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::On => "on",
            Self::Off => "off",
            Self::Blink => "blink",
            Self::Pulse => "pulse",
        }
    }
}

impl fmt::Display for LightMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A directive from a viewer to the device.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LightCommand {
    /// Target node.
    pub node_id: String,
    /// Requested behaviour.
    pub command: LightMode,
    /// Optional color, passed through verbatim.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

impl LightCommand {
    /// Build a command.
    pub fn new(node_id: impl Into<String>, command: LightMode, color: Option<String>) -> Self {
        Self {
            node_id: node_id.into(),
            command,
            color,
        }
    }

    /// Decode a `light_control` frame.
    pub fn decode(raw: &[u8]) -> Result<Self, FrameError> {
        match Frame::decode(raw)? {
            Frame::LightControl(command) => Ok(command),
            other => Err(FrameError::UnexpectedType {
                expected: frame_type::LIGHT_CONTROL,
                found: other.kind().to_string(),
            }),
        }
    }
}

/// Last known state of one node.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeState {
    /// Node identifier.
    pub node_id: String,
    /// Observed behaviour.
    pub state: LightMode,
    /// Optional color.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

impl NodeState {
    /// Build a state record.
    pub fn new(node_id: impl Into<String>, state: LightMode, color: Option<String>) -> Self {
        Self {
            node_id: node_id.into(),
            state,
            color,
        }
    }

    /// Decode an `arduino_state` frame.
    pub fn decode(raw: &[u8]) -> Result<Self, FrameError> {
        match Frame::decode(raw)? {
            Frame::ArduinoState(state) => Ok(state),
            other => Err(FrameError::UnexpectedType {
                expected: frame_type::ARDUINO_STATE,
                found: other.kind().to_string(),
            }),
        }
    }
}

impl From<&LightCommand> for NodeState {
    fn from(command: &LightCommand) -> Self {
        Self {
            node_id: command.node_id.clone(),
            state: command.command,
            color: command.color.clone(),
        }
    }
}

/// A decoded wire frame.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Frame {
    /// `light_control`
    LightControl(LightCommand),
    /// `arduino_state`
    ArduinoState(NodeState),
    /// `request_states`
    RequestStates,
    /// `all_states`
    AllStates {
        /// Every known node, each serialized as an `arduino_state` frame.
        #[serde(with = "tagged_states")]
        states: Vec<NodeState>,
    },
}

impl Frame {
    /// Decode any known frame.
    pub fn decode(raw: &[u8]) -> Result<Self, FrameError> {
        Ok(serde_json::from_slice(raw)?)
    }

    /// Serialize to the JSON bytes sent on the wire (no trailing newline).
    pub fn encode(&self) -> Result<Bytes, FrameError> {
        Ok(Bytes::from(serde_json::to_vec(self)?))
    }

    /// The `type` discriminant of this frame.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::LightControl(_) => frame_type::LIGHT_CONTROL,
            Self::ArduinoState(_) => frame_type::ARDUINO_STATE,
            Self::RequestStates => frame_type::REQUEST_STATES,
            Self::AllStates { .. } => frame_type::ALL_STATES,
        }
    }

    /// Read only the `type` discriminant of a raw frame.
    ///
    /// Succeeds for any JSON object carrying a string `type`, including kinds
    /// this crate does not model.
    pub fn peek_type(raw: &[u8]) -> Result<String, FrameError> {
        let map: serde_json::Map<String, serde_json::Value> = serde_json::from_slice(raw)?;
        match map.get("type") {
            Some(serde_json::Value::String(kind)) => Ok(kind.clone()),
            _ => Err(FrameError::MissingType),
        }
    }
}

/// `all_states` entries carry their own `"type":"arduino_state"` tag.
mod tagged_states {
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};

    use super::{Frame, NodeState};

    pub fn serialize<S: Serializer>(states: &[NodeState], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(states.iter().cloned().map(Frame::ArduinoState))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<NodeState>, D::Error> {
        Vec::<Frame>::deserialize(deserializer)?
            .into_iter()
            .map(|frame| match frame {
                Frame::ArduinoState(state) => Ok(state),
                other => Err(D::Error::custom(format!(
                    "all_states entry must be arduino_state, got {}",
                    other.kind()
                ))),
            })
            .collect()
    }
}
