//! Capability traits at the seams between components.
//!
//! The device variants only ever see a [`Broadcaster`]; the router only ever
//! sees a [`Device`]. Neither depends on the concrete hub or bridge type.

use std::fmt;

use bytes::Bytes;

use crate::frames::NodeState;

/// Fan a frame out to every connected viewer.
///
/// Implementations must not block: a frame that cannot be queued is dropped.
pub trait Broadcaster: Send + Sync {
    /// Queue `frame` for delivery to all registered clients.
    fn broadcast(&self, frame: Bytes);
}

/// Accept a viewer-issued frame destined for the device.
pub trait MessageHandler: Send + Sync {
    /// Handle one raw inbound frame. Malformed input is absorbed here.
    fn handle_message(&self, frame: &[u8]);
}

/// Read-only access to the latest known state of every node.
pub trait NodeStateSource: Send + Sync {
    /// Last observed state of a single node.
    fn node_state(&self, node_id: &str) -> Option<NodeState>;
    /// Snapshot of every known node. Order is unspecified.
    fn all_node_states(&self) -> Vec<NodeState>;
}

/// Which device variant is active.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeviceKind {
    /// Serial-backed hardware bridge.
    Serial,
    /// Software-only stand-in.
    Spoofer,
}

impl DeviceKind {
    /// Lowercase name used in status output.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Serial => "serial",
            Self::Spoofer => "spoofer",
        }
    }
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything the router needs from the active device.
pub trait Device: MessageHandler + NodeStateSource {
    /// The variant behind this handle.
    fn kind(&self) -> DeviceKind;
}
