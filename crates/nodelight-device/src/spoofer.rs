//! Software-only device that answers on/off commands without hardware.

use std::sync::Arc;
use std::time::Instant;

use nodelight_core::{
    Broadcaster, Device, DeviceKind, Frame, LightCommand, LightMode, MessageHandler, NodeState,
    NodeStateSource,
};
use tracing::{debug, info, warn};

use crate::cache::SharedStateCache;

/// Stand-in for [`DeviceBridge`](crate::DeviceBridge). Always active.
///
/// `on` and `off` are applied synchronously and broadcast as an
/// `arduino_state` frame. `blink` and `pulse` are reported as unsupported and
/// leave the state table untouched.
pub struct Spoofer {
    broadcaster: Arc<dyn Broadcaster>,
    states: SharedStateCache,
}

impl Spoofer {
    /// Create a spoofer publishing through `broadcaster`.
    pub fn new(broadcaster: Arc<dyn Broadcaster>) -> Self {
        Self {
            broadcaster,
            states: SharedStateCache::new(),
        }
    }

    /// Log that the spoofer is taking commands.
    pub fn start(&self) {
        info!("device spoofer started");
    }

    /// Log that the spoofer is shutting down.
    pub fn stop(&self) {
        info!(nodes = self.states.len(), "device spoofer stopped");
    }

    fn apply(&self, command: &LightCommand) {
        match command.command {
            LightMode::On | LightMode::Off => {
                let state = NodeState::from(command);
                self.states.update(state.clone());
                match Frame::ArduinoState(state).encode() {
                    Ok(frame) => self.broadcaster.broadcast(frame),
                    Err(e) => warn!(node_id = %command.node_id, error = %e, "failed to encode state"),
                }
            }
            unsupported => {
                warn!(node_id = %command.node_id, command = %unsupported, "unsupported command");
            }
        }
    }
}

impl MessageHandler for Spoofer {
    fn handle_message(&self, frame: &[u8]) {
        let started = Instant::now();
        let command = match LightCommand::decode(frame) {
            Ok(command) => command,
            Err(e) => {
                warn!(error = %e, "dropping invalid light control frame");
                return;
            }
        };

        self.apply(&command);

        let elapsed_us = u64::try_from(started.elapsed().as_micros()).unwrap_or(u64::MAX);
        debug!(elapsed_us, "command processed");
        for state in self.states.snapshot() {
            debug!(
                node_id = %state.node_id,
                state = %state.state,
                color = state.color.as_deref().unwrap_or(""),
                "node state"
            );
        }
    }
}

impl NodeStateSource for Spoofer {
    fn node_state(&self, node_id: &str) -> Option<NodeState> {
        self.states.get(node_id)
    }

    fn all_node_states(&self) -> Vec<NodeState> {
        self.states.snapshot()
    }
}

impl Device for Spoofer {
    fn kind(&self) -> DeviceKind {
        DeviceKind::Spoofer
    }
}
