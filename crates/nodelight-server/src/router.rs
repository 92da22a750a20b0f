//! Per-frame dispatch of viewer traffic.

use std::sync::Arc;

use bytes::Bytes;
use nodelight_core::{Broadcaster, Device, Frame, LightCommand, frame_type};
use tracing::{debug, warn};

use crate::client::Client;

/// Which path an inbound frame took. Exactly one per frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Route {
    /// `request_states`: answered directly to the sender.
    StateQuery,
    /// `light_control`: handed to the device.
    DeviceCommand,
    /// Any other typed frame: broadcast unchanged.
    Relay,
    /// Not a JSON object with a string `type`, or a bad command body.
    Dropped,
}

/// Classifies viewer frames and sends each to the hub, the device or back to
/// the sender.
pub struct MessageRouter {
    hub: Arc<dyn Broadcaster>,
    device: Option<Arc<dyn Device>>,
}

impl MessageRouter {
    /// Create a router. `device` is `None` when no bridge is attached.
    pub fn new(hub: Arc<dyn Broadcaster>, device: Option<Arc<dyn Device>>) -> Self {
        Self { hub, device }
    }

    /// The attached device, if any.
    pub fn device(&self) -> Option<&Arc<dyn Device>> {
        self.device.as_ref()
    }

    /// Route one frame received from `client`.
    pub fn route(&self, client: &Client, frame: Bytes) -> Route {
        let kind = match Frame::peek_type(&frame) {
            Ok(kind) => kind,
            Err(e) => {
                debug!(client_id = %client.id(), error = %e, "dropping malformed frame");
                return Route::Dropped;
            }
        };

        match kind.as_str() {
            frame_type::REQUEST_STATES => {
                self.reply_states(client);
                Route::StateQuery
            }
            frame_type::LIGHT_CONTROL => {
                if let Err(e) = LightCommand::decode(&frame) {
                    warn!(client_id = %client.id(), error = %e, "dropping invalid light control frame");
                    return Route::Dropped;
                }
                match &self.device {
                    Some(device) => device.handle_message(&frame),
                    None => debug!(client_id = %client.id(), "no device attached, command ignored"),
                }
                Route::DeviceCommand
            }
            _ => {
                self.hub.broadcast(frame);
                Route::Relay
            }
        }
    }

    fn reply_states(&self, client: &Client) {
        let Some(device) = &self.device else {
            debug!(client_id = %client.id(), "no device attached, state query ignored");
            return;
        };
        let reply = Frame::AllStates {
            states: device.all_node_states(),
        };
        let encoded = match reply.encode() {
            Ok(encoded) => encoded,
            Err(e) => {
                warn!(error = %e, "failed to encode state snapshot");
                return;
            }
        };
        if let Err(e) = client.try_enqueue(encoded) {
            warn!(client_id = %client.id(), error = %e, "dropping state reply");
        }
    }
}
