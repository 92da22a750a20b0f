//! # nodelight-core
//!
//! Wire frames and capability traits shared by the nodelight crates.
//!
//! - [`frames`]: the JSON frames exchanged with viewers and with the device
//! - [`traits`]: the narrow seams between the hub, the router and the device
//!   variants (`Broadcaster`, `MessageHandler`, `NodeStateSource`)
//! - [`errors`]: frame decode errors

#![deny(unsafe_code)]

pub mod errors;
pub mod frames;
pub mod traits;

pub use errors::FrameError;
pub use frames::{Frame, LightCommand, LightMode, NodeState, frame_type};
pub use traits::{Broadcaster, Device, DeviceKind, MessageHandler, NodeStateSource};
