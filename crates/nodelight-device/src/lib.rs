//! # nodelight-device
//!
//! The device side of the relay.
//!
//! - [`DeviceBridge`]: owns the serial connection, runs the read loop, encodes
//!   light commands and keeps the [`NodeStateCache`] current
//! - [`Spoofer`]: software-only stand-in answering on/off commands without hardware
//! - [`SharedStateCache`]: the latest known state per node, written by one
//!   producer and read by many
//!
//! Both variants publish through a [`Broadcaster`](nodelight_core::Broadcaster)
//! and never see the hub itself.

#![deny(unsafe_code)]

pub mod backoff;
pub mod bridge;
pub mod cache;
pub mod errors;
pub mod framing;
pub mod spoofer;

pub use backoff::Backoff;
pub use bridge::{BridgeConfig, DeviceBridge, DeviceReader, DeviceWriter};
pub use cache::{NodeStateCache, SharedStateCache};
pub use errors::DeviceError;
pub use spoofer::Spoofer;
