//! # nodelight-server
//!
//! Viewer-facing side of the relay: the [`Hub`](hub::Hub) owning the client
//! registry, the [`MessageRouter`](router::MessageRouter) classifying inbound
//! frames, and the Axum server exposing the WebSocket endpoint, `/health`,
//! `/api/states` and the static viewer files.

#![deny(unsafe_code)]

pub mod client;
pub mod error;
pub mod health;
pub mod hub;
pub mod router;
pub mod server;
pub mod session;
pub mod shutdown;

pub use client::{Client, ClientId, ClientQueue};
pub use error::{EnqueueError, ServerError};
pub use hub::{Hub, HubHandle};
pub use router::{MessageRouter, Route};
pub use server::{AppState, NodelightServer};
pub use shutdown::ShutdownCoordinator;
