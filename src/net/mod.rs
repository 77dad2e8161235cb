//! Network layer: the chatbot backend's HTTP API and the support WebSocket.
//!
//! SYSTEM CONTEXT
//! ==============
//! `api` defines the `Backend` trait every state model and the runtime call
//! through, plus its `reqwest` implementation. `support_channel` owns the
//! duplex connection used during a human-support handoff and turns its
//! frames into controller events.

pub mod api;
pub mod support_channel;

pub use api::{Backend, HttpBackend};
