//! Client state models.
//!
//! DESIGN
//! ======
//! State is split by concern so each piece can be tested alone: `session`
//! owns the lifecycle and bootstrap, `transcript` the message list,
//! `support` the human-support request, and `selector` the chatbot picker.
//! The controller composes them; none of them own I/O handles.

pub mod selector;
pub mod session;
pub mod support;
pub mod transcript;
