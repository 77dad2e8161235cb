//! Client-side persistence helpers.
//!
//! SYSTEM CONTEXT
//! ==============
//! `storage` keeps the "selected chatbot" record between runs and
//! `share_url` reads and writes the `chatbot`/`session` query parameters that
//! make a session shareable.

pub mod share_url;
pub mod storage;
