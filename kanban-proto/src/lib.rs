//! Shared wire definitions for the Kanban task API.
//!
//! Everything that crosses the network lives here: the task model and
//! its request payloads, realtime push events, list and error response
//! bodies, and the STOMP framing used by the push channel.

pub mod body;
pub mod event;
pub mod stomp;
pub mod task;
