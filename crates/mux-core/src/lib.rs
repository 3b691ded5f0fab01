//! # mux-core
//!
//! Foundation types for the mux streaming runtime.
//!
//! This crate provides the shared vocabulary the other mux crates depend on:
//!
//! - **Branded IDs**: [`SessionId`], [`StreamId`] newtypes for type safety
//! - **Stream events**: [`StreamEvent`] and its kind/status/mode enums plus
//!   the fixed [`EventMeta`] sequencing struct
//! - **Errors**: [`AgentError`] via `thiserror`, stable [`ErrorCode`] wire
//!   codes, and the total [`classify`] function mapping failures to
//!   transience-annotated error info
//! - **Logging**: tracing subscriber setup

#![deny(unsafe_code)]

pub mod classify;
pub mod errors;
pub mod events;
pub mod ids;
pub mod logging;

pub use classify::{ErrorInfo, classify};
pub use errors::{AgentError, ErrorCode};
pub use events::{
    EventMeta, EventStatus, ORCHESTRATOR_AGENT, StreamEvent, StreamEventKind, StreamMode,
};
pub use ids::{SessionId, StreamId};
