//! Stream orchestration and per-session stream management.
//!
//! This crate turns agent fragment streams into the canonical event
//! sequence clients consume:
//!
//! - [`SingleAgentOrchestrator`] adapts one agent's output into a
//!   Start / Delta / terminal sequence.
//! - [`ConcurrentOrchestrator`] fans one turn out to several agents and
//!   merges their outputs in arrival order under a single global sequence.
//! - [`StreamManager`] enforces single-flight per session, routes events
//!   to an [`EventSink`], and handles cancellation and disconnects.
//!
//! Settings for the demo agent roster load through [`settings`].

#![deny(unsafe_code)]

pub mod errors;
pub mod manager;
pub mod orchestrate;
pub mod settings;
pub mod sink;

pub use errors::RuntimeError;
pub use manager::StreamManager;
pub use orchestrate::{
    ConcurrentOrchestrator, EventStream, Orchestrator, SingleAgentOrchestrator, from_settings,
};
pub use settings::{
    EchoSettings, FetchSettings, ModelSettings, MuxSettings, OrchestrationMode, SettingsError,
    load_settings, load_settings_from_path,
};
pub use sink::{ChannelSink, EventSink};
