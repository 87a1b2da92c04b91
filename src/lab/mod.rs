//! Lab lifecycle
//!
//! Installing, running, stopping, removing and rebuilding manifest
//! applications, and reporting what the engine currently holds.

pub mod orchestrator;
pub mod status;

pub use orchestrator::{rebuildable, ApplicationRuntimeState, Orchestrator};
pub use status::{AppStatus, StatusReport};
