//! Unattended multi-session ticket booking.
//!
//! Each [`session::Session`] pairs an observer, which infers the workflow
//! state from what the page shows, with an actor, which performs one step
//! per state entry. The [`orchestrator::FleetOrchestrator`] runs many
//! sessions from one shared booking plan.

pub mod captcha;
pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod logging;
pub mod orchestrator;
pub mod plan;
pub mod session;
pub mod sim;
pub mod state_machine;
pub mod status;
pub mod surface;
