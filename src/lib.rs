//! Authorized-target assessment engine.
//!
//! - [`target`]: the registry of authorized targets and the self-target gate
//! - [`terminal`]: cross-platform command execution and session history
//! - [`forge`]: phase-driven assessment sessions, findings and reports
//! - [`config`], [`logging`], [`errors`]: the ambient plumbing around them

pub mod config;
pub mod errors;
pub mod forge;
pub mod logging;
pub mod target;
pub mod terminal;
pub mod ui;
