//! Lifecycle management for the Beszel monitoring agent on Windows.
//!
//! The setup wizard installs, updates and removes the agent service; the
//! control panel watches it and performs day-to-day service actions. Both
//! front ends share the probe, release feed, version reconciler and
//! orchestrator defined here.

pub mod agent;
pub mod error;
pub mod install;
pub mod release;
pub mod system;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;
pub mod ui;
pub mod utils;
pub mod version;

pub use error::{ManagerError, Result};
