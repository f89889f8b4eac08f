//! Installer for platform applications.
//!
//! [`install`] decides whether an application is already runnable and
//! launches it, or drives a worker through bootstrapping the platform and
//! downloading the application while a presentation surface shows progress.

pub mod error;
pub mod ipc;
pub mod logging;
pub mod models;
pub mod orchestrator;
pub mod platform;
pub mod preflight;
pub mod progress;
pub mod worker;

#[cfg(test)]
pub(crate) mod test_support;

pub use error::InstallError;
pub use orchestrator::{Dependencies, InstallOutcome, Orchestrator, Surface, install};
pub use preflight::{PreflightOutcome, preflight};
