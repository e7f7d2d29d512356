//! Launching a single testbed virtual machine through libvirt.
//!
//! The flow is linear: sanitize the environment, find the source tree, clear
//! out any stale domain, stage firmware and disk copies, decide on TPM
//! emulation, define and start the domain, then wait to be told to stop it.
//! See [`testbed::Testbed::run`].

pub mod env;
pub mod error;
pub mod layout;
pub mod libvirt;
pub mod repo;
pub mod template;
pub mod testbed;

pub use error::{ErrorKind, LaunchError};
