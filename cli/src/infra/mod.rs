//! Infrastructure layer: concrete implementations of application port traits.
//!
//! This module contains all I/O-performing code: the SSH transport, the
//! host key file, and the local certificate issuer.
//!
//! Imports from `crate::domain` and `crate::application::ports` are allowed.
//! Imports from `crate::commands` or `crate::output` are forbidden.

pub mod ca;
pub mod command_runner;
pub mod known_hosts;
pub mod ssh;
