//! Domain layer: pure business logic, types, and validation.
//!
//! This module has zero imports from `crate::infra`, `crate::commands`,
//! `crate::application`, `tokio`, `std::fs`, `std::process`, or `std::net`.
//! All functions are synchronous and take data in, returning data out.

pub mod certs;
pub mod command;
pub mod error;
pub mod host;
pub mod host_key;
pub mod paths;
pub mod progress;
pub mod proxy;
pub mod unit;

pub use certs::CertificateBundle;
pub use command::{Elevation, RemoteCommand};
pub use error::{ProvisionError, RemoteError};
pub use host::{RemoteIdentity, TargetHost};
pub use paths::ProvisionPaths;
pub use progress::{Step, StepStatus};
