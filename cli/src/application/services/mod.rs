//! Application services: use-case orchestration.
//!
//! Each module implements one provisioning phase by composing domain logic
//! with port trait calls; [`provision`] sequences them. Services import only
//! from `crate::domain` and `crate::application::ports`: never from
//! `crate::infra`, `crate::commands`, or `crate::output`.

pub mod binary;
pub mod certs;
pub mod identity;
pub mod network;
pub mod paths;
pub mod privilege;
pub mod provision;
pub mod proxy;
pub mod remote_file;
pub mod runtime;
pub mod service_unit;
