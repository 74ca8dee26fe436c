//! Pipeline step identifiers and progress status.

use serde::Serialize;

/// One phase of the provisioning or deprovisioning pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Step {
    Connect,
    Identity,
    Runtime,
    Network,
    Proxy,
    FileTransfer,
    Paths,
    Certificates,
    Binary,
    Service,
    StopService,
    RemoveUnit,
    RemoveInstall,
}

impl Step {
    /// Stable identifier emitted in progress events.
    #[must_use]
    pub fn id(self) -> &'static str {
        match self {
            Self::Connect => "connect",
            Self::Identity => "identity",
            Self::Runtime => "runtime",
            Self::Network => "network",
            Self::Proxy => "proxy",
            Self::FileTransfer => "file-transfer",
            Self::Paths => "paths",
            Self::Certificates => "certificates",
            Self::Binary => "binary",
            Self::Service => "service",
            Self::StopService => "stop-service",
            Self::RemoveUnit => "remove-unit",
            Self::RemoveInstall => "remove-install",
        }
    }
}

/// Status carried by a step transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Running,
    Ok,
    Failed,
}
