//! Reverse-proxy desired state and static configuration rendering.
//!
//! Pure functions only: the configuration document is produced here and
//! written to the host by the proxy provisioner.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use anyhow::{Context, Result};
use regex::Regex;
use serde::Serialize;

use crate::domain::error::ProvisionError;

/// Name of the managed container network shared by the proxy and apps.
pub const NETWORK_NAME: &str = "hostforge";
/// Name of the proxy container.
pub const PROXY_CONTAINER: &str = "traefik";
/// Pinned proxy image. Any other running image is treated as drift.
pub const PROXY_IMAGE: &str = "traefik:v3.1";
/// Static configuration path on the host.
pub const PROXY_CONFIG_PATH: &str = "/etc/traefik/traefik.yml";
/// Directory holding the rendered configuration.
pub const PROXY_CONFIG_DIR: &str = "/etc/traefik";
/// Persistent ACME certificate storage on the host.
pub const ACME_STORAGE_DIR: &str = "/etc/traefik/acme";
/// Container runtime socket mounted read-only into the proxy.
pub const DOCKER_SOCKET: &str = "/var/run/docker.sock";
/// Name of the ACME certificate resolver.
pub const CERT_RESOLVER: &str = "letsencrypt";

const ACME_MOUNT: &str = "/acme";

/// Published ports: `(entry point, port)`.
pub const ENTRY_POINTS: [(&str, u16); 4] = [
    ("web", 80),
    ("websecure", 443),
    ("grpc", 50051),
    ("dashboard", 8081),
];

/// Conservative RFC 5322-like address check: dot-atom local part, and a
/// domain of at least two DNS labels.
static ACME_EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    // Safety: this is a compile-time constant pattern and cannot fail.
    #[allow(clippy::expect_used)]
    Regex::new(
        r"^[A-Za-z0-9!#$%&'*+/=?^_`{|}~-]+(\.[A-Za-z0-9!#$%&'*+/=?^_`{|}~-]+)*@[A-Za-z0-9]([A-Za-z0-9-]{0,61}[A-Za-z0-9])?(\.[A-Za-z0-9]([A-Za-z0-9-]{0,61}[A-Za-z0-9])?)+$",
    )
    .expect("valid regex")
});

/// Validate an ACME contact email.
///
/// # Errors
///
/// Returns [`ProvisionError::InvalidEmail`] if the address is malformed.
pub fn validate_acme_email(email: &str) -> Result<(), ProvisionError> {
    if email.len() <= 254 && ACME_EMAIL_RE.is_match(email) {
        Ok(())
    } else {
        Err(ProvisionError::InvalidEmail(email.to_string()))
    }
}

// ── Static configuration document ─────────────────────────────────────────────

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StaticConfig {
    entry_points: BTreeMap<&'static str, EntryPoint>,
    api: Api,
    providers: Providers,
    certificates_resolvers: BTreeMap<&'static str, Resolver>,
    log: Log,
}

#[derive(Serialize)]
struct EntryPoint {
    address: String,
}

#[derive(Serialize)]
struct Api {
    dashboard: bool,
    insecure: bool,
}

#[derive(Serialize)]
struct Providers {
    docker: DockerProvider,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DockerProvider {
    endpoint: String,
    exposed_by_default: bool,
    network: &'static str,
}

#[derive(Serialize)]
struct Resolver {
    acme: Acme,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Acme {
    email: String,
    storage: String,
    http_challenge: HttpChallenge,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HttpChallenge {
    entry_point: &'static str,
}

#[derive(Serialize)]
struct Log {
    level: &'static str,
}

/// Render the proxy static configuration for the given ACME contact.
///
/// Validation happens first: no document is produced for a malformed email.
///
/// # Errors
///
/// Returns [`ProvisionError::InvalidEmail`] for a malformed contact, or a
/// serialization error (not expected for these fixed types).
pub fn build_traefik_config(email: &str) -> Result<String> {
    validate_acme_email(email)?;

    let config = StaticConfig {
        entry_points: ENTRY_POINTS
            .iter()
            .map(|&(name, port)| {
                (
                    name,
                    EntryPoint {
                        address: format!(":{port}"),
                    },
                )
            })
            .collect(),
        api: Api {
            dashboard: true,
            insecure: true,
        },
        providers: Providers {
            docker: DockerProvider {
                endpoint: format!("unix://{DOCKER_SOCKET}"),
                exposed_by_default: false,
                network: NETWORK_NAME,
            },
        },
        certificates_resolvers: BTreeMap::from([(
            CERT_RESOLVER,
            Resolver {
                acme: Acme {
                    email: email.to_string(),
                    storage: format!("{ACME_MOUNT}/acme.json"),
                    http_challenge: HttpChallenge { entry_point: "web" },
                },
            },
        )]),
        log: Log { level: "INFO" },
    };

    serde_yaml::to_string(&config).context("serializing proxy configuration")
}

// ── Container desired state ───────────────────────────────────────────────────

/// A bind mount into the proxy container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mount {
    pub host: String,
    pub container: String,
    pub read_only: bool,
}

impl Mount {
    fn to_flag(&self) -> String {
        if self.read_only {
            format!("{}:{}:ro", self.host, self.container)
        } else {
            format!("{}:{}", self.host, self.container)
        }
    }
}

/// Desired state of the proxy container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxySpec {
    pub container: &'static str,
    pub image: &'static str,
    pub network: &'static str,
    pub ports: Vec<u16>,
    pub mounts: Vec<Mount>,
}

impl Default for ProxySpec {
    fn default() -> Self {
        Self {
            container: PROXY_CONTAINER,
            image: PROXY_IMAGE,
            network: NETWORK_NAME,
            ports: ENTRY_POINTS.iter().map(|&(_, port)| port).collect(),
            mounts: vec![
                Mount {
                    host: DOCKER_SOCKET.to_string(),
                    container: DOCKER_SOCKET.to_string(),
                    read_only: true,
                },
                Mount {
                    host: PROXY_CONFIG_PATH.to_string(),
                    container: PROXY_CONFIG_PATH.to_string(),
                    read_only: true,
                },
                Mount {
                    host: ACME_STORAGE_DIR.to_string(),
                    container: ACME_MOUNT.to_string(),
                    read_only: false,
                },
            ],
        }
    }
}

impl ProxySpec {
    /// Arguments following `docker` that start the container.
    #[must_use]
    pub fn run_args(&self) -> Vec<String> {
        let mut args: Vec<String> = [
            "run",
            "-d",
            "--name",
            self.container,
            "--restart",
            "unless-stopped",
            "--network",
            self.network,
        ]
        .iter()
        .map(ToString::to_string)
        .collect();
        for port in &self.ports {
            args.push("-p".to_string());
            args.push(format!("{port}:{port}"));
        }
        for mount in &self.mounts {
            args.push("-v".to_string());
            args.push(mount.to_flag());
        }
        args.push(self.image.to_string());
        args
    }
}
