//! SSH host public keys: parsing, wire-format decoding, fingerprints.

use anyhow::{Context, Result};
use base64::Engine as _;
use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD};
use sha2::{Digest, Sha256};

/// A host public key in SSH wire format together with its algorithm name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostKey {
    pub algorithm: String,
    pub blob: Vec<u8>,
}

impl HostKey {
    /// Build from the raw wire-format blob presented during key exchange.
    ///
    /// # Errors
    ///
    /// Returns an error if the blob does not start with a length-prefixed
    /// algorithm name.
    pub fn from_blob(blob: &[u8]) -> Result<Self> {
        let algorithm = blob_algorithm(blob)?;
        Ok(Self {
            algorithm,
            blob: blob.to_vec(),
        })
    }

    /// `<algorithm> <base64>`, the OpenSSH public key line format.
    #[must_use]
    pub fn to_openssh(&self) -> String {
        format!("{} {}", self.algorithm, STANDARD.encode(&self.blob))
    }

    /// `SHA256:<unpadded base64>`, as printed by `ssh-keygen -l`.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        let digest = Sha256::digest(&self.blob);
        format!("SHA256:{}", STANDARD_NO_PAD.encode(digest))
    }
}

/// Parse an OpenSSH public key line (`<algorithm> <base64> [comment]`).
///
/// A leading host-pattern column (as in `known_hosts`) is tolerated.
///
/// # Errors
///
/// Returns an error if no base64 key material is found, it does not decode,
/// or the embedded algorithm disagrees with the declared one.
pub fn parse_host_key(line: &str) -> Result<HostKey> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    let start = fields
        .iter()
        .position(|f| is_algorithm(f))
        .ok_or_else(|| anyhow::anyhow!("no key algorithm in host key {line:?}"))?;
    let declared = fields[start];
    let material = fields
        .get(start + 1)
        .ok_or_else(|| anyhow::anyhow!("host key has no key material"))?;
    let blob = STANDARD
        .decode(material)
        .context("host key material is not valid base64")?;
    let key = HostKey::from_blob(&blob)?;
    anyhow::ensure!(
        key.algorithm == declared,
        "host key declares {declared} but contains {}",
        key.algorithm
    );
    Ok(key)
}

fn is_algorithm(field: &str) -> bool {
    field.starts_with("ssh-") || field.starts_with("ecdsa-sha2-") || field.starts_with("sk-")
}

fn blob_algorithm(blob: &[u8]) -> Result<String> {
    let len_bytes: [u8; 4] = blob
        .get(..4)
        .and_then(|b| b.try_into().ok())
        .ok_or_else(|| anyhow::anyhow!("host key blob is truncated"))?;
    let len = u32::from_be_bytes(len_bytes) as usize;
    let name = blob
        .get(4..4 + len)
        .ok_or_else(|| anyhow::anyhow!("host key blob is truncated"))?;
    let name = std::str::from_utf8(name).context("host key algorithm is not UTF-8")?;
    anyhow::ensure!(is_algorithm(name), "unknown host key algorithm {name:?}");
    Ok(name.to_string())
}
