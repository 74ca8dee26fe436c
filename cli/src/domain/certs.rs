//! Agent certificate bundle as produced by the external certificate authority.

/// CA certificate, leaf certificate and leaf key, all PEM-encoded.
///
/// Issued fresh on every run and never cached.
#[derive(Clone, PartialEq, Eq)]
pub struct CertificateBundle {
    pub ca_pem: Vec<u8>,
    pub cert_pem: Vec<u8>,
    pub key_pem: Vec<u8>,
}

impl std::fmt::Debug for CertificateBundle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CertificateBundle")
            .field("ca_pem", &format_args!("{} bytes", self.ca_pem.len()))
            .field("cert_pem", &format_args!("{} bytes", self.cert_pem.len()))
            .field("key_pem", &"<redacted>")
            .finish()
    }
}

impl CertificateBundle {
    /// Reject bundles with a missing or non-PEM part.
    ///
    /// # Errors
    ///
    /// Returns an error naming the first part that is not PEM-encoded.
    pub fn validate(&self) -> anyhow::Result<()> {
        for (name, pem) in [
            ("CA certificate", &self.ca_pem),
            ("certificate", &self.cert_pem),
            ("private key", &self.key_pem),
        ] {
            anyhow::ensure!(
                pem.windows(11).any(|w| w == b"-----BEGIN "),
                "{name} in certificate bundle is not PEM-encoded"
            );
        }
        Ok(())
    }
}
