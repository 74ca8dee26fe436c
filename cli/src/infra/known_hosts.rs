//! File-backed host key store: `~/.hostforge/known_hosts`.
//!
//! One line per host: `<host_id> <algorithm> <base64>`.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::application::ports::HostKeyStore;

/// Manages the pinned host keys of provisioned hosts.
pub struct KnownHostsFile {
    path: PathBuf,
}

impl KnownHostsFile {
    /// Store at `~/.hostforge/known_hosts`.
    ///
    /// # Errors
    ///
    /// Returns an error if the home directory cannot be determined.
    pub fn new() -> Result<Self> {
        let home = dirs::home_dir()
            .ok_or_else(|| anyhow::anyhow!("cannot determine home directory"))?;
        Ok(Self::with_path(home.join(".hostforge").join("known_hosts")))
    }

    /// Store at an arbitrary path.
    #[must_use]
    pub fn with_path(path: PathBuf) -> Self {
        Self { path }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Removes the pin for `host_id`, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be rewritten.
    pub fn forget(&self, host_id: &str) -> Result<()> {
        let lines = self.read_lines()?;
        let kept: Vec<String> = lines
            .into_iter()
            .filter(|line| line_host(line) != Some(host_id))
            .collect();
        self.write_lines(&kept)
    }

    fn read_lines(&self) -> Result<Vec<String>> {
        match std::fs::read_to_string(&self.path) {
            Ok(content) => Ok(content
                .lines()
                .filter(|l| !l.trim().is_empty())
                .map(str::to_string)
                .collect()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e).with_context(|| format!("read {}", self.path.display())),
        }
    }

    fn write_lines(&self, lines: &[String]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create dir {}", parent.display()))?;
            set_permissions(parent, 0o700)?;
        }
        let mut content = lines.join("\n");
        if !content.is_empty() {
            content.push('\n');
        }
        std::fs::write(&self.path, content)
            .with_context(|| format!("write {}", self.path.display()))?;
        set_permissions(&self.path, 0o600)
    }
}

impl HostKeyStore for KnownHostsFile {
    fn load(&self, host_id: &str) -> Result<Option<String>> {
        Ok(self.read_lines()?.into_iter().find_map(|line| {
            let (id, key) = line.split_once(' ')?;
            (id == host_id).then(|| key.trim().to_string())
        }))
    }

    fn save(&self, host_id: &str, key_line: &str) -> Result<()> {
        anyhow::ensure!(
            !host_id.is_empty() && !host_id.contains(char::is_whitespace),
            "host id {host_id:?} cannot be stored"
        );
        let mut lines: Vec<String> = self
            .read_lines()?
            .into_iter()
            .filter(|line| line_host(line) != Some(host_id))
            .collect();
        lines.push(format!("{host_id} {}", key_line.trim()));
        self.write_lines(&lines)
    }
}

fn line_host(line: &str) -> Option<&str> {
    line.split_whitespace().next()
}

#[cfg(unix)]
fn set_permissions(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
        .with_context(|| format!("set permissions on {}", path.display()))
}

#[cfg(not(unix))]
fn set_permissions(_path: &Path, _mode: u32) -> Result<()> {
    Ok(())
}
