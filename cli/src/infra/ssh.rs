//! SSH transport: `ssh2`-backed implementations of the remote execution ports.
//!
//! `libssh2` is blocking, so every call runs on the tokio blocking pool. The
//! session handles those tasks hold are clones sharing one connection and
//! one lock: a call in flight holds it until libssh2 returns. Every call is
//! therefore bounded by [`IO_DEADLINE`], and command output is read in
//! deadline-sized slices so an abandoned command lets go of the session.

use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::path::Path;
use std::process::Output;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use ssh2::{Channel, ErrorCode, FileStat, Session};

use crate::application::ports::{
    Connector, FileTransfer, HostKeyStore, RemoteSession, RemoteShell,
};
use crate::domain::error::ProvisionError;
use crate::domain::host::TargetHost;
use crate::domain::host_key::{HostKey, parse_host_key};

/// Deadline for the TCP dial, handshake and authentication.
pub const DIAL_TIMEOUT: Duration = Duration::from_secs(15);

/// Upper bound for any single libssh2 call on an established session.
pub const IO_DEADLINE: Duration = Duration::from_secs(15);

/// How long `close` waits for a polite disconnect before dropping the socket.
const CLOSE_GRACE: Duration = Duration::from_secs(5);

/// SFTP write chunk size.
pub const TRANSFER_CHUNK_SIZE: usize = 8 * 1024;

/// `LIBSSH2_ERROR_TIMEOUT`: a blocking call hit the session deadline.
const LIBSSH2_ERROR_TIMEOUT: i32 = -9;

/// Dials hosts over SSH, pinning or learning their host keys via `store`.
pub struct SshConnector<K: HostKeyStore> {
    store: K,
}

impl<K: HostKeyStore> SshConnector<K> {
    #[must_use]
    pub fn new(store: K) -> Self {
        Self { store }
    }

    /// The pinned key for `host`: the descriptor's own, else the store's.
    fn pinned_key(&self, host: &TargetHost) -> Option<String> {
        if host.host_key.is_some() {
            return host.host_key.clone();
        }
        match self.store.load(&host.host_id) {
            Ok(key) => key,
            Err(e) => {
                tracing::warn!(error = %e, host_id = host.host_id, "cannot read host key store");
                None
            }
        }
    }

    /// Trust on first use: enforce a parseable pinned key, otherwise accept
    /// the presented key and try to remember it.
    fn verify_host_key(
        &self,
        host: &TargetHost,
        pinned: Option<&str>,
        presented: &HostKey,
    ) -> Result<()> {
        let addr = host.socket_label();
        match pinned.map(parse_host_key) {
            Some(Ok(expected)) => {
                if expected.blob != presented.blob {
                    return Err(ProvisionError::HostKeyMismatch {
                        addr,
                        expected: expected.fingerprint(),
                        actual: presented.fingerprint(),
                    }
                    .into());
                }
                tracing::debug!(addr, fingerprint = presented.fingerprint(), "host key matches pin");
            }
            Some(Err(e)) => {
                tracing::warn!(error = %e, addr, "pinned host key is unusable; trusting on first use");
                self.remember(host, presented);
            }
            None => self.remember(host, presented),
        }
        Ok(())
    }

    fn remember(&self, host: &TargetHost, presented: &HostKey) {
        tracing::info!(
            addr = host.socket_label(),
            fingerprint = presented.fingerprint(),
            "trusting host key on first use"
        );
        if let Err(e) = self.store.save(&host.host_id, &presented.to_openssh()) {
            tracing::warn!(error = %e, host_id = host.host_id, "failed to persist host key");
        }
    }
}

impl<K: HostKeyStore> Connector for SshConnector<K> {
    type Session = SshSession;

    async fn connect(&self, host: &TargetHost) -> Result<SshSession> {
        let pinned = self.pinned_key(host);
        let handshake_host = host.clone();
        let (session, tcp, presented) =
            tokio::task::spawn_blocking(move || handshake(&handshake_host))
                .await
                .context("ssh handshake task panicked")??;

        if let Err(e) = self.verify_host_key(host, pinned.as_deref(), &presented) {
            let _ = session.disconnect(None, "host key rejected", None);
            return Err(e);
        }

        let auth_host = host.clone();
        let session = tokio::task::spawn_blocking(move || {
            authenticate(&session, &auth_host).map(|()| session)
        })
        .await
        .context("ssh authentication task panicked")??;

        Ok(SshSession { session, tcp })
    }
}

fn connection_error(host: &TargetHost, reason: impl std::fmt::Display) -> anyhow::Error {
    ProvisionError::Connection {
        addr: host.socket_label(),
        reason: reason.to_string(),
    }
    .into()
}

fn handshake(host: &TargetHost) -> Result<(Session, TcpStream, HostKey)> {
    let addr = (host.address.as_str(), host.port)
        .to_socket_addrs()
        .map_err(|e| connection_error(host, e))?
        .next()
        .ok_or_else(|| connection_error(host, "address did not resolve"))?;
    let tcp = TcpStream::connect_timeout(&addr, DIAL_TIMEOUT).map_err(|e| connection_error(host, e))?;
    let control = tcp.try_clone().map_err(|e| connection_error(host, e))?;

    let mut session = Session::new().map_err(|e| connection_error(host, e))?;
    session.set_timeout(millis(DIAL_TIMEOUT));
    session.set_tcp_stream(tcp);
    session.handshake().map_err(|e| connection_error(host, e))?;

    let (blob, _) = session
        .host_key()
        .ok_or_else(|| connection_error(host, "server presented no host key"))?;
    let presented = HostKey::from_blob(blob)?;
    Ok((session, control, presented))
}

fn authenticate(session: &Session, host: &TargetHost) -> Result<()> {
    if let Some(key) = host.private_key.as_deref() {
        if let Err(e) = session.userauth_pubkey_memory(&host.username, None, key, None) {
            tracing::debug!(error = %e, "public key authentication rejected");
        }
    }
    if !session.authenticated() {
        if let Some(password) = host.password.as_deref() {
            if let Err(e) = session.userauth_password(&host.username, password) {
                tracing::debug!(error = %e, "password authentication rejected");
            }
        }
    }
    if !session.authenticated() {
        return Err(connection_error(host, format!("authentication failed for {}", host.username)));
    }
    // Per call, not per command: long commands poll through expired deadlines.
    session.set_timeout(millis(IO_DEADLINE));
    Ok(())
}

#[allow(clippy::cast_possible_truncation)]
fn millis(d: Duration) -> u32 {
    d.as_millis().min(u128::from(u32::MAX)) as u32
}

/// An authenticated SSH connection.
pub struct SshSession {
    session: Session,
    /// Second handle on the transport socket; shutting it down fails any
    /// libssh2 call still blocked on it.
    tcp: TcpStream,
}

impl SshSession {
    async fn run(&self, command: &str, input: Option<Vec<u8>>) -> Result<Output> {
        let session = self.session.clone();
        let command = command.to_string();
        let guard = AbandonOnDrop::new();
        let abandoned = guard.flag();
        let output = tokio::task::spawn_blocking(move || {
            exec_blocking(&session, &command, input.as_deref(), &abandoned)
        })
        .await
        .context("ssh exec task panicked")?;
        drop(guard);
        output
    }
}

/// Raises its flag when dropped, which includes the awaiting future being
/// dropped by a caller's timeout.
struct AbandonOnDrop(Arc<AtomicBool>);

impl AbandonOnDrop {
    fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    fn flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.0)
    }
}

impl Drop for AbandonOnDrop {
    fn drop(&mut self) {
        self.0.store(true, Ordering::Relaxed);
    }
}

fn exec_blocking(
    session: &Session,
    command: &str,
    input: Option<&[u8]>,
    abandoned: &AtomicBool,
) -> Result<Output> {
    let mut channel = session.channel_session().context("opening ssh channel")?;
    channel.exec(command).context("starting remote command")?;
    if let Some(input) = input {
        channel.write_all(input).context("writing remote stdin")?;
    }
    channel.send_eof().context("closing remote stdin")?;

    let collected = drain(&mut channel, abandoned)
        .context("reading remote stdout")
        .and_then(|stdout| {
            let stderr = drain(&mut channel.stderr(), abandoned).context("reading remote stderr")?;
            wait_closed(&mut channel, abandoned)?;
            Ok((stdout, stderr))
        });
    let (stdout, stderr) = match collected {
        Ok(streams) => streams,
        Err(e) => {
            if abandoned.load(Ordering::Relaxed) {
                tracing::debug!(command, "remote command abandoned by caller");
            }
            let _ = channel.close();
            return Err(e);
        }
    };
    let code = channel.exit_status().context("reading remote exit status")?;

    Ok(Output {
        status: exit_status(code),
        stdout,
        stderr,
    })
}

/// Read `reader` to EOF. An expired I/O deadline only means no output yet;
/// reading stops early once `abandoned` is raised.
fn drain(reader: &mut impl Read, abandoned: &AtomicBool) -> io::Result<Vec<u8>> {
    let mut out = Vec::new();
    let mut buf = [0u8; TRANSFER_CHUNK_SIZE];
    loop {
        if abandoned.load(Ordering::Relaxed) {
            return Err(io::Error::other("remote command abandoned"));
        }
        match reader.read(&mut buf) {
            Ok(0) => return Ok(out),
            Ok(n) => out.extend_from_slice(&buf[..n]),
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
                ) => {}
            Err(e) => return Err(e),
        }
    }
}

fn wait_closed(channel: &mut Channel, abandoned: &AtomicBool) -> Result<()> {
    loop {
        match channel.wait_close() {
            Ok(()) => return Ok(()),
            Err(e)
                if e.code() == ErrorCode::Session(LIBSSH2_ERROR_TIMEOUT)
                    && !abandoned.load(Ordering::Relaxed) => {}
            Err(e) => return Err(e).context("closing ssh channel"),
        }
    }
}

#[cfg(unix)]
fn exit_status(code: i32) -> std::process::ExitStatus {
    use std::os::unix::process::ExitStatusExt;
    std::process::ExitStatus::from_raw(code << 8)
}

#[cfg(windows)]
fn exit_status(code: i32) -> std::process::ExitStatus {
    use std::os::windows::process::ExitStatusExt;
    #[allow(clippy::cast_sign_loss)]
    std::process::ExitStatus::from_raw(code as u32)
}

impl RemoteShell for SshSession {
    async fn exec(&self, command: &str) -> Result<Output> {
        self.run(command, None).await
    }

    async fn exec_with_stdin(&self, command: &str, input: &[u8]) -> Result<Output> {
        self.run(command, Some(input.to_vec())).await
    }
}

impl RemoteSession for SshSession {
    type Transfer = SftpTransfer;

    async fn open_file_transfer(&self) -> Result<SftpTransfer> {
        let session = self.session.clone();
        let sftp = tokio::task::spawn_blocking(move || session.sftp())
            .await
            .context("sftp task panicked")?
            .context("opening sftp subsystem")?;
        Ok(SftpTransfer {
            sftp: Arc::new(Mutex::new(sftp)),
        })
    }

    async fn close(&self) {
        let session = self.session.clone();
        let disconnect =
            tokio::task::spawn_blocking(move || session.disconnect(None, "provisioning finished", None));
        match tokio::time::timeout(CLOSE_GRACE, disconnect).await {
            Ok(Ok(Err(e))) => tracing::debug!(error = %e, "ssh disconnect"),
            Err(_) => tracing::debug!("ssh disconnect still blocked; dropping the connection"),
            _ => {}
        }
        if let Err(e) = self.tcp.shutdown(Shutdown::Both) {
            tracing::debug!(error = %e, "ssh socket shutdown");
        }
    }
}

/// An SFTP sub-session on an [`SshSession`].
pub struct SftpTransfer {
    sftp: Arc<Mutex<ssh2::Sftp>>,
}

impl FileTransfer for SftpTransfer {
    async fn write_file(&self, path: &str, contents: &[u8], mode: i32) -> Result<()> {
        let sftp = Arc::clone(&self.sftp);
        let path = path.to_string();
        let contents = contents.to_vec();
        tokio::task::spawn_blocking(move || {
            let sftp = sftp
                .lock()
                .map_err(|_| anyhow::anyhow!("sftp handle poisoned"))?;
            write_blocking(&sftp, Path::new(&path), &contents, mode)
                .with_context(|| format!("sftp write {path}"))
        })
        .await
        .context("sftp task panicked")?
    }
}

fn write_blocking(sftp: &ssh2::Sftp, path: &Path, contents: &[u8], mode: i32) -> Result<()> {
    let mut file = sftp.create(path)?;
    for chunk in contents.chunks(TRANSFER_CHUNK_SIZE) {
        file.write_all(chunk)?;
    }
    file.flush()?;
    drop(file);

    let perm = u32::try_from(mode).context("negative file mode")?;
    sftp.setstat(
        path,
        FileStat {
            size: None,
            uid: None,
            gid: None,
            perm: Some(perm),
            atime: None,
            mtime: None,
        },
    )?;
    Ok(())
}
