//! TLS adapter: a drop-in transport parallel to the reactor's plaintext
//! slot handling, driving a `rustls` session through the same read/write
//! readiness the reactor already computes for a socket.
//!
//! Built on `rustls`: TLS 1.2 is the adapter's effective floor (the
//! closest faithful mapping of "sane minimum" onto a library that
//! dropped TLS 1.0/1.1 support), and the default trust store comes from
//! `rustls-native-certs` rather than a vendored bundle. The outbound
//! buffer a connection needs is realized as `rustls`'s own internal
//! ciphertext buffer (fed through `writer()`/drained through
//! `write_tls`) rather than a second buffer layered on top of it —
//! `rustls` already does exactly the bookkeeping needed here.

use std::{
    fs::File,
    io::{self, Read, Write},
    sync::{Arc, OnceLock},
};

use rustls::{ClientConfig, ClientConnection, RootCertStore, ServerConfig, ServerConnection};
use rustls_pki_types::ServerName;

use crate::errors::ErrorKind;

/// Shared, lazily-built client config trusting the OS root store.
/// One config is reused by every outbound TLS connection;
/// `rustls::ClientConfig` is immutable and `Arc`-shared by design.
pub(crate) fn default_client_config() -> Arc<ClientConfig> {
    static CONFIG: OnceLock<Arc<ClientConfig>> = OnceLock::new();
    CONFIG
        .get_or_init(|| {
            let mut roots = RootCertStore::empty();
            if let Ok(native) = rustls_native_certs::load_native_certs().certs.into_iter().try_fold(
                RootCertStore::empty(),
                |mut acc, cert| -> Result<RootCertStore, ()> {
                    let _ = acc.add(cert);
                    Ok(acc)
                },
            ) {
                roots = native;
            }
            let config = ClientConfig::builder()
                .with_root_certificates(roots)
                .with_no_client_auth();
            Arc::new(config)
        })
        .clone()
}

/// Pending operation a [`TlsSlot`] is in the middle of.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Pending {
    Idle,
    Connecting,
    Transferring,
}

enum Session {
    Server(ServerConnection),
    Client(ClientConnection),
}

impl Session {
    fn wants_read(&self) -> bool {
        match self {
            Session::Server(s) => s.wants_read(),
            Session::Client(s) => s.wants_read(),
        }
    }

    fn wants_write(&self) -> bool {
        match self {
            Session::Server(s) => s.wants_write(),
            Session::Client(s) => s.wants_write(),
        }
    }

    fn is_handshaking(&self) -> bool {
        match self {
            Session::Server(s) => s.is_handshaking(),
            Session::Client(s) => s.is_handshaking(),
        }
    }

    fn read_tls(&mut self, rd: &mut dyn Read) -> io::Result<usize> {
        match self {
            Session::Server(s) => s.read_tls(rd),
            Session::Client(s) => s.read_tls(rd),
        }
    }

    fn write_tls(&mut self, wr: &mut dyn Write) -> io::Result<usize> {
        match self {
            Session::Server(s) => s.write_tls(wr),
            Session::Client(s) => s.write_tls(wr),
        }
    }

    fn process_new_packets(&mut self) -> Result<(), rustls::Error> {
        match self {
            Session::Server(s) => s.process_new_packets().map(|_| ()),
            Session::Client(s) => s.process_new_packets().map(|_| ()),
        }
    }

    fn write_plain(&mut self, data: &[u8]) -> io::Result<usize> {
        match self {
            Session::Server(s) => s.writer().write(data),
            Session::Client(s) => s.writer().write(data),
        }
    }

    /// Drains whatever decrypted application data is currently buffered
    /// into `out`, appending. Never blocks: `rustls::Reader` surfaces
    /// "nothing more right now" as `WouldBlock`, which this treats as
    /// "done for this tick" rather than an error.
    fn drain_plaintext(&mut self, out: &mut Vec<u8>) -> io::Result<usize> {
        fn drain(mut r: impl Read, out: &mut Vec<u8>) -> io::Result<usize> {
            let mut chunk = [0u8; 4096];
            let mut total = 0;
            loop {
                match r.read(&mut chunk) {
                    Ok(0) => break,
                    Ok(n) => {
                        out.extend_from_slice(&chunk[..n]);
                        total += n;
                    }
                    Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                    Err(e) => return Err(e),
                }
            }
            Ok(total)
        }

        match self {
            Session::Server(s) => drain(s.reader(), out),
            Session::Client(s) => drain(s.reader(), out),
        }
    }
}

/// Per-slot TLS state, owned by the reactor alongside the plaintext
/// slot it parallels.
pub(crate) struct TlsSlot {
    session: Session,
    pending: Pending,
    transfer: Option<(File, u64)>,
}

/// Mode hint returned by [`TlsSlot::attach_client`]/[`TlsSlot::ready`]:
/// negative means failed, 0 means wait for read, 2 means wait for
/// write. The reactor derives `mio::Interest` from it rather than
/// reproducing the exact 0/2 encoding on the wire of its own poll
/// registration — see DESIGN.md for why the richer `Interest` type is
/// used internally instead.
pub(crate) type ModeHint = i32;
pub(crate) const MODE_FAILED: ModeHint = -1;
pub(crate) const MODE_READ: ModeHint = 0;
pub(crate) const MODE_WRITE: ModeHint = 2;

impl TlsSlot {
    /// Creates a client-role session and pins SNI to `host`. The
    /// handshake itself only makes progress once the
    /// reactor calls [`Self::ready`] on a readable/writable tick.
    pub(crate) fn attach_client(host: &str) -> Result<(Self, ModeHint), ErrorKind> {
        let name = ServerName::try_from(host.to_string()).map_err(|_| {
            ErrorKind::from(rustls::Error::General(format!("invalid SNI host: {host}")))
        })?;
        let conn = ClientConnection::new(default_client_config(), name)?;
        Ok((
            Self {
                session: Session::Client(conn),
                pending: Pending::Connecting,
                transfer: None,
            },
            MODE_WRITE,
        ))
    }

    /// Creates a server-role session for a freshly-accepted socket.
    pub(crate) fn attach_server(config: Arc<ServerConfig>) -> Result<(Self, ModeHint), ErrorKind> {
        let conn = ServerConnection::new(config)?;
        Ok((
            Self {
                session: Session::Server(conn),
                pending: Pending::Connecting,
                transfer: None,
            },
            MODE_READ,
        ))
    }

    /// Appends `bytes` as outbound plaintext; `rustls`
    /// buffers the resulting ciphertext internally until the next
    /// `write_tls` drains it.
    pub(crate) fn send(&mut self, bytes: &[u8]) -> Result<(), ErrorKind> {
        self.session.write_plain(bytes)?;
        Ok(())
    }

    /// Queues a file transfer; draining starts only
    /// once any handshake and pending plaintext writes have cleared,
    /// mirroring the plaintext reactor's own buffer-before-transfer rule.
    pub(crate) fn transfer(&mut self, file: File, length: u64) {
        self.transfer = Some((file, length));
    }

    pub(crate) fn has_pending_transfer(&self) -> bool {
        self.transfer.is_some()
    }

    /// Bytes still to be read from the pending transfer file and pushed
    /// through the session, or 0 if none is queued — what the engine
    /// adds into the `Content-Length` it writes for a response that
    /// streams a file over TLS.
    pub(crate) fn pending_transfer_len(&self) -> u64 {
        self.transfer.as_ref().map(|(_, remaining)| *remaining).unwrap_or(0)
    }

    /// Drives the session given the underlying socket's readiness,
    /// feeding any decrypted application bytes to `receiver`. Returns
    /// the updated mode hint, or a negative value on an unrecoverable
    /// failure, reported to the protocol engine the same way a
    /// plaintext read failure is.
    pub(crate) fn ready(
        &mut self,
        stream: &mut dyn ReadWrite,
        readable: bool,
        writable: bool,
        mut receiver: impl FnMut(&[u8]),
    ) -> ModeHint {
        if self.pending == Pending::Connecting {
            if readable {
                if self.session.read_tls(stream).is_err() {
                    return MODE_FAILED;
                }
                if self.session.process_new_packets().is_err() {
                    return MODE_FAILED;
                }
            }
            if writable && self.session.write_tls(stream).is_err() {
                return MODE_FAILED;
            }
            if self.session.is_handshaking() {
                return if self.session.wants_write() { MODE_WRITE } else { MODE_READ };
            }
            self.pending = Pending::Idle;
        }

        if self.pending == Pending::Transferring || (self.transfer.is_some() && !self.session.wants_write()) {
            self.pending = Pending::Transferring;
            if let Some((file, remaining)) = self.transfer.as_mut() {
                let mut chunk = [0u8; 16 * 1024];
                let want = chunk.len().min(*remaining as usize);
                match file.read(&mut chunk[..want]) {
                    Ok(0) | Err(_) => {
                        self.transfer = None;
                        self.pending = Pending::Idle;
                    }
                    Ok(n) => {
                        if self.session.write_plain(&chunk[..n]).is_err() {
                            return MODE_FAILED;
                        }
                        *remaining -= n as u64;
                        if *remaining == 0 {
                            self.transfer = None;
                            self.pending = Pending::Idle;
                        }
                    }
                }
            }
        }

        if writable {
            loop {
                match self.session.write_tls(stream) {
                    Ok(0) => break,
                    Ok(_) => continue,
                    Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                    Err(_) => return MODE_FAILED,
                }
            }
        }

        if readable {
            match self.session.read_tls(stream) {
                Ok(0) => return MODE_FAILED,
                Ok(_) => {}
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
                Err(_) => return MODE_FAILED,
            }
            if self.session.process_new_packets().is_err() {
                return MODE_FAILED;
            }
            let mut plaintext = Vec::new();
            if self.session.drain_plaintext(&mut plaintext).is_err() {
                return MODE_FAILED;
            }
            if !plaintext.is_empty() {
                receiver(&plaintext);
            }
        }

        if self.session.wants_write() || self.transfer.is_some() {
            MODE_WRITE
        } else {
            MODE_READ
        }
    }

    /// The readiness the reactor should next poll this slot's socket
    /// for, recomputed from the session's current state rather than the
    /// hint captured mid-`ready()` — called once per tick, after any
    /// I/O, so the reactor's registered `Interest` always matches what
    /// the session actually still wants before the next `poll`.
    pub(crate) fn desired_mode(&self) -> ModeHint {
        if self.pending == Pending::Connecting && self.session.is_handshaking() {
            return if self.session.wants_write() { MODE_WRITE } else { MODE_READ };
        }
        if self.session.wants_write() || self.transfer.is_some() {
            MODE_WRITE
        } else {
            MODE_READ
        }
    }

    /// Releases the session and closes any in-flight transfer file.
    /// The transfer fd is a linear resource: dropping `File` closes it
    /// regardless of whether the transfer completed, errored, or was
    /// cancelled by an HTTP error.
    pub(crate) fn detach(self) {
        drop(self.transfer);
    }
}

/// Capability the TLS adapter needs from the underlying transport:
/// plain `Read`/`Write` over the connection's raw socket. Implemented
/// for `mio::net::TcpStream` by the reactor module; kept as a trait
/// here so this module does not depend on `mio` directly.
pub(crate) trait ReadWrite: Read + Write {}
impl<T: Read + Write> ReadWrite for T {}

#[cfg(test)]
mod tests {
    use super::*;

    // A live handshake needs a real certificate and a socket pair, so it
    // isn't exercised here; these cover the pure, certificate-free paths.

    #[test]
    fn mode_hint_encoding_matches_the_documented_values() {
        assert_eq!(MODE_FAILED, -1);
        assert_eq!(MODE_READ, 0);
        assert_eq!(MODE_WRITE, 2);
    }

    #[test]
    fn default_client_config_is_cached() {
        let a = default_client_config();
        let b = default_client_config();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn attach_client_rejects_an_invalid_sni_host() {
        assert!(TlsSlot::attach_client("not a host\0").is_err());
    }
}
