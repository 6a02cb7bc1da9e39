//! The reactor: one `mio::Poll` loop driving every connection slot, the
//! router, and outbound client exchanges from a single thread.
//!
//! Libraries in this family often drive the loop with a raw `select(2)`
//! over an fd set; `mio::Poll` is the idiomatic Rust substitute, and
//! fixes the token scheme below: `Token(0)` is the main listener, the next
//! `max_listeners` tokens belong to `listen_fd`-registered descriptors,
//! and everything after that is `1 + max_listeners + slot_index` — a
//! direct arithmetic mapping rather than a separate counter, so a token
//! can be turned back into a slot index (or vice versa) with no lookup.

use std::{
    fs::File,
    io::{self, Read, Write},
    net::{Ipv4Addr, SocketAddr, ToSocketAddrs},
    os::unix::io::RawFd,
    sync::Arc,
    time::{Duration, Instant, SystemTime, UNIX_EPOCH},
};

use mio::{
    net::{TcpListener as MioTcpListener, TcpStream as MioTcpStream},
    unix::SourceFd,
    Events, Interest, Poll, Token,
};
use rustls::ServerConfig;
use socket2::{Domain, Protocol, Socket, Type};

use crate::{
    buffer::Buffer,
    cli,
    client::{redirect_action, ClientCallback, ClientContext, ClientOutcome, ClientRequest, RedirectAction, MAX_REDIRECTS},
    http::{
        client_response::{self, ClientResponse},
        request::{self, Request},
        response::Response,
        types::{Method, StatusCode, Version},
    },
    limits::{ConnLimits, Http09Limits, ReactorLimits, ReqLimits, RespLimits},
    router::Router,
    tls::{TlsSlot, MODE_WRITE},
};

/// One connection: the socket, its buffers, and whichever protocol role
/// it is playing. Both `request`/`response` (server role) and the
/// client-role state live behind a single `role` tag rather than two
/// parallel optional fields, since a slot is exactly one or the other
/// for its entire lifetime.
struct Slot {
    stream: MioTcpStream,
    token: Token,
    tls: Option<TlsSlot>,
    read_buf: Buffer,
    write_buf: Buffer,
    transfer: Option<Transfer>,
    request: Request,
    response: Response,
    role: Role,
    keep_alive: bool,
    http09: bool,
    requests_served: usize,
    opened: Instant,
    last_activity: Instant,
    /// Set once the outbound buffer and any transfer have fully drained;
    /// the inactivity deadline is measured from here, not
    /// from `last_activity`, so a connection streaming a large transfer
    /// is never killed mid-flight.
    drained_at: Option<Instant>,
    closing: bool,
    /// The protocol engine's absorbing `error` state (server role only):
    /// once set, further bytes received on this connection are discarded
    /// rather than parsed, but the TCP connection is not torn down by
    /// that alone — it closes only through the normal inactivity deadline
    /// or a genuine I/O error, per the engine's "an HTTP-level error
    /// never by itself closes the TCP connection" rule.
    error: bool,
    route_id: usize,
}

/// An in-flight file transfer queued via [`Reactor::transfer`].
/// Draining starts only once `write_buf` is empty, mirroring
/// the buffer-before-transfer order [`crate::tls::TlsSlot`] uses.
struct Transfer {
    file: File,
    remaining: u64,
}

enum Role {
    Server,
    Client {
        ctx: ClientContext,
        response: ClientResponse,
        /// Set just before the completion callback fires (success or
        /// redirect reissue), so [`Reactor::teardown`] does not also
        /// report the exchange as failed.
        completed: bool,
    },
}

/// An externally-registered descriptor: the reactor
/// polls it alongside its own sockets but never reads or writes it
/// itself — `callback` owns that.
struct ListenerEntry {
    fd: RawFd,
    premium: bool,
    callback: Box<dyn FnMut(RawFd, bool, bool) + Send>,
}

/// Builds a [`Reactor`] from limits and an optional TLS configuration,
/// mirroring the fluent style `limits.rs`'s own examples show
/// (`Reactor::builder().reactor_limits(..).request_limits(..).open(..)`).
pub struct ReactorBuilder {
    reactor_limits: ReactorLimits,
    conn_limits: ConnLimits,
    req_limits: ReqLimits,
    resp_limits: RespLimits,
    http09_limits: Option<Http09Limits>,
    tls_config: Option<Arc<ServerConfig>>,
    debug: bool,
    ttl: Option<u32>,
}

impl Default for ReactorBuilder {
    fn default() -> Self {
        Self {
            reactor_limits: ReactorLimits::default(),
            conn_limits: ConnLimits::default(),
            req_limits: ReqLimits::default(),
            resp_limits: RespLimits::default(),
            http09_limits: None,
            tls_config: None,
            debug: false,
            ttl: None,
        }
    }
}

impl ReactorBuilder {
    pub fn reactor_limits(mut self, limits: ReactorLimits) -> Self {
        self.reactor_limits = limits;
        self
    }

    pub fn conn_limits(mut self, limits: ConnLimits) -> Self {
        self.conn_limits = limits;
        self
    }

    pub fn request_limits(mut self, limits: ReqLimits) -> Self {
        self.req_limits = limits;
        self
    }

    pub fn response_limits(mut self, limits: RespLimits) -> Self {
        self.resp_limits = limits;
        self
    }

    /// Enables the HTTP/0.9 supplemental compatibility path.
    /// Left disabled by default: a bare `METHOD /uri` request line is a
    /// protocol error unless an embedder opts in.
    pub fn http09(mut self, limits: Http09Limits) -> Self {
        self.http09_limits = Some(limits);
        self
    }

    /// Enables TLS on the listening socket, and on any outbound client
    /// request built with [`ClientRequest::tls`]. `config` is typically
    /// shared across many reactors/processes, hence `Arc`.
    pub fn with_tls(mut self, config: Arc<ServerConfig>) -> Self {
        self.tls_config = Some(config);
        self
    }

    pub fn debug(mut self, enabled: bool) -> Self {
        self.debug = enabled;
        self
    }

    /// Sets the listening socket's IP TTL (the `-http-ttl` CLI token).
    pub fn ttl(mut self, ttl: u32) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Binds and starts listening on `service` (a decimal port, or the
    /// literal token `"dynamic"` for an OS-assigned port).
    pub fn open(self, service: &str) -> io::Result<Reactor> {
        let port = cli::resolve_service(service)?;

        let socket = Socket::new(Domain::IPV4, Type::STREAM, Some(Protocol::TCP))?;
        socket.set_reuse_address(true)?;
        if let Some(ttl) = self.ttl {
            socket.set_ttl(ttl)?;
        }
        let addr = SocketAddr::new(Ipv4Addr::UNSPECIFIED.into(), port);
        socket.bind(&addr.into())?;
        socket.listen(1024)?;
        socket.set_nonblocking(true)?;

        let std_listener: std::net::TcpListener = socket.into();
        let mut listener = MioTcpListener::from_std(std_listener);

        let mut poll = Poll::new()?;
        let listener_token = Token(0);
        poll.registry().register(&mut listener, listener_token, Interest::READABLE)?;

        let max_listeners = self.reactor_limits.max_listeners;
        let max_connections = self.reactor_limits.max_connections;
        let req_limits = self.req_limits.clone().precalculate();

        Ok(Reactor {
            poll,
            events: Events::with_capacity(1024),
            listener: Some(listener),
            listener_token,
            tls_config: self.tls_config,
            listeners: (0..max_listeners).map(|_| None).collect(),
            slots: (0..max_connections).map(|_| None).collect(),
            free_slots: (0..max_connections).rev().collect(),
            router: Router::new(self.reactor_limits.max_routes),
            reactor_limits: self.reactor_limits,
            conn_limits: self.conn_limits,
            req_limits,
            resp_limits: self.resp_limits,
            http09_limits: self.http09_limits,
            background: None,
            fastscan: None,
            running: false,
            debug: self.debug,
        })
    }
}

/// The single-threaded event loop. Owns every connection slot,
/// the router, and the listening socket(s); `run` never returns control
/// to the caller until [`Reactor::stop`] is called from inside a
/// handler, protect callback, or background hook.
pub struct Reactor {
    poll: Poll,
    events: Events,
    listener: Option<MioTcpListener>,
    listener_token: Token,
    tls_config: Option<Arc<ServerConfig>>,
    listeners: Vec<Option<ListenerEntry>>,
    slots: Vec<Option<Slot>>,
    free_slots: Vec<usize>,
    router: Router,
    reactor_limits: ReactorLimits,
    conn_limits: ConnLimits,
    req_limits: ReqLimits,
    resp_limits: RespLimits,
    http09_limits: Option<Http09Limits>,
    background: Option<Box<dyn FnMut(&mut Reactor) + Send>>,
    fastscan: Option<(Box<dyn FnMut(&mut Reactor) + Send>, Duration, Instant)>,
    running: bool,
    debug: bool,
}

enum PumpResult {
    Continue,
    Close(&'static str),
    Redirect(ClientRequest, ClientContext),
}

impl Reactor {
    pub fn builder() -> ReactorBuilder {
        ReactorBuilder::default()
    }

    /// Parses the three recognized CLI tokens and opens a reactor
    /// on the resulting service, returning whatever arguments it did not
    /// recognize for the embedding application to interpret itself.
    pub fn from_cli<I, S>(args: I) -> io::Result<(Reactor, Vec<String>)>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let (opts, rest) = cli::parse_args(args);
        let service = opts.http_service.unwrap_or_else(|| "8080".to_string());
        let mut builder = Reactor::builder().debug(opts.http_debug);
        if let Some(ttl) = opts.http_ttl {
            builder = builder.ttl(ttl);
        }
        Ok((builder.open(&service)?, rest))
    }

    pub fn debug(&self) -> bool {
        self.debug
    }

    /// Mutable access to the route table. There is no separate
    /// `Router::new` in the public surface: a reactor always owns
    /// exactly one router, sized by `ReactorLimits::max_routes`.
    pub fn router(&mut self) -> &mut Router {
        &mut self.router
    }

    /// Registers a background hook, called once per tick (a best
    /// effort ~1Hz background callback; the actual period is bounded by
    /// `ReactorLimits::background_period` and by how long `poll` blocks).
    pub fn background(&mut self, hook: impl FnMut(&mut Reactor) + Send + 'static) {
        self.background = Some(Box::new(hook));
    }

    /// Registers a higher-frequency hook, called at least once every
    /// `period` regardless of the background hook's own cadence.
    /// `period` is clamped to `[1ms, 999ms]`.
    pub fn fastscan(&mut self, hook: impl FnMut(&mut Reactor) + Send + 'static, period: Duration) {
        let period = period.clamp(Duration::from_millis(1), Duration::from_millis(999));
        self.fastscan = Some((Box::new(hook), period, Instant::now()));
    }

    /// Registers an externally-owned descriptor (e.g. a signal pipe) for
    /// readiness polling. The reactor never reads,
    /// writes, or closes `fd` itself — `callback` is invoked with its
    /// current readiness on every tick the descriptor is ready, and is
    /// entirely responsible for servicing it. `premium` listeners run
    /// ahead of ordinary socket I/O each tick; others run after.
    ///
    /// Unlike the plaintext server path, a `listen_fd` entry is never
    /// `accept()`-ed by the reactor itself regardless of what it
    /// represents — see `DESIGN.md` for why this differs from
    /// the original multi-listener accept story.
    pub fn listen_fd(
        &mut self,
        fd: RawFd,
        readable: bool,
        writable: bool,
        premium: bool,
        callback: impl FnMut(RawFd, bool, bool) + Send + 'static,
    ) -> Option<usize> {
        let index = self.listeners.iter().position(Option::is_none)?;
        let token = self.listener_fd_token(index);

        let mut interest = None;
        if readable {
            interest = Some(Interest::READABLE);
        }
        if writable {
            interest = Some(interest.map(|i| i.add(Interest::WRITABLE)).unwrap_or(Interest::WRITABLE));
        }
        let interest = interest?;

        self.poll.registry().register(&mut SourceFd(&fd), token, interest).ok()?;
        self.listeners[index] = Some(ListenerEntry {
            fd,
            premium,
            callback: Box::new(callback),
        });
        Some(index)
    }

    pub fn listen_fd_remove(&mut self, index: usize) {
        if let Some(Some(entry)) = self.listeners.get_mut(index).map(Option::take) {
            let _ = self.poll.registry().deregister(&mut SourceFd(&entry.fd));
        }
    }

    /// Appends `bytes` to a slot's outbound direction,
    /// transparently routing through the TLS session when the slot is
    /// encrypted. A no-op if `index` names a closed or unknown slot.
    pub fn send(&mut self, index: usize, bytes: &[u8]) {
        if let Some(slot) = self.slots[index].as_mut() {
            enqueue(slot, bytes);
        }
    }

    /// Queues a file to stream out once the current outbound buffer
    /// drains. Replaces any transfer already pending
    /// on this slot.
    pub fn transfer(&mut self, index: usize, file: File, length: u64) {
        let Some(slot) = self.slots[index].as_mut() else { return };
        match slot.tls.as_mut() {
            Some(tls) => tls.transfer(file, length),
            None => slot.transfer = Some(Transfer { file, remaining: length }),
        }
    }

    pub fn close_slot(&mut self, index: usize) {
        if let Some(slot) = self.slots[index].take() {
            self.teardown(index, slot, "closed by embedder");
        }
    }

    pub fn close_all(&mut self) {
        for index in 0..self.slots.len() {
            self.close_slot(index);
        }
    }

    /// Stops [`Self::run`] after the current tick. Callable from inside
    /// a handler, protect callback, or background/fastscan hook.
    pub fn stop(&mut self) {
        self.running = false;
    }

    /// Opens an outbound connection and sends `request`, invoking the
    /// boxed callback on completion, failure, or (transparently, up to
    /// one hop) after following a redirect. Returns the slot index, or
    /// `None` if the slot table is
    /// full or the connection could not be initiated.
    pub fn client_request(&mut self, request: ClientRequest, callback: ClientCallback) -> Option<usize> {
        let method = request.method;
        self.connect_client(request, ClientContext::new(method, callback))
    }

    fn connect_client(&mut self, request: ClientRequest, ctx: ClientContext) -> Option<usize> {
        let index = self.free_slots.pop()?;
        let addr = match (request.host.as_str(), request.port).to_socket_addrs().ok().and_then(|mut it| it.next()) {
            Some(addr) => addr,
            None => {
                self.free_slots.push(index);
                return None;
            }
        };

        let mut stream = match MioTcpStream::connect(addr) {
            Ok(stream) => stream,
            Err(_) => {
                self.free_slots.push(index);
                return None;
            }
        };
        let token = self.slot_token(index);
        if self.poll.registry().register(&mut stream, token, Interest::WRITABLE).is_err() {
            self.free_slots.push(index);
            return None;
        }

        let tls = if request.tls {
            match TlsSlot::attach_client(&request.host) {
                Ok((tls, _)) => Some(tls),
                Err(_) => {
                    let _ = self.poll.registry().deregister(&mut stream);
                    self.free_slots.push(index);
                    return None;
                }
            }
        } else {
            None
        };

        let wire = serialize_client_request(&request);
        let now = Instant::now();
        let mut slot = Slot {
            stream,
            token,
            tls,
            read_buf: Buffer::with_capacity(self.req_limits.clone().estimated_buffer_size()),
            write_buf: Buffer::with_capacity(wire.len().max(self.resp_limits.default_capacity)),
            transfer: None,
            request: Request::new(&self.req_limits),
            response: Response::new(self.req_limits.header_count, self.resp_limits.default_capacity),
            role: Role::Client {
                ctx,
                response: ClientResponse::new(&self.req_limits),
                completed: false,
            },
            keep_alive: false,
            http09: false,
            requests_served: 0,
            opened: now,
            last_activity: now,
            drained_at: None,
            closing: false,
            error: false,
            route_id: 0,
        };
        enqueue(&mut slot, &wire);
        self.slots[index] = Some(slot);
        Some(index)
    }

    pub fn run(&mut self) -> io::Result<()> {
        self.running = true;
        while self.running {
            self.tick()?;
        }
        Ok(())
    }

    fn tick(&mut self) -> io::Result<()> {
        self.run_background();

        let mut timeout = self.reactor_limits.background_period;
        if let Some((_, period, last)) = &self.fastscan {
            let until = last.elapsed();
            let remaining = period.saturating_sub(until).max(Duration::from_millis(1));
            timeout = timeout.min(remaining);
        }

        self.poll.poll(&mut self.events, Some(timeout))?;

        self.run_fastscan_if_due();

        let mut listener_ready = false;
        let mut listener_fd_events: Vec<(usize, bool, bool)> = Vec::new();
        let mut slot_events: Vec<(usize, bool, bool)> = Vec::new();

        for event in self.events.iter() {
            let token = event.token();
            if token == self.listener_token {
                listener_ready = true;
            } else if token.0 >= 1 && token.0 <= self.reactor_limits.max_listeners {
                listener_fd_events.push((token.0 - 1, event.is_readable(), event.is_writable()));
            } else {
                let index = token.0 - 1 - self.reactor_limits.max_listeners;
                slot_events.push((index, event.is_readable(), event.is_writable()));
            }
        }

        self.fire_listener_fds(&listener_fd_events, true);
        if listener_ready {
            self.accept_loop();
        }
        for (index, readable, writable) in slot_events {
            self.process_slot(index, readable, writable);
        }
        self.fire_listener_fds(&listener_fd_events, false);

        self.sweep_deadlines();
        Ok(())
    }

    fn run_background(&mut self) {
        let Some(mut hook) = self.background.take() else { return };
        hook(self);
        self.background = Some(hook);
    }

    fn run_fastscan_if_due(&mut self) {
        let due = matches!(&self.fastscan, Some((_, period, last)) if last.elapsed() >= *period);
        if !due {
            return;
        }
        let Some((mut hook, period, _)) = self.fastscan.take() else { return };
        hook(self);
        self.fastscan = Some((hook, period, Instant::now()));
    }

    fn fire_listener_fds(&mut self, events: &[(usize, bool, bool)], premium_pass: bool) {
        for &(idx, r, w) in events {
            if let Some(Some(entry)) = self.listeners.get_mut(idx) {
                if entry.premium == premium_pass {
                    (entry.callback)(entry.fd, r, w);
                }
            }
        }
    }

    fn accept_loop(&mut self) {
        loop {
            let Some(listener) = self.listener.as_ref() else { return };
            match listener.accept() {
                Ok((mut stream, _addr)) => {
                    let Some(index) = self.free_slots.pop() else {
                        log::warn!("slot table full ({} connections); refusing new connection", self.reactor_limits.max_connections);
                        continue;
                    };
                    let token = self.slot_token(index);
                    if self.poll.registry().register(&mut stream, token, Interest::READABLE).is_err() {
                        self.free_slots.push(index);
                        continue;
                    }
                    let tls = match self.tls_config.as_ref() {
                        Some(config) => match TlsSlot::attach_server(config.clone()) {
                            Ok((tls, _)) => Some(tls),
                            Err(e) => {
                                log::warn!("TLS handshake could not start: {e}");
                                let _ = self.poll.registry().deregister(&mut stream);
                                self.free_slots.push(index);
                                continue;
                            }
                        },
                        None => None,
                    };
                    let now = Instant::now();
                    let read_cap = self.req_limits.clone().estimated_buffer_size();
                    self.slots[index] = Some(Slot {
                        stream,
                        token,
                        tls,
                        read_buf: Buffer::with_capacity(read_cap),
                        write_buf: Buffer::with_capacity(self.resp_limits.default_capacity),
                        transfer: None,
                        request: Request::new(&self.req_limits),
                        response: Response::new(self.req_limits.header_count, self.resp_limits.default_capacity),
                        role: Role::Server,
                        keep_alive: true,
                        http09: false,
                        requests_served: 0,
                        opened: now,
                        last_activity: now,
                        drained_at: Some(now),
                        closing: false,
                        error: false,
                        route_id: 0,
                    });
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return,
                Err(e) => {
                    log::warn!("accept failed: {e}");
                    return;
                }
            }
        }
    }

    fn process_slot(&mut self, index: usize, readable: bool, writable: bool) {
        let Some(mut slot) = self.slots[index].take() else { return };

        let io_result = if slot.tls.is_some() {
            self.process_tls_io(&mut slot, readable, writable)
        } else {
            plain_io(&mut slot, readable, writable)
        };

        if let Err(reason) = io_result {
            self.teardown(index, slot, reason);
            return;
        }

        match self.pump(&mut slot) {
            PumpResult::Continue => {}
            PumpResult::Close(reason) => {
                self.teardown(index, slot, reason);
                return;
            }
            PumpResult::Redirect(request, ctx) => {
                self.teardown(index, slot, "redirect reissue");
                self.connect_client(request, ctx);
                return;
            }
        }

        if slot.closing && slot.write_buf.is_empty() && slot.transfer.is_none() {
            self.teardown(index, slot, "response complete, connection not persisted");
            return;
        }

        self.reregister_interest(&mut slot);
        self.slots[index] = Some(slot);
    }

    /// Recomputes this slot's socket interest from its current
    /// pending-write state and reregisters it with `mio`. Spec §4.1
    /// step 1: a slot is in the write set whenever bytes (or a file
    /// transfer) are queued to go out, and in the read set only when
    /// that outbound buffer is empty — never both, so a response a
    /// handler just queued actually gets written on the next `poll`,
    /// and a slot that just finished draining goes back to reading the
    /// next request (or, for a client-role slot, the response).
    fn reregister_interest(&mut self, slot: &mut Slot) {
        let interest = match slot.tls.as_ref() {
            Some(tls) => {
                if tls.desired_mode() == MODE_WRITE {
                    Interest::WRITABLE
                } else {
                    Interest::READABLE
                }
            }
            None => {
                if !slot.write_buf.is_empty() || slot.transfer.is_some() {
                    Interest::WRITABLE
                } else {
                    Interest::READABLE
                }
            }
        };
        if let Err(e) = self.poll.registry().reregister(&mut slot.stream, slot.token, interest) {
            log::warn!("failed to reregister slot {} interest: {e}", slot.token.0);
        }
    }

    fn process_tls_io(&mut self, slot: &mut Slot, readable: bool, writable: bool) -> Result<(), &'static str> {
        let mut incoming = Vec::new();
        let hint = {
            let stream = &mut slot.stream;
            let tls = slot.tls.as_mut().expect("process_tls_io called on a plaintext slot");
            tls.ready(stream, readable, writable, |bytes| incoming.extend_from_slice(bytes))
        };
        if hint < 0 {
            return Err("TLS session failed");
        }
        if !incoming.is_empty() {
            let consumed = slot.read_buf.fill(&incoming);
            if consumed < incoming.len() {
                log::warn!("read buffer saturated; {} decrypted bytes dropped", incoming.len() - consumed);
            }
            slot.last_activity = Instant::now();
        }
        if !slot.tls.as_ref().unwrap().has_pending_transfer() {
            slot.drained_at = Some(Instant::now());
        }
        Ok(())
    }

    fn pump(&mut self, slot: &mut Slot) -> PumpResult {
        match &slot.role {
            Role::Server => self.pump_server(slot),
            Role::Client { .. } => self.pump_client(slot),
        }
    }

    fn pump_server(&mut self, slot: &mut Slot) -> PumpResult {
        if slot.error {
            // Absorbing state: discard whatever arrived rather than
            // parsing it, without forcing the TCP connection closed.
            slot.read_buf.clear();
            return PumpResult::Continue;
        }

        loop {
            if slot.closing || slot.read_buf.is_empty() {
                return PumpResult::Continue;
            }

            let buf = slot.read_buf.as_mut_slice();
            match request::parse(buf, &mut slot.request, &self.req_limits, self.http09_limits.as_ref()) {
                Ok(0) => return PumpResult::Continue,
                Ok(n) => {
                    self.dispatch_server(slot);
                    slot.read_buf.consume(n);
                    slot.http09 = slot.request.version() == Version::Http09;
                    slot.requests_served += 1;

                    let max_requests = if slot.http09 {
                        self.http09_limits.as_ref().map(|l| l.max_requests_per_connection).unwrap_or(usize::MAX)
                    } else {
                        self.conn_limits.max_requests_per_connection
                    };
                    if !slot.keep_alive || slot.requests_served >= max_requests {
                        slot.closing = true;
                        return PumpResult::Continue;
                    }
                }
                Err(kind) => {
                    let preamble = kind.as_http(Version::Http11, self.reactor_limits.json_errors);
                    enqueue(slot, preamble);
                    slot.read_buf.clear();
                    slot.closing = true;
                    return PumpResult::Continue;
                }
            }
        }
    }

    fn dispatch_server(&mut self, slot: &mut Slot) {
        slot.response.reset();
        let version = slot.request.version();
        slot.keep_alive = slot.request.keep_alive();

        match self.router.route_find(slot.request.url().path()) {
            None => {
                slot.response.status(StatusCode::NotFound).body(Vec::new());
            }
            Some(id) => {
                slot.route_id = id;
                let method = slot.request.method();
                let uri = slot.request.url().path().to_vec();

                if let Some(global) = self.router.global_protect() {
                    global.protect(method, &uri, &mut slot.response);
                }
                if slot.response.is_clean() {
                    if let Some(protect) = self.router.route_protect(id) {
                        protect.protect(method, &uri, &mut slot.response);
                    }
                }

                if slot.response.is_clean() {
                    if let Some(async_handler) = self.router.async_handler(id) {
                        let body = slot.request.body().unwrap_or(&[]);
                        async_handler.handle_partial(&slot.request, body, &mut slot.response);
                    } else {
                        let handler = self.router.handler(id).expect("router invariant: every route has a handler");
                        handler.handle(&slot.request, &mut slot.response);
                    }
                }
            }
        }

        finalize_response(slot, version);
    }

    fn pump_client(&mut self, slot: &mut Slot) -> PumpResult {
        let buf = slot.read_buf.as_mut_slice();
        let parsed = {
            let Role::Client { response, .. } = &mut slot.role else {
                unreachable!("pump_client called on a server-role slot")
            };
            client_response::parse(buf, response, &self.req_limits)
        };

        match parsed {
            Ok(0) => PumpResult::Continue,
            Ok(n) => {
                slot.read_buf.consume(n);
                self.complete_client(slot)
            }
            Err(_) => PumpResult::Close("malformed response"),
        }
    }

    fn complete_client(&mut self, slot: &mut Slot) -> PumpResult {
        let Role::Client { ctx, response, completed } = &mut slot.role else {
            unreachable!("complete_client called on a server-role slot")
        };

        let status = response.status();
        let action = redirect_action(status);
        let location = response.header(b"location").map(|v| v.to_vec());

        if action != RedirectAction::None && ctx.redirect_depth < MAX_REDIRECTS {
            if let Some((host, port, tls, path)) = location.as_deref().and_then(parse_location) {
                let method = match action {
                    RedirectAction::AsGet => Method::Get,
                    _ => ctx.origin_method,
                };
                let callback = std::mem::replace(&mut ctx.callback, Box::new(|_| {}));
                let mut new_ctx = ClientContext::new(method, callback);
                new_ctx.redirect_depth = ctx.redirect_depth + 1;
                *completed = true;
                let request = ClientRequest::new(method, host, port, path).tls(tls);
                return PumpResult::Redirect(request, new_ctx);
            }
        }

        let status_code = response.status_code();
        let reason = response.reason().to_vec();
        let body = response.body().unwrap_or(&[]).to_vec();
        let headers: Vec<(Vec<u8>, Vec<u8>)> = response.headers().iter().map(|(n, v)| (n.to_vec(), v.to_vec())).collect();

        *completed = true;
        (ctx.callback)(ClientOutcome::Response {
            status,
            status_code,
            reason: &reason,
            header: &|name: &[u8]| headers.iter().find(|(n, _)| n.eq_ignore_ascii_case(name)).map(|(_, v)| v.as_slice()),
            body: &body,
        });
        PumpResult::Close("client response complete")
    }

    fn teardown(&mut self, index: usize, mut slot: Slot, reason: &str) {
        log::trace!("slot {index} closing: {reason}");
        let _ = self.poll.registry().deregister(&mut slot.stream);
        if let Role::Client { ctx, completed, .. } = &mut slot.role {
            if !*completed {
                (ctx.callback)(ClientOutcome::Failed { status: 505 });
            }
        }
        if let Some(tls) = slot.tls.take() {
            tls.detach();
        }
        self.free_slots.push(index);
    }

    fn sweep_deadlines(&mut self) {
        let now = Instant::now();
        let mut to_close = Vec::new();

        for (index, slot) in self.slots.iter().enumerate() {
            let Some(slot) = slot else { continue };
            let idle_too_long = slot
                .drained_at
                .map(|t| now.saturating_duration_since(t) > self.reactor_limits.inactivity_deadline)
                .unwrap_or(false);
            let lifetime = if slot.http09 {
                self.http09_limits.as_ref().map(|l| l.connection_lifetime).unwrap_or(self.conn_limits.connection_lifetime)
            } else {
                self.conn_limits.connection_lifetime
            };
            let too_old = now.saturating_duration_since(slot.opened) > lifetime;
            if idle_too_long || too_old {
                to_close.push(index);
            }
        }

        for index in to_close {
            if let Some(slot) = self.slots[index].take() {
                self.teardown(index, slot, "deadline exceeded");
            }
        }
    }

    #[inline(always)]
    fn listener_fd_token(&self, index: usize) -> Token {
        Token(1 + index)
    }

    #[inline(always)]
    fn slot_token(&self, index: usize) -> Token {
        Token(1 + self.reactor_limits.max_listeners + index)
    }
}

/// Routes outbound bytes through the TLS session when the slot is
/// encrypted, or straight onto the plaintext write buffer otherwise.
fn enqueue(slot: &mut Slot, bytes: &[u8]) {
    match slot.tls.as_mut() {
        Some(tls) => {
            if tls.send(bytes).is_err() {
                log::warn!("dropped {} bytes: TLS session already failed", bytes.len());
            }
        }
        None => slot.write_buf.push(bytes),
    }
}

fn plain_io(slot: &mut Slot, readable: bool, writable: bool) -> Result<(), &'static str> {
    if writable {
        write_slot_plain(slot)?;
    }
    if readable {
        read_slot_plain(slot)?;
    }
    Ok(())
}

fn write_slot_plain(slot: &mut Slot) -> Result<(), &'static str> {
    while !slot.write_buf.is_empty() {
        match slot.stream.write(slot.write_buf.as_slice()) {
            Ok(0) => return Err("write returned zero bytes"),
            Ok(n) => slot.write_buf.consume(n),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(()),
            Err(_) => return Err("write error"),
        }
    }
    drain_transfer_plain(slot)
}

fn drain_transfer_plain(slot: &mut Slot) -> Result<(), &'static str> {
    let Some(transfer) = slot.transfer.as_mut() else {
        slot.drained_at = Some(Instant::now());
        return Ok(());
    };

    let mut chunk = [0u8; 64 * 1024];
    let want = chunk.len().min(transfer.remaining as usize);
    match transfer.file.read(&mut chunk[..want]) {
        Ok(0) | Err(_) => {
            slot.transfer = None;
            slot.drained_at = Some(Instant::now());
            Ok(())
        }
        Ok(n) => match slot.stream.write(&chunk[..n]) {
            Ok(written) => {
                let transfer = slot.transfer.as_mut().unwrap();
                transfer.remaining -= written as u64;
                if written < n {
                    slot.write_buf.push(&chunk[written..n]);
                }
                if slot.transfer.as_ref().map(|t| t.remaining == 0).unwrap_or(false) {
                    slot.transfer = None;
                    slot.drained_at = Some(Instant::now());
                }
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                slot.write_buf.push(&chunk[..n]);
                Ok(())
            }
            Err(_) => Err("transfer write error"),
        },
    }
}

fn read_slot_plain(slot: &mut Slot) -> Result<(), &'static str> {
    loop {
        let mut chunk = [0u8; 8192];
        match slot.stream.read(&mut chunk) {
            Ok(0) => return Err("peer closed the connection"),
            Ok(n) => {
                slot.last_activity = Instant::now();
                let consumed = slot.read_buf.fill(&chunk[..n]);
                if consumed < n {
                    log::warn!("read buffer saturated; {} bytes dropped", n - consumed);
                }
                if n < chunk.len() {
                    return Ok(());
                }
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(()),
            Err(_) => return Err("read error"),
        }
    }
}

/// Writes the wire bytes for one server response, preserving the wire
/// ordering guarantee, and branching on the response's status class the
/// way the original library's three canned outcomes do: 2xx carries a
/// body, 3xx is headers-only, 4xx/5xx collapses to a short preamble.
fn finalize_response(slot: &mut Slot, version: Version) {
    let status = slot.response.status_code();
    let class = status.class();

    if version == Version::Http09 {
        let body = slot.response.body_bytes().to_vec();
        enqueue(slot, &body);
        return;
    }

    if class >= 4 {
        // Matches the error preamble literally: status line plus a bare
        // Content-Length: 0, nothing else. No Connection header is added
        // here and `slot.keep_alive` (set from the request's own
        // Connection header in `dispatch_server`) is left untouched — an
        // HTTP-level error never by itself closes the TCP connection.
        slot.transfer = None;
        let mut out = Vec::new();
        out.extend_from_slice(status.into_first_line(version));
        out.extend_from_slice(b"content-length: 0\r\n\r\n");
        enqueue(slot, &out);
        return;
    }

    if class == 3 {
        // Short-circuits the body: emit the status line + headers
        // immediately, then switch to the absorbing `error` state so
        // further request bytes are ignored — this does not by itself
        // close the TCP connection (§7).
        let head = build_headers(slot, version, 0);
        enqueue(slot, &head);
        slot.error = true;
        return;
    }

    let body = slot.response.body_bytes().to_vec();
    let pending_transfer_len = match slot.tls.as_ref() {
        Some(tls) => tls.pending_transfer_len() as usize,
        None => slot.transfer.as_ref().map(|t| t.remaining as usize).unwrap_or(0),
    };
    // `Content-Length` covers the handler body plus whatever file
    // transfer is already queued behind it (§4.2 step 9); only the body
    // portion is truncated/padded to the handler's own declared length —
    // the transfer bytes are never touched here, just counted.
    let body_declared_len = slot.response.content_length_override().unwrap_or(body.len());
    let head = build_headers(slot, version, body_declared_len + pending_transfer_len);
    enqueue(slot, &head);
    let fitted = fit_to_length(&body, body_declared_len);
    enqueue(slot, &fitted);

    if slot.response.wants_close() {
        slot.keep_alive = false;
    }
}

fn build_headers(slot: &Slot, version: Version, content_length: usize) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(slot.response.status_code().into_first_line(version));
    out.extend_from_slice(if slot.keep_alive { b"connection: keep-alive\r\n" } else { b"connection: close\r\n" });
    out.extend_from_slice(b"date: ");
    out.extend_from_slice(format_http_date(SystemTime::now()).as_bytes());
    out.extend_from_slice(b"\r\n");
    out.extend_from_slice(b"content-length: ");
    out.extend_from_slice(content_length.to_string().as_bytes());
    out.extend_from_slice(b"\r\n");
    for (name, value) in slot.response.headers_iter() {
        out.extend_from_slice(name);
        out.extend_from_slice(b": ");
        out.extend_from_slice(value);
        out.extend_from_slice(b"\r\n");
    }
    out.extend_from_slice(b"\r\n");
    out
}

/// Truncates or zero-pads `body` to exactly `len` bytes. Used only when
/// [`Response::content_length`] was called: per the design note on the
/// original `echttp_content_length`, an explicit override is
/// authoritative over whatever the body itself contains.
fn fit_to_length(body: &[u8], len: usize) -> Vec<u8> {
    match body.len().cmp(&len) {
        std::cmp::Ordering::Equal => body.to_vec(),
        std::cmp::Ordering::Greater => body[..len].to_vec(),
        std::cmp::Ordering::Less => {
            let mut out = body.to_vec();
            out.resize(len, 0);
            out
        }
    }
}

fn method_bytes(method: Method) -> &'static [u8] {
    match method {
        Method::Get => b"GET",
        Method::Put => b"PUT",
        Method::Post => b"POST",
        Method::Head => b"HEAD",
        Method::Patch => b"PATCH",
        Method::Delete => b"DELETE",
        Method::Options => b"OPTIONS",
        Method::Other => b"GET",
    }
}

fn serialize_client_request(request: &ClientRequest) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(method_bytes(request.method));
    out.push(b' ');
    out.extend_from_slice(&request.path);
    out.extend_from_slice(b" HTTP/1.1\r\n");
    out.extend_from_slice(b"host: ");
    out.extend_from_slice(request.host.as_bytes());
    out.extend_from_slice(b"\r\n");
    out.extend_from_slice(b"connection: close\r\n");
    if !request.body.is_empty() {
        out.extend_from_slice(b"content-length: ");
        out.extend_from_slice(request.body.len().to_string().as_bytes());
        out.extend_from_slice(b"\r\n");
    }
    for (name, value) in &request.headers {
        out.extend_from_slice(name);
        out.extend_from_slice(b": ");
        out.extend_from_slice(value);
        out.extend_from_slice(b"\r\n");
    }
    out.extend_from_slice(b"\r\n");
    out.extend_from_slice(&request.body);
    out
}

/// Parses an absolute `http(s)://host[:port]/path` redirect target
/// Relative `Location` values are not
/// supported in this revision; the redirect is simply not followed and
/// the 3xx response is delivered to the callback as-is.
fn parse_location(location: &[u8]) -> Option<(String, u16, bool, Vec<u8>)> {
    let s = std::str::from_utf8(location).ok()?;
    let (tls, rest) = if let Some(rest) = s.strip_prefix("https://") {
        (true, rest)
    } else if let Some(rest) = s.strip_prefix("http://") {
        (false, rest)
    } else {
        return None;
    };

    let (authority, path) = match rest.find('/') {
        Some(pos) => (&rest[..pos], &rest[pos..]),
        None => (rest, "/"),
    };
    let (host, port) = match authority.rsplit_once(':') {
        Some((h, p)) => (h.to_string(), p.parse().ok()?),
        None => (authority.to_string(), if tls { 443 } else { 80 }),
    };
    Some((host, port, tls, path.as_bytes().to_vec()))
}

/// Formats an RFC 1123 `Date` header value from the system clock. No
/// date/time crate is in the dependency tree for this, so the
/// civil-from-days conversion (Howard Hinnant's well-known algorithm) is
/// inlined rather than pulling one in for a single field.
fn format_http_date(now: SystemTime) -> String {
    let secs = now.duration_since(UNIX_EPOCH).unwrap_or_default().as_secs();
    let days = (secs / 86_400) as i64;
    let time_of_day = secs % 86_400;
    let (year, month, day) = civil_from_days(days);
    let weekday = (days + 4).rem_euclid(7) as usize;

    const WEEKDAYS: [&str; 7] = ["Sun", "Mon", "Tue", "Wed", "Thu", "Fri", "Sat"];
    const MONTHS: [&str; 12] = ["Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec"];

    format!(
        "{}, {:02} {} {} {:02}:{:02}:{:02} GMT",
        WEEKDAYS[weekday],
        day,
        MONTHS[(month - 1) as usize],
        year,
        time_of_day / 3600,
        (time_of_day % 3600) / 60,
        time_of_day % 60,
    )
}

/// Days-since-epoch to (year, month, day), proleptic Gregorian calendar.
fn civil_from_days(z: i64) -> (i64, u32, u32) {
    let z = z + 719_468;
    let era = if z >= 0 { z } else { z - 146_096 } / 146_097;
    let doe = (z - era * 146_097) as u64;
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let y = yoe as i64 + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let m = if mp < 10 { mp + 3 } else { mp - 9 } as u32;
    (if m <= 2 { y + 1 } else { y }, m, d)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redirect_action_table_matches_spec() {
        assert_eq!(redirect_action(301), RedirectAction::SameMethod);
        assert_eq!(redirect_action(303), RedirectAction::AsGet);
        assert_eq!(redirect_action(404), RedirectAction::None);
    }

    #[test]
    fn fit_to_length_truncates_and_pads() {
        assert_eq!(fit_to_length(b"hello", 3), b"hel");
        assert_eq!(fit_to_length(b"hi", 4), vec![b'h', b'i', 0, 0]);
        assert_eq!(fit_to_length(b"ok", 2), b"ok");
    }

    #[test]
    fn parses_absolute_redirect_location() {
        let (host, port, tls, path) = parse_location(b"https://example.com:9443/next").unwrap();
        assert_eq!(host, "example.com");
        assert_eq!(port, 9443);
        assert!(tls);
        assert_eq!(path, b"/next");
    }

    #[test]
    fn relative_redirect_location_is_not_followed() {
        assert!(parse_location(b"/just/a/path").is_none());
    }

    #[test]
    fn known_epoch_date_formats_correctly() {
        assert_eq!(format_http_date(UNIX_EPOCH), "Thu, 01 Jan 1970 00:00:00 GMT");
    }

    #[test]
    fn serializes_a_minimal_client_request() {
        let req = ClientRequest::new(Method::Get, "example.com", 80, "/ping".as_bytes().to_vec());
        let wire = serialize_client_request(&req);
        let text = String::from_utf8(wire).unwrap();
        assert!(text.starts_with("GET /ping HTTP/1.1\r\n"));
        assert!(text.contains("host: example.com\r\n"));
        assert!(text.ends_with("\r\n\r\n"));
    }
}
