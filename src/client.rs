//! Outbound client requests, the client context stack, and the 3xx
//! redirect helper.
//!
//! Libraries in this family often track "the current request" through a
//! thread-local-like global pointer, stashed and restored around a
//! handler's reentrant call into the client API. Nothing here needs
//! that: a [`ClientRequest`] is an ordinary owned value threaded through
//! ordinary parameters, so there is no global to stash. What still needs
//! bounding is how many times a redirect may replace a client slot's
//! context in a row, realized below as [`ClientContext::redirect_depth`]
//! capped at one reissue.

use crate::http::types::{Method, StatusCode};

/// Everything needed to open an outbound connection and send one request.
///
/// Built by a server-side [`Handler`](crate::router::Handler) (or, after
/// a redirect, by the engine itself) and handed to
/// [`Reactor::client_request`](crate::reactor::Reactor::client_request).
#[derive(Debug, Clone)]
pub struct ClientRequest {
    pub method: Method,
    pub host: String,
    pub port: u16,
    pub tls: bool,
    pub path: Vec<u8>,
    pub headers: Vec<(Vec<u8>, Vec<u8>)>,
    pub body: Vec<u8>,
}

impl ClientRequest {
    pub fn new(method: Method, host: impl Into<String>, port: u16, path: impl Into<Vec<u8>>) -> Self {
        Self {
            method,
            host: host.into(),
            port,
            tls: false,
            path: path.into(),
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    pub fn tls(mut self, enabled: bool) -> Self {
        self.tls = enabled;
        self
    }

    pub fn header(mut self, name: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }
}

/// Outcome delivered to a client response callback. The origin request
/// is realized as whatever the callback closure itself captured, rather
/// than a passed-in pointer — the idiomatic Rust equivalent.
#[derive(Debug)]
pub enum ClientOutcome<'a> {
    /// A full response was received.
    Response {
        status: u16,
        status_code: Option<StatusCode>,
        reason: &'a [u8],
        header: &'a dyn Fn(&[u8]) -> Option<&'a [u8]>,
        body: &'a [u8],
    },
    /// The connection failed, timed out, or a TLS handshake could not be
    /// completed; reported as an HTTP 505 to the callback.
    Failed { status: u16 },
}

/// Boxed callback stored on a client-role slot. `FnMut` rather than `Fn`
/// since a typical caller closes over a counter or a one-shot channel.
pub type ClientCallback = Box<dyn FnMut(ClientOutcome<'_>) + Send>;

/// Per-slot client-role bookkeeping: the method the exchange started
/// with (redirects reissue with it per the table below), the callback to
/// fire on completion, and how many times a redirect has already
/// replaced this context.
pub(crate) struct ClientContext {
    pub(crate) origin_method: Method,
    pub(crate) callback: ClientCallback,
    pub(crate) redirect_depth: u8,
}

impl ClientContext {
    pub(crate) fn new(method: Method, callback: ClientCallback) -> Self {
        Self {
            origin_method: method,
            callback,
            redirect_depth: 0,
        }
    }
}

/// What a 3xx/4xx/5xx client response resolves to, per the redirect
/// helper table below.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RedirectAction {
    /// Reissue with the original method (301, 302, 307, 308).
    SameMethod,
    /// Reissue as GET regardless of the original method (303).
    AsGet,
    /// Not a redirect status; deliver the response as-is.
    None,
}

/// Classifies a response status for the redirect helper. Only the 3xx
/// class can redirect; everything else (including the 4xx/5xx handler
/// error path, which the engine handles separately) passes through
/// unchanged.
pub(crate) fn redirect_action(status: u16) -> RedirectAction {
    match status {
        301 | 302 | 307 | 308 => RedirectAction::SameMethod,
        303 => RedirectAction::AsGet,
        _ => RedirectAction::None,
    }
}

/// Maximum number of times a single client exchange may be redirected
/// before the engine gives up and delivers the redirect response itself:
/// one outbound request, one reissue.
pub(crate) const MAX_REDIRECTS: u8 = 1;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redirect_table_matches_spec() {
        assert_eq!(redirect_action(301), RedirectAction::SameMethod);
        assert_eq!(redirect_action(302), RedirectAction::SameMethod);
        assert_eq!(redirect_action(307), RedirectAction::SameMethod);
        assert_eq!(redirect_action(308), RedirectAction::SameMethod);
        assert_eq!(redirect_action(303), RedirectAction::AsGet);
    }

    #[test]
    fn non_redirect_status_passes_through() {
        assert_eq!(redirect_action(200), RedirectAction::None);
        assert_eq!(redirect_action(404), RedirectAction::None);
        assert_eq!(redirect_action(500), RedirectAction::None);
        assert_eq!(redirect_action(304), RedirectAction::None);
    }

    #[test]
    fn client_request_builder_defaults() {
        let req = ClientRequest::new(Method::Get, "example.com", 443, &b"/path"[..]);
        assert_eq!(req.host, "example.com");
        assert_eq!(req.port, 443);
        assert!(!req.tls);
        assert!(req.headers.is_empty());
        assert!(req.body.is_empty());

        let req = req.tls(true).header("X-Tag", "1").body("hi");
        assert!(req.tls);
        assert_eq!(req.headers, vec![(b"X-Tag".to_vec(), b"1".to_vec())]);
        assert_eq!(req.body, b"hi");
    }

    #[test]
    fn context_starts_at_redirect_depth_zero() {
        let ctx = ClientContext::new(Method::Get, Box::new(|_| {}));
        assert_eq!(ctx.redirect_depth, 0);
        assert_eq!(ctx.origin_method, Method::Get);
    }
}
