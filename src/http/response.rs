//! The response builder handed to handlers and protect callbacks.
//!
//! Wire serialization — status line, `Connection`, `Date`,
//! `Content-Length`, queued chunks, and any file transfer — is the
//! protocol engine's job, and it must preserve that wire ordering; this
//! type only accumulates what a single callback invocation decided.

use crate::{catalog::Catalog, http::types::StatusCode};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ResponseState {
    /// No status set yet; this is the state every route enters with.
    Clean,
    /// Status (and possibly headers) set, body not yet provided.
    Headers,
    /// `body`/`body_with` was called; no further mutation is allowed.
    Complete,
}

/// Sentinel returned by [`Response::body`] / [`Response::body_with`].
///
/// Its only purpose is to be the one value a [`Handler`](crate::Handler)
/// can return, so the type system — not a convention — enforces that a
/// handler always finishes the response it was given: a body, or
/// explicitly none.
#[derive(Debug)]
pub struct Handled(());

/// Per-request response builder.
///
/// State progresses `Clean -> Headers -> Complete` and never backwards;
/// misuse (adding headers after `body`, building with no status set) is
/// a programmer error caught by `debug_assert!`, not a recoverable
/// runtime condition — network input can never reach this path.
#[derive(Debug)]
pub struct Response {
    state: ResponseState,
    status: StatusCode,
    headers: Catalog,
    body: Vec<u8>,
    content_length_override: Option<usize>,
    close: bool,
}

impl Response {
    pub(crate) fn new(header_capacity: usize, body_capacity: usize) -> Self {
        Self {
            state: ResponseState::Clean,
            status: StatusCode::Ok,
            headers: Catalog::new(header_capacity),
            body: Vec::with_capacity(body_capacity),
            content_length_override: None,
            close: false,
        }
    }

    pub(crate) fn reset(&mut self) {
        self.state = ResponseState::Clean;
        self.status = StatusCode::Ok;
        self.headers.clear();
        self.body.clear();
        self.content_length_override = None;
        self.close = false;
    }
}

impl Response {
    /// Sets the status code. Safe to call more than once (e.g. a
    /// protect callback setting 401, later overwritten by an error path);
    /// the last call before `body`/`body_with` wins.
    #[track_caller]
    pub fn status(&mut self, status: StatusCode) -> &mut Self {
        debug_assert!(
            self.state != ResponseState::Complete,
            "status() called after the response was already completed"
        );
        self.status = status;
        if self.state == ResponseState::Clean {
            self.state = ResponseState::Headers;
        }
        self
    }

    /// Appends an outgoing header attribute. Headers serialize in
    /// insertion order after the mandatory `Connection`/`Date`/
    /// `Content-Length` triad.
    #[track_caller]
    pub fn header(&mut self, name: &'static [u8], value: &'static [u8]) -> &mut Self {
        debug_assert!(
            self.state != ResponseState::Complete,
            "header() called after the response was already completed"
        );
        self.headers.insert(name, value);
        self
    }

    /// Appends several headers in one call.
    pub fn header_multi(&mut self, pairs: &[(&'static [u8], &'static [u8])]) -> &mut Self {
        for &(name, value) in pairs {
            self.header(name, value);
        }
        self
    }

    /// Overrides the `Content-Length` the engine will write, independent
    /// of the body this callback ultimately returns. Per the design
    /// note on `echttp_content_length`, when set this value is
    /// authoritative: the engine truncates or zero-pads the body to
    /// match it rather than trusting the body's own length.
    pub fn content_length(&mut self, n: usize) -> &mut Self {
        self.content_length_override = Some(n);
        self
    }

    /// Forces `Connection: close` even on an HTTP/1.1 keep-alive request.
    pub fn close(&mut self) -> &mut Self {
        self.close = true;
        self
    }

    /// Finalizes the response with `body` as the entity. Returns
    /// [`Handled`], which is the only value a [`Handler`](crate::Handler)
    /// can return — so a handler cannot forget to set a body.
    #[track_caller]
    pub fn body(&mut self, body: impl Into<Vec<u8>>) -> Handled {
        debug_assert!(
            self.state != ResponseState::Complete,
            "body() called twice on the same response"
        );
        self.body = body.into();
        self.state = ResponseState::Complete;
        Handled(())
    }

    /// Finalizes the response by writing directly into the body buffer,
    /// avoiding an intermediate allocation for handlers that build up
    /// output incrementally (e.g. JSON serializers).
    #[track_caller]
    pub fn body_with(&mut self, f: impl FnOnce(&mut Vec<u8>)) -> Handled {
        debug_assert!(
            self.state != ResponseState::Complete,
            "body_with() called twice on the same response"
        );
        f(&mut self.body);
        self.state = ResponseState::Complete;
        Handled(())
    }
}

// Engine-facing accessors.
impl Response {
    pub(crate) fn status_code(&self) -> StatusCode {
        self.status
    }

    pub(crate) fn headers_iter(&self) -> impl Iterator<Item = (&[u8], &[u8])> {
        self.headers.iter()
    }

    pub(crate) fn body_bytes(&self) -> &[u8] {
        &self.body
    }

    pub(crate) fn content_length_override(&self) -> Option<usize> {
        self.content_length_override
    }

    pub(crate) fn wants_close(&self) -> bool {
        self.close
    }

    pub(crate) fn is_complete(&self) -> bool {
        self.state == ResponseState::Complete
    }

    pub(crate) fn is_clean(&self) -> bool {
        self.state == ResponseState::Clean
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn body_completes_response() {
        let mut resp = Response::new(8, 64);
        assert!(resp.is_clean());
        resp.status(StatusCode::Ok).header(b"x-a", b"1").body("hi");
        assert!(resp.is_complete());
        assert_eq!(resp.body_bytes(), b"hi");
        assert_eq!(resp.headers_iter().count(), 1);
    }

    #[test]
    fn content_length_override_is_independent_of_body() {
        let mut resp = Response::new(8, 64);
        resp.content_length(5).body("ab");
        assert_eq!(resp.content_length_override(), Some(5));
        assert_eq!(resp.body_bytes(), b"ab");
    }

    #[test]
    fn reset_returns_to_clean() {
        let mut resp = Response::new(8, 64);
        resp.status(StatusCode::NotFound).body(Vec::new());
        resp.reset();
        assert!(resp.is_clean());
        assert_eq!(resp.status_code(), StatusCode::Ok);
        assert_eq!(resp.headers_iter().count(), 0);
    }

    #[test]
    #[should_panic]
    fn body_twice_panics_in_debug() {
        let mut resp = Response::new(8, 64);
        resp.body(Vec::new());
        resp.body(Vec::new());
    }
}
