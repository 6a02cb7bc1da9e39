//! reactorhttp - a single-threaded, event-driven HTTP/1.1 engine for
//! embedding in a larger process rather than running as a standalone
//! server.
//!
//! A [`Reactor`] owns one `mio::Poll` loop, a bounded table of connection
//! slots, and a [`Router`] of handlers. Everything runs on the thread
//! that calls [`Reactor::run`]; there is no worker pool and no async
//! runtime, which is why a [`Handler`] is a plain synchronous function
//! that reads a fully-buffered [`Request`] and writes a [`Response`].
//!
//! # Protocol support
//!
//! - HTTP/1.1, with persistent connections and `Transfer-Encoding: chunked`
//!   request bodies (fully-buffered only; see [`limits::ReqLimits`]).
//! - HTTP/1.0.
//! - A supplemental HTTP/0.9-style path (bare `METHOD /uri`, GET only),
//!   opt-in via [`ReactorBuilder::http09`].
//! - TLS for both the listening socket and outbound client requests, via
//!   [`ReactorBuilder::with_tls`] / [`ClientRequest::tls`].
//!
//! # Quick start
//!
//! ```no_run
//! use reactorhttp::{Handled, Handler, Reactor, Request, Response, StatusCode};
//!
//! struct Hello;
//!
//! impl Handler for Hello {
//!     fn handle(&self, _request: &Request, response: &mut Response) -> Handled {
//!         response.status(StatusCode::Ok).body("hello")
//!     }
//! }
//!
//! let mut reactor = Reactor::builder().open("8080").unwrap();
//! reactor.router().route_exact(b"/hello", Hello);
//! reactor.run().unwrap();
//! ```
//!
//! The same reactor multiplexes outbound requests
//! ([`Reactor::client_request`]) and externally-owned descriptors
//! ([`Reactor::listen_fd`]) on the same poll loop as the listening
//! socket.

pub(crate) mod buffer;
pub(crate) mod catalog;
pub mod cli;
pub(crate) mod client;
pub(crate) mod errors;
pub mod limits;
pub(crate) mod reactor;
pub(crate) mod router;
pub(crate) mod tls;

pub(crate) mod http {
    pub(crate) mod client_response;
    pub(crate) mod query;
    pub(crate) mod request;
    pub(crate) mod response;
    pub(crate) mod types;
}

pub use crate::{
    client::{ClientCallback, ClientOutcome, ClientRequest},
    http::{
        request::Request,
        response::{Handled, Response},
        types::{Method, StatusCode, Url, Version},
    },
    reactor::{Reactor, ReactorBuilder},
    router::{AsyncHandler, Handler, Protect, Router},
};
