use reactorhttp::{Handled, Handler, Method, Protect, Reactor, Request, Response, StatusCode};
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

struct CountRequests(Arc<AtomicUsize>);

impl Protect for CountRequests {
    fn protect(&self, _method: Method, _uri: &[u8], _response: &mut Response) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }
}

struct ReportCount(Arc<AtomicUsize>);

impl Handler for ReportCount {
    fn handle(&self, _request: &Request, resp: &mut Response) -> Handled {
        let count = self.0.load(Ordering::Relaxed);
        resp.status(StatusCode::Ok)
            .header(b"content-type", b"application/json")
            .body(format!(r#"{{"count_request": {count}}}"#))
    }
}

fn main() -> std::io::Result<()> {
    env_logger::init();

    let seen = Arc::new(AtomicUsize::new(0));

    let mut reactor = Reactor::builder().open("8080")?;
    reactor.router().protect_route(0, CountRequests(seen.clone()));
    reactor.router().route_exact(b"/count", ReportCount(seen));
    reactor.run()
}
