use reactorhttp::{Handled, Handler, Reactor, Request, Response, StatusCode};

struct HelloWorld;

impl Handler for HelloWorld {
    fn handle(&self, _request: &Request, resp: &mut Response) -> Handled {
        resp.status(StatusCode::Ok).header(b"content-type", b"text/plain").body("Hello, world!")
    }
}

fn main() -> std::io::Result<()> {
    env_logger::init();

    let mut reactor = Reactor::builder().open("8080")?;
    reactor.router().route_exact(b"/hello", HelloWorld);
    reactor.run()
}
