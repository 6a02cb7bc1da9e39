use reactorhttp::{Handled, Handler, Reactor, Request, Response, StatusCode};
use std::str::from_utf8;

struct Echo;

impl Handler for Echo {
    fn handle(&self, req: &Request, resp: &mut Response) -> Handled {
        let name = req.query(b"name").and_then(|v| from_utf8(v).ok()).unwrap_or("world");

        let result = format!(
            r#"{{"url": {:?}, "name": {:?}, "body": {:?}}}"#,
            from_utf8(req.url().path()).unwrap_or(""),
            name,
            from_utf8(req.body().unwrap_or(&[])).unwrap_or(""),
        );

        resp.status(StatusCode::Ok).header(b"content-type", b"application/json").body(result)
    }
}

fn main() -> std::io::Result<()> {
    env_logger::init();

    let mut reactor = Reactor::builder().open("8080")?;
    reactor.router().route_prefix(b"/", Echo);
    reactor.run()
}
