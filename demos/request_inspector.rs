use reactorhttp::{Handled, Handler, Reactor, Request, Response, StatusCode};
use std::str::from_utf8;

struct RequestInspector;

impl Handler for RequestInspector {
    fn handle(&self, req: &Request, resp: &mut Response) -> Handled {
        let user_agent = if let Some(value) = req.header(b"user-agent") {
            format!(r#", "user_agent": {:?}"#, from_utf8(value).unwrap_or(""))
        } else {
            String::new()
        };

        let content_type = if let Some(value) = req.header(b"content-type") {
            format!(r#", "content_type": {:?}"#, from_utf8(value).unwrap_or(""))
        } else {
            String::new()
        };

        let result = format!(
            r#"{{"method": "{:?}", "path": {:?}{user_agent}{content_type}, "body": {:?}}}"#,
            req.method(),
            from_utf8(req.url().path()).unwrap_or(""),
            from_utf8(req.body().unwrap_or(&[])).unwrap_or(""),
        );

        resp.status(StatusCode::Ok).header(b"content-type", b"application/json").body(result)
    }
}

fn main() -> std::io::Result<()> {
    env_logger::init();

    let mut reactor = Reactor::builder().open("8080")?;
    reactor.router().route_prefix(b"/", RequestInspector);
    reactor.run()
}
