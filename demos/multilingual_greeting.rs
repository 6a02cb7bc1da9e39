use reactorhttp::{Handled, Handler, Reactor, Request, Response, StatusCode};

struct Greeting;

impl Handler for Greeting {
    fn handle(&self, req: &Request, resp: &mut Response) -> Handled {
        let text = match req.url().path_segments() {
            [b"api", b"en"] => r#"{"lang": "en", "text": "Hello, world!"}"#,
            [b"api", b"zh"] => r#"{"lang": "zh", "text": "你好世界！"}"#,
            [b"api", b"es"] => r#"{"lang": "es", "text": "¡Hola Mundo!"}"#,
            [b"api", b"ar"] => r#"{"lang": "ar", "text": "مرحبا بالعالم!"}"#,
            [b"api", b"pt"] => r#"{"lang": "pt", "text": "Olá, mundo!"}"#,
            [b"api", b"hi"] => r#"{"lang": "hi", "text": "हैलो वर्ल्ड!"}"#,
            [b"api", b"ru"] => r#"{"lang": "ru", "text": "Привет, мир!"}"#,

            [b"api", _] => {
                return resp
                    .status(StatusCode::NotFound)
                    .header(b"content-type", b"application/json")
                    .body(r#"{"error": "Language not supported", "status": "Not Found"}"#)
            }
            _ => r#"{"supported_lang": ["en", "zh", "es", "ar", "pt", "hi", "ru"]}"#,
        };

        resp.status(StatusCode::Ok).header(b"content-type", b"application/json").body(text)
    }
}

fn main() -> std::io::Result<()> {
    env_logger::init();

    let mut reactor = Reactor::builder().open("8080")?;
    reactor.router().route_prefix(b"/", Greeting);
    reactor.router().route_prefix(b"/api", Greeting);
    reactor.run()
}
