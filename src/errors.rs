use crate::Version;
use std::{error, fmt, io};

/// Closed set of failures the engine can discover on its own, without a
/// handler ever running. Handler-signaled status codes (4xx/5xx/3xx set
/// through the [`Response`](crate::Response) builder) are not represented
/// here — they travel through the ordinary response path: errors
/// discovered by handlers are expressed through the status-setting API,
/// not by unwinding.
#[derive(Debug, PartialEq)]
pub(crate) enum ErrorKind {
    /// The request line did not split into exactly method/URI/version.
    InvalidRequestLine,
    InvalidMethod,

    InvalidUrl,
    /// URI contained `..`; the path-traversal guard fired.
    PathTraversal,

    InvalidVersion,
    UnsupportedVersion,

    InvalidHeader,
    TooManyHeaders,
    InvalidContentLength,
    InvalidConnection,
    /// `Transfer-Encoding` present but not `chunked`.
    UnsupportedTransferEncoding,

    BodyTooLarge,
    #[allow(dead_code)]
    BodyMismatch { expected: usize, available: usize },

    /// No route matched (exact, then successively-stripped prefix, then `/`).
    NotFound,

    /// Route table, slot table, or a catalog is at capacity; the engine
    /// logs and degrades rather than panicking.
    ResourceExhausted,
    /// Connection-level I/O failure or an unrecoverable TLS failure;
    /// resolves a pending client response with 505.
    Io(IoError),
    Tls(TlsError),
}

macro_rules! http_errors {
    ($($name:ident: $status_code:expr, $len:literal => $json:literal; )*) => {
        pub(crate) const fn as_http(
            &self,
            version: Version,
            json: bool,
        ) -> &'static [u8] {
            match (json, self, version) { $(
                (true, Self::$name { .. }, Version::Http11) => concat!(
                    "HTTP/1.1 ", $status_code, "\r\n",
                    "connection: close\r\n",
                    "content-length: ", $len, "\r\n",
                    "content-type: application/json\r\n",
                    "\r\n",
                    $json
                ),
                (false, Self::$name { .. }, Version::Http11) => concat!(
                    "HTTP/1.1 ", $status_code, "\r\n",
                    "connection: close\r\n",
                    "content-length: 0\r\n\r\n",
                ),
                (true, Self::$name { .. }, Version::Http10) => concat!(
                    "HTTP/1.0 ", $status_code, "\r\n",
                    "connection: close\r\n",
                    "content-length: ", $len, "\r\n",
                    "content-type: application/json\r\n",
                    "\r\n",
                    $json
                ),
                (false, Self::$name { .. }, Version::Http10) => concat!(
                    "HTTP/1.0 ", $status_code, "\r\n",
                    "connection: close\r\n",
                    "content-length: 0\r\n\r\n",
                ),
                (_, Self::$name { .. }, Version::Http09) => concat!(
                    "ERROR: ", stringify!($status_code)
                ),
            )* }.as_bytes()
        }
    };
}

impl ErrorKind {
    http_errors! {
        InvalidRequestLine: "406 Invalid Request Line", "62"
            => r#"{"error":"Invalid request line","code":"INVALID_REQUEST_LINE"}"#;
        InvalidMethod: "400 Bad Request", "55"
            => r#"{"error":"Invalid HTTP method","code":"INVALID_METHOD"}"#;

        InvalidUrl: "400 Bad Request", "51"
            => r#"{"error":"Invalid URL format","code":"INVALID_URL"}"#;
        PathTraversal: "400 Bad Request", "59"
            => r#"{"error":"Path traversal rejected","code":"PATH_TRAVERSAL"}"#;

        InvalidVersion: "400 Bad Request", "57"
            => r#"{"error":"Invalid HTTP version","code":"INVALID_VERSION"}"#;
        UnsupportedVersion: "505 HTTP Version Not Supported", "67"
            => r#"{"error":"HTTP version not supported","code":"UNSUPPORTED_VERSION"}"#;

        InvalidHeader: "400 Bad Request", "57"
            => r#"{"error":"Invalid header format","code":"INVALID_HEADER"}"#;
        TooManyHeaders: "431 Request Header Fields Too Large", "54"
            => r#"{"error":"Too many headers","code":"TOO_MANY_HEADERS"}"#;
        InvalidContentLength: "400 Bad Request", "66"
            => r#"{"error":"Invalid Content-Length","code":"INVALID_CONTENT_LENGTH"}"#;
        InvalidConnection: "400 Bad Request", "65"
            => r#"{"error":"Invalid Connection header","code":"INVALID_CONNECTION"}"#;
        UnsupportedTransferEncoding: "400 Bad Request", "71"
            => r#"{"error":"Unsupported transfer encoding","code":"UNSUPPORTED_ENCODING"}"#;

        BodyTooLarge: "413 Payload Too Large", "58"
            => r#"{"error":"Request body too large","code":"BODY_TOO_LARGE"}"#;
        BodyMismatch: "400 Bad Request", "55"
            => r#"{"error":"Body length mismatch","code":"BODY_MISMATCH"}"#;

        NotFound: "404 Not found", "48"
            => r#"{"error":"No matching route","code":"NOT_FOUND"}"#;

        ResourceExhausted: "503 Service Unavailable", "66"
            => r#"{"error":"Server resources exhausted","code":"RESOURCE_EXHAUSTED"}"#;
        Io: "505 HTTP Version Not Supported", "48"
            => r#"{"error":"I/O error occurred","code":"IO_ERROR"}"#;
        Tls: "505 HTTP Version Not Supported", "49"
            => r#"{"error":"TLS error occurred","code":"TLS_ERROR"}"#;
    }
}

impl error::Error for ErrorKind {}
impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl From<io::Error> for ErrorKind {
    fn from(err: io::Error) -> Self {
        ErrorKind::Io(IoError(err))
    }
}
impl From<rustls::Error> for ErrorKind {
    fn from(err: rustls::Error) -> Self {
        ErrorKind::Tls(TlsError(err.to_string()))
    }
}

#[derive(Debug)]
pub(crate) struct IoError(pub(crate) io::Error);

impl PartialEq for IoError {
    fn eq(&self, other: &Self) -> bool {
        self.0.kind() == other.0.kind()
    }
}

#[derive(Debug)]
pub(crate) struct TlsError(pub(crate) String);

impl PartialEq for TlsError {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body_of(preamble: &[u8]) -> &[u8] {
        let split = preamble
            .windows(4)
            .position(|w| w == b"\r\n\r\n")
            .expect("preamble has a header/body split");
        &preamble[split + 4..]
    }

    fn declared_length(preamble: &[u8]) -> usize {
        let text = std::str::from_utf8(preamble).unwrap();
        let line = text
            .lines()
            .find(|l| l.to_ascii_lowercase().starts_with("content-length:"))
            .expect("a content-length header");
        line.split(':').nth(1).unwrap().trim().parse().unwrap()
    }

    #[test]
    fn json_content_length_matches_body_for_every_variant() {
        let variants = [
            ErrorKind::InvalidRequestLine,
            ErrorKind::InvalidMethod,
            ErrorKind::InvalidUrl,
            ErrorKind::PathTraversal,
            ErrorKind::InvalidVersion,
            ErrorKind::UnsupportedVersion,
            ErrorKind::InvalidHeader,
            ErrorKind::TooManyHeaders,
            ErrorKind::InvalidContentLength,
            ErrorKind::InvalidConnection,
            ErrorKind::UnsupportedTransferEncoding,
            ErrorKind::BodyTooLarge,
            ErrorKind::BodyMismatch {
                expected: 0,
                available: 0,
            },
            ErrorKind::NotFound,
            ErrorKind::ResourceExhausted,
            ErrorKind::Io(IoError(io::Error::new(io::ErrorKind::Other, "x"))),
            ErrorKind::Tls(TlsError("x".into())),
        ];

        for kind in variants {
            for version in [Version::Http11, Version::Http10] {
                let preamble = kind.as_http(version, true);
                assert_eq!(
                    body_of(preamble).len(),
                    declared_length(preamble),
                    "{kind:?} {version:?}: content-length does not match body"
                );
            }
        }
    }
}
