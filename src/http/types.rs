#![allow(rustdoc::bare_urls)]

//! Core HTTP protocol types: methods, versions, status codes and the
//! parsed URL representation. Header and query-parameter storage lives
//! in [`crate::catalog`].

use crate::errors::ErrorKind;

// TO LOWER CASE

#[rustfmt::skip]
const ASCII_TABLE: [u8; 256] = [
    //   x0    x1    x2    x3    x4    x5    x6    x7    x8    x9    xA    xB    xC    xD    xE    xF
    0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0A, 0x0B, 0x0C, 0x0D, 0x0E, 0x0F, // 0x
    0x10, 0x11, 0x12, 0x13, 0x14, 0x15, 0x16, 0x17, 0x18, 0x19, 0x1A, 0x1B, 0x1C, 0x1D, 0x1E, 0x1F, // 1x
    0x20, 0x21, 0x22, 0x23, 0x24, 0x25, 0x26, 0x27, 0x28, 0x29, 0x2A, 0x2B, 0x2C, 0x2D, 0x2E, 0x2F, // 2x
    0x30, 0x31, 0x32, 0x33, 0x34, 0x35, 0x36, 0x37, 0x38, 0x39, 0x3A, 0x3B, 0x3C, 0x3D, 0x3E, 0x3F, // 3x
    0x40, b'a', b'b', b'c', b'd', b'e', b'f', b'g', b'h', b'i', b'j', b'k', b'l', b'm', b'n', b'o', // 4x
    b'p', b'q', b'r', b's', b't', b'u', b'v', b'w', b'x', b'y', b'z', 0x5B, 0x5C, 0x5D, 0x5E, 0x5F, // 5x
    0x60, b'a', b'b', b'c', b'd', b'e', b'f', b'g', b'h', b'i', b'j', b'k', b'l', b'm', b'n', b'o', // 6x
    b'p', b'q', b'r', b's', b't', b'u', b'v', b'w', b'x', b'y', b'z', 0x7B, 0x7C, 0x7D, 0x7E, 0x7F, // 7x
    0x80, 0x81, 0x82, 0x83, 0x84, 0x85, 0x86, 0x87, 0x88, 0x89, 0x8A, 0x8B, 0x8C, 0x8D, 0x8E, 0x8F, // 8x
    0x90, 0x91, 0x92, 0x93, 0x94, 0x95, 0x96, 0x97, 0x98, 0x99, 0x9A, 0x9B, 0x9C, 0x9D, 0x9E, 0x9F, // 9x
    0xA0, 0xA1, 0xA2, 0xA3, 0xA4, 0xA5, 0xA6, 0xA7, 0xA8, 0xA9, 0xAA, 0xAB, 0xAC, 0xAD, 0xAE, 0xAF, // Ax
    0xB0, 0xB1, 0xB2, 0xB3, 0xB4, 0xB5, 0xB6, 0xB7, 0xB8, 0xB9, 0xBA, 0xBB, 0xBC, 0xBD, 0xBE, 0xBF, // Bx
    0xC0, 0xC1, 0xC2, 0xC3, 0xC4, 0xC5, 0xC6, 0xC7, 0xC8, 0xC9, 0xCA, 0xCB, 0xCC, 0xCD, 0xCE, 0xCF, // Cx
    0xD0, 0xD1, 0xD2, 0xD3, 0xD4, 0xD5, 0xD6, 0xD7, 0xD8, 0xD9, 0xDA, 0xDB, 0xDC, 0xDD, 0xDE, 0xDF, // Dx
    0xE0, 0xE1, 0xE2, 0xE3, 0xE4, 0xE5, 0xE6, 0xE7, 0xE8, 0xE9, 0xEA, 0xEB, 0xEC, 0xED, 0xEE, 0xEF, // Ex
    0xF0, 0xF1, 0xF2, 0xF3, 0xF4, 0xF5, 0xF6, 0xF7, 0xF8, 0xF9, 0xFA, 0xFB, 0xFC, 0xFD, 0xFE, 0xFF, // Fx
];

#[inline(always)]
pub(crate) fn to_lower_case(src: &mut [u8]) {
    for byte in src.iter_mut() {
        *byte = ASCII_TABLE[*byte as usize];
    }
}

#[inline(always)]
pub(crate) fn into_lower_case(src: &[u8], result: &mut [u8]) -> usize {
    let len = src.len().min(result.len());
    for i in 0..len {
        result[i] = ASCII_TABLE[src[i] as usize];
    }
    len
}

#[inline(always)]
pub(crate) fn slice_to_usize(bytes: &[u8]) -> Option<usize> {
    let mut result: usize = 0;

    for &byte in bytes {
        if !byte.is_ascii_digit() {
            return None;
        }

        result = result
            .checked_mul(10)?
            .checked_add((byte - b'0') as usize)?;
    }

    Some(result)
}

// METHOD

/// HTTP request method.
///
/// Unlike a fixed enum-only design, the wire format allows any token up
/// to [`method_size`](crate::limits::ReqLimits::method_size) bytes — the
/// data model specifies "current method (≤63 bytes)" without restricting
/// it to a closed set, mirroring the original library's lack of a method
/// allowlist. Common RFC 7231 / RFC 5789 methods get a named variant for
/// ergonomic matching; anything else classifies as [`Method::Other`],
/// whose exact bytes the caller recovers from [`Request::method_bytes`](crate::Request::method_bytes).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Method {
    /// [[RFC7231 §4.3.1](https://tools.ietf.org/html/rfc7231#section-4.3.1)]
    Get,
    /// [[RFC7231 §4.3.4](https://tools.ietf.org/html/rfc7231#section-4.3.4)]
    Put,
    /// [[RFC7231 §4.3.3](https://tools.ietf.org/html/rfc7231#section-4.3.3)]
    Post,
    /// [[RFC7231 §4.3.2](https://tools.ietf.org/html/rfc7231#section-4.3.2)]
    Head,
    /// [[RFC5789 §2](https://tools.ietf.org/html/rfc5789#section-2)]
    Patch,
    /// [[RFC7231 §4.3.5](https://tools.ietf.org/html/rfc7231#section-4.3.5)]
    Delete,
    /// [[RFC7231 §4.3.7](https://tools.ietf.org/html/rfc7231#section-4.3.7)]
    Options,
    /// An extension or otherwise unrecognized method token.
    Other,
}

impl Method {
    /// Classifies a method token already isolated by the request-line
    /// splitter. Never fails: anything outside the known set is `Other`.
    #[inline(always)]
    pub(crate) fn classify(src: &[u8]) -> Self {
        match src {
            b"GET" => Method::Get,
            b"PUT" => Method::Put,
            b"POST" => Method::Post,
            b"HEAD" => Method::Head,
            b"PATCH" => Method::Patch,
            b"DELETE" => Method::Delete,
            b"OPTIONS" => Method::Options,
            _ => Method::Other,
        }
    }
}

// VERSION

/// HTTP protocol version.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Version {
    /// Bare `METHOD /uri` request line, no headers, raw response body.
    /// Supplemental compatibility path, see the crate's top-level docs.
    Http09,
    /// [RFC 1945](https://tools.ietf.org/html/rfc1945)
    Http10,
    /// [RFC 7230](https://tools.ietf.org/html/rfc7230) and related.
    Http11,
}

impl Version {
    #[inline(always)]
    pub(crate) const fn from_bytes(src: &[u8]) -> Result<(Self, bool), ErrorKind> {
        match src {
            b"HTTP/1.1" => Ok((Self::Http11, true)),
            b"HTTP/1.0" => Ok((Self::Http10, false)),
            _ => Err(ErrorKind::UnsupportedVersion),
        }
    }
}

// STATUS_CODE

macro_rules! set_status_codes {
    ($(
        $(#[$docs:meta])+
        $name:ident = ($num:expr, $str:expr);
    )+) => {
        /// HTTP status codes, [RFC 9110 §15](https://datatracker.ietf.org/doc/html/rfc9110#section-15) and related.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum StatusCode { $(
            #[doc = concat!(stringify!($num), " ", $str)]
            $(#[$docs])+
            $name = $num,
        )+ }

        impl StatusCode {
            #[inline]
            pub(crate) const fn into_first_line(&self, version: Version) -> &'static [u8] {
                match (self, version) { $(
                    (StatusCode::$name, Version::Http11) => {
                        concat!("HTTP/1.1 ", $num, " ", $str, "\r\n").as_bytes()
                    },
                    (StatusCode::$name, Version::Http10) => {
                        concat!("HTTP/1.0 ", $num, " ", $str, "\r\n").as_bytes()
                    },
                    (StatusCode::$name, Version::Http09) => {
                        concat!(" ", $num, " ", $str, "\r\n").as_bytes()
                    },
                )+ }
            }

            /// Numeric class: 1xx-5xx bucket this status falls into.
            #[inline]
            pub const fn class(&self) -> u16 {
                (*self as u16) / 100
            }

            #[inline]
            pub(crate) const fn as_u16_bytes(&self) -> &[u8] {
                match self { $(
                    StatusCode::$name => concat!(" ", $num, " ").as_bytes(),
                )+ }
            }

            /// Recovers a named status from its wire number, for responses
            /// this runtime receives rather than produces (the client role,
            /// parsing someone else's status line). Codes outside the named
            /// set (e.g. `204`'s siblings, vendor extensions) have no
            /// variant and return `None`; callers needing the raw number
            /// regardless of recognition read it off the response directly.
            #[inline]
            pub const fn from_u16(code: u16) -> Option<Self> {
                match code { $(
                    $num => Some(StatusCode::$name),
                )+
                    _ => None,
                }
            }
        }
    }
}

set_status_codes! {
    /// [[RFC9110, Section 15.2.1](https://datatracker.ietf.org/doc/html/rfc9110#section-15.2.1)]
    Continue = (100, "Continue");
    /// [[RFC9110, Section 15.2.2](https://datatracker.ietf.org/doc/html/rfc9110#section-15.2.2)]
    SwitchingProtocols = (101, "Switching Protocols");

    /// [[RFC9110, Section 15.3.1](https://datatracker.ietf.org/doc/html/rfc9110#section-15.3.1)]
    Ok = (200, "OK");
    /// [[RFC9110, Section 15.3.2](https://datatracker.ietf.org/doc/html/rfc9110#section-15.3.2)]
    Created = (201, "Created");
    /// [[RFC9110, Section 15.3.3](https://datatracker.ietf.org/doc/html/rfc9110#section-15.3.3)]
    Accepted = (202, "Accepted");
    /// [[RFC9110, Section 15.3.5](https://datatracker.ietf.org/doc/html/rfc9110#section-15.3.5)]
    NoContent = (204, "No Content");
    /// [[RFC9110, Section 15.3.7](https://datatracker.ietf.org/doc/html/rfc9110#section-15.3.7)]
    PartialContent = (206, "Partial Content");

    /// [[RFC9110, Section 15.4.2](https://datatracker.ietf.org/doc/html/rfc9110#section-15.4.2)]
    MovedPermanently = (301, "Moved Permanently");
    /// [[RFC9110, Section 15.4.3](https://datatracker.ietf.org/doc/html/rfc9110#section-15.4.3)]
    Found = (302, "Found");
    /// [[RFC9110, Section 15.4.4](https://datatracker.ietf.org/doc/html/rfc9110#section-15.4.4)]
    SeeOther = (303, "See Other");
    /// [[RFC9110, Section 15.4.5](https://datatracker.ietf.org/doc/html/rfc9110#section-15.4.5)]
    NotModified = (304, "Not Modified");
    /// [[RFC9110, Section 15.4.7](https://datatracker.ietf.org/doc/html/rfc9110#section-15.4.7)]
    TemporaryRedirect = (307, "Temporary Redirect");
    /// [[RFC9110, Section 15.4.8](https://datatracker.ietf.org/doc/html/rfc9110#section-15.4.8)]
    PermanentRedirect = (308, "Permanent Redirect");

    /// [[RFC9110, Section 15.5.1](https://datatracker.ietf.org/doc/html/rfc9110#section-15.5.1)]
    BadRequest = (400, "Bad Request");
    /// [[RFC9110, Section 15.5.2](https://datatracker.ietf.org/doc/html/rfc9110#section-15.5.2)]
    Unauthorized = (401, "Unauthorized");
    /// [[RFC9110, Section 15.5.4](https://datatracker.ietf.org/doc/html/rfc9110#section-15.5.4)]
    Forbidden = (403, "Forbidden");
    /// Spelled "Not found" (lower-case `f`) to match this runtime's canned body.
    NotFound = (404, "Not found");
    /// [[RFC9110, Section 15.5.6](https://datatracker.ietf.org/doc/html/rfc9110#section-15.5.6)]
    MethodNotAllowed = (405, "Method Not Allowed");
    /// Repurposed by this runtime for a malformed request line.
    NotAcceptable = (406, "Invalid Request Line");
    /// [[RFC9110, Section 15.5.10](https://datatracker.ietf.org/doc/html/rfc9110#section-15.5.10)]
    Conflict = (409, "Conflict");
    /// [[RFC9110, Section 15.5.14](https://datatracker.ietf.org/doc/html/rfc9110#section-15.5.14)]
    PayloadTooLarge = (413, "Payload Too Large");
    /// [[RFC9110, Section 15.5.15](https://datatracker.ietf.org/doc/html/rfc9110#section-15.5.15)]
    UriTooLong = (414, "URI Too Long");
    /// [[RFC6585, Section 5](https://datatracker.ietf.org/doc/html/rfc6585#section-5)]
    TooManyRequests = (429, "Too Many Requests");
    /// [[RFC6585, Section 5](https://datatracker.ietf.org/doc/html/rfc6585#section-5)]
    RequestHeaderFieldsTooLarge = (431, "Request Header Fields Too Large");

    /// [[RFC9110, Section 15.6.1](https://datatracker.ietf.org/doc/html/rfc9110#section-15.6.1)]
    InternalServerError = (500, "Internal Server Error");
    /// [[RFC9110, Section 15.6.2](https://datatracker.ietf.org/doc/html/rfc9110#section-15.6.2)]
    NotImplemented = (501, "Not Implemented");
    /// [[RFC9110, Section 15.6.3](https://datatracker.ietf.org/doc/html/rfc9110#section-15.6.3)]
    BadGateway = (502, "Bad Gateway");
    /// [[RFC9110, Section 15.6.4](https://datatracker.ietf.org/doc/html/rfc9110#section-15.6.4)]
    ServiceUnavailable = (503, "Service Unavailable");
    /// [[RFC9110, Section 15.6.6](https://datatracker.ietf.org/doc/html/rfc9110#section-15.6.6)]
    HttpVersionNotSupported = (505, "HTTP Version Not Supported");
}

// Url

/// A parsed URL: target (path + query), path alone, `/`-split segments,
/// and decoded query parameters.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct Url {
    pub(crate) target: &'static [u8],
    pub(crate) path: &'static [u8],
    pub(crate) parts: Vec<&'static [u8]>,
    pub(crate) query: Option<&'static [u8]>,
}

impl Url {
    #[inline(always)]
    pub(crate) fn new(parts_capacity: usize) -> Self {
        Self {
            target: b"",
            path: b"",
            parts: Vec::with_capacity(parts_capacity),
            query: None,
        }
    }

    #[inline(always)]
    pub(crate) fn clear(&mut self) {
        self.target = b"";
        self.path = b"";
        self.parts.clear();
        self.query = None;
    }
}

impl Url {
    /// Raw request target: path and query string, exactly as it appeared
    /// on the request line (after percent-decoding).
    #[inline(always)]
    pub const fn target(&self) -> &[u8] {
        self.target
    }

    /// Path component, without the query string.
    #[inline(always)]
    pub const fn path(&self) -> &[u8] {
        self.path
    }

    /// The `/`-delimited segment at `index`, or `None` past the end.
    #[inline(always)]
    pub fn path_segment(&self, index: usize) -> Option<&[u8]> {
        self.parts.get(index).copied()
    }

    /// All path segments, in order.
    #[inline(always)]
    pub fn path_segments(&self) -> &[&[u8]] {
        self.parts.as_slice()
    }

    /// Exact match against a full segment pattern.
    #[inline(always)]
    pub fn matches(&self, pattern: &[&[u8]]) -> bool {
        self.path_segments() == pattern
    }

    /// True if the path's segments begin with `pattern`.
    #[inline(always)]
    pub fn starts_with(&self, pattern: &[&[u8]]) -> bool {
        self.path_segments().starts_with(pattern)
    }

    /// True if the path's segments end with `pattern`.
    #[inline(always)]
    pub fn ends_with(&self, pattern: &[&[u8]]) -> bool {
        self.path_segments().ends_with(pattern)
    }

    /// Full query string including the leading `?`, if present.
    #[inline(always)]
    pub const fn query_full(&self) -> Option<&[u8]> {
        self.query
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_classify_known_and_unknown() {
        assert_eq!(Method::classify(b"GET"), Method::Get);
        assert_eq!(Method::classify(b"POST"), Method::Post);
        assert_eq!(Method::classify(b"PATCH"), Method::Patch);
        assert_eq!(Method::classify(b"TRACE"), Method::Other);
    }

    #[test]
    fn version_from_bytes() {
        assert_eq!(Version::from_bytes(b"HTTP/1.1"), Ok((Version::Http11, true)));
        assert_eq!(Version::from_bytes(b"HTTP/1.0"), Ok((Version::Http10, false)));
        assert!(Version::from_bytes(b"HTTP/2.0").is_err());
    }

    #[test]
    fn slice_to_usize_rejects_non_digits_and_overflow() {
        assert_eq!(slice_to_usize(b"0"), Some(0));
        assert_eq!(slice_to_usize(b"1234"), Some(1234));
        assert_eq!(slice_to_usize(b"12a4"), None);
        assert_eq!(slice_to_usize(b""), Some(0));
        assert_eq!(slice_to_usize(b"99999999999999999999999999999"), None);
    }

    #[test]
    fn status_code_class_and_round_trip() {
        assert_eq!(StatusCode::NotFound.class(), 4);
        assert_eq!(StatusCode::Ok.class(), 2);
        assert_eq!(StatusCode::from_u16(404), Some(StatusCode::NotFound));
        assert_eq!(StatusCode::from_u16(204), Some(StatusCode::NoContent));
        assert_eq!(StatusCode::from_u16(999), None);
    }

    #[test]
    fn status_first_line_by_version() {
        let line = StatusCode::Ok.into_first_line(Version::Http11);
        assert_eq!(line, b"HTTP/1.1 200 OK\r\n");
        let line = StatusCode::Ok.into_first_line(Version::Http10);
        assert_eq!(line, b"HTTP/1.0 200 OK\r\n");
    }

    #[test]
    fn url_clear_resets_all_fields() {
        let mut url = Url::new(4);
        url.target = b"/a/b?x=1";
        url.path = b"/a/b";
        url.parts.push(b"a");
        url.parts.push(b"b");
        url.query = Some(b"x=1");
        url.clear();
        assert_eq!(url.target(), b"");
        assert_eq!(url.path(), b"");
        assert!(url.path_segments().is_empty());
        assert_eq!(url.query_full(), None);
    }
}
