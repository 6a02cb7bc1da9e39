//! Incremental parser for an inbound HTTP response, the client-role
//! mirror of [`crate::http::request`].
//!
//! The shape is deliberately close to the request parser: a status
//! line instead of a request line, the same header-block scan, and the
//! same `Content-Length`-only body handling (chunked responses are out
//! of scope for the client path in this revision, matching the
//! synchronous-body posture the rest of the engine takes).

use crate::{
    catalog::Catalog,
    errors::ErrorKind,
    http::types::{self, StatusCode},
    limits::ReqLimits,
};
use memchr::memchr;
use std::mem;

/// A fully- or partially-parsed HTTP response, received on a client-role
/// slot. Zero-copy: slices point into the slot's own read buffer, valid
/// only until the buffer is next consumed or refilled (mirrors
/// [`crate::http::request::Request`]'s safety contract).
#[derive(Debug)]
pub(crate) struct ClientResponse {
    status: u16,
    reason: &'static [u8],
    keep_alive: bool,
    content_length: Option<usize>,
    headers: Catalog,
    body: Option<&'static [u8]>,
}

impl ClientResponse {
    pub(crate) fn new(limits: &ReqLimits) -> Self {
        Self {
            status: 0,
            reason: b"",
            keep_alive: false,
            content_length: None,
            headers: Catalog::new(limits.header_count),
            body: None,
        }
    }

    pub(crate) fn reset(&mut self) {
        self.status = 0;
        self.reason = b"";
        self.keep_alive = false;
        self.content_length = None;
        self.headers.clear();
        self.body = None;
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn status_code(&self) -> Option<StatusCode> {
        StatusCode::from_u16(self.status)
    }

    pub fn reason(&self) -> &[u8] {
        self.reason
    }

    pub fn header(&self, name: &[u8]) -> Option<&[u8]> {
        self.headers.get(name)
    }

    pub(crate) fn headers(&self) -> &Catalog {
        &self.headers
    }

    pub fn body(&self) -> Option<&[u8]> {
        self.body
    }
}

/// Parses one response from `buf`. Return convention matches
/// [`crate::http::request::parse`]: `Ok(0)` means "need more bytes",
/// `Ok(n>0)` means a complete response was consumed, `Err` means the
/// bytes seen so far can never be a valid response.
pub(crate) fn parse(buf: &mut [u8], response: &mut ClientResponse, req_limits: &ReqLimits) -> Result<usize, ErrorKind> {
    response.reset();

    let Some(status_line_end) = memchr(b'\n', buf) else {
        return Ok(0);
    };
    let line = strip_cr(&buf[..status_line_end]);

    let sp = memchr(b' ', line).ok_or(ErrorKind::InvalidRequestLine)?;
    let http_version = &line[..sp];
    let default_keep_alive = match http_version {
        b"HTTP/1.1" => true,
        b"HTTP/1.0" => false,
        _ => return Err(ErrorKind::InvalidVersion),
    };
    let rest = &line[sp + 1..];
    let status_end = memchr(b' ', rest).unwrap_or(rest.len());
    let status: u16 = std::str::from_utf8(&rest[..status_end])
        .ok()
        .and_then(|s| s.parse().ok())
        .map(|n: u16| n.clamp(100, 599))
        .unwrap_or(500);
    let reason = if status_end < rest.len() { &rest[status_end + 1..] } else { b"" };

    response.status = status;
    response.reason = unsafe { into_static(reason) };
    response.keep_alive = default_keep_alive;

    let mut pos = status_line_end + 1;
    loop {
        let Some(line_end) = memchr(b'\n', &buf[pos..]) else {
            return Ok(0);
        };
        let raw = strip_cr(&buf[pos..pos + line_end]);
        if raw.is_empty() {
            pos += line_end + 1;
            break;
        }
        let colon = memchr(b':', raw).ok_or(ErrorKind::InvalidHeader)?;
        if buf.get(pos + colon..pos + colon + 2) != Some(b": ") {
            return Err(ErrorKind::InvalidHeader);
        }

        let name_start = pos;
        {
            let name = &mut buf[name_start..name_start + colon];
            types::to_lower_case(name);
        }
        let name: &'static [u8] = unsafe { into_static(&buf[name_start..name_start + colon]) };
        let value_start = pos + colon + 2;
        let value_end = name_start + raw.len();
        let value: &'static [u8] = unsafe { into_static(&buf[value_start..value_end]) };

        if name == b"content-length" {
            response.content_length = types::slice_to_usize(value);
        } else if name == b"connection" {
            response.keep_alive = value.eq_ignore_ascii_case(b"keep-alive");
        } else {
            response.headers.insert(name, value);
        }

        pos += line_end + 1;
    }

    match response.content_length {
        None => Ok(pos),
        Some(len) => {
            if buf.len() - pos < len {
                Ok(0)
            } else {
                response.body = Some(unsafe { into_static(&buf[pos..pos + len]) });
                Ok(pos + len)
            }
        }
    }
}

#[inline]
fn strip_cr(line: &[u8]) -> &[u8] {
    match line.last() {
        Some(b'\r') => &line[..line.len() - 1],
        _ => line,
    }
}

// SAFETY: the returned slice is valid only until the caller's read
// buffer is next consumed or refilled, matching the request parser's
// identical safety note.
#[inline(always)]
unsafe fn into_static(src: &[u8]) -> &'static [u8] {
    unsafe { mem::transmute(src) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::limits::ReqLimits;

    fn limits() -> ReqLimits {
        ReqLimits::default().precalculate()
    }

    #[test]
    fn parses_simple_response() {
        let limits = limits();
        let mut buf = b"HTTP/1.1 200 OK\r\ncontent-length: 5\r\n\r\nhello".to_vec();
        let mut resp = ClientResponse::new(&limits);
        let n = parse(&mut buf, &mut resp, &limits).unwrap();
        assert_eq!(n, buf.len());
        assert_eq!(resp.status(), 200);
        assert_eq!(resp.body(), Some(&b"hello"[..]));
    }

    #[test]
    fn status_out_of_range_clamped_by_parse_failure() {
        let limits = limits();
        let mut buf = b"HTTP/1.1 999999 Huh\r\n\r\n".to_vec();
        let mut resp = ClientResponse::new(&limits);
        parse(&mut buf, &mut resp, &limits).unwrap();
        assert_eq!(resp.status(), 500);
    }

    #[test]
    fn incomplete_response_asks_for_more() {
        let limits = limits();
        let mut buf = b"HTTP/1.1 200 OK\r\ncontent-l".to_vec();
        let mut resp = ClientResponse::new(&limits);
        assert_eq!(parse(&mut buf, &mut resp, &limits), Ok(0));
    }
}
