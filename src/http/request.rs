//! Incremental HTTP/1.x (and supplemental HTTP/0.9) request parser.
//!
//! [`parse`] implements the protocol engine's parsing contract: it is
//! handed whatever bytes have arrived so far and either completes a
//! request, asks for more, or reports a malformed request. There is no
//! parser state carried between calls — each call re-scans from the
//! start of the still-unconsumed buffer, which is simple to reason about
//! at the buffer sizes this runtime targets and avoids a second,
//! partially-redundant state machine living alongside the slot's own
//! idle/awaiting-content states.

use crate::{
    catalog::Catalog,
    errors::ErrorKind,
    http::{
        query,
        types::{self, Method, Url, Version},
    },
    limits::{Http09Limits, ReqLimits},
};
use memchr::{memchr, memchr_iter, memmem};
use std::mem;

/// A fully- or partially-parsed HTTP request.
///
/// Zero-copy: every byte slice here points into the connection's own
/// read buffer. The slices stay valid only until that buffer is next
/// mutated (consumed or refilled), which the engine does only after the
/// response for this request has been produced — see [`parse`]'s safety
/// note.
#[derive(Debug)]
pub struct Request {
    method: Method,
    method_bytes: &'static [u8],
    url: Url,
    version: Version,
    keep_alive: bool,
    content_length: Option<usize>,
    chunked: bool,
    headers: Catalog,
    query: Catalog,
    body: Option<&'static [u8]>,
}

impl Request {
    pub(crate) fn new(limits: &ReqLimits) -> Self {
        Request {
            method: Method::Get,
            method_bytes: b"GET",
            url: Url::new(limits.url_parts),
            version: Version::Http11,
            keep_alive: true,
            content_length: None,
            chunked: false,
            headers: Catalog::new(limits.header_count),
            query: Catalog::new(limits.url_query_parts),
            body: None,
        }
    }

    pub(crate) fn reset(&mut self) {
        self.method = Method::Get;
        self.method_bytes = b"GET";
        self.url.clear();
        self.version = Version::Http11;
        self.keep_alive = true;
        self.content_length = None;
        self.chunked = false;
        self.headers.clear();
        self.query.clear();
        self.body = None;
    }
}

// Public API
impl Request {
    #[inline(always)]
    pub const fn method(&self) -> Method {
        self.method
    }

    /// The method token exactly as it appeared on the wire, useful when
    /// [`method`](Self::method) classified it as [`Method::Other`].
    #[inline(always)]
    pub const fn method_bytes(&self) -> &[u8] {
        self.method_bytes
    }

    #[inline(always)]
    pub const fn url(&self) -> &Url {
        &self.url
    }

    #[inline(always)]
    pub const fn version(&self) -> Version {
        self.version
    }

    /// Whether the connection should persist after this request,
    /// resolved from the request's version default and any `Connection`
    /// header override.
    #[inline(always)]
    pub const fn keep_alive(&self) -> bool {
        self.keep_alive
    }

    /// First header value with case-insensitive name matching
    /// ([RFC 7230 §3.2](https://tools.ietf.org/html/rfc7230#section-3.2)).
    #[inline(always)]
    pub fn header(&self, name: &[u8]) -> Option<&[u8]> {
        self.headers.get(name)
    }

    /// A decoded query parameter by name, case-insensitive.
    #[inline(always)]
    pub fn query(&self, name: &[u8]) -> Option<&[u8]> {
        self.query.get(name)
    }

    #[inline(always)]
    pub const fn content_length(&self) -> Option<usize> {
        self.content_length
    }

    #[inline(always)]
    pub const fn body(&self) -> Option<&[u8]> {
        self.body
    }
}

/// Attempts to parse one request from `buf`, the connection's entire
/// filled read buffer.
///
/// Returns:
/// - `Ok(0)` — not enough data yet; call again once more bytes have
///   arrived, without disturbing `buf`'s contents.
/// - `Ok(n)` with `n > 0` — a complete request was parsed; `request`
///   is now populated and `n` bytes (request line, headers, and any
///   body) should be consumed from the front of the connection's
///   buffer.
/// - `Err(_)` — the bytes seen so far can never form a valid request.
///
/// `request` is reset at the start of every call, so a caller can
/// simply retry the same (request, buf) pair as more bytes arrive.
///
/// # Safety contract
/// The slices `request` ends up holding point into `buf`. The caller
/// must not consume or refill the underlying buffer — which shifts or
/// overwrites its contents — until it is done reading `request` (i.e.
/// until the response for this request has been produced). This
/// mirrors the slot lifecycle's `awaiting-content -> idle` transition:
/// the buffer is only ever consumed as a whole once a request is fully
/// handled.
pub(crate) fn parse(
    buf: &mut [u8],
    request: &mut Request,
    req_limits: &ReqLimits,
    http09_limits: Option<&Http09Limits>,
) -> Result<usize, ErrorKind> {
    request.reset();

    let mut cursor = Cursor {
        buf,
        position: 0,
        has_crlf: false,
    };

    let Step::Done(()) = cursor.parse_request_line(request, req_limits, http09_limits)? else {
        return Ok(0);
    };

    if request.version == Version::Http09 {
        return Ok(cursor.position);
    }

    let Step::Done(()) = cursor.parse_headers(request, req_limits)? else {
        return Ok(0);
    };

    match cursor.parse_body(request, req_limits)? {
        Step::Done(()) => Ok(cursor.position),
        Step::NeedMore => Ok(0),
    }
}

enum Step<T> {
    Done(T),
    NeedMore,
}

/// Cursor over the connection's read buffer for a single parse attempt.
///
/// Does not own the buffer: the reactor's
/// [`Buffer`](crate::buffer::Buffer) already owns storage per slot, so
/// this only tracks where we are within it.
struct Cursor<'b> {
    buf: &'b mut [u8],
    position: usize,
    has_crlf: bool,
}

impl<'b> Cursor<'b> {
    #[inline(always)]
    fn available(&self) -> usize {
        self.buf.len().saturating_sub(self.position)
    }

    #[inline(always)]
    fn get_slice(&self, start: usize, len: usize) -> Option<&[u8]> {
        self.buf.get(start..start.checked_add(len)?)
    }

    #[inline(always)]
    fn get_slice_mut(&mut self, start: usize, len: usize) -> Option<&mut [u8]> {
        self.buf.get_mut(start..start.checked_add(len)?)
    }

    #[inline(always)]
    fn get_slice_static(&self, start: usize, len: usize) -> Option<&'static [u8]> {
        let value = self.get_slice(start, len)?;
        Some(unsafe { Self::into_static(value) })
    }

    // SAFETY: the lifetime stretches until the caller of `parse` stops
    // reading the request it returned; see `parse`'s own safety note.
    #[inline(always)]
    unsafe fn into_static(src: &[u8]) -> &'static [u8] {
        unsafe { mem::transmute(src) }
    }

    /// Scans `self.buf[self.position..]` for `delim`, bounded by
    /// `max_scan` bytes. `Found` carries the index relative to
    /// `self.position`; `NeedMore` means fewer than `max_scan` bytes have
    /// arrived and `delim` wasn't among them; `TooLong` means `max_scan`
    /// bytes are already present and `delim` still wasn't found — a
    /// limit violation, not a data shortage.
    fn scan(&self, max_scan: usize, delim: u8) -> ScanResult {
        let available = self.available();
        let bound = available.min(max_scan);
        let window = &self.buf[self.position..self.position + bound];

        match memchr(delim, window) {
            Some(pos) => ScanResult::Found(pos),
            None if available >= max_scan => ScanResult::TooLong,
            None => ScanResult::NeedMore,
        }
    }
}

enum ScanResult {
    Found(usize),
    NeedMore,
    TooLong,
}

// Request line: `METHOD SP request-target SP HTTP-Version CRLF`, or the
// supplemental `METHOD SP request-target CRLF` (no version) form.
impl<'b> Cursor<'b> {
    fn parse_request_line(
        &mut self,
        request: &mut Request,
        req_limits: &ReqLimits,
        http09_limits: Option<&Http09Limits>,
    ) -> Result<Step<()>, ErrorKind> {
        let method_end = match self.scan(req_limits.method_size + 1, b' ') {
            ScanResult::Found(pos) => pos,
            ScanResult::NeedMore => return Ok(Step::NeedMore),
            ScanResult::TooLong => return Err(ErrorKind::InvalidMethod),
        };
        if method_end == 0 {
            return Err(ErrorKind::InvalidMethod);
        }
        let method_mut = self
            .get_slice_mut(self.position, method_end)
            .ok_or(ErrorKind::InvalidMethod)?;
        let decoded_method_len = query::percent_decode_in_place(method_mut);
        let method_bytes = self
            .get_slice_static(self.position, decoded_method_len)
            .ok_or(ErrorKind::InvalidMethod)?;
        let method = Method::classify(method_bytes);

        let url_start = self.position + method_end + 1;
        self.position = url_start;

        let line_end = match self.scan(req_limits.precalc.first_line, b'\n') {
            ScanResult::Found(pos) => pos,
            ScanResult::NeedMore => return Ok(Step::NeedMore),
            ScanResult::TooLong => return Err(ErrorKind::InvalidRequestLine),
        };

        let crlf_len = match self.get_slice(url_start, line_end).and_then(|s| s.last().copied()) {
            Some(b'\r') => 1,
            _ => 0,
        };
        let has_crlf = crlf_len == 1;
        let line_len = line_end - crlf_len;

        let space = self.get_slice(url_start, line_len).and_then(|line| memchr(b' ', line));

        let (url_len, version) = match space {
            Some(sp) => {
                let version_start = url_start + sp + 1;
                let version_len = line_len - sp - 1;
                let version_token = self
                    .get_slice(version_start, version_len)
                    .ok_or(ErrorKind::InvalidVersion)?;
                let (version, default_keep_alive) = Version::from_bytes(version_token)?;
                request.keep_alive = default_keep_alive;
                (sp, version)
            }
            None if http09_limits.is_some() && method == Method::Get => (line_len, Version::Http09),
            None => return Err(ErrorKind::InvalidVersion),
        };

        if url_len == 0 || url_len > req_limits.url_size {
            return Err(ErrorKind::InvalidUrl);
        }

        request.method = method;
        request.method_bytes = method_bytes;
        request.version = version;
        self.has_crlf = has_crlf;

        let query_offset = parse_url(self, url_start, url_len, &mut request.url, req_limits)?;

        if let (Some(offset), Some(raw_query)) = (query_offset, request.url.query) {
            let query_start = url_start + offset;
            let query_len = raw_query.len();
            let query_mut = self
                .get_slice_mut(query_start, query_len)
                .ok_or(ErrorKind::InvalidUrl)?;
            parse_query(query_mut, &mut request.query, req_limits.url_query_parts)?;
        }

        self.position = url_start + line_end + 1;
        Ok(Step::Done(()))
    }
}

/// Splits the request-target at `[url_start, url_start + url_len)` (path
/// + optional `?query`) into [`Url`]'s fields, percent-decoding the path
/// in place per the engine's "percent-decode method and URI" step.
/// Rejects any request-target containing a `..` substring anywhere
/// (path-traversal guard) — not just a standalone `..` segment, matching
/// a plain `strstr`-style substring test over the raw target.
/// Returns the offset of the query string within the target, if any —
/// the caller uses it to locate the same bytes for in-place decoding.
fn parse_url(cursor: &mut Cursor, url_start: usize, url_len: usize, url: &mut Url, req_limits: &ReqLimits) -> Result<Option<usize>, ErrorKind> {
    let target_raw = cursor.get_slice_static(url_start, url_len).ok_or(ErrorKind::InvalidUrl)?;
    if target_raw[0] != b'/' {
        return Err(ErrorKind::InvalidUrl);
    }
    if memmem::find(target_raw, b"..").is_some() {
        return Err(ErrorKind::PathTraversal);
    }

    let (path_len_raw, query, query_offset) = match memchr(b'?', target_raw) {
        Some(q) => {
            let query = &target_raw[q + 1..];
            if query.len() > req_limits.url_query_size {
                return Err(ErrorKind::InvalidUrl);
            }
            (q, Some(query), Some(q + 1))
        }
        None => (target_raw.len(), None, None),
    };

    let path_mut = cursor.get_slice_mut(url_start, path_len_raw).ok_or(ErrorKind::InvalidUrl)?;
    let decoded_path_len = query::percent_decode_in_place(path_mut);
    let path = cursor.get_slice_static(url_start, decoded_path_len).ok_or(ErrorKind::InvalidUrl)?;

    url.target = target_raw;
    url.path = path;
    url.query = query;

    let mut last = 0;
    for index in memchr_iter(b'/', path) {
        push_segment(url, &path[last..index], req_limits)?;
        last = index + 1;
    }
    push_segment(url, &path[last..], req_limits)?;

    Ok(query_offset)
}

#[inline]
fn push_segment(url: &mut Url, segment: &'static [u8], req_limits: &ReqLimits) -> Result<(), ErrorKind> {
    if segment.is_empty() {
        return Ok(());
    }
    if url.parts.len() >= req_limits.url_parts {
        return Err(ErrorKind::InvalidUrl);
    }
    url.parts.push(segment);
    Ok(())
}

/// Splits and percent-decodes `query` (the portion after `?`, excluding
/// it) into `catalog`, mirroring [`query::Query::parse_into`]'s
/// delimiter scan but writing decoded, owned-lifetime slices directly
/// into the parameters catalog instead of a generic collector.
fn parse_query(query: &mut [u8], catalog: &mut Catalog, limit: usize) -> Result<(), ErrorKind> {
    let mut start = 0;
    while start < query.len() {
        if catalog.len() >= limit {
            return Err(ErrorKind::InvalidUrl);
        }

        let end = memchr(b'&', &query[start..]).map(|pos| start + pos).unwrap_or(query.len());
        let split = memchr(b'=', &query[start..end]).map(|pos| start + pos).unwrap_or(end);

        let key_len = query::percent_decode_in_place(&mut query[start..split]);
        let key = unsafe { Cursor::into_static(&query[start..start + key_len]) };

        let value = if split < end {
            let value_len = query::percent_decode_in_place(&mut query[split + 1..end]);
            unsafe { Cursor::into_static(&query[split + 1..split + 1 + value_len]) }
        } else {
            b""
        };

        catalog.insert(key, value);
        start = end + 1;
    }
    Ok(())
}

// Headers
impl<'b> Cursor<'b> {
    fn parse_headers(&mut self, request: &mut Request, req_limits: &ReqLimits) -> Result<Step<()>, ErrorKind> {
        for _ in 0..req_limits.header_count {
            match self.parse_header(req_limits)? {
                Step::Done(Some((name, value))) => {
                    if !self.apply_special_header(request, name, value)? {
                        request.headers.insert(name, value);
                    }
                }
                Step::Done(None) => return Ok(Step::Done(())),
                Step::NeedMore => return Ok(Step::NeedMore),
            }
        }
        Err(ErrorKind::TooManyHeaders)
    }

    /// Parses one header line, or recognizes the blank line ending the
    /// header block (`Step::Done(None)`).
    fn parse_header(
        &mut self,
        req_limits: &ReqLimits,
    ) -> Result<Step<Option<(&'static [u8], &'static [u8])>>, ErrorKind> {
        let line_end = match self.scan(req_limits.precalc.h_line, b'\n') {
            ScanResult::Found(pos) => pos,
            ScanResult::NeedMore => return Ok(Step::NeedMore),
            ScanResult::TooLong => return Err(ErrorKind::InvalidHeader),
        };

        let line = self.get_slice(self.position, line_end).ok_or(ErrorKind::InvalidHeader)?;
        let line = strip_trailing_cr(line, self.has_crlf)?;

        if line.is_empty() {
            self.position += line_end + 1;
            return Ok(Step::Done(None));
        }

        let colon = memchr(b':', line).ok_or(ErrorKind::InvalidHeader)?;
        if colon > req_limits.header_name_size {
            return Err(ErrorKind::InvalidHeader);
        }
        if self.get_slice(self.position + colon, 2) != Some(b": ") {
            return Err(ErrorKind::InvalidHeader);
        }

        let value_start = colon + 2;
        let value_len = line.len().saturating_sub(value_start);
        if value_len > req_limits.header_value_size {
            return Err(ErrorKind::InvalidHeader);
        }

        let name = {
            let name = self.get_slice_mut(self.position, colon).ok_or(ErrorKind::InvalidHeader)?;
            if name.is_empty() {
                return Err(ErrorKind::InvalidHeader);
            }
            types::to_lower_case(name);
            unsafe { Self::into_static(name) }
        };
        let value = self
            .get_slice_static(self.position + value_start, value_len)
            .ok_or(ErrorKind::InvalidHeader)?;

        self.position += line_end + 1;
        Ok(Step::Done(Some((name, value))))
    }

    /// Handles `content-length`/`connection`/`transfer-encoding`
    /// specially rather than storing them as ordinary header entries.
    /// Returns whether `name` was one of these (and so was already
    /// handled, and must not also go into the headers catalog).
    fn apply_special_header(
        &self,
        request: &mut Request,
        name: &'static [u8],
        value: &'static [u8],
    ) -> Result<bool, ErrorKind> {
        match name {
            b"content-length" => {
                let len = types::slice_to_usize(value).ok_or(ErrorKind::InvalidContentLength)?;
                request.content_length = Some(len);
                Ok(true)
            }
            b"connection" => {
                let mut normalized = [0u8; 10];
                let len = types::into_lower_case(value, &mut normalized);
                request.keep_alive = match &normalized[..len] {
                    b"keep-alive" => true,
                    b"close" => false,
                    _ => return Err(ErrorKind::InvalidConnection),
                };
                Ok(true)
            }
            b"transfer-encoding" => {
                let mut normalized = [0u8; 16];
                let len = types::into_lower_case(value, &mut normalized);
                match &normalized[..len] {
                    b"chunked" => {
                        request.chunked = true;
                        Ok(true)
                    }
                    _ => Err(ErrorKind::UnsupportedTransferEncoding),
                }
            }
            _ => Ok(false),
        }
    }
}

#[inline]
fn strip_trailing_cr(line: &[u8], has_crlf: bool) -> Result<&[u8], ErrorKind> {
    match (has_crlf, line.last()) {
        (true, Some(b'\r')) => Ok(&line[..line.len() - 1]),
        (true, _) => Err(ErrorKind::InvalidHeader),
        (false, _) => Ok(line),
    }
}

// Body
impl<'b> Cursor<'b> {
    fn parse_body(&mut self, request: &mut Request, req_limits: &ReqLimits) -> Result<Step<()>, ErrorKind> {
        if request.chunked {
            return self.parse_chunked_body(request, req_limits);
        }

        let Some(len) = request.content_length else {
            return Ok(Step::Done(()));
        };
        if len > req_limits.body_size {
            return Err(ErrorKind::BodyTooLarge);
        }
        if self.available() < len {
            return Ok(Step::NeedMore);
        }

        let available = self.available();
        request.body = Some(self.get_slice_static(self.position, len).ok_or(ErrorKind::BodyMismatch {
            expected: len,
            available,
        })?);
        self.position += len;
        Ok(Step::Done(()))
    }

    /// Decodes `Transfer-Encoding: chunked`: only a fully-received
    /// payload is accepted at this revision. A read-only
    /// pass first confirms the terminating zero-length chunk has
    /// already arrived — only then is the buffer rewritten in place,
    /// since a destructive rewrite followed by `Ok(0)` would corrupt the
    /// bytes [`parse`] re-scans on the next call.
    fn parse_chunked_body(&mut self, request: &mut Request, req_limits: &ReqLimits) -> Result<Step<()>, ErrorKind> {
        let body_start = self.position;

        let Some(raw_len) = scan_chunked_extent(&self.buf[body_start..], req_limits.body_size)? else {
            return Ok(Step::NeedMore);
        };

        let decoded_len = compact_chunked_body(&mut self.buf[body_start..body_start + raw_len]);
        if decoded_len > req_limits.body_size {
            return Err(ErrorKind::BodyTooLarge);
        }

        request.body = Some(self.get_slice_static(body_start, decoded_len).ok_or(ErrorKind::BodyMismatch {
            expected: decoded_len,
            available: self.available(),
        })?);
        self.position = body_start + raw_len;
        Ok(Step::Done(()))
    }
}

/// Read-only scan for a complete chunked body within `buf`, bounded by
/// `max_decoded` bytes of chunk payload (the raw encoding may exceed
/// this; only the decoded total is checked against the limit here, a
/// cheap early exit — the authoritative check happens after decoding).
/// Returns the number of raw bytes the whole sequence occupies
/// (including the terminating `0\r\n\r\n`), or `None` if more bytes are
/// needed. A chunk-size line that cannot be parsed as hex is a hard
/// error, not a "need more" condition.
fn scan_chunked_extent(buf: &[u8], max_decoded: usize) -> Result<Option<usize>, ErrorKind> {
    let mut pos = 0;
    let mut decoded = 0usize;

    loop {
        let Some(line_len) = memchr(b'\n', &buf[pos..]) else {
            return Ok(None);
        };
        let size_line = strip_trailing_cr(&buf[pos..pos + line_len], true)?;
        let size_token = match memchr(b';', size_line) {
            Some(semi) => &size_line[..semi],
            None => size_line,
        };
        let size = usize::from_str_radix(
            std::str::from_utf8(size_token).map_err(|_| ErrorKind::UnsupportedTransferEncoding)?,
            16,
        )
        .map_err(|_| ErrorKind::UnsupportedTransferEncoding)?;

        pos += line_len + 1;

        if size == 0 {
            // Trailing CRLF after the zero-length chunk; trailer
            // headers (RFC 7230 §4.1.2) are not supported in this
            // revision and are treated as "need more" if a stray
            // header-like line follows instead of the blank line.
            if buf.len() < pos + 2 {
                return Ok(None);
            }
            if &buf[pos..pos + 2] != b"\r\n" {
                return Err(ErrorKind::UnsupportedTransferEncoding);
            }
            return Ok(Some(pos + 2));
        }

        decoded = decoded.saturating_add(size);
        if decoded > max_decoded {
            return Err(ErrorKind::BodyTooLarge);
        }

        if buf.len() < pos + size + 2 {
            return Ok(None);
        }
        if &buf[pos + size..pos + size + 2] != b"\r\n" {
            return Err(ErrorKind::UnsupportedTransferEncoding);
        }
        pos += size + 2;
    }
}

/// Compacts an already-confirmed-complete chunked sequence in place:
/// copies each chunk's payload over the size line and trailing CRLF
/// that preceded it. Returns the decoded length. Safe as a left
/// compaction because the write cursor never overtakes the read
/// cursor — chunk framing overhead is strictly positive.
fn compact_chunked_body(buf: &mut [u8]) -> usize {
    let mut read = 0;
    let mut write = 0;

    loop {
        let line_len = memchr(b'\n', &buf[read..]).expect("extent already validated");
        let size_line_end = read + line_len + 1;
        let size_token_end = if buf[read..size_line_end].last() == Some(&b'\n') {
            size_line_end - if buf[size_line_end - 2] == b'\r' { 2 } else { 1 }
        } else {
            size_line_end
        };
        let size_token = match memchr(b';', &buf[read..size_token_end]) {
            Some(semi) => &buf[read..read + semi],
            None => &buf[read..size_token_end],
        };
        let size = usize::from_str_radix(std::str::from_utf8(size_token).unwrap(), 16).unwrap();

        read = size_line_end;
        if size == 0 {
            break;
        }

        buf.copy_within(read..read + size, write);
        write += size;
        read += size + 2;
    }

    write
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::limits::ReqLimits;

    fn limits() -> ReqLimits {
        ReqLimits::default().precalculate()
    }

    fn run(input: &str) -> Result<(usize, Request), ErrorKind> {
        let limits = limits();
        let mut buf = input.as_bytes().to_vec();
        let mut request = Request::new(&limits);
        let n = parse(&mut buf, &mut request, &limits, None)?;
        Ok((n, request))
    }

    #[test]
    fn parses_simple_get() {
        let (n, req) = run("GET /hello HTTP/1.1\r\nhost: example\r\n\r\n").unwrap();
        assert_eq!(n, "GET /hello HTTP/1.1\r\nhost: example\r\n\r\n".len());
        assert_eq!(req.method(), Method::Get);
        assert_eq!(req.url().path(), b"/hello");
        assert_eq!(req.header(b"Host"), Some(&b"example"[..]));
        assert!(req.body().is_none());
    }

    #[test]
    fn incomplete_request_asks_for_more() {
        let limits = limits();
        let mut buf = b"GET /hello HTTP/1.1\r\nhost: exam".to_vec();
        let mut request = Request::new(&limits);
        assert_eq!(parse(&mut buf, &mut request, &limits, None), Ok(0));
    }

    #[test]
    fn parses_body_with_content_length() {
        let (n, req) = run("POST /x HTTP/1.1\r\ncontent-length: 5\r\n\r\nhello").unwrap();
        assert_eq!(n, "POST /x HTTP/1.1\r\ncontent-length: 5\r\n\r\nhello".len());
        assert_eq!(req.body(), Some(&b"hello"[..]));
        assert_eq!(req.content_length(), Some(5));
    }

    #[test]
    fn incomplete_body_asks_for_more() {
        let limits = limits();
        let mut buf = b"POST /x HTTP/1.1\r\ncontent-length: 5\r\n\r\nhe".to_vec();
        let mut request = Request::new(&limits);
        assert_eq!(parse(&mut buf, &mut request, &limits, None), Ok(0));
    }

    #[test]
    fn path_traversal_is_rejected() {
        let err = run("GET /a/../b HTTP/1.1\r\n\r\n").unwrap_err();
        assert_eq!(err, ErrorKind::PathTraversal);
    }

    #[test]
    fn decodes_query_parameters() {
        let (_, req) = run("GET /s?name=a%20b&x HTTP/1.1\r\n\r\n").unwrap();
        assert_eq!(req.query(b"name"), Some(&b"a b"[..]));
        assert_eq!(req.query(b"x"), Some(&b""[..]));
    }

    #[test]
    fn oversized_method_is_rejected() {
        let long_method = "X".repeat(100);
        let line = format!("{long_method} / HTTP/1.1\r\n\r\n");
        assert_eq!(run(&line).unwrap_err(), ErrorKind::InvalidMethod);
    }

    #[test]
    fn http09_request_without_limits_is_rejected() {
        let limits = limits();
        let mut buf = b"GET /x\r\n".to_vec();
        let mut request = Request::new(&limits);
        assert_eq!(parse(&mut buf, &mut request, &limits, None), Err(ErrorKind::InvalidVersion));
    }

    #[test]
    fn http09_request_with_limits_completes() {
        let limits = limits();
        let http09 = Http09Limits::default();
        let mut buf = b"GET /x\r\n".to_vec();
        let mut request = Request::new(&limits);
        let n = parse(&mut buf, &mut request, &limits, Some(&http09)).unwrap();
        assert_eq!(n, buf.len());
        assert_eq!(request.version(), Version::Http09);
        assert_eq!(request.url().path(), b"/x");
    }

    #[test]
    fn unsupported_transfer_encoding_is_rejected() {
        let err = run("POST /x HTTP/1.1\r\ntransfer-encoding: gzip\r\n\r\n").unwrap_err();
        assert_eq!(err, ErrorKind::UnsupportedTransferEncoding);
    }

    #[test]
    fn fully_buffered_chunked_body_decodes() {
        let (n, req) = run(
            "POST /x HTTP/1.1\r\ntransfer-encoding: chunked\r\n\r\n4\r\nWiki\r\n5\r\npedia\r\n0\r\n\r\n",
        )
        .unwrap();
        assert_eq!(n, "POST /x HTTP/1.1\r\ntransfer-encoding: chunked\r\n\r\n4\r\nWiki\r\n5\r\npedia\r\n0\r\n\r\n".len());
        assert_eq!(req.body(), Some(&b"Wikipedia"[..]));
    }

    #[test]
    fn zero_length_chunk_is_empty_body() {
        let (_, req) = run("POST /x HTTP/1.1\r\ntransfer-encoding: chunked\r\n\r\n0\r\n\r\n").unwrap();
        assert_eq!(req.body(), Some(&b""[..]));
    }

    #[test]
    fn incomplete_chunked_body_asks_for_more() {
        let limits = limits();
        let mut buf = b"POST /x HTTP/1.1\r\ntransfer-encoding: chunked\r\n\r\n4\r\nWik".to_vec();
        let mut request = Request::new(&limits);
        assert_eq!(parse(&mut buf, &mut request, &limits, None), Ok(0));
    }
}
