//! Percent-decoding shared by every query-parameter parse path in the
//! crate.
//!
//! The actual `key=value` split lives next to its caller: the request
//! parser decodes straight into the query [`Catalog`](crate::catalog::Catalog)
//! (see [`crate::http::request`]), and the client helpers build query
//! strings the other direction. What's common between them is percent
//! decoding, so that's what lives here.

/// Percent-decodes `buf` in place (RFC 3986 `%XX` escapes only; `+` is
/// left as a literal plus, since this runtime never parses
/// `application/x-www-form-urlencoded` bodies through this path).
///
/// Decoding never grows the data — each `%XX` triplet collapses to one
/// byte — so the write cursor never passes the read cursor and the
/// same buffer can serve as both source and destination. Returns the
/// decoded length. An invalid (non-hex) escape is copied through
/// unchanged rather than rejected, matching how request-line and
/// header parsing treat cosmetic malformations as best-effort.
#[inline]
pub(crate) fn percent_decode_in_place(buf: &mut [u8]) -> usize {
    let mut read = 0;
    let mut write = 0;

    while read < buf.len() {
        if buf[read] == b'%' && read + 2 < buf.len() {
            if let (Some(hi), Some(lo)) = (hex_val(buf[read + 1]), hex_val(buf[read + 2])) {
                buf[write] = hi * 16 + lo;
                write += 1;
                read += 3;
                continue;
            }
        }
        buf[write] = buf[read];
        write += 1;
        read += 1;
    }

    write
}

#[inline(always)]
fn hex_val(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'a'..=b'f' => Some(byte - b'a' + 10),
        b'A'..=b'F' => Some(byte - b'A' + 10),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_percent_escapes() {
        let mut buf = b"a%20b%2Bc".to_vec();
        let n = percent_decode_in_place(&mut buf);
        assert_eq!(&buf[..n], b"a b+c");
    }

    #[test]
    fn invalid_escape_passes_through() {
        let mut buf = b"a%zzb".to_vec();
        let n = percent_decode_in_place(&mut buf);
        assert_eq!(&buf[..n], b"a%zzb");
    }
}
