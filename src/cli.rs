//! CLI token parsing: the three arguments the core recognizes,
//! leaving everything else for the embedding application to interpret.

use std::time::Duration;

/// Parsed value of the three recognized tokens.
#[derive(Debug, Clone, Default)]
pub struct CliOptions {
    pub http_service: Option<String>,
    pub http_debug: bool,
    pub http_ttl: Option<u32>,
}

/// Splits `args` into recognized options and the unrecognized remainder,
/// preserving the remainder's relative order; unknown arguments are
/// preserved and returned to the caller.
pub fn parse_args<I, S>(args: I) -> (CliOptions, Vec<String>)
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut opts = CliOptions::default();
    let mut rest = Vec::new();

    for arg in args {
        let arg = arg.as_ref();
        if let Some(value) = arg.strip_prefix("-http-service=") {
            opts.http_service = Some(value.to_string());
        } else if arg == "-http-debug" {
            opts.http_debug = true;
        } else if let Some(value) = arg.strip_prefix("-http-ttl=") {
            opts.http_ttl = value.parse().ok();
        } else {
            rest.push(arg.to_string());
        }
    }

    (opts, rest)
}

/// Resolves the `-http-service` token into a TCP port: a literal decimal
/// port number, or the token `dynamic` meaning "let the OS assign one"
/// (port 0), consumed by [`crate::reactor::ReactorBuilder::open`].
pub fn resolve_service(token: &str) -> std::io::Result<u16> {
    if token.eq_ignore_ascii_case("dynamic") {
        return Ok(0);
    }
    token
        .parse::<u16>()
        .map_err(|_| std::io::Error::new(std::io::ErrorKind::InvalidInput, "unrecognized -http-service token"))
}

/// Best-effort ~1 Hz period for [`crate::reactor::Reactor::background`],
/// named here rather than left as a magic number in the reactor.
pub const BACKGROUND_PERIOD_FLOOR: Duration = Duration::from_millis(1);

#[cfg(test)]
mod tests {
    use super::*;

    #[rustfmt::skip]
    #[test]
    fn recognizes_known_tokens_and_preserves_the_rest() {
        let args = ["-http-service=8080", "-http-debug", "-http-ttl=64", "--foo", "bar"];
        let (opts, rest) = parse_args(args);
        assert_eq!(opts.http_service.as_deref(), Some("8080"));
        assert!(opts.http_debug);
        assert_eq!(opts.http_ttl, Some(64));
        assert_eq!(rest, vec!["--foo".to_string(), "bar".to_string()]);
    }

    #[test]
    fn dynamic_resolves_to_port_zero() {
        assert_eq!(resolve_service("dynamic").unwrap(), 0);
        assert_eq!(resolve_service("DYNAMIC").unwrap(), 0);
    }

    #[test]
    fn numeric_service_parses_as_port() {
        assert_eq!(resolve_service("8080").unwrap(), 8080);
    }

    #[test]
    fn garbage_service_is_rejected() {
        assert!(resolve_service("http").is_err());
    }
}
