//! Origin identity and Alt-Svc record types.

use std::fmt;
use std::time::Instant;

use http::Uri;
use url::Url;

/// The only protocol id the routing transport acts upon.
pub const H2: &str = "h2";

/// The (scheme, host, port) triple a request targets. Used as the cache key.
///
/// Hosts are lower-cased and stored without IPv6 brackets; a missing port is
/// filled in from the scheme, so `https://example.com/` and
/// `https://EXAMPLE.com:443/x` share an origin.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Origin {
    scheme: String,
    host: String,
    port: u16,
}

impl Origin {
    /// Create an origin from its parts.
    pub fn new(scheme: impl Into<String>, host: &str, port: u16) -> Self {
        Self {
            scheme: scheme.into().to_ascii_lowercase(),
            host: normalize_host(host),
            port,
        }
    }

    /// Derive the origin of an absolute request URI.
    ///
    /// Returns `None` for relative URIs and for schemes without a known
    /// default port when no port is given.
    pub fn from_uri(uri: &Uri) -> Option<Self> {
        let scheme = uri.scheme_str()?;
        let host = uri.host().filter(|h| !h.is_empty())?;
        let port = uri.port_u16().or_else(|| default_port(scheme))?;
        Some(Self::new(scheme, host, port))
    }

    /// Derive the origin of a parsed URL.
    pub fn from_url(url: &Url) -> Option<Self> {
        let host = url.host_str().filter(|h| !h.is_empty())?;
        let port = url.port_or_known_default()?;
        Some(Self::new(url.scheme(), host, port))
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.scheme, authority(&self.host, self.port))
    }
}

/// Default port for the schemes this crate routes.
pub fn default_port(scheme: &str) -> Option<u16> {
    if scheme.eq_ignore_ascii_case("https") {
        Some(443)
    } else if scheme.eq_ignore_ascii_case("http") {
        Some(80)
    } else {
        None
    }
}

/// Lower-case a host and strip IPv6 brackets.
pub(crate) fn normalize_host(host: &str) -> String {
    host.trim_start_matches('[')
        .trim_end_matches(']')
        .to_ascii_lowercase()
}

/// Format `host:port`, bracketing IPv6 literals.
pub(crate) fn authority(host: &str, port: u16) -> String {
    if host.contains(':') {
        format!("[{}]:{}", host, port)
    } else {
        format!("{}:{}", host, port)
    }
}

/// One alternative service advertised by an origin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AltServiceRecord {
    /// ALPN protocol id (percent-decoded), e.g. `h2`.
    pub protocol_id: String,
    /// Alternate host, never empty (defaults to the origin's host).
    pub host: String,
    /// Alternate port.
    pub port: u16,
    /// Moment the advertisement stops being valid.
    pub expires_at: Instant,
    /// `persist=1` was present.
    pub persist: bool,
}

impl AltServiceRecord {
    pub fn is_expired_at(&self, now: Instant) -> bool {
        now >= self.expires_at
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Instant::now())
    }

    /// Whether the routing transport may select this record.
    pub fn is_h2(&self) -> bool {
        self.protocol_id == H2
    }

    /// `host:port` of the alternate, suitable for a URI authority.
    pub fn authority(&self) -> String {
        authority(&self.host, self.port)
    }

    /// True when both records point at the same host and port.
    pub fn same_authority(&self, other: &AltServiceRecord) -> bool {
        self.port == other.port && self.host.eq_ignore_ascii_case(&other.host)
    }
}
