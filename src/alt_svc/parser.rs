//! Alt-Svc header parsing.
//!
//! # Grammar (RFC 7838 §3, reduced)
//! ```text
//! Alt-Svc       = clear / 1#alt-value
//! clear         = %s"clear"
//! alt-value     = protocol-id "=" alt-authority *( OWS ";" OWS parameter )
//! alt-authority = quoted-string   ; "[host]:port"
//! parameter     = "ma=" delta-seconds / "persist=1" / token "=" value
//! ```
//!
//! # Design Decisions
//! - Never fails as a whole: malformed entries are skipped individually
//! - `ma=0` means "already expired", so the entry is dropped here
//! - Unknown protocol ids are kept; selection happens in the policy layer

use std::time::{Duration, Instant};

use crate::alt_svc::record::{normalize_host, AltServiceRecord, Origin};

/// Max-age applied when an entry carries no `ma` parameter (24 hours).
pub const DEFAULT_MAX_AGE_SECS: u64 = 24 * 60 * 60;

/// Largest max-age honoured; bigger delta-seconds are clamped to it.
pub const MAX_AGE_CAP_SECS: u64 = 1 << 31;

/// Parsed form of one `Alt-Svc` field value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AltSvcHeader {
    /// The origin withdrew all alternatives.
    Clear,
    /// Alternatives in the order they were advertised.
    Services(Vec<AltServiceRecord>),
}

impl AltSvcHeader {
    /// Advertised records; empty for `clear`.
    pub fn services(&self) -> &[AltServiceRecord] {
        match self {
            AltSvcHeader::Clear => &[],
            AltSvcHeader::Services(services) => services,
        }
    }
}

/// Parse an `Alt-Svc` value received in a response from `origin`.
///
/// Entries that omit the host inherit `origin`'s host; expiry is computed
/// relative to `now`.
pub fn parse(value: &str, origin: &Origin, now: Instant, default_max_age: u64) -> AltSvcHeader {
    let entries = split_unquoted(value, ',');
    if entries.iter().any(|entry| entry.trim() == "clear") {
        return AltSvcHeader::Clear;
    }

    let services = entries
        .into_iter()
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .filter_map(|entry| {
            let parsed = parse_entry(entry, origin, now, default_max_age);
            if parsed.is_none() {
                tracing::trace!(entry, "Skipping malformed Alt-Svc entry");
            }
            parsed
        })
        .collect();

    AltSvcHeader::Services(services)
}

fn parse_entry(
    entry: &str,
    origin: &Origin,
    now: Instant,
    default_max_age: u64,
) -> Option<AltServiceRecord> {
    let mut parts = split_unquoted(entry, ';').into_iter();
    let (protocol, alt_authority) = parts.next()?.split_once('=')?;

    let protocol_id = percent_decode(protocol.trim())?;
    if protocol_id.is_empty() {
        return None;
    }
    let (host, port) = parse_alt_authority(&unquote(alt_authority.trim())?, origin)?;

    let mut max_age = default_max_age;
    let mut persist = false;
    for param in parts {
        let Some((name, value)) = param.split_once('=') else {
            continue;
        };
        let value = value.trim();
        let value = unquote(value).unwrap_or_else(|| value.to_string());
        match name.trim().to_ascii_lowercase().as_str() {
            // unparsable ma drops the entry
            "ma" => max_age = delta_seconds(&value)?,
            "persist" => persist = value == "1",
            _ => {}
        }
    }

    if max_age == 0 {
        return None;
    }
    let expires_at = now.checked_add(Duration::from_secs(max_age.min(MAX_AGE_CAP_SECS)))?;

    Some(AltServiceRecord {
        protocol_id,
        host,
        port,
        expires_at,
        persist,
    })
}

/// Parse delta-seconds, saturating values too large for `u64`.
fn delta_seconds(value: &str) -> Option<u64> {
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some(value.parse().unwrap_or(u64::MAX))
}

/// Split `"[host]:port"` / `"host:port"` / `":port"`.
fn parse_alt_authority(value: &str, origin: &Origin) -> Option<(String, u16)> {
    let (host, port) = match value.strip_prefix('[') {
        Some(rest) => {
            let (host, after) = rest.split_once(']')?;
            (host, after.strip_prefix(':')?)
        }
        None => {
            let (host, port) = value.rsplit_once(':')?;
            // unbracketed IPv6 is ambiguous
            if host.contains(':') {
                return None;
            }
            (host, port)
        }
    };

    let port: u16 = port.parse().ok().filter(|p| *p != 0)?;
    if host.is_empty() {
        return Some((origin.host().to_string(), port));
    }
    if host
        .chars()
        .any(|c| c.is_whitespace() || matches!(c, '/' | '@' | '?' | '#' | '[' | ']' | ',' | ';' | '\\'))
    {
        return None;
    }
    Some((normalize_host(host), port))
}

/// Strip the quotes of a quoted-string and resolve backslash escapes.
/// Returns `None` if `value` is not a complete quoted-string.
fn unquote(value: &str) -> Option<String> {
    let inner = value.strip_prefix('"')?.strip_suffix('"')?;
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => out.push(chars.next()?),
            '"' => return None,
            c => out.push(c),
        }
    }
    Some(out)
}

/// Decode `%XX` sequences of an ALPN protocol id.
fn percent_decode(value: &str) -> Option<String> {
    let bytes = value.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = value.get(i + 1..i + 3)?;
            out.push(u8::from_str_radix(hex, 16).ok()?);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).ok()
}

/// Split on `sep`, ignoring separators inside quoted strings.
fn split_unquoted(value: &str, sep: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut in_quotes = false;
    let mut escaped = false;
    let mut start = 0;

    for (i, c) in value.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' if in_quotes => escaped = true,
            '"' => in_quotes = !in_quotes,
            c if c == sep && !in_quotes => {
                parts.push(&value[start..i]);
                start = i + c.len_utf8();
            }
            _ => {}
        }
    }
    parts.push(&value[start..]);
    parts
}
