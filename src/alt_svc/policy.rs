//! Trust policy for advertised alternates.
//!
//! # Responsibilities
//! - Accept same-host alternates (different port only)
//! - Reject an origin advertising its own authority
//! - Optionally accept loopback alternates for test/debug setups
//! - Pick the single record the routing transport acts upon
//!
//! # Design Decisions
//! - An origin must not be able to move its clients to an arbitrary host
//!   with a response header; only the port may change by default
//! - Loopback relaxation is opt-in and never on by default
//! - Rejections are not errors

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use crate::alt_svc::record::{AltServiceRecord, Origin};
use crate::config::AltSvcConfig;

/// Decides whether an advertised alternate may be used for an origin.
#[derive(Debug, Clone, Copy, Default)]
pub struct SecurityPolicy {
    localhost_allowed: bool,
}

impl SecurityPolicy {
    pub fn new(config: &AltSvcConfig) -> Self {
        Self {
            localhost_allowed: config.localhost_allowed,
        }
    }

    /// True if `candidate` may serve requests addressed to `origin`.
    pub fn accept(&self, origin: &Origin, candidate: &AltServiceRecord) -> bool {
        if candidate.host.eq_ignore_ascii_case(origin.host()) {
            // the origin itself is not an alternate
            return candidate.port != origin.port();
        }
        self.localhost_allowed && is_loopback(&candidate.host)
    }

    /// First acceptable `h2` record in advertisement order.
    pub fn select<'a>(
        &self,
        origin: &Origin,
        candidates: &'a [AltServiceRecord],
    ) -> Option<&'a AltServiceRecord> {
        candidates
            .iter()
            .filter(|candidate| candidate.is_h2())
            .find(|candidate| self.accept(origin, candidate))
    }
}

/// Stateless form of [`SecurityPolicy::accept`].
pub fn accept(origin: &Origin, candidate: &AltServiceRecord, config: &AltSvcConfig) -> bool {
    SecurityPolicy::new(config).accept(origin, candidate)
}

/// `localhost`, `127.0.0.1` or `::1`.
pub fn is_loopback(host: &str) -> bool {
    if host.eq_ignore_ascii_case("localhost") {
        return true;
    }
    match host.trim_start_matches('[').trim_end_matches(']').parse::<IpAddr>() {
        Ok(IpAddr::V4(ip)) => ip == Ipv4Addr::LOCALHOST,
        Ok(IpAddr::V6(ip)) => ip == Ipv6Addr::LOCALHOST,
        Err(_) => false,
    }
}
