use std::fmt;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use ipnet::IpNet;
use tracing::{debug, warn};

/// Anything able to give an allow/deny verdict for a client address.
pub trait AddressFilter: Send + Sync {
    fn allowed(&self, addr: IpAddr) -> bool;
}

/// An ordered list of allow and deny rules parsed from a raw rule string.
///
/// Entries are separated by `,` or `;`. Each entry is an address, a CIDR
/// block, or an IPv4 pattern whose octets may be `*` or an `a-b` range.
/// A leading `!` turns the entry into a deny rule. The first matching rule
/// wins; an address matching nothing is allowed only when there are no
/// allow rules at all, so an empty filter lets everyone in.
#[derive(Debug, Clone, Default)]
pub struct IpFilter {
    raw: String,
    rules: Vec<Rule>,
}

#[derive(Debug, Clone)]
struct Rule {
    allow: bool,
    matcher: Matcher,
}

#[derive(Debug, Clone)]
enum Matcher {
    Exact(IpAddr),
    Net(IpNet),
    Octets([OctetPattern; 4]),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OctetPattern {
    Any,
    Span(u8, u8),
}

impl IpFilter {
    pub fn from_raw(raw: &str) -> Self {
        let rules = raw
            .split([',', ';'])
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .filter_map(|entry| {
                let rule = Rule::parse(entry);
                if rule.is_none() {
                    warn!(entry, "ignoring unparseable ip filter entry");
                }
                rule
            })
            .collect();
        IpFilter { raw: raw.to_string(), rules }
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl AddressFilter for IpFilter {
    fn allowed(&self, addr: IpAddr) -> bool {
        let addr = addr.to_canonical();
        if let Some(rule) = self.rules.iter().find(|rule| rule.matcher.matches(&addr)) {
            return rule.allow;
        }
        !self.rules.iter().any(|rule| rule.allow)
    }
}

impl Rule {
    fn parse(entry: &str) -> Option<Self> {
        let (allow, pattern) = match entry.strip_prefix('!') {
            Some(rest) => (false, rest.trim()),
            None => (true, entry),
        };
        Matcher::parse(pattern).map(|matcher| Rule { allow, matcher })
    }
}

impl Matcher {
    fn parse(pattern: &str) -> Option<Self> {
        if let Ok(ip) = pattern.parse::<IpAddr>() {
            return Some(Matcher::Exact(ip.to_canonical()));
        }
        if let Ok(net) = pattern.parse::<IpNet>() {
            return Some(Matcher::Net(net));
        }
        let mut octets = [OctetPattern::Any; 4];
        let mut parts = pattern.split('.');
        for octet in octets.iter_mut() {
            *octet = OctetPattern::parse(parts.next()?)?;
        }
        if parts.next().is_some() {
            return None;
        }
        Some(Matcher::Octets(octets))
    }

    fn matches(&self, addr: &IpAddr) -> bool {
        match (self, addr) {
            (Matcher::Exact(ip), addr) => ip == addr,
            (Matcher::Net(net), addr) => net.contains(addr),
            (Matcher::Octets(patterns), IpAddr::V4(v4)) => octets_match(patterns, v4),
            (Matcher::Octets(_), IpAddr::V6(_)) => false,
        }
    }
}

fn octets_match(patterns: &[OctetPattern; 4], addr: &Ipv4Addr) -> bool {
    patterns
        .iter()
        .zip(addr.octets())
        .all(|(pattern, octet)| match *pattern {
            OctetPattern::Any => true,
            OctetPattern::Span(low, high) => (low..=high).contains(&octet),
        })
}

impl OctetPattern {
    fn parse(text: &str) -> Option<Self> {
        if text == "*" {
            return Some(OctetPattern::Any);
        }
        match text.split_once('-') {
            Some((low, high)) => {
                let low = low.parse().ok()?;
                let high = high.parse().ok()?;
                (low <= high).then_some(OctetPattern::Span(low, high))
            }
            None => text.parse().ok().map(|v| OctetPattern::Span(v, v)),
        }
    }
}

/// Server readiness, flipped by whoever owns startup once it completes.
#[derive(Debug, Clone, Default)]
pub struct Readiness(Arc<AtomicBool>);

impl Readiness {
    pub fn new(ready: bool) -> Self {
        Readiness(Arc::new(AtomicBool::new(ready)))
    }

    pub fn set_ready(&self, ready: bool) {
        self.0.store(ready, Ordering::Release);
    }

    pub fn is_ready(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Decides whether an inbound connection may be served.
#[derive(Clone)]
pub struct AccessGate {
    filter: Arc<dyn AddressFilter>,
}

impl AccessGate {
    pub fn new(filter: Arc<dyn AddressFilter>) -> Self {
        AccessGate { filter }
    }

    /// Denies everyone until the server is ready, then defers to the
    /// persistent filter.
    pub fn allowed(&self, remote: IpAddr, server_ready: bool) -> bool {
        if !server_ready {
            debug!(%remote, "rejecting request, server not ready");
            return false;
        }
        if !self.filter.allowed(remote) {
            debug!(%remote, "rejecting request, address filtered");
            return false;
        }
        true
    }

    /// One-off check against a rule string supplied by another feature.
    /// The persistent filter is neither consulted nor modified.
    pub fn adhoc_allowed(rules: &str, remote: IpAddr) -> bool {
        IpFilter::from_raw(rules).allowed(remote)
    }
}

impl fmt::Debug for AccessGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessGate").finish_non_exhaustive()
    }
}
