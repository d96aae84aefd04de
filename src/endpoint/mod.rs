//! Endpoint-list syntax and the entity matcher. Grounded on the prior `store::schema`-style
//! column separation: a small set of concrete variants behind one dispatch point, rather than a
//! `dyn Trait` per rule, since the variant set is closed and known at parse time.

mod parse;

pub use parse::{ParseError, ParsedRule};

use std::net::IpAddr;

/// Something a rule can be matched against: an IP, ASN, country, etc. In practice callers build
/// this from a resolved `Entity` (an IPv4 or IPv6 address plus whatever GeoIP metadata was
/// attached to it).
#[derive(Debug, Clone)]
pub struct Entity {
    pub ip: Option<IpAddr>,
    pub country: Option<String>,
    pub continent: Option<String>,
    pub asn: Option<u32>,
    pub domain: Option<String>,
    pub scope: Scope,
}

impl Entity {
    pub fn from_ip(ip: IpAddr) -> Self {
        Self { ip: Some(ip), country: None, continent: None, asn: None, domain: None, scope: Scope::of(ip) }
    }
}

/// IP scope classification used both for endpoint matching (`Localhost`, `LAN`, `Internet`
/// tokens) and for step 10 (scope verification against the map's configured
/// `ScopeLocal`/`ScopePublic`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Loopback,
    Lan,
    Internet,
    Invalid,
}

impl Scope {
    pub fn of(ip: IpAddr) -> Self {
        match ip {
            IpAddr::V4(v4) => {
                if v4.is_loopback() {
                    Scope::Loopback
                } else if v4.is_private() || v4.is_link_local() {
                    Scope::Lan
                } else if v4.is_unspecified() || v4.is_broadcast() || v4.is_documentation() {
                    Scope::Invalid
                } else {
                    Scope::Internet
                }
            }
            IpAddr::V6(v6) => {
                if v6.is_loopback() {
                    Scope::Loopback
                } else if v6.is_unspecified() {
                    Scope::Invalid
                } else if (v6.segments()[0] & 0xfe00) == 0xfc00 {
                    Scope::Lan
                } else {
                    Scope::Internet
                }
            }
        }
    }

    pub fn is_valid(self) -> bool {
        !matches!(self, Scope::Invalid)
    }
}

/// Outcome of matching an entity against an endpoint list: the list syntax allows both `+`
/// (permit) and `-` (deny) rules, and a value matching nothing in the list is neither.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Permit,
    Deny,
    NoMatch,
}

/// One parsed rule: sign, optional negation, the matcher itself, and an optional protocol/port
/// restriction.
#[derive(Debug, Clone)]
pub struct Rule {
    pub permit: bool,
    pub negate: bool,
    pub matcher: Matcher,
}

impl Rule {
    fn matches(&self, entity: &Entity) -> bool {
        let m = self.matcher.matches(entity);
        if self.negate { !m } else { m }
    }
}

/// The tagged union of matcher variants from the endpoint-list grammar.
#[derive(Debug, Clone)]
pub enum Matcher {
    Any,
    Ip(IpAddr),
    Cidr(IpAddr, u8),
    Country(String),
    Continent(String),
    Asn(u32),
    ScopeToken(Scope),
    Domain { pattern: String, zone: bool },
}

impl Matcher {
    fn matches(&self, e: &Entity) -> bool {
        match self {
            Matcher::Any => true,
            Matcher::Ip(ip) => e.ip == Some(*ip),
            Matcher::Cidr(base, prefix) => match (base, e.ip) {
                (IpAddr::V4(b), Some(IpAddr::V4(ip))) => {
                    let mask = if *prefix == 0 { 0 } else { u32::MAX << (32 - prefix) };
                    (u32::from(*b) & mask) == (u32::from(ip) & mask)
                }
                (IpAddr::V6(b), Some(IpAddr::V6(ip))) => {
                    let mask = if *prefix == 0 { 0u128 } else { u128::MAX << (128 - prefix) };
                    (u128::from(*b) & mask) == (u128::from(ip) & mask)
                }
                _ => false,
            },
            Matcher::Country(code) => e.country.as_deref() == Some(code.as_str()),
            Matcher::Continent(code) => e.continent.as_deref() == Some(code.as_str()),
            Matcher::Asn(n) => e.asn == Some(*n),
            Matcher::ScopeToken(s) => e.scope == *s,
            Matcher::Domain { pattern, zone } => match &e.domain {
                None => false,
                Some(d) => domain_matches(pattern, *zone, d),
            },
        }
    }
}

fn domain_matches(pattern: &str, zone: bool, domain: &str) -> bool {
    if zone {
        domain == pattern.trim_start_matches('.') || domain.ends_with(pattern)
    } else if let Some(rest) = pattern.strip_prefix('*') {
        domain.ends_with(rest)
    } else if let Some(rest) = pattern.strip_suffix('*') {
        domain.starts_with(rest)
    } else {
        domain == pattern
    }
}

/// A parsed endpoint list: evaluated top-to-bottom, first match wins, no match at all yields
/// `Verdict::NoMatch`.
#[derive(Debug, Clone, Default)]
pub struct EndpointList {
    rules: Vec<Rule>,
}

impl EndpointList {
    pub fn parse(text: &str) -> Result<Self, ParseError> {
        let mut rules = Vec::new();
        for (lineno, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let parsed = parse::parse_line(line).map_err(|e| e.with_line(lineno + 1))?;
            rules.push(parsed.into_rule());
        }
        Ok(Self { rules })
    }

    pub fn check(&self, entity: &Entity) -> Verdict {
        for rule in &self.rules {
            if rule.matches(entity) {
                return if rule.permit { Verdict::Permit } else { Verdict::Deny };
            }
        }
        Verdict::NoMatch
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// Builds a `Pin`-level predicate (`Matcher(Pin) -> bool` ) out of an `EndpointList` plus an
/// entity-resolution callback, used by policy-endpoint checks (`CheckHubPolicyWith`).
pub fn permits<F>(list: &EndpointList, entities: impl Iterator<Item = F>) -> bool
where
    F: Into<Entity>,
{
    for e in entities {
        if matches!(list.check(&e.into()), Verdict::Deny) {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{Ipv4Addr, Ipv6Addr};

    #[test]
    fn scope_classifies_loopback_lan_and_internet() {
        assert_eq!(Scope::of(Ipv4Addr::new(127, 0, 0, 1).into()), Scope::Loopback);
        assert_eq!(Scope::of(Ipv4Addr::new(192, 168, 1, 1).into()), Scope::Lan);
        assert_eq!(Scope::of(Ipv4Addr::new(8, 8, 8, 8).into()), Scope::Internet);
        assert_eq!(Scope::of(Ipv4Addr::new(0, 0, 0, 0).into()), Scope::Invalid);
        assert_eq!(Scope::of(Ipv6Addr::LOCALHOST.into()), Scope::Loopback);
    }

    #[test]
    fn scope_token_rule_matches_on_resolved_scope() {
        let list = EndpointList::parse("- LAN\n+ *").unwrap();
        let lan = Entity::from_ip(Ipv4Addr::new(10, 0, 0, 5).into());
        let wan = Entity::from_ip(Ipv4Addr::new(8, 8, 8, 8).into());
        assert_eq!(list.check(&lan), Verdict::Deny);
        assert_eq!(list.check(&wan), Verdict::Permit);
    }

    #[test]
    fn cidr_matches_within_prefix_only() {
        let list = EndpointList::parse("+ 203.0.113.0/24").unwrap();
        let inside = Entity::from_ip(Ipv4Addr::new(203, 0, 113, 200).into());
        let outside = Entity::from_ip(Ipv4Addr::new(203, 0, 114, 1).into());
        assert_eq!(list.check(&inside), Verdict::Permit);
        assert_eq!(list.check(&outside), Verdict::NoMatch);
    }

    #[test]
    fn no_match_when_nothing_in_the_list_applies() {
        let list = EndpointList::parse("+ DE").unwrap();
        let e = Entity::from_ip(Ipv4Addr::new(1, 1, 1, 1).into());
        assert_eq!(list.check(&e), Verdict::NoMatch);
    }

    #[test]
    fn permits_is_false_when_any_entity_is_denied() {
        let list = EndpointList::parse("- 10.0.0.0/8\n+ *").unwrap();
        let entities = vec![Ipv4Addr::new(1, 1, 1, 1), Ipv4Addr::new(10, 1, 1, 1)];
        assert!(!permits(&list, entities.into_iter().map(|ip| Entity::from_ip(ip.into()))));
    }

    #[test]
    fn permits_is_true_when_every_entity_is_permitted_or_unmatched() {
        let list = EndpointList::parse("- 10.0.0.0/8\n+ *").unwrap();
        let entities = vec![Ipv4Addr::new(1, 1, 1, 1), Ipv4Addr::new(8, 8, 8, 8)];
        assert!(permits(&list, entities.into_iter().map(|ip| Entity::from_ip(ip.into()))));
    }
}
