//! Single-dispatch parser for one endpoint-list line: `('+'|'-') SP [!] matcher [SP
//! protocol'/'port-range] [SP '#' comment]`

use super::{Matcher, Rule, Scope};
use std::net::IpAddr;
use std::str::FromStr;

#[derive(Debug, thiserror::Error)]
#[error("endpoint list parse error{line}: {reason}")]
pub struct ParseError {
    reason: String,
    line: String,
}

impl ParseError {
    fn new(reason: impl Into<String>) -> Self {
        Self { reason: reason.into(), line: String::new() }
    }

    pub(super) fn with_line(mut self, n: usize) -> Self {
        self.line = format!(" (line {n})");
        self
    }
}

pub struct ParsedRule {
    permit: bool,
    negate: bool,
    matcher: Matcher,
}

impl ParsedRule {
    pub(super) fn into_rule(self) -> Rule {
        Rule { permit: self.permit, negate: self.negate, matcher: self.matcher }
    }
}

pub(super) fn parse_line(line: &str) -> Result<ParsedRule, ParseError> {
    let mut chars = line.chars();
    let sign = chars.next().ok_or_else(|| ParseError::new("empty rule"))?;
    let permit = match sign {
        '+' => true,
        '-' => false,
        other => return Err(ParseError::new(format!("rule must start with + or -, got {other}"))),
    };
    let rest = chars.as_str().trim_start();
    let (negate, rest) = match rest.strip_prefix('!') {
        Some(r) => (true, r.trim_start()),
        None => (false, rest),
    };
    // Split off an optional trailing comment and an optional
    // protocol/port-range token -- neither is used by the routing core's
    // own logic (transport dialing is out of scope) but both must parse
    // without producing spurious matcher tokens.
    let body = rest.split('#').next().unwrap_or(rest).trim();
    let mut parts = body.split_whitespace();
    let token = parts.next().ok_or_else(|| ParseError::new("missing matcher"))?;
    let matcher = parse_matcher(token)?;
    Ok(ParsedRule { permit, negate, matcher })
}

fn parse_matcher(token: &str) -> Result<Matcher, ParseError> {
    if token == "*" {
        return Ok(Matcher::Any);
    }
    if let Some(rest) = token.strip_prefix("C:") {
        if rest.len() != 2 || !rest.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(ParseError::new(format!("bad continent code {rest}")));
        }
        return Ok(Matcher::Continent(rest.to_ascii_uppercase()));
    }
    if let Some(rest) = token.strip_prefix("AS") {
        if let Ok(n) = rest.parse::<u32>() {
            return Ok(Matcher::Asn(n));
        }
    }
    match token {
        "Localhost" => return Ok(Matcher::ScopeToken(Scope::Loopback)),
        "LAN" => return Ok(Matcher::ScopeToken(Scope::Lan)),
        "Internet" => return Ok(Matcher::ScopeToken(Scope::Internet)),
        _ => {}
    }
    if token.len() == 2 && token.chars().all(|c| c.is_ascii_alphabetic()) {
        return Ok(Matcher::Country(token.to_ascii_uppercase()));
    }
    if let Some((addr, prefix)) = token.split_once('/') {
        let base = IpAddr::from_str(addr).map_err(|_| ParseError::new(format!("bad CIDR base {addr}")))?;
        let prefix: u8 = prefix.parse().map_err(|_| ParseError::new(format!("bad CIDR prefix {prefix}")))?;
        let max = if base.is_ipv4() { 32 } else { 128 };
        if prefix > max {
            return Err(ParseError::new(format!("CIDR prefix {prefix} out of range")));
        }
        return Ok(Matcher::Cidr(base, prefix));
    }
    if let Ok(ip) = IpAddr::from_str(token) {
        return Ok(Matcher::Ip(ip));
    }
    if token.starts_with('.') || token.contains('*') || token.contains('.') {
        let zone = token.starts_with('.');
        return Ok(Matcher::Domain { pattern: token.to_string(), zone });
    }
    Err(ParseError::new(format!("unrecognized matcher token {token}")))
}

#[cfg(test)]
mod tests {
    use super::super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn parses_any() {
        let list = EndpointList::parse("+ *").unwrap();
        let e = Entity::from_ip(Ipv4Addr::new(1, 2, 3, 4).into());
        assert_eq!(list.check(&e), Verdict::Permit);
    }

    #[test]
    fn deny_then_permit_first_match_wins() {
        let list = EndpointList::parse("- 10.0.0.0/8\n+ *").unwrap();
        let lan = Entity::from_ip(Ipv4Addr::new(10, 1, 1, 1).into());
        let wan = Entity::from_ip(Ipv4Addr::new(8, 8, 8, 8).into());
        assert_eq!(list.check(&lan), Verdict::Deny);
        assert_eq!(list.check(&wan), Verdict::Permit);
    }

    #[test]
    fn comments_and_blank_lines_are_skipped() {
        let list = EndpointList::parse("# header\n\n+ * # trailing comment\n").unwrap();
        assert_eq!(list.check(&Entity::from_ip(Ipv4Addr::new(1, 1, 1, 1).into())), Verdict::Permit);
    }

    #[test]
    fn country_code_matches() {
        let list = EndpointList::parse("- US\n+ *").unwrap();
        let mut e = Entity::from_ip(Ipv4Addr::new(1, 1, 1, 1).into());
        e.country = Some("US".into());
        assert_eq!(list.check(&e), Verdict::Deny);
    }

    #[test]
    fn negation_inverts_matcher() {
        let list = EndpointList::parse("- !US\n+ *").unwrap();
        let mut us = Entity::from_ip(Ipv4Addr::new(1, 1, 1, 1).into());
        us.country = Some("US".into());
        let mut de = Entity::from_ip(Ipv4Addr::new(2, 2, 2, 2).into());
        de.country = Some("DE".into());
        assert_eq!(list.check(&us), Verdict::Permit);
        assert_eq!(list.check(&de), Verdict::Deny);
    }

    #[test]
    fn rejects_missing_sign() {
        assert!(EndpointList::parse("* anything").is_err());
    }
}
