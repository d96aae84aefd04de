//! Transport URI parsing: `scheme://host:port/path#option`, with the `scheme:port` shorthand.
//! Grounded on the prior `PeerInfo` parsing conventions in `types.rs` (a typed wrapper
//! validated at construction rather than carried as a raw `String`).

use std::fmt;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TransportParseError {
    #[error("transport URI missing scheme")]
    MissingScheme,
    #[error("transport URI has invalid port {0}")]
    InvalidPort(String),
    #[error("transport URI port out of range: {0}")]
    PortOutOfRange(u32),
}

/// A single parsed transport endpoint: `scheme://host:port/path#option`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transport {
    pub scheme: String,
    pub host: Option<String>,
    pub port: u16,
    pub path: Option<String>,
    pub option: Option<String>,
}

impl Transport {
    pub fn parse(s: &str) -> Result<Self, TransportParseError> {
        let (scheme, rest) = s.split_once(':').ok_or(TransportParseError::MissingScheme)?;
        if scheme.is_empty() {
            return Err(TransportParseError::MissingScheme);
        }
        let scheme = scheme.to_string();

        // Split off the fragment (#option) first, then the path, matching
        // the grammar's fixed ordering: host:port comes before path comes
        // before fragment.
        let (main, option) = match rest.split_once('#') {
            Some((m, o)) => (m, Some(o.to_string())),
            None => (rest, None),
        };

        let (host_port, path) = if let Some(stripped) = main.strip_prefix("//") {
            match stripped.split_once('/') {
                Some((hp, p)) => (hp.to_string(), Some(p.to_string())),
                None => (stripped.to_string(), None),
            }
        } else {
            // Shorthand `scheme:port`, no leading `//`, no host, no path.
            (main.to_string(), None)
        };

        let (host, port_str) = match host_port.rsplit_once(':') {
            Some((h, p)) if !h.is_empty() => (Some(h.to_string()), p.to_string()),
            Some((_, p)) => (None, p.to_string()),
            None => (None, host_port),
        };

        let port: u32 = port_str
            .parse()
            .map_err(|_| TransportParseError::InvalidPort(port_str.clone()))?;
        if port == 0 || port > 65535 {
            return Err(TransportParseError::PortOutOfRange(port));
        }

        Ok(Self { scheme, host, port: port as u16, path, option })
    }
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:", self.scheme)?;
        if let Some(host) = &self.host {
            write!(f, "//{host}:{}", self.port)?;
        } else {
            write!(f, "{}", self.port)?;
        }
        if let Some(path) = &self.path {
            write!(f, "/{path}")?;
        }
        if let Some(opt) = &self.option {
            write!(f, "#{opt}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_form() {
        let t = Transport::parse("wss://example.com:443/relay#fast").unwrap();
        assert_eq!(t.scheme, "wss");
        assert_eq!(t.host.as_deref(), Some("example.com"));
        assert_eq!(t.port, 443);
        assert_eq!(t.path.as_deref(), Some("relay"));
        assert_eq!(t.option.as_deref(), Some("fast"));
    }

    #[test]
    fn parses_shorthand() {
        let t = Transport::parse("tcp:9050").unwrap();
        assert_eq!(t.scheme, "tcp");
        assert_eq!(t.host, None);
        assert_eq!(t.port, 9050);
    }

    #[test]
    fn rejects_zero_port() {
        assert!(matches!(Transport::parse("tcp:0"), Err(TransportParseError::PortOutOfRange(0))));
    }

    #[test]
    fn rejects_overflow_port() {
        assert!(matches!(Transport::parse("tcp:70000"), Err(TransportParseError::PortOutOfRange(70000))));
    }

    #[test]
    fn round_trip_normalizes_shorthand() {
        // stringifying a parsed URI normalizes
        // `//:port` (no host) down to the bare `:port` shorthand.
        let t = Transport::parse("tcp://:9050").unwrap();
        assert_eq!(t.to_string(), "tcp:9050");
    }

    #[test]
    fn round_trip_canonical() {
        let s = "wss://example.com:443/relay#fast";
        let t = Transport::parse(s).unwrap();
        assert_eq!(t.to_string(), s);
    }
}
