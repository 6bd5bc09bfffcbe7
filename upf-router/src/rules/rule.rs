use super::RuleError;
use crate::packet::Ipv4View;
use std::net::Ipv4Addr;
use std::str::FromStr;

/// A single match predicate over a decoded IPv4 packet.
///
/// A rule is a whitespace-separated conjunction of terms; every term must
/// match for the rule to match.  Terms:
///
/// ```text
/// any                    matches every IPv4 packet
/// src <addr>[/<prefix>]  source address in CIDR range
/// dst <addr>[/<prefix>]  destination address in CIDR range
/// proto <tcp|udp|icmp|n> IP protocol number
/// sport <port[-port]>    TCP/UDP source port (range)
/// dport <port[-port]>    TCP/UDP destination port (range)
/// ```
///
/// Port terms never match packets whose transport ports could not be
/// decoded (non-TCP/UDP, or a non-first fragment).
#[derive(Debug, Clone)]
pub struct Rule {
    text: String,
    terms: Vec<Term>,
}

#[derive(Debug, Clone)]
enum Term {
    Any,
    Src(Cidr),
    Dst(Cidr),
    Proto(u8),
    SrcPort(u16, u16),
    DstPort(u16, u16),
}

#[derive(Debug, Clone, Copy)]
struct Cidr {
    network: u32,
    mask: u32,
}

impl Cidr {
    fn parse(s: &str) -> Option<Cidr> {
        let (addr, prefix) = match s.split_once('/') {
            Some((addr, prefix)) => (addr, prefix.parse::<u32>().ok().filter(|p| *p <= 32)?),
            None => (s, 32),
        };
        let addr: Ipv4Addr = addr.parse().ok()?;
        let mask = if prefix == 0 {
            0
        } else {
            u32::MAX << (32 - prefix)
        };
        Some(Cidr {
            network: u32::from(addr) & mask,
            mask,
        })
    }

    fn contains(&self, addr: Ipv4Addr) -> bool {
        (u32::from(addr) & self.mask) == self.network
    }
}

impl Rule {
    pub fn matches(&self, packet: &Ipv4View) -> bool {
        self.terms.iter().all(|term| term.matches(packet))
    }
}

impl Term {
    fn matches(&self, packet: &Ipv4View) -> bool {
        match self {
            Term::Any => true,
            Term::Src(cidr) => cidr.contains(packet.src),
            Term::Dst(cidr) => cidr.contains(packet.dst),
            Term::Proto(protocol) => packet.protocol == *protocol,
            Term::SrcPort(lo, hi) => packet.src_port.is_some_and(|p| p >= *lo && p <= *hi),
            Term::DstPort(lo, hi) => packet.dst_port.is_some_and(|p| p >= *lo && p <= *hi),
        }
    }
}

fn parse_error(text: &str, reason: impl Into<String>) -> RuleError {
    RuleError::Parse {
        text: text.trim().to_string(),
        reason: reason.into(),
    }
}

fn parse_proto(arg: &str) -> Option<u8> {
    match arg {
        "icmp" => Some(1),
        "tcp" => Some(6),
        "udp" => Some(17),
        number => number.parse().ok(),
    }
}

fn parse_port_range(arg: &str) -> Option<(u16, u16)> {
    let (lo, hi) = match arg.split_once('-') {
        Some((lo, hi)) => (lo.parse().ok()?, hi.parse().ok()?),
        None => {
            let port = arg.parse().ok()?;
            (port, port)
        }
    };
    (lo <= hi).then_some((lo, hi))
}

impl FromStr for Rule {
    type Err = RuleError;

    fn from_str(s: &str) -> Result<Self, RuleError> {
        let text = s.trim().to_string();
        if text.is_empty() {
            return Err(parse_error(s, "empty rule"));
        }

        let mut terms = Vec::new();
        let mut tokens = text.split_whitespace();
        while let Some(keyword) = tokens.next() {
            let mut arg = || {
                tokens
                    .next()
                    .ok_or_else(|| parse_error(s, format!("'{keyword}' needs an argument")))
            };
            let term = match keyword {
                "any" => Term::Any,
                "src" => {
                    let arg = arg()?;
                    Term::Src(
                        Cidr::parse(arg)
                            .ok_or_else(|| parse_error(s, format!("bad address '{arg}'")))?,
                    )
                }
                "dst" => {
                    let arg = arg()?;
                    Term::Dst(
                        Cidr::parse(arg)
                            .ok_or_else(|| parse_error(s, format!("bad address '{arg}'")))?,
                    )
                }
                "proto" => {
                    let arg = arg()?;
                    Term::Proto(
                        parse_proto(arg)
                            .ok_or_else(|| parse_error(s, format!("bad protocol '{arg}'")))?,
                    )
                }
                "sport" => {
                    let arg = arg()?;
                    let (lo, hi) = parse_port_range(arg)
                        .ok_or_else(|| parse_error(s, format!("bad port range '{arg}'")))?;
                    Term::SrcPort(lo, hi)
                }
                "dport" => {
                    let arg = arg()?;
                    let (lo, hi) = parse_port_range(arg)
                        .ok_or_else(|| parse_error(s, format!("bad port range '{arg}'")))?;
                    Term::DstPort(lo, hi)
                }
                other => return Err(parse_error(s, format!("unknown keyword '{other}'"))),
            };
            terms.push(term);
        }

        Ok(Rule { text, terms })
    }
}

impl std::fmt::Display for Rule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.text)
    }
}
