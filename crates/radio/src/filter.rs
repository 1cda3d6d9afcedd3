//! Capture-filter expressions for classifying link-layer frames
//!
//! Supports the commonly used subset of the pcap filter language:
//!
//! ```text
//! ether src|dst|host <mac>      ether broadcast      ether multicast
//! ether proto <n|ip|ip6|arp>    ip   ip6   arp   tcp   udp   icmp
//! ip proto <n|tcp|udp|icmp>     [src|dst] host <ipv4>
//! [src|dst] net <ipv4>/<len>    [tcp|udp] [src|dst] port <n>
//! less <n>                      greater <n>
//! ```
//!
//! combined with `not`/`!`, `and`/`&&`, `or`/`||` and parentheses. As in
//! pcap, `and` and `or` share one precedence level and associate to the
//! left, and negation binds tightest. An empty expression accepts every
//! frame.

use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use simple_wireless_core::{EthernetHeader, Mac48Address};
use thiserror::Error;

const ETHERTYPE_IPV4: u16 = 0x0800;
const ETHERTYPE_ARP: u16 = 0x0806;
const ETHERTYPE_IPV6: u16 = 0x86dd;

const PROTO_ICMP: u8 = 1;
const PROTO_TCP: u8 = 6;
const PROTO_UDP: u8 = 17;

const IPV6_HEADER_LEN: usize = 40;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FilterError {
    #[error("unexpected end of expression")]
    UnexpectedEnd,

    #[error("unexpected token {0:?}")]
    UnexpectedToken(String),

    #[error("invalid number {0:?}")]
    InvalidNumber(String),

    #[error("invalid address {0:?}")]
    InvalidAddress(String),

    #[error("invalid network {0:?}")]
    InvalidNetwork(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Dir {
    Src,
    Dst,
    Any,
}

impl Dir {
    fn test<T: PartialEq>(self, src: T, dst: T, wanted: impl Fn(&T) -> bool) -> bool {
        match self {
            Dir::Src => wanted(&src),
            Dir::Dst => wanted(&dst),
            Dir::Any => wanted(&src) || wanted(&dst),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Primitive {
    EtherAddr(Dir, Mac48Address),
    EtherBroadcast,
    EtherMulticast,
    EtherProto(u16),
    /// Transport protocol over IPv4 or IPv6.
    IpProto(u8),
    /// `ip proto`: transport protocol over IPv4 only.
    Ipv4Proto(u8),
    Host(Dir, Ipv4Addr),
    Net(Dir, Ipv4Addr, u8),
    /// `None` matches either TCP or UDP.
    Port(Option<u8>, Dir, u16),
    Less(usize),
    Greater(usize),
}

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Any,
    Prim(Primitive),
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
}

/// A compiled filter expression.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureFilter {
    source: String,
    expr: Expr,
}

impl CaptureFilter {
    pub fn compile(source: &str) -> Result<Self, FilterError> {
        let tokens = tokenize(source)?;
        let expr = if tokens.is_empty() {
            Expr::Any
        } else {
            let mut parser = Parser { tokens, pos: 0 };
            let expr = parser.expr()?;
            if let Some(tok) = parser.peek() {
                return Err(FilterError::UnexpectedToken(tok.to_string()));
            }
            expr
        };
        Ok(Self {
            source: source.to_string(),
            expr,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Evaluates against a whole frame, starting at the link header.
    pub fn matches(&self, frame: &[u8]) -> bool {
        eval(&self.expr, &Frame(frame))
    }
}

impl FromStr for CaptureFilter {
    type Err = FilterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::compile(s)
    }
}

impl fmt::Display for CaptureFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Word(String),
    LParen,
    RParen,
    Not,
    And,
    Or,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Word(w) => f.write_str(w),
            Token::LParen => f.write_str("("),
            Token::RParen => f.write_str(")"),
            Token::Not => f.write_str("not"),
            Token::And => f.write_str("and"),
            Token::Or => f.write_str("or"),
        }
    }
}

fn tokenize(source: &str) -> Result<Vec<Token>, FilterError> {
    let mut tokens = Vec::new();
    let mut chars = source.chars().peekable();
    while let Some(&c) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '(' => {
                chars.next();
                tokens.push(Token::LParen);
            }
            ')' => {
                chars.next();
                tokens.push(Token::RParen);
            }
            '!' => {
                chars.next();
                tokens.push(Token::Not);
            }
            '&' | '|' => {
                chars.next();
                if chars.next() != Some(c) {
                    return Err(FilterError::UnexpectedToken(c.to_string()));
                }
                tokens.push(if c == '&' { Token::And } else { Token::Or });
            }
            _ => {
                let mut word = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_whitespace() || matches!(c, '(' | ')' | '!' | '&' | '|') {
                        break;
                    }
                    word.push(c);
                    chars.next();
                }
                tokens.push(match word.as_str() {
                    "not" => Token::Not,
                    "and" => Token::And,
                    "or" => Token::Or,
                    _ => Token::Word(word),
                });
            }
        }
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_word(&self) -> Option<&str> {
        match self.peek() {
            Some(Token::Word(w)) => Some(w),
            _ => None,
        }
    }

    fn next(&mut self) -> Result<Token, FilterError> {
        let tok = self.tokens.get(self.pos).cloned().ok_or(FilterError::UnexpectedEnd)?;
        self.pos += 1;
        Ok(tok)
    }

    fn word(&mut self) -> Result<String, FilterError> {
        match self.next()? {
            Token::Word(w) => Ok(w),
            other => Err(FilterError::UnexpectedToken(other.to_string())),
        }
    }

    fn expect_word(&mut self, expected: &str) -> Result<(), FilterError> {
        let w = self.word()?;
        if w == expected {
            Ok(())
        } else {
            Err(FilterError::UnexpectedToken(w))
        }
    }

    fn expr(&mut self) -> Result<Expr, FilterError> {
        let mut lhs = self.unary()?;
        loop {
            match self.peek() {
                Some(Token::And) => {
                    self.pos += 1;
                    lhs = Expr::And(Box::new(lhs), Box::new(self.unary()?));
                }
                Some(Token::Or) => {
                    self.pos += 1;
                    lhs = Expr::Or(Box::new(lhs), Box::new(self.unary()?));
                }
                _ => return Ok(lhs),
            }
        }
    }

    fn unary(&mut self) -> Result<Expr, FilterError> {
        match self.next()? {
            Token::Not => Ok(Expr::Not(Box::new(self.unary()?))),
            Token::LParen => {
                let inner = self.expr()?;
                match self.next()? {
                    Token::RParen => Ok(inner),
                    other => Err(FilterError::UnexpectedToken(other.to_string())),
                }
            }
            Token::Word(w) => self.primitive(&w).map(Expr::Prim),
            other => Err(FilterError::UnexpectedToken(other.to_string())),
        }
    }

    fn primitive(&mut self, first: &str) -> Result<Primitive, FilterError> {
        match first {
            "ether" => self.ether(),
            "ip" if self.peek_word() == Some("proto") => {
                self.pos += 1;
                let w = self.word()?;
                Ok(Primitive::Ipv4Proto(match w.as_str() {
                    "tcp" => PROTO_TCP,
                    "udp" => PROTO_UDP,
                    "icmp" => PROTO_ICMP,
                    _ => parse_number(&w)?,
                }))
            }
            "ip" => Ok(Primitive::EtherProto(ETHERTYPE_IPV4)),
            "ip6" => Ok(Primitive::EtherProto(ETHERTYPE_IPV6)),
            "arp" => Ok(Primitive::EtherProto(ETHERTYPE_ARP)),
            "icmp" => Ok(Primitive::IpProto(PROTO_ICMP)),
            "tcp" | "udp" => {
                let proto = if first == "tcp" { PROTO_TCP } else { PROTO_UDP };
                match self.peek_word() {
                    Some("src" | "dst" | "port") => {
                        let dir = self.direction();
                        self.expect_word("port")?;
                        Ok(Primitive::Port(Some(proto), dir, parse_number(&self.word()?)?))
                    }
                    _ => Ok(Primitive::IpProto(proto)),
                }
            }
            "src" | "dst" => {
                let dir = if first == "src" { Dir::Src } else { Dir::Dst };
                let kind = self.word()?;
                self.qualified(dir, &kind)
            }
            "host" | "net" | "port" => self.qualified(Dir::Any, first),
            "less" => Ok(Primitive::Less(parse_number(&self.word()?)?)),
            "greater" => Ok(Primitive::Greater(parse_number(&self.word()?)?)),
            other => Err(FilterError::UnexpectedToken(other.to_string())),
        }
    }

    fn direction(&mut self) -> Dir {
        match self.peek_word() {
            Some("src") => {
                self.pos += 1;
                Dir::Src
            }
            Some("dst") => {
                self.pos += 1;
                Dir::Dst
            }
            _ => Dir::Any,
        }
    }

    fn qualified(&mut self, dir: Dir, kind: &str) -> Result<Primitive, FilterError> {
        let arg = self.word()?;
        match kind {
            "host" => Ok(Primitive::Host(dir, parse_ipv4(&arg)?)),
            "net" => {
                let (addr, len) = parse_net(&arg)?;
                Ok(Primitive::Net(dir, addr, len))
            }
            "port" => Ok(Primitive::Port(None, dir, parse_number(&arg)?)),
            other => Err(FilterError::UnexpectedToken(other.to_string())),
        }
    }

    fn ether(&mut self) -> Result<Primitive, FilterError> {
        let w = self.word()?;
        match w.as_str() {
            "src" | "dst" | "host" => {
                let dir = match w.as_str() {
                    "src" => Dir::Src,
                    "dst" => Dir::Dst,
                    _ => Dir::Any,
                };
                if dir != Dir::Any && self.peek_word() == Some("host") {
                    self.pos += 1;
                }
                let arg = self.word()?;
                let mac = arg
                    .parse::<Mac48Address>()
                    .map_err(|_| FilterError::InvalidAddress(arg.clone()))?;
                Ok(Primitive::EtherAddr(dir, mac))
            }
            "broadcast" => Ok(Primitive::EtherBroadcast),
            "multicast" => Ok(Primitive::EtherMulticast),
            "proto" => {
                let arg = self.word()?;
                Ok(Primitive::EtherProto(match arg.as_str() {
                    "ip" => ETHERTYPE_IPV4,
                    "ip6" => ETHERTYPE_IPV6,
                    "arp" => ETHERTYPE_ARP,
                    _ => parse_number(&arg)?,
                }))
            }
            _ => Err(FilterError::UnexpectedToken(w)),
        }
    }
}

fn parse_number<T: TryFrom<u64>>(s: &str) -> Result<T, FilterError> {
    let value = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => s.parse::<u64>(),
    }
    .map_err(|_| FilterError::InvalidNumber(s.to_string()))?;
    T::try_from(value).map_err(|_| FilterError::InvalidNumber(s.to_string()))
}

fn parse_ipv4(s: &str) -> Result<Ipv4Addr, FilterError> {
    s.parse().map_err(|_| FilterError::InvalidAddress(s.to_string()))
}

fn parse_net(s: &str) -> Result<(Ipv4Addr, u8), FilterError> {
    let (addr, len) = s
        .split_once('/')
        .ok_or_else(|| FilterError::InvalidNetwork(s.to_string()))?;
    let addr = parse_ipv4(addr)?;
    let len: u8 = len
        .parse()
        .map_err(|_| FilterError::InvalidNetwork(s.to_string()))?;
    if len > 32 {
        return Err(FilterError::InvalidNetwork(s.to_string()));
    }
    Ok((addr, len))
}

/// Read-only view of a frame, every accessor bounds-checked.
struct Frame<'a>(&'a [u8]);

impl Frame<'_> {
    fn header(&self) -> Option<EthernetHeader> {
        EthernetHeader::read(self.0).ok()
    }

    fn ethertype(&self) -> Option<u16> {
        self.header().map(|h| h.protocol)
    }

    fn u8_at(&self, offset: usize) -> Option<u8> {
        self.0.get(offset).copied()
    }

    fn u16_at(&self, offset: usize) -> Option<u16> {
        let b = self.0.get(offset..offset + 2)?;
        Some(u16::from_be_bytes([b[0], b[1]]))
    }

    fn ipv4_at(&self, offset: usize) -> Option<Ipv4Addr> {
        let b = self.0.get(offset..offset + 4)?;
        Some(Ipv4Addr::new(b[0], b[1], b[2], b[3]))
    }

    /// IPv4 (src, dst) when the frame carries IPv4.
    fn ipv4_addrs(&self) -> Option<(Ipv4Addr, Ipv4Addr)> {
        if self.ethertype()? != ETHERTYPE_IPV4 {
            return None;
        }
        let ip = EthernetHeader::SIZE;
        Some((self.ipv4_at(ip + 12)?, self.ipv4_at(ip + 16)?))
    }

    /// Transport protocol and offset of the transport header. Non-first
    /// IPv4 fragments have no transport header.
    fn transport(&self) -> Option<(u8, Option<usize>)> {
        let ip = EthernetHeader::SIZE;
        match self.ethertype()? {
            ETHERTYPE_IPV4 => {
                let ihl = (self.u8_at(ip)? & 0x0f) as usize * 4;
                let proto = self.u8_at(ip + 9)?;
                let fragment_offset = self.u16_at(ip + 6)? & 0x1fff;
                Some((proto, (fragment_offset == 0).then_some(ip + ihl)))
            }
            ETHERTYPE_IPV6 => Some((self.u8_at(ip + 6)?, Some(ip + IPV6_HEADER_LEN))),
            _ => None,
        }
    }

    fn ports(&self, proto: Option<u8>) -> Option<(u16, u16)> {
        let (actual, offset) = self.transport()?;
        let wanted = match proto {
            Some(p) => actual == p,
            None => actual == PROTO_TCP || actual == PROTO_UDP,
        };
        if !wanted {
            return None;
        }
        let offset = offset?;
        Some((self.u16_at(offset)?, self.u16_at(offset + 2)?))
    }
}

fn in_net(addr: &Ipv4Addr, net: Ipv4Addr, len: u8) -> bool {
    let mask = if len == 0 { 0 } else { u32::MAX << (32 - len) };
    u32::from(*addr) & mask == u32::from(net) & mask
}

fn eval(expr: &Expr, frame: &Frame<'_>) -> bool {
    match expr {
        Expr::Any => true,
        Expr::Not(inner) => !eval(inner, frame),
        Expr::And(a, b) => eval(a, frame) && eval(b, frame),
        Expr::Or(a, b) => eval(a, frame) || eval(b, frame),
        Expr::Prim(p) => eval_primitive(p, frame),
    }
}

fn eval_primitive(p: &Primitive, frame: &Frame<'_>) -> bool {
    match p {
        Primitive::EtherAddr(dir, mac) => frame
            .header()
            .map(|h| dir.test(h.source, h.destination, |a| a == mac))
            .unwrap_or(false),
        Primitive::EtherBroadcast => frame
            .header()
            .map(|h| h.destination.is_broadcast())
            .unwrap_or(false),
        Primitive::EtherMulticast => frame
            .header()
            .map(|h| h.destination.is_group())
            .unwrap_or(false),
        Primitive::EtherProto(proto) => frame.ethertype() == Some(*proto),
        Primitive::IpProto(proto) => frame.transport().map(|(p, _)| p) == Some(*proto),
        Primitive::Ipv4Proto(proto) => {
            frame.ethertype() == Some(ETHERTYPE_IPV4)
                && frame.transport().map(|(p, _)| p) == Some(*proto)
        }
        Primitive::Host(dir, addr) => frame
            .ipv4_addrs()
            .map(|(src, dst)| dir.test(src, dst, |a| a == addr))
            .unwrap_or(false),
        Primitive::Net(dir, net, len) => frame
            .ipv4_addrs()
            .map(|(src, dst)| dir.test(src, dst, |a| in_net(a, *net, *len)))
            .unwrap_or(false),
        Primitive::Port(proto, dir, port) => frame
            .ports(*proto)
            .map(|(src, dst)| dir.test(src, dst, |p| p == port))
            .unwrap_or(false),
        Primitive::Less(n) => frame.0.len() <= *n,
        Primitive::Greater(n) => frame.0.len() >= *n,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ipv4_frame(dst_mac: Mac48Address, proto: u8, src: [u8; 4], dst: [u8; 4], ports: (u16, u16)) -> Vec<u8> {
        let header = EthernetHeader::new(Mac48Address::from_index(1), dst_mac, ETHERTYPE_IPV4);
        let mut frame = header.to_bytes().to_vec();
        let mut ip = vec![0u8; 20];
        ip[0] = 0x45;
        ip[9] = proto;
        ip[12..16].copy_from_slice(&src);
        ip[16..20].copy_from_slice(&dst);
        frame.extend(ip);
        frame.extend(ports.0.to_be_bytes());
        frame.extend(ports.1.to_be_bytes());
        frame.extend([0u8; 4]);
        frame
    }

    fn ipv6_udp(ports: (u16, u16)) -> Vec<u8> {
        let header = EthernetHeader::new(Mac48Address::from_index(1), Mac48Address::BROADCAST, ETHERTYPE_IPV6);
        let mut frame = header.to_bytes().to_vec();
        let mut ip = vec![0u8; IPV6_HEADER_LEN];
        ip[0] = 0x60;
        ip[6] = PROTO_UDP;
        ip[7] = 64;
        frame.extend(ip);
        frame.extend(ports.0.to_be_bytes());
        frame.extend(ports.1.to_be_bytes());
        frame.extend([0u8; 4]);
        frame
    }

    fn olsr() -> Vec<u8> {
        ipv4_frame(Mac48Address::BROADCAST, PROTO_UDP, [10, 0, 0, 1], [10, 0, 0, 255], (698, 698))
    }

    fn tcp_web() -> Vec<u8> {
        ipv4_frame(Mac48Address::from_index(2), PROTO_TCP, [10, 0, 0, 1], [192, 168, 1, 7], (40000, 80))
    }

    fn arp() -> Vec<u8> {
        let header = EthernetHeader::new(Mac48Address::from_index(3), Mac48Address::BROADCAST, ETHERTYPE_ARP);
        let mut frame = header.to_bytes().to_vec();
        frame.extend([0u8; 28]);
        frame
    }

    fn matches(rule: &str, frame: &[u8]) -> bool {
        CaptureFilter::compile(rule).unwrap().matches(frame)
    }

    #[test]
    fn test_protocol_primitives() {
        assert!(matches("ip", &olsr()));
        assert!(matches("udp", &olsr()));
        assert!(!matches("tcp", &olsr()));
        assert!(matches("tcp", &tcp_web()));
        assert!(matches("arp", &arp()));
        assert!(!matches("ip", &arp()));
        assert!(matches("ether proto 0x0806", &arp()));
        assert!(matches("ip proto 17", &olsr()));
        assert!(matches("ip proto udp", &olsr()));
    }

    #[test]
    fn test_ip_proto_is_ipv4_only() {
        let frame = ipv6_udp((698, 698));
        assert!(!matches("ip proto udp", &frame));
        assert!(!matches("ip proto 17", &frame));
        assert!(!matches("ip and udp", &frame));
        assert!(matches("ip6 and udp", &frame));
        assert!(matches("udp", &frame));
        assert!(matches("udp port 698", &frame));
    }

    #[test]
    fn test_ports_and_hosts() {
        assert!(matches("udp port 698", &olsr()));
        assert!(matches("port 80", &tcp_web()));
        assert!(!matches("udp port 80", &tcp_web()));
        assert!(matches("tcp dst port 80", &tcp_web()));
        assert!(!matches("tcp src port 80", &tcp_web()));
        assert!(matches("dst host 192.168.1.7", &tcp_web()));
        assert!(!matches("src host 192.168.1.7", &tcp_web()));
        assert!(matches("host 10.0.0.1", &tcp_web()));
        assert!(matches("src net 10.0.0.0/8", &tcp_web()));
        assert!(matches("net 192.168.0.0/16", &tcp_web()));
        assert!(!matches("dst net 10.0.0.0/24", &tcp_web()));
        assert!(!matches("port 698", &arp()));
    }

    #[test]
    fn test_link_primitives() {
        assert!(matches("ether broadcast", &olsr()));
        assert!(!matches("ether broadcast", &tcp_web()));
        assert!(matches("ether multicast", &arp()));
        assert!(matches("ether src 00:00:00:00:00:01", &tcp_web()));
        assert!(matches("ether dst host 00:00:00:00:00:02", &tcp_web()));
        assert!(matches("ether host 00:00:00:00:00:02", &tcp_web()));
        assert!(!matches("ether src 00:00:00:00:00:02", &tcp_web()));
        let len = olsr().len();
        assert!(matches(&format!("less {len}"), &olsr()));
        assert!(!matches(&format!("greater {}", len + 1), &olsr()));
    }

    #[test]
    fn test_operators() {
        assert!(matches("udp and port 698", &olsr()));
        assert!(matches("tcp || udp", &olsr()));
        assert!(matches("not tcp", &olsr()));
        assert!(matches("!tcp && ip", &olsr()));
        // left associative, no precedence between and/or
        assert!(matches("tcp and udp or arp", &arp()));
        assert!(!matches("arp or tcp and udp", &arp()));
        assert!(matches("arp or (tcp and udp)", &arp()));
        assert!(matches("not (tcp or arp)", &olsr()));
    }

    #[test]
    fn test_empty_rule_matches_everything() {
        let filter = CaptureFilter::compile("  ").unwrap();
        assert!(filter.matches(&olsr()));
        assert!(filter.matches(&[]));
    }

    #[test]
    fn test_short_frames_never_match_field_tests() {
        assert!(!matches("udp port 698", &olsr()[..30]));
        assert!(!matches("ether broadcast", &[0xff; 4]));
        assert!(matches("not ip", &[0u8; 3]));
    }

    #[test]
    fn test_compile_errors() {
        assert_eq!(CaptureFilter::compile("udp port"), Err(FilterError::UnexpectedEnd));
        assert!(matches!(CaptureFilter::compile("bogus"), Err(FilterError::UnexpectedToken(_))));
        assert!(matches!(CaptureFilter::compile("(udp"), Err(FilterError::UnexpectedEnd)));
        assert!(matches!(CaptureFilter::compile("udp)"), Err(FilterError::UnexpectedToken(_))));
        assert!(matches!(CaptureFilter::compile("port 70000"), Err(FilterError::InvalidNumber(_))));
        assert!(matches!(CaptureFilter::compile("host 10.0.0"), Err(FilterError::InvalidAddress(_))));
        assert!(matches!(CaptureFilter::compile("net 10.0.0.0/33"), Err(FilterError::InvalidNetwork(_))));
        assert!(matches!(CaptureFilter::compile("udp & tcp"), Err(FilterError::UnexpectedToken(_))));
        assert_eq!("udp".parse::<CaptureFilter>().unwrap().source(), "udp");
    }
}
