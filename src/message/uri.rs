use std::borrow::Cow;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr};
use std::str::FromStr;
use std::sync::Arc;

use itertools::Itertools;

use super::{Method, Params, TransportKind};
use crate::error::Error;
use crate::parser::Parser;

/// A SIP address.
///
/// Represents the addr-spec / name-addr alternative used in From, To,
/// Contact, Route and Record-Route headers: either a plain [`Uri`] or a
/// [`NameAddr`] (a bracketed URI with optional display name).
///
/// # Examples
///
/// ```rust
/// use imsua::message::SipAddr;
///
/// let uri: SipAddr = "sip:alice@example.com".parse().unwrap();
/// assert!(uri.is_uri());
///
/// let name_addr: SipAddr = "\"Alice\" <sip:alice@example.com>".parse().unwrap();
/// assert!(name_addr.is_name_addr());
/// ```
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum SipAddr {
    /// A plain SIP URI (e.g. `sip:user@example.com`)
    Uri(Uri),
    /// A named address (e.g. `"Alice" <sip:user@example.com>`)
    NameAddr(NameAddr),
}

impl SipAddr {
    /// Returns `true` if this is a [`SipAddr::NameAddr`] variant.
    pub fn is_name_addr(&self) -> bool {
        matches!(self, SipAddr::NameAddr(_))
    }

    /// Returns `true` if this is a [`SipAddr::Uri`] variant.
    pub fn is_uri(&self) -> bool {
        matches!(self, SipAddr::Uri(_))
    }

    /// Returns a reference to the inner [`Uri`].
    pub fn uri(&self) -> &Uri {
        match self {
            SipAddr::Uri(uri) => uri,
            SipAddr::NameAddr(name_addr) => &name_addr.uri,
        }
    }

    /// Consumes the address, returning the inner [`Uri`].
    pub fn into_uri(self) -> Uri {
        match self {
            SipAddr::Uri(uri) => uri,
            SipAddr::NameAddr(name_addr) => name_addr.uri,
        }
    }

    /// Returns the display part if present.
    pub fn display(&self) -> Option<&str> {
        if let SipAddr::NameAddr(addr) = self {
            addr.display()
        } else {
            None
        }
    }

    /// Returns the scheme of the uri.
    pub fn scheme(&self) -> Scheme {
        self.uri().scheme
    }

    /// Returns the user part of the uri.
    pub fn user(&self) -> Option<&UserInfo> {
        self.uri().user.as_ref()
    }

    /// Returns a reference to the [`HostPort`] of the uri.
    pub fn host_port(&self) -> &HostPort {
        &self.uri().host_port
    }
}

impl From<Uri> for SipAddr {
    fn from(uri: Uri) -> Self {
        SipAddr::Uri(uri)
    }
}

impl From<NameAddr> for SipAddr {
    fn from(addr: NameAddr) -> Self {
        SipAddr::NameAddr(addr)
    }
}

impl FromStr for SipAddr {
    type Err = Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        Parser::new(s.as_bytes()).parse_sip_addr(true)
    }
}

impl fmt::Display for SipAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SipAddr::Uri(uri) => write!(f, "{}", uri),
            SipAddr::NameAddr(addr) => write!(f, "{}", addr),
        }
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Default, Copy)]
/// A URI scheme: `sip`, `sips` or `tel`.
pub enum Scheme {
    #[default]
    /// A sip uri scheme.
    Sip,
    /// A sips uri scheme.
    Sips,
    /// A tel uri scheme (RFC 3966).
    Tel,
}

impl Scheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::Sip => "sip",
            Scheme::Sips => "sips",
            Scheme::Tel => "tel",
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, PartialEq, Eq, Default, Clone)]
/// A SIP uri.
pub struct Uri {
    /// The uri scheme.
    pub scheme: Scheme,
    /// Optional user part of uri.
    pub user: Option<UserInfo>,
    /// The uri host.
    pub host_port: HostPort,
    /// The user parameter.
    pub user_param: Option<Arc<str>>,
    /// The method parameter.
    pub method_param: Option<Method>,
    /// The transport parameter.
    pub transport_param: Option<TransportKind>,
    /// The ttl parameter.
    pub ttl_param: Option<u8>,
    /// The lr parameter.
    pub lr_param: bool,
    /// The maddr parameter.
    pub maddr_param: Option<Host>,
    /// Other parameters.
    pub parameters: Option<Params>,
    /// Optional header parameters (the `?key=value` suffix).
    pub headers: Option<Params>,
}

impl Uri {
    /// Returns a builder to create a `Uri`.
    pub fn builder() -> UriBuilder {
        UriBuilder::new()
    }

    /// Creates a `Uri` instance.
    pub fn new(scheme: Scheme, user: Option<UserInfo>, host_port: HostPort) -> Self {
        Uri {
            scheme,
            user,
            host_port,
            ..Default::default()
        }
    }

    /// Returns the user name, if any.
    pub fn user_name(&self) -> Option<&str> {
        self.user.as_ref().map(|u| u.user())
    }

    /// Returns a copy of this uri with every parameter not allowed in a
    /// Request-URI removed (RFC 3261 §12.2.1.1 strict-route rewriting).
    pub fn without_route_params(&self) -> Uri {
        Uri {
            scheme: self.scheme,
            user: self.user.clone(),
            host_port: self.host_port.clone(),
            transport_param: self.transport_param,
            maddr_param: self.maddr_param.clone(),
            user_param: self.user_param.clone(),
            ..Default::default()
        }
    }

    /// URI comparison as per RFC 3261 §19.1.4.
    ///
    /// Scheme and host compare case-insensitively, user and password
    /// case-sensitively; a present port only matches a present equal
    /// port; the `user`, `ttl`, `method`, `maddr` and `transport`
    /// parameters must agree when present in both uris; any other
    /// parameter appearing in both must match; header parameters must
    /// be identical.
    pub fn equivalent(&self, other: &Uri) -> bool {
        if self.scheme != other.scheme {
            return false;
        }
        if self.user != other.user {
            return false;
        }
        if !self.host_port.host.matches(&other.host_port.host) {
            return false;
        }
        if self.host_port.port != other.host_port.port {
            return false;
        }

        // Special parameters must agree whenever one side carries them.
        if self.transport_param.is_some() || other.transport_param.is_some() {
            if self.transport_param != other.transport_param {
                return false;
            }
        }
        if self.user_param.is_some() || other.user_param.is_some() {
            if self.user_param != other.user_param {
                return false;
            }
        }
        if self.ttl_param.is_some() || other.ttl_param.is_some() {
            if self.ttl_param != other.ttl_param {
                return false;
            }
        }
        if self.method_param.is_some() || other.method_param.is_some() {
            if self.method_param != other.method_param {
                return false;
            }
        }
        if self.maddr_param.is_some() || other.maddr_param.is_some() {
            let same = match (&self.maddr_param, &other.maddr_param) {
                (Some(a), Some(b)) => a.matches(b),
                _ => false,
            };
            if !same {
                return false;
            }
        }

        // Any other uri-parameter appearing in both must match.
        if let (Some(a), Some(b)) = (&self.parameters, &other.parameters) {
            for param in a.iter() {
                if let Some(other_value) = b.get(&param.name) {
                    if param.value.as_deref() != other_value {
                        return false;
                    }
                }
            }
        }

        self.headers == other.headers
    }
}

impl FromStr for Uri {
    type Err = Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        let mut p = Parser::new(s.as_bytes());

        p.parse_uri(true)
    }
}

impl fmt::Display for Uri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:", self.scheme)?;

        if self.scheme == Scheme::Tel {
            if let Some(user) = &self.user {
                write!(f, "{}", user.user)?;
            }
            return Ok(());
        }

        if let Some(user) = &self.user {
            write!(f, "{}", user.user)?;
            if let Some(pass) = &user.pass {
                write!(f, ":{}", pass)?;
            }
            write!(f, "@")?;
        }
        write!(f, "{}", self.host_port)?;

        if let Some(user) = &self.user_param {
            write!(f, ";user={}", user)?;
        }
        if let Some(method) = &self.method_param {
            write!(f, ";method={}", method)?;
        }
        if let Some(maddr) = &self.maddr_param {
            write!(f, ";maddr={}", maddr)?;
        }
        if let Some(transport) = &self.transport_param {
            write!(f, ";transport={}", transport.as_str().to_ascii_lowercase())?;
        }
        if let Some(ttl) = self.ttl_param {
            write!(f, ";ttl={}", ttl)?;
        }
        if self.lr_param {
            write!(f, ";lr")?;
        }
        if let Some(params) = &self.parameters {
            write!(f, ";{}", params)?;
        }
        if let Some(hdr_params) = &self.headers {
            let formatter = Itertools::format_with(hdr_params.iter(), "&", |it, f| {
                f(&format_args!(
                    "{}={}",
                    it.name,
                    it.value.as_deref().unwrap_or("")
                ))
            });
            write!(f, "?{}", formatter)?;
        }

        Ok(())
    }
}

#[derive(Default)]
/// Builder for creating a new SIP URI.
pub struct UriBuilder {
    uri: Uri,
}

impl UriBuilder {
    /// Creates a new `UriBuilder`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the uri scheme.
    pub fn scheme(mut self, scheme: Scheme) -> Self {
        self.uri.scheme = scheme;
        self
    }

    /// Sets the user part of the uri.
    pub fn user(mut self, user: UserInfo) -> Self {
        self.uri.user = Some(user);
        self
    }

    /// Sets the host of the uri.
    pub fn host(mut self, host_port: HostPort) -> Self {
        self.uri.host_port = host_port;
        self
    }

    /// Sets the transport parameter of the uri.
    pub fn transport_param(mut self, param: TransportKind) -> Self {
        self.uri.transport_param = Some(param);
        self
    }

    /// Sets the lr parameter of the uri.
    pub fn lr_param(mut self, param: bool) -> Self {
        self.uri.lr_param = param;
        self
    }

    /// Set a generic parameter of the uri.
    pub fn param(mut self, name: &str, value: Option<&str>) -> Self {
        let params = self.uri.parameters.get_or_insert_with(Params::new);
        params.push(super::Param::new(name, value));
        self
    }

    /// Finalize the builder into a `Uri`.
    pub fn build(self) -> Uri {
        self.uri
    }
}

/// A SIP `name-addr`.
///
/// Typically appears in `From`, `To`, and `Contact` headers. Contains a
/// sip uri and an optional display part.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct NameAddr {
    /// The optional display part.
    pub display: Option<Arc<str>>,
    /// The uri of the `name-addr`.
    pub uri: Uri,
}

impl NameAddr {
    /// Creates a `NameAddr` without a display part.
    pub fn new(uri: Uri) -> Self {
        Self { display: None, uri }
    }

    /// Returns the display part if present.
    pub fn display(&self) -> Option<&str> {
        self.display.as_deref()
    }
}

impl FromStr for NameAddr {
    type Err = Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        let mut p = Parser::new(s.as_bytes());

        p.parse_name_addr()
    }
}

impl fmt::Display for NameAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(display) = &self.display {
            write!(f, "\"{}\" ", display)?;
        }
        write!(f, "<{}>", self.uri)?;

        Ok(())
    }
}

/// The user information component of a URI.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct UserInfo {
    /// The username part of the URI.
    pub user: Arc<str>,
    /// The optional password associated with the user.
    pub pass: Option<Arc<str>>,
}

impl UserInfo {
    /// Creates a new `UserInfo` with the given `user` and optional `pass`.
    pub fn new(user: &str, pass: Option<&str>) -> Self {
        Self {
            user: user.into(),
            pass: pass.map(|pass| pass.into()),
        }
    }

    /// Returns the user.
    pub fn user(&self) -> &str {
        &self.user
    }

    /// Returns the pass.
    pub fn pass(&self) -> Option<&str> {
        self.pass.as_deref()
    }
}

/// A domain name in a SIP URI.
#[derive(Debug, PartialEq, Eq, Clone, Hash)]
pub struct DomainName(pub(crate) Arc<str>);

impl From<&str> for DomainName {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl DomainName {
    /// Creates a new `DomainName` from a string slice.
    pub fn new(name: &str) -> Self {
        DomainName(name.into())
    }

    /// Returns the string representation of the domain name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DomainName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The host part of a URI, which can be either a
/// domain name or an IP address.
#[derive(Debug, PartialEq, Eq, Clone, Hash)]
pub enum Host {
    /// A domain name, such as `example.com`.
    DomainName(DomainName),
    /// An IP address, either IPv4 or IPv6.
    IpAddr(IpAddr),
}

impl fmt::Display for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Host::DomainName(domain) => write!(f, "{domain}"),
            Host::IpAddr(ip_addr) => write!(f, "{ip_addr}"),
        }
    }
}

impl Host {
    /// Returns `true` if the host is an IP address (IPv4 or IPv6).
    pub fn is_ip_addr(&self) -> bool {
        matches!(self, Host::IpAddr(_))
    }

    /// Host comparison: domain names compare case-insensitively,
    /// addresses compare for equality.
    pub fn matches(&self, other: &Host) -> bool {
        match (self, other) {
            (Host::DomainName(a), Host::DomainName(b)) => a.0.eq_ignore_ascii_case(&b.0),
            (Host::IpAddr(a), Host::IpAddr(b)) => a == b,
            _ => false,
        }
    }

    /// Returns the string representation of the host as a `Cow<str>`.
    pub fn as_str(&self) -> Cow<'_, str> {
        match self {
            Host::DomainName(host) => Cow::Borrowed(&host.0),
            Host::IpAddr(host) => Cow::Owned(host.to_string()),
        }
    }
}

impl FromStr for Host {
    type Err = Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        if let Ok(ip_addr) = s.parse::<IpAddr>() {
            Ok(Host::IpAddr(ip_addr))
        } else {
            Ok(Host::DomainName(DomainName(s.into())))
        }
    }
}

/// A combination of a host (domain or IP address) and an optional port.
#[derive(Debug, PartialEq, Eq, Clone, Hash)]
pub struct HostPort {
    /// The host part, which may be a domain name or an IP address.
    pub host: Host,
    /// The optional port number.
    pub port: Option<u16>,
}

impl FromStr for HostPort {
    type Err = Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        let mut p = Parser::new(s.as_bytes());

        p.parse_host_port()
    }
}

impl HostPort {
    /// Creates a new `HostPort` from a host and optional port.
    pub fn new(host: Host, port: Option<u16>) -> Self {
        Self { host, port }
    }

    /// Returns the IP address if the host is an IP address, otherwise `None`.
    pub fn ip_addr(&self) -> Option<IpAddr> {
        match self.host {
            Host::DomainName(_) => None,
            Host::IpAddr(ip_addr) => Some(ip_addr),
        }
    }

    /// Returns `true` if the host is a domain name.
    pub fn is_domain(&self) -> bool {
        matches!(self.host, Host::DomainName(_))
    }

    /// Returns the string representation of the host.
    pub fn host_as_str(&self) -> Cow<'_, str> {
        self.host.as_str()
    }
}

impl fmt::Display for HostPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.host {
            Host::DomainName(domain) => f.write_str(&domain.0)?,
            Host::IpAddr(ip_addr) => match ip_addr {
                IpAddr::V4(addr) => write!(f, "{}", addr)?,
                IpAddr::V6(addr) => write!(f, "[{}]", addr)?,
            },
        }
        if let Some(port) = self.port {
            write!(f, ":{}", port)?;
        }
        Ok(())
    }
}

impl From<Host> for HostPort {
    fn from(host: Host) -> Self {
        Self { host, port: None }
    }
}

impl Default for HostPort {
    fn default() -> Self {
        Self {
            host: Host::IpAddr(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))),
            port: Some(5060),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_roundtrip() {
        let uri: Uri = "sip:alice@atlanta.com:5061;transport=tcp;lr".parse().unwrap();

        assert_eq!(uri.to_string(), "sip:alice@atlanta.com:5061;transport=tcp;lr");
    }

    #[test]
    fn test_equivalent_case_rules() {
        // RFC 3261 19.1.4: scheme/host case-insensitive, user case-sensitive.
        let a: Uri = "sip:alice@AtLanTa.CoM;Transport=udp".parse().unwrap();
        let b: Uri = "sip:alice@atlanta.com;transport=UDP".parse().unwrap();
        assert!(a.equivalent(&b));

        let a: Uri = "sip:alice@atlanta.com".parse().unwrap();
        let b: Uri = "sip:ALICE@atlanta.com".parse().unwrap();
        assert!(!a.equivalent(&b));
    }

    #[test]
    fn test_equivalent_port_and_params() {
        let a: Uri = "sip:alice@atlanta.com".parse().unwrap();
        let b: Uri = "sip:alice@atlanta.com:5060".parse().unwrap();
        assert!(!a.equivalent(&b));

        // A param appearing in only one uri is ignored...
        let a: Uri = "sip:carol@chicago.com".parse().unwrap();
        let b: Uri = "sip:carol@chicago.com;newparam=5".parse().unwrap();
        assert!(a.equivalent(&b));

        // ...unless it is one of the special params.
        let a: Uri = "sip:carol@chicago.com".parse().unwrap();
        let b: Uri = "sip:carol@chicago.com;transport=tcp".parse().unwrap();
        assert!(!a.equivalent(&b));
    }

    #[test]
    fn test_strips_route_params() {
        let uri: Uri = "sip:p1.example.com;lr;ttl=3".parse().unwrap();
        let stripped = uri.without_route_params();

        assert!(!stripped.lr_param);
        assert!(stripped.ttl_param.is_none());
        assert_eq!(stripped.to_string(), "sip:p1.example.com");
    }

    #[test]
    fn test_ipv6_host_display() {
        let host_port: HostPort = "[2001:db8::1]:5060".parse().unwrap();
        assert_eq!(host_port.to_string(), "[2001:db8::1]:5060");
    }
}
