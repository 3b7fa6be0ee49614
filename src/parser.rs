//! SIP Parser
//!
//! This module contains functions for sip parsing.

use std::borrow::Cow;
use std::str;

use bytes::Bytes;

use crate::error::Result;
use crate::headers::*;
use crate::macros::{b_map, comma_sep, parse_error, parse_header, parse_param};
use crate::message::auth::{Challenge, Credential, DigestChallenge, DigestCredential};
use crate::message::{
    Host, HostPort, Method, NameAddr, Param, Params, Request, RequestLine, Response, Scheme,
    SipAddr, SipMsg, StatusLine, Uri, UserInfo,
};
use crate::scanner::{is_alphabetic, is_digit, is_newline, is_space, Position, Scanner};

pub(crate) const SIPV2: &str = "SIP/2.0";
pub(crate) const CNONCE: &str = "cnonce";
pub(crate) const QOP: &str = "qop";
pub(crate) const NC: &str = "nc";

const B_SIPV2: &[u8] = SIPV2.as_bytes();
const USER_PARAM: &str = "user";
const METHOD_PARAM: &str = "method";
const TRANSPORT_PARAM: &str = "transport";
const TTL_PARAM: &str = "ttl";
const LR_PARAM: &str = "lr";
const MADDR_PARAM: &str = "maddr";
const DIGEST: &str = "Digest";
const REALM: &str = "realm";
const USERNAME: &str = "username";
const NONCE: &str = "nonce";
const URI: &str = "uri";
const RESPONSE: &str = "response";
const ALGORITHM: &str = "algorithm";
const OPAQUE: &str = "opaque";
const DOMAIN: &str = "domain";
const STALE: &str = "stale";
const ALPHA_NUM: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const UNRESERVED: &[u8] = b"-_.!~*'()%";
const ESCAPED: &[u8] = b"%";
const USER_UNRESERVED: &[u8] = b"&=+$,;?/";
const TOKEN: &[u8] = b"-.!%*_`'~+";
const PASS: &[u8] = b"&=+$,";
const HOST: &[u8] = b"_-.";

// For reading user part in uri.
b_map!(USER_MAP => ALPHA_NUM, UNRESERVED, USER_UNRESERVED, ESCAPED);
// For reading password in uri.
b_map!(PASS_MAP => ALPHA_NUM, UNRESERVED, ESCAPED, PASS);
// For reading host in uri.
b_map!(HOST_MAP => ALPHA_NUM, HOST);
// For reading header parameter in uri.
b_map!(HDR_MAP => b"[]/?:+$", ALPHA_NUM, UNRESERVED, ESCAPED);
// For reading token.
b_map!(TOKEN_MAP => ALPHA_NUM, TOKEN);
// For reading via parameter.
b_map!(VIA_PARAM_MAP => b"[:]", ALPHA_NUM, TOKEN);

#[inline(always)]
fn is_user(b: u8) -> bool {
    USER_MAP[b as usize]
}

#[inline(always)]
fn is_pass(b: u8) -> bool {
    PASS_MAP[b as usize]
}

#[inline(always)]
fn is_host(b: u8) -> bool {
    HOST_MAP[b as usize]
}

#[inline(always)]
fn is_token(b: u8) -> bool {
    TOKEN_MAP[b as usize]
}

#[inline(always)]
fn is_via_param(b: u8) -> bool {
    VIA_PARAM_MAP[b as usize]
}

#[inline(always)]
fn is_uri_hdr(b: u8) -> bool {
    HDR_MAP[b as usize]
}

/// Parses a byte buffer into a [`SipMsg`], tolerating RFC 3261 §7.3.1
/// header folding on input.
///
/// Folded header lines (CRLF followed by whitespace) are unfolded into a
/// single space before tokenization; the body, if any, is left untouched.
pub fn parse_message(buf: &[u8]) -> Result<SipMsg> {
    match unfold(buf) {
        Cow::Borrowed(buf) => Parser::new(buf).parse_sip_msg(),
        Cow::Owned(unfolded) => Parser::new(&unfolded).parse_sip_msg(),
    }
}

/// Replaces header line continuations (CRLF + WS) with a single space.
///
/// Only the header section is rewritten; bytes after the blank line
/// separator belong to the body and are copied verbatim.
fn unfold(src: &[u8]) -> Cow<'_, [u8]> {
    let header_end = src
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .map(|pos| pos + 4)
        .unwrap_or(src.len());

    let head = &src[..header_end];
    let has_fold = head
        .windows(3)
        .any(|w| w[0] == b'\r' && w[1] == b'\n' && is_space(w[2]));

    if !has_fold {
        return Cow::Borrowed(src);
    }

    let mut out = Vec::with_capacity(src.len());
    let mut i = 0;
    while i < head.len() {
        if head[i] == b'\r' && i + 2 < head.len() && head[i + 1] == b'\n' && is_space(head[i + 2]) {
            out.push(b' ');
            i += 2;
            while i < head.len() && is_space(head[i]) {
                i += 1;
            }
        } else {
            out.push(head[i]);
            i += 1;
        }
    }
    out.extend_from_slice(&src[header_end..]);

    Cow::Owned(out)
}

/// A type for parsing SIP messages.
///
/// This struct provides methods for parsing various components of SIP
/// messages, such as headers, URIs, and start lines.
pub struct Parser<'buf> {
    scanner: Scanner<'buf>,
}

impl<'buf> Parser<'buf> {
    /// Create a new `Parser` from the given slice.
    pub fn new(buf: &'buf [u8]) -> Self {
        Self {
            scanner: Scanner::new(buf),
        }
    }

    /// Parse a buffer of bytes into a `SipMsg`.
    ///
    /// # Example
    ///
    /// ```rust
    /// use imsua::parser::Parser;
    /// use imsua::headers::{Header, ContentLength};
    ///
    /// let buf = b"SIP/2.0 200 OK\r\nContent-Length: 0\r\n\r\n";
    /// let parser = &mut Parser::new(buf);
    /// let result = parser.parse_sip_msg().unwrap();
    /// let response = result.response().unwrap();
    /// assert_eq!(response.code().into_i32(), 200);
    /// assert_eq!(response.reason(), "OK");
    /// assert_eq!(response.headers.len(), 1);
    /// assert_eq!(response.headers[0], Header::ContentLength(ContentLength::new(0)));
    /// ```
    pub fn parse_sip_msg(&mut self) -> Result<SipMsg> {
        // Parse the start line of the SIP message and initialize the
        // message with empty headers and body.
        let mut msg = self.parse_start_line()?;
        let mut has_body = false;

        let headers = msg.headers_mut();

        'headers: loop {
            // Get name.
            let name = self.parse_token()?;

            self.ws();

            let Some(b':') = self.advance() else {
                return self.parse_error("Missing ':' after header name");
            };

            self.ws();

            if Via::matches_name(name) {
                comma_sep!(self => {
                    let header = parse_header!(Via, self);
                    headers.push(Header::Via(header));
                });
            } else if From::matches_name(name) {
                let header = parse_header!(From, self);
                headers.push(Header::From(header));
            } else if To::matches_name(name) {
                let header = parse_header!(To, self);
                headers.push(Header::To(header));
            } else if CallId::matches_name(name) {
                let header = parse_header!(CallId, self);
                headers.push(Header::CallId(header));
            } else if CSeq::matches_name(name) {
                let header = parse_header!(CSeq, self);
                headers.push(Header::CSeq(header));
            } else if Contact::matches_name(name) {
                comma_sep!(self => {
                    let header = parse_header!(Contact, self);
                    headers.push(Header::Contact(header));
                });
            } else if Route::matches_name(name) {
                comma_sep!(self => {
                    let header = parse_header!(Route, self);
                    headers.push(Header::Route(header));
                });
            } else if RecordRoute::matches_name(name) {
                comma_sep!(self => {
                    let header = parse_header!(RecordRoute, self);
                    headers.push(Header::RecordRoute(header));
                });
            } else if ServiceRoute::matches_name(name) {
                comma_sep!(self => {
                    let header = parse_header!(ServiceRoute, self);
                    headers.push(Header::ServiceRoute(header));
                });
            } else if MaxForwards::matches_name(name) {
                let header = parse_header!(MaxForwards, self);
                headers.push(Header::MaxForwards(header));
            } else if Expires::matches_name(name) {
                let header = parse_header!(Expires, self);
                headers.push(Header::Expires(header));
            } else if MinExpires::matches_name(name) {
                let header = parse_header!(MinExpires, self);
                headers.push(Header::MinExpires(header));
            } else if ContentLength::matches_name(name) {
                let header = parse_header!(ContentLength, self);
                if header.clen() > 0 {
                    has_body = true;
                }
                headers.push(Header::ContentLength(header));
            } else if ContentType::matches_name(name) {
                let header = parse_header!(ContentType, self);
                headers.push(Header::ContentType(header));
                has_body = true;
            } else if Authorization::matches_name(name) {
                let header = parse_header!(Authorization, self);
                headers.push(Header::Authorization(header));
            } else if ProxyAuthorization::matches_name(name) {
                let header = parse_header!(ProxyAuthorization, self);
                headers.push(Header::ProxyAuthorization(header));
            } else if WWWAuthenticate::matches_name(name) {
                let header = parse_header!(WWWAuthenticate, self);
                headers.push(Header::WWWAuthenticate(header));
            } else if ProxyAuthenticate::matches_name(name) {
                let header = parse_header!(ProxyAuthenticate, self);
                headers.push(Header::ProxyAuthenticate(header));
            } else if SubscriptionState::matches_name(name) {
                let header = parse_header!(SubscriptionState, self);
                headers.push(Header::SubscriptionState(header));
            } else if PPreferredIdentity::matches_name(name) {
                let header = parse_header!(PPreferredIdentity, self);
                headers.push(Header::PPreferredIdentity(header));
            } else if PAccessNetworkInfo::matches_name(name) {
                let header = parse_header!(PAccessNetworkInfo, self);
                headers.push(Header::PAccessNetworkInfo(header));
            } else {
                // The header is not in the typed set.
                let value = self.parse_header_str()?;

                headers.push(Header::Other(OtherHeader::new(name, value)));
            }

            if !matches!(self.peek(), Some(b'\r') | Some(b'\n')) {
                return self.parse_error("Missing CRLF on header end!");
            }

            self.scanner.consume_if(|b| b == b'\r');
            self.scanner.consume_if(|b| b == b'\n');

            if matches!(self.peek(), Some(b'\r') | Some(b'\n') | None) {
                break 'headers;
            }
        }

        if has_body {
            self.new_line();

            let rem = self.scanner.remaining();
            if !rem.is_empty() {
                msg.set_body(Some(Bytes::copy_from_slice(rem)));
            }
        }

        Ok(msg)
    }

    pub(crate) fn parse_error<T, S>(&self, msg: S) -> Result<T>
    where
        S: AsRef<str>,
    {
        parse_error!(msg.as_ref(), self)
    }

    pub(crate) fn parse_header_str(&mut self) -> Result<&'buf str> {
        let bytes = self.scanner.read_while(|b| !is_newline(b));

        Ok(str::from_utf8(bytes)?)
    }

    // Read whitespace characters.
    #[inline]
    pub(crate) fn ws(&mut self) {
        self.scanner.read_while(is_space);
    }

    // Read newline characters.
    #[inline]
    pub(crate) fn new_line(&mut self) {
        self.scanner.read_while(is_newline);
    }

    // Read alphabetic characters.
    #[inline]
    pub(crate) fn alphabetic(&mut self) -> &'buf [u8] {
        self.scanner.read_while(is_alphabetic)
    }

    // SIP version.
    #[inline]
    pub(crate) fn parse_sip_v2(&mut self) -> Result<()> {
        Ok(self.scanner.matches_slice(B_SIPV2)?)
    }

    // SIP Request-Line.
    pub(crate) fn parse_request_line(&mut self) -> Result<RequestLine> {
        let method_byte = self.alphabetic();
        let method = Method::from(method_byte);

        self.ws();
        let uri = self.parse_uri(true)?;
        self.ws();

        self.parse_sip_v2()?;

        self.new_line();

        Ok(RequestLine { method, uri })
    }

    // SIP Status-Line.
    pub(crate) fn parse_status_line(&mut self) -> Result<StatusLine> {
        self.parse_sip_v2()?;

        self.ws();
        let digits = self.scanner.read_while(is_digit);
        self.ws();

        let code = digits.into();

        let reason_byte = self.scanner.read_while(|b| !is_newline(b));
        let reason = str::from_utf8(reason_byte)?;

        self.new_line();

        Ok(StatusLine::new(code, reason))
    }

    fn parse_scheme(&mut self) -> Result<Scheme> {
        let (scheme_b, colon) = self.scanner.peek_while(is_token);

        let Some(b':') = colon else {
            return self.parse_error("Missing ':' in uri");
        };

        let scheme = if scheme_b.eq_ignore_ascii_case(b"sip") {
            Scheme::Sip
        } else if scheme_b.eq_ignore_ascii_case(b"sips") {
            Scheme::Sips
        } else if scheme_b.eq_ignore_ascii_case(b"tel") {
            Scheme::Tel
        } else {
            return self.parse_error(format!(
                "Unsupported URI scheme: {}",
                String::from_utf8_lossy(scheme_b)
            ));
        };

        // Take the scheme and the character ":".
        self.scanner.bump_n(scheme_b.len() + 1);

        Ok(scheme)
    }

    fn exists_user_part_in_uri(&self) -> bool {
        let rem = self.scanner.remaining();

        rem.iter()
            .take_while(|&&b| b != b' ' && b != b'>' && !is_newline(b))
            .any(|&b| b == b'@')
    }

    // User info in SIP uri.
    pub(crate) fn parse_user_info(&mut self) -> Result<Option<UserInfo>> {
        // Checks if uri has a user part.
        if !self.exists_user_part_in_uri() {
            return Ok(None);
        }

        // We have a user part in the uri.
        let user = self.read_user_str();
        let pass = if let Some(b':') = self.scanner.consume_if(|b| b == b':') {
            Some(self.read_pass_str())
        } else {
            None
        };

        let info = UserInfo::new(user, pass);

        // Take '@'.
        self.advance();

        Ok(Some(info))
    }

    pub(crate) fn parse_host_port(&mut self) -> Result<HostPort> {
        let host = match self.scanner.peek() {
            Some(b'[') => {
                // Is an Ipv6 host.
                self.advance();
                // The '[' and ']' characters are removed from the host.
                let host = self.scanner.read_while(|b| b != b']');
                let host = str::from_utf8(host)?;
                self.advance();

                match host.parse() {
                    Ok(addr) => Host::IpAddr(addr),
                    Err(_) => return self.parse_error("Error parsing Ipv6 HostPort!"),
                }
            }
            _ => {
                let host = self.read_host_str();

                if host.is_empty() {
                    return self.parse_error("Can't parse the host!");
                }
                match host.parse() {
                    Ok(addr) => Host::IpAddr(addr),
                    Err(_) => Host::DomainName(host.into()),
                }
            }
        };

        let port = self.parse_port()?;

        Ok(HostPort { host, port })
    }

    fn parse_port(&mut self) -> Result<Option<u16>> {
        let Some(b':') = self.scanner.consume_if(|b| b == b':') else {
            return Ok(None);
        };
        let digits = self.scanner.read_u16()?;

        Ok(Some(digits))
    }

    // Parse URI.
    pub(crate) fn parse_uri(&mut self, parse_params: bool) -> Result<Uri> {
        let scheme = self.parse_scheme()?;

        if scheme == Scheme::Tel {
            // tel uris carry the subscriber number where sip uris have
            // the user part; there is no host component.
            let number = self.read_user_str();
            let user = UserInfo::new(number, None);

            return Ok(Uri {
                scheme,
                user: Some(user),
                host_port: HostPort::new(Host::DomainName("".into()), None),
                ..Default::default()
            });
        }

        let user = self.parse_user_info()?;
        let host_port = self.parse_host_port()?;

        if !parse_params {
            return Ok(Uri::new(scheme, user, host_port));
        }

        // Parse SIP uri parameters.
        let mut user_param = None;
        let mut method_param = None;
        let mut transport_param = None;
        let mut ttl_param = None;
        let mut lr_param = None;
        let mut maddr_param = None;

        let params = parse_param!(
            self,
            parse_uri_param,
            USER_PARAM = user_param,
            METHOD_PARAM = method_param,
            TRANSPORT_PARAM = transport_param,
            TTL_PARAM = ttl_param,
            LR_PARAM = lr_param,
            MADDR_PARAM = maddr_param
        );

        let transport_param = transport_param.map(|s: String| s.as_str().into());
        let ttl_param = ttl_param.and_then(|ttl: String| ttl.parse().ok());
        let lr_param = lr_param.is_some();
        let method_param = method_param.map(|p: String| p.as_bytes().into());
        let user_param = user_param.map(|u: String| u.as_str().into());
        let maddr_param = maddr_param.and_then(|m: String| m.parse().ok());

        let headers = if let Some(b'?') = self.scanner.consume_if(|b| b == b'?') {
            // The uri has header parameters.
            Some(self.parse_header_params_in_sip_uri()?)
        } else {
            None
        };

        Ok(Uri {
            scheme,
            user,
            host_port,
            user_param,
            method_param,
            transport_param,
            ttl_param,
            lr_param,
            maddr_param,
            parameters: params,
            headers,
        })
    }

    fn parse_header_params_in_sip_uri(&mut self) -> Result<Params> {
        let mut params = Params::new();

        loop {
            let param = self.parse_hdr_in_uri()?;
            params.push(param);

            if self.scanner.consume_if(|b| b == b'&').is_none() {
                break;
            }
        }
        Ok(params)
    }

    fn parse_hdr_in_uri(&mut self) -> Result<Param> {
        let name = unsafe { self.read_as_str(is_uri_hdr) };

        let Some(b'=') = self.scanner.peek() else {
            return Ok(Param::new(name, None));
        };
        self.advance();

        let value = unsafe { self.read_as_str(is_uri_hdr) };

        Ok(Param::new(name, Some(value)))
    }

    // Parse start line.
    fn parse_start_line(&mut self) -> Result<SipMsg> {
        // Might be enough for most messages.
        let probable_number_of_headers = 10;

        if self.scanner.starts_with(B_SIPV2) {
            // Is a status line, e.g, "SIP/2.0 200 OK".
            let Ok(status_line) = self.parse_status_line() else {
                return self.parse_error("Error parsing 'Status Line'");
            };
            let headers = Headers::with_capacity(probable_number_of_headers);

            Ok(SipMsg::Response(Response {
                status_line,
                headers,
                body: None,
            }))
        } else {
            // Is a request line, e.g, "OPTIONS sip:localhost SIP/2.0".
            let Ok(req_line) = self.parse_request_line() else {
                return self.parse_error("Error parsing 'Request Line'");
            };
            let headers = Headers::with_capacity(probable_number_of_headers);

            Ok(SipMsg::Request(Request {
                req_line,
                headers,
                body: None,
            }))
        }
    }

    fn parse_display_name(&mut self) -> Result<Option<&'buf str>> {
        match self.scanner.lookahead()? {
            b'"' => {
                self.advance(); // consume '"'
                let name = self.scanner.read_while(|b| b != b'"');
                self.advance(); // consume closing '"'
                Ok(Some(str::from_utf8(name)?))
            }
            b'<' => Ok(None), // no display name
            _ => {
                let name = self.parse_token()?;
                self.ws();
                Ok(Some(name))
            }
        }
    }

    #[inline]
    pub(crate) fn parse_token(&mut self) -> Result<&'buf str> {
        if let Some(b'"') = self.scanner.consume_if(|b| b == b'"') {
            let value = self.scanner.read_while(|b| b != b'"');
            self.advance();

            Ok(str::from_utf8(value)?)
        } else {
            // is_token ensures that the bytes are valid UTF-8.
            Ok(self.read_token_str())
        }
    }

    // Parse SIP address (addr-spec or name-addr).
    pub(crate) fn parse_sip_addr(&mut self, parse_params: bool) -> Result<SipAddr> {
        self.ws();

        if self.scanner.starts_with(b"sip:")
            || self.scanner.starts_with(b"sips:")
            || self.scanner.starts_with(b"tel:")
        {
            let uri = self.parse_uri(parse_params)?;
            Ok(SipAddr::Uri(uri))
        } else {
            let addr = self.parse_name_addr()?;
            Ok(SipAddr::NameAddr(addr))
        }
    }

    #[inline]
    pub(crate) fn advance(&mut self) -> Option<u8> {
        self.scanner.next()
    }

    #[inline]
    pub(crate) fn read_until_byte(&mut self, byte: u8) -> &'buf [u8] {
        self.scanner.take_until(byte)
    }

    #[inline]
    pub(crate) fn peek(&self) -> Option<&u8> {
        self.scanner.peek()
    }

    #[inline]
    pub(crate) fn position(&self) -> &Position {
        self.scanner.position()
    }

    #[inline]
    pub(crate) fn remaining(&self) -> &[u8] {
        self.scanner.remaining()
    }

    #[inline]
    pub(crate) fn parse_u32(&mut self) -> Result<u32> {
        Ok(self.scanner.read_u32()?)
    }

    #[inline]
    pub(crate) fn must_read(&mut self, b: u8) -> Result<()> {
        Ok(self.scanner.must_read(b)?)
    }

    pub(crate) fn parse_name_addr(&mut self) -> Result<NameAddr> {
        self.ws();
        let display = self.parse_display_name()?;
        self.ws();

        // must be a '<'
        let Some(b'<') = self.scanner.next() else {
            return self.parse_error("Expected '<' in NameAddr!");
        };

        let uri = self.parse_uri(true)?;

        // must be a '>'
        let Some(b'>') = self.scanner.next() else {
            return self.parse_error("Expected '>' in NameAddr!");
        };

        Ok(NameAddr {
            display: display.map(|d| d.into()),
            uri,
        })
    }

    #[inline]
    pub(crate) unsafe fn read_as_str(&mut self, func: impl Fn(u8) -> bool) -> &'buf str {
        unsafe { self.scanner.read_as_str(func) }
    }

    #[inline]
    fn read_user_str(&mut self) -> &'buf str {
        unsafe { self.read_as_str(is_user) }
    }

    #[inline]
    fn read_pass_str(&mut self) -> &'buf str {
        unsafe { self.read_as_str(is_pass) }
    }

    #[inline]
    fn read_host_str(&mut self) -> &'buf str {
        unsafe { self.read_as_str(is_host) }
    }

    #[inline]
    fn read_token_str(&mut self) -> &'buf str {
        unsafe { self.read_as_str(is_token) }
    }

    pub(crate) unsafe fn parse_param_unchecked<F>(&mut self, func: F) -> Result<Param>
    where
        F: Fn(u8) -> bool,
    {
        self.ws();

        let name = unsafe { self.scanner.read_as_str(&func) };

        let Some(b'=') = self.scanner.peek() else {
            return Ok(Param::new(name, None));
        };

        self.advance();

        let value = if let Some(b'"') = self.scanner.peek() {
            self.advance();
            let value = self.scanner.read_while(|b| b != b'"');
            self.advance();

            str::from_utf8(value)?
        } else {
            unsafe { self.scanner.read_as_str(func) }
        };

        Ok(Param::new(name, Some(value)))
    }

    // Parse parameter (";" pname ["=" pvalue]).
    pub(crate) fn parse_param(&mut self) -> Result<Param> {
        unsafe { self.parse_param_unchecked(is_token) }
    }

    pub(crate) fn parse_auth_credential(&mut self) -> Result<Credential> {
        let scheme = self.parse_token()?;

        if scheme.eq_ignore_ascii_case(DIGEST) {
            return self.parse_digest_credential();
        }

        self.parse_other_auth(scheme)
            .map(|(scheme, param)| Credential::Other { scheme, param })
    }

    pub(crate) fn parse_auth_challenge(&mut self) -> Result<Challenge> {
        let scheme = self.parse_token()?;

        if scheme.eq_ignore_ascii_case(DIGEST) {
            return self.parse_digest_challenge();
        }

        self.parse_other_auth(scheme)
            .map(|(scheme, param)| Challenge::Other { scheme, param })
    }

    fn parse_other_auth(&mut self, scheme: &str) -> Result<(String, Params)> {
        let mut params = Params::new();

        comma_sep!(self => {
            let param = self.parse_param()?;

            params.push(param);
        });

        Ok((scheme.to_string(), params))
    }

    fn parse_digest_challenge(&mut self) -> Result<Challenge> {
        let mut digest = DigestChallenge::default();

        comma_sep!(self => {
            let Param { name, value } = self.parse_param()?;

            match name.as_str() {
                n if n.eq_ignore_ascii_case(REALM) => digest.realm = value,
                n if n.eq_ignore_ascii_case(NONCE) => digest.nonce = value,
                n if n.eq_ignore_ascii_case(DOMAIN) => digest.domain = value,
                n if n.eq_ignore_ascii_case(ALGORITHM) => digest.algorithm = value,
                n if n.eq_ignore_ascii_case(OPAQUE) => digest.opaque = value,
                n if n.eq_ignore_ascii_case(QOP) => digest.qop = value,
                n if n.eq_ignore_ascii_case(STALE) => digest.stale = value,
                _other => {
                    // Unknown challenge params are ignored.
                }
            }
        });

        Ok(Challenge::Digest(digest))
    }

    fn parse_digest_credential(&mut self) -> Result<Credential> {
        let mut digest = DigestCredential::default();

        comma_sep!(self => {
            let Param { name, value } = self.parse_param()?;

            match name.as_str() {
                n if n.eq_ignore_ascii_case(REALM) => digest.realm = value,
                n if n.eq_ignore_ascii_case(USERNAME) => digest.username = value,
                n if n.eq_ignore_ascii_case(NONCE) => digest.nonce = value,
                n if n.eq_ignore_ascii_case(URI) => digest.uri = value,
                n if n.eq_ignore_ascii_case(RESPONSE) => digest.response = value,
                n if n.eq_ignore_ascii_case(ALGORITHM) => digest.algorithm = value,
                n if n.eq_ignore_ascii_case(CNONCE) => digest.cnonce = value,
                n if n.eq_ignore_ascii_case(OPAQUE) => digest.opaque = value,
                n if n.eq_ignore_ascii_case(QOP) => digest.qop = value,
                n if n.eq_ignore_ascii_case(NC) => digest.nc = value,
                _other => {
                    // Unknown credential params are ignored.
                }
            }
        });

        Ok(Credential::Digest(digest))
    }
}

// Parse a via parameter, which also allows '[', ']' and ':'.
pub(crate) fn parse_via_param(parser: &mut Parser<'_>) -> Result<Param> {
    unsafe { parser.parse_param_unchecked(is_via_param) }
}

// Parse a uri parameter.
pub(crate) fn parse_uri_param(parser: &mut Parser<'_>) -> Result<Param> {
    unsafe {
        parser.parse_param_unchecked(|b| {
            // Uri params may contain the same bytes as tokens plus
            // '[', ']', '/', ':', '&', '+' and '$'.
            is_token(b) || matches!(b, b'[' | b']' | b'/' | b':' | b'&' | b'$')
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INVITE_MSG: &[u8] = b"INVITE sip:bob@biloxi.com SIP/2.0\r\n\
        Via: SIP/2.0/UDP pc33.atlanta.com;branch=z9hG4bK776asdhds\r\n\
        Max-Forwards: 70\r\n\
        To: Bob <sip:bob@biloxi.com>\r\n\
        From: Alice <sip:alice@atlanta.com>;tag=1928301774\r\n\
        Call-ID: a84b4c76e66710@pc33.atlanta.com\r\n\
        CSeq: 314159 INVITE\r\n\
        Contact: <sip:alice@pc33.atlanta.com>\r\n\
        Content-Type: application/sdp\r\n\
        Content-Length: 22\r\n\
        \r\n\
        v=0\r\no=alice 123 456\r\n";

    #[test]
    fn test_parse_invite() {
        let mut parser = Parser::new(INVITE_MSG);
        let msg = parser.parse_sip_msg().unwrap();

        let request = msg.request().unwrap();
        assert_eq!(request.method(), &Method::Invite);
        assert_eq!(request.uri().user_name(), Some("bob"));
        assert_eq!(request.headers.len(), 9);

        let via = crate::find_map_header!(request.headers, Via).unwrap();
        assert_eq!(via.branch(), Some("z9hG4bK776asdhds"));

        let cseq = crate::find_map_header!(request.headers, CSeq).unwrap();
        assert_eq!(cseq.cseq(), 314159);
        assert_eq!(cseq.method(), &Method::Invite);

        assert_eq!(request.body.as_deref(), Some(b"v=0\r\no=alice 123 456\r\n".as_ref()));
    }

    #[test]
    fn test_parse_response() {
        let buf = b"SIP/2.0 180 Ringing\r\n\
            Via: SIP/2.0/UDP pc33.atlanta.com;branch=z9hG4bK776asdhds\r\n\
            To: Bob <sip:bob@biloxi.com>;tag=a6c85cf\r\n\
            From: Alice <sip:alice@atlanta.com>;tag=1928301774\r\n\
            Call-ID: a84b4c76e66710\r\n\
            CSeq: 314159 INVITE\r\n\
            Content-Length: 0\r\n\
            \r\n";

        let mut parser = Parser::new(buf);
        let msg = parser.parse_sip_msg().unwrap();

        let response = msg.response().unwrap();
        assert_eq!(response.code().into_i32(), 180);
        assert_eq!(response.reason(), "Ringing");
        assert_eq!(response.to_tag(), Some("a6c85cf"));
    }

    #[test]
    fn test_parse_folded_header() {
        // RFC 3261 7.3.1: header field folding must be tolerated.
        let buf = b"SIP/2.0 200 OK\r\n\
            Via: SIP/2.0/UDP pc33.atlanta.com\r\n\
            Subject: I know you're there,\r\n \
            pick up the phone\r\n\
            Call-ID: f81d4fae\r\n\
            CSeq: 1 OPTIONS\r\n\
            To: <sip:bob@biloxi.com>\r\n\
            From: <sip:alice@atlanta.com>\r\n\
            Content-Length: 0\r\n\
            \r\n";

        let msg = parse_message(buf).unwrap();
        let subject = msg
            .headers()
            .find_map(|h| match h {
                Header::Other(other) if other.name == "Subject" => Some(other),
                _ => None,
            })
            .unwrap();

        assert_eq!(subject.value, "I know you're there, pick up the phone");
    }

    #[test]
    fn test_parse_uri_with_header_params() {
        let uri: Uri = "sip:alice@atlanta.com?subject=project&priority=urgent"
            .parse()
            .unwrap();

        let headers = uri.headers.as_ref().unwrap();
        assert_eq!(headers.get("subject"), Some(Some("project")));
        assert_eq!(headers.get("priority"), Some(Some("urgent")));
    }

    #[test]
    fn test_parse_tel_uri() {
        let uri: Uri = "tel:+15551234567".parse().unwrap();

        assert_eq!(uri.scheme, Scheme::Tel);
        assert_eq!(uri.user_name(), Some("+15551234567"));
        assert_eq!(uri.to_string(), "tel:+15551234567");
    }

    #[test]
    fn test_malformed_message_is_an_error() {
        let mut parser = Parser::new(b"INVITE\r\n\r\n");
        assert!(parser.parse_sip_msg().is_err());

        let mut parser = Parser::new(b"SIP/2.0 200 OK\r\nBad-Header\r\n\r\n");
        assert!(parser.parse_sip_msg().is_err());
    }

    #[test]
    fn test_serialize_then_parse_is_identity() {
        let mut parser = Parser::new(INVITE_MSG);
        let msg = parser.parse_sip_msg().unwrap();
        let request = msg.request().unwrap();

        let mut serialized = format!("{}{}", request.req_line, request.headers);
        serialized.push_str("\r\n");
        serialized.push_str(str::from_utf8(request.body.as_deref().unwrap()).unwrap());

        let mut reparser = Parser::new(serialized.as_bytes());
        let reparsed = reparser.parse_sip_msg().unwrap();
        let reparsed = reparsed.request().unwrap();

        assert_eq!(reparsed.headers, request.headers);
        assert_eq!(reparsed.body, request.body);
    }
}
