use crate::error::Result;
use crate::headers::{SipHeaderParse, TAG_PARAM};
use crate::macros::parse_header_param;
use crate::message::{Params, SipAddr};
use crate::parser::Parser;

use core::fmt;

/// The `From` SIP header.
///
/// Indicates the initiator of the request.
///
/// # Examples
/// ```
/// # use imsua::headers::From;
/// # use imsua::message::SipAddr;
/// let uri: SipAddr = "<sip:alice@client.atlanta.example.com>".parse().unwrap();
/// let f = From::new(uri);
///
/// assert_eq!(
///     "From: <sip:alice@client.atlanta.example.com>",
///     f.to_string()
/// );
/// ```
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct From {
    uri: SipAddr,
    tag: Option<String>,
    params: Option<Params>,
}

impl From {
    /// Create a new `From` instance.
    pub fn new(uri: SipAddr) -> Self {
        Self {
            uri,
            tag: None,
            params: None,
        }
    }

    /// Create a new `From` instance with a tag.
    pub fn new_with_tag(uri: SipAddr, tag: &str) -> Self {
        Self {
            uri,
            tag: Some(tag.to_string()),
            params: None,
        }
    }

    /// Get the URI of the `From` header.
    pub fn uri(&self) -> &SipAddr {
        &self.uri
    }

    /// Returns the tag parameter.
    ///
    /// Tag values are compared byte-for-byte, never
    /// case-insensitively.
    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    /// Set the tag parameter.
    pub fn set_tag(&mut self, tag: Option<String>) {
        self.tag = tag;
    }
}

impl SipHeaderParse for From {
    const NAME: &'static str = "From";
    const SHORT_NAME: &'static str = "f";
    /*
     * From        =  ( "From" / "f" ) HCOLON from-spec
     * from-spec   =  ( name-addr / addr-spec )
     *                *( SEMI from-param )
     * from-param  =  tag-param / generic-param
     * tag-param   =  "tag" EQUAL token
     */
    fn parse(parser: &mut Parser<'_>) -> Result<Self> {
        let uri = parser.parse_sip_addr(false)?;
        let mut tag = None;
        let params = parse_header_param!(parser, TAG_PARAM = tag);

        Ok(From { tag, uri, params })
    }
}

impl fmt::Display for From {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", From::NAME, self.uri)?;
        if let Some(tag) = &self.tag {
            write!(f, ";tag={}", tag)?;
        }
        if let Some(params) = &self.params {
            write!(f, ";{}", params)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{Host, HostPort, Scheme};

    #[test]
    fn test_parse() {
        let src = b"\"A. G. Bell\" <sip:agb@bell-telephone.com> ;tag=a48s\r\n";
        let mut parser = Parser::new(src);
        let from = From::parse(&mut parser).unwrap();

        assert_matches!(from, From {
            uri: SipAddr::NameAddr(addr),
            tag,
            ..
        } => {
            assert_eq!(addr.display(), Some("A. G. Bell"));
            assert_eq!(addr.uri.user_name(), Some("agb"));
            assert_eq!(
                addr.uri.host_port,
                HostPort {
                    host: Host::DomainName("bell-telephone.com".into()),
                    port: None
                }
            );
            assert_eq!(addr.uri.scheme, Scheme::Sip);
            assert_eq!(tag.as_deref(), Some("a48s"));
        });

        let src = b"sip:+12125551212@server.phone2net.com;tag=887s\r\n";
        let mut parser = Parser::new(src);
        let from = From::parse(&mut parser).unwrap();

        assert_matches!(from, From {
            uri: SipAddr::Uri(uri),
            tag,
            ..
        } => {
            assert_eq!(uri.user_name(), Some("+12125551212"));
            assert_eq!(
                uri.host_port,
                HostPort {
                    host: Host::DomainName("server.phone2net.com".into()),
                    port: None
                }
            );
            assert_eq!(uri.scheme, Scheme::Sip);
            assert_eq!(tag.as_deref(), Some("887s"));
        });
    }
}
