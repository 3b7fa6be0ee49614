use crate::error::Result;
use crate::headers::{SipHeaderParse, TAG_PARAM};
use crate::macros::parse_header_param;
use crate::message::{Params, SipAddr};
use crate::parser::Parser;

use std::fmt;

/// The `To` SIP header.
///
/// Specifies the logical recipient of the request.
///
/// # Examples
/// ```
/// # use imsua::headers::To;
/// # use imsua::message::SipAddr;
/// let uri: SipAddr = "<sip:bob@biloxi.example.com>".parse().unwrap();
/// let t = To::new(uri);
///
/// assert_eq!(
///     "To: <sip:bob@biloxi.example.com>",
///     t.to_string()
/// );
/// ```
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct To {
    uri: SipAddr,
    tag: Option<String>,
    params: Option<Params>,
}

impl To {
    /// Create a new `To` instance.
    pub fn new(uri: SipAddr) -> Self {
        Self {
            uri,
            tag: None,
            params: None,
        }
    }

    /// Create a new `To` instance with a tag.
    pub fn new_with_tag(uri: SipAddr, tag: &str) -> Self {
        Self {
            uri,
            tag: Some(tag.to_string()),
            params: None,
        }
    }

    /// Get the URI of the `To` header.
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

impl SipHeaderParse for To {
    const NAME: &'static str = "To";
    const SHORT_NAME: &'static str = "t";
    /*
     * To        =  ( "To" / "t" ) HCOLON ( name-addr
     *              / addr-spec ) *( SEMI to-param )
     * to-param  =  tag-param / generic-param
     */
    fn parse(parser: &mut Parser<'_>) -> Result<Self> {
        let uri = parser.parse_sip_addr(false)?;
        let mut tag = None;
        let params = parse_header_param!(parser, TAG_PARAM = tag);

        Ok(To { tag, uri, params })
    }
}

impl fmt::Display for To {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", To::NAME, self.uri)?;
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
    use crate::message::{Host, HostPort};

    #[test]
    fn test_parse() {
        let src = b"The Operator <sip:operator@cs.columbia.edu>;tag=287447\r\n";
        let mut parser = Parser::new(src);
        let to = To::parse(&mut parser).unwrap();

        assert_matches!(to, To {
            uri: SipAddr::NameAddr(addr),
            tag,
            ..
        } => {
            assert_eq!(addr.display(), Some("The Operator"));
            assert_eq!(addr.uri.user_name(), Some("operator"));
            assert_eq!(
                addr.uri.host_port,
                HostPort {
                    host: Host::DomainName("cs.columbia.edu".into()),
                    port: None
                }
            );
            assert_eq!(tag.as_deref(), Some("287447"));
        });
    }

    #[test]
    fn test_set_tag() {
        let uri: SipAddr = "sip:bob@biloxi.com".parse().unwrap();
        let mut to = To::new(uri);

        assert!(to.tag().is_none());

        to.set_tag(Some("4542".into()));
        assert_eq!(to.to_string(), "To: sip:bob@biloxi.com;tag=4542");
    }
}
