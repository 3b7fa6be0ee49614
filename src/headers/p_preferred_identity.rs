use std::fmt;

use crate::error::Result;
use crate::headers::SipHeaderParse;
use crate::message::SipAddr;
use crate::parser::Parser;

/// The `P-Preferred-Identity` SIP header (RFC 3325).
///
/// Carries the identity the user wishes to be used for the
/// P-Asserted-Identity that the trusted proxy will insert.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct PPreferredIdentity(pub SipAddr);

impl PPreferredIdentity {
    /// Creates the header from an address.
    pub fn new(addr: SipAddr) -> Self {
        Self(addr)
    }

    /// Returns the carried identity.
    pub fn addr(&self) -> &SipAddr {
        &self.0
    }
}

impl SipHeaderParse for PPreferredIdentity {
    const NAME: &'static str = "P-Preferred-Identity";
    /*
     * PPreferredID  =  "P-Preferred-Identity" HCOLON PPreferredID-value
     *                  *(COMMA PPreferredID-value)
     * PPreferredID-value  =  name-addr / addr-spec
     */
    fn parse(parser: &mut Parser<'_>) -> Result<Self> {
        let addr = parser.parse_sip_addr(false)?;

        Ok(PPreferredIdentity(addr))
    }
}

impl fmt::Display for PPreferredIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", PPreferredIdentity::NAME, self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse() {
        let src = b"\"Cullen Jennings\" <sip:fluffy@cisco.com>\r\n";
        let mut parser = Parser::new(src);
        let identity = PPreferredIdentity::parse(&mut parser).unwrap();

        assert_eq!(identity.addr().display(), Some("Cullen Jennings"));
        assert_eq!(identity.addr().uri().user_name(), Some("fluffy"));
    }
}
