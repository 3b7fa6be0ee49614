use std::fmt;

use crate::error::Result;
use crate::headers::SipHeaderParse;
use crate::parser::Parser;

/// The `P-Access-Network-Info` SIP header (3GPP TS 24.229).
///
/// Describes the access network the UA is using, e.g.
/// `3GPP-UTRAN-TDD;utran-cell-id-3gpp=AAEEBB240`.
#[derive(Debug, PartialEq, Eq, Clone)]
#[repr(transparent)]
pub struct PAccessNetworkInfo(String);

impl PAccessNetworkInfo {
    /// Creates the header from a raw access info value.
    pub fn new<V: Into<String>>(value: V) -> Self {
        Self(value.into())
    }

    /// Returns the raw access info value.
    pub fn value(&self) -> &str {
        &self.0
    }
}

impl SipHeaderParse for PAccessNetworkInfo {
    const NAME: &'static str = "P-Access-Network-Info";
    /*
     * P-Access-Network-Info  =  "P-Access-Network-Info" HCOLON
     *                           access-net-spec
     * access-net-spec        =  access-type *( SEMI access-info )
     */
    fn parse(parser: &mut Parser<'_>) -> Result<Self> {
        let value = parser.parse_header_str()?;

        Ok(PAccessNetworkInfo(value.to_string()))
    }
}

impl fmt::Display for PAccessNetworkInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", PAccessNetworkInfo::NAME, self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse() {
        let src = b"3GPP-UTRAN-TDD;utran-cell-id-3gpp=AAEEBB240\r\n";
        let mut parser = Parser::new(src);
        let netinfo = PAccessNetworkInfo::parse(&mut parser).unwrap();

        assert_eq!(netinfo.value(), "3GPP-UTRAN-TDD;utran-cell-id-3gpp=AAEEBB240");
    }
}
