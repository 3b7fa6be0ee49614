use std::fmt;

use crate::error::Result;
use crate::headers::SipHeaderParse;
use crate::message::auth::Credential;
use crate::parser::Parser;

/// The `Proxy-Authorization` SIP header.
///
/// Allows the client to identify itself (or its user) to a
/// proxy that requires authentication.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct ProxyAuthorization(pub Credential);

impl ProxyAuthorization {
    /// Get the `Credential` from the `Proxy-Authorization` header.
    pub fn credential(&self) -> &Credential {
        &self.0
    }
}

impl SipHeaderParse for ProxyAuthorization {
    const NAME: &'static str = "Proxy-Authorization";
    /*
     * Proxy-Authorization  =  "Proxy-Authorization" HCOLON credentials
     */
    fn parse(parser: &mut Parser<'_>) -> Result<Self> {
        let credential = parser.parse_auth_credential()?;

        Ok(ProxyAuthorization(credential))
    }
}

impl fmt::Display for ProxyAuthorization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", ProxyAuthorization::NAME, self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::auth::DigestCredential;

    #[test]
    fn test_parse() {
        let src = b"Digest username=\"Alice\", realm=\"atlanta.com\", \
        nonce=\"c60f3082ee1212b402a21831ae\", \
        response=\"245f23415f11432b3434341c022\"\r\n";
        let mut parser = Parser::new(src);
        let auth = ProxyAuthorization::parse(&mut parser).unwrap();

        assert_matches!(auth.credential(), Credential::Digest(DigestCredential { username, realm, .. }) => {
            assert_eq!(username.as_deref(), Some("Alice"));
            assert_eq!(realm.as_deref(), Some("atlanta.com"));
        });
    }
}
