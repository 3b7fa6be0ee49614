use std::fmt;

use crate::error::Result;
use crate::headers::SipHeaderParse;
use crate::message::auth::Challenge;
use crate::parser::Parser;

/// The `Proxy-Authenticate` SIP header.
///
/// Carries a challenge issued by a proxy; credentials
/// answering it travel in `Proxy-Authorization`.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct ProxyAuthenticate(pub Challenge);

impl ProxyAuthenticate {
    /// Get the `Challenge` carried by the header.
    pub fn challenge(&self) -> &Challenge {
        &self.0
    }
}

impl SipHeaderParse for ProxyAuthenticate {
    const NAME: &'static str = "Proxy-Authenticate";
    /*
     * Proxy-Authenticate  =  "Proxy-Authenticate" HCOLON challenge
     */
    fn parse(parser: &mut Parser<'_>) -> Result<Self> {
        let challenge = parser.parse_auth_challenge()?;

        Ok(ProxyAuthenticate(challenge))
    }
}

impl fmt::Display for ProxyAuthenticate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", ProxyAuthenticate::NAME, self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::auth::DigestChallenge;

    #[test]
    fn test_parse() {
        let src = b"Digest realm=\"atlanta.com\", \
        nonce=\"c60f3082ee1212b402a21831ae\", qop=\"auth\"";
        let mut parser = Parser::new(src);
        let proxy_auth = ProxyAuthenticate::parse(&mut parser).unwrap();

        assert_matches!(proxy_auth.0, Challenge::Digest(DigestChallenge { realm, nonce, qop, .. }) => {
            assert_eq!(realm.as_deref(), Some("atlanta.com"));
            assert_eq!(nonce.as_deref(), Some("c60f3082ee1212b402a21831ae"));
            assert_eq!(qop.as_deref(), Some("auth"));
        });
    }
}
