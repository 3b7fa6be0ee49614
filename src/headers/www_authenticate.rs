use std::fmt;

use crate::error::Result;
use crate::headers::SipHeaderParse;
use crate::message::auth::Challenge;
use crate::parser::Parser;

/// The `WWW-Authenticate` SIP header.
///
/// Consists of at least one challenge with the
/// authentication scheme(s) and parameters applicable
/// to the `Request-URI`.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct WWWAuthenticate(pub Challenge);

impl WWWAuthenticate {
    /// Get the `Challenge` carried by the header.
    pub fn challenge(&self) -> &Challenge {
        &self.0
    }
}

impl SipHeaderParse for WWWAuthenticate {
    const NAME: &'static str = "WWW-Authenticate";
    /*
     * WWW-Authenticate  =  "WWW-Authenticate" HCOLON challenge
     */
    fn parse(parser: &mut Parser<'_>) -> Result<Self> {
        let challenge = parser.parse_auth_challenge()?;

        Ok(WWWAuthenticate(challenge))
    }
}

impl fmt::Display for WWWAuthenticate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", WWWAuthenticate::NAME, self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::auth::DigestChallenge;

    #[test]
    fn test_parse() {
        let src = b"Digest realm=\"atlanta.com\",\
        domain=\"sip:boxesbybob.com\", qop=\"auth\",\
        nonce=\"f84f1cec41e6cbe5aea9c8e88d359\",\
        opaque=\"\", stale=FALSE, algorithm=MD5";
        let mut parser = Parser::new(src);
        let www_auth = WWWAuthenticate::parse(&mut parser).unwrap();

        assert_matches!(www_auth.0, Challenge::Digest(DigestChallenge { realm, domain, nonce, opaque, stale, algorithm, qop, .. }) => {
            assert_eq!(realm.as_deref(), Some("atlanta.com"));
            assert_eq!(algorithm.as_deref(), Some("MD5"));
            assert_eq!(domain.as_deref(), Some("sip:boxesbybob.com"));
            assert_eq!(qop.as_deref(), Some("auth"));
            assert_eq!(nonce.as_deref(), Some("f84f1cec41e6cbe5aea9c8e88d359"));
            assert_eq!(opaque.as_deref(), Some(""));
            assert_eq!(stale.as_deref(), Some("FALSE"));
        });
    }
}
