use std::fmt;

use crate::error::Result;
use crate::headers::SipHeaderParse;
use crate::message::auth::Credential;
use crate::parser::Parser;

/// The `Authorization` SIP header.
///
/// Contains authentication credentials of a UA.
///
/// # Examples
///
/// ```
/// # use imsua::headers::Authorization;
/// # use imsua::message::auth::{Credential, DigestCredential};
/// let auth = Authorization(Credential::Digest(DigestCredential {
///     username: Some("Alice".into()),
///     realm: Some("atlanta.com".into()),
///     nonce: Some("84a4cc6f3082121f32b42a2187831a9e".into()),
///     response: Some("7587245234b3434cc3412213e5f113a5432".into()),
///     ..Default::default()
/// }));
///
/// assert_eq!(
///     "Authorization: Digest username=\"Alice\", realm=\"atlanta.com\", \
///             nonce=\"84a4cc6f3082121f32b42a2187831a9e\", \
///             response=\"7587245234b3434cc3412213e5f113a5432\"",
///     auth.to_string()
/// );
/// ```
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Authorization(pub Credential);

impl Authorization {
    /// Get the `Credential` from the `Authorization` header.
    pub fn credential(&self) -> &Credential {
        &self.0
    }
}

impl SipHeaderParse for Authorization {
    const NAME: &'static str = "Authorization";
    /*
     * Authorization     =  "Authorization" HCOLON credentials
     * credentials       =  ("Digest" LWS digest-response)
     *                      / other-response
     * digest-response   =  dig-resp *(COMMA dig-resp)
     * dig-resp          =  username / realm / nonce / digest-uri
     *                      / dresponse / algorithm / cnonce
     *                      / opaque / message-qop
     *                      / nonce-count / auth-param
     */
    fn parse(parser: &mut Parser<'_>) -> Result<Self> {
        let credential = parser.parse_auth_credential()?;

        Ok(Authorization(credential))
    }
}

impl fmt::Display for Authorization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", Authorization::NAME, self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::auth::DigestCredential;

    #[test]
    fn test_parse() {
        let src = b"Digest username=\"Alice\", realm=\"atlanta.com\", \
        nonce=\"84a4cc6f3082121f32b42a2187831a9e\",\
        response=\"7587245234b3434cc3412213e5f113a5432\"\r\n";
        let mut parser = Parser::new(src);
        let auth = Authorization::parse(&mut parser).unwrap();

        assert_eq!(parser.remaining(), b"\r\n");

        assert_matches!(auth.credential(), Credential::Digest(DigestCredential { username, realm, nonce, response, .. }) => {
            assert_eq!(username.as_deref(), Some("Alice"));
            assert_eq!(realm.as_deref(), Some("atlanta.com"));
            assert_eq!(nonce.as_deref(), Some("84a4cc6f3082121f32b42a2187831a9e"));
            assert_eq!(response.as_deref(), Some("7587245234b3434cc3412213e5f113a5432"));
        });
    }
}
