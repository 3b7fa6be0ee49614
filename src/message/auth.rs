//! SIP Auth types
//!
use std::fmt;

use crate::message::Params;

/// A Digest Challenge.
#[derive(Debug, PartialEq, Eq, Clone, Default)]
pub struct DigestChallenge {
    /// The realm of the digest authentication.
    pub realm: Option<String>,

    /// The domain of the digest authentication.
    pub domain: Option<String>,

    /// The nonce of the digest authentication.
    pub nonce: Option<String>,

    /// The opaque value of the digest authentication.
    pub opaque: Option<String>,

    /// Indicates whether the previous request was stale.
    pub stale: Option<String>,

    /// The algorithm used in the digest authentication.
    pub algorithm: Option<String>,

    /// The quality of protection (qop) value.
    pub qop: Option<String>,
}

impl DigestChallenge {
    /// Returns `true` if the challenge carries `stale=true`.
    pub fn is_stale(&self) -> bool {
        self.stale.as_deref().is_some_and(|s| s.eq_ignore_ascii_case("true"))
    }
}

/// An authentication challenge mechanism used in
/// `Proxy-Authenticate` and `WWW-Authenticate` headers.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum Challenge {
    /// A `Digest` authentication scheme.
    Digest(DigestChallenge),
    /// Any other authentication scheme not specifically handled.
    Other {
        /// The name of the authentication scheme.
        scheme: String,

        /// The parameters associated with the scheme.
        param: Params,
    },
}

impl fmt::Display for Challenge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Challenge::Digest(DigestChallenge {
                realm,
                domain,
                nonce,
                opaque,
                stale,
                algorithm,
                qop,
            }) => {
                write!(f, "Digest")?;
                let mut sep = " ";
                if let Some(realm) = realm {
                    write!(f, "{sep}realm=\"{realm}\"")?;
                    sep = ", ";
                }
                if let Some(domain) = domain {
                    write!(f, "{sep}domain=\"{domain}\"")?;
                    sep = ", ";
                }
                if let Some(nonce) = nonce {
                    write!(f, "{sep}nonce=\"{nonce}\"")?;
                    sep = ", ";
                }
                if let Some(opaque) = opaque {
                    write!(f, "{sep}opaque=\"{opaque}\"")?;
                    sep = ", ";
                }
                if let Some(stale) = stale {
                    write!(f, "{sep}stale={stale}")?;
                    sep = ", ";
                }
                if let Some(algorithm) = algorithm {
                    write!(f, "{sep}algorithm={algorithm}")?;
                    sep = ", ";
                }
                if let Some(qop) = qop {
                    write!(f, "{sep}qop={qop}")?;
                }

                Ok(())
            }
            Challenge::Other { scheme, param } => {
                write!(f, "{scheme} {param}")
            }
        }
    }
}

/// Credentials for a `Digest` authentication scheme, typically found
/// in the `Authorization` and `Proxy-Authorization` headers.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DigestCredential {
    /// The realm value that defines the protection space.
    pub realm: Option<String>,

    /// The username associated with the credential.
    pub username: Option<String>,

    /// The nonce value provided by the server.
    pub nonce: Option<String>,

    /// The URI of the requested resource.
    pub uri: Option<String>,

    /// The response hash calculated from the credential data.
    pub response: Option<String>,

    /// The algorithm used to hash the credentials (e.g., "MD5").
    pub algorithm: Option<String>,

    /// The client nonce value (cnonce) used to prevent replay attacks.
    pub cnonce: Option<String>,

    /// The opaque value provided by the server, to be returned unchanged.
    pub opaque: Option<String>,

    /// The quality of protection (qop) applied to the message.
    pub qop: Option<String>,

    /// The nonce count (nc), the number of requests made with the same nonce.
    pub nc: Option<String>,
}

/// A credential containing the authentication information in
/// `Authorization` and `Proxy-Authorization` headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credential {
    /// A `Digest` authentication scheme.
    Digest(DigestCredential),
    /// Other scheme not specified.
    Other {
        /// The name of the authentication scheme.
        scheme: String,

        /// The parameters associated with the scheme.
        param: Params,
    },
}

impl fmt::Display for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credential::Digest(DigestCredential {
                realm,
                username,
                nonce,
                uri,
                response,
                algorithm,
                cnonce,
                opaque,
                qop,
                nc,
            }) => {
                write!(f, "Digest")?;
                let mut sep = " ";
                if let Some(username) = username {
                    write!(f, "{sep}username=\"{username}\"")?;
                    sep = ", ";
                }
                if let Some(realm) = realm {
                    write!(f, "{sep}realm=\"{realm}\"")?;
                    sep = ", ";
                }
                if let Some(nonce) = nonce {
                    write!(f, "{sep}nonce=\"{nonce}\"")?;
                    sep = ", ";
                }
                if let Some(uri) = uri {
                    write!(f, "{sep}uri=\"{uri}\"")?;
                    sep = ", ";
                }
                if let Some(response) = response {
                    write!(f, "{sep}response=\"{response}\"")?;
                    sep = ", ";
                }
                if let Some(algorithm) = algorithm {
                    write!(f, "{sep}algorithm={algorithm}")?;
                    sep = ", ";
                }
                if let Some(cnonce) = cnonce {
                    write!(f, "{sep}cnonce=\"{cnonce}\"")?;
                    sep = ", ";
                }
                if let Some(qop) = qop {
                    write!(f, "{sep}qop={qop}")?;
                    sep = ", ";
                }
                if let Some(nc) = nc {
                    write!(f, "{sep}nc={nc}")?;
                    sep = ", ";
                }
                if let Some(opaque) = opaque {
                    write!(f, "{sep}opaque=\"{opaque}\"")?;
                }

                Ok(())
            }
            Credential::Other { scheme, param } => {
                write!(f, "{scheme} {param}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_challenge_display() {
        let challenge = Challenge::Digest(DigestChallenge {
            realm: Some("atlanta.com".into()),
            nonce: Some("f84f1cec41e6cbe5aea9c8e88d359".into()),
            algorithm: Some("MD5".into()),
            qop: Some("auth".into()),
            ..Default::default()
        });

        assert_eq!(
            challenge.to_string(),
            "Digest realm=\"atlanta.com\", \
             nonce=\"f84f1cec41e6cbe5aea9c8e88d359\", algorithm=MD5, qop=auth"
        );
    }

    #[test]
    fn test_credential_display() {
        let credential = Credential::Digest(DigestCredential {
            username: Some("alice@home.net".into()),
            realm: Some("home.net".into()),
            nonce: Some("".into()),
            response: Some("".into()),
            ..Default::default()
        });

        assert_eq!(
            credential.to_string(),
            "Digest username=\"alice@home.net\", realm=\"home.net\", nonce=\"\", response=\"\""
        );
    }

    #[test]
    fn test_stale_flag() {
        let mut challenge = DigestChallenge::default();
        assert!(!challenge.is_stale());

        challenge.stale = Some("TRUE".into());
        assert!(challenge.is_stale());

        challenge.stale = Some("false".into());
        assert!(!challenge.is_stale());
    }
}
