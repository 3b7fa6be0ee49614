//! Challenge-response authentication.
//!
//! One [`AuthChallenge`] is stored per (realm, proxy-flag) pair;
//! replacing the nonce keeps the entry's identity. Credentials are
//! computed per RFC 2617 with the stack's private identity.

use core::fmt::Write;

use md5::{Digest, Md5};

use crate::headers::Header;
use crate::message::auth::{Credential, DigestChallenge, DigestCredential};
use crate::message::Method;

const MD5_ALGORITHM: &str = "MD5";
const AKA_KEY_LEN: usize = 16;

/// A stored authentication challenge, replayed on every request the
/// dialog sends until the server replaces it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthChallenge {
    /// The authentication scheme, normally `Digest`.
    pub scheme: String,
    /// The protection space this challenge belongs to.
    pub realm: String,
    /// The current server nonce.
    pub nonce: String,
    /// The opaque value, echoed back unchanged.
    pub opaque: Option<String>,
    /// The digest algorithm, `MD5` when absent.
    pub algorithm: Option<String>,
    /// The quality of protection offered by the server.
    pub qop: Option<String>,
    /// Whether the challenge came from `Proxy-Authenticate`.
    pub is_proxy: bool,
    /// AKA cipher key, when the algorithm is AKAv1/v2.
    pub ck: Option<[u8; AKA_KEY_LEN]>,
    /// AKA integrity key, when the algorithm is AKAv1/v2.
    pub ik: Option<[u8; AKA_KEY_LEN]>,
}

impl AuthChallenge {
    /// Creates a stored challenge from a parsed digest challenge.
    pub fn from_digest(digest: &DigestChallenge, is_proxy: bool) -> Self {
        Self {
            scheme: "Digest".into(),
            realm: digest.realm.clone().unwrap_or_default(),
            nonce: digest.nonce.clone().unwrap_or_default(),
            opaque: digest.opaque.clone(),
            algorithm: digest.algorithm.clone(),
            qop: digest.qop.clone(),
            is_proxy,
            ck: None,
            ik: None,
        }
    }

    /// Replaces the vector carried by this challenge, preserving the
    /// entry's (realm, proxy-flag) identity.
    pub fn update(&mut self, digest: &DigestChallenge) {
        if let Some(nonce) = &digest.nonce {
            self.nonce = nonce.clone();
        }
        self.opaque = digest.opaque.clone().or(self.opaque.take());
        if digest.algorithm.is_some() {
            self.algorithm = digest.algorithm.clone();
        }
        if digest.qop.is_some() {
            self.qop = digest.qop.clone();
        }
    }

    /// Computes the credential answering this challenge for the given
    /// request method and Request-URI.
    pub fn credential(&self, username: &str, password: &str, method: &Method, uri: &str) -> Credential {
        let qop = self
            .qop
            .as_deref()
            .filter(|qop| qop.split(',').any(|q| q.trim().eq_ignore_ascii_case("auth")))
            .map(|_| "auth".to_string());

        let (cnonce, nc) = if qop.is_some() {
            (Some(crate::random_str(8)), Some("00000001".to_string()))
        } else {
            (None, None)
        };

        let response = compute_digest_response(
            username,
            password,
            &self.realm,
            &self.nonce,
            method.as_str(),
            uri,
            cnonce.as_deref(),
            nc.as_deref(),
            qop.as_deref(),
        );

        Credential::Digest(DigestCredential {
            username: Some(username.to_string()),
            realm: Some(self.realm.clone()),
            nonce: Some(self.nonce.clone()),
            uri: Some(uri.to_string()),
            response: Some(response),
            algorithm: Some(self.algorithm.clone().unwrap_or_else(|| MD5_ALGORITHM.into())),
            cnonce,
            opaque: self.opaque.clone(),
            qop,
            nc,
        })
    }

    /// Builds the Authorization or Proxy-Authorization header carrying
    /// the credential for the given request.
    pub fn authorization_header(
        &self,
        username: &str,
        password: &str,
        method: &Method,
        uri: &str,
    ) -> Header {
        let credential = self.credential(username, password, method, uri);

        if self.is_proxy {
            Header::ProxyAuthorization(crate::headers::ProxyAuthorization(credential))
        } else {
            Header::Authorization(crate::headers::Authorization(credential))
        }
    }
}

/// Builds the empty-credential Authorization header an IMS UE sends on
/// an initial REGISTER (3GPP TS 24.229 §5.1.1.2.2): username is the
/// private identity, realm the home domain, nonce and response empty.
pub fn empty_authorization(private_identity: &str, realm: &str, uri: &str) -> Header {
    Header::Authorization(crate::headers::Authorization(Credential::Digest(
        DigestCredential {
            username: Some(private_identity.to_string()),
            realm: Some(realm.to_string()),
            uri: Some(uri.to_string()),
            nonce: Some(String::new()),
            response: Some(String::new()),
            ..Default::default()
        },
    )))
}

/// RFC 2617 digest response computation.
#[allow(clippy::too_many_arguments)]
pub(crate) fn compute_digest_response(
    username: &str,
    password: &str,
    realm: &str,
    nonce: &str,
    method: &str,
    uri: &str,
    cnonce: Option<&str>,
    nc: Option<&str>,
    qop: Option<&str>,
) -> String {
    let mut a1 = String::new();
    let _ = write!(a1, "{}:{}:{}", username, realm, password);
    let mut a2 = String::new();
    let _ = write!(a2, "{}:{}", method, uri);

    let ha1 = md5_hex(a1.as_bytes());
    let ha2 = md5_hex(a2.as_bytes());

    let mut combo = String::new();
    match (qop, cnonce, nc) {
        (Some(qop), Some(cnonce), Some(nc)) => {
            let _ = write!(combo, "{}:{}:{}:{}:{}:{}", ha1, nonce, nc, cnonce, qop, ha2);
        }
        _ => {
            let _ = write!(combo, "{}:{}:{}", ha1, nonce, ha2);
        }
    }

    md5_hex(combo.as_bytes())
}

fn md5_hex(data: &[u8]) -> String {
    let digest = Md5::digest(data);
    let mut out = String::new();
    for b in &digest {
        let _ = write!(out, "{:02x}", b);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digest_response_matches_reference() {
        // The worked example from RFC 2617 section 3.5, without qop.
        let response = compute_digest_response(
            "Mufasa",
            "Circle Of Life",
            "testrealm@host.com",
            "dcd98b7102dd2f0e8b11d0f600bfb0c093",
            "GET",
            "/dir/index.html",
            None,
            None,
            None,
        );

        assert_eq!(response, "670fd8c2df070c60b045671b8b24ff02");
    }

    #[test]
    fn test_md5_reference() {
        assert_eq!(md5_hex(b"abc"), "900150983cd24fb0d6963f7d28e17f72");
    }

    #[test]
    fn test_challenge_credential_carries_nonce() {
        let challenge = AuthChallenge {
            scheme: "Digest".into(),
            realm: "home.net".into(),
            nonce: "abc".into(),
            opaque: None,
            algorithm: Some("MD5".into()),
            qop: None,
            is_proxy: false,
            ck: None,
            ik: None,
        };

        let credential = challenge.credential("alice@home.net", "secret", &Method::Register, "sip:home.net");

        assert_matches!(credential, Credential::Digest(DigestCredential { nonce, response, .. }) => {
            assert_eq!(nonce.as_deref(), Some("abc"));
            assert!(!response.unwrap().is_empty());
        });
    }

    #[test]
    fn test_qop_auth_adds_cnonce_and_nc() {
        let challenge = AuthChallenge {
            scheme: "Digest".into(),
            realm: "home.net".into(),
            nonce: "abc".into(),
            opaque: None,
            algorithm: Some("MD5".into()),
            qop: Some("auth".into()),
            is_proxy: false,
            ck: None,
            ik: None,
        };

        let credential = challenge.credential("alice@home.net", "secret", &Method::Register, "sip:home.net");

        assert_matches!(credential, Credential::Digest(DigestCredential { cnonce, nc, qop, .. }) => {
            assert!(cnonce.is_some());
            assert_eq!(nc.as_deref(), Some("00000001"));
            assert_eq!(qop.as_deref(), Some("auth"));
        });
    }

    #[test]
    fn test_update_preserves_identity() {
        let mut challenge = AuthChallenge {
            scheme: "Digest".into(),
            realm: "home.net".into(),
            nonce: "old".into(),
            opaque: Some("op".into()),
            algorithm: Some("MD5".into()),
            qop: None,
            is_proxy: false,
            ck: None,
            ik: None,
        };

        challenge.update(&DigestChallenge {
            nonce: Some("new".into()),
            ..Default::default()
        });

        assert_eq!(challenge.realm, "home.net");
        assert_eq!(challenge.nonce, "new");
        assert_eq!(challenge.opaque.as_deref(), Some("op"));
    }

    #[test]
    fn test_empty_authorization() {
        let header = empty_authorization("alice@home.net", "home.net", "sip:home.net");

        assert_eq!(
            header.to_string(),
            "Authorization: Digest username=\"alice@home.net\", realm=\"home.net\", \
             nonce=\"\", uri=\"sip:home.net\", response=\"\""
        );
    }
}
