//! # imsua
//!
//! A SIP (RFC 3261) User Agent signaling core with IMS (3GPP TS 24.229)
//! extensions and an SDP (RFC 4566) offer/answer body parser.

pub mod auth;
pub mod dialog;
pub mod endpoint;
pub mod headers;
pub mod message;
pub mod parser;
pub mod sdp;
pub mod service;
pub mod transaction;
pub mod transport;

pub(crate) mod error;
pub(crate) mod macros;
pub(crate) mod scanner;

pub use endpoint::Endpoint;
pub use error::Error;
pub use error::Result;
pub use service::SipService;

#[cfg(test)]
#[macro_use]
extern crate assert_matches;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::error::SipParserError;
use crate::message::Params;
use crate::parser::Parser;

/// A quality value (q-value) used in SIP headers.
///
/// The `Q` struct provides a method to parse a string representation of
/// a q-value into a `Q` instance. The q-value is typically used to
/// indicate the preference of certain SIP headers.
///
/// # Example
///
/// ```
/// use imsua::Q;
///
/// let q_value = "0.5".parse();
/// assert_eq!(q_value, Ok(Q(0, 5)));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Copy)]
pub struct Q(pub u8, pub u8);

impl Q {
    pub fn new(a: u8, b: u8) -> Self {
        Self(a, b)
    }
}

impl From<u8> for Q {
    fn from(value: u8) -> Self {
        Self(value, 0)
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct ParseQError;

impl From<ParseQError> for Error {
    fn from(value: ParseQError) -> Self {
        Self::ParseError(SipParserError {
            message: format!("{:?}", value),
        })
    }
}

impl FromStr for Q {
    type Err = ParseQError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.rsplit_once('.') {
            Some((a, b)) => {
                let a = a.parse().map_err(|_| ParseQError)?;
                let b = b.parse().map_err(|_| ParseQError)?;
                Ok(Q(a, b))
            }
            None => match s.parse() {
                Ok(n) => Ok(Q(n, 0)),
                Err(_) => Err(ParseQError),
            },
        }
    }
}

impl fmt::Display for Q {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, ";q={}.{}", self.0, self.1)
    }
}

/// The `media-type` that appears in `Content-Type` SIP headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaType {
    /// The type, e.g. `application`.
    pub mtype: Arc<str>,
    /// The subtype, e.g. `sdp`.
    pub subtype: Arc<str>,
    /// Optional media parameters.
    pub param: Option<Params>,
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.mtype, self.subtype)?;
        if let Some(param) = &self.param {
            write!(f, ";{}", param)?;
        }
        Ok(())
    }
}

impl MediaType {
    /// Constructs a `MediaType` from a type and a subtype.
    pub fn new(mtype: &str, subtype: &str) -> Self {
        Self {
            mtype: mtype.into(),
            subtype: subtype.into(),
            param: None,
        }
    }

    pub fn parse(parser: &mut Parser<'_>) -> Result<Self> {
        let mtype = parser.parse_token()?.to_string();
        parser.must_read(b'/')?;
        let subtype = parser.parse_token()?.to_string();
        let param = crate::macros::parse_header_param!(parser);

        Ok(Self {
            mtype: mtype.as_str().into(),
            subtype: subtype.as_str().into(),
            param,
        })
    }

    pub fn from_static(s: &'static str) -> Result<Self> {
        Self::parse(&mut Parser::new(s.as_bytes()))
    }
}

pub(crate) fn get_local_name(addr: &std::net::SocketAddr) -> String {
    let ip = local_ip_address::local_ip().unwrap_or(addr.ip());

    format!("{}:{}", ip, addr.port())
}

/// Generates a random alphanumeric string, used for tags and branch
/// parameters.
pub(crate) fn random_str(len: usize) -> String {
    use rand::distr::{Alphanumeric, SampleString};

    Alphanumeric.sample_string(&mut rand::rng(), len)
}

/// Seeds a dialog-local CSeq: random, positive and small enough to
/// leave room for the monotonic increments of a long-lived dialog.
pub(crate) fn random_cseq() -> u32 {
    (rand::random::<u32>() % 0x7FFF) + 1
}
