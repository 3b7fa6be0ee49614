use core::fmt;

use crate::error::Result;
use crate::headers::{SipHeaderParse, EXPIRES_PARAM, Q_PARAM};
use crate::macros::parse_header_param;
use crate::message::{Param, Params, SipAddr};
use crate::parser::Parser;
use crate::Q;

/// The `Contact` SIP header.
///
/// Specifies the URI for the user or UA sending the message.
/// A Contact in a target-refresh response updates the
/// dialog's remote target.
///
/// # Examples
///
/// ```
/// # use imsua::headers::Contact;
/// # use imsua::message::SipAddr;
/// let uri: SipAddr = "<sip:alice@client.atlanta.example.com>".parse().unwrap();
/// let c = Contact::new(uri);
///
/// assert_eq!(
///     "Contact: <sip:alice@client.atlanta.example.com>",
///     c.to_string()
/// );
/// ```
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Contact {
    /// The URI of the contact.
    pub uri: SipAddr,
    /// The quality value of the contact.
    pub q: Option<Q>,
    /// The expires parameter of the contact, in seconds.
    pub expires: Option<u32>,
    /// Additional parameters.
    pub param: Option<Params>,
}

impl Contact {
    /// Creates a new `Contact` from an address.
    pub fn new(uri: SipAddr) -> Self {
        Self {
            uri,
            q: None,
            expires: None,
            param: None,
        }
    }

    /// Creates a new `Contact` carrying an `expires` parameter.
    pub fn new_with_expires(uri: SipAddr, expires: u32) -> Self {
        Self {
            uri,
            q: None,
            expires: Some(expires),
            param: None,
        }
    }

    /// Adds a capability parameter (RFC 3840), e.g. `+g.oma.sip-im`.
    pub fn add_param(&mut self, param: Param) {
        self.param.get_or_insert_with(Params::new).push(param);
    }
}

impl SipHeaderParse for Contact {
    const NAME: &'static str = "Contact";
    const SHORT_NAME: &'static str = "m";
    /*
     * Contact        =  ("Contact" / "m" ) HCOLON
     *                   ( STAR / (contact-param *(COMMA contact-param)))
     * contact-param  =  (name-addr / addr-spec) *(SEMI contact-params)
     *
     * contact-params     =  c-p-q / c-p-expires
     *                       / contact-extension
     * c-p-q              =  "q" EQUAL qvalue
     * c-p-expires        =  "expires" EQUAL delta-seconds
     */
    fn parse(parser: &mut Parser<'_>) -> Result<Self> {
        let uri = parser.parse_sip_addr(false)?;
        let mut q = None;
        let mut expires = None;
        let param = parse_header_param!(parser, Q_PARAM = q, EXPIRES_PARAM = expires);

        let q = q.map(|q: String| q.parse()).transpose()?;
        let expires = expires.and_then(|expires: String| expires.parse().ok());

        Ok(Contact { uri, q, expires, param })
    }
}

impl fmt::Display for Contact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", Contact::NAME, self.uri)?;

        if let Some(q) = self.q {
            write!(f, "{}", q)?;
        }
        if let Some(expires) = self.expires {
            write!(f, ";expires={}", expires)?;
        }
        if let Some(param) = &self.param {
            write!(f, ";{}", param)?;
        }
        Ok(())
    }
}
