use std::fmt;

use crate::error::Result;
use crate::headers::SipHeaderParse;
use crate::macros::parse_header_param;
use crate::message::{NameAddr, Params};
use crate::parser::Parser;

/// The `Service-Route` SIP header (RFC 3608).
///
/// Returned by the registrar in a 200 response to REGISTER;
/// the saved list is preloaded as Route headers on new
/// dialogs and standalone transactions (3GPP TS 24.229
/// §5.1.2A.1).
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct ServiceRoute {
    /// The address of the service route hop.
    pub addr: NameAddr,
    /// Optional parameters associated with the service route.
    pub params: Option<Params>,
}

impl ServiceRoute {
    /// Creates a `ServiceRoute` from a name-addr.
    pub fn new(addr: NameAddr) -> Self {
        Self { addr, params: None }
    }
}

impl SipHeaderParse for ServiceRoute {
    const NAME: &'static str = "Service-Route";
    /*
     * Service-Route  =  "Service-Route" HCOLON sr-value *(COMMA sr-value)
     * sr-value       =  name-addr *( SEMI rr-param )
     */
    fn parse(parser: &mut Parser<'_>) -> Result<Self> {
        let addr = parser.parse_name_addr()?;
        let params = parse_header_param!(parser);
        Ok(ServiceRoute { addr, params })
    }
}

impl fmt::Display for ServiceRoute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", ServiceRoute::NAME, self.addr)?;
        if let Some(param) = &self.params {
            write!(f, ";{}", param)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{Host, HostPort};

    #[test]
    fn test_parse() {
        let src = b"<sip:orig@scscf1.home.net;lr>\r\n";
        let mut parser = Parser::new(src);
        let sr = ServiceRoute::parse(&mut parser).unwrap();

        assert_eq!(sr.addr.uri.user_name(), Some("orig"));
        assert_eq!(
            sr.addr.uri.host_port,
            HostPort {
                host: Host::DomainName("scscf1.home.net".into()),
                port: None
            }
        );
        assert!(sr.addr.uri.lr_param);
    }
}
