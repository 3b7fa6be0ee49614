use std::fmt;
use std::sync::Arc;

use crate::error::Result;
use crate::headers::{SipHeaderParse, EXPIRES_PARAM};
use crate::macros::parse_header_param;
use crate::message::Params;
use crate::parser::Parser;

const RETRY_AFTER_PARAM: &str = "retry-after";
const REASON_PARAM: &str = "reason";

/// The `Subscription-State` SIP header (RFC 3265).
///
/// Carried in NOTIFY requests; its `expires` parameter has
/// priority over the Expires header when computing the
/// subscription refresh delay.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct SubscriptionState {
    /// The substate value, e.g. `active`, `pending`, `terminated`.
    pub state: Arc<str>,
    /// The reason parameter, if any.
    pub reason: Option<String>,
    /// The expires parameter, in seconds.
    pub expires: Option<u32>,
    /// The retry-after parameter, in seconds.
    pub retry_after: Option<u32>,
    /// Additional parameters.
    pub params: Option<Params>,
}

impl SubscriptionState {
    /// Creates an `active` subscription state with an expires parameter.
    pub fn active(expires: u32) -> Self {
        Self {
            state: "active".into(),
            reason: None,
            expires: Some(expires),
            retry_after: None,
            params: None,
        }
    }
}

impl SipHeaderParse for SubscriptionState {
    const NAME: &'static str = "Subscription-State";
    /*
     * Subscription-State   =  "Subscription-State" HCOLON substate-value
     *                         *( SEMI subexp-params )
     * substate-value       =  "active" / "pending" / "terminated"
     *                         / extension-substate
     * subexp-params        =  ("reason" EQUAL event-reason-value)
     *                         / ("expires" EQUAL delta-seconds)
     *                         / ("retry-after" EQUAL delta-seconds)
     *                         / generic-param
     */
    fn parse(parser: &mut Parser<'_>) -> Result<Self> {
        let state = parser.parse_token()?;
        let mut reason = None;
        let mut expires = None;
        let mut retry_after = None;
        let params = parse_header_param!(
            parser,
            REASON_PARAM = reason,
            EXPIRES_PARAM = expires,
            RETRY_AFTER_PARAM = retry_after
        );

        let expires = expires.and_then(|e: String| e.parse().ok());
        let retry_after = retry_after.and_then(|r: String| r.parse().ok());

        Ok(SubscriptionState {
            state: state.into(),
            reason,
            expires,
            retry_after,
            params,
        })
    }
}

impl fmt::Display for SubscriptionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", SubscriptionState::NAME, self.state)?;
        if let Some(reason) = &self.reason {
            write!(f, ";reason={}", reason)?;
        }
        if let Some(expires) = self.expires {
            write!(f, ";expires={}", expires)?;
        }
        if let Some(retry_after) = self.retry_after {
            write!(f, ";retry-after={}", retry_after)?;
        }
        if let Some(params) = &self.params {
            write!(f, ";{}", params)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse() {
        let src = b"active;expires=600\r\n";
        let mut parser = Parser::new(src);
        let state = SubscriptionState::parse(&mut parser).unwrap();

        assert_eq!(state.state.as_ref(), "active");
        assert_eq!(state.expires, Some(600));

        let src = b"terminated;reason=timeout;retry-after=120\r\n";
        let mut parser = Parser::new(src);
        let state = SubscriptionState::parse(&mut parser).unwrap();

        assert_eq!(state.state.as_ref(), "terminated");
        assert_eq!(state.reason.as_deref(), Some("timeout"));
        assert_eq!(state.retry_after, Some(120));
    }

    #[test]
    fn test_display() {
        let state = SubscriptionState::active(3600);

        assert_eq!(state.to_string(), "Subscription-State: active;expires=3600");
    }
}
